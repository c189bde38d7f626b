//! CLAP bundle loading
//!
//! [`ClapInstance`] owns the library, the entry, the host shell and the plugin
//! pointer, and exposes them through [`NativeInstance`]. Extension vtables are
//! looked up once at load; an extension missing any required function is
//! treated as absent.

use crate::engine::WindowHandle;
use crate::error::LoadStage;
use crate::events::{EventList, NativeEvent};
use crate::host::{ClapHostShell, HostHandle};
use crate::instance::{
    AudioPortInfo, Cookie, Extensions, NativeGui, NativeInstance, NativeParamFlags,
    NativeParamInfo, NoteDialects, NotePortInfo, ProcessBlock, ProcessStatus,
};
use crate::{AdapterError, PluginMetadata, Result};
use clap_sys::entry::clap_plugin_entry;
use clap_sys::events::{clap_event_header, clap_input_events, clap_output_events};
use clap_sys::ext::audio_ports::{
    clap_audio_port_info, clap_plugin_audio_ports, CLAP_AUDIO_PORT_IS_MAIN, CLAP_EXT_AUDIO_PORTS,
};
use clap_sys::ext::gui::{clap_plugin_gui, clap_window, clap_window_handle, CLAP_EXT_GUI};
use clap_sys::ext::latency::{clap_plugin_latency, CLAP_EXT_LATENCY};
use clap_sys::ext::note_ports::{clap_note_port_info, clap_plugin_note_ports, CLAP_EXT_NOTE_PORTS};
use clap_sys::ext::params::{
    clap_param_info, clap_plugin_params, CLAP_EXT_PARAMS, CLAP_PARAM_IS_AUTOMATABLE,
    CLAP_PARAM_IS_BYPASS, CLAP_PARAM_IS_HIDDEN, CLAP_PARAM_IS_PERIODIC, CLAP_PARAM_IS_READONLY,
    CLAP_PARAM_IS_STEPPED,
};
use clap_sys::ext::posix_fd_support::{clap_plugin_posix_fd_support, CLAP_EXT_POSIX_FD_SUPPORT};
use clap_sys::ext::state::{clap_plugin_state, CLAP_EXT_STATE};
use clap_sys::ext::timer_support::{clap_plugin_timer_support, CLAP_EXT_TIMER_SUPPORT};
use clap_sys::factory::plugin_factory::{clap_plugin_factory, CLAP_PLUGIN_FACTORY_ID};
use clap_sys::plugin::{clap_plugin, clap_plugin_descriptor};
use clap_sys::process::clap_process;
use clap_sys::stream::{clap_istream, clap_ostream};
use std::ffi::{c_char, c_void, CStr, CString};
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[cfg(target_os = "macos")]
const WINDOW_API: &CStr = clap_sys::ext::gui::CLAP_WINDOW_API_COCOA;
#[cfg(target_os = "windows")]
const WINDOW_API: &CStr = clap_sys::ext::gui::CLAP_WINDOW_API_WIN32;
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const WINDOW_API: &CStr = clap_sys::ext::gui::CLAP_WINDOW_API_X11;

const TEXT_SIZE: usize = 256;

fn load_error(path: &Path, stage: LoadStage, reason: impl Into<String>) -> AdapterError {
    let reason = reason.into();
    error!(path = %path.display(), %stage, %reason, "CLAP load failed");
    AdapterError::LoadFailed {
        path: path.to_path_buf(),
        stage,
        reason,
    }
}

/// Owned string from a nullable C string.
unsafe fn c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// Owned string from a fixed, NUL-padded C array.
fn fixed_string(chars: &[c_char]) -> String {
    let bytes: Vec<u8> = chars
        .iter()
        .take_while(|c| **c != 0)
        .map(|c| *c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

unsafe fn descriptor_metadata(desc: &clap_plugin_descriptor, path: &Path) -> PluginMetadata {
    let mut features = Vec::new();
    if !desc.features.is_null() {
        let mut cursor = desc.features;
        while !(*cursor).is_null() {
            features.push(c_string(*cursor));
            cursor = cursor.add(1);
        }
    }
    PluginMetadata::new(c_string(desc.id), c_string(desc.name))
        .vendor(c_string(desc.vendor))
        .version(c_string(desc.version))
        .description(c_string(desc.description))
        .features(features)
        .filename(path.to_string_lossy())
}

/// Library plus initialized entry. Dropping deinits the entry, then unloads.
struct LoadedEntry {
    entry: *const clap_plugin_entry,
    _library: libloading::Library,
}

impl LoadedEntry {
    fn open(path: &Path) -> Result<Self> {
        // SAFETY: loading runs the library's initializers; that is the point.
        let library = unsafe { libloading::Library::new(path) }
            .map_err(|e| load_error(path, LoadStage::Opening, e.to_string()))?;

        // `clap_entry` is an exported struct, so the symbol address is the entry.
        let entry: *const clap_plugin_entry = unsafe {
            let symbol = library
                .get::<*const clap_plugin_entry>(b"clap_entry\0")
                .map_err(|e| load_error(path, LoadStage::Opening, format!("no clap_entry: {e}")))?;
            *symbol
        };
        let Some(vtable) = (unsafe { entry.as_ref() }) else {
            return Err(load_error(path, LoadStage::Opening, "clap_entry is null"));
        };

        let (Some(init), Some(_), Some(_)) = (vtable.init, vtable.deinit, vtable.get_factory) else {
            return Err(load_error(path, LoadStage::Entry, "entry functions are null"));
        };

        let version = vtable.clap_version;
        if version.major < 1 {
            return Err(load_error(
                path,
                LoadStage::Version,
                format!(
                    "incompatible CLAP version {}.{}.{}",
                    version.major, version.minor, version.revision
                ),
            ));
        }

        let parent = path.parent().unwrap_or(path);
        let parent_c = CString::new(parent.to_string_lossy().as_bytes())
            .map_err(|e| load_error(path, LoadStage::Entry, e.to_string()))?;
        if !unsafe { init(parent_c.as_ptr()) } {
            return Err(load_error(path, LoadStage::Entry, "entry init failed"));
        }

        Ok(Self {
            entry,
            _library: library,
        })
    }

    fn factory(&self, path: &Path) -> Result<&clap_plugin_factory> {
        let get_factory = unsafe { (*self.entry).get_factory }
            .ok_or_else(|| load_error(path, LoadStage::Factory, "entry has no get_factory"))?;
        let factory = unsafe { get_factory(CLAP_PLUGIN_FACTORY_ID.as_ptr()) };
        if factory.is_null() {
            return Err(load_error(path, LoadStage::Factory, "no plugin factory"));
        }
        Ok(unsafe { &*(factory as *const clap_plugin_factory) })
    }
}

impl Drop for LoadedEntry {
    fn drop(&mut self) {
        if let Some(deinit) = unsafe { (*self.entry).deinit } {
            unsafe { deinit() };
        }
    }
}

/// Extension vtables found on the plugin; null when absent or incomplete.
struct ExtensionPtrs {
    audio_ports: *const clap_plugin_audio_ports,
    note_ports: *const clap_plugin_note_ports,
    params: *const clap_plugin_params,
    state: *const clap_plugin_state,
    gui: *const clap_plugin_gui,
    latency: *const clap_plugin_latency,
    timer_support: *const clap_plugin_timer_support,
    posix_fd_support: *const clap_plugin_posix_fd_support,
}

unsafe fn extension<T>(plugin: *const clap_plugin, id: &CStr) -> *const T {
    match (*plugin).get_extension {
        Some(get) => get(plugin, id.as_ptr()) as *const T,
        None => ptr::null(),
    }
}

/// Null out `ext` unless `complete` holds for it.
unsafe fn keep_if<T>(ext: *const T, name: &str, complete: impl FnOnce(&T) -> bool) -> *const T {
    match ext.as_ref() {
        Some(vtable) if complete(vtable) => ext,
        Some(_) => {
            warn!(extension = name, "plugin extension is incomplete, ignoring it");
            ptr::null()
        }
        None => ptr::null(),
    }
}

impl ExtensionPtrs {
    unsafe fn query(plugin: *const clap_plugin) -> Self {
        let audio_ports = keep_if(
            extension::<clap_plugin_audio_ports>(plugin, CLAP_EXT_AUDIO_PORTS),
            "audio-ports",
            |e| e.count.is_some() && e.get.is_some(),
        );
        let note_ports = keep_if(
            extension::<clap_plugin_note_ports>(plugin, CLAP_EXT_NOTE_PORTS),
            "note-ports",
            |e| e.count.is_some() && e.get.is_some(),
        );
        let params = keep_if(
            extension::<clap_plugin_params>(plugin, CLAP_EXT_PARAMS),
            "params",
            |e| {
                e.count.is_some()
                    && e.get_info.is_some()
                    && e.get_value.is_some()
                    && e.value_to_text.is_some()
            },
        );
        let state = keep_if(
            extension::<clap_plugin_state>(plugin, CLAP_EXT_STATE),
            "state",
            |e| e.save.is_some() && e.load.is_some(),
        );
        let gui = keep_if(extension::<clap_plugin_gui>(plugin, CLAP_EXT_GUI), "gui", |e| {
            e.is_api_supported.is_some()
                && e.create.is_some()
                && e.destroy.is_some()
                && e.set_scale.is_some()
                && e.get_size.is_some()
                && e.can_resize.is_some()
                && e.adjust_size.is_some()
                && e.set_size.is_some()
                && e.set_parent.is_some()
                && e.set_transient.is_some()
                && e.suggest_title.is_some()
                && e.show.is_some()
                && e.hide.is_some()
        });
        let latency = keep_if(
            extension::<clap_plugin_latency>(plugin, CLAP_EXT_LATENCY),
            "latency",
            |e| e.get.is_some(),
        );
        let timer_support = keep_if(
            extension::<clap_plugin_timer_support>(plugin, CLAP_EXT_TIMER_SUPPORT),
            "timer-support",
            |e| e.on_timer.is_some(),
        );
        let posix_fd_support = if cfg!(unix) {
            keep_if(
                extension::<clap_plugin_posix_fd_support>(plugin, CLAP_EXT_POSIX_FD_SUPPORT),
                "posix-fd-support",
                |e| e.on_fd.is_some(),
            )
        } else {
            ptr::null()
        };

        Self {
            audio_ports,
            note_ports,
            params,
            state,
            gui,
            latency,
            timer_support,
            posix_fd_support,
        }
    }
}

/// A created and initialized CLAP plugin.
pub struct ClapInstance {
    plugin: *const clap_plugin,
    ext: ExtensionPtrs,
    descriptor: PluginMetadata,
    active: AtomicBool,
    processing: AtomicBool,
    // dropped after the plugin is destroyed, in this order
    _host: ClapHostShell,
    _entry: LoadedEntry,
}

// SAFETY: CLAP's thread rules are upheld by the adapter: audio-thread calls
// happen under the processing lock and everything else on the main thread.
unsafe impl Send for ClapInstance {}
unsafe impl Sync for ClapInstance {}

impl ClapInstance {
    /// Open `path`, pick `plugin_id` (or the first plugin) from its factory,
    /// then create and initialize it with a host shell over `host`.
    pub fn load(path: &Path, plugin_id: Option<&str>, host: Arc<HostHandle>) -> Result<Self> {
        let plugin_id = plugin_id.filter(|id| !id.is_empty());
        info!(path = %path.display(), plugin_id, "loading CLAP plugin");
        let entry = LoadedEntry::open(path)?;
        let factory = entry.factory(path)?;

        let count_fn = factory
            .get_plugin_count
            .ok_or_else(|| load_error(path, LoadStage::Factory, "factory has no get_plugin_count"))?;
        let descriptor_fn = factory.get_plugin_descriptor.ok_or_else(|| {
            load_error(path, LoadStage::Factory, "factory has no get_plugin_descriptor")
        })?;
        let create_fn = factory
            .create_plugin
            .ok_or_else(|| load_error(path, LoadStage::Factory, "factory has no create_plugin"))?;

        let count = unsafe { count_fn(factory) };
        let mut chosen: Option<&clap_plugin_descriptor> = None;
        for index in 0..count {
            let Some(desc) = (unsafe { descriptor_fn(factory, index).as_ref() }) else {
                continue;
            };
            if desc.id.is_null() {
                continue;
            }
            let id = unsafe { CStr::from_ptr(desc.id) }.to_string_lossy();
            debug!(index, id = %id, "factory descriptor");
            if plugin_id.map_or(true, |wanted| wanted == id) {
                chosen = Some(desc);
                break;
            }
        }
        let desc = chosen.ok_or_else(|| {
            let reason = match plugin_id {
                Some(id) => format!("no plugin with id {id} among {count}"),
                None => "factory has no plugins".to_string(),
            };
            load_error(path, LoadStage::Factory, reason)
        })?;

        let host = ClapHostShell::new(host);
        let plugin = unsafe { create_fn(factory, host.as_ptr(), desc.id) };
        if plugin.is_null() {
            return Err(load_error(path, LoadStage::Instantiation, "create_plugin returned null"));
        }

        let init_ok = unsafe { (*plugin).init.is_some_and(|init| init(plugin)) };
        if !init_ok {
            if let Some(destroy) = unsafe { (*plugin).destroy } {
                unsafe { destroy(plugin) };
            }
            return Err(load_error(path, LoadStage::Initialization, "plugin init failed"));
        }

        let descriptor = unsafe { descriptor_metadata(desc, path) };
        let ext = unsafe { ExtensionPtrs::query(plugin) };
        info!(
            id = %descriptor.id,
            name = %descriptor.name,
            version = %descriptor.version,
            "CLAP plugin initialized"
        );

        Ok(Self {
            plugin,
            ext,
            descriptor,
            active: AtomicBool::new(false),
            processing: AtomicBool::new(false),
            _host: host,
            _entry: entry,
        })
    }

    fn raw(&self) -> &clap_plugin {
        // SAFETY: non-null from creation until drop.
        unsafe { &*self.plugin }
    }

    fn params(&self) -> Option<&clap_plugin_params> {
        unsafe { self.ext.params.as_ref() }
    }

    fn gui_ext(&self) -> Option<&clap_plugin_gui> {
        unsafe { self.ext.gui.as_ref() }
    }

    fn window(handle: WindowHandle) -> clap_window {
        #[cfg(any(target_os = "macos", target_os = "windows"))]
        let specific = clap_window_handle {
            ptr: handle.0 as *mut c_void,
        };
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let specific = clap_window_handle { x11: handle.0 as _ };
        clap_window {
            api: WINDOW_API.as_ptr(),
            specific,
        }
    }
}

impl NativeInstance for ClapInstance {
    fn descriptor(&self) -> &PluginMetadata {
        &self.descriptor
    }

    fn extensions(&self) -> Extensions {
        Extensions {
            audio_ports: !self.ext.audio_ports.is_null(),
            note_ports: !self.ext.note_ports.is_null(),
            params: !self.ext.params.is_null(),
            param_flush: self.params().is_some_and(|p| p.flush.is_some()),
            state: !self.ext.state.is_null(),
            gui: !self.ext.gui.is_null(),
            latency: !self.ext.latency.is_null(),
            timer_support: !self.ext.timer_support.is_null(),
            posix_fd_support: !self.ext.posix_fd_support.is_null(),
            main_thread_hook: self.raw().on_main_thread.is_some(),
        }
    }

    fn activate(&self, sample_rate: f64, min_frames: u32, max_frames: u32) -> bool {
        let Some(activate) = self.raw().activate else {
            return false;
        };
        let ok = unsafe { activate(self.plugin, sample_rate, min_frames, max_frames) };
        self.active.store(ok, Ordering::Release);
        ok
    }

    fn deactivate(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(deactivate) = self.raw().deactivate {
            unsafe { deactivate(self.plugin) };
        }
    }

    fn start_processing(&self) -> bool {
        let ok = self
            .raw()
            .start_processing
            .map_or(true, |start| unsafe { start(self.plugin) });
        self.processing.store(ok, Ordering::Release);
        ok
    }

    fn stop_processing(&self) {
        if !self.processing.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(stop) = self.raw().stop_processing {
            unsafe { stop(self.plugin) };
        }
    }

    fn process(&self, block: &mut ProcessBlock<'_>) -> ProcessStatus {
        let Some(process) = self.raw().process else {
            return ProcessStatus::Error;
        };
        let in_events = input_events(block.in_events);
        let out_events = output_events(block.out_events);
        let data = clap_process {
            steady_time: block.steady_time,
            frames_count: block.frames,
            transport: block.transport,
            audio_inputs: block.audio_inputs.as_ptr(),
            audio_outputs: block.audio_outputs.as_mut_ptr(),
            audio_inputs_count: block.audio_inputs.len() as u32,
            audio_outputs_count: block.audio_outputs.len() as u32,
            in_events: &in_events,
            out_events: &out_events,
        };
        ProcessStatus::from(unsafe { process(self.plugin, &data) })
    }

    fn on_main_thread(&self) {
        if let Some(on_main_thread) = self.raw().on_main_thread {
            unsafe { on_main_thread(self.plugin) };
        }
    }

    fn audio_port_count(&self, is_input: bool) -> u32 {
        let Some(ext) = (unsafe { self.ext.audio_ports.as_ref() }) else {
            return 0;
        };
        ext.count.map_or(0, |count| unsafe { count(self.plugin, is_input) })
    }

    fn audio_port_info(&self, index: u32, is_input: bool) -> Option<AudioPortInfo> {
        let ext = unsafe { self.ext.audio_ports.as_ref() }?;
        let get = ext.get?;
        let mut info: clap_audio_port_info = unsafe { std::mem::zeroed() };
        if !unsafe { get(self.plugin, index, is_input, &mut info) } {
            return None;
        }
        Some(AudioPortInfo {
            id: info.id,
            name: fixed_string(&info.name),
            channel_count: info.channel_count,
            is_main: info.flags & CLAP_AUDIO_PORT_IS_MAIN != 0,
        })
    }

    fn note_port_count(&self, is_input: bool) -> u32 {
        let Some(ext) = (unsafe { self.ext.note_ports.as_ref() }) else {
            return 0;
        };
        ext.count.map_or(0, |count| unsafe { count(self.plugin, is_input) })
    }

    fn note_port_info(&self, index: u32, is_input: bool) -> Option<NotePortInfo> {
        let ext = unsafe { self.ext.note_ports.as_ref() }?;
        let get = ext.get?;
        let mut info: clap_note_port_info = unsafe { std::mem::zeroed() };
        if !unsafe { get(self.plugin, index, is_input, &mut info) } {
            return None;
        }
        Some(NotePortInfo {
            id: info.id,
            name: fixed_string(&info.name),
            supported_dialects: NoteDialects(info.supported_dialects),
        })
    }

    fn param_count(&self) -> u32 {
        self.params()
            .and_then(|p| p.count)
            .map_or(0, |count| unsafe { count(self.plugin) })
    }

    fn param_info(&self, index: u32) -> Option<NativeParamInfo> {
        let get_info = self.params()?.get_info?;
        let mut info: clap_param_info = unsafe { std::mem::zeroed() };
        if !unsafe { get_info(self.plugin, index, &mut info) } {
            return None;
        }
        let has = |flag: u32| info.flags & flag != 0;
        Some(NativeParamInfo {
            id: info.id,
            cookie: Cookie(info.cookie),
            name: fixed_string(&info.name),
            module: fixed_string(&info.module),
            min_value: info.min_value,
            max_value: info.max_value,
            default_value: info.default_value,
            flags: NativeParamFlags {
                stepped: has(CLAP_PARAM_IS_STEPPED),
                periodic: has(CLAP_PARAM_IS_PERIODIC),
                hidden: has(CLAP_PARAM_IS_HIDDEN),
                read_only: has(CLAP_PARAM_IS_READONLY),
                bypass: has(CLAP_PARAM_IS_BYPASS),
                automatable: has(CLAP_PARAM_IS_AUTOMATABLE),
            },
        })
    }

    fn param_value(&self, id: u32) -> Option<f64> {
        let get_value = self.params()?.get_value?;
        let mut value = 0.0;
        unsafe { get_value(self.plugin, id, &mut value) }.then_some(value)
    }

    fn param_value_to_text(&self, id: u32, value: f64) -> Option<String> {
        let to_text = self.params()?.value_to_text?;
        let mut text: [c_char; TEXT_SIZE] = [0; TEXT_SIZE];
        if !unsafe { to_text(self.plugin, id, value, text.as_mut_ptr(), TEXT_SIZE as u32) } {
            return None;
        }
        Some(fixed_string(&text))
    }

    fn param_flush(&self, input: &EventList, output: &mut EventList) {
        let Some(flush) = self.params().and_then(|p| p.flush) else {
            return;
        };
        let in_events = input_events(input);
        let out_events = output_events(output);
        unsafe { flush(self.plugin, &in_events, &out_events) };
    }

    fn save_state(&self) -> Option<Vec<u8>> {
        let save = unsafe { self.ext.state.as_ref() }?.save?;
        let mut buffer = Vec::new();
        let stream = output_stream(&mut buffer);
        if unsafe { save(self.plugin, &stream) } {
            Some(buffer)
        } else {
            warn!(plugin = %self.descriptor.name, "state save failed");
            None
        }
    }

    fn load_state(&self, data: &[u8]) -> bool {
        let Some(load) = (unsafe { self.ext.state.as_ref() }).and_then(|s| s.load) else {
            return false;
        };
        let mut cursor = ReadCursor { data, position: 0 };
        let stream = input_stream(&mut cursor);
        unsafe { load(self.plugin, &stream) }
    }

    fn latency(&self) -> u32 {
        unsafe { self.ext.latency.as_ref() }
            .and_then(|l| l.get)
            .map_or(0, |get| unsafe { get(self.plugin) })
    }

    fn on_timer(&self, timer_id: u32) {
        if let Some(on_timer) = unsafe { self.ext.timer_support.as_ref() }.and_then(|t| t.on_timer) {
            unsafe { on_timer(self.plugin, timer_id) };
        }
    }

    fn on_fd(&self, fd: i32, flags: u32) {
        if let Some(on_fd) = unsafe { self.ext.posix_fd_support.as_ref() }.and_then(|p| p.on_fd) {
            unsafe { on_fd(self.plugin, fd, flags) };
        }
    }

    fn gui(&self) -> Option<&dyn NativeGui> {
        self.gui_ext().map(|_| self as &dyn NativeGui)
    }
}

impl NativeGui for ClapInstance {
    fn is_api_supported(&self, floating: bool) -> bool {
        self.gui_ext()
            .and_then(|g| g.is_api_supported)
            .is_some_and(|f| unsafe { f(self.plugin, WINDOW_API.as_ptr(), floating) })
    }

    fn create(&self, floating: bool) -> bool {
        self.gui_ext()
            .and_then(|g| g.create)
            .is_some_and(|f| unsafe { f(self.plugin, WINDOW_API.as_ptr(), floating) })
    }

    fn destroy(&self) {
        if let Some(f) = self.gui_ext().and_then(|g| g.destroy) {
            unsafe { f(self.plugin) };
        }
    }

    fn set_scale(&self, scale: f64) -> bool {
        self.gui_ext()
            .and_then(|g| g.set_scale)
            .is_some_and(|f| unsafe { f(self.plugin, scale) })
    }

    fn get_size(&self) -> Option<(u32, u32)> {
        let f = self.gui_ext()?.get_size?;
        let (mut width, mut height) = (0, 0);
        unsafe { f(self.plugin, &mut width, &mut height) }.then_some((width, height))
    }

    fn can_resize(&self) -> bool {
        self.gui_ext()
            .and_then(|g| g.can_resize)
            .is_some_and(|f| unsafe { f(self.plugin) })
    }

    fn adjust_size(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        let f = self.gui_ext()?.adjust_size?;
        let (mut width, mut height) = (width, height);
        unsafe { f(self.plugin, &mut width, &mut height) }.then_some((width, height))
    }

    fn set_size(&self, width: u32, height: u32) -> bool {
        self.gui_ext()
            .and_then(|g| g.set_size)
            .is_some_and(|f| unsafe { f(self.plugin, width, height) })
    }

    fn set_parent(&self, window: WindowHandle) -> bool {
        let window = Self::window(window);
        self.gui_ext()
            .and_then(|g| g.set_parent)
            .is_some_and(|f| unsafe { f(self.plugin, &window) })
    }

    fn set_transient(&self, window: WindowHandle) -> bool {
        let window = Self::window(window);
        self.gui_ext()
            .and_then(|g| g.set_transient)
            .is_some_and(|f| unsafe { f(self.plugin, &window) })
    }

    fn suggest_title(&self, title: &str) {
        let Some(f) = self.gui_ext().and_then(|g| g.suggest_title) else {
            return;
        };
        if let Ok(title) = CString::new(title) {
            unsafe { f(self.plugin, title.as_ptr()) };
        }
    }

    fn show(&self) -> bool {
        self.gui_ext()
            .and_then(|g| g.show)
            .is_some_and(|f| unsafe { f(self.plugin) })
    }

    fn hide(&self) -> bool {
        self.gui_ext()
            .and_then(|g| g.hide)
            .is_some_and(|f| unsafe { f(self.plugin) })
    }
}

impl Drop for ClapInstance {
    fn drop(&mut self) {
        self.stop_processing();
        self.deactivate();
        if let Some(destroy) = self.raw().destroy {
            unsafe { destroy(self.plugin) };
        }
        debug!(plugin = %self.descriptor.name, "CLAP plugin destroyed");
    }
}

// ---------------------------------------------------------------------------
// event list vtables

fn input_events(list: &EventList) -> clap_input_events {
    clap_input_events {
        ctx: list as *const EventList as *mut c_void,
        size: Some(input_events_size),
        get: Some(input_events_get),
    }
}

fn output_events(list: &mut EventList) -> clap_output_events {
    clap_output_events {
        ctx: list as *mut EventList as *mut c_void,
        try_push: Some(output_events_try_push),
    }
}

unsafe extern "C" fn input_events_size(list: *const clap_input_events) -> u32 {
    if list.is_null() {
        return 0;
    }
    let events = &*((*list).ctx as *const EventList);
    events.len() as u32
}

unsafe extern "C" fn input_events_get(
    list: *const clap_input_events,
    index: u32,
) -> *const clap_event_header {
    if list.is_null() {
        return ptr::null();
    }
    let events = &*((*list).ctx as *const EventList);
    events
        .get(index as usize)
        .map_or(ptr::null(), |event| event.header() as *const clap_event_header)
}

unsafe extern "C" fn output_events_try_push(
    list: *const clap_output_events,
    event: *const clap_event_header,
) -> bool {
    if list.is_null() {
        return false;
    }
    let events = &mut *((*list).ctx as *mut EventList);
    match NativeEvent::from_header(event) {
        Some(event) => events.try_push_output(event),
        None => false,
    }
}

// ---------------------------------------------------------------------------
// state streams

struct ReadCursor<'a> {
    data: &'a [u8],
    position: usize,
}

fn output_stream(buffer: &mut Vec<u8>) -> clap_ostream {
    clap_ostream {
        ctx: buffer as *mut Vec<u8> as *mut c_void,
        write: Some(ostream_write),
    }
}

fn input_stream(cursor: &mut ReadCursor<'_>) -> clap_istream {
    clap_istream {
        ctx: cursor as *mut ReadCursor<'_> as *mut c_void,
        read: Some(istream_read),
    }
}

unsafe extern "C" fn ostream_write(
    stream: *const clap_ostream,
    buffer: *const c_void,
    size: u64,
) -> i64 {
    if stream.is_null() || (buffer.is_null() && size > 0) {
        return -1;
    }
    let out = &mut *((*stream).ctx as *mut Vec<u8>);
    if size > 0 {
        out.extend_from_slice(std::slice::from_raw_parts(buffer as *const u8, size as usize));
    }
    size as i64
}

unsafe extern "C" fn istream_read(stream: *const clap_istream, buffer: *mut c_void, size: u64) -> i64 {
    if stream.is_null() || buffer.is_null() {
        return -1;
    }
    let cursor = &mut *((*stream).ctx as *mut ReadCursor<'_>);
    let remaining = cursor.data.len() - cursor.position;
    let count = (size as usize).min(remaining);
    if count > 0 {
        let dest = std::slice::from_raw_parts_mut(buffer as *mut u8, count);
        dest.copy_from_slice(&cursor.data[cursor.position..cursor.position + count]);
        cursor.position += count;
    }
    count as i64
}
