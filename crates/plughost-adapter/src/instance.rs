//! Native plugin instance surface.
//!
//! The adapter drives a plugin only through [`NativeInstance`]. Methods follow the
//! CLAP threading contract: `[main-thread]` ones are called from the non-realtime
//! thread, `[audio-thread]` ones from inside `process()` only.

use crate::engine::WindowHandle;
use crate::events::EventList;
use crate::PluginMetadata;
use clap_sys::audio_buffer::clap_audio_buffer;
use clap_sys::events::clap_event_transport;
use clap_sys::ext::note_ports::{CLAP_NOTE_DIALECT_CLAP, CLAP_NOTE_DIALECT_MIDI};
use clap_sys::process::{
    clap_process_status, CLAP_PROCESS_CONTINUE, CLAP_PROCESS_CONTINUE_IF_NOT_QUIET,
    CLAP_PROCESS_SLEEP, CLAP_PROCESS_TAIL,
};
use std::ffi::c_void;

/// Optional capabilities found on the instance. Missing ones only downgrade features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Extensions {
    pub audio_ports: bool,
    pub note_ports: bool,
    pub params: bool,
    pub param_flush: bool,
    pub state: bool,
    pub gui: bool,
    pub latency: bool,
    pub timer_support: bool,
    pub posix_fd_support: bool,
    pub main_thread_hook: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPortInfo {
    pub id: u32,
    pub name: String,
    pub channel_count: u32,
    pub is_main: bool,
}

/// Note dialect bits as declared by a note port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoteDialects(pub u32);

impl NoteDialects {
    pub const CLAP: Self = Self(CLAP_NOTE_DIALECT_CLAP);
    pub const MIDI: Self = Self(CLAP_NOTE_DIALECT_MIDI);

    pub fn supports_midi(self) -> bool {
        self.0 & CLAP_NOTE_DIALECT_MIDI != 0
    }

    pub fn supports_notes(self) -> bool {
        self.0 & CLAP_NOTE_DIALECT_CLAP != 0
    }

    /// Either dialect the adapter knows how to feed.
    pub fn is_usable(self) -> bool {
        self.supports_midi() || self.supports_notes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotePortInfo {
    pub id: u32,
    pub name: String,
    pub supported_dialects: NoteDialects,
}

/// Opaque per-parameter pointer handed back to the plugin in every value event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cookie(pub *mut c_void);

impl Default for Cookie {
    fn default() -> Self {
        Cookie(std::ptr::null_mut())
    }
}

// The cookie is never dereferenced by the host, only echoed back.
unsafe impl Send for Cookie {}
unsafe impl Sync for Cookie {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeParamFlags {
    pub stepped: bool,
    pub periodic: bool,
    pub hidden: bool,
    pub read_only: bool,
    pub bypass: bool,
    pub automatable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeParamInfo {
    pub id: u32,
    pub cookie: Cookie,
    pub name: String,
    pub module: String,
    pub min_value: f64,
    pub max_value: f64,
    pub default_value: f64,
    pub flags: NativeParamFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Error,
    Continue,
    ContinueIfNotQuiet,
    Tail,
    Sleep,
}

impl From<clap_process_status> for ProcessStatus {
    fn from(status: clap_process_status) -> Self {
        match status {
            CLAP_PROCESS_CONTINUE => ProcessStatus::Continue,
            CLAP_PROCESS_CONTINUE_IF_NOT_QUIET => ProcessStatus::ContinueIfNotQuiet,
            CLAP_PROCESS_TAIL => ProcessStatus::Tail,
            CLAP_PROCESS_SLEEP => ProcessStatus::Sleep,
            _ => ProcessStatus::Error,
        }
    }
}

/// Everything one native `process()` call sees. Buffer pointers are wired by the
/// adapter and stay valid for the duration of the call.
pub struct ProcessBlock<'a> {
    pub steady_time: i64,
    pub frames: u32,
    pub transport: &'a clap_event_transport,
    pub audio_inputs: &'a [clap_audio_buffer],
    pub audio_outputs: &'a mut [clap_audio_buffer],
    pub in_events: &'a EventList,
    pub out_events: &'a mut EventList,
}

impl ProcessBlock<'_> {
    pub fn input_channel(&self, port: usize, channel: usize) -> Option<&[f32]> {
        let buffer = self.audio_inputs.get(port)?;
        if channel >= buffer.channel_count as usize || buffer.data32.is_null() {
            return None;
        }
        // SAFETY: the adapter wires `channel_count` valid pointers of `frames` samples.
        unsafe {
            let ptr = *buffer.data32.add(channel);
            Some(std::slice::from_raw_parts(ptr, self.frames as usize))
        }
    }

    pub fn output_channel(&mut self, port: usize, channel: usize) -> Option<&mut [f32]> {
        let buffer = self.audio_outputs.get(port)?;
        if channel >= buffer.channel_count as usize || buffer.data32.is_null() {
            return None;
        }
        // SAFETY: as above; output channels never alias each other or the inputs.
        unsafe {
            let ptr = *buffer.data32.add(channel);
            Some(std::slice::from_raw_parts_mut(ptr, self.frames as usize))
        }
    }
}

/// Plugin-drawn UI, present only when the gui extension is complete.
pub trait NativeGui: Send + Sync {
    /// `[main-thread]` Whether the platform window API is supported in this mode.
    fn is_api_supported(&self, floating: bool) -> bool;
    fn create(&self, floating: bool) -> bool;
    fn destroy(&self);
    fn set_scale(&self, scale: f64) -> bool;
    fn get_size(&self) -> Option<(u32, u32)>;
    fn can_resize(&self) -> bool;
    /// Returns the closest size the plugin accepts.
    fn adjust_size(&self, width: u32, height: u32) -> Option<(u32, u32)>;
    fn set_size(&self, width: u32, height: u32) -> bool;
    fn set_parent(&self, window: WindowHandle) -> bool;
    fn set_transient(&self, window: WindowHandle) -> bool;
    fn suggest_title(&self, title: &str);
    fn show(&self) -> bool;
    fn hide(&self) -> bool;
}

/// Native ABI surface of one loaded plugin instance.
///
/// Extension methods have inert defaults so an instance only implements what its
/// [`Extensions`] advertise.
pub trait NativeInstance: Send + Sync {
    fn descriptor(&self) -> &PluginMetadata;

    /// `[main-thread]` Queried once per `reload()`.
    fn extensions(&self) -> Extensions;

    /// `[main-thread]`
    fn activate(&self, sample_rate: f64, min_frames: u32, max_frames: u32) -> bool;

    /// `[main-thread]`
    fn deactivate(&self);

    /// `[audio-thread]`
    fn start_processing(&self) -> bool;

    /// `[audio-thread]`
    fn stop_processing(&self);

    /// `[audio-thread]`
    fn process(&self, block: &mut ProcessBlock<'_>) -> ProcessStatus;

    /// `[main-thread]` Answer to a `request_callback()`.
    fn on_main_thread(&self) {}

    fn audio_port_count(&self, _is_input: bool) -> u32 {
        0
    }

    fn audio_port_info(&self, _index: u32, _is_input: bool) -> Option<AudioPortInfo> {
        None
    }

    fn note_port_count(&self, _is_input: bool) -> u32 {
        0
    }

    fn note_port_info(&self, _index: u32, _is_input: bool) -> Option<NotePortInfo> {
        None
    }

    fn param_count(&self) -> u32 {
        0
    }

    fn param_info(&self, _index: u32) -> Option<NativeParamInfo> {
        None
    }

    fn param_value(&self, _id: u32) -> Option<f64> {
        None
    }

    fn param_value_to_text(&self, _id: u32, _value: f64) -> Option<String> {
        None
    }

    /// `[main-thread]` when inactive. Applies `input` outside of `process()`.
    fn param_flush(&self, _input: &EventList, _output: &mut EventList) {}

    /// `None` when saving failed.
    fn save_state(&self) -> Option<Vec<u8>> {
        None
    }

    fn load_state(&self, _data: &[u8]) -> bool {
        false
    }

    fn latency(&self) -> u32 {
        0
    }

    fn on_timer(&self, _timer_id: u32) {}

    fn on_fd(&self, _fd: i32, _flags: u32) {}

    fn gui(&self) -> Option<&dyn NativeGui> {
        None
    }
}
