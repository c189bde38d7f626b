//! In-process fakes for the native plugin and the host engine.
//!
//! [`FakePlugin`] implements [`NativeInstance`] and [`NativeGui`] in plain Rust
//! and records every call and event it sees. [`RecordingEngine`] records added
//! ports, callbacks and window operations.

use crate::config::EngineOptions;
use crate::engine::{
    EngineCallback, EventSink, HostEngine, HostWindow, PortId, PortKind, WindowHandle,
};
use crate::events::{EventList, NativeEvent};
use crate::instance::{
    AudioPortInfo, Cookie, Extensions, NativeGui, NativeInstance, NativeParamFlags,
    NativeParamInfo, NotePortInfo, NoteDialects, ProcessBlock, ProcessStatus,
};
use crate::protocol::TransportInfo;
use crate::PluginMetadata;
use clap_sys::events::CLAP_EVENT_NOTE_ON;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Lifecycle and callback calls made on a [`FakePlugin`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Activate { sample_rate: f64, max_frames: u32 },
    Deactivate,
    StartProcessing,
    StopProcessing,
    OnMainThread,
    Flush,
    Timer(u32),
    Fd(i32, u32),
    SaveState,
    LoadState(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GuiCall {
    Create { floating: bool },
    Destroy,
    SetScale(f64),
    SetSize(u32, u32),
    SetParent(WindowHandle),
    SetTransient(WindowHandle),
    SuggestTitle(String),
    Show,
    Hide,
    AdjustSize(u32, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuiSupport {
    pub embedded: bool,
    pub floating: bool,
    pub size: (u32, u32),
}

/// A native input event, decoded for assertions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReceivedEvent {
    Note {
        on: bool,
        port: i16,
        time: u32,
        channel: i16,
        key: i16,
        velocity: f64,
        live: bool,
    },
    Midi {
        port: u16,
        time: u32,
        data: [u8; 3],
        live: bool,
    },
    Param {
        id: u32,
        time: u32,
        value: f64,
        live: bool,
    },
}

impl ReceivedEvent {
    fn from_native(event: &NativeEvent) -> Self {
        let live = event.is_live();
        match event {
            NativeEvent::Note(note) => ReceivedEvent::Note {
                on: note.header.type_ == CLAP_EVENT_NOTE_ON,
                port: note.port_index,
                time: note.header.time,
                channel: note.channel,
                key: note.key,
                velocity: note.velocity,
                live,
            },
            NativeEvent::Midi(m) => ReceivedEvent::Midi {
                port: m.port_index,
                time: m.header.time,
                data: m.data,
                live,
            },
            NativeEvent::ParamValue(p) => ReceivedEvent::Param {
                id: p.param_id,
                time: p.header.time,
                value: p.value,
                live,
            },
        }
    }
}

/// What the fake writes into its audio outputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioMode {
    /// Copy input channel `n` (or the last one) to output channel `n`.
    Passthrough,
    Constant(f32),
}

/// Output events the fake emits from its next `process()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputEvent {
    Param { id: u32, value: f64 },
    Midi { port: u16, time: u32, data: [u8; 3] },
    Note { port: i16, key: u8 },
}

struct Inner {
    descriptor: PluginMetadata,
    audio_inputs: Vec<u32>,
    audio_outputs: Vec<u32>,
    note_inputs: Vec<(String, NoteDialects)>,
    note_outputs: Vec<(String, NoteDialects)>,
    params: Vec<NativeParamInfo>,
    has_state: bool,
    param_flush: bool,
    timers: bool,
    fds: bool,
    gui: Option<GuiSupport>,
    latency: Option<AtomicU32>,

    values: Mutex<HashMap<u32, f64>>,
    state: Mutex<Vec<u8>>,
    calls: Mutex<Vec<Call>>,
    gui_calls: Mutex<Vec<GuiCall>>,
    blocks: Mutex<Vec<Vec<ReceivedEvent>>>,
    pending_output: Mutex<Vec<OutputEvent>>,
    audio_mode: Mutex<AudioMode>,
    gui_create_fails: AtomicBool,
    adjust_to: Mutex<Option<(u32, u32)>>,
    activate_fails: AtomicBool,
}

#[derive(Clone)]
pub struct FakePlugin {
    inner: Arc<Inner>,
}

pub struct FakePluginBuilder {
    descriptor: PluginMetadata,
    audio_inputs: Vec<u32>,
    audio_outputs: Vec<u32>,
    note_inputs: Vec<(String, NoteDialects)>,
    note_outputs: Vec<(String, NoteDialects)>,
    params: Vec<NativeParamInfo>,
    has_state: bool,
    param_flush: bool,
    timers: bool,
    fds: bool,
    gui: Option<GuiSupport>,
    latency: Option<u32>,
}

/// Automatable 0..1 parameter with id `100 + index`.
pub fn basic_param(index: u32) -> NativeParamInfo {
    NativeParamInfo {
        id: 100 + index,
        cookie: Cookie::default(),
        name: format!("Param {}", index + 1),
        module: String::new(),
        min_value: 0.0,
        max_value: 1.0,
        default_value: 0.5,
        flags: NativeParamFlags {
            automatable: true,
            ..Default::default()
        },
    }
}

impl FakePluginBuilder {
    pub fn descriptor(mut self, descriptor: PluginMetadata) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn features(mut self, features: &[&str]) -> Self {
        self.descriptor = self.descriptor.features(features.iter().copied());
        self
    }

    pub fn audio_inputs(mut self, channels: &[u32]) -> Self {
        self.audio_inputs = channels.to_vec();
        self
    }

    pub fn audio_outputs(mut self, channels: &[u32]) -> Self {
        self.audio_outputs = channels.to_vec();
        self
    }

    pub fn note_inputs(mut self, ports: &[(&str, NoteDialects)]) -> Self {
        self.note_inputs = ports.iter().map(|(n, d)| (n.to_string(), *d)).collect();
        self
    }

    pub fn note_outputs(mut self, ports: &[(&str, NoteDialects)]) -> Self {
        self.note_outputs = ports.iter().map(|(n, d)| (n.to_string(), *d)).collect();
        self
    }

    pub fn params(mut self, count: u32) -> Self {
        self.params = (0..count).map(basic_param).collect();
        self
    }

    pub fn param(mut self, info: NativeParamInfo) -> Self {
        self.params.push(info);
        self
    }

    pub fn state(mut self, enabled: bool) -> Self {
        self.has_state = enabled;
        self
    }

    pub fn param_flush(mut self, enabled: bool) -> Self {
        self.param_flush = enabled;
        self
    }

    pub fn timers(mut self, enabled: bool) -> Self {
        self.timers = enabled;
        self
    }

    pub fn fds(mut self, enabled: bool) -> Self {
        self.fds = enabled;
        self
    }

    pub fn gui(mut self, support: GuiSupport) -> Self {
        self.gui = Some(support);
        self
    }

    pub fn latency(mut self, frames: u32) -> Self {
        self.latency = Some(frames);
        self
    }

    pub fn build(self) -> FakePlugin {
        let values = self
            .params
            .iter()
            .map(|p| (p.id, p.default_value))
            .collect();
        FakePlugin {
            inner: Arc::new(Inner {
                descriptor: self.descriptor,
                audio_inputs: self.audio_inputs,
                audio_outputs: self.audio_outputs,
                note_inputs: self.note_inputs,
                note_outputs: self.note_outputs,
                params: self.params,
                has_state: self.has_state,
                param_flush: self.param_flush,
                timers: self.timers,
                fds: self.fds,
                gui: self.gui,
                latency: self.latency.map(AtomicU32::new),
                values: Mutex::new(values),
                state: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
                gui_calls: Mutex::new(Vec::new()),
                blocks: Mutex::new(Vec::new()),
                pending_output: Mutex::new(Vec::new()),
                audio_mode: Mutex::new(AudioMode::Passthrough),
                gui_create_fails: AtomicBool::new(false),
                adjust_to: Mutex::new(None),
                activate_fails: AtomicBool::new(false),
            }),
        }
    }
}

impl FakePlugin {
    pub fn builder() -> FakePluginBuilder {
        FakePluginBuilder {
            descriptor: PluginMetadata::new("org.plughost.fake", "Fake Plugin")
                .vendor("plughost")
                .version("1.0.0"),
            audio_inputs: Vec::new(),
            audio_outputs: Vec::new(),
            note_inputs: Vec::new(),
            note_outputs: Vec::new(),
            params: Vec::new(),
            has_state: false,
            param_flush: false,
            timers: false,
            fds: false,
            gui: None,
            latency: None,
        }
    }

    fn record(&self, call: Call) {
        self.inner.calls.lock().push(call);
    }

    fn record_gui(&self, call: GuiCall) {
        self.inner.gui_calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.inner.calls.lock().clear();
    }

    pub fn gui_calls(&self) -> Vec<GuiCall> {
        self.inner.gui_calls.lock().clone()
    }

    pub fn clear_gui_calls(&self) {
        self.inner.gui_calls.lock().clear();
    }

    pub fn set_gui_create_fails(&self, fails: bool) {
        self.inner.gui_create_fails.store(fails, Ordering::Relaxed);
    }

    pub fn set_activate_fails(&self, fails: bool) {
        self.inner.activate_fails.store(fails, Ordering::Relaxed);
    }

    /// Size `adjust_size` answers with; `None` accepts whatever is asked.
    pub fn set_adjust_to(&self, size: Option<(u32, u32)>) {
        *self.inner.adjust_to.lock() = size;
    }

    pub fn set_audio_mode(&self, mode: AudioMode) {
        *self.inner.audio_mode.lock() = mode;
    }

    pub fn set_latency(&self, frames: u32) {
        if let Some(latency) = &self.inner.latency {
            latency.store(frames, Ordering::Relaxed);
        }
    }

    /// Value the plugin holds for `id`, as a plugin-side knob would.
    pub fn set_value(&self, id: u32, value: f64) {
        self.inner.values.lock().insert(id, value);
    }

    pub fn set_state(&self, data: &[u8]) {
        *self.inner.state.lock() = data.to_vec();
    }

    pub fn state_data(&self) -> Vec<u8> {
        self.inner.state.lock().clone()
    }

    /// Queue output events for the next `process()`.
    pub fn emit(&self, event: OutputEvent) {
        self.inner.pending_output.lock().push(event);
    }

    /// Events received per processed block, in arrival order.
    pub fn blocks(&self) -> Vec<Vec<ReceivedEvent>> {
        self.inner.blocks.lock().clone()
    }

    pub fn last_block(&self) -> Vec<ReceivedEvent> {
        self.inner.blocks.lock().last().cloned().unwrap_or_default()
    }

    pub fn block_count(&self) -> usize {
        self.inner.blocks.lock().len()
    }

    fn apply_params(&self, events: &EventList) {
        let mut values = self.inner.values.lock();
        for event in events.iter() {
            if let NativeEvent::ParamValue(p) = event {
                values.insert(p.param_id, p.value);
            }
        }
    }

    fn emit_pending(&self, out: &mut EventList) {
        for event in self.inner.pending_output.lock().drain(..) {
            let native = match event {
                OutputEvent::Param { id, value } => {
                    NativeEvent::param_value(false, 0, id, Cookie::default(), value)
                }
                OutputEvent::Midi { port, time, data } => NativeEvent::midi(false, port, time, data),
                OutputEvent::Note { port, key } => NativeEvent::note(false, port, 0, 0, key, 100),
            };
            out.try_push_output(native);
        }
    }
}

impl NativeInstance for FakePlugin {
    fn descriptor(&self) -> &PluginMetadata {
        &self.inner.descriptor
    }

    fn extensions(&self) -> Extensions {
        let inner = &self.inner;
        Extensions {
            audio_ports: !inner.audio_inputs.is_empty() || !inner.audio_outputs.is_empty(),
            note_ports: !inner.note_inputs.is_empty() || !inner.note_outputs.is_empty(),
            params: !inner.params.is_empty(),
            param_flush: inner.param_flush,
            state: inner.has_state,
            gui: inner.gui.is_some(),
            latency: inner.latency.is_some(),
            timer_support: inner.timers,
            posix_fd_support: inner.fds,
            main_thread_hook: true,
        }
    }

    fn activate(&self, sample_rate: f64, _min_frames: u32, max_frames: u32) -> bool {
        if self.inner.activate_fails.load(Ordering::Relaxed) {
            return false;
        }
        self.record(Call::Activate {
            sample_rate,
            max_frames,
        });
        true
    }

    fn deactivate(&self) {
        self.record(Call::Deactivate);
    }

    fn start_processing(&self) -> bool {
        self.record(Call::StartProcessing);
        true
    }

    fn stop_processing(&self) {
        self.record(Call::StopProcessing);
    }

    fn process(&self, block: &mut ProcessBlock<'_>) -> ProcessStatus {
        self.inner
            .blocks
            .lock()
            .push(block.in_events.iter().map(ReceivedEvent::from_native).collect());
        self.apply_params(block.in_events);

        let mode = *self.inner.audio_mode.lock();
        let frames = block.frames as usize;
        let mut scratch = vec![0.0f32; frames];
        for port in 0..block.audio_outputs.len() {
            let channels = block.audio_outputs[port].channel_count as usize;
            for channel in 0..channels {
                match mode {
                    AudioMode::Constant(value) => scratch.fill(value),
                    AudioMode::Passthrough => {
                        let source = block.input_channel(port, channel).or_else(|| {
                            let count = block.audio_inputs.get(port)?.channel_count as usize;
                            block.input_channel(port, count.checked_sub(1)?)
                        });
                        match source {
                            Some(input) => scratch.copy_from_slice(input),
                            None => scratch.fill(0.0),
                        }
                    }
                }
                if let Some(out) = block.output_channel(port, channel) {
                    out.copy_from_slice(&scratch);
                }
            }
        }

        self.emit_pending(block.out_events);
        ProcessStatus::Continue
    }

    fn on_main_thread(&self) {
        self.record(Call::OnMainThread);
    }

    fn audio_port_count(&self, is_input: bool) -> u32 {
        if is_input {
            self.inner.audio_inputs.len() as u32
        } else {
            self.inner.audio_outputs.len() as u32
        }
    }

    fn audio_port_info(&self, index: u32, is_input: bool) -> Option<AudioPortInfo> {
        let ports = if is_input {
            &self.inner.audio_inputs
        } else {
            &self.inner.audio_outputs
        };
        let channel_count = *ports.get(index as usize)?;
        Some(AudioPortInfo {
            id: index,
            name: format!("audio {index}"),
            channel_count,
            is_main: index == 0,
        })
    }

    fn note_port_count(&self, is_input: bool) -> u32 {
        if is_input {
            self.inner.note_inputs.len() as u32
        } else {
            self.inner.note_outputs.len() as u32
        }
    }

    fn note_port_info(&self, index: u32, is_input: bool) -> Option<NotePortInfo> {
        let ports = if is_input {
            &self.inner.note_inputs
        } else {
            &self.inner.note_outputs
        };
        let (name, dialects) = ports.get(index as usize)?;
        Some(NotePortInfo {
            id: index,
            name: name.clone(),
            supported_dialects: *dialects,
        })
    }

    fn param_count(&self) -> u32 {
        self.inner.params.len() as u32
    }

    fn param_info(&self, index: u32) -> Option<NativeParamInfo> {
        self.inner.params.get(index as usize).cloned()
    }

    fn param_value(&self, id: u32) -> Option<f64> {
        self.inner.values.lock().get(&id).copied()
    }

    fn param_value_to_text(&self, id: u32, value: f64) -> Option<String> {
        self.inner
            .params
            .iter()
            .any(|p| p.id == id)
            .then(|| format!("{value:.2}"))
    }

    fn param_flush(&self, input: &EventList, output: &mut EventList) {
        self.record(Call::Flush);
        self.apply_params(input);
        self.emit_pending(output);
    }

    fn save_state(&self) -> Option<Vec<u8>> {
        self.record(Call::SaveState);
        self.inner.has_state.then(|| self.inner.state.lock().clone())
    }

    fn load_state(&self, data: &[u8]) -> bool {
        self.record(Call::LoadState(data.len()));
        if !self.inner.has_state {
            return false;
        }
        *self.inner.state.lock() = data.to_vec();
        true
    }

    fn latency(&self) -> u32 {
        self.inner
            .latency
            .as_ref()
            .map_or(0, |l| l.load(Ordering::Relaxed))
    }

    fn on_timer(&self, timer_id: u32) {
        self.record(Call::Timer(timer_id));
    }

    fn on_fd(&self, fd: i32, flags: u32) {
        self.record(Call::Fd(fd, flags));
    }

    fn gui(&self) -> Option<&dyn NativeGui> {
        self.inner.gui.map(|_| self as &dyn NativeGui)
    }
}

impl NativeGui for FakePlugin {
    fn is_api_supported(&self, floating: bool) -> bool {
        self.inner
            .gui
            .map_or(false, |g| if floating { g.floating } else { g.embedded })
    }

    fn create(&self, floating: bool) -> bool {
        if self.inner.gui_create_fails.load(Ordering::Relaxed) {
            return false;
        }
        self.record_gui(GuiCall::Create { floating });
        true
    }

    fn destroy(&self) {
        self.record_gui(GuiCall::Destroy);
    }

    fn set_scale(&self, scale: f64) -> bool {
        self.record_gui(GuiCall::SetScale(scale));
        true
    }

    fn get_size(&self) -> Option<(u32, u32)> {
        self.inner.gui.map(|g| g.size)
    }

    fn can_resize(&self) -> bool {
        true
    }

    fn adjust_size(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        self.record_gui(GuiCall::AdjustSize(width, height));
        Some(self.inner.adjust_to.lock().unwrap_or((width, height)))
    }

    fn set_size(&self, width: u32, height: u32) -> bool {
        self.record_gui(GuiCall::SetSize(width, height));
        true
    }

    fn set_parent(&self, window: WindowHandle) -> bool {
        self.record_gui(GuiCall::SetParent(window));
        true
    }

    fn set_transient(&self, window: WindowHandle) -> bool {
        self.record_gui(GuiCall::SetTransient(window));
        true
    }

    fn suggest_title(&self, title: &str) {
        self.record_gui(GuiCall::SuggestTitle(title.to_string()));
    }

    fn show(&self) -> bool {
        self.record_gui(GuiCall::Show);
        true
    }

    fn hide(&self) -> bool {
        self.record_gui(GuiCall::Hide);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowCall {
    SetSize(u32, u32, bool),
    SetTitle(String),
    Show,
    Hide,
    Focus,
}

struct RecordingWindow {
    calls: Arc<Mutex<Vec<WindowCall>>>,
}

impl HostWindow for RecordingWindow {
    fn native_handle(&self) -> WindowHandle {
        WindowHandle(1)
    }

    fn set_size(&mut self, width: u32, height: u32, force_update: bool) {
        self.calls
            .lock()
            .push(WindowCall::SetSize(width, height, force_update));
    }

    fn set_title(&mut self, title: &str) {
        self.calls.lock().push(WindowCall::SetTitle(title.to_string()));
    }

    fn show(&mut self) {
        self.calls.lock().push(WindowCall::Show);
    }

    fn hide(&mut self) {
        self.calls.lock().push(WindowCall::Hide);
    }

    fn focus(&mut self) {
        self.calls.lock().push(WindowCall::Focus);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedPort {
    pub kind: PortKind,
    pub name: String,
    pub is_input: bool,
    pub index: u32,
}

/// Headless engine: 48 kHz, 256-frame blocks, records everything.
pub struct RecordingEngine {
    options: EngineOptions,
    ports: Mutex<Vec<AddedPort>>,
    callbacks: Mutex<Vec<EngineCallback>>,
    window_calls: Arc<Mutex<Vec<WindowCall>>>,
    offline: AtomicBool,
    idle_on_main_thread: AtomicBool,
    windows: AtomicBool,
    transport: Mutex<TransportInfo>,
    sample_rate: Mutex<f64>,
    buffer_size: AtomicU32,
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::with_options(EngineOptions::default())
    }
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Self {
            options,
            ports: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            window_calls: Arc::new(Mutex::new(Vec::new())),
            offline: AtomicBool::new(false),
            idle_on_main_thread: AtomicBool::new(true),
            windows: AtomicBool::new(true),
            transport: Mutex::new(TransportInfo::default()),
            sample_rate: Mutex::new(48_000.0),
            buffer_size: AtomicU32::new(256),
        }
    }

    pub fn ports(&self) -> Vec<AddedPort> {
        self.ports.lock().clone()
    }

    pub fn ports_of(&self, kind: PortKind, is_input: bool) -> Vec<String> {
        self.ports
            .lock()
            .iter()
            .filter(|p| p.kind == kind && p.is_input == is_input)
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn callbacks(&self) -> Vec<EngineCallback> {
        self.callbacks.lock().clone()
    }

    pub fn clear_callbacks(&self) {
        self.callbacks.lock().clear();
    }

    pub fn window_calls(&self) -> Vec<WindowCall> {
        self.window_calls.lock().clone()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    pub fn set_idle_on_main_thread(&self, enabled: bool) {
        self.idle_on_main_thread.store(enabled, Ordering::Relaxed);
    }

    pub fn set_windows_supported(&self, enabled: bool) {
        self.windows.store(enabled, Ordering::Relaxed);
    }

    pub fn set_transport(&self, transport: TransportInfo) {
        *self.transport.lock() = transport;
    }

    pub fn set_sample_rate(&self, rate: f64) {
        *self.sample_rate.lock() = rate;
    }

    pub fn set_buffer_size(&self, frames: u32) {
        self.buffer_size.store(frames, Ordering::Relaxed);
    }
}

impl HostEngine for RecordingEngine {
    fn add_port(&self, kind: PortKind, name: &str, is_input: bool, index: u32) -> PortId {
        let mut ports = self.ports.lock();
        ports.push(AddedPort {
            kind,
            name: name.to_string(),
            is_input,
            index,
        });
        PortId(ports.len() as u32 - 1)
    }

    fn clear_ports(&self) {
        self.ports.lock().clear();
    }

    fn sample_rate(&self) -> f64 {
        *self.sample_rate.lock()
    }

    fn buffer_size(&self) -> u32 {
        self.buffer_size.load(Ordering::Relaxed)
    }

    fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Relaxed)
    }

    fn options(&self) -> EngineOptions {
        self.options.clone()
    }

    fn transport(&self) -> TransportInfo {
        *self.transport.lock()
    }

    fn has_idle_on_main_thread(&self) -> bool {
        self.idle_on_main_thread.load(Ordering::Relaxed)
    }

    fn callback(&self, event: EngineCallback) {
        self.callbacks.lock().push(event);
    }

    fn create_window(&self, _title: &str, _resizable: bool) -> Option<Box<dyn HostWindow>> {
        if !self.windows.load(Ordering::Relaxed) {
            return None;
        }
        Some(Box::new(RecordingWindow {
            calls: Arc::clone(&self.window_calls),
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Midi { port: usize, time: u32, data: Vec<u8> },
    Control { time: u32, channel: u8, control: u16, normalized: f32 },
}

/// Event output collector.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<SinkEvent>,
}

impl EventSink for RecordingSink {
    fn write_midi(&mut self, port: usize, time: u32, data: &[u8]) -> bool {
        self.events.push(SinkEvent::Midi {
            port,
            time,
            data: data.to_vec(),
        });
        true
    }

    fn write_control(&mut self, time: u32, channel: u8, control: u16, normalized: f32) -> bool {
        self.events.push(SinkEvent::Control {
            time,
            channel,
            control,
            normalized,
        });
        true
    }
}
