//! Host engine collaborator: ports, time info, callbacks and windows.

use crate::config::EngineOptions;
use crate::protocol::TransportInfo;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    Audio,
    Cv,
    Event,
}

/// Handle the engine hands back from `add_port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortId(pub u32);

/// Platform window handle (X11 window id, HWND or NSView pointer).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UiState {
    Hidden,
    Shown,
    Error,
}

/// Asynchronous notifications delivered to the engine's callback sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineCallback {
    ParameterValueChanged { index: u32, value: f64 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    UiStateChanged { state: UiState, message: Option<String> },
    EmbedUiResized { width: u32, height: u32 },
    LatencyChanged { frames: u32 },
    StateDirty,
    ReloadAll,
}

/// Window the engine's GUI toolkit creates for embedded plugin UIs.
///
/// Resize completion and close notifications travel back through
/// `PluginAdapter::handle_ui_resized` / `handle_ui_closed`.
pub trait HostWindow: Send {
    fn native_handle(&self) -> WindowHandle;
    fn set_size(&mut self, width: u32, height: u32, force_update: bool);
    fn set_title(&mut self, title: &str);
    fn show(&mut self);
    fn hide(&mut self);
    fn focus(&mut self) {}
}

/// Output side of the host event ports for one block.
///
/// Port 0 is the default events-out port; `k >= 1` is the dedicated port of
/// native note output `k - 1`.
pub trait EventSink {
    fn write_midi(&mut self, port: usize, time: u32, data: &[u8]) -> bool;
    fn write_control(&mut self, time: u32, channel: u8, control: u16, normalized: f32) -> bool;
}

/// Engine services the adapter consumes.
pub trait HostEngine: Send + Sync {
    fn add_port(&self, kind: PortKind, name: &str, is_input: bool, index: u32) -> PortId;
    fn clear_ports(&self);
    fn sample_rate(&self) -> f64;
    fn buffer_size(&self) -> u32;
    fn is_offline(&self) -> bool;
    fn options(&self) -> EngineOptions;
    fn transport(&self) -> TransportInfo;
    /// Whether `idle()` runs on the main thread; otherwise slow ops ride on `ui_idle()`.
    fn has_idle_on_main_thread(&self) -> bool;
    fn callback(&self, event: EngineCallback);
    fn create_window(&self, title: &str, resizable: bool) -> Option<Box<dyn HostWindow>>;
}
