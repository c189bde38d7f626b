//! Custom UI embedding and resize negotiation.
//!
//! Everything here runs on the non-realtime thread. The resize origin records
//! who started the resize in flight, so the completion callback of our own
//! `set_size` does not bounce back into the plugin.

use crate::engine::{EngineCallback, HostEngine, HostWindow, UiState, WindowHandle};
use crate::host::HostHandle;
use crate::instance::NativeGui;
use crate::{AdapterError, Result};
use tracing::{debug, error, trace};

/// Passes a plugin-initiated resize may stay pending before it is dropped.
const PLUGIN_RESIZE_IDLE_PASSES: u8 = 2;

pub const REFUSED_TO_OPEN: &str = "Plugin refused to open its own UI";
pub const UNSUPPORTED_UI: &str = "Unsupported UI type";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiPhase {
    Closed,
    Created,
    Visible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOrigin {
    None,
    /// We answered a host resize with the plugin's adjusted size.
    Host { width: u32, height: u32 },
    /// The plugin asked for this size.
    Plugin { width: u32, height: u32, idles_left: u8 },
    /// Initial size taken from the plugin when the window opened.
    Init { width: u32, height: u32 },
}

impl ResizeOrigin {
    fn expected(self) -> Option<(u32, u32)> {
        match self {
            ResizeOrigin::None => None,
            ResizeOrigin::Host { width, height }
            | ResizeOrigin::Plugin { width, height, .. }
            | ResizeOrigin::Init { width, height } => Some((width, height)),
        }
    }
}

/// Collaborators for one UI operation.
pub struct UiContext<'a> {
    pub gui: &'a dyn NativeGui,
    pub engine: &'a dyn HostEngine,
    pub host: &'a HostHandle,
    pub plugin_name: &'a str,
}

impl UiContext<'_> {
    fn report(&self, state: UiState, message: Option<&str>) {
        self.engine.callback(EngineCallback::UiStateChanged {
            state,
            message: message.map(str::to_string),
        });
    }
}

pub struct UiCoordinator {
    phase: UiPhase,
    /// Decided on first use from the platform API support.
    embedded: Option<bool>,
    window: Option<Box<dyn HostWindow>>,
    width: u32,
    height: u32,
    origin: ResizeOrigin,
    should_close: bool,
    title: Option<String>,
}

impl Default for UiCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl UiCoordinator {
    pub fn new() -> Self {
        Self {
            phase: UiPhase::Closed,
            embedded: None,
            window: None,
            width: 0,
            height: 0,
            origin: ResizeOrigin::None,
            should_close: false,
            title: None,
        }
    }

    pub fn phase(&self) -> UiPhase {
        self.phase
    }

    pub fn origin(&self) -> ResizeOrigin {
        self.origin
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_visible(&self) -> bool {
        self.phase == UiPhase::Visible
    }

    pub fn is_embedded(&self) -> bool {
        self.embedded == Some(true)
    }

    fn ensure_mode(&mut self, gui: &dyn NativeGui) -> bool {
        *self
            .embedded
            .get_or_insert_with(|| gui.is_api_supported(false))
    }

    fn ensure_created(&mut self, ctx: &UiContext<'_>, floating: bool) -> Result<()> {
        if self.phase != UiPhase::Closed {
            return Ok(());
        }
        if !ctx.gui.create(floating) {
            error!(plugin = %ctx.plugin_name, "plugin UI creation failed");
            ctx.report(UiState::Error, Some(REFUSED_TO_OPEN));
            return Err(AdapterError::EditorError(REFUSED_TO_OPEN.into()));
        }
        self.phase = UiPhase::Created;
        Ok(())
    }

    fn apply_scale(ctx: &UiContext<'_>) {
        let scale = ctx.engine.options().ui_scale;
        if scale != 0.0 {
            ctx.gui.set_scale(scale);
        }
    }

    fn reset_resize(&mut self) {
        self.origin = ResizeOrigin::None;
        self.should_close = false;
    }

    /// Open or close the plugin UI in its own window.
    pub fn show(&mut self, ctx: &UiContext<'_>, visible: bool) -> Result<()> {
        if self.is_visible() == visible {
            return Ok(());
        }
        if !visible {
            self.hide(ctx);
            return Ok(());
        }

        let embedded = self.ensure_mode(ctx.gui);
        self.ensure_created(ctx, !embedded)?;
        Self::apply_scale(ctx);

        if embedded {
            let title = self.window_title(ctx.plugin_name);
            let Some(mut window) = ctx.engine.create_window(&title, ctx.gui.can_resize()) else {
                error!(plugin = %ctx.plugin_name, "engine could not create a UI window");
                ctx.report(UiState::Error, Some(UNSUPPORTED_UI));
                return Err(AdapterError::EditorError(UNSUPPORTED_UI.into()));
            };
            window.set_title(&title);
            ctx.gui.set_parent(window.native_handle());
            if let Some((width, height)) = ctx.gui.get_size() {
                self.origin = ResizeOrigin::Init { width, height };
                self.width = width;
                self.height = height;
                window.set_size(width, height, true);
            }
            ctx.gui.show();
            window.show();
            self.window = Some(window);
            ctx.host.set_window_open(true);
        } else {
            self.apply_title(ctx);
            let parent = WindowHandle(ctx.engine.options().frontend_win_id);
            ctx.gui.set_transient(parent);
            ctx.gui.show();
        }

        debug!(plugin = %ctx.plugin_name, embedded, "plugin UI shown");
        self.phase = UiPhase::Visible;
        Ok(())
    }

    fn hide(&mut self, ctx: &UiContext<'_>) {
        if let Some(window) = self.window.as_mut() {
            window.hide();
        }
        ctx.gui.hide();
        if self.phase != UiPhase::Closed {
            ctx.gui.destroy();
        }
        self.window = None;
        self.phase = UiPhase::Closed;
        ctx.host.set_window_open(false);
        self.reset_resize();
        debug!(plugin = %ctx.plugin_name, "plugin UI hidden");
    }

    /// Embed into a window the frontend already owns.
    pub fn embed(&mut self, ctx: &UiContext<'_>, parent: WindowHandle) -> Result<()> {
        if self.window.is_some() {
            return Err(AdapterError::EditorError("UI already has its own window".into()));
        }
        self.ensure_mode(ctx.gui);
        self.ensure_created(ctx, false)?;
        self.phase = UiPhase::Visible;
        Self::apply_scale(ctx);

        ctx.gui.set_parent(parent);
        if let Some((width, height)) = ctx.gui.get_size() {
            self.origin = ResizeOrigin::Init { width, height };
            self.width = width;
            self.height = height;
            ctx.engine
                .callback(EngineCallback::EmbedUiResized { width, height });
        }
        ctx.gui.show();
        Ok(())
    }

    /// Completion of a window resize, whoever started it.
    pub fn handle_resized(&mut self, gui: &dyn NativeGui, width: u32, height: u32) {
        if let Some(expected) = self.origin.expected() {
            self.origin = ResizeOrigin::None;
            if expected == (width, height) {
                trace!(width, height, "resize completion suppressed");
                return;
            }
        }

        if (width, height) == (self.width, self.height) {
            return;
        }

        let Some((adjusted_w, adjusted_h)) = gui.adjust_size(width, height) else {
            return;
        };
        if (adjusted_w, adjusted_h) != (width, height) {
            self.origin = ResizeOrigin::Host {
                width: adjusted_w,
                height: adjusted_h,
            };
            self.width = adjusted_w;
            self.height = adjusted_h;
            if let Some(window) = self.window.as_mut() {
                window.set_size(adjusted_w, adjusted_h, false);
            }
        } else {
            gui.set_size(width, height);
            self.width = width;
            self.height = height;
        }
    }

    /// The embedding window was closed by the user; acted upon at the next UI pass.
    pub fn handle_closed(&mut self) {
        if self.window.is_some() {
            self.should_close = true;
        }
    }

    fn plugin_resize(&mut self, width: u32, height: u32) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        self.origin = ResizeOrigin::Plugin {
            width,
            height,
            idles_left: PLUGIN_RESIZE_IDLE_PASSES,
        };
        self.width = width;
        self.height = height;
        window.set_size(width, height, true);
    }

    fn plugin_closed(&mut self, ctx: &UiContext<'_>, was_destroyed: bool) {
        if self.is_embedded() || !self.is_visible() {
            return;
        }
        self.phase = UiPhase::Created;
        if was_destroyed {
            ctx.gui.destroy();
            self.phase = UiPhase::Closed;
        }
        ctx.report(UiState::Hidden, None);
    }

    /// Non-realtime UI pass.
    pub fn idle(&mut self, ctx: &UiContext<'_>) {
        if self.should_close {
            self.hide(ctx);
            ctx.report(UiState::Hidden, None);
        }

        if let ResizeOrigin::Plugin {
            width,
            height,
            idles_left,
        } = self.origin
        {
            self.origin = if idles_left > 1 {
                ResizeOrigin::Plugin {
                    width,
                    height,
                    idles_left: idles_left - 1,
                }
            } else {
                trace!("plugin resize expired");
                ResizeOrigin::None
            };
        }

        let requests = ctx.host.take_gui_requests();
        if let Some(was_destroyed) = requests.closed {
            self.plugin_closed(ctx, was_destroyed);
        }
        if let Some((width, height)) = requests.resize {
            self.plugin_resize(width, height);
        }
    }

    fn window_title(&self, plugin_name: &str) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| format!("{plugin_name} (GUI)"))
    }

    fn apply_title(&mut self, ctx: &UiContext<'_>) {
        if self.phase == UiPhase::Closed {
            return;
        }
        let title = self.window_title(ctx.plugin_name);
        if self.is_embedded() {
            if let Some(window) = self.window.as_mut() {
                window.set_title(&title);
            }
        } else {
            ctx.gui.suggest_title(&title);
        }
    }

    pub fn set_title(&mut self, ctx: &UiContext<'_>, title: Option<&str>) {
        self.title = title.map(str::to_string);
        self.apply_title(ctx);
    }

    /// Tear down whatever is open, e.g. before the instance goes away.
    pub fn close(&mut self, ctx: &UiContext<'_>) {
        if self.phase != UiPhase::Closed || self.window.is_some() {
            self.hide(ctx);
        }
    }
}
