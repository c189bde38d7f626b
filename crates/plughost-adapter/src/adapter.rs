//! Engine-facing adapter contract and the CLAP implementation.
//!
//! One [`ClapAdapter`] hosts one plugin instance. The engine drives it through
//! [`PluginAdapter`] from two threads:
//!
//! - the audio thread calls [`PluginAdapter::process`] and
//!   [`PluginAdapter::set_parameter_value_rt`], which never block outside of
//!   offline rendering;
//! - the main/UI thread calls everything else.
//!
//! Realtime state sits behind one `parking_lot::Mutex` that the audio thread
//! only ever `try_lock`s. Notifications raised inside `process()` are queued
//! and delivered to the engine on the next `idle()`/`ui_idle()`.

use crate::config::AdapterConfig;
use crate::engine::{EngineCallback, HostEngine, WindowHandle};
use crate::events::NativeEvent;
use crate::host::HostHandle;
use crate::instance::NativeInstance;
use crate::metadata::{PluginCategory, PluginFormat};
use crate::options::{ParameterHints, PluginHints, PluginOptions};
use crate::params::{ParameterRanges, ParameterScheduler, ParameterTable, ParameterType};
use crate::process::{
    AudioBlock, BlockContext, EventBlock, ExternalNote, PostProcControls, RtParameterWrite,
    RtState,
};
use crate::protocol::{
    EXTERNAL_NOTE_CAPACITY, MAX_MIDI_CHANNELS, MAX_MIDI_NOTE, POSTPONED_EVENT_CAPACITY,
};
use crate::slow_ops::{Lifecycle, PassKind, SlowOpsPump};
use crate::topology::PortTopology;
use crate::ui::{UiContext, UiCoordinator};
use crate::{AdapterError, PluginMetadata, Result};
use crossbeam::queue::ArrayQueue;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicI8, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Highest MIDI CC a parameter can be mapped to.
const MAX_MAPPED_CONTROL: i16 = 0x77;

/// Engine-facing contract shared by every plugin format.
///
/// `[main-thread]` methods may block; `[audio-thread]` ones never do.
pub trait PluginAdapter: Send + Sync {
    fn metadata(&self) -> &PluginMetadata;

    /// Display name, used for port prefixes and window titles.
    fn name(&self) -> &str;

    fn format(&self) -> PluginFormat {
        self.metadata().format
    }

    fn category(&self) -> PluginCategory {
        self.metadata().category()
    }

    fn hints(&self) -> PluginHints;

    fn options(&self) -> PluginOptions;

    /// Options this plugin can honor, recomputed on `reload()`.
    fn options_available(&self) -> PluginOptions;

    /// `[main-thread]`
    fn set_option(&self, option: PluginOptions, enabled: bool) -> Result<()>;

    /// `[main-thread]` Rebuild ports, parameters and buffers from the plugin.
    fn reload(&self) -> Result<()>;

    /// `[main-thread]`
    fn activate(&self) -> Result<()>;

    /// `[main-thread]`
    fn deactivate(&self);

    fn is_active(&self) -> bool;

    fn is_enabled(&self) -> bool;

    /// `[main-thread]` Whether the engine should process this plugin at all.
    fn set_enabled(&self, enabled: bool);

    /// `[audio-thread]` Render one block.
    fn process(&self, audio: &mut AudioBlock<'_>, events: &mut EventBlock<'_>);

    fn parameter_count(&self) -> u32;

    fn parameter_name(&self, index: u32) -> Option<String>;

    /// CLAP parameters carry no unit string.
    fn parameter_unit(&self, index: u32) -> Option<String>;

    /// Stable symbol: the native parameter id.
    fn parameter_symbol(&self, index: u32) -> Option<String>;

    /// `group:group` from the parameter's module path, if it has one.
    fn parameter_group(&self, index: u32) -> Option<String>;

    fn parameter_text(&self, index: u32) -> Option<String>;

    fn parameter_ranges(&self, index: u32) -> Option<ParameterRanges>;

    fn parameter_hints(&self, index: u32) -> Option<ParameterHints>;

    fn parameter_type(&self, index: u32) -> Option<ParameterType>;

    /// Pending value if one is scheduled, else what the plugin reports.
    fn get_parameter_value(&self, index: u32) -> Result<f64>;

    /// `[main-thread]` Clamp and schedule for the next block. Returns the stored value.
    fn set_parameter_value(&self, index: u32, value: f64) -> Result<f64>;

    /// `[audio-thread]` Live update at `frame` of the next processed block.
    fn set_parameter_value_rt(&self, index: u32, value: f64, frame: u32) -> bool;

    /// `[main-thread]` Map a MIDI CC (`-1` for none) on `channel` to a parameter.
    fn set_parameter_mapped_control(&self, index: u32, control: i16, channel: u8) -> Result<()>;

    /// `[main-thread]`
    fn chunk_data(&self) -> Result<Vec<u8>>;

    /// `[main-thread]`
    fn set_chunk_data(&self, data: &[u8]) -> Result<()>;

    /// `[main-thread]`
    fn show_custom_ui(&self, visible: bool) -> Result<()>;

    /// `[main-thread]` Embed into a window the engine already owns.
    fn embed_custom_ui(&self, parent: WindowHandle) -> Result<()>;

    /// `[main-thread]` The embedding window finished a resize.
    fn handle_ui_resized(&self, width: u32, height: u32);

    /// `[main-thread]` The embedding window was closed.
    fn handle_ui_closed(&self);

    /// `[main-thread]` `None` restores the default title.
    fn set_custom_ui_title(&self, title: Option<&str>);

    /// `[main-thread]` Engine idle pass.
    fn idle(&self);

    /// `[main-thread]` UI idle pass.
    fn ui_idle(&self);

    fn set_dry_wet(&self, value: f32) -> f32;

    fn set_volume(&self, value: f32) -> f32;

    fn set_balance_left(&self, value: f32) -> f32;

    fn set_balance_right(&self, value: f32) -> f32;

    /// `-1` disables the control channel.
    fn set_ctrl_channel(&self, channel: i8);

    fn ctrl_channel(&self) -> Option<u8>;

    /// Queue a note for the next block, e.g. from an on-screen keyboard.
    fn send_midi_single_note(&self, channel: u8, note: u8, velocity: u8) -> bool;

    /// Request all-notes-off before the next block.
    fn set_needs_reset(&self);

    /// `[main-thread]`
    fn buffer_size_changed(&self, frames: u32);

    /// `[main-thread]`
    fn sample_rate_changed(&self, rate: f64);

    fn offline_mode_changed(&self, offline: bool);

    fn latency_in_frames(&self) -> u32;

    /// Native events lost to full arenas since the last `reload()`.
    fn dropped_events(&self) -> u64;
}

pub struct ClapAdapter {
    name: String,
    instance: Box<dyn NativeInstance>,
    engine: Arc<dyn HostEngine>,
    host: Arc<HostHandle>,
    scheduler: ParameterScheduler,
    rt: Mutex<RtState>,
    ui: Mutex<UiCoordinator>,
    controls: PostProcControls,

    active: AtomicBool,
    enabled: AtomicBool,
    options: AtomicU32,
    options_available: AtomicU32,
    hints: AtomicU32,
    ctrl_channel: AtomicI8,
    latency: AtomicU32,
    needs_reset: AtomicBool,
    needs_param_flush: AtomicBool,

    postponed: ArrayQueue<EngineCallback>,
    external_notes: ArrayQueue<ExternalNote>,
    rt_params: ArrayQueue<RtParameterWrite>,
}

impl ClapAdapter {
    /// Wrap an initialized instance and run the first `reload()`.
    ///
    /// `host` must be the handle the instance's host callbacks write into.
    pub fn new(
        instance: Box<dyn NativeInstance>,
        engine: Arc<dyn HostEngine>,
        host: Arc<HostHandle>,
        config: &AdapterConfig,
    ) -> Result<Self> {
        let name = config
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| instance.descriptor().name.clone());

        let adapter = Self {
            name,
            instance,
            engine,
            host,
            scheduler: ParameterScheduler::new(),
            rt: Mutex::new(RtState::default()),
            ui: Mutex::new(UiCoordinator::new()),
            controls: PostProcControls::default(),
            active: AtomicBool::new(false),
            enabled: AtomicBool::new(false),
            options: AtomicU32::new(PluginOptions::NONE.bits()),
            options_available: AtomicU32::new(PluginOptions::NONE.bits()),
            hints: AtomicU32::new(PluginHints::NONE.bits()),
            ctrl_channel: AtomicI8::new(0),
            latency: AtomicU32::new(0),
            needs_reset: AtomicBool::new(false),
            needs_param_flush: AtomicBool::new(false),
            postponed: ArrayQueue::new(POSTPONED_EVENT_CAPACITY),
            external_notes: ArrayQueue::new(EXTERNAL_NOTE_CAPACITY),
            rt_params: ArrayQueue::new(POSTPONED_EVENT_CAPACITY),
        };

        adapter.reload()?;
        let options = config.options & adapter.options_available();
        adapter.options.store(options.bits(), Ordering::Relaxed);
        adapter.enabled.store(true, Ordering::Relaxed);
        debug!(plugin = %adapter.name, options = options.bits(), "adapter ready");
        Ok(adapter)
    }

    /// Load `path` through the CLAP loader and wrap the created instance.
    #[cfg(feature = "clap")]
    pub fn load(
        path: &std::path::Path,
        engine: Arc<dyn HostEngine>,
        config: &AdapterConfig,
    ) -> Result<Self> {
        let host = HostHandle::new();
        let instance =
            crate::clap_loader::ClapInstance::load(path, config.plugin_id.as_deref(), Arc::clone(&host))?;
        Self::new(Box::new(instance), engine, host, config)
    }

    pub fn host(&self) -> &Arc<HostHandle> {
        &self.host
    }

    /// Hold the processing lock, e.g. to keep `process()` out during a test.
    pub fn lock_processing(&self) -> MutexGuard<'_, RtState> {
        self.rt.lock()
    }

    fn compute_options_available(&self, topology: &PortTopology) -> PluginOptions {
        let mut options = PluginOptions::FIXED_BUFFERS;
        if self.instance.extensions().state {
            options |= PluginOptions::USE_CHUNKS;
        }
        if topology.any_input_supports_midi() {
            options |= PluginOptions::MIDI_DIALECT;
        } else if topology.any_input_supports_notes() {
            options |= PluginOptions::SKIP_SENDING_NOTES;
        }
        options
    }

    fn compute_hints(&self, topology: &PortTopology) -> PluginHints {
        let mut hints = topology.hints();
        if self.instance.descriptor().is_instrument() {
            hints |= PluginHints::IS_SYNTH;
        }
        if let Some(gui) = self.instance.gui() {
            if gui.is_api_supported(false) {
                hints |= PluginHints::HAS_CUSTOM_UI
                    | PluginHints::HAS_CUSTOM_EMBED_UI
                    | PluginHints::NEEDS_UI_MAIN_THREAD;
            } else if gui.is_api_supported(true) {
                hints |= PluginHints::HAS_CUSTOM_UI | PluginHints::NEEDS_UI_MAIN_THREAD;
            }
        }
        hints
    }

    fn activate_native(&self) -> Result<()> {
        let sample_rate = self.engine.sample_rate();
        let frames = self.engine.buffer_size();
        if !self.instance.activate(sample_rate, 1, frames) {
            error!(plugin = %self.name, "plugin refused to activate");
            return Err(AdapterError::ActivationFailed(format!(
                "{} refused {sample_rate} Hz / {frames} frames",
                self.name
            )));
        }
        self.instance.start_processing();
        self.needs_param_flush.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn deactivate_native(&self) {
        self.instance.stop_processing();
        self.instance.deactivate();
    }

    fn ui_context(&self) -> Option<UiContext<'_>> {
        Some(UiContext {
            gui: self.instance.gui()?,
            engine: self.engine.as_ref(),
            host: &self.host,
            plugin_name: &self.name,
        })
    }

    fn run_pump(&self, pass: PassKind) {
        SlowOpsPump::run(&self.host, self.instance.as_ref(), self, pass);
    }

    fn deliver_postponed(&self) {
        while let Some(callback) = self.postponed.pop() {
            self.engine.callback(callback);
        }
    }

    fn parameter<T>(&self, index: u32, f: impl FnOnce(&crate::params::Parameter) -> T) -> Option<T> {
        self.scheduler.table().get(index).map(f)
    }

    /// Parameter events the plugin emitted outside of `process()`.
    fn forward_flush_output(&self, table: &ParameterTable, events: &crate::events::EventList) {
        for event in events.iter() {
            if let NativeEvent::ParamValue(param) = event {
                if let Some(index) = table.index_of(param.param_id) {
                    self.engine.callback(EngineCallback::ParameterValueChanged {
                        index,
                        value: param.value,
                    });
                }
            }
        }
    }
}

impl Lifecycle for ClapAdapter {
    fn set_active(&self, active: bool) {
        if active == self.is_active() {
            return;
        }
        if active {
            if let Err(err) = self.activate() {
                warn!(plugin = %self.name, %err, "reactivation failed");
            }
        } else {
            self.deactivate();
        }
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn flush_params(&self) {
        if !self.needs_param_flush.swap(false, Ordering::AcqRel) {
            return;
        }
        if !self.instance.extensions().param_flush {
            return;
        }
        let table = self.scheduler.table();
        let mut rt = self.rt.lock();
        let (input, output) = rt.flush_lists();
        self.scheduler.drain_into(input);
        self.instance.param_flush(input, output);
        self.forward_flush_output(&table, output);
        output.clear();
    }

    fn latency_changed(&self) {
        if !self.instance.extensions().latency {
            return;
        }
        let frames = self.instance.latency();
        self.latency.store(frames, Ordering::Relaxed);
        debug!(plugin = %self.name, frames, "latency changed");
        self.engine
            .callback(EngineCallback::LatencyChanged { frames });
    }

    fn mark_dirty(&self) {
        self.engine.callback(EngineCallback::StateDirty);
    }
}

impl PluginAdapter for ClapAdapter {
    fn metadata(&self) -> &PluginMetadata {
        self.instance.descriptor()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn hints(&self) -> PluginHints {
        PluginHints::from_bits(self.hints.load(Ordering::Relaxed))
    }

    fn options(&self) -> PluginOptions {
        PluginOptions::from_bits(self.options.load(Ordering::Relaxed))
    }

    fn options_available(&self) -> PluginOptions {
        PluginOptions::from_bits(self.options_available.load(Ordering::Relaxed))
    }

    fn set_option(&self, option: PluginOptions, enabled: bool) -> Result<()> {
        if !self.options_available().contains(option) {
            return Err(AdapterError::Unsupported("option"));
        }
        let mut options = self.options();
        options.set(option, enabled);
        self.options.store(options.bits(), Ordering::Relaxed);
        Ok(())
    }

    fn reload(&self) -> Result<()> {
        debug!(plugin = %self.name, "reload start");
        let was_active = self.is_active();
        if was_active {
            self.deactivate();
        }

        self.engine.clear_ports();

        let table = ParameterTable::from_native(self.instance.as_ref());
        let param_count = table.len();
        let mut topology = PortTopology::build(self.instance.as_ref(), &table);
        topology.register_ports(self.engine.as_ref(), &self.name);

        let options_available = self.compute_options_available(&topology);
        let hints = self.compute_hints(&topology);
        self.options_available
            .store(options_available.bits(), Ordering::Relaxed);
        self.options.store(
            (self.options() & options_available).bits(),
            Ordering::Relaxed,
        );
        self.hints.store(hints.bits(), Ordering::Relaxed);

        let latency = if self.instance.extensions().latency {
            self.instance.latency()
        } else {
            0
        };
        self.latency.store(latency, Ordering::Relaxed);

        debug!(
            plugin = %self.name,
            audio_ins = topology.a_ins,
            audio_outs = topology.a_outs,
            note_ins = topology.note_inputs.len(),
            note_outs = topology.note_outputs.len(),
            params = param_count,
            latency,
            "reload topology"
        );

        {
            let mut rt = self.rt.lock();
            *rt = RtState::new(topology, param_count, self.engine.buffer_size());
            self.scheduler.publish(table);
        }

        if was_active {
            self.activate()?;
        } else {
            self.run_pump(PassKind::Inline);
        }
        Ok(())
    }

    fn activate(&self) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }
        self.activate_native()?;
        self.active.store(true, Ordering::Release);
        debug!(plugin = %self.name, "activated");
        self.run_pump(PassKind::Inline);
        Ok(())
    }

    fn deactivate(&self) {
        if !self.is_active() {
            return;
        }
        {
            // wait out an in-flight block
            let _rt = self.rt.lock();
            self.active.store(false, Ordering::Release);
        }
        self.deactivate_native();
        debug!(plugin = %self.name, "deactivated");
        self.run_pump(PassKind::Inline);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, enabled: bool) {
        Lifecycle::set_enabled(self, enabled);
    }

    fn process(&self, audio: &mut AudioBlock<'_>, events: &mut EventBlock<'_>) {
        if !self.is_active() {
            audio.silence();
            return;
        }

        let guard = if self.engine.is_offline() {
            Some(self.rt.lock())
        } else {
            self.rt.try_lock()
        };
        let Some(mut rt) = guard else {
            audio.silence();
            return;
        };
        // deactivate() may have won the lock
        if !self.is_active() {
            audio.silence();
            return;
        }

        let ctx = BlockContext {
            instance: self.instance.as_ref(),
            scheduler: &self.scheduler,
            controls: &self.controls,
            options: self.options(),
            hints: self.hints(),
            ctrl_channel: self.ctrl_channel(),
            needs_reset: self.needs_reset.swap(false, Ordering::AcqRel),
            transport: self.engine.transport(),
            sample_rate: self.engine.sample_rate(),
            postponed: &self.postponed,
            external_notes: &self.external_notes,
            rt_params: &self.rt_params,
        };
        rt.run_block(&ctx, audio, events);
    }

    fn parameter_count(&self) -> u32 {
        self.scheduler.count()
    }

    fn parameter_name(&self, index: u32) -> Option<String> {
        self.parameter(index, |p| p.name.clone())
    }

    fn parameter_unit(&self, index: u32) -> Option<String> {
        let _ = index;
        None
    }

    fn parameter_symbol(&self, index: u32) -> Option<String> {
        self.parameter(index, |p| p.native_id.to_string())
    }

    fn parameter_group(&self, index: u32) -> Option<String> {
        self.parameter(index, |p| {
            let (group, _) = p.module.rsplit_once('/')?;
            (!group.is_empty()).then(|| format!("{group}:{group}"))
        })
        .flatten()
    }

    fn parameter_text(&self, index: u32) -> Option<String> {
        let native_id = self.parameter(index, |p| p.native_id)?;
        let value = self.get_parameter_value(index).ok()?;
        self.instance.param_value_to_text(native_id, value)
    }

    fn parameter_ranges(&self, index: u32) -> Option<ParameterRanges> {
        self.parameter(index, |p| p.ranges)
    }

    fn parameter_hints(&self, index: u32) -> Option<ParameterHints> {
        self.parameter(index, |p| p.hints)
    }

    fn parameter_type(&self, index: u32) -> Option<ParameterType> {
        self.parameter(index, |p| p.kind)
    }

    fn get_parameter_value(&self, index: u32) -> Result<f64> {
        let Some(native_id) = self.parameter(index, |p| p.native_id) else {
            return Err(AdapterError::ParameterOutOfRange {
                index,
                count: self.parameter_count(),
            });
        };
        if let Some(pending) = self.scheduler.pending_value(index) {
            return Ok(pending);
        }
        match self.instance.param_value(native_id) {
            Some(value) => Ok(value),
            None => Ok(self.scheduler.last_value(index).unwrap_or_default()),
        }
    }

    fn set_parameter_value(&self, index: u32, value: f64) -> Result<f64> {
        let fixed = self.scheduler.set_value(index, value)?;
        if !self.is_active() && self.instance.extensions().param_flush {
            self.needs_param_flush.store(true, Ordering::Release);
        }
        Ok(fixed)
    }

    fn set_parameter_value_rt(&self, index: u32, value: f64, frame: u32) -> bool {
        let Some(fixed) = self.parameter(index, |p| p.ranges.fixed_value(value)) else {
            return false;
        };
        self.rt_params
            .push(RtParameterWrite {
                index,
                value: fixed,
                frame,
            })
            .is_ok()
    }

    fn set_parameter_mapped_control(&self, index: u32, control: i16, channel: u8) -> Result<()> {
        if !(-1..=MAX_MAPPED_CONTROL).contains(&control) || channel >= MAX_MIDI_CHANNELS {
            return Err(AdapterError::Unsupported("midi mapping"));
        }
        let table = self.scheduler.table();
        let param = table.get(index).ok_or(AdapterError::ParameterOutOfRange {
            index,
            count: table.len() as u32,
        })?;
        param.set_mapping(control, channel);
        Ok(())
    }

    fn chunk_data(&self) -> Result<Vec<u8>> {
        if !self.options().contains(PluginOptions::USE_CHUNKS) {
            return Err(AdapterError::Unsupported("chunks"));
        }
        if !self.instance.extensions().state {
            return Err(AdapterError::Unsupported("state"));
        }
        let data = self.instance.save_state();
        self.run_pump(PassKind::Inline);
        data.ok_or_else(|| AdapterError::StateSaveError(format!("{} refused to save", self.name)))
    }

    fn set_chunk_data(&self, data: &[u8]) -> Result<()> {
        if !self.options().contains(PluginOptions::USE_CHUNKS) {
            return Err(AdapterError::Unsupported("chunks"));
        }
        if !self.instance.extensions().state {
            return Err(AdapterError::Unsupported("state"));
        }
        if data.is_empty() {
            return Err(AdapterError::StateRestoreError("empty chunk".into()));
        }

        let loaded = self.instance.load_state(data);
        if loaded {
            for index in 0..self.parameter_count() {
                if let Ok(value) = self.get_parameter_value(index) {
                    self.engine
                        .callback(EngineCallback::ParameterValueChanged { index, value });
                }
            }
        }
        self.run_pump(PassKind::Inline);

        if loaded {
            Ok(())
        } else {
            Err(AdapterError::StateRestoreError(format!(
                "{} rejected {} bytes",
                self.name,
                data.len()
            )))
        }
    }

    fn show_custom_ui(&self, visible: bool) -> Result<()> {
        let ctx = self.ui_context().ok_or(AdapterError::Unsupported("gui"))?;
        self.ui.lock().show(&ctx, visible)
    }

    fn embed_custom_ui(&self, parent: WindowHandle) -> Result<()> {
        let ctx = self.ui_context().ok_or(AdapterError::Unsupported("gui"))?;
        self.ui.lock().embed(&ctx, parent)
    }

    fn handle_ui_resized(&self, width: u32, height: u32) {
        if let Some(gui) = self.instance.gui() {
            self.ui.lock().handle_resized(gui, width, height);
        }
    }

    fn handle_ui_closed(&self) {
        self.ui.lock().handle_closed();
    }

    fn set_custom_ui_title(&self, title: Option<&str>) {
        if let Some(ctx) = self.ui_context() {
            self.ui.lock().set_title(&ctx, title);
        }
    }

    fn idle(&self) {
        if self.engine.has_idle_on_main_thread() {
            self.run_pump(PassKind::Idle);
        }
        self.deliver_postponed();
    }

    fn ui_idle(&self) {
        if let Some(ctx) = self.ui_context() {
            self.ui.lock().idle(&ctx);
        }
        if !self.engine.has_idle_on_main_thread() {
            self.run_pump(PassKind::Idle);
        }
        self.deliver_postponed();
    }

    fn set_dry_wet(&self, value: f32) -> f32 {
        self.controls.set_dry_wet(value)
    }

    fn set_volume(&self, value: f32) -> f32 {
        self.controls.set_volume(value)
    }

    fn set_balance_left(&self, value: f32) -> f32 {
        self.controls.set_balance_left(value)
    }

    fn set_balance_right(&self, value: f32) -> f32 {
        self.controls.set_balance_right(value)
    }

    fn set_ctrl_channel(&self, channel: i8) {
        let channel = channel.clamp(-1, MAX_MIDI_CHANNELS as i8 - 1);
        self.ctrl_channel.store(channel, Ordering::Relaxed);
    }

    fn ctrl_channel(&self) -> Option<u8> {
        u8::try_from(self.ctrl_channel.load(Ordering::Relaxed)).ok()
    }

    fn send_midi_single_note(&self, channel: u8, note: u8, velocity: u8) -> bool {
        if channel >= MAX_MIDI_CHANNELS || note >= MAX_MIDI_NOTE || velocity >= 128 {
            return false;
        }
        if self.rt.lock().feeds().is_empty() {
            return false;
        }
        self.external_notes
            .push(ExternalNote {
                channel,
                note,
                velocity,
            })
            .is_ok()
    }

    fn set_needs_reset(&self) {
        self.needs_reset.store(true, Ordering::Release);
    }

    fn buffer_size_changed(&self, frames: u32) {
        debug!(plugin = %self.name, frames, "buffer size changed");
        let was_active = self.is_active();
        if was_active {
            self.deactivate();
        }
        self.rt.lock().prepare(frames);
        if was_active {
            if let Err(err) = self.activate() {
                warn!(plugin = %self.name, %err, "reactivation after buffer size change failed");
            }
        }
    }

    fn sample_rate_changed(&self, rate: f64) {
        debug!(plugin = %self.name, rate, "sample rate changed");
        let was_active = self.is_active();
        if was_active {
            self.deactivate();
        }
        let frames = self.engine.buffer_size();
        self.rt.lock().prepare(frames);
        if was_active {
            if let Err(err) = self.activate() {
                warn!(plugin = %self.name, %err, "reactivation after sample rate change failed");
            }
        }
    }

    fn offline_mode_changed(&self, _offline: bool) {}

    fn latency_in_frames(&self) -> u32 {
        self.latency.load(Ordering::Relaxed)
    }

    fn dropped_events(&self) -> u64 {
        self.rt.lock().dropped_events()
    }
}

impl Drop for ClapAdapter {
    fn drop(&mut self) {
        if let Some(ctx) = self.ui_context() {
            self.ui.lock().close(&ctx);
        }
        if self.active.swap(false, Ordering::AcqRel) {
            self.deactivate_native();
        }
        self.host.clear();
        debug!(plugin = %self.name, "adapter dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{PortKind, UiState};
    use crate::instance::{Cookie, NativeParamFlags, NativeParamInfo, NoteDialects};
    use crate::protocol::{ControlEvent, EngineEvent};
    use crate::test_support::{
        basic_param, AudioMode, Call, FakePlugin, GuiSupport, OutputEvent, ReceivedEvent,
        RecordingEngine, RecordingSink, SinkEvent,
    };

    const FRAMES: usize = 64;

    fn adapter_with(plugin: &FakePlugin, engine: &Arc<RecordingEngine>) -> ClapAdapter {
        adapter_with_config(plugin, engine, &AdapterConfig::default())
    }

    fn adapter_with_config(
        plugin: &FakePlugin,
        engine: &Arc<RecordingEngine>,
        config: &AdapterConfig,
    ) -> ClapAdapter {
        let engine: Arc<dyn HostEngine> = engine.clone();
        ClapAdapter::new(Box::new(plugin.clone()), engine, HostHandle::new(), config).unwrap()
    }

    fn synth() -> FakePlugin {
        FakePlugin::builder()
            .features(&["instrument", "synthesizer"])
            .audio_outputs(&[2])
            .note_inputs(&[("midi in", NoteDialects::MIDI)])
            .params(3)
            .build()
    }

    fn effect() -> FakePlugin {
        FakePlugin::builder()
            .audio_inputs(&[2])
            .audio_outputs(&[2])
            .params(2)
            .build()
    }

    /// Run one block of `input` (per channel) and return the two output channels.
    fn run(adapter: &ClapAdapter, input: f32, events: &[EngineEvent]) -> (Vec<f32>, Vec<f32>, RecordingSink) {
        let in_l = vec![input; FRAMES];
        let in_r = vec![input; FRAMES];
        let mut out_l = vec![9.0f32; FRAMES];
        let mut out_r = vec![9.0f32; FRAMES];
        let mut sink = RecordingSink::default();
        {
            let audio_in: [&[f32]; 2] = [&in_l, &in_r];
            let mut audio_out: [&mut [f32]; 2] = [&mut out_l, &mut out_r];
            let mut cv_out: [&mut [f32]; 0] = [];
            let mut audio = AudioBlock {
                audio_in: &audio_in,
                audio_out: &mut audio_out,
                cv_in: &[],
                cv_out: &mut cv_out,
                frames: FRAMES as u32,
            };
            let inputs: [&[EngineEvent]; 1] = [events];
            let mut block = EventBlock {
                inputs: &inputs,
                output: &mut sink,
            };
            adapter.process(&mut audio, &mut block);
        }
        (out_l, out_r, sink)
    }

    #[test]
    fn test_reload_builds_ports_hints_and_options() {
        let plugin = synth();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);

        assert_eq!(adapter.parameter_count(), 3);
        assert_eq!(engine.ports_of(PortKind::Audio, false), vec!["output_1", "output_2"]);
        assert_eq!(engine.ports_of(PortKind::Event, true), vec!["events-in"]);

        let hints = adapter.hints();
        assert!(hints.contains(PluginHints::IS_SYNTH));
        assert!(hints.contains(PluginHints::CAN_VOLUME));
        assert!(hints.contains(PluginHints::CAN_BALANCE));
        assert!(!hints.contains(PluginHints::CAN_DRYWET));
        assert!(!hints.contains(PluginHints::HAS_CUSTOM_UI));
        assert_eq!(adapter.category(), PluginCategory::Synth);

        assert!(adapter.options_available().contains(PluginOptions::MIDI_DIALECT));
        assert!(!adapter.options_available().contains(PluginOptions::USE_CHUNKS));
        assert!(adapter.options().contains(PluginOptions::SEND_ALL_SOUND_OFF));
        assert!(!adapter.options().contains(PluginOptions::USE_CHUNKS));
    }

    #[test]
    fn test_set_option_rejects_unavailable() {
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&effect(), &engine);
        assert!(adapter
            .set_option(PluginOptions::SEND_PITCHBEND, true)
            .is_err());
        adapter
            .set_option(PluginOptions::FIXED_BUFFERS, false)
            .unwrap();
        assert!(!adapter.options().contains(PluginOptions::FIXED_BUFFERS));
    }

    #[test]
    fn test_inactive_process_is_silent() {
        let plugin = effect();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);

        let (l, r, _) = run(&adapter, 0.7, &[]);
        assert!(l.iter().chain(&r).all(|s| *s == 0.0));
        assert_eq!(plugin.block_count(), 0);
    }

    #[test]
    fn test_lock_contention_returns_silence() {
        let plugin = effect();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        adapter.activate().unwrap();

        let guard = adapter.lock_processing();
        let (l, _, _) = run(&adapter, 0.7, &[]);
        drop(guard);
        assert!(l.iter().all(|s| *s == 0.0));
        assert_eq!(plugin.block_count(), 0);

        let (l, _, _) = run(&adapter, 0.7, &[]);
        assert!(l.iter().all(|s| (*s - 0.7).abs() < 1e-6));
        assert_eq!(plugin.block_count(), 1);
    }

    #[test]
    fn test_parameter_round_trip_and_at_most_once() {
        let plugin = effect();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        adapter.activate().unwrap();

        adapter.set_parameter_value(0, 0.2).unwrap();
        adapter.set_parameter_value(0, 0.3).unwrap();
        assert_eq!(adapter.set_parameter_value(0, 4.0).unwrap(), 1.0);
        adapter.set_parameter_value(0, 0.4).unwrap();
        assert_eq!(adapter.get_parameter_value(0).unwrap(), 0.4);

        run(&adapter, 0.0, &[]);
        let params: Vec<_> = plugin
            .last_block()
            .into_iter()
            .filter(|e| matches!(e, ReceivedEvent::Param { .. }))
            .collect();
        assert_eq!(
            params,
            vec![ReceivedEvent::Param {
                id: 100,
                time: 0,
                value: 0.4,
                live: false
            }]
        );
        assert_eq!(adapter.get_parameter_value(0).unwrap(), 0.4);

        run(&adapter, 0.0, &[]);
        assert!(plugin.last_block().is_empty());
        assert!(adapter.set_parameter_value(9, 0.0).is_err());
    }

    #[test]
    fn test_scheduled_update_precedes_host_automation() {
        let plugin = effect();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        adapter.activate().unwrap();

        adapter.set_parameter_value(1, 0.1).unwrap();
        run(&adapter, 0.0, &[EngineEvent::parameter(0, 1, 0.9)]);

        let block = plugin.last_block();
        assert_eq!(block.len(), 2);
        assert!(matches!(block[0], ReceivedEvent::Param { value, live: false, .. } if value == 0.1));
        assert!(matches!(block[1], ReceivedEvent::Param { live: true, .. }));

        adapter.idle();
        assert!(engine
            .callbacks()
            .iter()
            .any(|c| matches!(c, EngineCallback::ParameterValueChanged { index: 1, .. })));
    }

    #[test]
    fn test_rt_write_lands_at_frame_in_order() {
        let plugin = effect();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        adapter.activate().unwrap();

        assert!(adapter.set_parameter_value_rt(0, 0.25, 10));
        assert!(!adapter.set_parameter_value_rt(7, 0.25, 10));
        run(&adapter, 0.0, &[EngineEvent::parameter(20, 1, 0.5)]);

        let times: Vec<_> = plugin
            .last_block()
            .iter()
            .map(|e| match e {
                ReceivedEvent::Param { id, time, .. } => (*id, *time),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(times, vec![(100, 10), (101, 20)]);
    }

    #[test]
    fn test_midi_routed_and_note_callbacks_postponed() {
        let plugin = synth();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        adapter.activate().unwrap();

        run(
            &adapter,
            0.0,
            &[
                EngineEvent::midi(3, &[0x91, 60, 100]),
                EngineEvent::midi(8, &[0x81, 60, 0]),
            ],
        );
        assert_eq!(
            plugin.last_block(),
            vec![
                ReceivedEvent::Midi {
                    port: 0,
                    time: 3,
                    data: [0x91, 60, 100],
                    live: true
                },
                ReceivedEvent::Midi {
                    port: 0,
                    time: 8,
                    data: [0x81, 60, 0],
                    live: true
                },
            ]
        );
        assert!(engine.callbacks().is_empty());

        adapter.idle();
        assert_eq!(
            engine.callbacks(),
            vec![
                EngineCallback::NoteOn {
                    channel: 1,
                    note: 60,
                    velocity: 100
                },
                EngineCallback::NoteOff {
                    channel: 1,
                    note: 60
                },
            ]
        );
    }

    #[test]
    fn test_reset_synthesizes_all_sound_off() {
        let plugin = synth();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        adapter.activate().unwrap();

        adapter.set_needs_reset();
        run(&adapter, 0.0, &[]);
        assert_eq!(plugin.last_block().len(), 2 * MAX_MIDI_CHANNELS as usize);

        run(&adapter, 0.0, &[]);
        assert!(plugin.last_block().is_empty());
    }

    #[test]
    fn test_external_note_injected_next_block() {
        let plugin = synth();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        adapter.activate().unwrap();

        assert!(adapter.send_midi_single_note(0, 64, 90));
        assert!(!adapter.send_midi_single_note(16, 64, 90));
        run(&adapter, 0.0, &[]);
        assert_eq!(
            plugin.last_block(),
            vec![ReceivedEvent::Midi {
                port: 0,
                time: 0,
                data: [0x90, 64, 90],
                live: true
            }]
        );

        let plain = effect();
        let adapter = adapter_with(&plain, &engine);
        assert!(!adapter.send_midi_single_note(0, 64, 90));
    }

    #[test]
    fn test_ctrl_channel_volume_and_post_processing() {
        let plugin = effect();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        adapter.activate().unwrap();
        plugin.set_audio_mode(AudioMode::Constant(1.0));

        let volume = EngineEvent::control(
            0,
            0,
            ControlEvent::ControlChange {
                control: 0x07,
                normalized: 50.0 / 127.0,
            },
        );
        let (l, r, _) = run(&adapter, 0.0, &[volume]);
        let expected = 50.0 / 100.0;
        assert!(l.iter().chain(&r).all(|s| (*s - expected).abs() < 1e-5));

        adapter.set_volume(1.0);
        adapter.set_dry_wet(0.0);
        let (l, _, _) = run(&adapter, 0.25, &[]);
        assert!(l.iter().all(|s| (*s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_mapped_cc_drives_parameter() {
        let plugin = effect();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        adapter.activate().unwrap();
        adapter.set_parameter_mapped_control(1, 74, 2).unwrap();
        assert!(adapter.set_parameter_mapped_control(1, 200, 2).is_err());

        let cc = EngineEvent::control(
            5,
            2,
            ControlEvent::ControlChange {
                control: 74,
                normalized: 1.0,
            },
        );
        run(&adapter, 0.0, &[cc]);
        assert_eq!(
            plugin.last_block(),
            vec![ReceivedEvent::Param {
                id: 101,
                time: 5,
                value: 1.0,
                live: true
            }]
        );
    }

    #[test]
    fn test_plugin_output_fanned_out() {
        let plugin = FakePlugin::builder()
            .audio_outputs(&[2])
            .note_inputs(&[("in", NoteDialects::MIDI)])
            .note_outputs(&[("out", NoteDialects::MIDI)])
            .param(NativeParamInfo {
                flags: NativeParamFlags {
                    read_only: true,
                    ..Default::default()
                },
                ..basic_param(0)
            })
            .build();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        assert_eq!(engine.ports_of(PortKind::Event, false), vec!["events-out"]);
        adapter.activate().unwrap();
        adapter.set_parameter_mapped_control(0, 20, 0).unwrap();

        plugin.set_value(100, 0.75);
        plugin.emit(OutputEvent::Midi {
            port: 0,
            time: 7,
            data: [0x90, 48, 127],
        });
        plugin.emit(OutputEvent::Param { id: 100, value: 0.75 });
        plugin.emit(OutputEvent::Note { port: 0, key: 1 });
        let (_, _, sink) = run(&adapter, 0.0, &[]);

        assert_eq!(
            sink.events,
            vec![
                SinkEvent::Control {
                    time: 0,
                    channel: 0,
                    control: 20,
                    normalized: 0.75
                },
                SinkEvent::Midi {
                    port: 0,
                    time: 7,
                    data: vec![0x90, 48, 127]
                },
            ]
        );
        adapter.idle();
        assert_eq!(
            engine.callbacks(),
            vec![EngineCallback::ParameterValueChanged {
                index: 0,
                value: 0.75
            }]
        );
    }

    #[test]
    fn test_offline_mode_waits_for_lock() {
        let plugin = effect();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = Arc::new(adapter_with(&plugin, &engine));
        adapter.activate().unwrap();
        engine.set_offline(true);

        let guard = adapter.lock_processing();
        let worker = {
            let adapter = Arc::clone(&adapter);
            std::thread::spawn(move || run(&adapter, 0.5, &[]).0)
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(guard);
        let left = worker.join().unwrap();
        assert!(left.iter().all(|s| (*s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_inactive_param_write_flushes_on_idle() {
        let plugin = FakePlugin::builder()
            .audio_outputs(&[2])
            .params(1)
            .param_flush(true)
            .build();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        plugin.clear_calls();

        adapter.set_parameter_value(0, 0.9).unwrap();
        adapter.idle();
        assert!(plugin.calls().contains(&Call::Flush));
        assert_eq!(plugin.param_value(100), Some(0.9));

        // drained by flush, nothing left for the first block
        adapter.activate().unwrap();
        run(&adapter, 0.0, &[]);
        assert!(plugin.last_block().is_empty());
    }

    #[test]
    fn test_activate_and_deactivate_order() {
        let plugin = effect();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        plugin.clear_calls();

        adapter.activate().unwrap();
        adapter.activate().unwrap();
        adapter.deactivate();
        assert_eq!(
            plugin.calls(),
            vec![
                Call::Activate {
                    sample_rate: 48_000.0,
                    max_frames: 256
                },
                Call::StartProcessing,
                Call::StopProcessing,
                Call::Deactivate,
            ]
        );

        plugin.set_activate_fails(true);
        assert!(matches!(
            adapter.activate(),
            Err(AdapterError::ActivationFailed(_))
        ));
        assert!(!adapter.is_active());
    }

    #[test]
    fn test_restart_request_handled_on_idle() {
        let plugin = effect();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        adapter.activate().unwrap();
        plugin.clear_calls();

        adapter.host().request_restart();
        adapter.ui_idle();
        assert!(plugin.calls().is_empty());

        adapter.idle();
        let calls = plugin.calls();
        assert_eq!(calls.first(), Some(&Call::StopProcessing));
        assert!(calls.contains(&Call::StartProcessing));
        assert!(adapter.is_active());
    }

    #[test]
    fn test_ui_idle_pumps_without_main_thread_idle() {
        let plugin = effect();
        let engine = Arc::new(RecordingEngine::new());
        engine.set_idle_on_main_thread(false);
        let adapter = adapter_with(&plugin, &engine);
        plugin.clear_calls();

        adapter.host().request_callback();
        adapter.idle();
        assert!(plugin.calls().is_empty());
        adapter.ui_idle();
        assert_eq!(plugin.calls(), vec![Call::OnMainThread]);
    }

    #[test]
    fn test_latency_and_dirty_notifications() {
        let plugin = FakePlugin::builder().audio_outputs(&[2]).latency(64).build();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        assert_eq!(adapter.latency_in_frames(), 64);

        plugin.set_latency(128);
        adapter.host().latency_changed();
        adapter.host().mark_dirty();
        adapter.idle();
        assert_eq!(adapter.latency_in_frames(), 128);
        assert_eq!(
            engine.callbacks(),
            vec![
                EngineCallback::LatencyChanged { frames: 128 },
                EngineCallback::StateDirty
            ]
        );
    }

    #[test]
    fn test_chunk_round_trip() {
        let plugin = FakePlugin::builder()
            .audio_outputs(&[2])
            .params(2)
            .state(true)
            .build();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        assert!(adapter.options().contains(PluginOptions::USE_CHUNKS));

        plugin.set_state(b"preset-a");
        assert_eq!(adapter.chunk_data().unwrap(), b"preset-a");

        adapter.set_chunk_data(b"preset-b").unwrap();
        assert_eq!(plugin.state_data(), b"preset-b");
        let changed = engine
            .callbacks()
            .iter()
            .filter(|c| matches!(c, EngineCallback::ParameterValueChanged { .. }))
            .count();
        assert_eq!(changed, 2);

        assert!(matches!(
            adapter.set_chunk_data(&[]),
            Err(AdapterError::StateRestoreError(_))
        ));
        adapter.set_option(PluginOptions::USE_CHUNKS, false).unwrap();
        assert!(adapter.chunk_data().is_err());
    }

    #[test]
    fn test_chunks_unsupported_without_state() {
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&effect(), &engine);
        assert!(matches!(
            adapter.chunk_data(),
            Err(AdapterError::Unsupported(_))
        ));
    }

    #[test]
    fn test_parameter_queries() {
        let plugin = FakePlugin::builder()
            .param(NativeParamInfo {
                id: 7,
                cookie: Cookie::default(),
                name: "Cutoff".into(),
                module: "filter/env/cutoff".into(),
                min_value: 20.0,
                max_value: 20_000.0,
                default_value: 1_000.0,
                flags: NativeParamFlags {
                    automatable: true,
                    ..Default::default()
                },
            })
            .build();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);

        assert_eq!(adapter.parameter_name(0).as_deref(), Some("Cutoff"));
        assert_eq!(adapter.parameter_symbol(0).as_deref(), Some("7"));
        assert_eq!(
            adapter.parameter_group(0).as_deref(),
            Some("filter/env:filter/env")
        );
        assert_eq!(adapter.parameter_unit(0), None);
        assert_eq!(adapter.parameter_type(0), Some(ParameterType::Input));
        assert_eq!(adapter.parameter_text(0).as_deref(), Some("1000.00"));
        assert_eq!(adapter.parameter_ranges(0).map(|r| r.max), Some(20_000.0));
        assert!(adapter.parameter_name(1).is_none());
    }

    #[test]
    fn test_ui_through_adapter() {
        let plugin = FakePlugin::builder()
            .audio_outputs(&[2])
            .gui(GuiSupport {
                embedded: true,
                floating: false,
                size: (300, 200),
            })
            .build();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        assert!(adapter.hints().contains(PluginHints::HAS_CUSTOM_EMBED_UI));

        adapter.show_custom_ui(true).unwrap();
        adapter.handle_ui_closed();
        adapter.ui_idle();
        assert_eq!(
            engine.callbacks().last(),
            Some(&EngineCallback::UiStateChanged {
                state: UiState::Hidden,
                message: None
            })
        );

        let headless = effect();
        let adapter = adapter_with(&headless, &engine);
        assert!(matches!(
            adapter.show_custom_ui(true),
            Err(AdapterError::Unsupported("gui"))
        ));
    }

    #[test]
    fn test_buffer_size_change_reactivates() {
        let plugin = effect();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        adapter.activate().unwrap();
        plugin.clear_calls();

        engine.set_buffer_size(32);
        adapter.buffer_size_changed(32);
        assert_eq!(adapter.lock_processing().buffer_size(), 32);
        assert!(plugin.calls().contains(&Call::Activate {
            sample_rate: 48_000.0,
            max_frames: 32
        }));

        // blocks larger than the prepared size are refused
        let (l, _, _) = run(&adapter, 0.5, &[]);
        assert!(l.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_drop_deactivates() {
        let plugin = effect();
        let engine = Arc::new(RecordingEngine::new());
        let adapter = adapter_with(&plugin, &engine);
        adapter.activate().unwrap();
        plugin.clear_calls();

        drop(adapter);
        assert_eq!(plugin.calls(), vec![Call::StopProcessing, Call::Deactivate]);
    }
}
