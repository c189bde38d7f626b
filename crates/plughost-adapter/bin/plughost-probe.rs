//! Headless plugin probe
//!
//! Loads a CLAP bundle against a minimal engine, logs its metadata, ports
//! and parameters, then renders one block and reports output levels.
//!
//! Usage: `plughost-probe <bundle.clap> [plugin-id] [sample-rate] [frames]`

use parking_lot::Mutex;
use plughost_adapter::{
    AdapterConfig, ClapAdapter, EngineCallback, EngineEvent, EngineOptions, EventSink,
    HostEngine, HostWindow, PluginAdapter, PluginHints, PortId, PortKind, Result,
    TransportInfo,
};
use plughost_adapter::{AudioBlock, EventBlock};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

struct ProbePort {
    kind: PortKind,
    name: String,
    is_input: bool,
}

struct ProbeEngine {
    sample_rate: f64,
    frames: u32,
    ports: Mutex<Vec<ProbePort>>,
}

impl ProbeEngine {
    fn count(&self, kind: PortKind, is_input: bool) -> usize {
        self.ports
            .lock()
            .iter()
            .filter(|p| p.kind == kind && p.is_input == is_input)
            .count()
    }
}

impl HostEngine for ProbeEngine {
    fn add_port(&self, kind: PortKind, name: &str, is_input: bool, _index: u32) -> PortId {
        let mut ports = self.ports.lock();
        ports.push(ProbePort {
            kind,
            name: name.to_string(),
            is_input,
        });
        PortId(ports.len() as u32 - 1)
    }

    fn clear_ports(&self) {
        self.ports.lock().clear();
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn buffer_size(&self) -> u32 {
        self.frames
    }

    fn is_offline(&self) -> bool {
        true
    }

    fn options(&self) -> EngineOptions {
        EngineOptions::default()
    }

    fn transport(&self) -> TransportInfo {
        TransportInfo::default()
    }

    fn has_idle_on_main_thread(&self) -> bool {
        true
    }

    fn callback(&self, event: EngineCallback) {
        info!(?event, "engine callback");
    }

    fn create_window(&self, _title: &str, _resizable: bool) -> Option<Box<dyn HostWindow>> {
        None
    }
}

#[derive(Default)]
struct CountingSink {
    midi: usize,
    controls: usize,
}

impl EventSink for CountingSink {
    fn write_midi(&mut self, _port: usize, _time: u32, _data: &[u8]) -> bool {
        self.midi += 1;
        true
    }

    fn write_control(&mut self, _time: u32, _channel: u8, _control: u16, _normalized: f32) -> bool {
        self.controls += 1;
        true
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = env::args().skip(1);
    let Some(path) = args.next().map(PathBuf::from) else {
        error!("usage: plughost-probe <bundle.clap> [plugin-id] [sample-rate] [frames]");
        std::process::exit(2);
    };
    let plugin_id = args.next().filter(|id| id != "-");
    let sample_rate = args.next().and_then(|s| s.parse().ok()).unwrap_or(48_000.0);
    let frames: u32 = args.next().and_then(|s| s.parse().ok()).unwrap_or(512);

    let engine = Arc::new(ProbeEngine {
        sample_rate,
        frames,
        ports: Mutex::new(Vec::new()),
    });
    let config = AdapterConfig {
        plugin_id,
        ..AdapterConfig::default()
    };
    let adapter = ClapAdapter::load(&path, engine.clone(), &config)?;

    let metadata = adapter.metadata();
    info!(
        id = %metadata.id,
        name = %metadata.name,
        vendor = %metadata.vendor,
        version = %metadata.version,
        category = ?adapter.category(),
        "plugin loaded"
    );
    info!(
        hints = format_args!("{:#06x}", adapter.hints().bits()),
        options = format_args!("{:#06x}", adapter.options().bits()),
        available = format_args!("{:#06x}", adapter.options_available().bits()),
        latency = adapter.latency_in_frames(),
        "capabilities"
    );

    for port in engine.ports.lock().iter() {
        info!(kind = ?port.kind, is_input = port.is_input, name = %port.name, "port");
    }
    for index in 0..adapter.parameter_count() {
        let name = adapter.parameter_name(index).unwrap_or_default();
        let text = adapter.parameter_text(index).unwrap_or_default();
        info!(index, name = %name, value = %text, "parameter");
    }

    adapter.activate()?;

    let audio_ins = engine.count(PortKind::Audio, true);
    let audio_outs = engine.count(PortKind::Audio, false);
    let cv_outs = engine.count(PortKind::Cv, false);
    let len = frames as usize;
    let input_data = vec![vec![0.0f32; len]; audio_ins];
    let mut output_data = vec![vec![0.0f32; len]; audio_outs];
    let mut cv_data = vec![vec![0.0f32; len]; cv_outs];
    let inputs: Vec<&[f32]> = input_data.iter().map(Vec::as_slice).collect();
    let mut outputs: Vec<&mut [f32]> = output_data.iter_mut().map(Vec::as_mut_slice).collect();
    let mut cv_out: Vec<&mut [f32]> = cv_data.iter_mut().map(Vec::as_mut_slice).collect();

    let synth = adapter.hints().contains(PluginHints::IS_SYNTH);
    let note = [EngineEvent::midi(0, &[0x90, 60, 100])];
    let stream: &[EngineEvent] = if synth { &note } else { &[] };
    let streams = [stream];
    let mut sink = CountingSink::default();

    {
        let mut audio = AudioBlock {
            audio_in: &inputs,
            audio_out: &mut outputs,
            cv_in: &[],
            cv_out: &mut cv_out,
            frames,
        };
        let mut events = EventBlock {
            inputs: &streams,
            output: &mut sink,
        };
        adapter.process(&mut audio, &mut events);
    }
    adapter.idle();

    for (channel, samples) in output_data.iter().enumerate() {
        let peak = samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
        info!(channel, peak, "rendered");
    }
    info!(midi = sink.midi, control = sink.controls, "events out");
    if adapter.dropped_events() > 0 {
        warn!(dropped = adapter.dropped_events(), "events dropped while rendering");
    }

    adapter.deactivate();
    Ok(())
}
