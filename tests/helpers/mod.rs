//! Test helpers for plughost integration tests
//!
//! Adapters are built over the fake plugin from `plughost_adapter::test_support`
//! and driven one block at a time with a recording event sink.

use plughost::adapter::host::HostHandle;
use plughost::adapter::test_support::{FakePlugin, RecordingEngine, RecordingSink};
use plughost::prelude::*;
use std::sync::Arc;

/// Block size used by every helper.
pub const TEST_FRAMES: usize = 128;

/// Adapter over a clone of `plugin`, so the test keeps a handle for inspection.
pub fn adapter_for(
    plugin: &FakePlugin,
    engine: &Arc<RecordingEngine>,
    config: &AdapterConfig,
) -> ClapAdapter {
    let engine: Arc<dyn HostEngine> = engine.clone();
    ClapAdapter::new(Box::new(plugin.clone()), engine, HostHandle::new(), config)
        .expect("adapter over fake plugin")
}

/// Output of one rendered block.
pub struct Rendered {
    pub outputs: Vec<Vec<f32>>,
    pub sink: RecordingSink,
}

/// Render one block with `channels` inputs and outputs, all inputs at `input`.
///
/// `streams[k]` feeds host event input port `k`.
pub fn render(
    adapter: &ClapAdapter,
    channels: usize,
    input: f32,
    streams: &[&[EngineEvent]],
) -> Rendered {
    let input_data = vec![vec![input; TEST_FRAMES]; channels];
    let mut output_data = vec![vec![0.0f32; TEST_FRAMES]; channels];
    let mut sink = RecordingSink::default();
    {
        let inputs: Vec<&[f32]> = input_data.iter().map(Vec::as_slice).collect();
        let mut outputs: Vec<&mut [f32]> = output_data.iter_mut().map(Vec::as_mut_slice).collect();
        let mut cv_out: [&mut [f32]; 0] = [];
        let mut audio = AudioBlock {
            audio_in: &inputs,
            audio_out: &mut outputs,
            cv_in: &[],
            cv_out: &mut cv_out,
            frames: TEST_FRAMES as u32,
        };
        let mut events = EventBlock {
            inputs: streams,
            output: &mut sink,
        };
        adapter.process(&mut audio, &mut events);
    }
    Rendered {
        outputs: output_data,
        sink,
    }
}

/// Peak absolute sample value.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
}
