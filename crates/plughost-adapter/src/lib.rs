//! Per-instance plugin adapter engine
//!
//! Wraps one loaded CLAP plugin behind a host-neutral [`PluginAdapter`] so a
//! host engine can drive it like any other processor: ports, parameters,
//! MIDI translation, state chunks and custom UI, all within the host's
//! real-time constraints.
//!
//! ## Threads
//!
//! - **Audio thread**: [`PluginAdapter::process`], RT parameter writes
//! - **Main thread**: everything else, including [`PluginAdapter::idle`] which
//!   services restart/flush/callback requests raised by the plugin
//!
//! ## Usage
//!
//! ```ignore
//! use plughost_adapter::{AdapterConfig, ClapAdapter, PluginAdapter};
//!
//! let adapter = ClapAdapter::load("/usr/lib/clap/Synth.clap".as_ref(), engine, &AdapterConfig::default())?;
//! adapter.activate();
//!
//! // audio thread
//! adapter.process(&mut audio, &mut events);
//!
//! // main thread, periodically
//! adapter.idle();
//! ```

pub mod error;
pub use error::{AdapterError, LoadStage, Result};

mod metadata;
pub use metadata::{contains_instrument, PluginCategory, PluginFormat, PluginMetadata};

pub mod config;
pub use config::{AdapterConfig, EngineOptions, ProcessMode};

pub mod options;
pub use options::{ParameterHints, PluginHints, PluginOptions};

pub mod protocol;
pub use protocol::{BarBeatTick, ControlEvent, EngineEvent, EngineEventKind, MidiData, TransportInfo};

pub mod engine;
pub use engine::{
    EngineCallback, EventSink, HostEngine, HostWindow, PortId, PortKind, UiState, WindowHandle,
};

pub mod instance;
pub use instance::{NativeGui, NativeInstance};

pub mod events;
pub mod host;
pub mod params;
pub use params::{ParameterRanges, ParameterType};

pub mod topology;
pub use topology::PortTopology;

pub mod process;
pub use process::{AudioBlock, EventBlock};

mod slow_ops;
mod ui;

mod adapter;
pub use adapter::{ClapAdapter, PluginAdapter};

#[cfg(feature = "clap")]
pub mod clap_loader;

/// Fake plugin, recording engine and sink for exercising adapters without a bundle.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
