//! # plughost
//!
//! Host third-party audio plugins inside a real-time engine.
//!
//! The engine implements [`HostEngine`](prelude::HostEngine) and drives each
//! loaded plugin through a [`PluginAdapter`](prelude::PluginAdapter).
//!
//! ```ignore
//! use plughost::prelude::*;
//!
//! let adapter = ClapAdapter::load(path, engine, &AdapterConfig::default())?;
//! adapter.activate()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `clap` (default) - Load CLAP bundles from disk
//! - `test-support` - Fake plugin and recording engine

/// Re-export of plughost-adapter for direct access
pub use plughost_adapter as adapter;

pub use plughost_adapter::{AdapterError, LoadStage, Result};

/// Convenience prelude for common imports
pub mod prelude {
    pub use plughost_adapter::{
        AdapterConfig, AdapterError, AudioBlock, ClapAdapter, ControlEvent, EngineCallback,
        EngineEvent, EngineOptions, EventBlock, EventSink, HostEngine, HostWindow,
        ParameterHints, PluginAdapter, PluginCategory, PluginHints, PluginMetadata,
        PluginOptions, PortId, PortKind, ProcessMode, Result, TransportInfo, UiState,
        WindowHandle,
    };
}
