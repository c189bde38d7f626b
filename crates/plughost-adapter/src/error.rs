//! Error types for the plugin adapter

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Opening,
    Version,
    Entry,
    Factory,
    Instantiation,
    Initialization,
    Activation,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStage::Opening => write!(f, "opening library"),
            LoadStage::Version => write!(f, "checking ABI version"),
            LoadStage::Entry => write!(f, "initializing entry"),
            LoadStage::Factory => write!(f, "getting factory"),
            LoadStage::Instantiation => write!(f, "creating instance"),
            LoadStage::Initialization => write!(f, "initializing instance"),
            LoadStage::Activation => write!(f, "activating"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Plugin load failed at {stage} stage: {path}\n  Reason: {reason}")]
    LoadFailed {
        path: PathBuf,
        stage: LoadStage,
        reason: String,
    },

    #[error("Plugin failed to activate: {0}")]
    ActivationFailed(String),

    #[error("Plugin is not active")]
    NotActive,

    #[error("Parameter index {index} out of range ({count} parameters)")]
    ParameterOutOfRange { index: u32, count: u32 },

    #[error("Plugin does not support {0}")]
    Unsupported(&'static str),

    #[error("Failed to save plugin state: {0}")]
    StateSaveError(String),

    #[error("Failed to restore plugin state: {0}")]
    StateRestoreError(String),

    #[error("Plugin editor error: {0}")]
    EditorError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AdapterError>;
