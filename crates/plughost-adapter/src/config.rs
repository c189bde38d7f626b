//! Host-wide and per-instance configuration.

use crate::options::PluginOptions;
use crate::Result;
use serde::{Deserialize, Serialize};

/// How the engine exposes plugin clients; decides port name prefixing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessMode {
    /// All plugins share one engine client, so ports carry a `name:` prefix.
    SingleClient,
    /// One engine client per plugin.
    #[default]
    MultipleClients,
    ContinuousRack,
    Patchbay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOptions {
    #[serde(default)]
    pub process_mode: ProcessMode,
    pub max_port_name_size: usize,
    /// Scale handed to plugin UIs; 0 leaves the plugin's own choice.
    pub ui_scale: f64,
    /// Transient parent for floating plugin windows.
    #[serde(default)]
    pub frontend_win_id: u64,
    /// Unused by in-process CLAP, kept for the other formats.
    #[serde(default)]
    pub prefer_ui_bridges: bool,
    #[serde(default)]
    pub plugins_are_standalone: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            process_mode: ProcessMode::MultipleClients,
            max_port_name_size: 255,
            ui_scale: 1.0,
            frontend_win_id: 0,
            prefer_ui_bridges: false,
            plugins_are_standalone: false,
        }
    }
}

impl EngineOptions {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Host-visible port name, prefixed and truncated the way the engine expects.
    pub fn port_name(&self, plugin_name: &str, base: &str) -> String {
        let mut name = match self.process_mode {
            ProcessMode::SingleClient => format!("{plugin_name}:{base}"),
            _ => base.to_string(),
        };
        if name.len() > self.max_port_name_size {
            let mut cut = self.max_port_name_size;
            while !name.is_char_boundary(cut) {
                cut -= 1;
            }
            name.truncate(cut);
        }
        name
    }
}

/// Per-instance load settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Display name; falls back to the descriptor name.
    #[serde(default)]
    pub name: Option<String>,
    /// Plugin id inside a multi-plugin bundle; `None` picks the first one.
    #[serde(default)]
    pub plugin_id: Option<String>,
    /// Requested options, filtered against what the plugin supports at load.
    pub options: PluginOptions,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            name: None,
            plugin_id: None,
            options: PluginOptions::DEFAULT_REQUEST,
        }
    }
}
