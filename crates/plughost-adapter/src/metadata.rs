//! Static plugin description
//!
//! Filled from the native descriptor at load time and shared with the frontend.

use serde::{Deserialize, Serialize};

/// Plugin ABI family. Every variant shares the `PluginAdapter` contract;
/// this crate ships the CLAP one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PluginFormat {
    Internal,
    Ladspa,
    Dssi,
    Lv2,
    Vst2,
    Vst3,
    Au,
    #[default]
    Clap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PluginCategory {
    Synth,
    Delay,
    Eq,
    Filter,
    Distortion,
    Dynamics,
    Modulator,
    Utility,
    #[default]
    Other,
}

impl PluginCategory {
    /// Map CLAP feature strings to a category; first match wins in feature order
    /// after instruments.
    pub fn from_features<S: AsRef<str>>(features: &[S]) -> Self {
        if contains_instrument(features) {
            return PluginCategory::Synth;
        }
        for feature in features {
            let category = match feature.as_ref() {
                "delay" | "reverb" => PluginCategory::Delay,
                "equalizer" => PluginCategory::Eq,
                "filter" => PluginCategory::Filter,
                "distortion" => PluginCategory::Distortion,
                "compressor" | "limiter" | "expander" | "gate" | "transient-shaper" => {
                    PluginCategory::Dynamics
                }
                "chorus" | "flanger" | "phaser" | "tremolo" | "glitch" | "granular" => {
                    PluginCategory::Modulator
                }
                "utility" | "analyzer" | "mixing" | "mastering" | "mono" | "stereo" => {
                    PluginCategory::Utility
                }
                _ => continue,
            };
            return category;
        }
        PluginCategory::Other
    }
}

pub fn contains_instrument<S: AsRef<str>>(features: &[S]) -> bool {
    features.iter().any(|f| f.as_ref() == "instrument")
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Unique plugin id, e.g. `org.example.reverb`
    pub id: String,

    pub name: String,

    pub vendor: String,

    pub version: String,

    #[serde(default)]
    pub description: String,

    /// CLAP feature strings as reported by the descriptor
    #[serde(default)]
    pub features: Vec<String>,

    #[serde(default)]
    pub format: PluginFormat,

    /// Library the instance was created from
    #[serde(default)]
    pub filename: String,
}

impl PluginMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            vendor: String::new(),
            version: "1.0.0".to_string(),
            description: String::new(),
            features: Vec::new(),
            format: PluginFormat::Clap,
            filename: String::new(),
        }
    }

    pub fn vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn category(&self) -> PluginCategory {
        PluginCategory::from_features(&self.features)
    }

    pub fn is_instrument(&self) -> bool {
        contains_instrument(&self.features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_features() {
        assert_eq!(
            PluginCategory::from_features(&["audio-effect", "stereo", "reverb"]),
            PluginCategory::Utility
        );
        assert_eq!(
            PluginCategory::from_features(&["audio-effect", "compressor"]),
            PluginCategory::Dynamics
        );
        assert_eq!(
            PluginCategory::from_features(&["audio-effect", "reverb", "instrument"]),
            PluginCategory::Synth
        );
        assert_eq!(
            PluginCategory::from_features::<&str>(&[]),
            PluginCategory::Other
        );
    }

    #[test]
    fn test_metadata_builder() {
        let meta = PluginMetadata::new("org.example.synth", "Example Synth")
            .vendor("Example")
            .features(["instrument", "synthesizer"]);
        assert!(meta.is_instrument());
        assert_eq!(meta.category(), PluginCategory::Synth);
        assert_eq!(meta.format, PluginFormat::Clap);
    }

    #[test]
    fn test_metadata_serde_roundtrip() {
        let meta = PluginMetadata::new("org.example.delay", "Tape Delay")
            .vendor("TestCo")
            .features(["audio-effect", "delay"])
            .filename("/usr/lib/clap/delay.clap");

        let json = serde_json::to_string(&meta).unwrap();
        let decoded: PluginMetadata = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.name, "Tape Delay");
        assert_eq!(decoded.category(), PluginCategory::Delay);
        assert_eq!(decoded.filename, "/usr/lib/clap/delay.clap");
    }

    #[test]
    fn test_metadata_serde_defaults_missing_fields() {
        let json = r#"{"id":"old","name":"Old Plugin","vendor":"","version":"1.0.0"}"#;
        let decoded: PluginMetadata = serde_json::from_str(json).unwrap();
        assert!(decoded.features.is_empty());
        assert_eq!(decoded.format, PluginFormat::Clap);
    }
}
