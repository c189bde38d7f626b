//! Option, plugin-hint and parameter-hint bitmasks.

use serde::{Deserialize, Serialize};
use std::ops::{BitAnd, BitOr, BitOrAssign};

macro_rules! bitmask {
    ($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $flag:ident = $value:expr,)* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            pub const NONE: Self = Self(0);
            $($(#[$fmeta])* pub const $flag: Self = Self($value);)*

            pub const fn from_bits(bits: u32) -> Self {
                Self(bits)
            }

            pub const fn bits(self) -> u32 {
                self.0
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }

            pub fn set(&mut self, other: Self, enabled: bool) {
                if enabled {
                    self.insert(other);
                } else {
                    self.remove(other);
                }
            }
        }

        impl BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;
            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }
    };
}

bitmask! {
    /// Per-instance behavior switches. Only options reported by
    /// `options_available()` can be turned on.
    PluginOptions {
        FIXED_BUFFERS = 0x001,
        FORCE_STEREO = 0x002,
        MAP_PROGRAM_CHANGES = 0x004,
        USE_CHUNKS = 0x008,
        SEND_CONTROL_CHANGES = 0x010,
        SEND_CHANNEL_PRESSURE = 0x020,
        SEND_NOTE_AFTERTOUCH = 0x040,
        SEND_PITCHBEND = 0x080,
        SEND_ALL_SOUND_OFF = 0x100,
        SEND_PROGRAM_CHANGES = 0x200,
        SKIP_SENDING_NOTES = 0x400,
    }
}

impl PluginOptions {
    /// What a freshly added plugin asks for.
    pub const DEFAULT_REQUEST: Self = Self(
        Self::FIXED_BUFFERS.0
            | Self::USE_CHUNKS.0
            | Self::SEND_CHANNEL_PRESSURE.0
            | Self::SEND_NOTE_AFTERTOUCH.0
            | Self::SEND_PITCHBEND.0
            | Self::SEND_ALL_SOUND_OFF.0,
    );

    /// Options that only make sense when some note port speaks raw MIDI.
    pub const MIDI_DIALECT: Self = Self(
        Self::SEND_CONTROL_CHANGES.0
            | Self::SEND_CHANNEL_PRESSURE.0
            | Self::SEND_NOTE_AFTERTOUCH.0
            | Self::SEND_PITCHBEND.0
            | Self::SEND_ALL_SOUND_OFF.0
            | Self::SEND_PROGRAM_CHANGES.0
            | Self::SKIP_SENDING_NOTES.0,
    );
}

bitmask! {
    PluginHints {
        IS_SYNTH = 0x004,
        HAS_CUSTOM_UI = 0x008,
        CAN_DRYWET = 0x010,
        CAN_VOLUME = 0x020,
        CAN_BALANCE = 0x040,
        NEEDS_FIXED_BUFFERS = 0x100,
        NEEDS_UI_MAIN_THREAD = 0x200,
        HAS_CUSTOM_EMBED_UI = 0x1000,
    }
}

bitmask! {
    ParameterHints {
        IS_BOOLEAN = 0x001,
        IS_INTEGER = 0x002,
        IS_ENABLED = 0x010,
        IS_AUTOMATABLE = 0x020,
        IS_READ_ONLY = 0x040,
        USES_CUSTOM_TEXT = 0x400,
        CAN_BE_CV_CONTROLLED = 0x800,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmask_ops() {
        let mut options = PluginOptions::FIXED_BUFFERS | PluginOptions::USE_CHUNKS;
        assert!(options.contains(PluginOptions::USE_CHUNKS));
        assert!(!options.contains(PluginOptions::SEND_PITCHBEND));

        options.set(PluginOptions::SEND_PITCHBEND, true);
        options.remove(PluginOptions::USE_CHUNKS);
        assert_eq!(options.bits(), 0x001 | 0x080);
        assert!(options.intersects(PluginOptions::MIDI_DIALECT));
    }

    #[test]
    fn test_default_request_is_subset_of_midi_and_chunks() {
        let allowed =
            PluginOptions::MIDI_DIALECT | PluginOptions::USE_CHUNKS | PluginOptions::FIXED_BUFFERS;
        assert!(allowed.contains(PluginOptions::DEFAULT_REQUEST));
        assert!(!PluginOptions::DEFAULT_REQUEST.contains(PluginOptions::SKIP_SENDING_NOTES));
    }

    #[test]
    fn test_serde_is_plain_integer() {
        let hints = PluginHints::CAN_VOLUME | PluginHints::CAN_BALANCE;
        assert_eq!(serde_json::to_string(&hints).unwrap(), "96");
        let back: PluginHints = serde_json::from_str("96").unwrap();
        assert_eq!(back, hints);
    }
}
