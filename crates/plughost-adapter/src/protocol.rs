//! Host-side event and transport model consumed by the adapter.

use serde::{Deserialize, Serialize};

pub use crate::metadata::PluginMetadata;

/// Event slots reserved per native note port, per block.
pub const MAX_EVENTS_PER_PORT: usize = 512;
pub const MAX_MIDI_CHANNELS: u8 = 16;
pub const MAX_MIDI_NOTE: u8 = 128;
pub const MAX_MIDI_VALUE: u16 = 128;
/// Per-descriptor poll iterations in one idle pass.
pub const MAX_POSIX_FD_POLLS: usize = 50;
pub const POSTPONED_EVENT_CAPACITY: usize = 512;
pub const EXTERNAL_NOTE_CAPACITY: usize = 512;

pub(crate) mod midi {
    pub const STATUS_NOTE_OFF: u8 = 0x80;
    pub const STATUS_NOTE_ON: u8 = 0x90;
    pub const STATUS_POLYPHONIC_AFTERTOUCH: u8 = 0xA0;
    pub const STATUS_CONTROL_CHANGE: u8 = 0xB0;
    pub const STATUS_PROGRAM_CHANGE: u8 = 0xC0;
    pub const STATUS_CHANNEL_PRESSURE: u8 = 0xD0;
    pub const STATUS_PITCH_WHEEL: u8 = 0xE0;
    pub const CHANNEL_BITS: u8 = 0x0F;

    pub const CONTROL_BANK_SELECT: u8 = 0x00;
    pub const CONTROL_BREATH: u16 = 0x02;
    pub const CONTROL_CHANNEL_VOLUME: u16 = 0x07;
    pub const CONTROL_BALANCE: u16 = 0x08;
    pub const CONTROL_ALL_SOUND_OFF: u8 = 0x78;
    pub const CONTROL_ALL_NOTES_OFF: u8 = 0x7B;

    pub fn status(byte: u8) -> u8 {
        if byte >= 0xF0 {
            byte
        } else {
            byte & 0xF0
        }
    }
}

/// Raw MIDI message of at most four bytes, channel included in the status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiData {
    pub data: [u8; 4],
    pub size: u8,
}

impl MidiData {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = [0u8; 4];
        let size = bytes.len().min(4);
        data[..size].copy_from_slice(&bytes[..size]);
        Self {
            data,
            size: size as u8,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.size as usize]
    }

    pub fn status(&self) -> u8 {
        midi::status(self.data[0])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ControlEvent {
    /// MIDI-style controller, `control` < 128 for real CCs.
    ControlChange { control: u16, normalized: f32 },
    MidiBank(u16),
    MidiProgram(u16),
    AllSoundOff,
    AllNotesOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EngineEventKind {
    /// Automation addressed by host parameter index, not tied to a MIDI channel.
    Parameter { index: u32, normalized: f32 },
    Control(ControlEvent),
    Midi(MidiData),
}

/// One time-stamped event from a host event port.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Frame offset inside the current block.
    pub time: u32,
    pub channel: u8,
    pub kind: EngineEventKind,
}

impl EngineEvent {
    pub fn midi(time: u32, bytes: &[u8]) -> Self {
        let data = MidiData::from_bytes(bytes);
        Self {
            time,
            channel: data.data[0] & midi::CHANNEL_BITS,
            kind: EngineEventKind::Midi(data),
        }
    }

    pub fn parameter(time: u32, index: u32, normalized: f32) -> Self {
        Self {
            time,
            channel: 0,
            kind: EngineEventKind::Parameter { index, normalized },
        }
    }

    pub fn control(time: u32, channel: u8, event: ControlEvent) -> Self {
        Self {
            time,
            channel,
            kind: EngineEventKind::Control(event),
        }
    }
}

/// Musical position, valid only when the engine knows it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarBeatTick {
    /// 1-based.
    pub bar: i32,
    /// 1-based.
    pub beat: i32,
    pub tick: f64,
    pub beats_per_bar: f32,
    pub beat_type: f32,
    pub beats_per_minute: f64,
}

impl Default for BarBeatTick {
    fn default() -> Self {
        Self {
            bar: 1,
            beat: 1,
            tick: 0.0,
            beats_per_bar: 4.0,
            beat_type: 4.0,
            beats_per_minute: 120.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportInfo {
    pub playing: bool,
    pub frame: u64,
    pub bbt: Option<BarBeatTick>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_data_from_bytes() {
        let data = MidiData::from_bytes(&[0x93, 60, 100]);
        assert_eq!(data.as_bytes(), &[0x93, 60, 100]);
        assert_eq!(data.status(), midi::STATUS_NOTE_ON);

        let sysex = MidiData::from_bytes(&[0xF0, 1, 2, 3, 4, 0xF7]);
        assert_eq!(sysex.size, 4);
        assert_eq!(sysex.status(), 0xF0);
    }

    #[test]
    fn test_engine_event_midi_takes_channel_from_status() {
        let event = EngineEvent::midi(12, &[0xB5, 7, 64]);
        assert_eq!(event.time, 12);
        assert_eq!(event.channel, 5);
        assert!(matches!(event.kind, EngineEventKind::Midi(_)));
    }

    #[test]
    fn test_transport_default_has_no_bbt() {
        let info = TransportInfo::default();
        assert!(!info.playing);
        assert_eq!(info.frame, 0);
        assert!(info.bbt.is_none());
        assert_eq!(BarBeatTick::default().beats_per_minute, 120.0);
    }
}
