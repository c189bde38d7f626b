//! Native event arena and host event translation.
//!
//! [`EventList`] is a fixed-capacity arena sized at `reload()`; pushing past
//! capacity drops the event instead of allocating. [`EventTranslator`] turns the
//! host's per-block streams into native events, honoring the option bitmask and
//! each note port's dialect.

use crate::instance::{Cookie, NoteDialects};
use crate::options::PluginOptions;
use crate::protocol::{midi, ControlEvent, EngineEvent, MidiData, MAX_MIDI_CHANNELS, MAX_MIDI_NOTE};
use clap_sys::events::{
    clap_event_header, clap_event_midi, clap_event_note, clap_event_param_value,
    CLAP_CORE_EVENT_SPACE_ID, CLAP_EVENT_IS_LIVE, CLAP_EVENT_MIDI, CLAP_EVENT_NOTE_OFF,
    CLAP_EVENT_NOTE_ON, CLAP_EVENT_PARAM_VALUE,
};
use smallvec::SmallVec;
use std::mem::size_of;

/// One event in native layout. Every variant starts with its `clap_event_header`,
/// so a header pointer doubles as a pointer to the whole event.
pub enum NativeEvent {
    Note(clap_event_note),
    Midi(clap_event_midi),
    ParamValue(clap_event_param_value),
}

// Param cookies are opaque and only echoed back to the plugin.
unsafe impl Send for NativeEvent {}
unsafe impl Sync for NativeEvent {}

fn header(size: usize, time: u32, type_: u16, live: bool) -> clap_event_header {
    clap_event_header {
        size: size as u32,
        time,
        space_id: CLAP_CORE_EVENT_SPACE_ID,
        type_,
        flags: if live { CLAP_EVENT_IS_LIVE } else { 0 },
    }
}

impl NativeEvent {
    /// Structured note; velocity 0 becomes a note-off.
    pub fn note(live: bool, port: i16, time: u32, channel: u8, key: u8, velocity: u8) -> Self {
        let type_ = if velocity > 0 {
            CLAP_EVENT_NOTE_ON
        } else {
            CLAP_EVENT_NOTE_OFF
        };
        NativeEvent::Note(clap_event_note {
            header: header(size_of::<clap_event_note>(), time, type_, live),
            note_id: -1,
            port_index: port,
            channel: channel as i16,
            key: key as i16,
            velocity: f64::from(velocity) / 127.0,
        })
    }

    pub fn midi(live: bool, port: u16, time: u32, data: [u8; 3]) -> Self {
        NativeEvent::Midi(clap_event_midi {
            header: header(size_of::<clap_event_midi>(), time, CLAP_EVENT_MIDI, live),
            port_index: port,
            data,
        })
    }

    pub fn param_value(live: bool, time: u32, param_id: u32, cookie: Cookie, value: f64) -> Self {
        NativeEvent::ParamValue(clap_event_param_value {
            header: header(
                size_of::<clap_event_param_value>(),
                time,
                CLAP_EVENT_PARAM_VALUE,
                live,
            ),
            param_id,
            cookie: cookie.0,
            note_id: -1,
            port_index: -1,
            channel: -1,
            key: -1,
            value,
        })
    }

    pub fn header(&self) -> &clap_event_header {
        match self {
            NativeEvent::Note(e) => &e.header,
            NativeEvent::Midi(e) => &e.header,
            NativeEvent::ParamValue(e) => &e.header,
        }
    }

    pub fn time(&self) -> u32 {
        self.header().time
    }

    pub fn is_live(&self) -> bool {
        self.header().flags & CLAP_EVENT_IS_LIVE != 0
    }

    /// Copy a plugin-provided event of a known core type.
    ///
    /// # Safety
    /// `header` must point to a complete event of the size it declares.
    pub unsafe fn from_header(header: *const clap_event_header) -> Option<Self> {
        if header.is_null() {
            return None;
        }
        let h = &*header;
        if h.space_id != CLAP_CORE_EVENT_SPACE_ID {
            return None;
        }
        match h.type_ {
            CLAP_EVENT_NOTE_ON | CLAP_EVENT_NOTE_OFF
                if h.size as usize >= size_of::<clap_event_note>() =>
            {
                Some(NativeEvent::Note(std::ptr::read(
                    header as *const clap_event_note,
                )))
            }
            CLAP_EVENT_MIDI if h.size as usize >= size_of::<clap_event_midi>() => Some(
                NativeEvent::Midi(std::ptr::read(header as *const clap_event_midi)),
            ),
            CLAP_EVENT_PARAM_VALUE if h.size as usize >= size_of::<clap_event_param_value>() => {
                Some(NativeEvent::ParamValue(std::ptr::read(
                    header as *const clap_event_param_value,
                )))
            }
            _ => None,
        }
    }
}

/// Fixed-capacity event arena, reused across blocks.
pub struct EventList {
    events: Vec<NativeEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Worst-case per-block size: two events per parameter plus a full
    /// port's worth of MIDI per note port.
    pub fn capacity_for(param_count: usize, port_count: usize) -> usize {
        param_count * 2 + crate::protocol::MAX_EVENTS_PER_PORT * port_count.max(1)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Events lost to a full arena since the list was created.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn get(&self, index: usize) -> Option<&NativeEvent> {
        self.events.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NativeEvent> {
        self.events.iter()
    }

    /// Never reallocates: the backing storage was reserved up front.
    pub fn push(&mut self, event: NativeEvent) -> bool {
        if self.is_full() {
            self.dropped += 1;
            tracing::trace!(capacity = self.capacity, "event list full, dropping event");
            return false;
        }
        self.events.push(event);
        true
    }

    /// Stable in-place sort by frame offset. Lists are almost always already
    /// ordered, so this is a no-op pass in practice.
    pub fn sort_by_time(&mut self) {
        for i in 1..self.events.len() {
            let time = self.events[i].time();
            let mut j = i;
            while j > 0 && self.events[j - 1].time() > time {
                j -= 1;
            }
            if j != i {
                self.events[j..=i].rotate_right(1);
            }
        }
    }

    /// Output-side push: only parameter values and raw MIDI are kept.
    pub fn try_push_output(&mut self, event: NativeEvent) -> bool {
        match event {
            NativeEvent::ParamValue(_) | NativeEvent::Midi(_) => self.push(event),
            NativeEvent::Note(_) => false,
        }
    }
}

/// Per-port feed data decided at `reload()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPortFeed {
    pub native_index: u16,
    pub dialects: NoteDialects,
}

/// Note activity worth reporting to UI keyboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteActivity {
    On { channel: u8, note: u8, velocity: u8 },
    Off { channel: u8, note: u8 },
}

/// Per-block translation context.
pub struct EventTranslator<'a> {
    pub options: PluginOptions,
    pub ports: &'a [EventPortFeed],
}

impl EventTranslator<'_> {
    /// Note/sound-off burst for a transport reset.
    ///
    /// With `SEND_ALL_SOUND_OFF`, each MIDI-capable port gets all-notes-off and
    /// all-sound-off on every channel; otherwise every key is released on the
    /// control channel, in each port's own dialect.
    pub fn synthesize_reset(&self, list: &mut EventList, ctrl_channel: Option<u8>) {
        for port in self.ports {
            if self.options.contains(PluginOptions::SEND_ALL_SOUND_OFF) && port.dialects.supports_midi()
            {
                for control in [midi::CONTROL_ALL_NOTES_OFF, midi::CONTROL_ALL_SOUND_OFF] {
                    for channel in 0..MAX_MIDI_CHANNELS {
                        let data = [midi::STATUS_CONTROL_CHANGE | channel, control, 0];
                        list.push(NativeEvent::midi(false, port.native_index, 0, data));
                    }
                }
            } else if let Some(channel) = ctrl_channel {
                for key in 0..MAX_MIDI_NOTE {
                    let event = if port.dialects.supports_midi() {
                        NativeEvent::midi(
                            false,
                            port.native_index,
                            0,
                            [midi::STATUS_NOTE_OFF | channel, key, 0],
                        )
                    } else {
                        NativeEvent::note(false, port.native_index as i16, 0, channel, key, 0)
                    };
                    list.push(event);
                }
            }
        }
    }

    /// Note from a UI keyboard or other non-stream source, injected at frame 0
    /// on the first note port.
    pub fn external_note(&self, list: &mut EventList, channel: u8, note: u8, velocity: u8) {
        let Some(port) = self.ports.first() else {
            return;
        };
        let channel = channel & midi::CHANNEL_BITS;
        if port.dialects.supports_midi() {
            let status = if velocity > 0 {
                midi::STATUS_NOTE_ON
            } else {
                midi::STATUS_NOTE_OFF
            };
            list.push(NativeEvent::midi(
                true,
                port.native_index,
                0,
                [status | channel, note, velocity],
            ));
        } else {
            list.push(NativeEvent::note(
                true,
                port.native_index as i16,
                0,
                channel,
                note,
                velocity,
            ));
        }
    }

    /// Raw MIDI from host port stream `port` (index into the note-port feeds).
    ///
    /// Notes use the structured form on ports without the MIDI dialect; a port
    /// never receives both encodings.
    pub fn midi(
        &self,
        list: &mut EventList,
        port: usize,
        time: u32,
        channel: u8,
        data: &MidiData,
    ) -> Option<NoteActivity> {
        if data.size == 0 || data.size > 3 {
            return None;
        }
        let feed = self.ports.get(port)?;
        let status = data.status();
        let channel = channel & midi::CHANNEL_BITS;
        let is_note = status == midi::STATUS_NOTE_ON || status == midi::STATUS_NOTE_OFF;

        if is_note && self.options.contains(PluginOptions::SKIP_SENDING_NOTES) {
            return None;
        }

        if feed.dialects.supports_midi() {
            let gate = match status {
                midi::STATUS_CHANNEL_PRESSURE => Some(PluginOptions::SEND_CHANNEL_PRESSURE),
                midi::STATUS_CONTROL_CHANGE => Some(PluginOptions::SEND_CONTROL_CHANGES),
                midi::STATUS_POLYPHONIC_AFTERTOUCH => Some(PluginOptions::SEND_NOTE_AFTERTOUCH),
                midi::STATUS_PITCH_WHEEL => Some(PluginOptions::SEND_PITCHBEND),
                _ => None,
            };
            if let Some(option) = gate {
                if !self.options.contains(option) {
                    return None;
                }
            }
            let mut bytes = [status | channel, 0, 0];
            if data.size >= 2 {
                bytes[1] = data.data[1];
            }
            if data.size >= 3 {
                bytes[2] = data.data[2];
            }
            list.push(NativeEvent::midi(true, feed.native_index, time, bytes));
        } else if is_note {
            let velocity = if status == midi::STATUS_NOTE_ON {
                data.data[2]
            } else {
                0
            };
            list.push(NativeEvent::note(
                true,
                feed.native_index as i16,
                time,
                channel,
                data.data[1],
                velocity,
            ));
        } else {
            return None;
        }

        match status {
            midi::STATUS_NOTE_ON if data.data[2] != 0 => Some(NoteActivity::On {
                channel,
                note: data.data[1],
                velocity: data.data[2],
            }),
            midi::STATUS_NOTE_ON | midi::STATUS_NOTE_OFF => Some(NoteActivity::Off {
                channel,
                note: data.data[1],
            }),
            _ => None,
        }
    }

    /// Control events that become raw MIDI on the default note port.
    pub fn control(&self, list: &mut EventList, time: u32, channel: u8, event: &ControlEvent) {
        let Some(port) = self.ports.first().filter(|p| p.dialects.supports_midi()) else {
            return;
        };
        let channel = channel & midi::CHANNEL_BITS;
        let data = match *event {
            ControlEvent::ControlChange {
                control,
                normalized,
            } if self.options.contains(PluginOptions::SEND_CONTROL_CHANGES)
                && control < crate::protocol::MAX_MIDI_VALUE =>
            {
                [
                    midi::STATUS_CONTROL_CHANGE | channel,
                    control as u8,
                    (normalized * 127.0 + 0.5) as u8,
                ]
            }
            ControlEvent::MidiBank(bank)
                if self.options.contains(PluginOptions::SEND_PROGRAM_CHANGES) =>
            {
                [
                    midi::STATUS_CONTROL_CHANGE | channel,
                    midi::CONTROL_BANK_SELECT,
                    bank as u8,
                ]
            }
            ControlEvent::MidiProgram(program)
                if self.options.contains(PluginOptions::SEND_PROGRAM_CHANGES) =>
            {
                [midi::STATUS_PROGRAM_CHANGE | channel, program as u8, 0]
            }
            ControlEvent::AllSoundOff if self.options.contains(PluginOptions::SEND_ALL_SOUND_OFF) => {
                [
                    midi::STATUS_CONTROL_CHANGE | channel,
                    midi::CONTROL_ALL_SOUND_OFF,
                    0,
                ]
            }
            ControlEvent::AllNotesOff if self.options.contains(PluginOptions::SEND_ALL_SOUND_OFF) => {
                [
                    midi::STATUS_CONTROL_CHANGE | channel,
                    midi::CONTROL_ALL_NOTES_OFF,
                    0,
                ]
            }
            _ => return,
        };
        list.push(NativeEvent::midi(true, port.native_index, time, data));
    }
}

/// Merges several host event streams into one non-decreasing sequence.
///
/// Ties go to the lower stream index; order inside a stream is kept. Frame
/// offsets that go backwards within a stream are clamped to the previous one.
pub struct EventMerger {
    cursors: SmallVec<[usize; 4]>,
    last_time: SmallVec<[u32; 4]>,
}

impl EventMerger {
    pub fn new(streams: usize) -> Self {
        let mut cursors = SmallVec::new();
        cursors.resize(streams, 0);
        let mut last_time = SmallVec::new();
        last_time.resize(streams, 0);
        Self { cursors, last_time }
    }

    /// Rewind for a new block. Streams past the prepared count are ignored.
    pub fn reset(&mut self) {
        self.cursors.iter_mut().for_each(|c| *c = 0);
        self.last_time.iter_mut().for_each(|t| *t = 0);
    }

    /// Next `(stream, time, event)` across `streams`, skipping events at or past `frames`.
    pub fn next<'e>(
        &mut self,
        streams: &[&'e [EngineEvent]],
        frames: u32,
    ) -> Option<(usize, u32, &'e EngineEvent)> {
        loop {
            let mut best: Option<(usize, u32)> = None;
            for (stream, events) in streams.iter().enumerate().take(self.cursors.len()) {
                let Some(event) = events.get(self.cursors[stream]) else {
                    continue;
                };
                let time = event.time.max(self.last_time[stream]);
                if best.map_or(true, |(_, t)| time < t) {
                    best = Some((stream, time));
                }
            }
            let (stream, time) = best?;
            let event = &streams[stream][self.cursors[stream]];
            self.cursors[stream] += 1;
            if time >= frames {
                continue;
            }
            self.last_time[stream] = time;
            return Some((stream, time, event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EngineEventKind;

    fn midi_port(index: u16) -> EventPortFeed {
        EventPortFeed {
            native_index: index,
            dialects: NoteDialects::MIDI,
        }
    }

    fn note_port(index: u16) -> EventPortFeed {
        EventPortFeed {
            native_index: index,
            dialects: NoteDialects::CLAP,
        }
    }

    #[test]
    fn test_capacity_formula() {
        assert_eq!(EventList::capacity_for(3, 0), 6 + 512);
        assert_eq!(EventList::capacity_for(3, 2), 6 + 1024);
    }

    #[test]
    fn test_push_drops_when_full() {
        let mut list = EventList::with_capacity(2);
        assert!(list.push(NativeEvent::midi(false, 0, 0, [0x90, 60, 1])));
        assert!(list.push(NativeEvent::midi(false, 0, 1, [0x90, 61, 1])));
        assert!(!list.push(NativeEvent::midi(false, 0, 2, [0x90, 62, 1])));
        assert_eq!(list.len(), 2);
        assert_eq!(list.dropped(), 1);
    }

    #[test]
    fn test_sort_by_time_is_stable() {
        let mut list = EventList::with_capacity(8);
        list.push(NativeEvent::midi(false, 0, 4, [0x90, 1, 1]));
        list.push(NativeEvent::midi(false, 0, 0, [0x90, 2, 1]));
        list.push(NativeEvent::midi(false, 0, 4, [0x90, 3, 1]));
        list.push(NativeEvent::midi(false, 0, 2, [0x90, 4, 1]));
        list.sort_by_time();

        let keys: Vec<_> = list
            .iter()
            .map(|e| match e {
                NativeEvent::Midi(m) => (m.header.time, m.data[1]),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(keys, vec![(0, 2), (2, 4), (4, 1), (4, 3)]);
    }

    #[test]
    fn test_output_push_rejects_notes() {
        let mut list = EventList::with_capacity(4);
        assert!(!list.try_push_output(NativeEvent::note(false, 0, 0, 0, 60, 100)));
        assert!(list.try_push_output(NativeEvent::param_value(
            false,
            0,
            7,
            Cookie::default(),
            0.5
        )));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_note_event_encoding() {
        let event = NativeEvent::note(true, 1, 32, 3, 64, 127);
        match &event {
            NativeEvent::Note(note) => {
                assert_eq!(note.header.type_, CLAP_EVENT_NOTE_ON);
                assert_eq!(note.note_id, -1);
                assert_eq!(note.key, 64);
                assert_eq!(note.velocity, 1.0);
            }
            _ => panic!("expected note"),
        }
        assert!(event.is_live());
        assert_eq!(event.time(), 32);

        let off = NativeEvent::note(false, 0, 0, 0, 64, 0);
        assert_eq!(off.header().type_, CLAP_EVENT_NOTE_OFF);
    }

    #[test]
    fn test_from_header_roundtrips_known_types() {
        let original = NativeEvent::param_value(true, 9, 42, Cookie::default(), 0.25);
        let copy = unsafe { NativeEvent::from_header(original.header()) }.unwrap();
        match copy {
            NativeEvent::ParamValue(p) => {
                assert_eq!(p.param_id, 42);
                assert_eq!(p.value, 0.25);
                assert_eq!(p.header.time, 9);
            }
            _ => panic!("expected param value"),
        }
        assert!(unsafe { NativeEvent::from_header(std::ptr::null()) }.is_none());
    }

    #[test]
    fn test_reset_all_sound_off_two_ports() {
        let ports = [midi_port(0), midi_port(1)];
        let translator = EventTranslator {
            options: PluginOptions::SEND_ALL_SOUND_OFF,
            ports: &ports,
        };
        let mut list = EventList::with_capacity(EventList::capacity_for(0, 2));
        translator.synthesize_reset(&mut list, Some(0));
        assert_eq!(list.len(), 2 * MAX_MIDI_CHANNELS as usize * 2);
        assert!(list.iter().all(|e| matches!(e, NativeEvent::Midi(_))));
    }

    #[test]
    fn test_reset_note_offs_on_ctrl_channel() {
        let ports = [note_port(0)];
        let translator = EventTranslator {
            options: PluginOptions::NONE,
            ports: &ports,
        };
        let mut list = EventList::with_capacity(1024);
        translator.synthesize_reset(&mut list, Some(2));
        assert_eq!(list.len(), MAX_MIDI_NOTE as usize);
        match list.get(5) {
            Some(NativeEvent::Note(note)) => {
                assert_eq!(note.header.type_, CLAP_EVENT_NOTE_OFF);
                assert_eq!(note.channel, 2);
                assert_eq!(note.key, 5);
            }
            _ => panic!("expected structured note-off"),
        }

        let mut list = EventList::with_capacity(1024);
        translator.synthesize_reset(&mut list, None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_notes_converted_for_note_dialect_port() {
        let ports = [note_port(0)];
        let translator = EventTranslator {
            options: PluginOptions::NONE,
            ports: &ports,
        };
        let mut list = EventList::with_capacity(8);
        let activity = translator.midi(
            &mut list,
            0,
            10,
            1,
            &MidiData::from_bytes(&[0x91, 60, 100]),
        );
        assert_eq!(
            activity,
            Some(NoteActivity::On {
                channel: 1,
                note: 60,
                velocity: 100
            })
        );
        assert_eq!(list.len(), 1);
        assert!(matches!(list.get(0), Some(NativeEvent::Note(_))));

        // CC has no structured form: dropped
        translator.midi(&mut list, 0, 11, 1, &MidiData::from_bytes(&[0xB1, 7, 100]));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_midi_gating_by_options() {
        let ports = [midi_port(0)];
        let translator = EventTranslator {
            options: PluginOptions::SEND_PITCHBEND,
            ports: &ports,
        };
        let mut list = EventList::with_capacity(8);
        translator.midi(&mut list, 0, 0, 0, &MidiData::from_bytes(&[0xE0, 0, 64]));
        translator.midi(&mut list, 0, 0, 0, &MidiData::from_bytes(&[0xD0, 90]));
        translator.midi(&mut list, 0, 0, 0, &MidiData::from_bytes(&[0xB0, 1, 2]));
        translator.midi(&mut list, 0, 0, 0, &MidiData::from_bytes(&[0x90, 60, 100]));
        assert_eq!(list.len(), 2);

        let skip = EventTranslator {
            options: PluginOptions::SKIP_SENDING_NOTES,
            ports: &ports,
        };
        let mut list = EventList::with_capacity(8);
        assert!(skip
            .midi(&mut list, 0, 0, 0, &MidiData::from_bytes(&[0x90, 60, 100]))
            .is_none());
        assert!(list.is_empty());
    }

    #[test]
    fn test_control_events_become_midi() {
        let ports = [midi_port(0)];
        let translator = EventTranslator {
            options: PluginOptions::SEND_CONTROL_CHANGES | PluginOptions::SEND_ALL_SOUND_OFF,
            ports: &ports,
        };
        let mut list = EventList::with_capacity(8);
        translator.control(
            &mut list,
            4,
            3,
            &ControlEvent::ControlChange {
                control: 74,
                normalized: 1.0,
            },
        );
        translator.control(&mut list, 5, 3, &ControlEvent::AllNotesOff);
        translator.control(&mut list, 6, 3, &ControlEvent::MidiProgram(5));
        assert_eq!(list.len(), 2);
        match list.get(0) {
            Some(NativeEvent::Midi(m)) => assert_eq!(m.data, [0xB3, 74, 127]),
            _ => panic!("expected midi"),
        }
        match list.get(1) {
            Some(NativeEvent::Midi(m)) => assert_eq!(m.data, [0xB3, 0x7B, 0]),
            _ => panic!("expected midi"),
        }
    }

    #[test]
    fn test_merger_orders_by_time_and_keeps_ties() {
        let a = [
            EngineEvent::midi(0, &[0x90, 1, 1]),
            EngineEvent::midi(5, &[0x90, 2, 1]),
        ];
        let b = [
            EngineEvent::midi(0, &[0x90, 3, 1]),
            EngineEvent::midi(3, &[0x90, 4, 1]),
        ];
        let streams: [&[EngineEvent]; 2] = [&a, &b];
        let mut merger = EventMerger::new(2);
        let mut order = Vec::new();
        while let Some((stream, time, event)) = merger.next(&streams, 64) {
            if let EngineEventKind::Midi(data) = event.kind {
                order.push((stream, time, data.data[1]));
            }
        }
        assert_eq!(order, vec![(0, 0, 1), (1, 0, 3), (1, 3, 4), (0, 5, 2)]);
    }

    #[test]
    fn test_merger_clamps_backwards_time_and_skips_late() {
        let a = [
            EngineEvent::parameter(10, 0, 0.5),
            EngineEvent::parameter(4, 0, 0.6),
            EngineEvent::parameter(80, 0, 0.7),
        ];
        let streams: [&[EngineEvent]; 1] = [&a];
        let mut merger = EventMerger::new(1);
        let times: Vec<u32> = std::iter::from_fn(|| merger.next(&streams, 64))
            .map(|(_, t, _)| t)
            .collect();
        assert_eq!(times, vec![10, 10]);
    }
}
