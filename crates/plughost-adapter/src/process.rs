//! Per-block realtime driver.
//!
//! [`RtState`] lives behind the adapter's processing lock and is only touched
//! by `process()` or by NRT code holding that lock. Nothing in here allocates
//! once `prepare()` has run.

use crate::engine::{EngineCallback, EventSink};
use crate::events::{EventList, EventMerger, EventPortFeed, EventTranslator, NativeEvent, NoteActivity};
use crate::instance::{NativeInstance, ProcessBlock, ProcessStatus};
use crate::options::{PluginHints, PluginOptions};
use crate::params::{ParameterScheduler, ParameterTable};
use crate::protocol::{midi, ControlEvent, EngineEvent, EngineEventKind, TransportInfo};
use crate::topology::PortTopology;
use clap_sys::audio_buffer::clap_audio_buffer;
use clap_sys::events::{
    clap_event_header, clap_event_transport, CLAP_CORE_EVENT_SPACE_ID, CLAP_EVENT_TRANSPORT,
    CLAP_TRANSPORT_HAS_BEATS_TIMELINE, CLAP_TRANSPORT_HAS_SECONDS_TIMELINE,
    CLAP_TRANSPORT_HAS_TEMPO, CLAP_TRANSPORT_HAS_TIME_SIGNATURE, CLAP_TRANSPORT_IS_PLAYING,
};
use clap_sys::fixedpoint::{CLAP_BEATTIME_FACTOR, CLAP_SECTIME_FACTOR};
use crossbeam::queue::ArrayQueue;
use std::mem::size_of;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::trace;

/// Host audio for one block. Channel slices hold at least `frames` samples.
pub struct AudioBlock<'a> {
    pub audio_in: &'a [&'a [f32]],
    pub audio_out: &'a mut [&'a mut [f32]],
    pub cv_in: &'a [&'a [f32]],
    pub cv_out: &'a mut [&'a mut [f32]],
    pub frames: u32,
}

impl AudioBlock<'_> {
    /// Zero every output channel.
    pub fn silence(&mut self) {
        let frames = self.frames as usize;
        for channel in self.audio_out.iter_mut().chain(self.cv_out.iter_mut()) {
            let end = frames.min(channel.len());
            channel[..end].fill(0.0);
        }
    }
}

/// Host event ports for one block.
///
/// `inputs[0]` is the default `events-in` port, `inputs[k]` the dedicated
/// port of native note input `k - 1`.
pub struct EventBlock<'a> {
    pub inputs: &'a [&'a [EngineEvent]],
    pub output: &'a mut dyn EventSink,
}

/// Live parameter write queued by the engine's audio thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RtParameterWrite {
    pub index: u32,
    pub value: f64,
    pub frame: u32,
}

/// Note injected from outside the event stream, e.g. a UI keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalNote {
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
}

#[derive(Debug)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Dry/wet, volume and balance, writable from any thread.
#[derive(Debug)]
pub struct PostProcControls {
    dry_wet: AtomicF32,
    volume: AtomicF32,
    balance_left: AtomicF32,
    balance_right: AtomicF32,
}

impl Default for PostProcControls {
    fn default() -> Self {
        Self {
            dry_wet: AtomicF32::new(1.0),
            volume: AtomicF32::new(1.0),
            balance_left: AtomicF32::new(-1.0),
            balance_right: AtomicF32::new(1.0),
        }
    }
}

impl PostProcControls {
    pub fn dry_wet(&self) -> f32 {
        self.dry_wet.load()
    }

    pub fn volume(&self) -> f32 {
        self.volume.load()
    }

    pub fn balance_left(&self) -> f32 {
        self.balance_left.load()
    }

    pub fn balance_right(&self) -> f32 {
        self.balance_right.load()
    }

    pub fn set_dry_wet(&self, value: f32) -> f32 {
        let value = value.clamp(0.0, 1.0);
        self.dry_wet.store(value);
        value
    }

    pub fn set_volume(&self, value: f32) -> f32 {
        let value = value.clamp(0.0, 1.27);
        self.volume.store(value);
        value
    }

    pub fn set_balance_left(&self, value: f32) -> f32 {
        let value = value.clamp(-1.0, 1.0);
        self.balance_left.store(value);
        value
    }

    pub fn set_balance_right(&self, value: f32) -> f32 {
        let value = value.clamp(-1.0, 1.0);
        self.balance_right.store(value);
        value
    }

    /// Balance from a centered CC value: left and right narrow toward one side.
    pub fn set_balance_from_normalized(&self, normalized: f32) {
        let value = normalized / 0.5 - 1.0;
        let (left, right) = if value < 0.0 {
            (-1.0, value * 2.0 + 1.0)
        } else if value > 0.0 {
            (value * 2.0 - 1.0, 1.0)
        } else {
            (-1.0, 1.0)
        };
        self.set_balance_left(left);
        self.set_balance_right(right);
    }
}

/// Post-processing resolved for one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostSettings {
    pub dry_wet: Option<f32>,
    pub balance: Option<(f32, f32)>,
    pub volume: f32,
}

impl PostSettings {
    pub fn resolve(hints: PluginHints, controls: &PostProcControls) -> Self {
        let dry_wet = controls.dry_wet();
        let (left, right) = (controls.balance_left(), controls.balance_right());
        Self {
            dry_wet: (hints.contains(PluginHints::CAN_DRYWET) && dry_wet != 1.0).then_some(dry_wet),
            balance: (hints.contains(PluginHints::CAN_BALANCE) && (left, right) != (-1.0, 1.0))
                .then_some((left, right)),
            volume: controls.volume(),
        }
    }

    pub fn needs_scratch(&self) -> bool {
        self.dry_wet.is_some() || self.balance.is_some() || self.volume != 1.0
    }
}

/// Dry/wet, then balance, then volume, channel by channel. Writes `outputs`
/// from the plugin's `wet` buffers.
pub fn post_process(
    wet: &mut [Vec<f32>],
    old_left: &mut [f32],
    inputs: &[&[f32]],
    outputs: &mut [&mut [f32]],
    frames: usize,
    settings: PostSettings,
) {
    let mono = inputs.len() == 1;
    for i in 0..wet.len().min(outputs.len()) {
        if let Some(dry_wet) = settings.dry_wet {
            let dry = inputs[if mono { 0 } else { i }];
            for (out, input) in wet[i][..frames].iter_mut().zip(&dry[..frames]) {
                *out = *out * dry_wet + *input * (1.0 - dry_wet);
            }
        }

        if let Some((left, right)) = settings.balance {
            let range_l = (left + 1.0) / 2.0;
            let range_r = (right + 1.0) / 2.0;
            if i % 2 == 0 {
                old_left[..frames].copy_from_slice(&wet[i][..frames]);
                if let [current, next, ..] = &mut wet[i..] {
                    for k in 0..frames {
                        current[k] = old_left[k] * (1.0 - range_l) + next[k] * (1.0 - range_r);
                    }
                }
            } else {
                for k in 0..frames {
                    wet[i][k] = wet[i][k] * range_r + old_left[k] * range_l;
                }
            }
        }

        for (out, value) in outputs[i][..frames].iter_mut().zip(&wet[i][..frames]) {
            *out = value * settings.volume;
        }
    }
}

/// Native transport from host time info. Seconds are always present; musical
/// time falls back to 120 BPM 4/4.
pub fn build_transport(info: &TransportInfo, sample_rate: f64) -> clap_event_transport {
    let mut flags = CLAP_TRANSPORT_HAS_SECONDS_TIMELINE;
    if info.playing {
        flags |= CLAP_TRANSPORT_IS_PLAYING;
    }
    let frame = info.frame as f64;
    let song_pos_seconds = (CLAP_SECTIME_FACTOR as f64 * frame / sample_rate).round() as i64;

    let mut transport = clap_event_transport {
        header: clap_event_header {
            size: size_of::<clap_event_transport>() as u32,
            time: 0,
            space_id: CLAP_CORE_EVENT_SPACE_ID,
            type_: CLAP_EVENT_TRANSPORT,
            flags: 0,
        },
        flags: 0,
        song_pos_beats: 0,
        song_pos_seconds,
        tempo: 120.0,
        tempo_inc: 0.0,
        loop_start_beats: 0,
        loop_end_beats: 0,
        loop_start_seconds: 0,
        loop_end_seconds: 0,
        bar_start: 0,
        bar_number: 0,
        tsig_num: 4,
        tsig_denom: 4,
    };

    if let Some(bbt) = info.bbt {
        let bar_start = f64::from(bbt.beats_per_bar) * f64::from(bbt.bar - 1);
        let position_beats = frame / (sample_rate * 60.0 / bbt.beats_per_minute);
        transport.bar_start = (CLAP_BEATTIME_FACTOR as f64 * bar_start).round() as i64;
        transport.bar_number = bbt.bar - 1;
        transport.song_pos_beats = (CLAP_BEATTIME_FACTOR as f64 * position_beats).round() as i64;
        transport.tempo = bbt.beats_per_minute;
        transport.tsig_num = (bbt.beats_per_bar + 0.5) as u16;
        transport.tsig_denom = (bbt.beat_type + 0.5) as u16;
        flags |= CLAP_TRANSPORT_HAS_BEATS_TIMELINE;
    }
    transport.flags = flags | CLAP_TRANSPORT_HAS_TEMPO | CLAP_TRANSPORT_HAS_TIME_SIGNATURE;
    transport
}

/// Shared, lock-free inputs to one block.
pub struct BlockContext<'a> {
    pub instance: &'a dyn NativeInstance,
    pub scheduler: &'a ParameterScheduler,
    pub controls: &'a PostProcControls,
    pub options: PluginOptions,
    pub hints: PluginHints,
    pub ctrl_channel: Option<u8>,
    pub needs_reset: bool,
    pub transport: TransportInfo,
    pub sample_rate: f64,
    pub postponed: &'a ArrayQueue<EngineCallback>,
    pub external_notes: &'a ArrayQueue<ExternalNote>,
    pub rt_params: &'a ArrayQueue<RtParameterWrite>,
}

impl BlockContext<'_> {
    fn postpone(&self, callback: EngineCallback) {
        if self.postponed.push(callback).is_err() {
            trace!("postponed event queue full, dropping notification");
        }
    }
}

struct Ptrs(Vec<*mut f32>);

/// Realtime-side buffers, rebuilt on `reload()` and buffer size changes.
pub struct RtState {
    pub topology: PortTopology,
    feeds: Vec<EventPortFeed>,
    in_events: EventList,
    out_events: EventList,
    merger: EventMerger,
    audio_inputs: Vec<clap_audio_buffer>,
    audio_outputs: Vec<clap_audio_buffer>,
    in_ptrs: Ptrs,
    out_ptrs: Ptrs,
    scratch: Vec<Vec<f32>>,
    old_left: Vec<f32>,
    buffer_size: u32,
}

// SAFETY: the raw pointers are rewired at the start of every block and never
// dereferenced outside `process()`, which runs under the processing lock.
unsafe impl Send for RtState {}

fn empty_buffer(channel_count: u32) -> clap_audio_buffer {
    clap_audio_buffer {
        data32: std::ptr::null_mut(),
        data64: std::ptr::null_mut(),
        channel_count,
        latency: 0,
        constant_mask: 0,
    }
}

impl Default for RtState {
    fn default() -> Self {
        Self::new(PortTopology::default(), 0, 0)
    }
}

impl RtState {
    pub fn new(topology: PortTopology, param_count: usize, buffer_size: u32) -> Self {
        let feeds = topology.input_feeds();
        let merger = EventMerger::new(topology.input_stream_count());
        let in_events = EventList::with_capacity(topology.input_event_capacity(param_count));
        let out_events = EventList::with_capacity(topology.output_event_capacity(param_count));
        let audio_inputs = topology
            .audio_inputs
            .iter()
            .map(|p| empty_buffer(p.channel_count))
            .collect();
        let audio_outputs = topology
            .audio_outputs
            .iter()
            .map(|p| empty_buffer(p.channel_count))
            .collect();
        let in_ptrs = Ptrs(vec![std::ptr::null_mut(); topology.a_ins as usize]);
        let out_ptrs = Ptrs(vec![std::ptr::null_mut(); topology.a_outs as usize]);
        let mut state = Self {
            topology,
            feeds,
            in_events,
            out_events,
            merger,
            audio_inputs,
            audio_outputs,
            in_ptrs,
            out_ptrs,
            scratch: Vec::new(),
            old_left: Vec::new(),
            buffer_size: 0,
        };
        state.prepare(buffer_size);
        state
    }

    /// (Re)allocate scratch buffers for `buffer_size` frames.
    pub fn prepare(&mut self, buffer_size: u32) {
        let frames = buffer_size as usize;
        self.scratch = (0..self.topology.a_outs).map(|_| vec![0.0; frames]).collect();
        self.old_left = vec![0.0; frames];
        self.buffer_size = buffer_size;
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    pub fn feeds(&self) -> &[EventPortFeed] {
        &self.feeds
    }

    pub fn dropped_events(&self) -> u64 {
        self.in_events.dropped() + self.out_events.dropped()
    }

    /// Input list for out-of-process parameter flushes.
    pub fn flush_lists(&mut self) -> (&mut EventList, &mut EventList) {
        self.in_events.clear();
        self.out_events.clear();
        (&mut self.in_events, &mut self.out_events)
    }

    fn audio_fits(&self, audio: &AudioBlock<'_>) -> bool {
        let frames = audio.frames as usize;
        audio.frames <= self.buffer_size
            && audio.audio_in.len() >= self.topology.a_ins as usize
            && audio.audio_out.len() >= self.topology.a_outs as usize
            && audio.audio_in.iter().all(|c| c.len() >= frames)
            && audio.audio_out.iter().all(|c| c.len() >= frames)
    }

    /// Everything between taking the lock and releasing it: event
    /// translation, one native `process()` call, post-processing and
    /// output fan-out.
    pub fn run_block(
        &mut self,
        ctx: &BlockContext<'_>,
        audio: &mut AudioBlock<'_>,
        events: &mut EventBlock<'_>,
    ) -> ProcessStatus {
        if audio.frames == 0 || !self.audio_fits(audio) {
            trace!(frames = audio.frames, "block does not match prepared buffers");
            audio.silence();
            return ProcessStatus::Error;
        }
        let frames = audio.frames as usize;

        self.in_events.clear();
        self.out_events.clear();
        ctx.scheduler.drain_into(&mut self.in_events);

        let translator = EventTranslator {
            options: ctx.options,
            ports: &self.feeds,
        };
        if ctx.needs_reset {
            translator.synthesize_reset(&mut self.in_events, ctx.ctrl_channel);
        }

        let transport = build_transport(&ctx.transport, ctx.sample_rate);

        if self.topology.ctrl_in.is_some() || self.topology.input_stream_count() > 1 {
            translate_inputs(
                ctx,
                &translator,
                &self.topology,
                &mut self.merger,
                &mut self.in_events,
                events.inputs,
                audio.frames,
            );
        }

        while let Some(write) = ctx.rt_params.pop() {
            let frame = write.frame.min(audio.frames - 1);
            if ctx
                .scheduler
                .set_value_rt(&mut self.in_events, write.index, write.value, frame)
            {
                ctx.postpone(EngineCallback::ParameterValueChanged {
                    index: write.index,
                    value: write.value,
                });
            }
        }
        self.in_events.sort_by_time();

        let settings = PostSettings::resolve(ctx.hints, ctx.controls);
        let use_scratch = settings.needs_scratch() && self.topology.a_outs > 0;
        self.wire_audio(audio, use_scratch, frames);

        let status = {
            let mut block = ProcessBlock {
                steady_time: ctx.transport.frame as i64,
                frames: audio.frames,
                transport: &transport,
                audio_inputs: &self.audio_inputs,
                audio_outputs: &mut self.audio_outputs,
                in_events: &self.in_events,
                out_events: &mut self.out_events,
            };
            ctx.instance.process(&mut block)
        };
        if status == ProcessStatus::Error {
            trace!("plugin process returned error");
        }

        if use_scratch {
            post_process(
                &mut self.scratch,
                &mut self.old_left,
                audio.audio_in,
                audio.audio_out,
                frames,
                settings,
            );
        }

        self.write_control_outputs(ctx, events.output);
        self.forward_outputs(ctx, events.output);
        status
    }

    fn wire_audio(&mut self, audio: &mut AudioBlock<'_>, use_scratch: bool, frames: usize) {
        for (ptr, channel) in self.in_ptrs.0.iter_mut().zip(audio.audio_in.iter()) {
            // the plugin only reads input buffers
            *ptr = channel.as_ptr() as *mut f32;
        }
        if use_scratch {
            for (ptr, channel) in self.out_ptrs.0.iter_mut().zip(self.scratch.iter_mut()) {
                channel[..frames].fill(0.0);
                *ptr = channel.as_mut_ptr();
            }
        } else {
            for (ptr, channel) in self.out_ptrs.0.iter_mut().zip(audio.audio_out.iter_mut()) {
                channel[..frames].fill(0.0);
                *ptr = channel.as_mut_ptr();
            }
        }

        let in_base = self.in_ptrs.0.as_mut_ptr();
        for (buffer, port) in self.audio_inputs.iter_mut().zip(&self.topology.audio_inputs) {
            // SAFETY: offsets come from the same topology that sized `in_ptrs`.
            buffer.data32 = unsafe { in_base.add(port.host_offset as usize) };
        }
        let out_base = self.out_ptrs.0.as_mut_ptr();
        for (buffer, port) in self.audio_outputs.iter_mut().zip(&self.topology.audio_outputs) {
            // SAFETY: as above.
            buffer.data32 = unsafe { out_base.add(port.host_offset as usize) };
        }
    }

    /// Normalized values of mapped output parameters onto `events-out`.
    fn write_control_outputs(&self, ctx: &BlockContext<'_>, sink: &mut dyn EventSink) {
        if self.topology.ctrl_out.is_none() {
            return;
        }
        let table = ctx.scheduler.table();
        for param in table.iter() {
            if param.kind != crate::params::ParameterType::Output || param.mapped_control() <= 0 {
                continue;
            }
            let Some(value) = ctx.instance.param_value(param.native_id) else {
                continue;
            };
            let normalized = param.ranges.normalized_value(value) as f32;
            sink.write_control(
                0,
                param.midi_channel(),
                param.mapped_control() as u16,
                normalized,
            );
        }
    }

    fn forward_outputs(&mut self, ctx: &BlockContext<'_>, sink: &mut dyn EventSink) {
        let table = ctx.scheduler.table();
        for event in self.out_events.iter() {
            match event {
                NativeEvent::ParamValue(param) => {
                    if let Some(index) = table.index_of(param.param_id) {
                        ctx.postpone(EngineCallback::ParameterValueChanged {
                            index,
                            value: param.value,
                        });
                    }
                }
                NativeEvent::Midi(m) => {
                    if let Some(port) = self.topology.sink_port_for_output(m.port_index) {
                        sink.write_midi(port, m.header.time, &m.data);
                    }
                }
                NativeEvent::Note(_) => {}
            }
        }
        self.out_events.clear();
    }
}

fn postpone_note(ctx: &BlockContext<'_>, activity: Option<NoteActivity>) {
    match activity {
        Some(NoteActivity::On {
            channel,
            note,
            velocity,
        }) => ctx.postpone(EngineCallback::NoteOn {
            channel,
            note,
            velocity,
        }),
        Some(NoteActivity::Off { channel, note }) => {
            ctx.postpone(EngineCallback::NoteOff { channel, note })
        }
        None => {}
    }
}

/// External notes first, then every host stream merged by frame offset.
fn translate_inputs(
    ctx: &BlockContext<'_>,
    translator: &EventTranslator<'_>,
    topology: &PortTopology,
    merger: &mut EventMerger,
    list: &mut EventList,
    inputs: &[&[EngineEvent]],
    frames: u32,
) {
    if translator.ports.is_empty() {
        while ctx.external_notes.pop().is_some() {}
    } else {
        while !list.is_full() {
            let Some(note) = ctx.external_notes.pop() else {
                break;
            };
            translator.external_note(list, note.channel, note.note, note.velocity);
        }
    }

    let table = ctx.scheduler.table();
    merger.reset();
    while let Some((stream, time, event)) = merger.next(inputs, frames) {
        match event.kind {
            EngineEventKind::Parameter { index, normalized } if stream == 0 => {
                let Some(param) = table.get(index) else {
                    continue;
                };
                let value = param.final_unnormalized_value(f64::from(normalized));
                if ctx.scheduler.set_value_rt(list, index, value, time) {
                    ctx.postpone(EngineCallback::ParameterValueChanged { index, value });
                }
            }
            EngineEventKind::Control(control) if stream == 0 => {
                control_event(ctx, translator, &table, list, time, event.channel, &control);
            }
            EngineEventKind::Midi(data) => {
                let feed = topology.feed_for_stream(stream);
                let activity = translator.midi(list, feed, time, event.channel, &data);
                postpone_note(ctx, activity);
            }
            _ => {}
        }
    }
}

/// Control-channel CCs drive post-processing; mapped CCs drive parameters.
fn control_event(
    ctx: &BlockContext<'_>,
    translator: &EventTranslator<'_>,
    table: &ParameterTable,
    list: &mut EventList,
    time: u32,
    channel: u8,
    control: &ControlEvent,
) {
    if let ControlEvent::ControlChange {
        control: cc,
        normalized,
    } = *control
    {
        if ctx.ctrl_channel == Some(channel) {
            match cc {
                midi::CONTROL_BREATH if ctx.hints.contains(PluginHints::CAN_DRYWET) => {
                    ctx.controls.set_dry_wet(normalized);
                }
                midi::CONTROL_CHANNEL_VOLUME if ctx.hints.contains(PluginHints::CAN_VOLUME) => {
                    ctx.controls.set_volume(normalized * 127.0 / 100.0);
                }
                midi::CONTROL_BALANCE if ctx.hints.contains(PluginHints::CAN_BALANCE) => {
                    ctx.controls.set_balance_from_normalized(normalized);
                }
                _ => {}
            }
        }

        for param in table.iter() {
            if param.midi_channel() != channel
                || param.mapped_control() != cc as i16
                || !param.is_automatable_input()
            {
                continue;
            }
            let value = param.final_unnormalized_value(f64::from(normalized));
            if ctx.scheduler.set_value_rt(list, param.index, value, time) {
                ctx.postpone(EngineCallback::ParameterValueChanged {
                    index: param.index,
                    value,
                });
            }
        }
    }
    translator.control(list, time, channel, control);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::BarBeatTick;

    #[test]
    fn test_transport_without_bbt_defaults() {
        let info = TransportInfo {
            playing: true,
            frame: 48_000,
            bbt: None,
        };
        let t = build_transport(&info, 48_000.0);
        assert_eq!(t.song_pos_seconds, CLAP_SECTIME_FACTOR);
        assert_eq!(t.tempo, 120.0);
        assert_eq!((t.tsig_num, t.tsig_denom), (4, 4));
        assert_ne!(t.flags & CLAP_TRANSPORT_IS_PLAYING, 0);
        assert_ne!(t.flags & CLAP_TRANSPORT_HAS_SECONDS_TIMELINE, 0);
        assert_eq!(t.flags & CLAP_TRANSPORT_HAS_BEATS_TIMELINE, 0);
    }

    #[test]
    fn test_transport_with_bbt() {
        let info = TransportInfo {
            playing: false,
            frame: 44_100,
            bbt: Some(BarBeatTick {
                bar: 3,
                beat: 1,
                tick: 0.0,
                beats_per_bar: 3.0,
                beat_type: 8.0,
                beats_per_minute: 90.0,
            }),
        };
        let t = build_transport(&info, 44_100.0);
        assert_eq!(t.bar_number, 2);
        assert_eq!(t.bar_start, CLAP_BEATTIME_FACTOR * 6);
        // one second at 90 BPM is 1.5 beats
        assert_eq!(t.song_pos_beats, CLAP_BEATTIME_FACTOR * 3 / 2);
        assert_eq!((t.tsig_num, t.tsig_denom), (3, 8));
        assert_eq!(t.tempo, 90.0);
        assert_eq!(t.flags & CLAP_TRANSPORT_IS_PLAYING, 0);
    }

    #[test]
    fn test_post_settings_resolution() {
        let controls = PostProcControls::default();
        let all = PluginHints::CAN_DRYWET | PluginHints::CAN_BALANCE | PluginHints::CAN_VOLUME;
        assert!(!PostSettings::resolve(all, &controls).needs_scratch());

        controls.set_dry_wet(0.5);
        controls.set_balance_left(-0.5);
        let settings = PostSettings::resolve(all, &controls);
        assert_eq!(settings.dry_wet, Some(0.5));
        assert_eq!(settings.balance, Some((-0.5, 1.0)));

        let settings = PostSettings::resolve(PluginHints::CAN_VOLUME, &controls);
        assert_eq!(settings.dry_wet, None);
        assert_eq!(settings.balance, None);
    }

    #[test]
    fn test_control_setters_clamp() {
        let controls = PostProcControls::default();
        assert_eq!(controls.set_volume(3.0), 1.27);
        assert_eq!(controls.set_dry_wet(-1.0), 0.0);
        assert_eq!(controls.set_balance_right(2.0), 1.0);

        controls.set_balance_from_normalized(0.25);
        assert_eq!(controls.balance_left(), -1.0);
        assert_eq!(controls.balance_right(), 0.0);
        controls.set_balance_from_normalized(0.5);
        assert_eq!((controls.balance_left(), controls.balance_right()), (-1.0, 1.0));
    }

    #[test]
    fn test_post_process_dry_wet_and_volume() {
        let mut wet = vec![vec![1.0; 4], vec![1.0; 4]];
        let mut old_left = vec![0.0; 4];
        let dry = [0.0f32; 4];
        let inputs: [&[f32]; 2] = [&dry, &dry];
        let mut left = [9.0f32; 4];
        let mut right = [9.0f32; 4];
        let mut outputs: [&mut [f32]; 2] = [&mut left, &mut right];

        post_process(
            &mut wet,
            &mut old_left,
            &inputs,
            &mut outputs,
            4,
            PostSettings {
                dry_wet: Some(0.25),
                balance: None,
                volume: 0.5,
            },
        );
        assert!(left.iter().all(|v| (*v - 0.125).abs() < 1e-6));
        assert!(right.iter().all(|v| (*v - 0.125).abs() < 1e-6));
    }

    #[test]
    fn test_post_process_balance_hard_left() {
        let mut wet = vec![vec![1.0; 2], vec![0.5; 2]];
        let mut old_left = vec![0.0; 2];
        let mut left = [0.0f32; 2];
        let mut right = [0.0f32; 2];
        let mut outputs: [&mut [f32]; 2] = [&mut left, &mut right];

        // both channels panned fully left
        post_process(
            &mut wet,
            &mut old_left,
            &[],
            &mut outputs,
            2,
            PostSettings {
                dry_wet: None,
                balance: Some((-1.0, -1.0)),
                volume: 1.0,
            },
        );
        assert_eq!(left, [1.5, 1.5]);
        assert_eq!(right, [0.0, 0.0]);
    }
}
