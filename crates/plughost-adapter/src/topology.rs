//! Host ⇄ native port mapping, rebuilt on every `reload()`.

use crate::config::EngineOptions;
use crate::engine::{HostEngine, PortId, PortKind};
use crate::events::{EventList, EventPortFeed};
use crate::instance::{NativeInstance, NoteDialects};
use crate::options::PluginHints;
use crate::params::ParameterTable;
use tracing::{debug, warn};

/// One native multi-channel audio port and the host channel range it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPort {
    pub native_index: u32,
    pub channel_count: u32,
    /// First host channel of this port.
    pub host_offset: u32,
    pub is_main: bool,
}

/// Where a native note port shows up on the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEventPort {
    /// Fused with the default `events-in`/`events-out` port.
    Default,
    Dedicated(PortId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPort {
    pub native_index: u16,
    pub name: String,
    pub dialects: NoteDialects,
    pub host: HostEventPort,
}

#[derive(Debug, Default)]
pub struct PortTopology {
    pub audio_inputs: Vec<AudioPort>,
    pub audio_outputs: Vec<AudioPort>,
    pub note_inputs: Vec<EventPort>,
    pub note_outputs: Vec<EventPort>,
    /// Total host audio input channels.
    pub a_ins: u32,
    pub a_outs: u32,
    pub needs_ctrl_in: bool,
    pub needs_ctrl_out: bool,
    pub ctrl_in: Option<PortId>,
    pub ctrl_out: Option<PortId>,
    pub audio_in_ports: Vec<PortId>,
    pub audio_out_ports: Vec<PortId>,
}

fn audio_ports(instance: &dyn NativeInstance, is_input: bool) -> (Vec<AudioPort>, u32) {
    let count = instance.audio_port_count(is_input);
    let mut ports = Vec::with_capacity(count as usize);
    let mut offset = 0;
    for index in 0..count {
        let (channel_count, is_main) = match instance.audio_port_info(index, is_input) {
            Some(info) => (info.channel_count, info.is_main),
            None => {
                warn!(port = index, is_input, "audio port info query failed");
                (0, false)
            }
        };
        if channel_count == 0 {
            warn!(port = index, is_input, "audio port reports zero channels, skipping");
        }
        // the native buffer entry stays so port indices line up
        ports.push(AudioPort {
            native_index: index,
            channel_count,
            host_offset: offset,
            is_main,
        });
        offset += channel_count;
    }
    (ports, offset)
}

fn note_ports(instance: &dyn NativeInstance, is_input: bool) -> Vec<EventPort> {
    let count = instance.note_port_count(is_input);
    let mut ports = Vec::new();
    for index in 0..count {
        let Some(info) = instance.note_port_info(index, is_input) else {
            warn!(port = index, is_input, "note port info query failed");
            continue;
        };
        let usable = if is_input {
            info.supported_dialects.is_usable()
        } else {
            info.supported_dialects.supports_midi()
        };
        if !usable {
            debug!(port = index, is_input, "note port has no usable dialect");
            continue;
        }
        ports.push(EventPort {
            native_index: index as u16,
            name: info.name,
            dialects: info.supported_dialects,
            host: HostEventPort::Default,
        });
    }
    ports
}

impl PortTopology {
    /// Query the instance. Pure: no host ports are created yet.
    pub fn build(instance: &dyn NativeInstance, params: &ParameterTable) -> Self {
        let ext = instance.extensions();
        let ((audio_inputs, a_ins), (audio_outputs, a_outs)) = if ext.audio_ports {
            (audio_ports(instance, true), audio_ports(instance, false))
        } else {
            ((Vec::new(), 0), (Vec::new(), 0))
        };
        let (note_inputs, note_outputs) = if ext.note_ports {
            (note_ports(instance, true), note_ports(instance, false))
        } else {
            (Vec::new(), Vec::new())
        };

        let needs_ctrl_in = a_outs > 0 || note_inputs.len() == 1 || !params.is_empty();
        let needs_ctrl_out = note_outputs.len() == 1 || params.has_output();

        Self {
            audio_inputs,
            audio_outputs,
            note_inputs,
            note_outputs,
            a_ins,
            a_outs,
            needs_ctrl_in,
            needs_ctrl_out,
            ..Default::default()
        }
    }

    /// Create the host-visible ports.
    pub fn register_ports(&mut self, engine: &dyn HostEngine, plugin_name: &str) {
        let options: EngineOptions = engine.options();
        let name = |base: &str| options.port_name(plugin_name, base);

        self.audio_in_ports = (0..self.a_ins)
            .map(|j| {
                let base = if self.a_ins > 1 {
                    format!("input_{}", j + 1)
                } else {
                    "input".to_string()
                };
                engine.add_port(PortKind::Audio, &name(&base), true, j)
            })
            .collect();

        self.audio_out_ports = (0..self.a_outs)
            .map(|j| {
                let base = if self.a_outs > 1 {
                    format!("output_{}", j + 1)
                } else {
                    "output".to_string()
                };
                engine.add_port(PortKind::Audio, &name(&base), false, j)
            })
            .collect();

        for (is_input, ports) in [(true, &mut self.note_inputs), (false, &mut self.note_outputs)] {
            if ports.len() > 1 {
                for (j, port) in ports.iter_mut().enumerate() {
                    let id = engine.add_port(PortKind::Event, &name(&port.name), is_input, j as u32);
                    port.host = HostEventPort::Dedicated(id);
                }
            }
        }

        self.ctrl_in = self
            .needs_ctrl_in
            .then(|| engine.add_port(PortKind::Event, &name("events-in"), true, 0));
        self.ctrl_out = self
            .needs_ctrl_out
            .then(|| engine.add_port(PortKind::Event, &name("events-out"), false, 0));

        debug!(
            plugin = %plugin_name,
            a_ins = self.a_ins,
            a_outs = self.a_outs,
            m_ins = self.note_inputs.len(),
            m_outs = self.note_outputs.len(),
            "ports registered"
        );
    }

    /// Post-processing hints derived from channel symmetry.
    pub fn hints(&self) -> PluginHints {
        let mut hints = PluginHints::NONE;
        if self.a_outs > 0 {
            hints |= PluginHints::CAN_VOLUME;
            if self.a_ins == self.a_outs || self.a_ins == 1 {
                hints |= PluginHints::CAN_DRYWET;
            }
        }
        if self.a_outs >= 2 && self.a_outs % 2 == 0 {
            hints |= PluginHints::CAN_BALANCE;
        }
        hints
    }

    pub fn input_event_capacity(&self, param_count: usize) -> usize {
        EventList::capacity_for(param_count, self.note_inputs.len())
    }

    pub fn output_event_capacity(&self, param_count: usize) -> usize {
        EventList::capacity_for(param_count, self.note_outputs.len())
    }

    pub fn input_feeds(&self) -> Vec<EventPortFeed> {
        self.note_inputs
            .iter()
            .map(|p| EventPortFeed {
                native_index: p.native_index,
                dialects: p.dialects,
            })
            .collect()
    }

    /// Host input stream count: the default port plus one per dedicated note port.
    pub fn input_stream_count(&self) -> usize {
        1 + self
            .note_inputs
            .iter()
            .filter(|p| matches!(p.host, HostEventPort::Dedicated(_)))
            .count()
    }

    /// Note feed behind host input stream `stream`.
    pub fn feed_for_stream(&self, stream: usize) -> usize {
        stream.saturating_sub(1)
    }

    /// Sink port for MIDI the plugin wrote to native output `native_index`.
    pub fn sink_port_for_output(&self, native_index: u16) -> Option<usize> {
        let position = self
            .note_outputs
            .iter()
            .position(|p| p.native_index == native_index)?;
        match self.note_outputs[position].host {
            HostEventPort::Default => Some(0),
            HostEventPort::Dedicated(_) => Some(position + 1),
        }
    }

    pub fn any_input_supports_midi(&self) -> bool {
        self.note_inputs.iter().any(|p| p.dialects.supports_midi())
    }

    pub fn any_input_supports_notes(&self) -> bool {
        self.note_inputs.iter().any(|p| p.dialects.supports_notes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakePlugin, RecordingEngine};

    #[test]
    fn test_scenario_stereo_synth_with_one_midi_port() {
        let plugin = FakePlugin::builder()
            .audio_inputs(&[2])
            .audio_outputs(&[2])
            .note_inputs(&[("midi in", NoteDialects::MIDI)])
            .params(3)
            .build();
        let table = ParameterTable::from_native(&plugin);
        let mut topology = PortTopology::build(&plugin, &table);

        assert_eq!(topology.a_ins, 2);
        assert_eq!(topology.a_outs, 2);
        assert!(topology.needs_ctrl_in);
        assert!(!topology.needs_ctrl_out);

        let engine = RecordingEngine::new();
        topology.register_ports(&engine, "Synth");
        let events = engine.ports_of(PortKind::Event, true);
        assert_eq!(events, vec!["events-in".to_string()]);
        assert_eq!(topology.note_inputs[0].host, HostEventPort::Default);
        assert_eq!(
            engine.ports_of(PortKind::Audio, true),
            vec!["input_1".to_string(), "input_2".to_string()]
        );
        assert_eq!(topology.input_stream_count(), 1);
    }

    #[test]
    fn test_offsets_and_zero_channel_port() {
        let plugin = FakePlugin::builder()
            .audio_inputs(&[1, 0, 2])
            .audio_outputs(&[2, 2])
            .build();
        let topology = PortTopology::build(&plugin, &ParameterTable::default());

        assert_eq!(topology.a_ins, 3);
        assert_eq!(
            topology
                .audio_inputs
                .iter()
                .map(|p| (p.host_offset, p.channel_count))
                .collect::<Vec<_>>(),
            vec![(0, 1), (1, 0), (1, 2)]
        );
        assert_eq!(topology.audio_outputs[1].host_offset, 2);
        assert!(topology.needs_ctrl_in);
    }

    #[test]
    fn test_post_processing_hints() {
        let mono_in = FakePlugin::builder()
            .audio_inputs(&[1])
            .audio_outputs(&[2])
            .build();
        let hints = PortTopology::build(&mono_in, &ParameterTable::default()).hints();
        assert!(hints.contains(PluginHints::CAN_DRYWET));
        assert!(hints.contains(PluginHints::CAN_VOLUME));
        assert!(hints.contains(PluginHints::CAN_BALANCE));

        let odd = FakePlugin::builder()
            .audio_inputs(&[2])
            .audio_outputs(&[3])
            .build();
        let hints = PortTopology::build(&odd, &ParameterTable::default()).hints();
        assert!(!hints.contains(PluginHints::CAN_DRYWET));
        assert!(!hints.contains(PluginHints::CAN_BALANCE));

        let midi_fx = FakePlugin::builder().build();
        assert_eq!(
            PortTopology::build(&midi_fx, &ParameterTable::default()).hints(),
            PluginHints::NONE
        );
    }

    #[test]
    fn test_multiple_note_ports_get_dedicated_host_ports() {
        let plugin = FakePlugin::builder()
            .note_inputs(&[
                ("keys", NoteDialects::MIDI),
                ("drums", NoteDialects::CLAP),
                ("dead", NoteDialects(0)),
            ])
            .note_outputs(&[("out a", NoteDialects::MIDI), ("out b", NoteDialects::MIDI)])
            .build();
        let mut topology = PortTopology::build(&plugin, &ParameterTable::default());
        assert_eq!(topology.note_inputs.len(), 2);
        assert!(!topology.needs_ctrl_in);

        let engine = RecordingEngine::new();
        topology.register_ports(&engine, "Drum Machine");
        assert_eq!(
            engine.ports_of(PortKind::Event, true),
            vec!["keys".to_string(), "drums".to_string()]
        );
        assert_eq!(topology.input_stream_count(), 3);
        assert_eq!(topology.feed_for_stream(2), 1);
        assert_eq!(topology.sink_port_for_output(1), Some(2));
        assert_eq!(topology.sink_port_for_output(7), None);
        assert_eq!(topology.input_event_capacity(0), 1024);
    }

    #[test]
    fn test_single_client_port_prefix() {
        let plugin = FakePlugin::builder().audio_outputs(&[1]).build();
        let mut topology = PortTopology::build(&plugin, &ParameterTable::default());
        let engine = RecordingEngine::with_options(EngineOptions {
            process_mode: crate::config::ProcessMode::SingleClient,
            ..Default::default()
        });
        topology.register_ports(&engine, "Amp");
        assert_eq!(
            engine.ports_of(PortKind::Audio, false),
            vec!["Amp:output".to_string()]
        );
        assert_eq!(
            engine.ports_of(PortKind::Event, true),
            vec!["Amp:events-in".to_string()]
        );
    }
}
