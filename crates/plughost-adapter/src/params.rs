//! Parameter table and the NRT → RT update scheduler.
//!
//! The table is rebuilt at `reload()` and published through an [`ArcSwap`], so
//! the audio thread reads it without locking. Each parameter owns one
//! [`ScheduledParameterUpdate`] slot: a non-realtime writer stores the value and
//! raises the flag, the audio thread swaps the flag down and emits one event.

use crate::events::{EventList, NativeEvent};
use crate::instance::{Cookie, NativeInstance, NativeParamInfo};
use crate::options::ParameterHints;
use crate::{AdapterError, Result};
use arc_swap::{ArcSwap, Guard};
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::warn;

/// No MIDI CC mapped to the parameter.
pub const CONTROL_INDEX_NONE: i16 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    /// Hidden or bypass: present but not shown as a control.
    Unknown,
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRanges {
    pub def: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub step_small: f64,
    pub step_large: f64,
}

impl ParameterRanges {
    /// Clamp into `[min, max]`. Every value reaching the plugin goes through here.
    pub fn fixed_value(&self, value: f64) -> f64 {
        if value.is_nan() || value <= self.min {
            self.min
        } else if value >= self.max {
            self.max
        } else {
            value
        }
    }

    pub fn normalized_value(&self, value: f64) -> f64 {
        let range = self.max - self.min;
        ((value - self.min) / range).clamp(0.0, 1.0)
    }

    pub fn unnormalized_value(&self, normalized: f64) -> f64 {
        self.min + normalized.clamp(0.0, 1.0) * (self.max - self.min)
    }
}

/// Host view of one native parameter.
#[derive(Debug)]
pub struct Parameter {
    pub index: u32,
    pub native_id: u32,
    pub cookie: Cookie,
    pub name: String,
    pub module: String,
    pub kind: ParameterType,
    pub hints: ParameterHints,
    pub ranges: ParameterRanges,
    mapped_control: AtomicI16,
    midi_channel: AtomicU8,
}

impl Parameter {
    /// Sanitize plugin-reported info into host metadata.
    pub fn from_native(index: u32, info: &NativeParamInfo) -> Self {
        let flags = info.flags;
        let mut min = info.min_value;
        let mut max = info.max_value;
        if !min.is_finite() {
            min = 0.0;
        }
        if !max.is_finite() || min >= max {
            warn!(
                param = %info.name,
                min, max, "degenerate parameter range, widening"
            );
            max = min + 0.1;
        }
        let def = info.default_value.clamp(min, max);

        let kind = if flags.hidden || flags.bypass {
            ParameterType::Unknown
        } else if flags.read_only {
            ParameterType::Output
        } else {
            ParameterType::Input
        };

        let mut hints = ParameterHints::NONE;
        if kind != ParameterType::Unknown {
            hints |= ParameterHints::IS_ENABLED | ParameterHints::USES_CUSTOM_TEXT;
        }
        if kind == ParameterType::Output {
            hints |= ParameterHints::IS_READ_ONLY;
        }
        if kind != ParameterType::Unknown && flags.automatable {
            hints |= ParameterHints::IS_AUTOMATABLE;
            if !flags.stepped {
                hints |= ParameterHints::CAN_BE_CV_CONTROLLED;
            }
        }

        let range = max - min;
        let (step, step_small, step_large) = if flags.stepped {
            hints |= ParameterHints::IS_INTEGER;
            if range == 1.0 {
                hints |= ParameterHints::IS_BOOLEAN;
                (1.0, 1.0, 1.0)
            } else {
                (1.0, 1.0, range.min(10.0))
            }
        } else {
            (range / 100.0, range / 1000.0, range / 10.0)
        };

        Self {
            index,
            native_id: info.id,
            cookie: info.cookie,
            name: info.name.clone(),
            module: info.module.clone(),
            kind,
            hints,
            ranges: ParameterRanges {
                def,
                min,
                max,
                step,
                step_small,
                step_large,
            },
            mapped_control: AtomicI16::new(CONTROL_INDEX_NONE),
            midi_channel: AtomicU8::new(0),
        }
    }

    pub fn mapped_control(&self) -> i16 {
        self.mapped_control.load(Ordering::Relaxed)
    }

    pub fn midi_channel(&self) -> u8 {
        self.midi_channel.load(Ordering::Relaxed)
    }

    pub fn set_mapping(&self, control: i16, channel: u8) {
        self.midi_channel.store(channel & 0x0F, Ordering::Relaxed);
        self.mapped_control.store(control, Ordering::Relaxed);
    }

    /// Host-normalized value to plugin units, snapped for stepped parameters.
    pub fn final_unnormalized_value(&self, normalized: f64) -> f64 {
        if self.hints.contains(ParameterHints::IS_BOOLEAN) {
            return if normalized < 0.5 {
                self.ranges.min
            } else {
                self.ranges.max
            };
        }
        let value = self.ranges.unnormalized_value(normalized);
        if self.hints.contains(ParameterHints::IS_INTEGER) {
            value.round()
        } else {
            value
        }
    }

    pub fn is_automatable_input(&self) -> bool {
        self.kind == ParameterType::Input && self.hints.contains(ParameterHints::IS_AUTOMATABLE)
    }
}

/// Pending NRT write for one parameter.
#[derive(Debug)]
pub struct ScheduledParameterUpdate {
    pub native_id: u32,
    pub cookie: Cookie,
    value: AtomicU64,
    updated: AtomicBool,
}

impl ScheduledParameterUpdate {
    fn new(native_id: u32, cookie: Cookie, value: f64) -> Self {
        Self {
            native_id,
            cookie,
            value: AtomicU64::new(value.to_bits()),
            updated: AtomicBool::new(false),
        }
    }

    pub fn store(&self, value: f64) {
        self.value.store(value.to_bits(), Ordering::Relaxed);
        self.updated.store(true, Ordering::Release);
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }

    pub fn is_updated(&self) -> bool {
        self.updated.load(Ordering::Acquire)
    }

    /// Take the pending value, clearing the flag.
    pub fn take(&self) -> Option<f64> {
        if self.updated.swap(false, Ordering::AcqRel) {
            Some(self.value())
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct ParameterTable {
    params: Vec<Parameter>,
    slots: Vec<ScheduledParameterUpdate>,
    has_output: bool,
}

impl ParameterTable {
    pub fn from_params(params: Vec<Parameter>) -> Self {
        let slots = params
            .iter()
            .map(|p| ScheduledParameterUpdate::new(p.native_id, p.cookie, p.ranges.def))
            .collect();
        let has_output = params.iter().any(|p| p.kind == ParameterType::Output);
        Self {
            params,
            slots,
            has_output,
        }
    }

    /// Query every parameter from the instance. Failed queries are skipped
    /// and do not consume a host index.
    pub fn from_native(instance: &dyn NativeInstance) -> Self {
        let count = if instance.extensions().params {
            instance.param_count()
        } else {
            0
        };
        let mut params = Vec::with_capacity(count as usize);
        for native_index in 0..count {
            let Some(info) = instance.param_info(native_index) else {
                warn!(native_index, "parameter info query failed, skipping");
                continue;
            };
            params.push(Parameter::from_native(params.len() as u32, &info));
        }
        Self::from_params(params)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&Parameter> {
        self.params.get(index as usize)
    }

    pub fn slot(&self, index: u32) -> Option<&ScheduledParameterUpdate> {
        self.slots.get(index as usize)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.params.iter()
    }

    pub fn has_output(&self) -> bool {
        self.has_output
    }

    pub fn index_of(&self, native_id: u32) -> Option<u32> {
        self.params
            .iter()
            .position(|p| p.native_id == native_id)
            .map(|i| i as u32)
    }
}

/// Routes host parameter writes to the plugin.
///
/// `set_value` is for non-realtime threads; `set_value_rt` and `drain_into`
/// only run on the audio thread inside `process()`.
pub struct ParameterScheduler {
    table: ArcSwap<ParameterTable>,
}

impl Default for ParameterScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterScheduler {
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(ParameterTable::default()),
        }
    }

    /// Install a freshly built table. Pending writes on the old one are dropped.
    pub fn publish(&self, table: ParameterTable) {
        self.table.store(Arc::new(table));
    }

    pub fn table(&self) -> Guard<Arc<ParameterTable>> {
        self.table.load()
    }

    pub fn count(&self) -> u32 {
        self.table.load().len() as u32
    }

    fn out_of_range(&self, index: u32) -> AdapterError {
        AdapterError::ParameterOutOfRange {
            index,
            count: self.count(),
        }
    }

    /// `[any non-realtime thread]` Clamp and schedule for the next block.
    /// Returns the value actually stored.
    pub fn set_value(&self, index: u32, value: f64) -> Result<f64> {
        let table = self.table.load();
        let (Some(param), Some(slot)) = (table.get(index), table.slot(index)) else {
            return Err(self.out_of_range(index));
        };
        let fixed = param.ranges.fixed_value(value);
        slot.store(fixed);
        Ok(fixed)
    }

    /// Scheduled value not yet seen by the plugin.
    pub fn pending_value(&self, index: u32) -> Option<f64> {
        let table = self.table.load();
        let slot = table.slot(index)?;
        slot.is_updated().then(|| slot.value())
    }

    /// Last value written through the scheduler, pending or not.
    pub fn last_value(&self, index: u32) -> Option<f64> {
        self.table.load().slot(index).map(|s| s.value())
    }

    pub fn has_pending(&self) -> bool {
        self.table.load().slots.iter().any(|s| s.is_updated())
    }

    /// `[audio-thread]` Move every raised slot into `list` at frame 0,
    /// at most one event per parameter.
    pub fn drain_into(&self, list: &mut EventList) -> usize {
        let table = self.table.load();
        let mut count = 0;
        for slot in &table.slots {
            if let Some(value) = slot.take() {
                list.push(NativeEvent::param_value(
                    false,
                    0,
                    slot.native_id,
                    slot.cookie,
                    value,
                ));
                count += 1;
            }
        }
        count
    }

    /// `[audio-thread]` Append a live update at `frame`, bypassing the slot.
    pub fn set_value_rt(&self, list: &mut EventList, index: u32, value: f64, frame: u32) -> bool {
        let table = self.table.load();
        let Some(param) = table.get(index) else {
            return false;
        };
        let fixed = param.ranges.fixed_value(value);
        list.push(NativeEvent::param_value(
            true,
            frame,
            param.native_id,
            param.cookie,
            fixed,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::NativeParamFlags;

    fn info(id: u32, min: f64, max: f64, flags: NativeParamFlags) -> NativeParamInfo {
        NativeParamInfo {
            id,
            cookie: Cookie::default(),
            name: format!("param{id}"),
            module: String::new(),
            min_value: min,
            max_value: max,
            default_value: min,
            flags,
        }
    }

    fn automatable() -> NativeParamFlags {
        NativeParamFlags {
            automatable: true,
            ..Default::default()
        }
    }

    fn scheduler(count: u32) -> ParameterScheduler {
        let params = (0..count)
            .map(|i| Parameter::from_native(i, &info(100 + i, 0.0, 1.0, automatable())))
            .collect();
        let scheduler = ParameterScheduler::new();
        scheduler.publish(ParameterTable::from_params(params));
        scheduler
    }

    fn param_values(list: &EventList) -> Vec<(u32, u32, f64, bool)> {
        list.iter()
            .filter_map(|e| match e {
                NativeEvent::ParamValue(p) => Some((p.param_id, p.header.time, p.value, e.is_live())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_degenerate_range_widened() {
        let param = Parameter::from_native(0, &info(1, 0.5, 0.5, automatable()));
        assert_eq!(param.ranges.min, 0.5);
        assert!((param.ranges.max - 0.6).abs() < 1e-12);
        assert_eq!(param.ranges.def, 0.5);
    }

    #[test]
    fn test_parameter_type_and_steps() {
        let hidden = NativeParamFlags {
            hidden: true,
            ..Default::default()
        };
        assert_eq!(
            Parameter::from_native(0, &info(1, 0.0, 1.0, hidden)).kind,
            ParameterType::Unknown
        );

        let read_only = NativeParamFlags {
            read_only: true,
            ..Default::default()
        };
        let meter = Parameter::from_native(0, &info(2, 0.0, 1.0, read_only));
        assert_eq!(meter.kind, ParameterType::Output);
        assert!(meter.hints.contains(ParameterHints::IS_READ_ONLY));

        let stepped = NativeParamFlags {
            stepped: true,
            automatable: true,
            ..Default::default()
        };
        let toggle = Parameter::from_native(0, &info(3, 0.0, 1.0, stepped));
        assert!(toggle.hints.contains(ParameterHints::IS_BOOLEAN));
        assert!(!toggle.hints.contains(ParameterHints::CAN_BE_CV_CONTROLLED));

        assert_eq!(toggle.final_unnormalized_value(0.49), 0.0);
        assert_eq!(toggle.final_unnormalized_value(0.5), 1.0);

        let octave = Parameter::from_native(0, &info(4, -24.0, 24.0, stepped));
        assert!(octave.hints.contains(ParameterHints::IS_INTEGER));
        assert_eq!(octave.ranges.step_large, 10.0);
        assert_eq!(octave.final_unnormalized_value(0.51), 0.0);

        let gain = Parameter::from_native(0, &info(5, 0.0, 2.0, automatable()));
        assert!((gain.ranges.step - 0.02).abs() < 1e-12);
        assert!((gain.ranges.step_small - 0.002).abs() < 1e-12);
        assert!(gain.hints.contains(ParameterHints::CAN_BE_CV_CONTROLLED));
    }

    #[test]
    fn test_set_value_clamps() {
        let scheduler = scheduler(2);
        assert_eq!(scheduler.set_value(0, 4.0).unwrap(), 1.0);
        assert_eq!(scheduler.set_value(1, -1.0).unwrap(), 0.0);
        assert_eq!(scheduler.pending_value(0), Some(1.0));
        assert!(matches!(
            scheduler.set_value(5, 0.5),
            Err(AdapterError::ParameterOutOfRange { index: 5, count: 2 })
        ));
    }

    #[test]
    fn test_drain_emits_once_with_last_value() {
        let scheduler = scheduler(3);
        scheduler.set_value(1, 0.2).unwrap();
        scheduler.set_value(1, 0.7).unwrap();
        scheduler.set_value(1, 0.4).unwrap();

        let mut list = EventList::with_capacity(16);
        assert_eq!(scheduler.drain_into(&mut list), 1);
        assert_eq!(param_values(&list), vec![(101, 0, 0.4, false)]);
        assert!(scheduler.pending_value(1).is_none());

        list.clear();
        assert_eq!(scheduler.drain_into(&mut list), 0);
        assert!(list.is_empty());
    }

    #[test]
    fn test_scheduled_before_realtime_updates() {
        let scheduler = scheduler(2);
        scheduler.set_value(0, 0.25).unwrap();

        let mut list = EventList::with_capacity(16);
        scheduler.drain_into(&mut list);
        assert!(scheduler.set_value_rt(&mut list, 1, 0.9, 32));
        assert!(!scheduler.set_value_rt(&mut list, 9, 0.9, 32));

        assert_eq!(
            param_values(&list),
            vec![(100, 0, 0.25, false), (101, 32, 0.9, true)]
        );
    }

    #[test]
    fn test_publish_replaces_table() {
        let scheduler = scheduler(2);
        scheduler.set_value(0, 0.5).unwrap();
        scheduler.publish(ParameterTable::default());
        assert_eq!(scheduler.count(), 0);
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn test_concurrent_writer_and_drainer() {
        let scheduler = Arc::new(scheduler(4));
        let writer = {
            let scheduler = Arc::clone(&scheduler);
            std::thread::spawn(move || {
                for i in 0..1000u32 {
                    scheduler.set_value(i % 4, f64::from(i % 100) / 100.0).unwrap();
                }
            })
        };

        let mut list = EventList::with_capacity(8);
        for _ in 0..200 {
            list.clear();
            scheduler.drain_into(&mut list);
            assert!(list.len() <= 4);
        }
        writer.join().unwrap();
        list.clear();
        scheduler.drain_into(&mut list);
        assert!(list.len() <= 4);
    }

    #[test]
    fn test_table_index_lookup_and_mapping() {
        let scheduler = scheduler(3);
        let table = scheduler.table();
        assert_eq!(table.index_of(102), Some(2));
        assert_eq!(table.index_of(7), None);

        let param = table.get(1).unwrap();
        assert_eq!(param.mapped_control(), CONTROL_INDEX_NONE);
        param.set_mapping(74, 0x13);
        assert_eq!(param.mapped_control(), 74);
        assert_eq!(param.midi_channel(), 3);
    }

    #[test]
    fn test_normalize_roundtrip_bounds() {
        let ranges = Parameter::from_native(0, &info(1, -12.0, 12.0, automatable())).ranges;
        assert_eq!(ranges.normalized_value(0.0), 0.5);
        assert_eq!(ranges.unnormalized_value(1.5), 12.0);
        assert_eq!(ranges.fixed_value(f64::NAN), -12.0);
    }
}
