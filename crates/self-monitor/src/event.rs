// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Self-monitor metric events and their per-cycle aggregation map.

use std::collections::BTreeMap;

use collector_core::{MetricCategory, MetricEvent, PipelineEventGroup, RecordSnapshot};

/// One record snapshot, shaped for rule matching and aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct SelfMonitorMetricEvent {
    pub category: MetricCategory,
    pub labels: Vec<(String, String)>,
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, f64>,
    pub timestamp: i64,
    /// Emit every Nth cycle; 1 means every cycle.
    pub interval: u32,
}

impl SelfMonitorMetricEvent {
    pub fn from_snapshot(snapshot: RecordSnapshot, timestamp: i64) -> Self {
        Self {
            category: snapshot.category,
            labels: snapshot.labels,
            counters: snapshot.counters.into_iter().collect(),
            gauges: snapshot.gauges.into_iter().collect(),
            timestamp,
            interval: 1,
        }
    }

    /// Aggregation key: category plus the canonicalized label set.
    pub fn key(&self) -> String {
        let mut sorted = self.labels.clone();
        sorted.sort();
        let mut key = self.category.as_str().to_string();
        for (name, value) in &sorted {
            key.push('\u{1e}');
            key.push_str(name);
            key.push('=');
            key.push_str(value);
        }
        key
    }
}

/// One aggregated entry plus the number of cycles it has been held.
#[derive(Debug)]
struct PendingEvent {
    event: SelfMonitorMetricEvent,
    cycles: u32,
}

/// Keyed event map; same-key events merge within a cycle and accumulate
/// across down-sampled cycles.
#[derive(Debug, Default)]
pub struct SelfMonitorMetricEventMap {
    entries: BTreeMap<String, PendingEvent>,
}

impl SelfMonitorMetricEventMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges one event: counters add, gauges take the latest value.
    pub fn push(&mut self, event: SelfMonitorMetricEvent) {
        let key = event.key();
        match self.entries.get_mut(&key) {
            Some(pending) => {
                for (name, value) in event.counters {
                    *pending.event.counters.entry(name).or_insert(0) += value;
                }
                pending.event.gauges.extend(event.gauges);
                pending.event.timestamp = event.timestamp;
                pending.event.interval = event.interval;
            }
            None => {
                self.entries.insert(key, PendingEvent { event, cycles: 0 });
            }
        }
    }

    /// Closes one cycle: every entry ages by one; entries held for at least
    /// their interval flatten into the returned event group and are removed.
    pub fn read_as_pipeline_event_group(&mut self) -> PipelineEventGroup {
        let mut group = PipelineEventGroup::default();
        group
            .metadata
            .insert("__internal__".to_string(), "true".to_string());

        let mut due = Vec::new();
        for (key, pending) in &mut self.entries {
            pending.cycles += 1;
            if pending.cycles >= pending.event.interval.max(1) {
                due.push(key.clone());
            }
        }
        for key in due {
            let Some(pending) = self.entries.remove(&key) else {
                continue;
            };
            let event = pending.event;
            let mut tags = event.labels.clone();
            tags.push(("category".to_string(), event.category.as_str().to_string()));
            for (name, value) in event.counters {
                group.events.push(MetricEvent {
                    name,
                    tags: tags.clone(),
                    value: value as f64,
                    timestamp: event.timestamp,
                });
            }
            for (name, value) in event.gauges {
                group.events.push(MetricEvent {
                    name,
                    tags: tags.clone(),
                    value,
                    timestamp: event.timestamp,
                });
            }
        }
        group
    }
}
