// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-wide metric records.
//!
//! Components register a [`MetricsRecord`] per labelled entity (a pipeline,
//! a plugin instance, a runner) and bump its counters and gauges lock-free.
//! The self-monitor periodically calls [`MetricManager::snapshot`], which
//! drains counter deltas and reads gauge values for every live record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Ordered label pairs attached to a record.
pub type MetricLabels = Vec<(String, String)>;

/// Which part of the agent a record describes; self-monitor rules match on
/// this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricCategory {
    Agent,
    Runner,
    Pipeline,
    Component,
    Plugin,
}

impl MetricCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCategory::Agent => "agent",
            MetricCategory::Runner => "runner",
            MetricCategory::Pipeline => "pipeline",
            MetricCategory::Component => "component",
            MetricCategory::Plugin => "plugin",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "agent" => Some(Self::Agent),
            "runner" => Some(Self::Runner),
            "pipeline" => Some(Self::Pipeline),
            "component" => Some(Self::Component),
            "plugin" => Some(Self::Plugin),
            _ => None,
        }
    }
}

/// Monotonic counter; snapshots read-and-reset so each cycle sees deltas.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn add(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Returns the accumulated value and resets it to zero.
    pub fn take(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// Point-in-time value, stored as `f64` bits.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Counters and gauges for one labelled entity.
#[derive(Debug)]
pub struct MetricsRecord {
    category: MetricCategory,
    labels: MetricLabels,
    counters: Mutex<HashMap<String, Arc<Counter>>>,
    gauges: Mutex<HashMap<String, Arc<Gauge>>>,
}

impl MetricsRecord {
    fn new(category: MetricCategory, labels: MetricLabels) -> Self {
        Self {
            category,
            labels,
            counters: Mutex::new(HashMap::new()),
            gauges: Mutex::new(HashMap::new()),
        }
    }

    pub fn category(&self) -> MetricCategory {
        self.category
    }

    pub fn labels(&self) -> &MetricLabels {
        &self.labels
    }

    /// Returns the named counter, creating it on first use.
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(counters.entry(name.to_string()).or_default())
    }

    /// Returns the named gauge, creating it on first use.
    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        let mut gauges = self.gauges.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(gauges.entry(name.to_string()).or_default())
    }
}

/// Values of one record at snapshot time; counters are deltas since the
/// previous snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSnapshot {
    pub category: MetricCategory,
    pub labels: MetricLabels,
    pub counters: Vec<(String, u64)>,
    pub gauges: Vec<(String, f64)>,
}

/// Process-wide registry of metric records.
///
/// Holds weak references only; a record dies with the component that
/// registered it and is pruned on the next snapshot.
#[derive(Debug, Default)]
pub struct MetricManager {
    records: Mutex<Vec<Weak<MetricsRecord>>>,
}

impl MetricManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a record for the given entity.
    pub fn register(&self, category: MetricCategory, labels: MetricLabels) -> Arc<MetricsRecord> {
        let record = Arc::new(MetricsRecord::new(category, labels));
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push(Arc::downgrade(&record));
        record
    }

    /// Snapshots every live record, pruning dead ones.
    pub fn snapshot(&self) -> Vec<RecordSnapshot> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::with_capacity(records.len());
        records.retain(|weak| match weak.upgrade() {
            Some(record) => {
                let counters = {
                    let map = record.counters.lock().unwrap_or_else(|e| e.into_inner());
                    let mut pairs: Vec<(String, u64)> =
                        map.iter().map(|(k, v)| (k.clone(), v.take())).collect();
                    pairs.sort_by(|a, b| a.0.cmp(&b.0));
                    pairs
                };
                let gauges = {
                    let map = record.gauges.lock().unwrap_or_else(|e| e.into_inner());
                    let mut pairs: Vec<(String, f64)> =
                        map.iter().map(|(k, v)| (k.clone(), v.value())).collect();
                    pairs.sort_by(|a, b| a.0.cmp(&b.0));
                    pairs
                };
                out.push(RecordSnapshot {
                    category: record.category,
                    labels: record.labels.clone(),
                    counters,
                    gauges,
                });
                true
            }
            None => false,
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_drains_counters_and_reads_gauges() {
        let manager = MetricManager::new();
        let record = manager.register(
            MetricCategory::Pipeline,
            vec![("pipeline_name".into(), "p1".into())],
        );
        record.counter("events_total").add(5);
        record.gauge("queue_size").set(2.5);

        let first = manager.snapshot();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].counters, vec![("events_total".to_string(), 5)]);
        assert_eq!(first[0].gauges, vec![("queue_size".to_string(), 2.5)]);

        // Counters reset after a snapshot, gauges keep their value.
        let second = manager.snapshot();
        assert_eq!(second[0].counters, vec![("events_total".to_string(), 0)]);
        assert_eq!(second[0].gauges, vec![("queue_size".to_string(), 2.5)]);
    }

    #[test]
    fn dead_records_are_pruned() {
        let manager = MetricManager::new();
        let record = manager.register(MetricCategory::Plugin, vec![]);
        record.counter("n").inc();
        drop(record);
        assert!(manager.snapshot().is_empty());
    }

    #[test]
    fn counter_handles_are_shared() {
        let manager = MetricManager::new();
        let record = manager.register(MetricCategory::Runner, vec![]);
        let a = record.counter("polls_total");
        let b = record.counter("polls_total");
        a.inc();
        b.add(2);
        assert_eq!(record.counter("polls_total").value(), 3);
    }
}
