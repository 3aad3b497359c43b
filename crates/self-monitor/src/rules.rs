// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Rule set applied to self-monitor metric events.
//!
//! Rules are ordered; the first rule whose category list covers an event
//! decides its fate. A disabled rule drops the event, `interval` down-samples
//! it, and `extra_labels` are appended before aggregation. Events with no
//! matching rule pass through unchanged.

use std::collections::BTreeMap;

use serde::Deserialize;

use collector_core::MetricCategory;

use crate::event::SelfMonitorMetricEvent;

/// One transform rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelfMonitorMetricRule {
    /// Category names this rule covers; empty matches every category.
    pub categories: Vec<String>,
    pub enabled: bool,
    /// Emit matching events every Nth cycle.
    pub interval: u32,
    pub extra_labels: BTreeMap<String, String>,
}

impl Default for SelfMonitorMetricRule {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            enabled: true,
            interval: 1,
            extra_labels: BTreeMap::new(),
        }
    }
}

impl SelfMonitorMetricRule {
    fn matches(&self, category: MetricCategory) -> bool {
        self.categories.is_empty()
            || self
                .categories
                .iter()
                .any(|name| name == category.as_str())
    }
}

/// Ordered rule list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct SelfMonitorMetricRules {
    pub rules: Vec<SelfMonitorMetricRule>,
}

impl SelfMonitorMetricRules {
    /// First rule covering `category`, if any.
    pub fn find(&self, category: MetricCategory) -> Option<&SelfMonitorMetricRule> {
        self.rules.iter().find(|rule| rule.matches(category))
    }
}

/// Applies `rule` to `event`; `false` drops the event.
pub fn process_self_monitor_metric_event(
    event: &mut SelfMonitorMetricEvent,
    rule: &SelfMonitorMetricRule,
) -> bool {
    if !rule.enabled {
        return false;
    }
    event.interval = rule.interval.max(1);
    for (name, value) in &rule.extra_labels {
        event.labels.push((name.clone(), value.clone()));
    }
    true
}
