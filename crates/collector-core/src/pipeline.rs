// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pipeline seam.
//!
//! The pipeline executor lives outside this workspace; components talk to a
//! pipeline through a [`PipelineContext`], which carries the pipeline's
//! identity and the sending half of its process queue. The executor owns the
//! receiving half.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

/// One metric sample inside an event group.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEvent {
    pub name: String,
    pub tags: Vec<(String, String)>,
    pub value: f64,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
}

/// A batch of events submitted to a pipeline as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineEventGroup {
    pub metadata: BTreeMap<String, String>,
    pub events: Vec<MetricEvent>,
}

/// The pipeline's process queue is gone; the executor dropped the receiver.
#[derive(Debug, thiserror::Error)]
#[error("pipeline {pipeline} is detached, event group dropped")]
pub struct PipelineSendError {
    pub pipeline: String,
}

/// Identity of one running pipeline plus the sending half of its queue.
///
/// Contexts are shared as `Arc<PipelineContext>`; every registry entry or
/// monitor attachment derived from a context holds its own clone, so the
/// context outlives them structurally.
#[derive(Debug)]
pub struct PipelineContext {
    name: String,
    config_version: i64,
    queue: mpsc::UnboundedSender<PipelineEventGroup>,
}

impl PipelineContext {
    /// Creates a context and hands back the executor-side receiver.
    pub fn new(
        name: impl Into<String>,
        config_version: i64,
    ) -> (Self, mpsc::UnboundedReceiver<PipelineEventGroup>) {
        let (queue, rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                config_version,
                queue,
            },
            rx,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config_version(&self) -> i64 {
        self.config_version
    }

    /// Submits an event group to the pipeline's process queue.
    pub fn submit(&self, group: PipelineEventGroup) -> Result<(), PipelineSendError> {
        self.queue.send(group).map_err(|_| PipelineSendError {
            pipeline: self.name.clone(),
        })
    }
}
