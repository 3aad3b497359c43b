// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared runtime surface for the collection agent.
//!
//! This crate holds the types every other part of the agent talks through:
//! the agent-level configuration document, the pipeline seam (contexts and
//! event groups handed to the external pipeline executor), and the
//! process-wide metric records the self-monitor snapshots.

pub mod config;
pub mod metrics;
pub mod pipeline;

pub use config::{AgentConfig, AgentConfigError};
pub use metrics::{
    Counter, Gauge, MetricCategory, MetricLabels, MetricManager, MetricsRecord, RecordSnapshot,
};
pub use pipeline::{MetricEvent, PipelineContext, PipelineEventGroup, PipelineSendError};
