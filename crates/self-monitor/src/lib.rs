// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Self-monitor server.
//!
//! Periodically turns the agent's own metric records into pipeline events:
//! each tick snapshots the metric manager, transforms every record through
//! the first matching rule, merges same-key events, and submits the
//! flattened group into the attached metric pipeline. Detached, the cycles
//! are no-ops.

pub mod event;
pub mod rules;

use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use collector_core::{MetricManager, PipelineContext};

pub use event::{SelfMonitorMetricEvent, SelfMonitorMetricEventMap};
pub use rules::{process_self_monitor_metric_event, SelfMonitorMetricRule, SelfMonitorMetricRules};

/// Default cadence of the monitor loop.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

struct MetricPipeline {
    ctx: Arc<PipelineContext>,
    rules: SelfMonitorMetricRules,
}

/// Emits the agent's own metrics into a designated pipeline.
pub struct SelfMonitorServer {
    metric_manager: Arc<MetricManager>,
    tick_interval: Duration,
    metric_pipeline: RwLock<Option<MetricPipeline>>,
    alarm_pipeline: Mutex<Option<Arc<PipelineContext>>>,
    event_map: Mutex<SelfMonitorMetricEventMap>,
}

impl SelfMonitorServer {
    pub fn new(metric_manager: Arc<MetricManager>) -> Self {
        Self::with_interval(metric_manager, DEFAULT_MONITOR_INTERVAL)
    }

    pub fn with_interval(metric_manager: Arc<MetricManager>, tick_interval: Duration) -> Self {
        Self {
            metric_manager,
            tick_interval,
            metric_pipeline: RwLock::new(None),
            alarm_pipeline: Mutex::new(None),
            event_map: Mutex::new(SelfMonitorMetricEventMap::new()),
        }
    }

    /// Installs or replaces the metric pipeline and its rule set; subsequent
    /// cycles emit into this context.
    pub fn update_metric_pipeline(&self, ctx: Arc<PipelineContext>, rules: SelfMonitorMetricRules) {
        let mut pipeline = self
            .metric_pipeline
            .write()
            .unwrap_or_else(|e| e.into_inner());
        debug!(pipeline = ctx.name(), "metric pipeline attached");
        *pipeline = Some(MetricPipeline { ctx, rules });
    }

    /// Detaches the metric pipeline; cycles become no-ops.
    pub fn remove_metric_pipeline(&self) {
        let mut pipeline = self
            .metric_pipeline
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *pipeline = None;
        debug!("metric pipeline detached");
    }

    /// Installs or replaces the alarm pipeline. Alarm emission is not wired
    /// yet; the context is retained for when it is.
    pub fn update_alarm_pipeline(&self, ctx: Arc<PipelineContext>) {
        let mut pipeline = self.alarm_pipeline.lock().unwrap_or_else(|e| e.into_inner());
        *pipeline = Some(ctx);
    }

    pub fn alarm_pipeline(&self) -> Option<Arc<PipelineContext>> {
        self.alarm_pipeline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Runs the monitor loop until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        debug!("self monitor started");
        let mut tick = interval(self.tick_interval);
        // The first tick fires immediately; skip it so a fresh agent does not
        // emit an empty cycle at boot.
        tick.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("self monitor shutting down");
                    break;
                }
                _ = tick.tick() => {
                    self.monitor_once(unix_timestamp());
                }
            }
        }
        debug!("self monitor stopped");
    }

    /// One monitor cycle: snapshot, transform, aggregate, submit.
    pub fn monitor_once(&self, timestamp: i64) {
        let pipeline = self
            .metric_pipeline
            .read()
            .unwrap_or_else(|e| e.into_inner());
        let Some(pipeline) = pipeline.as_ref() else {
            return;
        };

        let mut event_map = self.event_map.lock().unwrap_or_else(|e| e.into_inner());
        for snapshot in self.metric_manager.snapshot() {
            let mut event = SelfMonitorMetricEvent::from_snapshot(snapshot, timestamp);
            if let Some(rule) = pipeline.rules.find(event.category) {
                if !process_self_monitor_metric_event(&mut event, rule) {
                    continue;
                }
            }
            event_map.push(event);
        }

        let group = event_map.read_as_pipeline_event_group();
        if group.events.is_empty() {
            return;
        }
        if let Err(e) = pipeline.ctx.submit(group) {
            warn!(error = %e, "failed to submit self monitor metrics");
        }
    }
}

fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use collector_core::MetricCategory;

    fn server_with_pipeline(
        rules: SelfMonitorMetricRules,
    ) -> (
        Arc<SelfMonitorServer>,
        Arc<MetricManager>,
        tokio::sync::mpsc::UnboundedReceiver<collector_core::PipelineEventGroup>,
    ) {
        let manager = Arc::new(MetricManager::new());
        let server = Arc::new(SelfMonitorServer::new(Arc::clone(&manager)));
        let (ctx, rx) = PipelineContext::new("self-monitor", 1);
        server.update_metric_pipeline(Arc::new(ctx), rules);
        (server, manager, rx)
    }

    #[tokio::test]
    async fn cycle_emits_snapshot_into_the_attached_pipeline() {
        let (server, manager, mut rx) = server_with_pipeline(SelfMonitorMetricRules::default());
        let record = manager.register(
            MetricCategory::Pipeline,
            vec![("pipeline_name".into(), "p1".into())],
        );
        record.counter("events_total").add(9);

        server.monitor_once(1_700_000_000);
        let group = rx.try_recv().expect("one event group");
        assert_eq!(group.metadata.get("__internal__").map(String::as_str), Some("true"));
        let metric = group
            .events
            .iter()
            .find(|e| e.name == "events_total")
            .expect("counter event");
        assert_eq!(metric.value, 9.0);
        assert_eq!(metric.timestamp, 1_700_000_000);
    }

    #[tokio::test]
    async fn detached_cycles_are_noops() {
        let (server, manager, mut rx) = server_with_pipeline(SelfMonitorMetricRules::default());
        server.remove_metric_pipeline();
        let record = manager.register(MetricCategory::Agent, vec![]);
        record.counter("n").inc();

        server.monitor_once(0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn disabled_category_is_dropped() {
        let rules: SelfMonitorMetricRules = serde_json::from_value(serde_json::json!([
            {"categories": ["plugin"], "enabled": false},
        ]))
        .expect("valid rules");
        let (server, manager, mut rx) = server_with_pipeline(rules);

        let plugin = manager.register(MetricCategory::Plugin, vec![]);
        plugin.counter("dropped_total").inc();
        let agent = manager.register(MetricCategory::Agent, vec![]);
        agent.counter("kept_total").inc();

        server.monitor_once(0);
        let group = rx.try_recv().expect("one event group");
        assert!(group.events.iter().all(|e| e.name != "dropped_total"));
        assert!(group.events.iter().any(|e| e.name == "kept_total"));
    }

    #[tokio::test]
    async fn down_sampling_holds_events_across_cycles() {
        let rules: SelfMonitorMetricRules = serde_json::from_value(serde_json::json!([
            {"interval": 2},
        ]))
        .expect("valid rules");
        let (server, manager, mut rx) = server_with_pipeline(rules);
        let record = manager.register(MetricCategory::Runner, vec![]);

        record.counter("polls_total").add(1);
        server.monitor_once(0);
        assert!(rx.try_recv().is_err(), "first cycle must hold the event");

        record.counter("polls_total").add(2);
        server.monitor_once(1);
        let group = rx.try_recv().expect("second cycle emits");
        let metric = group
            .events
            .iter()
            .find(|e| e.name == "polls_total")
            .expect("counter event");
        assert_eq!(metric.value, 3.0, "counters accumulate while held");
    }

    #[tokio::test]
    async fn replacing_the_pipeline_redirects_emission() {
        let (server, manager, mut old_rx) = server_with_pipeline(SelfMonitorMetricRules::default());
        let record = manager.register(MetricCategory::Agent, vec![]);
        record.counter("n").inc();

        let (new_ctx, mut new_rx) = PipelineContext::new("replacement", 2);
        server.update_metric_pipeline(Arc::new(new_ctx), SelfMonitorMetricRules::default());

        server.monitor_once(0);
        assert!(old_rx.try_recv().is_err());
        assert!(new_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn alarm_pipeline_attachment_is_retained() {
        let (server, _, _rx) = server_with_pipeline(SelfMonitorMetricRules::default());
        assert!(server.alarm_pipeline().is_none());
        let (ctx, _alarm_rx) = PipelineContext::new("alarms", 1);
        server.update_alarm_pipeline(Arc::new(ctx));
        assert_eq!(
            server.alarm_pipeline().map(|ctx| ctx.name().to_string()),
            Some("alarms".to_string())
        );
    }

    #[tokio::test]
    async fn run_loop_exits_on_cancellation() {
        let manager = Arc::new(MetricManager::new());
        let server = Arc::new(SelfMonitorServer::with_interval(
            manager,
            Duration::from_millis(10),
        ));
        let token = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&server).run(token.clone()));
        token.cancel();
        handle.await.expect("loop task panicked");
    }
}
