// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Collection agent entry point.
//!
//! Boots the pipeline lifecycle fabric: the metric manager, the file-server
//! registry, the self-monitor, and the remote config provider are
//! constructed once here and handed to each other explicitly. The pipeline
//! executor and the tailing engine are external; the registry runs against
//! a no-op engine until one is attached.

use std::{env, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use collector_core::{AgentConfig, MetricManager, PipelineContext};
use file_server::{FileServer, NoopTailingEngine};
use remote_config_provider::{AgentIdentity, ProviderConfig, RemoteConfigProvider};
use self_monitor::{SelfMonitorMetricRules, SelfMonitorServer};

const DEFAULT_CONFIG_FILE: &str = "collector_config.json";
const DEFAULT_PIPELINE_DIR: &str = "continuous_pipeline_config";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("COLLECTOR_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("hyper=off,reqwest=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_target(true)
        .finish();
    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config_path = env::args().nth(1).unwrap_or(DEFAULT_CONFIG_FILE.to_string());
    let agent_config = match AgentConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = config_path.as_str(), error = %e, "agent config unavailable, using defaults");
            AgentConfig::empty()
        }
    };

    let hostname = env::var("HOSTNAME").unwrap_or_default();
    let identity = AgentIdentity {
        agent_id: agent_config.string_or(
            "agent_instance_id",
            &format!("{}-{}", hostname, std::process::id()),
        ),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ip: agent_config.string_or("agent_ip", "127.0.0.1"),
        hostname: agent_config.string_or("agent_hostname", &hostname),
    };
    info!(agent_id = identity.agent_id.as_str(), "collection agent starting");

    let shutdown = CancellationToken::new();
    let metric_manager = Arc::new(MetricManager::new());

    let file_server = Arc::new(FileServer::new(
        Arc::clone(&metric_manager),
        Box::new(NoopTailingEngine),
    ));
    file_server.start();

    // The executor side of the self-monitor pipeline is not wired in this
    // binary; drain the queue so emission never backs up.
    let (metric_ctx, mut metric_rx) = PipelineContext::new("self-monitor-metrics", 1);
    tokio::spawn(async move {
        while let Some(group) = metric_rx.recv().await {
            debug!(events = group.events.len(), "self monitor event group");
        }
    });

    let rules: SelfMonitorMetricRules = agent_config
        .get("self_monitor_rules")
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default();
    let self_monitor = Arc::new(SelfMonitorServer::new(Arc::clone(&metric_manager)));
    self_monitor.update_metric_pipeline(Arc::new(metric_ctx), rules);
    let monitor_task = tokio::spawn(Arc::clone(&self_monitor).run(shutdown.clone()));

    let pipeline_dir = agent_config.string_or("continuous_pipeline_config_dir", DEFAULT_PIPELINE_DIR);
    let provider_config = ProviderConfig::from_agent_config(&agent_config, pipeline_dir, identity);
    let provider = match RemoteConfigProvider::spawn(provider_config) {
        Ok(provider) => Some(provider),
        Err(e) => {
            error!(error = %e, "failed to start remote config provider");
            None
        }
    };

    if tokio::signal::ctrl_c().await.is_err() {
        error!("failed to listen for shutdown signal");
    }
    info!("collection agent shutting down");

    if let Some(provider) = provider {
        provider.stop().await;
    }
    shutdown.cancel();
    if tokio::time::timeout(Duration::from_secs(1), monitor_task)
        .await
        .is_err()
    {
        warn!("self monitor forced to stop");
    }
    file_server.stop();
    info!("collection agent stopped");
}
