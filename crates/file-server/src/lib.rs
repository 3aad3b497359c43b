// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-wide file-server registry.
//!
//! One [`FileServer`] is constructed at agent boot and shared as an `Arc`.
//! Pipeline lifecycle code registers the per-pipeline discovery, reader,
//! multiline, and tag configurations here; the tailing workers look them up
//! on the hot path. A single read-write lock guards all maps: mutators take
//! it exclusively, accessors take it shared, and `get_all_*` methods return
//! snapshots so iteration never holds the lock.

pub mod options;

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use collector_core::{
    MetricCategory, MetricLabels, MetricManager, MetricsRecord, PipelineContext,
};

pub use options::{
    ContainerInfo, FileDiscoveryOptions, FileReaderOptions, FileTagOptions, Mount,
    MultilineOptions,
};

/// Registered discovery options plus the owning pipeline's context.
pub type FileDiscoveryConfig = (Arc<FileDiscoveryOptions>, Arc<PipelineContext>);
/// Registered reader options plus the owning pipeline's context.
pub type FileReaderConfig = (Arc<FileReaderOptions>, Arc<PipelineContext>);
/// Registered multiline options plus the owning pipeline's context.
pub type MultilineConfig = (Arc<MultilineOptions>, Arc<PipelineContext>);
/// Registered tag options plus the owning pipeline's context.
pub type FileTagConfig = (Arc<FileTagOptions>, Arc<PipelineContext>);

/// Seam to the external tailing runner.
///
/// `pause(true)` / `resume(true)` bracket a config update and must preserve
/// in-flight reader state; `pause(false)` is a full quiesce (flush and drop
/// reader state).
pub trait TailingEngine: Send + Sync {
    fn start(&self);
    fn pause(&self, is_config_update: bool);
    fn resume(&self, is_config_update: bool);
    fn stop(&self);
}

/// Engine stub for tests and for running the registry headless.
#[derive(Debug, Default)]
pub struct NoopTailingEngine;

impl TailingEngine for NoopTailingEngine {
    fn start(&self) {}
    fn pause(&self, _is_config_update: bool) {}
    fn resume(&self, _is_config_update: bool) {}
    fn stop(&self) {}
}

/// Per-pipeline factory for plugin metric records sharing default labels.
#[derive(Debug)]
pub struct PluginMetricManager {
    manager: Arc<MetricManager>,
    default_labels: MetricLabels,
}

impl PluginMetricManager {
    pub fn new(manager: Arc<MetricManager>, default_labels: MetricLabels) -> Self {
        Self {
            manager,
            default_labels,
        }
    }

    /// Registers a plugin record carrying the default labels plus `extra`.
    pub fn create_record(&self, extra: MetricLabels) -> Arc<MetricsRecord> {
        let mut labels = self.default_labels.clone();
        labels.extend(extra);
        self.manager.register(MetricCategory::Plugin, labels)
    }

    pub fn default_labels(&self) -> &MetricLabels {
        &self.default_labels
    }
}

/// Key for reentrant metric records: name plus canonicalized labels.
fn reentrant_key(name: &str, labels: &MetricLabels) -> String {
    let mut sorted = labels.clone();
    sorted.sort();
    let mut key = String::from(name);
    for (k, v) in &sorted {
        key.push('\u{1e}');
        key.push_str(k);
        key.push('=');
        key.push_str(v);
    }
    key
}

#[derive(Default)]
struct Registry {
    discovery_configs: HashMap<String, FileDiscoveryConfig>,
    reader_configs: HashMap<String, FileReaderConfig>,
    multiline_configs: HashMap<String, MultilineConfig>,
    tag_configs: HashMap<String, FileTagConfig>,
    container_info: HashMap<String, Arc<Vec<ContainerInfo>>>,
    plugin_metric_managers: HashMap<String, Arc<PluginMetricManager>>,
    reentrant_records: HashMap<String, (Arc<MetricsRecord>, u32)>,
    exactly_once_concurrency: HashMap<String, u32>,
}

/// Process-wide catalog of per-pipeline file collection state.
pub struct FileServer {
    registry: RwLock<Registry>,
    metric_manager: Arc<MetricManager>,
    engine: Box<dyn TailingEngine>,
    metrics: Arc<MetricsRecord>,
}

impl FileServer {
    pub fn new(metric_manager: Arc<MetricManager>, engine: Box<dyn TailingEngine>) -> Self {
        let metrics = metric_manager.register(
            MetricCategory::Runner,
            vec![("runner_name".to_string(), "file_server".to_string())],
        );
        Self {
            registry: RwLock::new(Registry::default()),
            metric_manager,
            engine,
            metrics,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    // Lifecycle. Pause and resume hold the write lock so no reader observes
    // the registry mid-reconfiguration.

    pub fn start(&self) {
        self.engine.start();
        debug!("file server started");
    }

    pub fn pause(&self, is_config_update: bool) {
        let mut registry = self.write();
        self.engine.pause(is_config_update);
        if !is_config_update {
            // Readers will be rebuilt from scratch; stale container handoffs
            // must not leak into the next generation.
            registry.container_info.clear();
        }
        self.metrics.counter("pause_total").inc();
        debug!(is_config_update, "file server paused");
    }

    pub fn resume(&self, is_config_update: bool) {
        let _registry = self.write();
        self.engine.resume(is_config_update);
        self.metrics.counter("resume_total").inc();
        debug!(is_config_update, "file server resumed");
    }

    pub fn stop(&self) {
        self.engine.stop();
        debug!("file server stopped");
    }

    // File discovery configs.

    pub fn add_file_discovery_config(
        &self,
        name: &str,
        options: Arc<FileDiscoveryOptions>,
        ctx: Arc<PipelineContext>,
    ) {
        self.write()
            .discovery_configs
            .insert(name.to_string(), (options, ctx));
    }

    pub fn remove_file_discovery_config(&self, name: &str) {
        self.write().discovery_configs.remove(name);
    }

    pub fn get_file_discovery_config(&self, name: &str) -> Option<FileDiscoveryConfig> {
        self.read().discovery_configs.get(name).cloned()
    }

    pub fn get_all_file_discovery_configs(&self) -> HashMap<String, FileDiscoveryConfig> {
        self.read().discovery_configs.clone()
    }

    // File reader configs.

    pub fn add_file_reader_config(
        &self,
        name: &str,
        options: Arc<FileReaderOptions>,
        ctx: Arc<PipelineContext>,
    ) {
        self.write()
            .reader_configs
            .insert(name.to_string(), (options, ctx));
    }

    pub fn remove_file_reader_config(&self, name: &str) {
        self.write().reader_configs.remove(name);
    }

    pub fn get_file_reader_config(&self, name: &str) -> Option<FileReaderConfig> {
        self.read().reader_configs.get(name).cloned()
    }

    pub fn get_all_file_reader_configs(&self) -> HashMap<String, FileReaderConfig> {
        self.read().reader_configs.clone()
    }

    // Multiline configs.

    pub fn add_multiline_config(
        &self,
        name: &str,
        options: Arc<MultilineOptions>,
        ctx: Arc<PipelineContext>,
    ) {
        self.write()
            .multiline_configs
            .insert(name.to_string(), (options, ctx));
    }

    pub fn remove_multiline_config(&self, name: &str) {
        self.write().multiline_configs.remove(name);
    }

    pub fn get_multiline_config(&self, name: &str) -> Option<MultilineConfig> {
        self.read().multiline_configs.get(name).cloned()
    }

    pub fn get_all_multiline_configs(&self) -> HashMap<String, MultilineConfig> {
        self.read().multiline_configs.clone()
    }

    // File tag configs.

    pub fn add_file_tag_config(
        &self,
        name: &str,
        options: Arc<FileTagOptions>,
        ctx: Arc<PipelineContext>,
    ) {
        self.write()
            .tag_configs
            .insert(name.to_string(), (options, ctx));
    }

    pub fn remove_file_tag_config(&self, name: &str) {
        self.write().tag_configs.remove(name);
    }

    pub fn get_file_tag_config(&self, name: &str) -> Option<FileTagConfig> {
        self.read().tag_configs.get(name).cloned()
    }

    pub fn get_all_file_tag_configs(&self) -> HashMap<String, FileTagConfig> {
        self.read().tag_configs.clone()
    }

    // Container metadata: one-shot handoff from discovery to the readers.

    pub fn save_container_info(&self, pipeline: &str, info: Arc<Vec<ContainerInfo>>) {
        self.write()
            .container_info
            .insert(pipeline.to_string(), info);
    }

    pub fn get_and_remove_container_info(&self, pipeline: &str) -> Option<Arc<Vec<ContainerInfo>>> {
        self.write().container_info.remove(pipeline)
    }

    pub fn clear_container_info(&self) {
        self.write().container_info.clear();
    }

    // Plugin metric managers.

    pub fn add_plugin_metric_manager(&self, name: &str, manager: Arc<PluginMetricManager>) {
        self.write()
            .plugin_metric_managers
            .insert(name.to_string(), manager);
    }

    pub fn remove_plugin_metric_manager(&self, name: &str) {
        self.write().plugin_metric_managers.remove(name);
    }

    pub fn get_plugin_metric_manager(&self, name: &str) -> Option<Arc<PluginMetricManager>> {
        self.read().plugin_metric_managers.get(name).cloned()
    }

    // Reentrant metric records: readers and event handlers acquire by
    // (name, labels); only the last release frees the record.

    pub fn get_or_create_reentrant_metrics_record_ref(
        &self,
        name: &str,
        labels: &MetricLabels,
    ) -> Arc<MetricsRecord> {
        let key = reentrant_key(name, labels);
        let mut registry = self.write();
        if let Some((record, count)) = registry.reentrant_records.get_mut(&key) {
            *count += 1;
            return Arc::clone(record);
        }
        let record = self
            .metric_manager
            .register(MetricCategory::Component, labels.clone());
        registry
            .reentrant_records
            .insert(key, (Arc::clone(&record), 1));
        record
    }

    pub fn release_reentrant_metrics_record_ref(&self, name: &str, labels: &MetricLabels) {
        let key = reentrant_key(name, labels);
        let mut registry = self.write();
        match registry.reentrant_records.get_mut(&key) {
            Some((_, count)) if *count > 1 => *count -= 1,
            Some(_) => {
                registry.reentrant_records.remove(&key);
            }
            None => {
                warn!(name, "released an unknown reentrant metrics record");
            }
        }
    }

    /// The registry's own metrics record.
    pub fn metrics_record(&self) -> &Arc<MetricsRecord> {
        &self.metrics
    }

    // Exactly-once bookkeeping: readers that support exactly-once semantics
    // size their in-flight window from this map.

    pub fn add_exactly_once_concurrency(&self, name: &str, concurrency: u32) {
        self.write()
            .exactly_once_concurrency
            .insert(name.to_string(), concurrency);
    }

    pub fn remove_exactly_once_concurrency(&self, name: &str) {
        self.write().exactly_once_concurrency.remove(name);
    }

    pub fn get_exactly_once_concurrency(&self, name: &str) -> Option<u32> {
        self.read().exactly_once_concurrency.get(name).copied()
    }

    pub fn get_exactly_once_configs(&self) -> Vec<String> {
        self.read()
            .exactly_once_concurrency
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn new_file_server() -> (Arc<FileServer>, Arc<MetricManager>) {
        let manager = Arc::new(MetricManager::new());
        let server = Arc::new(FileServer::new(
            Arc::clone(&manager),
            Box::new(NoopTailingEngine),
        ));
        (server, manager)
    }

    fn pipeline(name: &str) -> Arc<PipelineContext> {
        let (ctx, _rx) = PipelineContext::new(name, 1);
        Arc::new(ctx)
    }

    #[test]
    fn add_remove_get_roundtrip() {
        let (server, _) = new_file_server();
        let ctx = pipeline("p1");
        let options = Arc::new(FileDiscoveryOptions {
            file_paths: vec!["/var/log/*.log".into()],
            ..Default::default()
        });

        server.add_file_discovery_config("p1", Arc::clone(&options), Arc::clone(&ctx));
        let (stored, stored_ctx) = server.get_file_discovery_config("p1").expect("registered");
        assert_eq!(stored.file_paths, options.file_paths);
        assert_eq!(stored_ctx.name(), "p1");

        server.remove_file_discovery_config("p1");
        assert!(server.get_file_discovery_config("p1").is_none());

        // Removing again is a no-op, getting unknown names returns none.
        server.remove_file_discovery_config("p1");
        assert!(server.get_file_reader_config("unknown").is_none());
    }

    #[test]
    fn duplicate_add_overwrites_silently() {
        let (server, _) = new_file_server();
        let ctx1 = pipeline("p1");
        let ctx2 = pipeline("p1");
        let first = Arc::new(FileReaderOptions {
            tail_size_kb: 256,
            ..Default::default()
        });
        let second = Arc::new(FileReaderOptions {
            tail_size_kb: 512,
            ..Default::default()
        });

        server.add_file_reader_config("p1", first, ctx1);
        server.add_file_reader_config("p1", Arc::clone(&second), ctx2);

        let (stored, _) = server.get_file_reader_config("p1").expect("registered");
        assert_eq!(stored.tail_size_kb, 512);
        assert_eq!(server.get_all_file_reader_configs().len(), 1);
    }

    #[test]
    fn container_info_handoff_is_one_shot() {
        let (server, _) = new_file_server();
        let info = Arc::new(vec![ContainerInfo {
            id: "abc".into(),
            ..Default::default()
        }]);
        server.save_container_info("p1", Arc::clone(&info));

        let taken = server.get_and_remove_container_info("p1").expect("saved");
        assert_eq!(taken[0].id, "abc");
        assert!(server.get_and_remove_container_info("p1").is_none());
    }

    #[test]
    fn full_pause_clears_container_info_but_config_update_does_not() {
        let (server, _) = new_file_server();
        server.save_container_info("p1", Arc::new(vec![ContainerInfo::default()]));
        server.pause(true);
        assert!(server.get_and_remove_container_info("p1").is_some());

        server.save_container_info("p1", Arc::new(vec![ContainerInfo::default()]));
        server.pause(false);
        assert!(server.get_and_remove_container_info("p1").is_none());
    }

    #[test]
    fn reentrant_records_refcount_acquisitions() {
        let (server, manager) = new_file_server();
        let labels: MetricLabels = vec![
            ("pipeline_name".into(), "p1".into()),
            ("plugin_id".into(), "2".into()),
        ];

        let a = server.get_or_create_reentrant_metrics_record_ref("reader", &labels);
        let b = server.get_or_create_reentrant_metrics_record_ref("reader", &labels);
        assert!(Arc::ptr_eq(&a, &b));
        a.counter("open_files").inc();

        // Label order does not matter for the key.
        let shuffled: MetricLabels = vec![
            ("plugin_id".into(), "2".into()),
            ("pipeline_name".into(), "p1".into()),
        ];
        server.release_reentrant_metrics_record_ref("reader", &shuffled);
        let c = server.get_or_create_reentrant_metrics_record_ref("reader", &labels);
        assert!(Arc::ptr_eq(&a, &c));

        server.release_reentrant_metrics_record_ref("reader", &labels);
        server.release_reentrant_metrics_record_ref("reader", &labels);
        drop((a, b, c));

        // All handles gone: the manager prunes the record on snapshot.
        assert_eq!(
            manager
                .snapshot()
                .iter()
                .filter(|s| s.category == MetricCategory::Component)
                .count(),
            0
        );
    }

    #[test]
    fn exactly_once_map_mirrors_lifecycle() {
        let (server, _) = new_file_server();
        server.add_exactly_once_concurrency("p1", 8);
        server.add_exactly_once_concurrency("p2", 4);
        assert_eq!(server.get_exactly_once_concurrency("p1"), Some(8));

        let mut names = server.get_exactly_once_configs();
        names.sort();
        assert_eq!(names, vec!["p1".to_string(), "p2".to_string()]);

        server.remove_exactly_once_concurrency("p1");
        assert_eq!(server.get_exactly_once_concurrency("p1"), None);
    }

    #[test]
    fn plugin_metric_manager_applies_default_labels() {
        let (server, manager) = new_file_server();
        let plugin_manager = Arc::new(PluginMetricManager::new(
            Arc::clone(&manager),
            vec![("pipeline_name".into(), "p1".into())],
        ));
        server.add_plugin_metric_manager("p1", Arc::clone(&plugin_manager));

        let record = server
            .get_plugin_metric_manager("p1")
            .expect("registered")
            .create_record(vec![("plugin_id".into(), "2".into())]);
        assert_eq!(
            record.labels(),
            &vec![
                ("pipeline_name".to_string(), "p1".to_string()),
                ("plugin_id".to_string(), "2".to_string()),
            ]
        );

        server.remove_plugin_metric_manager("p1");
        assert!(server.get_plugin_metric_manager("p1").is_none());
    }

    struct RecordingEngine {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl TailingEngine for RecordingEngine {
        fn start(&self) {
            self.calls.lock().unwrap().push("start".into());
        }
        fn pause(&self, is_config_update: bool) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("pause({is_config_update})"));
        }
        fn resume(&self, is_config_update: bool) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("resume({is_config_update})"));
        }
        fn stop(&self) {
            self.calls.lock().unwrap().push("stop".into());
        }
    }

    #[test]
    fn lifecycle_delegates_to_the_engine() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let engine = Box::new(RecordingEngine {
            calls: Arc::clone(&calls),
        });
        let manager = Arc::new(MetricManager::new());
        let server = FileServer::new(manager, engine);

        server.start();
        server.pause(true);
        server.resume(true);
        server.stop();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["start", "pause(true)", "resume(true)", "stop"]
        );
    }
}
