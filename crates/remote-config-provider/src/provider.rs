//! Remote config provider.
//!
//! A single cooperative worker heartbeats the config server, fetches the
//! bodies of new or modified pipeline configs, and materializes them as
//! `<name>.yaml` files under the continuous-pipeline directory with
//! atomic-rename semantics. An external watcher picks the files up; the
//! provider never parses them.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use collector_core::AgentConfig;
use configserver_proto::{
    AgentAttributes, CheckStatus, ConfigCheckResult, ConfigDetail, ConfigInfo, ConfigType,
    FetchPipelineConfigRequest, HeartBeatRequest,
};

use crate::address::AddressBook;
use crate::http::{ConfigServerClient, HttpError};

/// Agent config key listing `"host:port"` config server endpoints.
pub const CONFIG_KEY_ADDRESSES: &str = "ilogtail_configserver_address";
/// Agent config key mapping tag names to tag values.
pub const CONFIG_KEY_TAGS: &str = "ilogtail_tags";
/// Agent config key overriding the heartbeat cadence, in seconds.
pub const CONFIG_KEY_UPDATE_INTERVAL: &str = "config_update_interval";

/// Default heartbeat cadence.
pub const DEFAULT_CONFIG_UPDATE_INTERVAL: Duration = Duration::from_secs(10);
/// Agent type reported in every heartbeat.
const AGENT_TYPE: &str = "iLogtail";
/// Granularity of the worker's cancellable wait.
const WAIT_GRANULARITY: Duration = Duration::from_secs(3);
/// How long `stop` waits for the worker before detaching it.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(1);
/// Default timeout of one config-server request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound of the startup jitter desynchronizing fleets.
const STARTUP_JITTER_MS: u64 = 1000;

/// Errors raised while spawning the provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to build config server client: {0}")]
    Client(#[from] HttpError),
}

/// Identity the agent reports to the config server.
#[derive(Debug, Clone, Default)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub version: String,
    pub ip: String,
    pub hostname: String,
}

/// Static provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Raw `"host:port"` entries; malformed ones are skipped at spawn.
    pub addresses: Vec<String>,
    /// Tag values reported in heartbeats.
    pub tags: Vec<String>,
    pub config_update_interval: Duration,
    pub request_timeout: Duration,
    /// Directory holding one `<name>.yaml` per continuous pipeline.
    pub config_dir: PathBuf,
    pub identity: AgentIdentity,
}

impl ProviderConfig {
    /// Pulls the provider keys out of the agent configuration.
    ///
    /// Tag keys are used for logging only; the server receives the values in
    /// key order.
    pub fn from_agent_config(
        config: &AgentConfig,
        config_dir: impl Into<PathBuf>,
        identity: AgentIdentity,
    ) -> Self {
        let addresses = config.string_list(CONFIG_KEY_ADDRESSES);
        let tag_pairs = config.string_map(CONFIG_KEY_TAGS);
        if !tag_pairs.is_empty() {
            debug!(tags = ?tag_pairs, "config server tags");
        }
        let tags = tag_pairs.into_iter().map(|(_, value)| value).collect();
        let interval = config.u64_or(
            CONFIG_KEY_UPDATE_INTERVAL,
            DEFAULT_CONFIG_UPDATE_INTERVAL.as_secs(),
        );
        Self {
            addresses,
            tags,
            config_update_interval: Duration::from_secs(interval.max(1)),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            config_dir: config_dir.into(),
            identity,
        }
    }
}

/// Handle to the provider's worker task.
///
/// Dropping the handle leaves the worker running detached; call
/// [`RemoteConfigProvider::stop`] for an orderly shutdown.
pub struct RemoteConfigProvider {
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    available: Arc<AtomicBool>,
}

impl RemoteConfigProvider {
    /// Parses the address list and spawns the worker task.
    ///
    /// With no valid address the provider stays inert for the process
    /// lifetime: no task is spawned and [`is_available`] reports `false`.
    ///
    /// [`is_available`]: RemoteConfigProvider::is_available
    pub fn spawn(config: ProviderConfig) -> Result<Self, ProviderError> {
        let rng = fastrand::Rng::new();
        let addresses = AddressBook::from_raw_entries(&config.addresses, rng);
        if addresses.is_empty() {
            info!("no valid config server address, remote config provider disabled");
            return Ok(Self {
                worker: Mutex::new(None),
                shutdown: CancellationToken::new(),
                available: Arc::new(AtomicBool::new(false)),
            });
        }
        info!(addresses = addresses.len(), "remote config provider starting");

        let client = ConfigServerClient::new(config.request_timeout)?;
        let available = Arc::new(AtomicBool::new(true));
        let shutdown = CancellationToken::new();
        let worker = Worker {
            config,
            addresses,
            client,
            config_name_version_map: BTreeMap::new(),
            available: Arc::clone(&available),
            fs_lock: Mutex::new(()),
        };
        let handle = tokio::spawn(worker.run(shutdown.clone()));
        Ok(Self {
            worker: Mutex::new(Some(handle)),
            shutdown,
            available,
        })
    }

    /// Whether the provider is talking to a config server. Latches to
    /// `false` permanently when the pipeline directory cannot be created.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// Cancels the worker and waits up to one second for it to exit; past
    /// that the worker is left detached and will observe the cancellation at
    /// its next suspension point.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(handle) = handle else {
            return;
        };
        match tokio::time::timeout(STOP_JOIN_TIMEOUT, handle).await {
            Ok(_) => info!("remote config provider stopped"),
            Err(_) => warn!("remote config provider forced to stop"),
        }
    }
}

/// The worker task's state. Only the task itself touches the address book
/// and the name→version map, so they need no locking; file-system mutations
/// are serialized by `fs_lock`.
struct Worker {
    config: ProviderConfig,
    addresses: AddressBook,
    client: ConfigServerClient,
    config_name_version_map: BTreeMap<String, i64>,
    available: Arc<AtomicBool>,
    fs_lock: Mutex<()>,
}

impl Worker {
    async fn run(mut self, shutdown: CancellationToken) {
        debug!("remote config provider worker started");
        // Jittered start desynchronizes heartbeats across a fleet booted in
        // lockstep.
        let jitter = Duration::from_millis(fastrand::u64(..STARTUP_JITTER_MS));
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(jitter) => {}
        }

        let mut last_check: Option<Instant> = None;
        loop {
            let due = last_check
                .map_or(true, |at| at.elapsed() >= self.config.config_update_interval);
            if due {
                self.get_config_update().await;
                last_check = Some(Instant::now());
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(WAIT_GRANULARITY) => {}
            }
        }
        debug!("remote config provider worker exited");
    }

    /// One heartbeat/fetch/apply cycle.
    async fn get_config_update(&mut self) {
        if !self.available.load(Ordering::Relaxed) {
            return;
        }
        let Some(address) = self.addresses.pick(false).cloned() else {
            return;
        };

        let heartbeat = self.build_heartbeat_request();
        let check_results = match self.client.send_heartbeat(&address, &heartbeat).await {
            Ok(results) => results,
            Err(e) => {
                warn!(address = %address, error = %e, "heartbeat failed");
                Vec::new()
            }
        };
        if check_results.is_empty() {
            // Nothing to converge; try a different server next cycle.
            self.addresses.pick(true);
            return;
        }
        debug!(results = check_results.len(), "pipeline configs to update");

        let fetch = self.build_fetch_request(&check_results);
        let config_details = if fetch.req_configs.is_empty() {
            Vec::new()
        } else {
            match self.client.fetch_pipeline_config(&address, &fetch).await {
                Ok(details) => details,
                Err(e) => {
                    warn!(address = %address, error = %e, "config fetch failed");
                    self.addresses.pick(true);
                    return;
                }
            }
        };

        self.update_remote_config(&check_results, &config_details);
    }

    fn build_heartbeat_request(&self) -> HeartBeatRequest {
        let request_id = base64::engine::general_purpose::STANDARD
            .encode(format!("heartbeat{}", unix_seconds()));
        let pipeline_configs = self
            .config_name_version_map
            .iter()
            .map(|(name, version)| ConfigInfo {
                r#type: ConfigType::PipelineConfig as i32,
                name: name.clone(),
                version: *version,
                context: Vec::new(),
            })
            .collect();
        HeartBeatRequest {
            request_id,
            agent_id: self.config.identity.agent_id.clone(),
            agent_type: AGENT_TYPE.to_string(),
            attributes: Some(AgentAttributes {
                version: self.config.identity.version.clone(),
                ip: self.config.identity.ip.clone(),
                hostname: self.config.identity.hostname.clone(),
            }),
            tags: self.config.tags.clone(),
            running_status: String::new(),
            startup_time: 0,
            interval: self.config.config_update_interval.as_secs() as i32,
            pipeline_configs,
        }
    }

    /// Fetch covers every non-deleted check result.
    fn build_fetch_request(&self, check_results: &[ConfigCheckResult]) -> FetchPipelineConfigRequest {
        let request_id = base64::engine::general_purpose::STANDARD.encode(format!(
            "{}_{}",
            self.config.identity.agent_id,
            unix_seconds()
        ));
        let req_configs = check_results
            .iter()
            .filter(|result| result.check_status() != CheckStatus::Deleted)
            .map(|result| ConfigInfo {
                r#type: ConfigType::PipelineConfig as i32,
                name: result.name.clone(),
                version: result.new_version,
                context: result.context.clone(),
            })
            .collect();
        FetchPipelineConfigRequest {
            request_id,
            agent_id: self.config.identity.agent_id.clone(),
            req_configs,
        }
    }

    /// Applies one batch of check results to the pipeline directory.
    fn update_remote_config(
        &mut self,
        check_results: &[ConfigCheckResult],
        config_details: &[ConfigDetail],
    ) {
        let _guard = self.fs_lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Err(e) = fs::create_dir_all(&self.config.config_dir) {
            // The directory is unusable; receiving further configs would
            // only discard them, so the provider latches unavailable.
            self.available.store(false, Ordering::Relaxed);
            error!(
                dir = %self.config.config_dir.display(),
                error = %e,
                "failed to create pipeline config dir, remote config disabled"
            );
            return;
        }

        for result in check_results {
            let file_path = self.config.config_dir.join(format!("{}.yaml", result.name));
            let tmp_path = self
                .config
                .config_dir
                .join(format!("{}.yaml.new", result.name));
            match result.check_status() {
                CheckStatus::Deleted => {
                    self.config_name_version_map.remove(&result.name);
                    let _ = fs::remove_file(&file_path);
                }
                CheckStatus::New | CheckStatus::Modified => {
                    let detail = config_details
                        .iter()
                        .find(|detail| detail.name == result.name)
                        .map(|detail| detail.detail.as_slice())
                        .unwrap_or_default();
                    self.config_name_version_map
                        .insert(result.name.clone(), result.new_version);
                    if let Err(e) = write_and_rename(&tmp_path, &file_path, detail) {
                        warn!(
                            file = %file_path.display(),
                            error = %e,
                            "failed to dump pipeline config"
                        );
                        let _ = fs::remove_file(&tmp_path);
                    }
                }
                CheckStatus::Unchanged => {}
            }
        }
    }
}

/// Writes `contents` to `tmp_path`, syncs it, and renames over `file_path`.
fn write_and_rename(
    tmp_path: &std::path::Path,
    file_path: &std::path::Path,
    contents: &[u8],
) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp_path, file_path)
}

fn unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
