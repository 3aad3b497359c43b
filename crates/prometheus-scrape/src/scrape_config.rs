//! Scrape job descriptor parsing and validation.
//!
//! One `ScrapeConfig` is constructed per pipeline instantiation from the
//! pipeline's `"ScrapeConfig"` JSON object and is immutable thereafter;
//! replacing the pipeline yields a new instance. Validation is strict:
//! any malformed field rejects the descriptor without touching the agent.

use std::collections::BTreeMap;
use std::fs;
use std::str::FromStr;

use bytesize::ByteSize;
use serde_json::Value;

use crate::relabel::{Labels, RelabelConfigList};

/// Label carrying the scrape address of a discovered or static target.
pub const ADDRESS_LABEL: &str = "__address__";

/// Enumerated reasons a descriptor is rejected.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeConfigError {
    #[error("scrape config must be a JSON object")]
    NotAnObject,

    #[error("job_name must be present and non-empty")]
    MissingJobName,

    #[error("invalid scheme {0:?}, expected http or https")]
    InvalidScheme(String),

    #[error("{field} is not a valid duration: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("{field} must be at least one second")]
    NonPositiveDuration { field: &'static str },

    #[error("scrape_timeout {timeout}s exceeds scrape_interval {interval}s")]
    TimeoutExceedsInterval { timeout: i64, interval: i64 },

    #[error("max_scrape_size is not a valid size: {0:?}")]
    InvalidSize(String),

    #[error("unknown relabel action {0:?}")]
    UnknownRelabelAction(String),

    #[error("invalid relabel regex: {0}")]
    InvalidRelabelRegex(String),

    #[error("invalid relabel config: {0}")]
    InvalidRelabelConfig(String),

    #[error("basic_auth and authorization are mutually exclusive")]
    ConflictingAuth,

    #[error("invalid auth config: {0}")]
    InvalidAuth(String),

    #[error("invalid tls config: {0}")]
    InvalidTlsConfig(String),

    #[error("unknown scrape protocol {0:?}")]
    UnknownScrapeProtocol(String),

    #[error("duplicate scrape protocol {0:?}")]
    DuplicateScrapeProtocol(String),

    #[error("invalid external_labels: {0}")]
    InvalidExternalLabels(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("invalid scrape_targets: {0}")]
    InvalidStaticConfig(String),
}

/// Negotiable scrape response formats, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeProtocol {
    PrometheusProto,
    OpenMetricsText1_0_0,
    OpenMetricsText0_0_1,
    PrometheusText0_0_4,
}

impl ScrapeProtocol {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "PrometheusProto" => Some(Self::PrometheusProto),
            "OpenMetricsText1.0.0" => Some(Self::OpenMetricsText1_0_0),
            "OpenMetricsText0.0.1" => Some(Self::OpenMetricsText0_0_1),
            "PrometheusText0.0.4" => Some(Self::PrometheusText0_0_4),
            _ => None,
        }
    }

    fn media_type(&self) -> &'static str {
        match self {
            Self::PrometheusProto => {
                "application/vnd.google.protobuf;proto=io.prometheus.client.MetricFamily;encoding=delimited"
            }
            Self::OpenMetricsText1_0_0 => "application/openmetrics-text;version=1.0.0",
            Self::OpenMetricsText0_0_1 => "application/openmetrics-text;version=0.0.1",
            Self::PrometheusText0_0_4 => "text/plain;version=0.0.4",
        }
    }
}

/// Default protocol preference when the descriptor names none.
const DEFAULT_SCRAPE_PROTOCOLS: [ScrapeProtocol; 4] = [
    ScrapeProtocol::PrometheusProto,
    ScrapeProtocol::OpenMetricsText1_0_0,
    ScrapeProtocol::OpenMetricsText0_0_1,
    ScrapeProtocol::PrometheusText0_0_4,
];

/// TLS material passed through to the scrape HTTP client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    pub ca_file: String,
    pub cert_file: String,
    pub key_file: String,
    pub server_name: String,
    pub insecure_skip_verify: bool,
}

/// One statically declared target for the no-service-discovery case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeTarget {
    pub host: String,
}

impl ScrapeTarget {
    /// Initial label set handed to the pre-scrape relabel chain.
    pub fn labels(&self) -> Labels {
        [(ADDRESS_LABEL.to_string(), self.host.clone())]
            .into_iter()
            .collect()
    }
}

/// Validated descriptor for one Prometheus scrape job.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub job_name: String,
    pub scrape_interval_seconds: i64,
    pub scrape_timeout_seconds: i64,
    pub metrics_path: String,
    pub scheme: String,
    pub honor_labels: bool,
    pub honor_timestamps: bool,
    pub follow_redirects: bool,
    pub enable_http2: bool,

    /// Fully derived headers: `Accept`, `Accept-Encoding`, and
    /// `Authorization` when auth is configured.
    pub request_headers: BTreeMap<String, String>,

    pub tls_enabled: bool,
    pub tls: TlsConfig,

    /// 0 means unlimited.
    pub max_scrape_size_bytes: u64,
    /// 0 means unlimited.
    pub sample_limit: u64,
    /// 0 means unlimited.
    pub series_limit: u64,

    /// Applied by target discovery before the first scrape.
    pub relabel_configs: RelabelConfigList,
    /// Applied per sample after parsing.
    pub metric_relabel_configs: RelabelConfigList,

    pub params: BTreeMap<String, Vec<String>>,
    /// Canonical encoding of `params`: keys sorted, values in declared order.
    pub query_string: String,

    /// Declared order preserved; downstream relabeling treats this as a
    /// sequence.
    pub external_labels: Vec<(String, String)>,

    /// Inline targets for the no-SD case.
    pub scrape_targets: Vec<ScrapeTarget>,
    /// Opaque service-discovery blocks, passed through to the SD client.
    pub kubernetes_sd_configs: Vec<Value>,
}

impl ScrapeConfig {
    /// Parses and validates a `"ScrapeConfig"` descriptor.
    pub fn init(config: &Value) -> Result<Self, ScrapeConfigError> {
        let object = config.as_object().ok_or(ScrapeConfigError::NotAnObject)?;

        let job_name = object
            .get("job_name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        if job_name.is_empty() {
            return Err(ScrapeConfigError::MissingJobName);
        }

        let scheme = object
            .get("scheme")
            .and_then(Value::as_str)
            .unwrap_or("http")
            .to_string();
        if scheme != "http" && scheme != "https" {
            return Err(ScrapeConfigError::InvalidScheme(scheme));
        }

        let scrape_interval_seconds = match object.get("scrape_interval") {
            Some(value) => parse_duration_seconds("scrape_interval", value)?,
            None => 60,
        };
        let scrape_timeout_seconds = match object.get("scrape_timeout") {
            Some(value) => parse_duration_seconds("scrape_timeout", value)?,
            None => 10,
        };
        if scrape_interval_seconds < 1 {
            return Err(ScrapeConfigError::NonPositiveDuration {
                field: "scrape_interval",
            });
        }
        if scrape_timeout_seconds < 1 {
            return Err(ScrapeConfigError::NonPositiveDuration {
                field: "scrape_timeout",
            });
        }
        if scrape_timeout_seconds > scrape_interval_seconds {
            return Err(ScrapeConfigError::TimeoutExceedsInterval {
                timeout: scrape_timeout_seconds,
                interval: scrape_interval_seconds,
            });
        }

        let max_scrape_size_bytes = match object.get("max_scrape_size") {
            None => 0,
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(Value::String(s)) if s.is_empty() => 0,
            Some(Value::String(s)) => ByteSize::from_str(s)
                .map_err(|_| ScrapeConfigError::InvalidSize(s.clone()))?
                .as_u64(),
            Some(other) => return Err(ScrapeConfigError::InvalidSize(other.to_string())),
        };

        let mut scrape_config = Self {
            job_name,
            scrape_interval_seconds,
            scrape_timeout_seconds,
            metrics_path: object
                .get("metrics_path")
                .and_then(Value::as_str)
                .unwrap_or("/metrics")
                .to_string(),
            scheme,
            honor_labels: object
                .get("honor_labels")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            honor_timestamps: object
                .get("honor_timestamps")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            follow_redirects: object
                .get("follow_redirects")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            enable_http2: object
                .get("enable_http2")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            request_headers: BTreeMap::new(),
            tls_enabled: false,
            tls: TlsConfig::default(),
            max_scrape_size_bytes,
            sample_limit: object
                .get("sample_limit")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            series_limit: object
                .get("series_limit")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            relabel_configs: RelabelConfigList::default(),
            metric_relabel_configs: RelabelConfigList::default(),
            params: BTreeMap::new(),
            query_string: String::new(),
            external_labels: Vec::new(),
            scrape_targets: Vec::new(),
            kubernetes_sd_configs: object
                .get("kubernetes_sd_configs")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        };

        if let Some(configs) = object.get("relabel_configs") {
            scrape_config.relabel_configs = RelabelConfigList::init(configs)?;
        }
        if let Some(configs) = object.get("metric_relabel_configs") {
            scrape_config.metric_relabel_configs = RelabelConfigList::init(configs)?;
        }

        match (object.get("basic_auth"), object.get("authorization")) {
            (Some(_), Some(_)) => return Err(ScrapeConfigError::ConflictingAuth),
            (Some(basic_auth), None) => scrape_config.init_basic_auth(basic_auth)?,
            (None, Some(authorization)) => scrape_config.init_authorization(authorization)?,
            (None, None) => {}
        }

        scrape_config.init_scrape_protocols(object.get("scrape_protocols"))?;
        scrape_config.init_enable_compression(
            object
                .get("enable_compression")
                .and_then(Value::as_bool)
                .unwrap_or(true),
        );
        if let Some(tls_config) = object.get("tls_config") {
            scrape_config.init_tls_config(tls_config)?;
        }
        if let Some(external_labels) = object.get("external_labels") {
            scrape_config.init_external_labels(external_labels)?;
        }
        scrape_config.init_params(object.get("params"))?;
        if let Some(targets) = object.get("scrape_targets") {
            scrape_config.init_static_config(targets)?;
        }

        Ok(scrape_config)
    }

    fn init_basic_auth(&mut self, basic_auth: &Value) -> Result<(), ScrapeConfigError> {
        let username = resolve_secret(basic_auth, "username", "username_file")?;
        let password = resolve_secret(basic_auth, "password", "password_file")?;
        if username.is_empty() && password.is_empty() {
            return Err(ScrapeConfigError::InvalidAuth(
                "basic_auth requires a username or password".to_string(),
            ));
        }
        let token = base64_encode(format!("{username}:{password}").as_bytes());
        self.request_headers
            .insert("Authorization".to_string(), format!("Basic {token}"));
        Ok(())
    }

    fn init_authorization(&mut self, authorization: &Value) -> Result<(), ScrapeConfigError> {
        let auth_type = authorization
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("Bearer")
            .to_string();
        let credentials = resolve_secret(authorization, "credentials", "credentials_file")?;
        if credentials.is_empty() {
            return Err(ScrapeConfigError::InvalidAuth(
                "authorization requires credentials or credentials_file".to_string(),
            ));
        }
        self.request_headers
            .insert("Authorization".to_string(), format!("{auth_type} {credentials}"));
        Ok(())
    }

    fn init_scrape_protocols(
        &mut self,
        scrape_protocols: Option<&Value>,
    ) -> Result<(), ScrapeConfigError> {
        let protocols: Vec<ScrapeProtocol> = match scrape_protocols.and_then(Value::as_array) {
            None => DEFAULT_SCRAPE_PROTOCOLS.to_vec(),
            Some(items) => {
                let mut protocols = Vec::with_capacity(items.len());
                for item in items {
                    let name = item.as_str().unwrap_or("");
                    let protocol = ScrapeProtocol::parse(name)
                        .ok_or_else(|| ScrapeConfigError::UnknownScrapeProtocol(name.to_string()))?;
                    if protocols.contains(&protocol) {
                        return Err(ScrapeConfigError::DuplicateScrapeProtocol(name.to_string()));
                    }
                    protocols.push(protocol);
                }
                protocols
            }
        };

        // Preference order maps to descending q-weights, `*/*` catches the
        // rest, mirroring the Prometheus accept header.
        let mut weight = DEFAULT_SCRAPE_PROTOCOLS.len();
        let mut parts = Vec::with_capacity(protocols.len() + 1);
        for protocol in &protocols {
            parts.push(format!("{};q=0.{weight}", protocol.media_type()));
            weight -= 1;
        }
        parts.push(format!("*/*;q=0.{weight}"));
        self.request_headers
            .insert("Accept".to_string(), parts.join(","));
        Ok(())
    }

    fn init_enable_compression(&mut self, enable_compression: bool) {
        let encoding = if enable_compression { "gzip" } else { "identity" };
        self.request_headers
            .insert("Accept-Encoding".to_string(), encoding.to_string());
    }

    fn init_tls_config(&mut self, tls_config: &Value) -> Result<(), ScrapeConfigError> {
        if self.scheme != "https" {
            return Err(ScrapeConfigError::InvalidTlsConfig(
                "tls_config requires the https scheme".to_string(),
            ));
        }
        let string_field = |key: &str| {
            tls_config
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string()
        };
        let tls = TlsConfig {
            ca_file: string_field("ca_file"),
            cert_file: string_field("cert_file"),
            key_file: string_field("key_file"),
            server_name: string_field("server_name"),
            insecure_skip_verify: tls_config
                .get("insecure_skip_verify")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        };
        if tls.cert_file.is_empty() != tls.key_file.is_empty() {
            return Err(ScrapeConfigError::InvalidTlsConfig(
                "cert_file and key_file must be set together".to_string(),
            ));
        }
        self.tls_enabled = true;
        self.tls = tls;
        Ok(())
    }

    /// Only the list form is accepted: downstream relabeling treats the
    /// labels as a sequence, and a JSON object cannot carry declared order
    /// through parsing.
    fn init_external_labels(&mut self, external_labels: &Value) -> Result<(), ScrapeConfigError> {
        let items = external_labels.as_array().ok_or_else(|| {
            ScrapeConfigError::InvalidExternalLabels(
                "expected a list of {name, value} pairs".to_string(),
            )
        })?;
        for item in items {
            let name = item.get("name").and_then(Value::as_str).unwrap_or("");
            let value = item.get("value").and_then(Value::as_str).unwrap_or("");
            if name.is_empty() {
                return Err(ScrapeConfigError::InvalidExternalLabels(
                    "entries require a non-empty name".to_string(),
                ));
            }
            self.external_labels.push((name.to_string(), value.to_string()));
        }
        Ok(())
    }

    fn init_params(&mut self, params: Option<&Value>) -> Result<(), ScrapeConfigError> {
        let Some(params) = params else {
            return Ok(());
        };
        let object = params.as_object().ok_or_else(|| {
            ScrapeConfigError::InvalidParams("expected an object of value lists".to_string())
        })?;
        for (key, value) in object {
            let values = match value {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or_else(|| {
                            ScrapeConfigError::InvalidParams(format!(
                                "values of {key:?} must be strings"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                _ => {
                    return Err(ScrapeConfigError::InvalidParams(format!(
                        "values of {key:?} must be strings"
                    )))
                }
            };
            // Declared order within a key is preserved; duplicate keys were
            // already merged by JSON parsing.
            self.params.entry(key.clone()).or_default().extend(values);
        }

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, values) in &self.params {
            for value in values {
                serializer.append_pair(key, value);
            }
        }
        self.query_string = serializer.finish();
        Ok(())
    }

    fn init_static_config(&mut self, targets: &Value) -> Result<(), ScrapeConfigError> {
        let items = targets.as_array().ok_or_else(|| {
            ScrapeConfigError::InvalidStaticConfig("expected a list of {host} entries".to_string())
        })?;
        for item in items {
            let host = item.get("host").and_then(Value::as_str).unwrap_or("");
            if host.is_empty() {
                return Err(ScrapeConfigError::InvalidStaticConfig(
                    "entries require a non-empty host".to_string(),
                ));
            }
            self.scrape_targets.push(ScrapeTarget {
                host: host.to_string(),
            });
        }
        Ok(())
    }
}

/// Reads `key` or `key_file` from an auth object; setting both is an error.
fn resolve_secret(
    object: &Value,
    key: &'static str,
    file_key: &'static str,
) -> Result<String, ScrapeConfigError> {
    let inline = object.get(key).and_then(Value::as_str).unwrap_or("");
    let path = object.get(file_key).and_then(Value::as_str).unwrap_or("");
    if !inline.is_empty() && !path.is_empty() {
        return Err(ScrapeConfigError::InvalidAuth(format!(
            "{key} and {file_key} are mutually exclusive"
        )));
    }
    if path.is_empty() {
        return Ok(inline.to_string());
    }
    let contents = fs::read_to_string(path)
        .map_err(|e| ScrapeConfigError::InvalidAuth(format!("failed to read {path}: {e}")))?;
    Ok(contents.trim_end_matches(['\r', '\n']).to_string())
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Parses a duration field into whole seconds.
///
/// Accepts a bare number of seconds or a Prometheus duration string
/// (`y`, `w`, `d`, `h`, `m`, `s`, `ms` components in descending order,
/// e.g. `"15s"`, `"1h30m"`). Sub-second totals are rejected because the
/// scheduler works in seconds.
fn parse_duration_seconds(field: &'static str, value: &Value) -> Result<i64, ScrapeConfigError> {
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| ScrapeConfigError::InvalidDuration {
            field,
            value: n.to_string(),
        }),
        Value::String(s) => {
            let total_ms = parse_prometheus_duration_ms(s).ok_or_else(|| {
                ScrapeConfigError::InvalidDuration {
                    field,
                    value: s.clone(),
                }
            })?;
            if total_ms % 1000 != 0 {
                return Err(ScrapeConfigError::InvalidDuration {
                    field,
                    value: s.clone(),
                });
            }
            Ok(total_ms / 1000)
        }
        other => Err(ScrapeConfigError::InvalidDuration {
            field,
            value: other.to_string(),
        }),
    }
}

fn parse_prometheus_duration_ms(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    let mut rest = s;
    let mut total_ms: i64 = 0;
    let mut last_unit_rank: isize = -1;
    // Unit table ordered largest to smallest; components must appear in
    // descending magnitude, each at most once, so ranks strictly increase.
    const UNITS: [(&str, i64); 7] = [
        ("y", 365 * 24 * 3600 * 1000),
        ("w", 7 * 24 * 3600 * 1000),
        ("d", 24 * 3600 * 1000),
        ("h", 3600 * 1000),
        ("m", 60 * 1000),
        ("s", 1000),
        ("ms", 1),
    ];
    while !rest.is_empty() {
        let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
        if digits_end == 0 {
            return None;
        }
        let amount: i64 = rest[..digits_end].parse().ok()?;
        rest = &rest[digits_end..];
        // "ms" must be matched before "m".
        let (rank, unit_ms, unit_len) = if rest.starts_with("ms") {
            (6, 1, 2)
        } else {
            let rank = UNITS[..6]
                .iter()
                .position(|(unit, _)| rest.starts_with(unit))?;
            (rank, UNITS[rank].1, 1)
        };
        if rank as isize <= last_unit_rank {
            return None;
        }
        last_unit_rank = rank as isize;
        rest = &rest[unit_len..];
        total_ms = total_ms.checked_add(amount.checked_mul(unit_ms)?)?;
    }
    Some(total_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_descriptor_gets_defaults() {
        let config = ScrapeConfig::init(&json!({
            "job_name": "j",
            "metrics_path": "/m",
            "scheme": "http",
            "scrape_interval": "15s",
            "scrape_timeout": "15s",
        }))
        .expect("valid descriptor");

        assert_eq!(config.job_name, "j");
        assert_eq!(config.metrics_path, "/m");
        assert_eq!(config.scrape_interval_seconds, 15);
        assert_eq!(config.scrape_timeout_seconds, 15);
        assert_eq!(config.max_scrape_size_bytes, 0);
        assert_eq!(config.sample_limit, 0);
        assert_eq!(config.series_limit, 0);
        assert!(config.relabel_configs.is_empty());
        assert!(config.metric_relabel_configs.is_empty());
        assert!(!config.honor_labels);
        assert!(config.honor_timestamps);
        assert!(config.follow_redirects);
        assert!(config.query_string.is_empty());
    }

    #[test]
    fn limits_and_size_suffixes_are_parsed() {
        let config = ScrapeConfig::init(&json!({
            "job_name": "j",
            "scrape_interval": "15s",
            "scrape_timeout": "15s",
            "max_scrape_size": "10MiB",
            "sample_limit": 1000000,
            "series_limit": 1000000,
        }))
        .expect("valid descriptor");
        assert_eq!(config.max_scrape_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.sample_limit, 1_000_000);
        assert_eq!(config.series_limit, 1_000_000);
    }

    #[test]
    fn empty_job_name_is_rejected() {
        let err = ScrapeConfig::init(&json!({
            "job_name": "",
            "scrape_interval": "15s",
            "scrape_timeout": "15s",
        }))
        .unwrap_err();
        assert!(matches!(err, ScrapeConfigError::MissingJobName));
    }

    #[test]
    fn timeout_may_not_exceed_interval() {
        let err = ScrapeConfig::init(&json!({
            "job_name": "j",
            "scrape_interval": "10s",
            "scrape_timeout": "30s",
        }))
        .unwrap_err();
        assert!(matches!(err, ScrapeConfigError::TimeoutExceedsInterval { .. }));
    }

    #[test]
    fn malformed_duration_and_size_are_rejected() {
        let err = ScrapeConfig::init(&json!({
            "job_name": "j",
            "scrape_interval": "soon",
        }))
        .unwrap_err();
        assert!(matches!(err, ScrapeConfigError::InvalidDuration { .. }));

        let err = ScrapeConfig::init(&json!({
            "job_name": "j",
            "max_scrape_size": "10elephants",
        }))
        .unwrap_err();
        assert!(matches!(err, ScrapeConfigError::InvalidSize(_)));
    }

    #[test]
    fn composite_durations_resolve_to_seconds() {
        let config = ScrapeConfig::init(&json!({
            "job_name": "j",
            "scrape_interval": "1h30m",
            "scrape_timeout": "2m30s",
        }))
        .expect("valid descriptor");
        assert_eq!(config.scrape_interval_seconds, 5400);
        assert_eq!(config.scrape_timeout_seconds, 150);
    }

    #[test]
    fn duration_components_must_descend_in_magnitude() {
        // Ascending units and repeated units are both malformed.
        for raw in ["30m1h", "1h1h"] {
            let err = ScrapeConfig::init(&json!({
                "job_name": "j",
                "scrape_interval": raw,
            }))
            .unwrap_err();
            assert!(
                matches!(err, ScrapeConfigError::InvalidDuration { .. }),
                "{raw:?} must be rejected"
            );
        }
    }

    #[test]
    fn metric_relabel_actions_keep_declared_order() {
        let config = ScrapeConfig::init(&json!({
            "job_name": "j",
            "scrape_interval": "15s",
            "scrape_timeout": "15s",
            "metric_relabel_configs": [
                {"action": "keep", "source_labels": ["a"], "regex": "x"},
                {"action": "keep", "source_labels": ["b"], "regex": "y"},
                {"action": "replace", "source_labels": ["c"], "target_label": "d"},
            ],
        }))
        .expect("valid descriptor");
        use crate::relabel::RelabelAction;
        assert_eq!(
            config
                .metric_relabel_configs
                .configs
                .iter()
                .map(|c| c.action)
                .collect::<Vec<_>>(),
            vec![RelabelAction::Keep, RelabelAction::Keep, RelabelAction::Replace]
        );
    }

    #[test]
    fn default_accept_header_lists_protocols_with_descending_weights() {
        let config = ScrapeConfig::init(&json!({"job_name": "j"})).expect("valid descriptor");
        let accept = config.request_headers.get("Accept").expect("Accept header");
        let expected = concat!(
            "application/vnd.google.protobuf;proto=io.prometheus.client.MetricFamily;encoding=delimited;q=0.4,",
            "application/openmetrics-text;version=1.0.0;q=0.3,",
            "application/openmetrics-text;version=0.0.1;q=0.2,",
            "text/plain;version=0.0.4;q=0.1,",
            "*/*;q=0.0"
        );
        assert_eq!(accept, expected);
        assert_eq!(config.request_headers.get("Accept-Encoding").map(String::as_str), Some("gzip"));
    }

    #[test]
    fn declared_protocols_are_ordered_and_deduplicated() {
        let config = ScrapeConfig::init(&json!({
            "job_name": "j",
            "scrape_protocols": ["PrometheusText0.0.4", "PrometheusProto"],
        }))
        .expect("valid descriptor");
        let accept = config.request_headers.get("Accept").expect("Accept header");
        assert!(accept.starts_with("text/plain;version=0.0.4;q=0.4,"));
        assert!(accept.ends_with("*/*;q=0.2"));

        let err = ScrapeConfig::init(&json!({
            "job_name": "j",
            "scrape_protocols": ["PrometheusProto", "PrometheusProto"],
        }))
        .unwrap_err();
        assert!(matches!(err, ScrapeConfigError::DuplicateScrapeProtocol(_)));

        let err = ScrapeConfig::init(&json!({
            "job_name": "j",
            "scrape_protocols": ["CompactProto"],
        }))
        .unwrap_err();
        assert!(matches!(err, ScrapeConfigError::UnknownScrapeProtocol(_)));
    }

    #[test]
    fn disabling_compression_switches_accept_encoding() {
        let config = ScrapeConfig::init(&json!({
            "job_name": "j",
            "enable_compression": false,
        }))
        .expect("valid descriptor");
        assert_eq!(
            config.request_headers.get("Accept-Encoding").map(String::as_str),
            Some("identity")
        );
    }

    #[test]
    fn basic_auth_renders_the_authorization_header() {
        let config = ScrapeConfig::init(&json!({
            "job_name": "j",
            "basic_auth": {"username": "prom", "password": "secret"},
        }))
        .expect("valid descriptor");
        // base64("prom:secret")
        assert_eq!(
            config.request_headers.get("Authorization").map(String::as_str),
            Some("Basic cHJvbTpzZWNyZXQ=")
        );
    }

    #[test]
    fn bearer_authorization_defaults_its_type() {
        let config = ScrapeConfig::init(&json!({
            "job_name": "j",
            "authorization": {"credentials": "tok-123"},
        }))
        .expect("valid descriptor");
        assert_eq!(
            config.request_headers.get("Authorization").map(String::as_str),
            Some("Bearer tok-123")
        );
    }

    #[test]
    fn conflicting_auth_sections_are_rejected() {
        let err = ScrapeConfig::init(&json!({
            "job_name": "j",
            "basic_auth": {"username": "u", "password": "p"},
            "authorization": {"credentials": "tok"},
        }))
        .unwrap_err();
        assert!(matches!(err, ScrapeConfigError::ConflictingAuth));
    }

    #[test]
    fn inline_secret_and_secret_file_are_mutually_exclusive() {
        let err = ScrapeConfig::init(&json!({
            "job_name": "j",
            "basic_auth": {"username": "u", "username_file": "/tmp/u", "password": "p"},
        }))
        .unwrap_err();
        assert!(matches!(err, ScrapeConfigError::InvalidAuth(_)));
    }

    #[test]
    fn tls_requires_https_scheme() {
        let err = ScrapeConfig::init(&json!({
            "job_name": "j",
            "scheme": "http",
            "tls_config": {"ca_file": "/etc/ssl/ca.pem"},
        }))
        .unwrap_err();
        assert!(matches!(err, ScrapeConfigError::InvalidTlsConfig(_)));

        let config = ScrapeConfig::init(&json!({
            "job_name": "j",
            "scheme": "https",
            "tls_config": {
                "ca_file": "/etc/ssl/ca.pem",
                "server_name": "metrics.internal",
                "insecure_skip_verify": true,
            },
        }))
        .expect("valid descriptor");
        assert!(config.tls_enabled);
        assert_eq!(config.tls.ca_file, "/etc/ssl/ca.pem");
        assert_eq!(config.tls.server_name, "metrics.internal");
        assert!(config.tls.insecure_skip_verify);
    }

    #[test]
    fn cert_and_key_must_come_together() {
        let err = ScrapeConfig::init(&json!({
            "job_name": "j",
            "scheme": "https",
            "tls_config": {"cert_file": "/etc/ssl/cert.pem"},
        }))
        .unwrap_err();
        assert!(matches!(err, ScrapeConfigError::InvalidTlsConfig(_)));
    }

    #[test]
    fn query_string_sorts_keys_and_preserves_value_order() {
        let config = ScrapeConfig::init(&json!({
            "job_name": "j",
            "params": {
                "module": ["if_mib", "if mib"],
                "debug": ["true"],
            },
        }))
        .expect("valid descriptor");
        assert_eq!(config.query_string, "debug=true&module=if_mib&module=if+mib");
    }

    #[test]
    fn external_labels_preserve_declared_order() {
        let config = ScrapeConfig::init(&json!({
            "job_name": "j",
            "external_labels": [
                {"name": "zone", "value": "eu-1"},
                {"name": "app", "value": "web"},
            ],
        }))
        .expect("valid descriptor");
        assert_eq!(
            config.external_labels,
            vec![
                ("zone".to_string(), "eu-1".to_string()),
                ("app".to_string(), "web".to_string()),
            ]
        );
    }

    #[test]
    fn object_form_external_labels_are_rejected() {
        // An object cannot carry declared order through JSON parsing.
        let err = ScrapeConfig::init(&json!({
            "job_name": "j",
            "external_labels": {"zone": "eu-1", "app": "web"},
        }))
        .unwrap_err();
        assert!(matches!(err, ScrapeConfigError::InvalidExternalLabels(_)));
    }

    #[test]
    fn static_targets_materialize_address_labels() {
        let config = ScrapeConfig::init(&json!({
            "job_name": "j",
            "scrape_targets": [{"host": "172.17.0.3:9100"}],
        }))
        .expect("valid descriptor");
        assert_eq!(config.scrape_targets.len(), 1);
        let labels = config.scrape_targets[0].labels();
        assert_eq!(labels.get(ADDRESS_LABEL), Some("172.17.0.3:9100"));

        let err = ScrapeConfig::init(&json!({
            "job_name": "j",
            "scrape_targets": [{"port": 9100}],
        }))
        .unwrap_err();
        assert!(matches!(err, ScrapeConfigError::InvalidStaticConfig(_)));
    }

    #[test]
    fn init_is_deterministic() {
        let descriptor = json!({
            "job_name": "j",
            "scrape_interval": "15s",
            "scrape_timeout": "10s",
            "params": {"a": ["1"], "b": ["2"]},
            "external_labels": [{"name": "n", "value": "v"}],
            "sample_limit": 7,
        });
        let a = ScrapeConfig::init(&descriptor).expect("valid descriptor");
        let b = ScrapeConfig::init(&descriptor).expect("valid descriptor");
        assert_eq!(a.request_headers, b.request_headers);
        assert_eq!(a.query_string, b.query_string);
        assert_eq!(a.external_labels, b.external_labels);
        assert_eq!(a.sample_limit, b.sample_limit);
    }
}
