//! Prometheus scrape job configuration model.
//!
//! A pipeline's Prometheus input carries a `ScrapeConfig` JSON descriptor.
//! [`ScrapeConfig::init`] parses and validates it once per pipeline
//! instantiation; the resulting value is immutable and shared with the
//! target subscriber (pre-scrape relabeling) and the in-pipeline relabel
//! processor (per-sample relabeling). The scrape HTTP loop itself lives
//! outside this crate; it consumes the derived request headers, query
//! string, and limits.

pub mod relabel;
pub mod scrape_config;

pub use relabel::{Labels, RelabelAction, RelabelConfig, RelabelConfigList};
pub use scrape_config::{ScrapeConfig, ScrapeConfigError, ScrapeProtocol, ScrapeTarget, TlsConfig};
