// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Agent-level configuration document.
//!
//! The agent reads one JSON document at boot (`collector_config.json` by
//! default) and components pull the keys they care about through typed
//! accessors. Absent or mistyped keys are never fatal at this layer; each
//! consumer decides how to degrade.

use std::fs;
use std::path::Path;

use serde_json::Value;

/// Errors raised while loading the agent configuration document.
#[derive(Debug, thiserror::Error)]
pub enum AgentConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("config root must be a JSON object")]
    NotAnObject,
}

/// Parsed agent configuration with typed, non-failing accessors.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    root: Value,
}

impl AgentConfig {
    /// Reads and parses the configuration file at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AgentConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| AgentConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let root: Value = serde_json::from_str(&raw).map_err(|source| AgentConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_value(root)
    }

    /// Wraps an already-parsed JSON document.
    pub fn from_value(root: Value) -> Result<Self, AgentConfigError> {
        if !root.is_object() {
            return Err(AgentConfigError::NotAnObject);
        }
        Ok(Self { root })
    }

    /// An empty configuration (all accessors fall back to their defaults).
    pub fn empty() -> Self {
        Self {
            root: Value::Object(serde_json::Map::new()),
        }
    }

    /// Raw access to one top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    /// String value of `key`, or `default` when absent or mistyped.
    pub fn string_or(&self, key: &str, default: &str) -> String {
        match self.root.get(key).and_then(Value::as_str) {
            Some(s) => s.to_string(),
            None => default.to_string(),
        }
    }

    /// Unsigned integer value of `key`, or `default` when absent or mistyped.
    pub fn u64_or(&self, key: &str, default: u64) -> u64 {
        self.root.get(key).and_then(Value::as_u64).unwrap_or(default)
    }

    /// Boolean value of `key`, or `default` when absent or mistyped.
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.root.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// String entries of the array at `key`; non-string entries are skipped.
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.root.get(key).and_then(Value::as_array) {
            Some(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        }
    }

    /// `(key, value)` pairs of the string-valued object at `key`, in key
    /// order; non-string values are skipped.
    pub fn string_map(&self, key: &str) -> Vec<(String, String)> {
        match self.root.get(key).and_then(Value::as_object) {
            Some(map) => map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect(),
            None => Vec::new(),
        }
    }
}
