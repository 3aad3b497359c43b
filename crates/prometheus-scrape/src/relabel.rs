//! Relabel rule chain.
//!
//! Targets pass through `relabel_configs` before the first scrape; every
//! parsed sample passes through `metric_relabel_configs`. The action
//! vocabulary and matching semantics follow the Prometheus relabeller:
//! regexes are fully anchored, `$1`-style references expand capture groups,
//! and a chain returning `false` drops the target or sample.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::scrape_config::ScrapeConfigError;

/// How one rule transforms the label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelabelAction {
    Replace,
    Keep,
    Drop,
    HashMod,
    LabelMap,
    LabelDrop,
    LabelKeep,
    Lowercase,
    Uppercase,
    KeepEqual,
    DropEqual,
}

impl RelabelAction {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "replace" => Some(Self::Replace),
            "keep" => Some(Self::Keep),
            "drop" => Some(Self::Drop),
            "hashmod" => Some(Self::HashMod),
            "labelmap" => Some(Self::LabelMap),
            "labeldrop" => Some(Self::LabelDrop),
            "labelkeep" => Some(Self::LabelKeep),
            "lowercase" => Some(Self::Lowercase),
            "uppercase" => Some(Self::Uppercase),
            "keepequal" => Some(Self::KeepEqual),
            "dropequal" => Some(Self::DropEqual),
            _ => None,
        }
    }
}

/// Mutable label set a chain operates on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Sets `name` to `value`; an empty value removes the label, matching
    /// Prometheus semantics.
    pub fn set(&mut self, name: &str, value: &str) {
        if value.is_empty() {
            self.0.remove(name);
        } else {
            self.0.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.0.remove(name);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().filter(|(_, v)| !v.is_empty()).collect())
    }
}

/// Raw descriptor shape before validation.
#[derive(Debug, Deserialize)]
struct RawRelabelConfig {
    #[serde(default)]
    source_labels: Vec<String>,
    #[serde(default = "default_separator")]
    separator: String,
    #[serde(default)]
    regex: Option<String>,
    #[serde(default)]
    modulus: u64,
    #[serde(default)]
    target_label: String,
    #[serde(default = "default_replacement")]
    replacement: String,
    #[serde(default)]
    action: Option<String>,
}

fn default_separator() -> String {
    ";".to_string()
}

fn default_replacement() -> String {
    "$1".to_string()
}

/// One validated relabel rule.
#[derive(Debug, Clone)]
pub struct RelabelConfig {
    pub source_labels: Vec<String>,
    pub separator: String,
    /// Anchored match regex; defaults to `.*`.
    pub regex: Regex,
    pub modulus: u64,
    pub target_label: String,
    pub replacement: String,
    pub action: RelabelAction,
}

impl RelabelConfig {
    /// Parses and validates one rule descriptor.
    pub fn init(config: &Value) -> Result<Self, ScrapeConfigError> {
        let raw: RawRelabelConfig = serde_json::from_value(config.clone())
            .map_err(|e| ScrapeConfigError::InvalidRelabelConfig(e.to_string()))?;

        let action = match raw.action.as_deref() {
            // Prometheus defaults a rule without an action to replace.
            None => RelabelAction::Replace,
            Some(name) => RelabelAction::parse(name)
                .ok_or_else(|| ScrapeConfigError::UnknownRelabelAction(name.to_string()))?,
        };

        let pattern = raw.regex.as_deref().unwrap_or(".*");
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| ScrapeConfigError::InvalidRelabelRegex(e.to_string()))?;

        match action {
            RelabelAction::Replace
            | RelabelAction::HashMod
            | RelabelAction::Lowercase
            | RelabelAction::Uppercase
            | RelabelAction::KeepEqual
            | RelabelAction::DropEqual => {
                if raw.target_label.is_empty() {
                    return Err(ScrapeConfigError::InvalidRelabelConfig(format!(
                        "action {action:?} requires target_label"
                    )));
                }
            }
            _ => {}
        }
        if action == RelabelAction::HashMod && raw.modulus == 0 {
            return Err(ScrapeConfigError::InvalidRelabelConfig(
                "hashmod requires a non-zero modulus".to_string(),
            ));
        }

        Ok(Self {
            source_labels: raw.source_labels,
            separator: raw.separator,
            regex,
            modulus: raw.modulus,
            target_label: raw.target_label,
            replacement: raw.replacement,
            action,
        })
    }

    fn source_value(&self, labels: &Labels) -> String {
        let values: Vec<&str> = self
            .source_labels
            .iter()
            .map(|name| labels.get(name).unwrap_or(""))
            .collect();
        values.join(&self.separator)
    }

    /// Applies this rule; `false` drops the target or sample.
    pub fn process(&self, labels: &mut Labels) -> bool {
        let source = self.source_value(labels);
        match self.action {
            RelabelAction::Keep => self.regex.is_match(&source),
            RelabelAction::Drop => !self.regex.is_match(&source),
            RelabelAction::KeepEqual => labels.get(&self.target_label).unwrap_or("") == source,
            RelabelAction::DropEqual => labels.get(&self.target_label).unwrap_or("") != source,
            RelabelAction::Replace => {
                let Some(captures) = self.regex.captures(&source) else {
                    return true;
                };
                let mut target = String::new();
                captures.expand(&self.target_label, &mut target);
                let mut value = String::new();
                captures.expand(&self.replacement, &mut value);
                if !target.is_empty() {
                    labels.set(&target, &value);
                }
                true
            }
            RelabelAction::HashMod => {
                let hashed = fnv1a(source.as_bytes()) % self.modulus;
                labels.set(&self.target_label, &hashed.to_string());
                true
            }
            RelabelAction::Lowercase => {
                labels.set(&self.target_label, &source.to_lowercase());
                true
            }
            RelabelAction::Uppercase => {
                labels.set(&self.target_label, &source.to_uppercase());
                true
            }
            RelabelAction::LabelMap => {
                let mapped: Vec<(String, String)> = labels
                    .iter()
                    .filter_map(|(name, value)| {
                        self.regex.captures(name).map(|captures| {
                            let mut target = String::new();
                            captures.expand(&self.replacement, &mut target);
                            (target, value.to_string())
                        })
                    })
                    .collect();
                for (name, value) in mapped {
                    if !name.is_empty() {
                        labels.set(&name, &value);
                    }
                }
                true
            }
            RelabelAction::LabelDrop => {
                let doomed: Vec<String> = labels
                    .iter()
                    .filter(|(name, _)| self.regex.is_match(name))
                    .map(|(name, _)| name.to_string())
                    .collect();
                for name in doomed {
                    labels.remove(&name);
                }
                true
            }
            RelabelAction::LabelKeep => {
                let doomed: Vec<String> = labels
                    .iter()
                    .filter(|(name, _)| !self.regex.is_match(name))
                    .map(|(name, _)| name.to_string())
                    .collect();
                for name in doomed {
                    labels.remove(&name);
                }
                true
            }
        }
    }
}

/// Ordered rule chain.
#[derive(Debug, Clone, Default)]
pub struct RelabelConfigList {
    pub configs: Vec<RelabelConfig>,
}

impl RelabelConfigList {
    /// Parses a JSON array of rule descriptors, preserving declared order.
    pub fn init(configs: &Value) -> Result<Self, ScrapeConfigError> {
        let items = configs
            .as_array()
            .ok_or_else(|| {
                ScrapeConfigError::InvalidRelabelConfig("relabel configs must be a list".into())
            })?;
        let configs = items
            .iter()
            .map(RelabelConfig::init)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { configs })
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Runs the chain in order; `false` drops the target or sample.
    pub fn process(&self, labels: &mut Labels) -> bool {
        for config in &self.configs {
            if !config.process(labels) {
                return false;
            }
        }
        true
    }
}

/// 64-bit FNV-1a over the joined source values; deterministic across hosts.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
