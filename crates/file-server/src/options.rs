// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-pipeline file collection options.
//!
//! These structs deserialize from the pipeline definition (PascalCase keys,
//! matching the pipeline YAML) and are immutable for the lifetime of their
//! registration. The registry shares them as `Arc`s; the tailing workers
//! only ever read them.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Where and how deep to look for files to tail.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct FileDiscoveryOptions {
    pub file_paths: Vec<String>,
    pub max_dir_search_depth: u32,
    pub exclude_file_paths: Vec<String>,
    pub exclude_dirs: Vec<String>,
    pub allowing_included_by_multi_configs: bool,
}

/// How discovered files are read.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct FileReaderOptions {
    pub file_encoding: String,
    pub tail_size_kb: u64,
    pub flush_timeout_secs: u64,
    pub rotator_queue_size: u32,
    pub appending_log_position_meta: bool,
}

impl Default for FileReaderOptions {
    fn default() -> Self {
        Self {
            file_encoding: "utf8".to_string(),
            tail_size_kb: 1024,
            flush_timeout_secs: 5,
            rotator_queue_size: 20,
            appending_log_position_meta: false,
        }
    }
}

/// Multiline stitching rules.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct MultilineOptions {
    pub mode: String,
    pub start_pattern: String,
    pub continue_pattern: String,
    pub end_pattern: String,
    pub unmatched_content_treatment: String,
    pub ignoring_unmatch_warning: bool,
}

impl Default for MultilineOptions {
    fn default() -> Self {
        Self {
            mode: "custom".to_string(),
            start_pattern: String::new(),
            continue_pattern: String::new(),
            end_pattern: String::new(),
            unmatched_content_treatment: "single_line".to_string(),
            ignoring_unmatch_warning: false,
        }
    }
}

/// Tags stamped onto every event read for the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct FileTagOptions {
    pub file_path_tag_key: Option<String>,
    pub file_inode_tag_key: Option<String>,
    pub static_tags: BTreeMap<String, String>,
}

/// One bind mount inside a container.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Mount {
    pub source: String,
    pub destination: String,
}

/// Container metadata shared between discovery and the readers it spawns.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ContainerInfo {
    pub id: String,
    pub log_path: String,
    pub mounts: Vec<Mount>,
    pub labels: BTreeMap<String, String>,
}
