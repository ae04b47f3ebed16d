// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Process configuration.
//!
//! Loaded once, from `$BASALT_CONFIG` or `./basalt.toml` when present.
//! The execution core must come up on a box with no (or a broken) config
//! file, so `config()` never fails: missing means defaults, malformed is
//! reported on stderr and also falls back to defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static CONFIG: OnceLock<BasaltConfig> = OnceLock::new();

/// Process-wide configuration singleton.
pub fn config() -> &'static BasaltConfig {
    CONFIG.get_or_init(|| {
        let Some(path) = config_path() else {
            return BasaltConfig::default();
        };
        BasaltConfig::load_from_file(&path).unwrap_or_else(|e| {
            // Logging is configured from this value, so stderr is all
            // that is available here.
            eprintln!("basalt: using default config: {:#}", e);
            BasaltConfig::default()
        })
    })
}

fn config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("BASALT_CONFIG") {
        if !p.trim().is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    let local = PathBuf::from("basalt.toml");
    local.exists().then_some(local)
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Clone, Deserialize)]
pub struct BasaltConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression.
    /// If set, this takes precedence over `log_level`.
    /// Example: "basalt=debug,arrow=off"
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl BasaltConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let cfg: BasaltConfig =
            toml::from_str(&s).with_context(|| format!("parse toml: {}", path.display()))?;
        Ok(cfg)
    }

    pub fn effective_log_filter(&self) -> String {
        self.log_filter
            .clone()
            .unwrap_or_else(|| self.log_level.clone())
    }
}

impl Default for BasaltConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            runtime: RuntimeConfig::default(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Seconds between periodic profile reports to the coordinator.
    /// Values <= 0 disable periodic reporting.
    #[serde(default = "RuntimeConfig::default_status_report_interval")]
    pub status_report_interval: i64,

    /// Maximum time an exchange receiver blocks waiting for sender data.
    #[serde(default = "RuntimeConfig::default_exchange_wait_ms")]
    pub exchange_wait_ms: u64,

    /// Row capacity of a client result buffer before senders block.
    #[serde(default = "RuntimeConfig::default_result_buffer_capacity_rows")]
    pub result_buffer_capacity_rows: usize,

    /// Chunk capacity of an external scratch queue before senders block.
    #[serde(default = "RuntimeConfig::default_scratch_queue_capacity")]
    pub scratch_queue_capacity: usize,

    /// Per-query memory budget applied when the request does not carry one.
    #[serde(default = "RuntimeConfig::default_query_mem_limit")]
    pub default_query_mem_limit: i64,
}

impl RuntimeConfig {
    fn default_status_report_interval() -> i64 {
        5
    }

    fn default_exchange_wait_ms() -> u64 {
        120_000
    }

    fn default_result_buffer_capacity_rows() -> usize {
        4096
    }

    fn default_scratch_queue_capacity() -> usize {
        16
    }

    fn default_query_mem_limit() -> i64 {
        2 * 1024 * 1024 * 1024
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            status_report_interval: Self::default_status_report_interval(),
            exchange_wait_ms: Self::default_exchange_wait_ms(),
            result_buffer_capacity_rows: Self::default_result_buffer_capacity_rows(),
            scratch_queue_capacity: Self::default_scratch_queue_capacity(),
            default_query_mem_limit: Self::default_query_mem_limit(),
        }
    }
}
