//! Typed configuration model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Log output format requested by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatSetting {
    /// Structured JSON lines.
    Json,
    /// Human-readable output.
    Pretty,
}

impl LogFormatSetting {
    /// Parse the names accepted in files and environment variables.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Settings for the copytool process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CopytoolConfig {
    /// Lustre mount point to register with the coordinator.
    pub root: PathBuf,
    /// Capacity of the delivery channel; `0` is a direct hand-off.
    pub queue_depth: usize,
    /// Archive ids to serve; empty serves all.
    pub archive_ids: Vec<u32>,
    /// Number of lifecycle driver threads.
    pub workers: usize,
    /// Log filter directive.
    pub log_level: String,
    /// Log output format; inferred from the build when absent.
    pub log_format: Option<LogFormatSetting>,
}

impl Default for CopytoolConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            queue_depth: defaults::QUEUE_DEPTH,
            archive_ids: Vec::new(),
            workers: defaults::WORKERS,
            log_level: defaults::LOG_LEVEL.to_string(),
            log_format: None,
        }
    }
}
