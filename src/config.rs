// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Logger configuration: defaults, JSON5 parsing, validation.
//!
//! Every option has a default, so `LoggerConfig::default()` gives a working
//! stdout-only logger. Config files use JSON5 (comments and trailing commas
//! allowed) with the same field names.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::entry::Level;

/// Largest accepted queue capacity exponent (2^20 slots).
pub const MAX_QUEUE_CAPACITY_POW2: u32 = 20;

/// Hard upper bound on records per flush batch.
pub const MAX_BATCH_SIZE: usize = 4096;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggerConfig {
    /// Per-level destinations; an absent path means stdout.
    #[serde(default)]
    pub trace_path: Option<PathBuf>,
    #[serde(default)]
    pub debug_path: Option<PathBuf>,
    #[serde(default)]
    pub info_path: Option<PathBuf>,
    #[serde(default)]
    pub warn_path: Option<PathBuf>,
    #[serde(default)]
    pub error_path: Option<PathBuf>,
    /// Defaults to `error_path` when absent.
    #[serde(default)]
    pub critical_path: Option<PathBuf>,
    /// Defaults to `error_path` when absent.
    #[serde(default)]
    pub fatal_path: Option<PathBuf>,

    /// Sleep between flush batches, in nanoseconds.
    #[serde(default = "default_flush_interval_ns")]
    pub flush_interval_ns: u64,

    /// MPMC ring capacity as a power-of-two exponent (14 gives 16384 slots).
    #[serde(default = "default_queue_capacity_pow2")]
    pub queue_capacity_pow2: u32,

    /// Records per flush batch; clamped to `[1, MAX_BATCH_SIZE]`.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Emit ANSI color sequences on sinks that are terminals.
    #[serde(default = "default_true")]
    pub enable_color_stdout: bool,

    /// Rotate a file sink above this many bytes; 0 disables rotation.
    #[serde(default)]
    pub max_file_size_bytes: u64,

    /// Rotated backups kept as `path.1` .. `path.{max_files - 1}`.
    #[serde(default = "default_max_files")]
    pub max_files: u32,

    /// Emit JSON lines instead of the bracketed text format.
    #[serde(default)]
    pub json_mode: bool,

    /// Count queue refusals and fallback spills for `stats()`.
    #[serde(default)]
    pub track_metrics: bool,
}

fn default_flush_interval_ns() -> u64 {
    2_000_000
}

fn default_queue_capacity_pow2() -> u32 {
    14
}

fn default_batch_size() -> usize {
    512
}

fn default_max_files() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            trace_path: None,
            debug_path: None,
            info_path: None,
            warn_path: None,
            error_path: None,
            critical_path: None,
            fatal_path: None,
            flush_interval_ns: default_flush_interval_ns(),
            queue_capacity_pow2: default_queue_capacity_pow2(),
            batch_size: default_batch_size(),
            enable_color_stdout: true,
            max_file_size_bytes: 0,
            max_files: default_max_files(),
            json_mode: false,
            track_metrics: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    Io(PathBuf, String),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("queue capacity exponent {0} exceeds the maximum of {MAX_QUEUE_CAPACITY_POW2}")]
    QueueCapacityTooLarge(u32),
}

impl LoggerConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity_pow2 > MAX_QUEUE_CAPACITY_POW2 {
            return Err(ConfigError::QueueCapacityTooLarge(self.queue_capacity_pow2));
        }
        Ok(())
    }

    pub(crate) fn clamped_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }

    /// Destination for a level; critical and fatal fall back to the error
    /// path when their own is unset.
    pub(crate) fn sink_path(&self, level: Level) -> Option<&Path> {
        let path = match level {
            Level::Trace => &self.trace_path,
            Level::Debug => &self.debug_path,
            Level::Info => &self.info_path,
            Level::Warn => &self.warn_path,
            Level::Error => &self.error_path,
            Level::Critical => match &self.critical_path {
                Some(p) => return Some(p),
                None => &self.error_path,
            },
            Level::Fatal => match &self.fatal_path {
                Some(p) => return Some(p),
                None => &self.error_path,
            },
        };
        path.as_deref()
    }
}
