//! Engine configuration.
//!
//! All sections deserialize from the host application's config file and fall
//! back to defaults field-by-field, so a bare `[analytics]` or no section at
//! all is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Analytics query defaults.
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Ingest buffer tuning.
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Defaults for the analytics query path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyticsConfig {
    /// Subjects shown individually before the remainder is folded into the
    /// "other" series.
    #[serde(default = "default_top_n")]
    pub default_top_n: usize,

    /// Event store scan timeout in milliseconds. Expiry fails the scan with
    /// a retryable error instead of hanging the query.
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
}

impl AnalyticsConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            default_top_n: default_top_n(),
            scan_timeout_ms: default_scan_timeout_ms(),
        }
    }
}

fn default_top_n() -> usize {
    5
}

fn default_scan_timeout_ms() -> u64 {
    5_000
}

/// Ingest buffer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Maximum records per flush batch.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Maximum time to wait before flushing the buffer, in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Maximum pending records before new ones are dropped. Prevents
    /// unbounded memory growth when the sink is slow or unavailable.
    #[serde(default = "default_max_pending_records")]
    pub max_pending_records: usize,
}

impl IngestConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            max_pending_records: default_max_pending_records(),
        }
    }
}

fn default_max_batch_size() -> usize {
    1_000
}

fn default_flush_interval_ms() -> u64 {
    1_000
}

fn default_max_pending_records() -> usize {
    10_000
}
