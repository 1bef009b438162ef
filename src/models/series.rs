use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub lower: DateTime<Utc>,
    pub upper: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window, rejecting an inverted range.
    pub fn new(lower: DateTime<Utc>, upper: DateTime<Utc>) -> EngineResult<Self> {
        if lower > upper {
            return Err(EngineError::Validation(format!(
                "time window lower bound {lower} is after upper bound {upper}"
            )));
        }
        Ok(Self { lower, upper })
    }

    /// Whether a timestamp falls inside the window (both bounds inclusive).
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.lower && at <= self.upper
    }
}

/// Bucket width for a resampled series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
}

impl Resolution {
    pub const fn width_secs(self) -> i64 {
        match self {
            Resolution::FiveMinutes => 300,
            Resolution::OneHour => 3_600,
            Resolution::OneDay => 86_400,
        }
    }
}

/// One aggregated value per subject per resolution step. Derived on each
/// query, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub bucket_start: DateTime<Utc>,
    pub value: u64,
}

/// Chronological, gap-free series for one subject. Intervals with no events
/// carry zero-value buckets; callers never see missing buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesEntry {
    pub subject_id: Uuid,
    pub buckets: Vec<Bucket>,
}

impl SeriesEntry {
    /// Total value across the whole window.
    pub fn total(&self) -> u64 {
        self.buckets.iter().map(|bucket| bucket.value).sum()
    }
}

/// Bounded display set: the top `n` subjects plus one synthesized remainder
/// series that preserves total mass.
#[derive(Debug, Clone, Serialize)]
pub struct RankedView {
    pub top: Vec<SeriesEntry>,
    pub other: SeriesEntry,
}

/// Summary totals per metric across a window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub total: u64,
    pub by_operation: BTreeMap<String, u64>,
}

impl UsageTotals {
    pub fn add(&mut self, operation: &str, count: u64) {
        self.total += count;
        *self.by_operation.entry(operation.to_string()).or_default() += count;
    }
}

/// Period-over-period delta for one metric.
///
/// `percent_change` is `None` when growth from zero cannot be expressed as a
/// percentage; `display` then carries the `+∞%` sentinel.
#[derive(Debug, Clone, Serialize)]
pub struct TrendResult {
    pub metric: String,
    pub current_total: u64,
    pub comparison_total: u64,
    pub percent_change: Option<f64>,
    pub display: String,
}

/// Snapshot of an account's consumption against its monthly limit.
///
/// A `None` limit means unlimited; `remaining` and `remaining_percent` are
/// also `None` in that case.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaState {
    pub account_id: Uuid,
    pub monthly_limit: Option<u64>,
    pub consumed: u64,
    pub remaining: Option<u64>,
    pub remaining_percent: Option<f64>,
}

impl QuotaState {
    pub fn new(account_id: Uuid, monthly_limit: Option<u64>, consumed: u64) -> Self {
        let remaining = monthly_limit.map(|limit| limit.saturating_sub(consumed));
        let remaining_percent = monthly_limit.zip(remaining).map(|(limit, remaining)| {
            if limit == 0 {
                0.0
            } else {
                remaining as f64 / limit as f64 * 100.0
            }
        });
        Self {
            account_id,
            monthly_limit,
            consumed,
            remaining,
            remaining_percent,
        }
    }
}
