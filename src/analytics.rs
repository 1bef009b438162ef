//! Analytics query orchestration.
//!
//! One entry point turns a validated query into a complete dashboard
//! payload: resolve the timeframe, scan the event store for the current and
//! comparison periods, aggregate into the bucket grid, rank into top-N plus
//! "other", compute trends, and attach the account's quota snapshot.
//!
//! Partial backend failure degrades, it does not abort: a failed store scan
//! yields a well-formed zeroed response tagged with an [`ErrorCode`], and a
//! failed quota read nulls only the quota section. Cancellation and invalid
//! input are the only fatal outcomes.

use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use validator::Validate;

use crate::{
    aggregate::{AggregateOutcome, aggregate},
    config::AnalyticsConfig,
    error::{EngineError, EngineResult, ErrorCode},
    models::{
        EventRecord, QuotaState, RankedView, Resolution, SeriesEntry, SubjectRef, SubjectStatus,
        TimeWindow, TrendResult, UsageTotals,
    },
    quota::{QuotaError, QuotaTracker},
    rank::{combined, rank},
    resample::{BucketGrid, Timeframe},
    store::{EventStore, StoreError},
    trend::{comparison_window, trend},
};

/// Parameters for one analytics query.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AnalyticsQuery {
    /// Account whose quota snapshot is attached to the response.
    pub account_id: Uuid,

    /// Subjects to report on, with their lifecycle state as resolved by the
    /// caller.
    #[validate(length(min = 1, message = "at least one subject is required"))]
    pub subjects: Vec<SubjectRef>,

    /// Dashboard timeframe label; unrecognized labels already fell back to
    /// the default during deserialization.
    #[serde(default)]
    pub timeframe: Timeframe,

    /// When present, only subjects in one of these states are aggregated.
    /// Filtering every subject out is a valid no-data query, not an error.
    #[serde(default)]
    pub statuses: Option<Vec<SubjectStatus>>,

    /// Subjects shown individually before folding into "other". Falls back
    /// to the configured default.
    #[serde(default)]
    #[validate(range(min = 1, message = "top_n must be at least 1"))]
    pub top_n: Option<usize>,
}

impl AnalyticsQuery {
    fn filtered_subject_ids(&self) -> Vec<Uuid> {
        self.subjects
            .iter()
            .filter(|subject| {
                self.statuses
                    .as_ref()
                    .is_none_or(|statuses| statuses.contains(&subject.status))
            })
            .map(|subject| subject.id)
            .collect()
    }
}

/// Complete dashboard payload for one query.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsResponse {
    pub window: TimeWindow,
    pub resolution: Resolution,
    /// Per-subject series for the highest-volume subjects, descending.
    pub top_usage: Vec<SeriesEntry>,
    /// Remainder mass folded into one synthesized series; always present.
    pub other_usage: SeriesEntry,
    /// Bucket-wise sum of top and other.
    pub combined_usage: SeriesEntry,
    pub totals: UsageTotals,
    /// Period-over-period deltas: the overall total first, then one entry
    /// per operation seen in either period.
    pub trends: Vec<TrendResult>,
    /// `None` when the tracker was unreachable; see `errors`.
    pub quota: Option<QuotaState>,
    /// Records quarantined during aggregation of the displayed window.
    pub malformed_events: u64,
    /// Degradation markers for sections that could not be computed.
    pub errors: Vec<ErrorCode>,
}

pub struct AnalyticsEngine {
    store: Arc<dyn EventStore>,
    quota: Arc<dyn QuotaTracker>,
    config: AnalyticsConfig,
}

impl AnalyticsEngine {
    pub fn new(
        store: Arc<dyn EventStore>,
        quota: Arc<dyn QuotaTracker>,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            store,
            quota,
            config,
        }
    }

    /// Run a query against the current wall clock.
    pub async fn query(
        &self,
        query: AnalyticsQuery,
        cancel: CancellationToken,
    ) -> EngineResult<AnalyticsResponse> {
        self.query_at(query, Utc::now(), cancel).await
    }

    /// Run a query with an explicit "now". The response depends only on the
    /// query, the clock, and store contents, so callers can pin the clock.
    pub async fn query_at(
        &self,
        query: AnalyticsQuery,
        now: DateTime<Utc>,
        cancel: CancellationToken,
    ) -> EngineResult<AnalyticsResponse> {
        query
            .validate()
            .map_err(|err| EngineError::Validation(err.to_string()))?;

        let subject_ids = query.filtered_subject_ids();
        let top_n = query.top_n.unwrap_or(self.config.default_top_n);
        let (window, resolution) = query.timeframe.resolve(now);
        let grid = BucketGrid::build(window, resolution);

        let (quota, mut errors) = match self.quota_snapshot(query.account_id, &cancel).await {
            Ok(state) => (Some(state), Vec::new()),
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(err) => {
                tracing::warn!(
                    account_id = %query.account_id,
                    error = %err,
                    "quota read failed, omitting quota from analytics response"
                );
                (None, vec![ErrorCode::QuotaUnavailable])
            }
        };

        let current = match self.scan(&subject_ids, window, &cancel).await {
            Ok(records) => records,
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(err) => {
                tracing::warn!(
                    account_id = %query.account_id,
                    error = %err,
                    "event store scan failed, returning degraded analytics response"
                );
                errors.push(ErrorCode::DataSourceUnavailable);
                return Ok(degraded(&grid, resolution, quota, errors));
            }
        };
        let comparison = match self.scan(&subject_ids, comparison_window(window), &cancel).await {
            Ok(records) => records,
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(err) => {
                tracing::warn!(
                    account_id = %query.account_id,
                    error = %err,
                    "comparison period scan failed, returning degraded analytics response"
                );
                errors.push(ErrorCode::DataSourceUnavailable);
                return Ok(degraded(&grid, resolution, quota, errors));
            }
        };

        let outcome = aggregate(&subject_ids, &grid, current);
        let comparison_grid = BucketGrid::build(comparison_window(window), resolution);
        let comparison_totals = aggregate(&subject_ids, &comparison_grid, comparison).totals;

        let AggregateOutcome {
            series,
            totals,
            malformed_events,
        } = outcome;
        let view = rank(series, &grid, top_n);
        let combined_usage = combined(&view, &grid);
        let trends = build_trends(&totals, &comparison_totals);
        let RankedView { top, other } = view;

        Ok(AnalyticsResponse {
            window,
            resolution,
            top_usage: top,
            other_usage: other,
            combined_usage,
            totals,
            trends,
            quota,
            malformed_events,
            errors,
        })
    }

    /// One bounded, cancellable quota read. A stuck tracker backend must
    /// degrade the quota section, never hang the whole query.
    async fn quota_snapshot(
        &self,
        account_id: Uuid,
        cancel: &CancellationToken,
    ) -> EngineResult<QuotaState> {
        tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            state = timeout(self.config.scan_timeout(), self.quota.quota_state(account_id)) => {
                match state {
                    Ok(Ok(state)) => Ok(state),
                    Ok(Err(err)) => Err(EngineError::Quota(err)),
                    Err(_) => Err(EngineError::Quota(QuotaError::Timeout)),
                }
            }
        }
    }

    /// One bounded, cancellable store scan.
    async fn scan(
        &self,
        subject_ids: &[Uuid],
        window: TimeWindow,
        cancel: &CancellationToken,
    ) -> EngineResult<Vec<EventRecord>> {
        tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            scanned = timeout(self.config.scan_timeout(), self.store.query_events(subject_ids, window)) => {
                match scanned {
                    Ok(Ok(records)) => Ok(records),
                    Ok(Err(err)) => Err(EngineError::DataSource(err)),
                    Err(_) => Err(EngineError::DataSource(StoreError::Timeout)),
                }
            }
        }
    }
}

/// The overall total first, then per-operation trends over the union of
/// operations seen in either period, so a vanished operation still shows its
/// decline.
fn build_trends(current: &UsageTotals, comparison: &UsageTotals) -> Vec<TrendResult> {
    let mut trends = vec![trend("total", current.total, comparison.total)];
    let operations: BTreeSet<&String> = current
        .by_operation
        .keys()
        .chain(comparison.by_operation.keys())
        .collect();
    for operation in operations {
        trends.push(trend(
            operation.clone(),
            current.by_operation.get(operation).copied().unwrap_or(0),
            comparison.by_operation.get(operation).copied().unwrap_or(0),
        ));
    }
    trends
}

/// Well-formed zeroed response for a failed scan. The shape matches a
/// no-data response so the presentation layer renders it unchanged.
fn degraded(
    grid: &BucketGrid,
    resolution: Resolution,
    quota: Option<QuotaState>,
    errors: Vec<ErrorCode>,
) -> AnalyticsResponse {
    let other_usage = grid.zero_series(crate::rank::OTHER_SUBJECT_ID);
    AnalyticsResponse {
        window: grid.window(),
        resolution,
        top_usage: Vec::new(),
        combined_usage: other_usage.clone(),
        other_usage,
        totals: UsageTotals::default(),
        trends: Vec::new(),
        quota,
        malformed_events: 0,
        errors,
    }
}
