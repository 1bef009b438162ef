//! Per-subject bucket aggregation.
//!
//! Folds a scan batch from the event store into one gap-free series per
//! requested subject, aligned to the query's bucket grid. Malformed records
//! are dropped and counted, never fatal.

use std::collections::{BTreeMap, HashSet};

use uuid::Uuid;

use crate::{
    models::{EventRecord, SeriesEntry, UsageEvent, UsageTotals},
    resample::BucketGrid,
};

/// Result of aggregating one event store scan.
#[derive(Debug, Clone)]
pub struct AggregateOutcome {
    /// One series per requested subject, keyed by subject id. Subjects with
    /// no events in the window are present with all-zero buckets.
    pub series: BTreeMap<Uuid, SeriesEntry>,
    /// Summary totals per metric across the window.
    pub totals: UsageTotals,
    /// Records dropped for failing validation (data-quality count).
    pub malformed_events: u64,
}

/// Aggregate a scan batch into per-subject series.
///
/// Events outside the window or attributed to a subject not in the requested
/// set are ignored. Input order is not assumed. Pure: the same input always
/// yields the same outcome.
pub fn aggregate(
    subject_ids: &[Uuid],
    grid: &BucketGrid,
    records: Vec<EventRecord>,
) -> AggregateOutcome {
    let requested: HashSet<Uuid> = subject_ids.iter().copied().collect();
    let mut series: BTreeMap<Uuid, SeriesEntry> = subject_ids
        .iter()
        .map(|id| (*id, grid.zero_series(*id)))
        .collect();
    let mut totals = UsageTotals::default();
    let mut malformed_events = 0u64;

    for record in records {
        let event = match UsageEvent::try_from(record) {
            Ok(event) => event,
            Err(err) => {
                malformed_events += 1;
                tracing::debug!(record_id = %err.record_id, "dropping malformed usage record");
                continue;
            }
        };
        if !requested.contains(&event.subject_id) {
            continue;
        }
        let Some(index) = grid.index_of(event.occurred_at) else {
            continue;
        };
        if let Some(entry) = series.get_mut(&event.subject_id) {
            entry.buckets[index].value += event.count;
            totals.add(&event.operation, event.count);
        }
    }

    AggregateOutcome {
        series,
        totals,
        malformed_events,
    }
}
