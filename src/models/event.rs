use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Raw usage record as handed over by the ingestion edge.
///
/// Loosely typed on purpose: upstream producers occasionally emit records
/// with missing fields, and those must be quarantined rather than abort a
/// query. [`UsageEvent::try_from`] is the only way to obtain the validated
/// shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique record identifier for idempotency.
    pub record_id: Uuid,
    /// Account the consumption is billed against.
    pub account_id: Uuid,
    /// API key the usage is attributed to.
    pub subject_id: Uuid,
    /// Operation kind (e.g. "completion", "embedding").
    pub operation: String,
    /// Units consumed; absent counts as one unit.
    #[serde(default)]
    pub count: Option<u64>,
    /// Event timestamp; records without one are malformed and excluded from
    /// aggregation.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Validated usage event. Immutable once recorded; never mutated, only
/// appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageEvent {
    pub subject_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub operation: String,
    pub count: u64,
}

/// A record that failed validation and was quarantined.
#[derive(Debug, Clone, Error)]
#[error("usage record {record_id} has no timestamp")]
pub struct MalformedRecord {
    pub record_id: Uuid,
}

impl TryFrom<EventRecord> for UsageEvent {
    type Error = MalformedRecord;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        let occurred_at = record.occurred_at.ok_or(MalformedRecord {
            record_id: record.record_id,
        })?;
        Ok(Self {
            subject_id: record.subject_id,
            occurred_at,
            operation: record.operation,
            count: record.count.unwrap_or(1),
        })
    }
}

/// Subject lifecycle state, used by the pass-through statuses filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectStatus {
    Active,
    Inactive,
    Revoked,
}

/// A subject as carried on a query: the key id plus its lifecycle state.
///
/// The engine owns no key metadata; the calling layer resolves each key's
/// state and the statuses filter is applied here before aggregation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubjectRef {
    pub id: Uuid,
    pub status: SubjectStatus,
}
