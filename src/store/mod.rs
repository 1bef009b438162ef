//! Event persistence behind a narrow async trait.
//!
//! Callers treat the store as an unordered, restartable scan source: a query
//! returns a snapshot-consistent set of records with no ordering guarantee,
//! and re-running the same query yields an equivalent result for an unchanged
//! window. Aggregation is written against exactly that contract.

mod memory;

pub use memory::MemoryEventStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{EventRecord, TimeWindow};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event store unavailable: {0}")]
    Unavailable(String),
    #[error("event store scan timed out")]
    Timeout,
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a batch of raw records, including ones missing a timestamp or
    /// count. Returns the number of records written.
    async fn append_batch(&self, records: Vec<EventRecord>) -> StoreResult<usize>;

    /// Scan records for the given subjects that fall inside `window`
    /// (inclusive bounds). Records with no timestamp match any window so
    /// that data-quality accounting downstream can see them.
    async fn query_events(
        &self,
        subject_ids: &[Uuid],
        window: TimeWindow,
    ) -> StoreResult<Vec<EventRecord>>;
}
