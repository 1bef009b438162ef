//! Append-only in-memory store. Suitable for tests and single-process
//! deployments; a query clones matching records under the read lock, which
//! gives the snapshot consistency the trait promises.

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{EventStore, StoreResult};
use crate::models::{EventRecord, TimeWindow};

#[derive(Debug, Default)]
pub struct MemoryEventStore {
    records: RwLock<Vec<EventRecord>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append_batch(&self, records: Vec<EventRecord>) -> StoreResult<usize> {
        let written = records.len();
        self.records.write().extend(records);
        Ok(written)
    }

    async fn query_events(
        &self,
        subject_ids: &[Uuid],
        window: TimeWindow,
    ) -> StoreResult<Vec<EventRecord>> {
        let records = self.records.read();
        Ok(records
            .iter()
            .filter(|record| subject_ids.contains(&record.subject_id))
            .filter(|record| record.occurred_at.is_none_or(|ts| window.contains(ts)))
            .cloned()
            .collect())
    }
}
