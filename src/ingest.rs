//! Buffered event ingestion.
//!
//! Producers push raw records into a lock-free MPSC channel; a background
//! worker drains them in batches and hands each batch to a sink. Batching
//! keeps write pressure off the store at high request rates, and a bounded
//! channel drops new records instead of growing without limit when the sink
//! is slow or unavailable.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use thiserror::Error;
use tokio::time::timeout;

use crate::{
    config::IngestConfig,
    models::{EventRecord, UsageEvent},
    quota::{QuotaError, QuotaTracker},
    store::{EventStore, StoreError},
};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Quota(#[from] QuotaError),
}

/// Destination for flushed record batches.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Write a batch, returning the number of records accepted.
    async fn write_batch(&self, records: &[EventRecord]) -> Result<usize, SinkError>;

    /// Sink name for logging.
    fn name(&self) -> &'static str;
}

/// Sink that persists records and advances the owning account's quota.
///
/// Quota consumption is driven here, synchronously with the write, so the
/// tracker never drifts from what was actually stored. Records that fail
/// validation are still persisted (for quarantine accounting) but never
/// consume quota.
pub struct StoreSink {
    store: Arc<dyn EventStore>,
    quota: Arc<dyn QuotaTracker>,
    op_timeout: Duration,
}

const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

impl StoreSink {
    pub fn new(store: Arc<dyn EventStore>, quota: Arc<dyn QuotaTracker>) -> Self {
        Self {
            store,
            quota,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Bound on each store append and quota increment. A stalled backend
    /// fails the flush instead of wedging the worker.
    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }
}

#[async_trait]
impl EventSink for StoreSink {
    async fn write_batch(&self, records: &[EventRecord]) -> Result<usize, SinkError> {
        if records.is_empty() {
            return Ok(0);
        }

        let written = timeout(self.op_timeout, self.store.append_batch(records.to_vec()))
            .await
            .map_err(|_| StoreError::Timeout)??;
        for record in records {
            if let Ok(event) = UsageEvent::try_from(record.clone()) {
                timeout(
                    self.op_timeout,
                    self.quota.record_consumption(record.account_id, event.count),
                )
                .await
                .map_err(|_| QuotaError::Timeout)??;
            }
        }
        Ok(written)
    }

    fn name(&self) -> &'static str {
        "store"
    }
}

/// Bounded ingestion buffer with a lock-free push path.
///
/// The worker flushes when records are pending and on every flush interval
/// tick; `shutdown()` requests a final drain so a graceful stop loses
/// nothing that was accepted.
pub struct IngestBuffer {
    sender: Sender<EventRecord>,
    receiver: Receiver<EventRecord>,
    config: IngestConfig,
    shutdown: Arc<AtomicBool>,
    dropped_count: AtomicU64,
}

impl IngestBuffer {
    pub fn new(config: IngestConfig) -> Self {
        let capacity = if config.max_pending_records > 0 {
            config.max_pending_records
        } else {
            1_000_000
        };
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Self {
            sender,
            receiver,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            dropped_count: AtomicU64::new(0),
        }
    }

    /// Accept a record without blocking. When the channel is full the record
    /// is dropped and counted.
    pub fn push(&self, record: EventRecord) {
        match self.sender.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let count = self.dropped_count.fetch_add(1, Ordering::Relaxed);
                // Log every 100 drops to avoid log spam.
                if count % 100 == 0 {
                    tracing::warn!(
                        dropped_count = count + 1,
                        max_pending = self.config.max_pending_records,
                        "ingest buffer overflow, dropping records"
                    );
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                // Worker already gone; nothing left to deliver to.
            }
        }
    }

    /// Records dropped on the push path since startup.
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    /// Spawn the background flush worker. Runs until `shutdown()`.
    pub fn start_worker(self: &Arc<Self>, sink: Arc<dyn EventSink>) -> tokio::task::JoinHandle<()> {
        let buffer = Arc::clone(self);
        let flush_interval = self.config.flush_interval();
        let max_batch_size = self.config.max_batch_size;

        tokio::spawn(async move {
            let mut batch = Vec::with_capacity(max_batch_size);

            loop {
                // Drain the whole backlog in batch-sized flushes before
                // sleeping, so a deep backlog clears at sink speed rather
                // than one batch per interval tick.
                loop {
                    buffer.drain_records(&mut batch, max_batch_size);
                    if batch.is_empty() {
                        break;
                    }
                    buffer.flush_batch(&sink, &mut batch).await;
                }

                if buffer.shutdown.load(Ordering::Acquire) {
                    buffer.drain_all(&mut batch);
                    if !batch.is_empty() {
                        buffer.flush_batch(&sink, &mut batch).await;
                    }
                    tracing::info!("ingest buffer worker shutting down");
                    break;
                }

                tokio::time::sleep(flush_interval).await;
            }
        })
    }

    fn drain_records(&self, batch: &mut Vec<EventRecord>, max_size: usize) {
        while batch.len() < max_size {
            match self.receiver.try_recv() {
                Ok(record) => batch.push(record),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn drain_all(&self, batch: &mut Vec<EventRecord>) {
        while let Ok(record) = self.receiver.try_recv() {
            batch.push(record);
        }
    }

    /// Signal the worker to drain and stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    async fn flush_batch(&self, sink: &Arc<dyn EventSink>, batch: &mut Vec<EventRecord>) {
        let count = batch.len();
        match sink.write_batch(batch).await {
            Ok(written) => {
                tracing::debug!(sink = sink.name(), written, total = count, "ingest flush ok");
            }
            Err(err) => {
                tracing::error!(
                    sink = sink.name(),
                    error = %err,
                    count,
                    "ingest flush failed"
                );
            }
        }
        batch.clear();
    }

    /// Currently buffered record count.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        models::QuotaState,
        quota::{MemoryQuotaTracker, QuotaResult},
        store::MemoryEventStore,
    };

    fn record(account_id: Uuid, count: u64) -> EventRecord {
        EventRecord {
            record_id: Uuid::new_v4(),
            account_id,
            subject_id: Uuid::new_v4(),
            operation: "completion".to_string(),
            count: Some(count),
            occurred_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_push_and_len() {
        let buffer = IngestBuffer::new(IngestConfig::default());
        assert!(buffer.is_empty());
        buffer.push(record(Uuid::new_v4(), 1));
        buffer.push(record(Uuid::new_v4(), 1));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.dropped_count(), 0);
    }

    #[test]
    fn test_overflow_drops_and_counts() {
        let config = IngestConfig {
            max_pending_records: 3,
            ..IngestConfig::default()
        };
        let buffer = IngestBuffer::new(config);
        for _ in 0..5 {
            buffer.push(record(Uuid::new_v4(), 1));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.dropped_count(), 2);
    }

    #[tokio::test]
    async fn test_worker_flushes_to_store_and_quota() {
        let store = Arc::new(MemoryEventStore::new());
        let quota = Arc::new(MemoryQuotaTracker::new());
        let sink = Arc::new(StoreSink::new(store.clone(), quota.clone()));
        let account = Uuid::new_v4();

        let config = IngestConfig {
            flush_interval_ms: 10,
            ..IngestConfig::default()
        };
        let buffer = Arc::new(IngestBuffer::new(config));
        buffer.push(record(account, 3));
        buffer.push(record(account, 4));

        let handle = buffer.start_worker(sink);
        buffer.shutdown();
        handle.await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(quota.quota_state(account).await.unwrap().consumed, 7);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_records_are_stored_but_never_consume_quota() {
        let store = Arc::new(MemoryEventStore::new());
        let quota = Arc::new(MemoryQuotaTracker::new());
        let sink = StoreSink::new(store.clone(), quota.clone());
        let account = Uuid::new_v4();

        let mut bad = record(account, 5);
        bad.occurred_at = None;
        let written = sink
            .write_batch(&[record(account, 2), bad])
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(store.len(), 2);
        assert_eq!(quota.quota_state(account).await.unwrap().consumed, 2);
    }

    #[tokio::test]
    async fn test_stalled_quota_backend_fails_the_flush_instead_of_wedging() {
        struct StalledQuota;

        #[async_trait]
        impl QuotaTracker for StalledQuota {
            async fn record_consumption(&self, _account_id: Uuid, _delta: u64) -> QuotaResult<()> {
                std::future::pending().await
            }

            async fn quota_state(&self, _account_id: Uuid) -> QuotaResult<QuotaState> {
                std::future::pending().await
            }

            async fn set_monthly_limit(
                &self,
                _account_id: Uuid,
                _limit: Option<u64>,
            ) -> QuotaResult<()> {
                std::future::pending().await
            }

            async fn reset_period(&self, _account_id: Uuid) -> QuotaResult<()> {
                std::future::pending().await
            }
        }

        let sink = StoreSink::new(Arc::new(MemoryEventStore::new()), Arc::new(StalledQuota))
            .with_timeout(Duration::from_millis(20));

        let err = tokio::time::timeout(
            Duration::from_secs(2),
            sink.write_batch(&[record(Uuid::new_v4(), 1)]),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, SinkError::Quota(QuotaError::Timeout)));
    }

    #[tokio::test]
    async fn test_worker_drains_backlog_without_waiting_out_the_interval() {
        let store = Arc::new(MemoryEventStore::new());
        let quota = Arc::new(MemoryQuotaTracker::new());
        let sink = Arc::new(StoreSink::new(store.clone(), quota));
        let account = Uuid::new_v4();

        // Seven records against a batch size of two: clearing the backlog
        // takes four flushes, which must all happen before the first sleep.
        let config = IngestConfig {
            max_batch_size: 2,
            flush_interval_ms: 60_000,
            ..IngestConfig::default()
        };
        let buffer = Arc::new(IngestBuffer::new(config));
        for _ in 0..7 {
            buffer.push(record(account, 1));
        }

        let handle = buffer.start_worker(sink);
        for _ in 0..200 {
            if store.len() == 7 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.len(), 7);
        handle.abort();
    }

    #[tokio::test]
    async fn test_missing_count_defaults_to_one_unit() {
        let store = Arc::new(MemoryEventStore::new());
        let quota = Arc::new(MemoryQuotaTracker::new());
        let sink = StoreSink::new(store.clone(), quota.clone());
        let account = Uuid::new_v4();

        let mut uncounted = record(account, 0);
        uncounted.count = None;
        sink.write_batch(&[uncounted]).await.unwrap();

        assert_eq!(quota.quota_state(account).await.unwrap().consumed, 1);
    }
}
