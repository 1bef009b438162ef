//! Per-account quota accounting.
//!
//! Tracks running consumption against a configured monthly limit,
//! independent of any bucket resolution. Increments are serialized per
//! account key, never behind one global lock; reads never block writers and
//! may observe a slightly stale total (the quota is advisory for display,
//! hard enforcement happens synchronously in the ingestion path).

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use crate::models::QuotaState;

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("quota backend unavailable: {0}")]
    Unavailable(String),
    #[error("quota backend timed out")]
    Timeout,
}

pub type QuotaResult<T> = Result<T, QuotaError>;

/// Consumption counters keyed by account.
///
/// Exposed as a trait so a distributed backing store (e.g. a counter
/// service) can be substituted without changing callers.
#[async_trait]
pub trait QuotaTracker: Send + Sync {
    /// Atomically add `delta` units to the account's current billing period.
    /// Safe under concurrent increments from multiple ingestion paths.
    async fn record_consumption(&self, account_id: Uuid, delta: u64) -> QuotaResult<()>;

    /// Read-only snapshot of the account's quota state.
    async fn quota_state(&self, account_id: Uuid) -> QuotaResult<QuotaState>;

    /// Configure (or clear) the account's monthly limit.
    async fn set_monthly_limit(&self, account_id: Uuid, limit: Option<u64>) -> QuotaResult<()>;

    /// Zero the consumed counter at the start of a billing period. Driven by
    /// an external scheduler; the tracker itself does not schedule time.
    async fn reset_period(&self, account_id: Uuid) -> QuotaResult<()>;
}

#[derive(Debug, Default)]
struct AccountQuota {
    consumed: AtomicU64,
    limit: RwLock<Option<u64>>,
}

/// In-process tracker: one atomic counter per account key.
#[derive(Debug, Default)]
pub struct MemoryQuotaTracker {
    accounts: DashMap<Uuid, AccountQuota>,
}

impl MemoryQuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaTracker for MemoryQuotaTracker {
    async fn record_consumption(&self, account_id: Uuid, delta: u64) -> QuotaResult<()> {
        self.accounts
            .entry(account_id)
            .or_default()
            .consumed
            .fetch_add(delta, Ordering::Relaxed);
        Ok(())
    }

    async fn quota_state(&self, account_id: Uuid) -> QuotaResult<QuotaState> {
        let Some(entry) = self.accounts.get(&account_id) else {
            return Ok(QuotaState::new(account_id, None, 0));
        };
        let consumed = entry.consumed.load(Ordering::Relaxed);
        let limit = *entry.limit.read();
        Ok(QuotaState::new(account_id, limit, consumed))
    }

    async fn set_monthly_limit(&self, account_id: Uuid, limit: Option<u64>) -> QuotaResult<()> {
        *self.accounts.entry(account_id).or_default().limit.write() = limit;
        Ok(())
    }

    async fn reset_period(&self, account_id: Uuid) -> QuotaResult<()> {
        if let Some(entry) = self.accounts.get(&account_id) {
            entry.consumed.store(0, Ordering::Relaxed);
        }
        Ok(())
    }
}
