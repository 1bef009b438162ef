//! Usage metering and analytics aggregation engine.
//!
//! Turns an append-only stream of raw usage records into dashboard-ready
//! analytics: per-subject time series resampled onto a deterministic bucket
//! grid, top-N ranking with a mass-preserving "other" remainder,
//! period-over-period trends, and per-account quota tracking.
//!
//! The engine is storage-agnostic behind the [`store::EventStore`] and
//! [`quota::QuotaTracker`] traits; in-memory implementations are provided
//! for tests and single-process deployments. Partial backend failure
//! degrades responses instead of failing them, see [`analytics`].

pub mod aggregate;
pub mod analytics;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod quota;
pub mod rank;
pub mod resample;
pub mod store;
pub mod trend;

pub use analytics::{AnalyticsEngine, AnalyticsQuery, AnalyticsResponse};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, ErrorCode};
