// src/lib.rs
// Public library surface for integration tests and the binary.

pub mod api;
pub mod error;
pub mod history;
pub mod metrics;

// Change detection: conditional fetch, feed parsing, dedup, per-provider scheduling
pub mod ingest;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::error::MonitorError;
pub use crate::ingest::{
    ConditionalFetcher, EventSink, EventStore, HttpFetcher, ProviderConfig, ProviderMonitor,
    StatusEvent, StatusMonitor,
};
