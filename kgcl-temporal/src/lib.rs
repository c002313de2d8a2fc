//! Temporal event store
//!
//! Append-only log of workflow events behind a uniform API over three
//! tiers: a hot in-memory ring, a warm on-disk log, and zstd-compressed
//! cold snapshots. Events carry vector clocks and causal links so consumers
//! can reconstruct causal order, and are never deleted by compaction.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod clock;
pub mod event;
pub mod store;

pub use clock::VectorClock;
pub use event::{EventId, WorkflowEvent};
pub use store::{CompactionPolicy, Replay, Snapshot, TierStats, TieredEventStore};

use thiserror::Error;

/// Result type for temporal-store operations
pub type TemporalResult<T> = Result<T, TemporalError>;

/// Errors raised by the temporal store; fatal to the orchestrator
#[derive(Debug, Error)]
pub enum TemporalError {
    /// Warm-tier storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Event encoding/decoding failure
    #[error("Codec error: {0}")]
    Codec(String),

    /// Causal traversal exceeded its depth bound
    #[error("Causal chain exceeded max depth {0}")]
    DepthExceeded(usize),

    /// Event not present in any tier
    #[error("Event {0} not found")]
    NotFound(String),
}

impl From<sled::Error> for TemporalError {
    fn from(err: sled::Error) -> Self {
        TemporalError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for TemporalError {
    fn from(err: std::io::Error) -> Self {
        TemporalError::Storage(err.to_string())
    }
}
