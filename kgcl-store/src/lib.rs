//! RDF graph store layer
//!
//! Wraps an oxigraph store behind the operations the engine core needs:
//! quad-level mutation, SPARQL ASK/SELECT, canonical N-Quads hashing, the
//! bounded `QuadDelta` unit of change, SHACL validation, and the ingress
//! barrier that admits external input.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod barrier;
pub mod delta;
pub mod hash;
pub mod shacl;
pub mod store;

pub use barrier::Barrier;
pub use delta::{QuadDelta, CHATMAN_CONSTANT};
pub use hash::{canonical_nquads, canonical_hash_blake3, state_hash};
pub use shacl::{
    CoreShaclValidator, PropertyConstraint, ShaclShape, ShaclValidator, ValidationReport, Violation,
};
pub use store::GraphStore;

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the store layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// Turtle or JSON input could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// SPARQL evaluation failed
    #[error("Query error: {0}")]
    Query(String),

    /// Underlying storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Delta exceeded the Chatman constant or failed shape validation
    #[error("Topology violation: {reason}")]
    TopologyViolation {
        reason: String,
        /// Constraint identifiers that rejected the input (SHACL path)
        constraints: Vec<String>,
    },

    /// Journal rollback target does not exist
    #[error("Invalid checkpoint: {0}")]
    InvalidCheckpoint(usize),
}

impl StoreError {
    /// Topology violation with no constraint attribution
    pub fn topology(reason: impl Into<String>) -> Self {
        StoreError::TopologyViolation {
            reason: reason.into(),
            constraints: Vec::new(),
        }
    }
}
