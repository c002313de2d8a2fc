//! Workflow net core
//!
//! Places, transitions, arcs, and immutable markings with classical
//! enabling/firing semantics; the WF-net soundness checks; the declarative
//! WCP 1-27 pattern registry; and the small state machines backing the
//! interleaved-routing and trigger patterns.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod patterns;
pub mod petri;
pub mod state_machines;

pub use patterns::{PatternCategory, PatternDescriptor, PatternId, PatternRegistry};
pub use petri::{
    Arc, FiringSequence, Marking, NodeKind, PetriNet, Place, Transition, WorkflowNet,
};
pub use state_machines::{InterleaveGroup, PersistentTrigger, TransientTrigger};

use thiserror::Error;

/// Result type for net operations
pub type NetResult<T> = Result<T, NetError>;

/// Errors raised by the net layer
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetError {
    /// Transition fired without being enabled; recoverable (kernel no-ops)
    #[error("Transition {0} is not enabled")]
    TransitionNotEnabled(String),

    /// Arc endpoints are not bipartite or the weight is zero
    #[error("Invalid arc {source} -> {target}: {reason}")]
    InvalidArc {
        source: String,
        target: String,
        reason: String,
    },

    /// Marking update would drop a place below zero tokens
    #[error("Place {place} has {available} token(s), needed {needed}")]
    InsufficientTokens {
        place: String,
        available: u32,
        needed: u32,
    },

    /// Node referenced by id does not exist
    #[error("Unknown node {0}")]
    UnknownNode(String),

    /// Structural WF-net violation
    #[error("Malformed workflow net: {0}")]
    Malformed(String),

    /// Pattern id outside 1..=27
    #[error("Pattern {0} not found")]
    PatternNotFound(u32),
}
