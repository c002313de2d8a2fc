//! Physics layer: ontology-driven dispatch onto the five-verb kernel
//!
//! The physics ontology maps workflow pattern types to kernel verbs; the
//! semantic driver resolves that mapping by SPARQL lookup and invokes the
//! verb. Nothing in this crate branches on a pattern-type value.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod driver;
pub mod kernel;
pub mod ontology;
pub mod statebased;
pub mod topology;
pub mod vocab;

pub use driver::{DispatchOutcome, DispatchProvenance, SemanticDriver};
pub use kernel::{Kernel, KernelVerb, TransactionContext};
pub use ontology::PhysicsOntology;
pub use statebased::{CancellationSummary, ExternalEvent};

use thiserror::Error;

/// Result type for physics operations
pub type PhysicsResult<T> = Result<T, PhysicsError>;

/// Errors raised by the physics layer
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// Pattern type has no verb mapping in the loaded ontology
    #[error("Pattern type {0} is not mapped to a kernel verb")]
    UnmappedPattern(String),

    /// Verb IRI in the ontology is not one of the five kernel verbs
    #[error("Unknown kernel verb {0}")]
    UnknownVerb(String),

    /// Ontology must be loaded before dispatch
    #[error("Physics ontology not loaded: {0}")]
    OntologyNotLoaded(String),

    /// Guard expression failed to evaluate
    #[error("Guard evaluation failed: {0}")]
    Guard(String),

    /// Underlying store failure
    #[error(transparent)]
    Store(#[from] kgcl_store::StoreError),
}
