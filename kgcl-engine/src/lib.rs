//! Deterministic execution engine
//!
//! The tick controller runs the pre/rule/post cycle over the graph store;
//! the orchestrator owns the store, controller, lockchain, and temporal log
//! and exposes `tick()` / `run_to_completion()`. Everything observable
//! happens inside a tick and lands in a receipt.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod config;
pub mod controller;
pub mod orchestrator;
pub mod reasoner;
pub mod rules;

pub use config::EngineConfig;
pub use controller::{
    DebugHook, ProvenanceHook, Rule, TickController, TickHook, TickPhase, TickResult, TickView,
};
pub use orchestrator::{Orchestrator, TokenState};
pub use reasoner::WarmReasonerPool;

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// A pre-tick hook refused the tick; nothing was committed
    #[error("Pre-tick vetoed by {vetoed_by}")]
    PreTickVetoed { vetoed_by: String },

    /// Rule firing did not reach a fixpoint within the tick budget
    #[error("No convergence after {ticks} tick(s)")]
    NonConvergence { ticks: u64 },

    /// A rule failed; the tick was rolled back
    #[error("Rule {rule} failed: {message}")]
    Rule { rule: String, message: String },

    /// Lockchain or temporal-store failure; the audit trail is compromised
    #[error("Audit trail failure: {0}")]
    AuditTrail(String),

    /// Bad configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] kgcl_store::StoreError),

    #[error(transparent)]
    Physics(#[from] kgcl_physics::PhysicsError),

    #[error(transparent)]
    Hooks(#[from] kgcl_hooks::HookError),

    #[error(transparent)]
    Net(#[from] kgcl_net::NetError),
}

impl From<kgcl_lockchain::LockchainError> for EngineError {
    fn from(err: kgcl_lockchain::LockchainError) -> Self {
        EngineError::AuditTrail(err.to_string())
    }
}

impl From<kgcl_temporal::TemporalError> for EngineError {
    fn from(err: kgcl_temporal::TemporalError) -> Self {
        EngineError::AuditTrail(err.to_string())
    }
}
