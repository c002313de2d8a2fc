//! Knowledge hooks
//!
//! A hook pairs a condition over the graph with a handler. The executor
//! walks each hook through its lifecycle, evaluates the condition (with
//! caching and timeouts), runs the handler when the condition triggers, and
//! emits an immutable receipt either way. Hook failures never propagate;
//! they are captured in the receipt.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod conditions;
pub mod evaluator;
pub mod executor;
pub mod hook;
pub mod receipts;
pub mod registry;

pub use conditions::{
    Aggregation, CompositeOp, Condition, ConditionResult, DeltaKind, ThresholdOp,
};
pub use evaluator::{ConditionEvaluator, EvaluationContext, Sample};
pub use executor::{HookExecutor, LifecycleEvent, LifecyclePhase, LifecycleSubscriber};
pub use hook::{Hook, HookContext, HookHandler, HookState};
pub use receipts::HookReceipt;
pub use registry::HookRegistry;

use thiserror::Error;

/// Result type for hook operations
pub type HookResult<T> = Result<T, HookError>;

/// Errors raised by the hook subsystem
#[derive(Debug, Error)]
pub enum HookError {
    /// Hook structure is invalid (bad name, priority, duplicate)
    #[error("Hook validation failed: {0}")]
    Validation(String),

    /// Condition evaluation exceeded its timeout
    #[error("Condition evaluation timed out after {timeout_s}s")]
    ConditionTimeout { timeout_s: f64 },

    /// Handler execution exceeded its timeout
    #[error("Handler timed out after {timeout_s}s")]
    HandlerTimeout { timeout_s: f64 },

    /// Condition evaluation failed
    #[error("Condition evaluation failed: {0}")]
    Evaluation(String),

    /// Underlying store failure during evaluation
    #[error(transparent)]
    Store(#[from] kgcl_store::StoreError),
}
