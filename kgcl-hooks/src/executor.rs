//! Hook executor
//!
//! Walks a hook through its lifecycle:
//! Pending → Active → (condition true ? Executed → Completed | Failed
//!                     : Completed), with any uncaught failure landing in
//! Failed. Lifecycle events fire at the four boundaries; subscriber panics
//! are swallowed so they cannot corrupt the hook's own state machine.

use crate::evaluator::{ConditionEvaluator, EvaluationContext};
use crate::hook::{Hook, HookContext, HookState};
use crate::receipts::HookReceipt;
use crate::registry::HookRegistry;
use crate::{ConditionResult, HookError, HookResult};
use kgcl_store::GraphStore;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle boundary markers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    PreCondition,
    PostCondition,
    PreExecute,
    PostExecute,
}

/// Event broadcast to subscribers at each boundary
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub phase: LifecyclePhase,
    pub hook_name: String,
    pub tick: u64,
}

/// Subscriber callback
pub type LifecycleSubscriber = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Executes hooks and produces receipts
pub struct HookExecutor {
    evaluator: ConditionEvaluator,
    subscribers: Vec<LifecycleSubscriber>,
    /// Stop executing remaining hooks after the first failure
    pub fail_fast: bool,
    /// Handler results above this size are truncated in receipts
    pub max_result_bytes: usize,
}

impl HookExecutor {
    pub fn new() -> Self {
        Self {
            evaluator: ConditionEvaluator::new(),
            subscribers: Vec::new(),
            fail_fast: false,
            max_result_bytes: 64 * 1024,
        }
    }

    pub fn subscribe(&mut self, subscriber: LifecycleSubscriber) {
        self.subscribers.push(subscriber);
    }

    pub fn evaluator(&self) -> &ConditionEvaluator {
        &self.evaluator
    }

    fn emit(&self, phase: LifecyclePhase, hook_name: &str, tick: u64) {
        let event = LifecycleEvent {
            phase,
            hook_name: hook_name.to_string(),
            tick,
        };
        for subscriber in &self.subscribers {
            // A panicking subscriber must not poison the lifecycle
            if catch_unwind(AssertUnwindSafe(|| subscriber(&event))).is_err() {
                tracing::warn!(hook = hook_name, ?phase, "lifecycle subscriber panicked");
            }
        }
    }

    /// Execute a single hook against the store, producing its receipt
    ///
    /// Errors never escape: timeouts and handler failures are captured into
    /// the receipt with the hook left in `Failed`.
    pub async fn execute(
        &self,
        hook: &mut Hook,
        store: &GraphStore,
        ctx: &EvaluationContext,
        tick: u64,
    ) -> HookReceipt {
        let start = Instant::now();
        hook.transition(HookState::Active);

        self.emit(LifecyclePhase::PreCondition, &hook.name, tick);
        let condition_outcome = if hook.cache_ttl_s > 0 {
            self.evaluator
                .evaluate_cached(&hook.condition, store, ctx, hook.timeout_s, hook.cache_ttl_s)
                .await
        } else {
            self.evaluator
                .evaluate(&hook.condition, store, ctx, hook.timeout_s)
                .await
        };
        self.emit(LifecyclePhase::PostCondition, &hook.name, tick);

        let condition_result = match condition_outcome {
            Ok(result) => result,
            Err(e) => {
                hook.transition(HookState::Failed);
                tracing::warn!(hook = %hook.name, error = %e, "condition evaluation failed");
                return HookReceipt::new(
                    hook.name.clone(),
                    hook.actor.clone(),
                    ConditionResult::bare(false),
                    None,
                    start.elapsed().as_secs_f64() * 1000.0,
                    Some(e.to_string()),
                    None,
                    Some(self.max_result_bytes),
                );
            }
        };

        if !condition_result.triggered {
            // Falsy condition short-circuits: handler never runs
            hook.transition(HookState::Completed);
            return HookReceipt::new(
                hook.name.clone(),
                hook.actor.clone(),
                condition_result,
                None,
                start.elapsed().as_secs_f64() * 1000.0,
                None,
                None,
                Some(self.max_result_bytes),
            );
        }

        hook.transition(HookState::Executed);
        self.emit(LifecyclePhase::PreExecute, &hook.name, tick);

        let context = HookContext {
            hook_name: hook.name.clone(),
            tick,
            condition_metadata: condition_result.metadata.clone(),
            data: serde_json::Value::Null,
        };
        let handler_outcome = self.run_handler(hook, context).await;

        self.emit(LifecyclePhase::PostExecute, &hook.name, tick);

        match handler_outcome {
            Ok(result) => {
                hook.transition(HookState::Completed);
                HookReceipt::new(
                    hook.name.clone(),
                    hook.actor.clone(),
                    condition_result,
                    Some(result),
                    start.elapsed().as_secs_f64() * 1000.0,
                    None,
                    None,
                    Some(self.max_result_bytes),
                )
            }
            Err(e) => {
                hook.transition(HookState::Failed);
                tracing::warn!(hook = %hook.name, error = %e, "handler failed");
                HookReceipt::new(
                    hook.name.clone(),
                    hook.actor.clone(),
                    condition_result,
                    None,
                    start.elapsed().as_secs_f64() * 1000.0,
                    Some(e.to_string()),
                    None,
                    Some(self.max_result_bytes),
                )
            }
        }
    }

    async fn run_handler(
        &self,
        hook: &Hook,
        context: HookContext,
    ) -> HookResult<serde_json::Map<String, serde_json::Value>> {
        let future = (hook.handler)(context);
        match tokio::time::timeout(std::time::Duration::from_secs_f64(hook.timeout_s), future).await
        {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(message)) => Err(HookError::Evaluation(message)),
            Err(_) => Err(HookError::HandlerTimeout {
                timeout_s: hook.timeout_s,
            }),
        }
    }

    /// Execute every enabled hook in priority order, collecting receipts
    ///
    /// With `fail_fast` unset (the default) execution continues past failed
    /// hooks; otherwise it stops after the first failure.
    pub async fn execute_all(
        &self,
        registry: &mut HookRegistry,
        store: &GraphStore,
        ctx: &EvaluationContext,
        tick: u64,
    ) -> Vec<HookReceipt> {
        let mut receipts = Vec::new();
        for index in registry.execution_order() {
            let Some(hook) = registry.at_mut(index) else {
                continue;
            };
            if !hook.enabled {
                continue;
            }
            let receipt = self.execute(hook, store, ctx, tick).await;
            let failed = receipt.is_failure();
            receipts.push(receipt);
            if failed && self.fail_fast {
                break;
            }
        }
        receipts
    }
}

impl Default for HookExecutor {
    fn default() -> Self {
        Self::new()
    }
}
