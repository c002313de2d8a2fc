//! Tick controller
//!
//! One tick is: compute the state hash, run pre-tick hooks (any veto aborts
//! with nothing committed), fire rules in priority order until the pass
//! completes, run post-tick hooks, and emit a receipt. A tick with no rule
//! firing has converged. A rule error rolls the whole tick back, so the
//! receipt shows an unchanged state hash.

use crate::{EngineError, EngineResult};
use kgcl_hooks::{EvaluationContext, HookExecutor, HookReceipt, HookRegistry};
use kgcl_lockchain::{HookReceiptSummary, TickReceipt};
use kgcl_store::{state_hash, GraphStore};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Instant;

/// Phases of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    PreTick,
    ApplyRules,
    PostTick,
}

/// Outcome of one tick
#[derive(Debug, Clone)]
pub struct TickResult {
    pub tick_number: u64,
    pub rules_fired: Vec<String>,
    pub triples_added: u32,
    pub triples_removed: u32,
    pub duration_ms: f64,
    pub converged: bool,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Read-only view handed to tick hooks
pub struct TickView<'a> {
    pub store: &'a GraphStore,
    pub tick_number: u64,
}

/// Production rule fired during APPLY_RULES
///
/// `execute` applies its own deltas through the store and reports the
/// combined count of triples it added and removed.
pub trait Rule: Send + Sync {
    fn id(&self) -> &str;
    fn priority(&self) -> i64 {
        0
    }
    fn execute(&self, store: &mut GraphStore, tick: u64) -> EngineResult<u32>;
}

/// Controller protocol hook (scheduling-level, distinct from knowledge hooks)
pub trait TickHook: Send + Sync {
    /// Return false to veto the tick
    fn on_pre_tick(&mut self, _view: &TickView<'_>) -> bool {
        true
    }
    fn on_rule_fired(&mut self, _view: &TickView<'_>, _rule_id: &str, _changes: u32) {}
    fn on_post_tick(&mut self, _view: &TickView<'_>, _result: &TickResult) {}

    /// Name used in veto reporting
    fn name(&self) -> &str {
        "tick-hook"
    }
}

/// Shared-handle adapter so callers can keep inspecting a registered hook
impl<T: TickHook> TickHook for std::sync::Arc<parking_lot::Mutex<T>> {
    fn on_pre_tick(&mut self, view: &TickView<'_>) -> bool {
        self.lock().on_pre_tick(view)
    }
    fn on_rule_fired(&mut self, view: &TickView<'_>, rule_id: &str, changes: u32) {
        self.lock().on_rule_fired(view, rule_id, changes)
    }
    fn on_post_tick(&mut self, view: &TickView<'_>, result: &TickResult) {
        self.lock().on_post_tick(view, result)
    }
    fn name(&self) -> &str {
        "shared-tick-hook"
    }
}

/// The deterministic scheduler
pub struct TickController {
    rules: Vec<Box<dyn Rule>>,
    tick_hooks: Vec<Box<dyn TickHook>>,
    hook_registry: HookRegistry,
    hook_executor: HookExecutor,
    tick_count: u64,
    total_rules_fired: u64,
}

impl TickController {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            tick_hooks: Vec::new(),
            hook_registry: HookRegistry::new(),
            hook_executor: HookExecutor::new(),
            tick_count: 0,
            total_rules_fired: 0,
        }
    }

    /// Register a rule; rules run in priority-descending order
    pub fn register_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
        self.rules.sort_by_key(|r| std::cmp::Reverse(r.priority()));
    }

    pub fn register_tick_hook(&mut self, hook: Box<dyn TickHook>) {
        self.tick_hooks.push(hook);
    }

    /// Knowledge-hook registry (conditions + handlers)
    pub fn hook_registry_mut(&mut self) -> &mut HookRegistry {
        &mut self.hook_registry
    }

    pub fn hook_executor_mut(&mut self) -> &mut HookExecutor {
        &mut self.hook_executor
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn total_rules_fired(&self) -> u64 {
        self.total_rules_fired
    }

    /// True while the last result has not converged
    pub fn should_continue(&self, result: &TickResult) -> bool {
        !result.converged
    }

    /// Execute one tick over the store
    pub async fn execute_tick(
        &mut self,
        store: &mut GraphStore,
        ctx: &EvaluationContext,
    ) -> EngineResult<(TickResult, TickReceipt)> {
        let start = Instant::now();
        let tick_number = self.tick_count + 1;
        let state_hash_before = state_hash(store)?;
        let mut metadata: BTreeMap<String, serde_json::Value> = BTreeMap::new();

        // PRE_TICK: protocol hooks first, any veto aborts with nothing
        // committed and no receipt appended
        for hook in &mut self.tick_hooks {
            let view = TickView {
                store,
                tick_number,
            };
            if !hook.on_pre_tick(&view) {
                return Err(EngineError::PreTickVetoed {
                    vetoed_by: hook.name().to_string(),
                });
            }
        }

        // Pre-phase knowledge hooks may veto through their handler result
        let pre_receipts = self
            .run_hook_phase("pre", store, ctx, tick_number)
            .await;
        if let Some(veto) = rollback_demand(&pre_receipts) {
            return Err(EngineError::PreTickVetoed { vetoed_by: veto });
        }

        // APPLY_RULES: priority-descending, serialized, rolled back wholesale
        // on the first rule error
        let checkpoint = store.checkpoint();
        let mut rules_fired = Vec::new();
        let mut rule_error: Option<EngineError> = None;

        for i in 0..self.rules.len() {
            let rule_id = self.rules[i].id().to_string();
            match self.rules[i].execute(store, tick_number) {
                Ok(0) => {}
                Ok(changes) => {
                    rules_fired.push(rule_id.clone());
                    self.total_rules_fired += 1;
                    let view = TickView {
                        store,
                        tick_number,
                    };
                    for hook in &mut self.tick_hooks {
                        hook.on_rule_fired(&view, &rule_id, changes);
                    }
                }
                Err(e) => {
                    tracing::error!(rule = %rule_id, error = %e, "rule failed; discarding tick delta");
                    rule_error = Some(EngineError::Rule {
                        rule: rule_id,
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }

        if let Some(e) = &rule_error {
            store.rollback_to(checkpoint)?;
            rules_fired.clear();
            metadata.insert("error".to_string(), json!(e.to_string()));
        }

        // POST_TICK: knowledge hooks observe the post-rule state and may
        // demand a rollback of the whole tick
        let post_receipts = self
            .run_hook_phase("post", store, ctx, tick_number)
            .await;
        if let Some(by) = rollback_demand(&post_receipts) {
            tracing::warn!(hook = %by, tick = tick_number, "post-tick hook rolled the tick back");
            store.rollback_to(checkpoint)?;
            rules_fired.clear();
            metadata.insert("rolled_back_by".to_string(), json!(by));
        }

        let (triples_added, triples_removed) = store.journal_totals(checkpoint);
        let state_hash_after = state_hash(store)?;
        let converged = rules_fired.is_empty() && rule_error.is_none();

        let result = TickResult {
            tick_number,
            rules_fired: rules_fired.clone(),
            triples_added,
            triples_removed,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            converged,
            metadata,
        };

        let mut hook_receipts: Vec<HookReceiptSummary> = Vec::new();
        hook_receipts.extend(pre_receipts.iter().map(HookReceiptSummary::from));
        hook_receipts.extend(post_receipts.iter().map(HookReceiptSummary::from));

        let receipt = TickReceipt {
            tick: tick_number,
            timestamp: chrono::Utc::now(),
            state_hash_before,
            state_hash_after,
            rules_fired,
            triples_added,
            triples_removed,
            converged,
            hook_receipts,
        };

        let view = TickView {
            store,
            tick_number,
        };
        for hook in &mut self.tick_hooks {
            hook.on_post_tick(&view, &result);
        }

        self.tick_count = tick_number;
        Ok((result, receipt))
    }

    async fn run_hook_phase(
        &mut self,
        phase: &str,
        store: &GraphStore,
        ctx: &EvaluationContext,
        tick: u64,
    ) -> Vec<HookReceipt> {
        // Hooks default to the post phase; `metadata["phase"] = "pre"` moves
        // one to the front of the tick
        let in_phase: Vec<String> = self
            .hook_registry
            .all()
            .iter()
            .filter(|h| h.metadata.get("phase").map(String::as_str).unwrap_or("post") == phase)
            .map(|h| h.name.clone())
            .collect();
        if in_phase.is_empty() {
            return Vec::new();
        }

        let mut receipts = Vec::new();
        for index in self.hook_registry.execution_order() {
            let Some(hook) = self.hook_registry.all().get(index) else {
                continue;
            };
            if !hook.enabled || !in_phase.contains(&hook.name) {
                continue;
            }
            let name = hook.name.clone();
            if let Some(hook) = self.hook_registry.get_mut(&name) {
                let receipt = self.hook_executor.execute(hook, store, ctx, tick).await;
                let failed = receipt.is_failure();
                receipts.push(receipt);
                if failed && self.hook_executor.fail_fast {
                    break;
                }
            }
        }
        receipts
    }
}

impl Default for TickController {
    fn default() -> Self {
        Self::new()
    }
}

/// First hook (by receipt order) whose handler demanded a rollback
fn rollback_demand(receipts: &[HookReceipt]) -> Option<String> {
    receipts.iter().find_map(|r| {
        let demanded = r
            .handler_result
            .as_ref()
            .and_then(|m| m.get("should_rollback"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        (r.condition_result.triggered && demanded).then(|| r.hook_id.clone())
    })
}

/// Stock hook recording per-rule fire counts and tick history
#[derive(Debug, Default)]
pub struct ProvenanceHook {
    history: Vec<TickResultSnapshot>,
    rule_counts: BTreeMap<String, u64>,
}

/// History entry kept by [`ProvenanceHook`]
#[derive(Debug, Clone)]
pub struct TickResultSnapshot {
    pub tick_number: u64,
    pub rules_fired: usize,
    pub duration_ms: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Aggregates computed from the provenance history
#[derive(Debug, Clone, PartialEq)]
pub struct ProvenanceStats {
    pub total_ticks: usize,
    pub total_rules_fired: u64,
    pub avg_duration_ms: f64,
    pub avg_rules_per_tick: f64,
    pub most_fired_rule: Option<(String, u64)>,
}

impl ProvenanceHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[TickResultSnapshot] {
        &self.history
    }

    pub fn rule_counts(&self) -> &BTreeMap<String, u64> {
        &self.rule_counts
    }

    pub fn compute_statistics(&self) -> ProvenanceStats {
        let total_ticks = self.history.len();
        let total_rules_fired: u64 = self.rule_counts.values().sum();
        let (avg_duration_ms, avg_rules_per_tick) = if total_ticks == 0 {
            (0.0, 0.0)
        } else {
            (
                self.history.iter().map(|h| h.duration_ms).sum::<f64>() / total_ticks as f64,
                self.history.iter().map(|h| h.rules_fired as f64).sum::<f64>()
                    / total_ticks as f64,
            )
        };
        let most_fired_rule = self
            .rule_counts
            .iter()
            .max_by_key(|(_, &count)| count)
            .map(|(rule, &count)| (rule.clone(), count));

        ProvenanceStats {
            total_ticks,
            total_rules_fired,
            avg_duration_ms,
            avg_rules_per_tick,
            most_fired_rule,
        }
    }
}

impl TickHook for ProvenanceHook {
    fn on_rule_fired(&mut self, _view: &TickView<'_>, rule_id: &str, _changes: u32) {
        *self.rule_counts.entry(rule_id.to_string()).or_insert(0) += 1;
    }

    fn on_post_tick(&mut self, _view: &TickView<'_>, result: &TickResult) {
        self.history.push(TickResultSnapshot {
            tick_number: result.tick_number,
            rules_fired: result.rules_fired.len(),
            duration_ms: result.duration_ms,
            timestamp: chrono::Utc::now(),
        });
    }

    fn name(&self) -> &str {
        "provenance"
    }
}

/// Stock hook logging tick activity through an injected function
pub struct DebugHook {
    log_fn: Box<dyn Fn(&str) + Send + Sync>,
    verbose: bool,
}

impl DebugHook {
    pub fn new() -> Self {
        Self {
            log_fn: Box::new(|msg| tracing::debug!("{}", msg)),
            verbose: false,
        }
    }

    pub fn with_log_fn(log_fn: Box<dyn Fn(&str) + Send + Sync>, verbose: bool) -> Self {
        Self { log_fn, verbose }
    }
}

impl Default for DebugHook {
    fn default() -> Self {
        Self::new()
    }
}

impl TickHook for DebugHook {
    fn on_pre_tick(&mut self, view: &TickView<'_>) -> bool {
        let size = view.store.len().unwrap_or(0);
        (self.log_fn)(&format!(
            "[TICK {}] PRE: Graph size = {}",
            view.tick_number, size
        ));
        if self.verbose {
            if let Ok(quads) = view.store.quads() {
                let preview: Vec<String> = quads
                    .iter()
                    .take(5)
                    .map(kgcl_store::store::nquads_line)
                    .collect();
                (self.log_fn)(&format!(
                    "[TICK {}] Graph preview: {}",
                    view.tick_number,
                    preview.join(" | ")
                ));
            }
        }
        true
    }

    fn on_rule_fired(&mut self, view: &TickView<'_>, rule_id: &str, _changes: u32) {
        (self.log_fn)(&format!(
            "[TICK {}] RULE FIRED: {}",
            view.tick_number, rule_id
        ));
    }

    fn on_post_tick(&mut self, view: &TickView<'_>, result: &TickResult) {
        (self.log_fn)(&format!(
            "[TICK {}] POST: rules_fired={} added={} removed={} duration={:.2}ms converged={}",
            view.tick_number,
            result.rules_fired.len(),
            result.triples_added,
            result.triples_removed,
            result.duration_ms,
            result.converged
        ));
    }

    fn name(&self) -> &str {
        "debug"
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use oxigraph::model::{GraphName, Literal, NamedNode, Quad};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Rule adding `changes` fresh triples per execution
    struct CountingRule {
        id: String,
        changes: u32,
        offset: u32,
        priority: i64,
    }

    impl Rule for CountingRule {
        fn id(&self) -> &str {
            &self.id
        }
        fn priority(&self) -> i64 {
            self.priority
        }
        fn execute(&self, store: &mut GraphStore, tick: u64) -> EngineResult<u32> {
            if self.changes == 0 {
                return Ok(0);
            }
            let mut delta = kgcl_store::QuadDelta::new();
            for i in 0..self.changes {
                delta.add(Quad::new(
                    NamedNode::new(format!(
                        "http://example.org/s{}-{}-{}",
                        self.offset, tick, i
                    ))
                    .map_err(|e| EngineError::Config(e.to_string()))?,
                    NamedNode::new("http://example.org/p")
                        .map_err(|e| EngineError::Config(e.to_string()))?,
                    Literal::new_simple_literal("o"),
                    GraphName::DefaultGraph,
                ));
            }
            store.apply_delta(&delta)?;
            Ok(self.changes)
        }
    }

    struct FailingRule;
    impl Rule for FailingRule {
        fn id(&self) -> &str {
            "failing"
        }
        fn priority(&self) -> i64 {
            -10
        }
        fn execute(&self, _store: &mut GraphStore, _tick: u64) -> EngineResult<u32> {
            Err(EngineError::Config("deliberate failure".to_string()))
        }
    }

    struct VetoHook;
    impl TickHook for VetoHook {
        fn on_pre_tick(&mut self, _view: &TickView<'_>) -> bool {
            false
        }
        fn name(&self) -> &str {
            "veto"
        }
    }

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(chrono::Utc::now())
    }

    #[tokio::test]
    async fn test_tick_with_no_rules_converges() {
        let mut store = GraphStore::new().unwrap();
        let mut controller = TickController::new();

        let (result, receipt) = controller.execute_tick(&mut store, &ctx()).await.unwrap();

        assert_eq!(result.tick_number, 1);
        assert!(result.rules_fired.is_empty());
        assert!(result.converged);
        assert_eq!(controller.tick_count(), 1);
        assert_eq!(receipt.state_hash_before, receipt.state_hash_after);
    }

    #[tokio::test]
    async fn test_tick_with_firing_rules() {
        let mut store = GraphStore::new().unwrap();
        let mut controller = TickController::new();
        controller.register_rule(Box::new(CountingRule {
            id: "rule1".to_string(),
            changes: 3,
            offset: 0,
            priority: 10,
        }));
        controller.register_rule(Box::new(CountingRule {
            id: "rule2".to_string(),
            changes: 2,
            offset: 1,
            priority: 5,
        }));

        let (result, receipt) = controller.execute_tick(&mut store, &ctx()).await.unwrap();

        assert_eq!(result.rules_fired, vec!["rule1", "rule2"]);
        assert_eq!(result.triples_added, 5);
        assert!(!result.converged);
        assert_eq!(store.len().unwrap(), 5);
        assert_ne!(receipt.state_hash_before, receipt.state_hash_after);
        assert_eq!(controller.total_rules_fired(), 2);
    }

    #[tokio::test]
    async fn test_rules_run_priority_descending() {
        let mut store = GraphStore::new().unwrap();
        let mut controller = TickController::new();
        controller.register_rule(Box::new(CountingRule {
            id: "low".to_string(),
            changes: 1,
            offset: 0,
            priority: 1,
        }));
        controller.register_rule(Box::new(CountingRule {
            id: "high".to_string(),
            changes: 1,
            offset: 1,
            priority: 99,
        }));

        let (result, _) = controller.execute_tick(&mut store, &ctx()).await.unwrap();
        assert_eq!(result.rules_fired, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn test_tick_counter_increments() {
        let mut store = GraphStore::new().unwrap();
        let mut controller = TickController::new();

        for expected in 1..=3u64 {
            let (result, _) = controller.execute_tick(&mut store, &ctx()).await.unwrap();
            assert_eq!(result.tick_number, expected);
        }
        assert_eq!(controller.tick_count(), 3);
    }

    #[tokio::test]
    async fn test_pre_tick_veto_commits_nothing() {
        let mut store = GraphStore::new().unwrap();
        let mut controller = TickController::new();
        controller.register_tick_hook(Box::new(VetoHook));
        controller.register_rule(Box::new(CountingRule {
            id: "rule".to_string(),
            changes: 3,
            offset: 0,
            priority: 0,
        }));

        let err = controller.execute_tick(&mut store, &ctx()).await.unwrap_err();
        assert!(matches!(err, EngineError::PreTickVetoed { .. }));
        assert_eq!(store.len().unwrap(), 0);
        assert_eq!(controller.tick_count(), 0);
    }

    #[tokio::test]
    async fn test_rule_error_rolls_tick_back() {
        let mut store = GraphStore::new().unwrap();
        let mut controller = TickController::new();
        controller.register_rule(Box::new(CountingRule {
            id: "good".to_string(),
            changes: 3,
            offset: 0,
            priority: 10,
        }));
        controller.register_rule(Box::new(FailingRule));

        let (result, receipt) = controller.execute_tick(&mut store, &ctx()).await.unwrap();

        // The good rule's delta was discarded with the tick
        assert_eq!(store.len().unwrap(), 0);
        assert_eq!(receipt.state_hash_before, receipt.state_hash_after);
        assert!(result.rules_fired.is_empty());
        assert!(result.metadata.contains_key("error"));
        assert!(!result.converged);
    }

    #[tokio::test]
    async fn test_provenance_hook_accumulates() {
        let mut store = GraphStore::new().unwrap();
        let mut controller = TickController::new();
        controller.register_rule(Box::new(CountingRule {
            id: "rule1".to_string(),
            changes: 1,
            offset: 0,
            priority: 0,
        }));

        let provenance = Arc::new(Mutex::new(ProvenanceHook::new()));
        controller.register_tick_hook(Box::new(provenance.clone()));

        controller.execute_tick(&mut store, &ctx()).await.unwrap();
        controller.execute_tick(&mut store, &ctx()).await.unwrap();

        let hook = provenance.lock();
        assert_eq!(hook.history().len(), 2);
        assert_eq!(hook.rule_counts()["rule1"], 2);

        let stats = hook.compute_statistics();
        assert_eq!(stats.total_ticks, 2);
        assert_eq!(stats.total_rules_fired, 2);
        assert_eq!(stats.avg_rules_per_tick, 1.0);
        assert_eq!(stats.most_fired_rule, Some(("rule1".to_string(), 2)));
    }

    #[tokio::test]
    async fn test_provenance_stats_empty() {
        let hook = ProvenanceHook::new();
        let stats = hook.compute_statistics();
        assert_eq!(stats.total_ticks, 0);
        assert_eq!(stats.avg_duration_ms, 0.0);
        assert_eq!(stats.most_fired_rule, None);
    }

    #[tokio::test]
    async fn test_debug_hook_logs() {
        let logs: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let logs_clone = logs.clone();

        let mut store = GraphStore::new().unwrap();
        let mut controller = TickController::new();
        controller.register_rule(Box::new(CountingRule {
            id: "rule1".to_string(),
            changes: 1,
            offset: 0,
            priority: 0,
        }));
        controller.register_tick_hook(Box::new(DebugHook::with_log_fn(
            Box::new(move |msg| logs_clone.lock().push(msg.to_string())),
            false,
        )));

        controller.execute_tick(&mut store, &ctx()).await.unwrap();

        let logs = logs.lock();
        assert!(logs.iter().any(|l| l.contains("[TICK 1] PRE: Graph size = 0")));
        assert!(logs.iter().any(|l| l.contains("[TICK 1] RULE FIRED: rule1")));
        assert!(logs.iter().any(|l| l.contains("[TICK 1] POST:") && l.contains("converged=false")));
    }

    #[tokio::test]
    async fn test_should_continue() {
        let controller = TickController::new();
        let converged = TickResult {
            tick_number: 1,
            rules_fired: vec![],
            triples_added: 0,
            triples_removed: 0,
            duration_ms: 0.0,
            converged: true,
            metadata: BTreeMap::new(),
        };
        assert!(!controller.should_continue(&converged));

        let mut running = converged.clone();
        running.converged = false;
        assert!(controller.should_continue(&running));
    }
}
