//! Production rules generated from the physics ontology
//!
//! One `PatternRule` per pattern type the ontology declares, so the receipt's
//! `rules_fired` carries pattern IRIs and rule priority comes straight from
//! `kgc:dispatchPriority`. Ingress, deferred-choice, and milestone rules run
//! alongside them inside the same tick.

use crate::controller::Rule;
use crate::EngineResult;
use kgcl_physics::statebased::{deferred_choice_commit, milestone_pass, ExternalEvent};
use kgcl_physics::topology::{classify, token_nodes};
use kgcl_physics::vocab::kgc;
use kgcl_physics::{SemanticDriver, TransactionContext};
use kgcl_store::{GraphStore, QuadDelta};
use oxigraph::model::NamedNode;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Case variables shared between the orchestrator and filter guards
pub type SharedVariables = Arc<RwLock<BTreeMap<String, f64>>>;

/// Queue of externally submitted events, honored between ticks
pub type EventQueue = Arc<Mutex<VecDeque<ExternalEvent>>>;

/// Queue of barrier-admitted deltas awaiting application
pub type DeltaQueue = Arc<Mutex<VecDeque<QuadDelta>>>;

/// Fires one ontology-declared pattern type over all matching focus nodes
pub struct PatternRule {
    pattern: NamedNode,
    id: String,
    priority: i64,
    driver: Arc<SemanticDriver>,
    variables: SharedVariables,
    actor: String,
}

impl Rule for PatternRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i64 {
        self.priority
    }

    fn execute(&self, store: &mut GraphStore, tick: u64) -> EngineResult<u32> {
        // Classify every token-bearing node; keep the focuses this pattern
        // owns, in lexicographic order for determinism
        let mut focuses: Vec<NamedNode> = Vec::new();
        for node in token_nodes(store)? {
            if let Some((pattern, focus)) = classify(store, &node)? {
                if pattern == self.pattern && !focuses.contains(&focus) {
                    focuses.push(focus);
                }
            }
        }
        focuses.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        let ctx = TransactionContext {
            prev_hash: String::new(),
            actor: self.actor.clone(),
            tick,
            variables: self.variables.read().clone(),
        };

        let mut changes = 0;
        for focus in &focuses {
            let outcome = self.driver.dispatch(store, &self.pattern, focus, &ctx)?;
            if outcome.delta.is_empty() {
                continue;
            }
            changes += outcome.delta.len() as u32;
            store.apply_delta(&outcome.delta)?;
        }
        Ok(changes)
    }
}

/// Applies barrier-admitted deltas at the head of the rule pass
pub struct IngressRule {
    id: String,
    deltas: DeltaQueue,
}

impl IngressRule {
    pub fn new(deltas: DeltaQueue) -> Self {
        Self {
            id: kgc("Admission").as_str().to_string(),
            deltas,
        }
    }
}

impl Rule for IngressRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i64 {
        70
    }

    fn execute(&self, store: &mut GraphStore, _tick: u64) -> EngineResult<u32> {
        let mut changes = 0;
        loop {
            let Some(delta) = self.deltas.lock().pop_front() else {
                break;
            };
            changes += delta.len() as u32;
            store.apply_delta(&delta)?;
        }
        Ok(changes)
    }
}

/// WCP-16: commits queued external events to their deferred-choice branches
pub struct DeferredChoiceRule {
    id: String,
    events: EventQueue,
}

impl DeferredChoiceRule {
    pub fn new(events: EventQueue) -> Self {
        Self {
            id: kgc("WCP16_DeferredChoice").as_str().to_string(),
            events,
        }
    }
}

impl Rule for DeferredChoiceRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i64 {
        60
    }

    fn execute(&self, store: &mut GraphStore, _tick: u64) -> EngineResult<u32> {
        let mut changes = 0;
        loop {
            let Some(event) = self.events.lock().pop_front() else {
                break;
            };
            let delta = deferred_choice_commit(store, &event)?;
            if delta.is_empty() {
                continue;
            }
            changes += delta.len() as u32;
            store.apply_delta(&delta)?;
        }
        Ok(changes)
    }
}

/// WCP-18: re-evaluates milestone conditions every tick
pub struct MilestoneRule {
    id: String,
}

impl MilestoneRule {
    pub fn new() -> Self {
        Self {
            id: kgc("WCP18_Milestone").as_str().to_string(),
        }
    }
}

impl Default for MilestoneRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for MilestoneRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i64 {
        45
    }

    fn execute(&self, store: &mut GraphStore, _tick: u64) -> EngineResult<u32> {
        let delta = milestone_pass(store)?;
        if delta.is_empty() {
            return Ok(0);
        }
        let changes = delta.len() as u32;
        store.apply_delta(&delta)?;
        Ok(changes)
    }
}

/// Build the full rule set: one rule per ontology pattern type plus the
/// ingress, deferred-choice, and milestone rules
pub fn rules_from_ontology(
    driver: &Arc<SemanticDriver>,
    variables: &SharedVariables,
    events: &EventQueue,
    deltas: &DeltaQueue,
    actor: &str,
) -> EngineResult<Vec<Box<dyn Rule>>> {
    let mut rules: Vec<Box<dyn Rule>> = vec![
        Box::new(IngressRule::new(deltas.clone())),
        Box::new(DeferredChoiceRule::new(events.clone())),
        Box::new(MilestoneRule::new()),
    ];

    for pattern in driver.ontology().pattern_types()? {
        let priority = driver.ontology().priority_for(&pattern)?;
        rules.push(Box::new(PatternRule {
            id: pattern.as_str().to_string(),
            pattern,
            priority,
            driver: driver.clone(),
            variables: variables.clone(),
            actor: actor.to_string(),
        }));
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use kgcl_physics::PhysicsOntology;

    const PREFIXES: &str = r#"
        @prefix kgc: <http://kgcl.io/ontology/kgc#> .
        @prefix yawl: <http://www.yawlfoundation.org/yawlschema#> .
        @prefix wf: <http://example.org/workflow#> .
    "#;

    fn driver() -> Arc<SemanticDriver> {
        Arc::new(SemanticDriver::new(Arc::new(
            PhysicsOntology::default_physics().unwrap(),
        )))
    }

    fn shared() -> (SharedVariables, EventQueue, DeltaQueue) {
        (
            Arc::new(RwLock::new(BTreeMap::new())),
            Arc::new(Mutex::new(VecDeque::new())),
            Arc::new(Mutex::new(VecDeque::new())),
        )
    }

    #[test]
    fn test_sequence_pattern_rule_moves_token() {
        let mut store = GraphStore::new().unwrap();
        store
            .load_turtle(&format!(
                "{}{}",
                PREFIXES,
                r#"
                wf:TaskA kgc:hasToken true ;
                    yawl:flowsInto wf:f1 .
                wf:f1 yawl:nextElementRef wf:TaskB .
                "#
            ))
            .unwrap();

        let (variables, events, deltas) = shared();
        let rules = rules_from_ontology(&driver(), &variables, &events, &deltas, "test").unwrap();
        let sequence = rules
            .iter()
            .find(|r| r.id().ends_with("WCP1_Sequence"))
            .unwrap();

        let changes = sequence.execute(&mut store, 1).unwrap();
        assert_eq!(changes, 2);
        assert!(store
            .ask("ASK { <http://example.org/workflow#TaskB> <http://kgcl.io/ontology/kgc#hasToken> true }")
            .unwrap());
    }

    #[test]
    fn test_rules_carry_ontology_priorities() {
        let (variables, events, deltas) = shared();
        let rules = rules_from_ontology(&driver(), &variables, &events, &deltas, "test").unwrap();

        let priority_of = |suffix: &str| {
            rules
                .iter()
                .find(|r| r.id().ends_with(suffix))
                .map(|r| r.priority())
                .unwrap()
        };
        assert!(priority_of("WCP19_CancelActivity") > priority_of("WCP3_Synchronization"));
        assert!(priority_of("WCP3_Synchronization") > priority_of("WCP1_Sequence"));
    }

    #[test]
    fn test_ingress_rule_drains_queue() {
        let mut store = GraphStore::new().unwrap();
        let (_, _, deltas) = shared();

        let mut delta = QuadDelta::new();
        delta.add(oxigraph::model::Quad::new(
            NamedNode::new("http://example.org/s").unwrap(),
            NamedNode::new("http://example.org/p").unwrap(),
            oxigraph::model::Literal::new_simple_literal("o"),
            oxigraph::model::GraphName::DefaultGraph,
        ));
        deltas.lock().push_back(delta);

        let rule = IngressRule::new(deltas.clone());
        assert_eq!(rule.execute(&mut store, 1).unwrap(), 1);
        assert_eq!(store.len().unwrap(), 1);
        // Queue drained: second run is a no-op
        assert_eq!(rule.execute(&mut store, 1).unwrap(), 0);
    }

    #[test]
    fn test_deferred_choice_rule_commits_event() {
        let mut store = GraphStore::new().unwrap();
        store
            .load_turtle(&format!(
                "{}{}",
                PREFIXES,
                r#"
                wf:Choice kgc:deferredBranch wf:Branch1, wf:Branch2 .
                wf:Branch1 kgc:enabled true .
                wf:Branch2 kgc:enabled true .
                "#
            ))
            .unwrap();

        let (_, events, _) = shared();
        events.lock().push_back(ExternalEvent {
            name: "EventX".to_string(),
            target: "http://example.org/workflow#Branch1".to_string(),
        });

        let rule = DeferredChoiceRule::new(events);
        let changes = rule.execute(&mut store, 1).unwrap();
        assert!(changes > 0);
        assert!(store
            .ask("ASK { <http://example.org/workflow#Branch1> <http://kgcl.io/ontology/kgc#chosen> true }")
            .unwrap());
    }
}
