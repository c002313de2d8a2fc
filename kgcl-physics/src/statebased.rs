//! State-based pattern deltas
//!
//! Graph-side effects for deferred choice (WCP-16), milestone (WCP-18), and
//! cancel multi-instance (WCP-27). Each produces a single `QuadDelta` so the
//! effect commits atomically inside the containing tick.

use crate::vocab::kgc;
use crate::PhysicsResult;
use kgcl_store::{GraphStore, QuadDelta};
use oxigraph::model::{GraphName, Literal, NamedNode, Quad};
use serde::{Deserialize, Serialize};

/// Reason written onto losing branches of a deferred choice
pub const DEFERRED_CHOICE_LOST: &str = "deferred_choice_lost";

/// External event targeting a deferred-choice branch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub name: String,
    /// IRI of the branch the event commits to
    pub target: String,
}

/// Outcome of a WCP-27 cancellation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancellationSummary {
    pub cancelled: Vec<String>,
    pub failed: Vec<String>,
    pub errors: Vec<String>,
}

fn flag(node: &NamedNode, predicate: NamedNode, value: bool) -> Quad {
    Quad::new(
        node.clone(),
        predicate,
        Literal::from(value),
        GraphName::DefaultGraph,
    )
}

/// Commit a deferred choice (WCP-16)
///
/// The branch the event names gets `kgc:chosen true`; every sibling branch
/// of the same choice node is disabled with reason `deferred_choice_lost`.
/// Everything lands in one delta so the commit is atomic within the tick.
pub fn deferred_choice_commit(
    store: &GraphStore,
    event: &ExternalEvent,
) -> PhysicsResult<QuadDelta> {
    let mut delta = QuadDelta::new();

    let rows = store.select(&format!(
        "SELECT ?choice WHERE {{ ?choice <{}> <{}> }}",
        kgc("deferredBranch").as_str(),
        event.target
    ))?;
    let Some(choice) = rows.first().and_then(|r| r.get("choice")) else {
        tracing::warn!(target = %event.target, "external event targets no deferred branch");
        return Ok(delta);
    };

    let branches = store.select(&format!(
        "SELECT ?b WHERE {{ <{}> <{}> ?b }}",
        choice,
        kgc("deferredBranch").as_str()
    ))?;

    for row in branches {
        let Some(iri) = row.get("b") else { continue };
        let Ok(branch) = NamedNode::new(iri.clone()) else {
            continue;
        };
        if iri == &event.target {
            delta.add(flag(&branch, kgc("chosen"), true));
        } else {
            delta.add(flag(&branch, kgc("disabled"), true));
            delta.add(Quad::new(
                branch.clone(),
                kgc("disabledReason"),
                Literal::new_simple_literal(DEFERRED_CHOICE_LOST),
                GraphName::DefaultGraph,
            ));
        }
        // Either way the branch stops being merely enabled
        if store.ask(&format!(
            "ASK {{ <{}> <{}> true }}",
            iri,
            kgc("enabled").as_str()
        ))? {
            delta.remove(flag(&branch, kgc("enabled"), true));
        }
    }

    Ok(delta)
}

/// Re-evaluate every milestone condition (WCP-18)
///
/// A task declaring `kgc:milestoneCondition "<ASK query>"` is enabled
/// exactly while the query holds; only tasks whose flag actually changes
/// appear in the delta.
pub fn milestone_pass(store: &GraphStore) -> PhysicsResult<QuadDelta> {
    let mut delta = QuadDelta::new();

    let rows = store.select(&format!(
        "SELECT ?task ?cond WHERE {{ ?task <{}> ?cond }}",
        kgc("milestoneCondition").as_str()
    ))?;

    for row in rows {
        let (Some(task_iri), Some(cond)) = (row.get("task"), row.get("cond")) else {
            continue;
        };
        let Ok(task) = NamedNode::new(task_iri.clone()) else {
            continue;
        };

        let holds = store.ask(cond)?;
        let currently_enabled = store.ask(&format!(
            "ASK {{ <{}> <{}> true }}",
            task_iri,
            kgc("enabled").as_str()
        ))?;

        if holds && !currently_enabled {
            delta.add(flag(&task, kgc("enabled"), true));
        } else if !holds && currently_enabled {
            delta.remove(flag(&task, kgc("enabled"), true));
        }
    }

    Ok(delta)
}

/// Cancel every instance of a task (WCP-27)
///
/// Marks each not-yet-cancelled `kgc:instanceOf` the task with
/// `kgc:cancelled true` and a `kgc:cancelledAt` timestamp, all in one delta.
pub fn cancel_multi_instance(
    store: &GraphStore,
    task: &NamedNode,
    cancelled_at: chrono::DateTime<chrono::Utc>,
) -> PhysicsResult<(QuadDelta, CancellationSummary)> {
    let mut delta = QuadDelta::new();
    let mut summary = CancellationSummary::default();

    let rows = store.select(&format!(
        "SELECT ?i WHERE {{ ?i <{io}> <{task}> .
            FILTER NOT EXISTS {{ ?i <{c}> true }} }}",
        io = kgc("instanceOf").as_str(),
        task = task.as_str(),
        c = kgc("cancelled").as_str()
    ))?;

    for row in rows {
        let Some(iri) = row.get("i") else { continue };
        match NamedNode::new(iri.clone()) {
            Ok(instance) => {
                delta.add(flag(&instance, kgc("cancelled"), true));
                delta.add(Quad::new(
                    instance,
                    kgc("cancelledAt"),
                    Literal::new_simple_literal(cancelled_at.to_rfc3339()),
                    GraphName::DefaultGraph,
                ));
                summary.cancelled.push(iri.clone());
            }
            Err(e) => {
                summary.failed.push(iri.clone());
                summary.errors.push(format!("{}: {}", iri, e));
            }
        }
    }

    Ok((delta, summary))
}
