//! Topology reading and focus classification
//!
//! Tokens live on task nodes as `kgc:hasToken true`; edges run either
//! directly (`yawl:nextElementRef`) or through a flow node
//! (`yawl:flowsInto` / `yawl:nextElementRef`). Classification is a pure
//! function of the graph: it names a pattern type for a token-bearing node,
//! and the ontology alone decides what that pattern type means.

use crate::vocab::{flows_into, has_predicate, has_token, kgc, next_element_ref, pattern_type};
use crate::PhysicsResult;
use kgcl_store::GraphStore;
use oxigraph::model::NamedNode;

/// One outgoing edge: the flow node (or the task itself for direct edges),
/// the target, and an optional guard predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    pub flow: String,
    pub target: NamedNode,
    pub guard: Option<String>,
}

/// Outgoing flows of a node, sorted by flow IRI for deterministic routing
pub fn outgoing_flows(store: &GraphStore, node: &NamedNode) -> PhysicsResult<Vec<Flow>> {
    let rows = store.select(&format!(
        "SELECT ?flow ?next ?guard WHERE {{
            {{ <{n}> <{fi}> ?flow . ?flow <{ne}> ?next .
               OPTIONAL {{ ?flow <{hp}> ?guard }} }}
            UNION
            {{ <{n}> <{ne}> ?next . BIND(<{n}> AS ?flow)
               OPTIONAL {{ <{n}> <{hp}> ?guard }} }}
        }}",
        n = node.as_str(),
        fi = flows_into().as_str(),
        ne = next_element_ref().as_str(),
        hp = has_predicate().as_str()
    ))?;

    let mut flows = Vec::new();
    for row in rows {
        let (Some(flow), Some(next)) = (row.get("flow"), row.get("next")) else {
            continue;
        };
        let Ok(target) = NamedNode::new(next.clone()) else {
            continue;
        };
        flows.push(Flow {
            flow: flow.clone(),
            target,
            guard: row.get("guard").cloned(),
        });
    }
    flows.sort_by(|a, b| a.flow.cmp(&b.flow));
    flows.dedup();
    Ok(flows)
}

/// Successor tasks of a node
pub fn successors(store: &GraphStore, node: &NamedNode) -> PhysicsResult<Vec<NamedNode>> {
    Ok(outgoing_flows(store, node)?
        .into_iter()
        .map(|f| f.target)
        .collect())
}

/// Predecessor tasks of a node
///
/// The direct-edge branch excludes flow nodes (anything that is the object
/// of a `flowsInto`).
pub fn predecessors(store: &GraphStore, node: &NamedNode) -> PhysicsResult<Vec<NamedNode>> {
    let rows = store.select(&format!(
        "SELECT DISTINCT ?prev WHERE {{
            {{ ?prev <{fi}> ?f . ?f <{ne}> <{n}> }}
            UNION
            {{ ?prev <{ne}> <{n}> .
               FILTER NOT EXISTS {{ ?src <{fi}> ?prev }} }}
        }}",
        n = node.as_str(),
        fi = flows_into().as_str(),
        ne = next_element_ref().as_str()
    ))?;

    let mut preds: Vec<NamedNode> = rows
        .iter()
        .filter_map(|r| r.get("prev"))
        .filter_map(|iri| NamedNode::new(iri.clone()).ok())
        .collect();
    preds.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    preds.dedup();
    Ok(preds)
}

/// Does the node currently hold a token?
pub fn node_has_token(store: &GraphStore, node: &NamedNode) -> PhysicsResult<bool> {
    Ok(store.ask(&format!(
        "ASK {{ <{}> <{}> true }}",
        node.as_str(),
        has_token().as_str()
    ))?)
}

/// Every token-bearing node, sorted by IRI
pub fn token_nodes(store: &GraphStore) -> PhysicsResult<Vec<NamedNode>> {
    let rows = store.select(&format!(
        "SELECT DISTINCT ?n WHERE {{ ?n <{}> true }}",
        has_token().as_str()
    ))?;
    let mut nodes: Vec<NamedNode> = rows
        .iter()
        .filter_map(|r| r.get("n"))
        .filter_map(|iri| NamedNode::new(iri.clone()).ok())
        .collect();
    nodes.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    Ok(nodes)
}

/// Classify a token-bearing node into (pattern type, focus node)
///
/// Explicit `kgc:patternType` wins. Otherwise the structure decides:
/// a cancel request voids the node; a successor with in-degree >= 2 turns
/// the move into a synchronization focused on that successor; several
/// guarded successors are an exclusive choice; several unguarded ones a
/// parallel split; a single successor a sequence. A node with no outgoing
/// flows rests where it is.
pub fn classify(
    store: &GraphStore,
    node: &NamedNode,
) -> PhysicsResult<Option<(NamedNode, NamedNode)>> {
    // Explicit annotation
    let rows = store.select(&format!(
        "SELECT ?pt WHERE {{ <{}> <{}> ?pt }}",
        node.as_str(),
        pattern_type().as_str()
    ))?;
    if let Some(iri) = rows.first().and_then(|r| r.get("pt")) {
        if let Ok(pattern) = NamedNode::new(iri.clone()) {
            return Ok(Some((pattern, node.clone())));
        }
    }

    // Cancellation requests outrank routing
    if store.ask(&format!(
        "ASK {{ <{}> <{}> true }}",
        node.as_str(),
        kgc("cancelRequested").as_str()
    ))? {
        return Ok(Some((kgc("WCP19_CancelActivity"), node.clone())));
    }

    let flows = outgoing_flows(store, node)?;
    if flows.is_empty() {
        return Ok(None);
    }

    if flows.len() == 1 {
        let target = &flows[0].target;
        if predecessors(store, target)?.len() >= 2 {
            return Ok(Some((kgc("WCP3_Synchronization"), target.clone())));
        }
        return Ok(Some((kgc("WCP1_Sequence"), node.clone())));
    }

    if flows.iter().any(|f| f.guard.is_some()) {
        Ok(Some((kgc("WCP4_ExclusiveChoice"), node.clone())))
    } else {
        Ok(Some((kgc("WCP2_ParallelSplit"), node.clone())))
    }
}
