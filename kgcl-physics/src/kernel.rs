//! The five-verb kernel
//!
//! Pure functions from `(graph, focus, context)` to a `QuadDelta`. The
//! kernel never decides *which* verb applies — that is the driver's ontology
//! lookup — it only carries out token moves. Unmet preconditions yield the
//! empty delta rather than an error, so a not-yet-enabled join is a no-op.

use crate::topology::{node_has_token, outgoing_flows, predecessors};
use crate::vocab::has_token;
use crate::{PhysicsError, PhysicsResult};
use kgcl_store::{GraphStore, QuadDelta};
use oxigraph::model::{GraphName, Literal, NamedNode, Quad};
use std::collections::BTreeMap;

/// The five kernel verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelVerb {
    Transmute,
    Copy,
    Filter,
    Await,
    Void,
}

impl KernelVerb {
    /// Resolve a verb from its ontology IRI
    pub fn from_iri(iri: &str) -> PhysicsResult<Self> {
        let local = iri.rsplit(['#', '/']).next().unwrap_or(iri);
        match local {
            "transmute" => Ok(Self::Transmute),
            "copy" => Ok(Self::Copy),
            "filter" => Ok(Self::Filter),
            "await" => Ok(Self::Await),
            "void" => Ok(Self::Void),
            _ => Err(PhysicsError::UnknownVerb(iri.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Transmute => "transmute",
            Self::Copy => "copy",
            Self::Filter => "filter",
            Self::Await => "await",
            Self::Void => "void",
        }
    }
}

impl std::fmt::Display for KernelVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Context threaded through a dispatch
#[derive(Debug, Clone, Default)]
pub struct TransactionContext {
    pub prev_hash: String,
    pub actor: String,
    pub tick: u64,
    /// Case variables consulted by filter guards
    pub variables: BTreeMap<String, f64>,
}

impl TransactionContext {
    pub fn new(prev_hash: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            prev_hash: prev_hash.into(),
            actor: actor.into(),
            tick: 0,
            variables: BTreeMap::new(),
        }
    }
}

fn token_quad(node: &NamedNode) -> Quad {
    Quad::new(
        node.clone(),
        has_token(),
        Literal::from(true),
        GraphName::DefaultGraph,
    )
}

/// The kernel itself: stateless, verbs as associated functions
pub struct Kernel;

impl Kernel {
    /// Execute a verb on a focus node
    ///
    /// Total match over the verb sum; adding a verb is a compile error until
    /// every call site handles it.
    pub fn execute(
        verb: KernelVerb,
        store: &GraphStore,
        focus: &NamedNode,
        ctx: &TransactionContext,
    ) -> PhysicsResult<QuadDelta> {
        let delta = match verb {
            KernelVerb::Transmute => Self::transmute(store, focus, ctx)?,
            KernelVerb::Copy => Self::copy(store, focus, ctx)?,
            KernelVerb::Filter => Self::filter(store, focus, ctx)?,
            KernelVerb::Await => Self::await_(store, focus, ctx)?,
            KernelVerb::Void => Self::void(store, focus, ctx)?,
        };
        delta.validate()?;
        Ok(delta)
    }

    /// Move the token along the (single) sequence edge
    pub fn transmute(
        store: &GraphStore,
        focus: &NamedNode,
        _ctx: &TransactionContext,
    ) -> PhysicsResult<QuadDelta> {
        let mut delta = QuadDelta::new();
        if !node_has_token(store, focus)? {
            return Ok(delta);
        }
        let flows = outgoing_flows(store, focus)?;
        let Some(first) = flows.first() else {
            return Ok(delta);
        };
        delta.remove(token_quad(focus));
        delta.add(token_quad(&first.target));
        Ok(delta)
    }

    /// Parallel split: one token onto every successor
    pub fn copy(
        store: &GraphStore,
        focus: &NamedNode,
        _ctx: &TransactionContext,
    ) -> PhysicsResult<QuadDelta> {
        let mut delta = QuadDelta::new();
        if !node_has_token(store, focus)? {
            return Ok(delta);
        }
        let flows = outgoing_flows(store, focus)?;
        if flows.is_empty() {
            return Ok(delta);
        }
        delta.remove(token_quad(focus));
        for flow in &flows {
            delta.add(token_quad(&flow.target));
        }
        Ok(delta)
    }

    /// Exclusive choice: route to exactly one successor whose guard holds
    ///
    /// Flows are evaluated in IRI order, so when several guards are true the
    /// lexicographically lowest flow wins.
    pub fn filter(
        store: &GraphStore,
        focus: &NamedNode,
        ctx: &TransactionContext,
    ) -> PhysicsResult<QuadDelta> {
        let mut delta = QuadDelta::new();
        if !node_has_token(store, focus)? {
            return Ok(delta);
        }
        let flows = outgoing_flows(store, focus)?;
        let chosen = flows
            .iter()
            .find(|f| guard_holds(f.guard.as_deref(), &ctx.variables));
        let Some(flow) = chosen else {
            return Ok(delta);
        };
        delta.remove(token_quad(focus));
        delta.add(token_quad(&flow.target));
        Ok(delta)
    }

    /// AND-join: fires only when every predecessor of the focus has a token
    pub fn await_(
        store: &GraphStore,
        focus: &NamedNode,
        _ctx: &TransactionContext,
    ) -> PhysicsResult<QuadDelta> {
        let mut delta = QuadDelta::new();
        let preds = predecessors(store, focus)?;
        if preds.is_empty() {
            return Ok(delta);
        }
        for pred in &preds {
            if !node_has_token(store, pred)? {
                // Not all inputs ready: the join is a no-op this tick
                return Ok(QuadDelta::new());
            }
        }
        for pred in &preds {
            delta.remove(token_quad(pred));
        }
        delta.add(token_quad(focus));
        Ok(delta)
    }

    /// Terminate the token (timeout / cancel)
    pub fn void(
        store: &GraphStore,
        focus: &NamedNode,
        _ctx: &TransactionContext,
    ) -> PhysicsResult<QuadDelta> {
        let mut delta = QuadDelta::new();
        if node_has_token(store, focus)? {
            delta.remove(token_quad(focus));
        }
        Ok(delta)
    }
}

/// Guard grammar: `variable op number` with op in {>, <, >=, <=, ==, !=}
///
/// Absent guards hold. An expression the grammar cannot parse is logged and
/// treated as holding — warn-and-pass, never a silent pretend-evaluation.
pub fn guard_holds(guard: Option<&str>, variables: &BTreeMap<String, f64>) -> bool {
    let Some(expr) = guard else {
        return true;
    };
    match parse_guard(expr) {
        Some((var, op, value)) => {
            let Some(actual) = variables.get(&var) else {
                tracing::warn!(guard = expr, variable = %var, "guard variable unbound; treating as false");
                return false;
            };
            op.compare(*actual, value)
        }
        None => {
            tracing::warn!(guard = expr, "guard expression not in `var op number` grammar; passing");
            true
        }
    }
}

/// Comparison operators accepted by the guard grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl GuardOp {
    fn compare(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Gt => left > right,
            Self::Lt => left < right,
            Self::Ge => left >= right,
            Self::Le => left <= right,
            Self::Eq => (left - right).abs() < f64::EPSILON,
            Self::Ne => (left - right).abs() >= f64::EPSILON,
        }
    }
}

fn parse_guard(expr: &str) -> Option<(String, GuardOp, f64)> {
    let tokens: Vec<&str> = expr.split_whitespace().collect();
    if tokens.len() != 3 {
        return None;
    }
    let op = match tokens[1] {
        ">" => GuardOp::Gt,
        "<" => GuardOp::Lt,
        ">=" => GuardOp::Ge,
        "<=" => GuardOp::Le,
        "==" | "=" => GuardOp::Eq,
        "!=" => GuardOp::Ne,
        _ => return None,
    };
    let value: f64 = tokens[2].parse().ok()?;
    Some((tokens[0].to_string(), op, value))
}
