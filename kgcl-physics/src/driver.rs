//! Semantic driver: ontology lookup, then dispatch
//!
//! The driver resolves `pattern type -> kernel verb` through the physics
//! ontology and invokes the verb on the focus node. Dispatch is a pure
//! function of `(ontology, pattern_type)`; there is no conditional on
//! pattern-type values anywhere in this module.

use crate::kernel::{Kernel, TransactionContext};
use crate::ontology::PhysicsOntology;
use crate::{PhysicsError, PhysicsResult};
use kgcl_store::{GraphStore, QuadDelta};
use oxigraph::model::NamedNode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Provenance entry recorded per dispatch, receipt-compatible
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchProvenance {
    pub pattern_type: String,
    pub verb_executed: String,
    pub focus: String,
    pub tick: u64,
}

/// Result of one dispatch
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub delta: QuadDelta,
    pub provenance: DispatchProvenance,
}

/// Ontology-driven dispatcher
pub struct SemanticDriver {
    ontology: Arc<PhysicsOntology>,
}

impl SemanticDriver {
    pub fn new(ontology: Arc<PhysicsOntology>) -> Self {
        Self { ontology }
    }

    pub fn ontology(&self) -> &PhysicsOntology {
        &self.ontology
    }

    /// Dispatch a focus node through its pattern type
    pub fn dispatch(
        &self,
        store: &GraphStore,
        pattern_type: &NamedNode,
        focus: &NamedNode,
        ctx: &TransactionContext,
    ) -> PhysicsResult<DispatchOutcome> {
        let verb = self
            .ontology
            .verb_for(pattern_type)?
            .ok_or_else(|| PhysicsError::UnmappedPattern(pattern_type.as_str().to_string()))?;

        let delta = Kernel::execute(verb, store, focus, ctx)?;

        tracing::debug!(
            pattern = pattern_type.as_str(),
            verb = verb.name(),
            focus = focus.as_str(),
            operations = delta.len(),
            "dispatched"
        );

        Ok(DispatchOutcome {
            delta,
            provenance: DispatchProvenance {
                pattern_type: pattern_type.as_str().to_string(),
                verb_executed: verb.name().to_string(),
                focus: focus.as_str().to_string(),
                tick: ctx.tick,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::vocab::kgc;

    const PREFIXES: &str = r#"
        @prefix kgc: <http://kgcl.io/ontology/kgc#> .
        @prefix yawl: <http://www.yawlfoundation.org/yawlschema#> .
        @prefix wf: <http://example.org/workflow#> .
    "#;

    fn wf(name: &str) -> NamedNode {
        NamedNode::new(format!("http://example.org/workflow#{}", name)).unwrap()
    }

    fn driver() -> SemanticDriver {
        SemanticDriver::new(Arc::new(PhysicsOntology::default_physics().unwrap()))
    }

    #[test]
    fn test_dispatch_sequence() {
        let store = GraphStore::new().unwrap();
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

        let outcome = driver()
            .dispatch(
                &store,
                &kgc("WCP1_Sequence"),
                &wf("TaskA"),
                &TransactionContext::new("", "test"),
            )
            .unwrap();

        assert_eq!(outcome.provenance.verb_executed, "transmute");
        assert_eq!(outcome.delta.len(), 2);
    }

    #[test]
    fn test_dispatch_unmapped_pattern() {
        let store = GraphStore::new().unwrap();
        let err = driver()
            .dispatch(
                &store,
                &kgc("NotAPattern"),
                &wf("TaskA"),
                &TransactionContext::new("", "test"),
            )
            .unwrap_err();
        assert!(matches!(err, PhysicsError::UnmappedPattern(_)));
    }

    #[test]
    fn test_dispatch_is_deterministic() {
        let store = GraphStore::new().unwrap();
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

        let driver = driver();
        let ctx = TransactionContext::new("", "test");
        let first = driver
            .dispatch(&store, &kgc("WCP1_Sequence"), &wf("TaskA"), &ctx)
            .unwrap();
        for _ in 0..5 {
            let again = driver
                .dispatch(&store, &kgc("WCP1_Sequence"), &wf("TaskA"), &ctx)
                .unwrap();
            assert_eq!(again.delta, first.delta);
            assert_eq!(again.provenance.verb_executed, first.provenance.verb_executed);
        }
    }
}
