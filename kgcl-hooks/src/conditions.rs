//! Condition variants
//!
//! A condition is a tagged sum; evaluation lives in the
//! [`crate::evaluator`]. `ConditionResult` is frozen once produced — a falsy
//! result short-circuits handler execution in the executor.

use kgcl_store::ShaclShape;
use serde::{Deserialize, Serialize};

/// Comparison operator for threshold and window conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl ThresholdOp {
    pub fn compare(&self, left: f64, right: f64) -> bool {
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

/// Aggregation applied over a window of samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

/// What kind of change a delta condition watches for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Any,
    Increase,
    Decrease,
}

/// Boolean combinator for composite conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeOp {
    And,
    Or,
    Not,
}

fn default_min_rows() -> usize {
    1
}

/// Condition over the graph and the evaluation context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Triggered when the ASK query holds
    SparqlAsk { query: String },
    /// Triggered when the SELECT returns at least `min_rows` rows
    SparqlSelect {
        query: String,
        #[serde(default = "default_min_rows")]
        min_rows: usize,
    },
    /// Triggered when the store conforms to the shapes
    Shacl { shapes: Vec<ShaclShape> },
    /// Compares the query's current scalar (row count) with its previous value
    Delta { query: String, kind: DeltaKind },
    /// Compares a context variable against a fixed value
    Threshold {
        variable: String,
        op: ThresholdOp,
        value: f64,
    },
    /// Aggregates samples inside a trailing window, then compares
    Window {
        variable: String,
        window_seconds: u64,
        aggregation: Aggregation,
        threshold: f64,
        op: ThresholdOp,
    },
    /// Boolean combination, short-circuiting depth-first
    Composite {
        op: CompositeOp,
        children: Vec<Condition>,
    },
}

impl Condition {
    /// Variant discriminant for cache keys
    pub fn discriminant(&self) -> &'static str {
        match self {
            Self::SparqlAsk { .. } => "sparql_ask",
            Self::SparqlSelect { .. } => "sparql_select",
            Self::Shacl { .. } => "shacl",
            Self::Delta { .. } => "delta",
            Self::Threshold { .. } => "threshold",
            Self::Window { .. } => "window",
            Self::Composite { .. } => "composite",
        }
    }

    /// Canonical parameter rendering for cache keys
    ///
    /// serde_json emits struct fields in declaration order, so this is
    /// deterministic for a given condition value.
    pub fn canonical_params(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Frozen outcome of a condition evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionResult {
    pub triggered: bool,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ConditionResult {
    pub fn triggered(metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            triggered: true,
            metadata,
        }
    }

    pub fn not_triggered(metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            triggered: false,
            metadata,
        }
    }

    pub fn bare(triggered: bool) -> Self {
        Self {
            triggered,
            metadata: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_threshold_ops() {
        assert!(ThresholdOp::Gt.compare(2.0, 1.0));
        assert!(ThresholdOp::Lt.compare(1.0, 2.0));
        assert!(ThresholdOp::Ge.compare(2.0, 2.0));
        assert!(ThresholdOp::Le.compare(2.0, 2.0));
        assert!(ThresholdOp::Eq.compare(2.0, 2.0));
        assert!(ThresholdOp::Ne.compare(2.0, 3.0));
    }

    #[test]
    fn test_condition_serde_round_trip() {
        let condition = Condition::Composite {
            op: CompositeOp::And,
            children: vec![
                Condition::Threshold {
                    variable: "error_rate".to_string(),
                    op: ThresholdOp::Gt,
                    value: 0.05,
                },
                Condition::Window {
                    variable: "requests".to_string(),
                    window_seconds: 60,
                    aggregation: Aggregation::Sum,
                    threshold: 100.0,
                    op: ThresholdOp::Gt,
                },
            ],
        };

        let json = serde_json::to_string(&condition).unwrap();
        let back: Condition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.canonical_params(), condition.canonical_params());
    }

    #[test]
    fn test_select_min_rows_default() {
        let condition: Condition = serde_json::from_str(
            r#"{"kind": "sparql_select", "query": "SELECT ?s WHERE { ?s ?p ?o }"}"#,
        )
        .unwrap();
        match condition {
            Condition::SparqlSelect { min_rows, .. } => assert_eq!(min_rows, 1),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_canonical_params_stable() {
        let c = Condition::SparqlAsk {
            query: "ASK { ?s ?p ?o }".to_string(),
        };
        assert_eq!(c.canonical_params(), c.canonical_params());
        assert_eq!(c.discriminant(), "sparql_ask");
    }
}
