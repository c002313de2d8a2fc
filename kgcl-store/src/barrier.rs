//! Blood-Brain-Barrier ingress
//!
//! All external input enters the core as a `QuadDelta`. The barrier parses a
//! JSON or Turtle document into candidate additions/removals, enforces the
//! Chatman bound, and runs SHACL validation over the staged additions before
//! anything reaches the live store.

use crate::delta::{QuadDelta, CHATMAN_CONSTANT};
use crate::shacl::{CoreShaclValidator, ShaclShape, ShaclValidator};
use crate::store::GraphStore;
use crate::{StoreError, StoreResult};
use oxigraph::model::{GraphName, Literal, NamedNode, Quad, Subject, Term};
use serde_json::Value;

/// Ingress validator with a fixed shape set
pub struct Barrier {
    shapes: Vec<ShaclShape>,
    validator: Box<dyn ShaclValidator>,
}

impl Barrier {
    /// Barrier using the built-in validator
    pub fn new(shapes: Vec<ShaclShape>) -> Self {
        Self {
            shapes,
            validator: Box::new(CoreShaclValidator::new()),
        }
    }

    /// Barrier with an injected validator
    pub fn with_validator(shapes: Vec<ShaclShape>, validator: Box<dyn ShaclValidator>) -> Self {
        Self { shapes, validator }
    }

    /// Admit a Turtle fragment as pure additions
    pub fn admit_turtle(&self, turtle: &str) -> StoreResult<QuadDelta> {
        let staged = GraphStore::new()?;
        staged.load_turtle(turtle)?;

        let mut delta = QuadDelta::new();
        for quad in staged.quads()? {
            delta.add(quad);
        }
        self.check(delta)
    }

    /// Admit a JSON document of the form
    /// `{"additions": [[s, p, o], …], "removals": [[s, p, o], …]}`
    pub fn admit_json(&self, doc: &Value) -> StoreResult<QuadDelta> {
        let mut delta = QuadDelta::new();
        for quad in parse_triples(doc.get("additions"))? {
            delta.add(quad);
        }
        for quad in parse_triples(doc.get("removals"))? {
            delta.remove(quad);
        }
        self.check(delta)
    }

    fn check(&self, delta: QuadDelta) -> StoreResult<QuadDelta> {
        if delta.len() > CHATMAN_CONSTANT {
            return Err(StoreError::TopologyViolation {
                reason: format!(
                    "input carries {} operations, limit is {}",
                    delta.len(),
                    CHATMAN_CONSTANT
                ),
                constraints: Vec::new(),
            });
        }

        if !self.shapes.is_empty() {
            let mut staged = GraphStore::new()?;
            let mut additions = QuadDelta::new();
            for quad in delta.additions() {
                additions.add(quad.clone());
            }
            staged.apply_delta(&additions)?;

            let report = self.validator.validate(&staged, &self.shapes)?;
            if !report.conforms {
                let constraints = report
                    .violations
                    .iter()
                    .map(|v| v.constraint.clone())
                    .collect::<Vec<_>>();
                tracing::warn!(violations = constraints.len(), "barrier rejected input");
                return Err(StoreError::TopologyViolation {
                    reason: "SHACL validation failed".to_string(),
                    constraints,
                });
            }
        }

        Ok(delta)
    }
}

fn parse_triples(value: Option<&Value>) -> StoreResult<Vec<Quad>> {
    let Some(Value::Array(rows)) = value else {
        return Ok(Vec::new());
    };

    let mut quads = Vec::new();
    for row in rows {
        let Value::Array(parts) = row else {
            return Err(StoreError::Parse(
                "triple rows must be [subject, predicate, object] arrays".to_string(),
            ));
        };
        if parts.len() != 3 {
            return Err(StoreError::Parse(format!(
                "triple row has {} elements, expected 3",
                parts.len()
            )));
        }

        let subject = iri(&parts[0])?;
        let predicate = iri(&parts[1])?;
        let object = object_term(&parts[2])?;
        quads.push(Quad::new(
            Subject::NamedNode(subject),
            predicate,
            object,
            GraphName::DefaultGraph,
        ));
    }
    Ok(quads)
}

fn iri(value: &Value) -> StoreResult<NamedNode> {
    let Value::String(s) = value else {
        return Err(StoreError::Parse(format!("expected IRI string, got {}", value)));
    };
    NamedNode::new(s.clone()).map_err(|e| StoreError::Parse(format!("invalid IRI {}: {}", s, e)))
}

fn object_term(value: &Value) -> StoreResult<Term> {
    match value {
        Value::String(s) if looks_like_iri(s) => Ok(Term::NamedNode(
            NamedNode::new(s.clone())
                .map_err(|e| StoreError::Parse(format!("invalid IRI {}: {}", s, e)))?,
        )),
        Value::String(s) => Ok(Term::Literal(Literal::new_simple_literal(s.clone()))),
        Value::Bool(b) => Ok(Term::Literal(Literal::from(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Term::Literal(Literal::from(i)))
            } else {
                Ok(Term::Literal(Literal::from(n.as_f64().unwrap_or(0.0))))
            }
        }
        other => Err(StoreError::Parse(format!(
            "unsupported object value {}",
            other
        ))),
    }
}

fn looks_like_iri(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("urn:")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::shacl::parse_shapes;
    use serde_json::json;

    #[test]
    fn test_admit_turtle() {
        let barrier = Barrier::new(Vec::new());
        let delta = barrier
            .admit_turtle("@prefix ex: <http://example.org/> . ex:s ex:p \"o\" .")
            .unwrap();
        assert_eq!(delta.added_count(), 1);
        assert_eq!(delta.removed_count(), 0);
    }

    #[test]
    fn test_admit_json() {
        let barrier = Barrier::new(Vec::new());
        let delta = barrier
            .admit_json(&json!({
                "additions": [
                    ["http://example.org/a", "http://example.org/p", "hello"],
                    ["http://example.org/a", "http://example.org/q", "http://example.org/b"]
                ],
                "removals": [
                    ["http://example.org/b", "http://example.org/p", 42]
                ]
            }))
            .unwrap();
        assert_eq!(delta.added_count(), 2);
        assert_eq!(delta.removed_count(), 1);
    }

    #[test]
    fn test_oversized_input_rejected() {
        let barrier = Barrier::new(Vec::new());
        let rows: Vec<Value> = (0..=CHATMAN_CONSTANT)
            .map(|i| {
                json!([
                    format!("http://example.org/s{}", i),
                    "http://example.org/p",
                    i
                ])
            })
            .collect();

        let err = barrier
            .admit_json(&json!({ "additions": rows }))
            .unwrap_err();
        assert!(matches!(err, StoreError::TopologyViolation { .. }));
    }

    #[test]
    fn test_shacl_rejection_names_constraints() {
        let shapes = parse_shapes(
            r#"
            @prefix sh: <http://www.w3.org/ns/shacl#> .
            @prefix ex: <http://example.org/> .
            ex:PersonShape a sh:NodeShape ;
                sh:targetClass ex:Person ;
                sh:property [ sh:path ex:name ; sh:minCount 1 ] .
            "#,
        )
        .unwrap();
        let barrier = Barrier::new(shapes);

        let err = barrier
            .admit_turtle(
                "@prefix ex: <http://example.org/> . ex:Alice a ex:Person .",
            )
            .unwrap_err();
        match err {
            StoreError::TopologyViolation { constraints, .. } => {
                assert_eq!(constraints.len(), 1);
                assert!(constraints[0].contains("minCount"));
            }
            other => panic!("expected topology violation, got {:?}", other),
        }
    }
}
