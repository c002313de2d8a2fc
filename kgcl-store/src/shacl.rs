//! SHACL validation seam
//!
//! The core consumes a validator interface; this module supplies the shape
//! model, a Turtle shape parser over the `http://www.w3.org/ns/shacl#`
//! vocabulary, and an in-memory validator covering the constraint types the
//! barrier and hook conditions rely on: minCount, maxCount, and datatype on
//! class-targeted property shapes.

use crate::store::GraphStore;
use crate::StoreResult;
use serde::{Deserialize, Serialize};

const SH: &str = "http://www.w3.org/ns/shacl#";

/// One property constraint within a shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyConstraint {
    /// Predicate IRI the constraint applies to
    pub path: String,
    pub min_count: Option<u32>,
    pub max_count: Option<u32>,
    /// Expected literal datatype IRI
    pub datatype: Option<String>,
}

/// Node shape targeting a class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaclShape {
    /// Shape IRI
    pub id: String,
    /// RDF class this shape targets
    pub target_class: String,
    pub properties: Vec<PropertyConstraint>,
}

/// A single constraint failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Node that failed validation
    pub focus: String,
    /// Constraint identifier: `<shape>/<path>/<kind>`
    pub constraint: String,
    pub message: String,
}

/// Outcome of validating a store against a shape set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub conforms: bool,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Report with no violations
    pub fn conforming() -> Self {
        Self {
            conforms: true,
            violations: Vec::new(),
        }
    }
}

/// Injected validator interface (spec'd externally; internals are ours)
pub trait ShaclValidator: Send + Sync {
    fn validate(&self, store: &GraphStore, shapes: &[ShaclShape]) -> StoreResult<ValidationReport>;
}

/// In-memory validator for the core constraint types
#[derive(Debug, Default)]
pub struct CoreShaclValidator;

impl CoreShaclValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_focus(
        &self,
        store: &GraphStore,
        shape: &ShaclShape,
        focus: &str,
        violations: &mut Vec<Violation>,
    ) -> StoreResult<()> {
        for prop in &shape.properties {
            let rows = store.select(&format!(
                "SELECT ?v WHERE {{ <{}> <{}> ?v }}",
                focus, prop.path
            ))?;
            let count = rows.len() as u32;

            if let Some(min) = prop.min_count {
                if count < min {
                    violations.push(Violation {
                        focus: focus.to_string(),
                        constraint: format!("{}/{}/minCount", shape.id, prop.path),
                        message: format!(
                            "expected at least {} value(s) for <{}>, found {}",
                            min, prop.path, count
                        ),
                    });
                }
            }
            if let Some(max) = prop.max_count {
                if count > max {
                    violations.push(Violation {
                        focus: focus.to_string(),
                        constraint: format!("{}/{}/maxCount", shape.id, prop.path),
                        message: format!(
                            "expected at most {} value(s) for <{}>, found {}",
                            max, prop.path, count
                        ),
                    });
                }
            }
            if let Some(dt) = &prop.datatype {
                let bad = store.select(&format!(
                    "SELECT ?v WHERE {{ <{}> <{}> ?v . FILTER(!isLiteral(?v) || datatype(?v) != <{}>) }}",
                    focus, prop.path, dt
                ))?;
                if !bad.is_empty() {
                    violations.push(Violation {
                        focus: focus.to_string(),
                        constraint: format!("{}/{}/datatype", shape.id, prop.path),
                        message: format!("value(s) for <{}> are not of datatype <{}>", prop.path, dt),
                    });
                }
            }
        }
        Ok(())
    }
}

impl ShaclValidator for CoreShaclValidator {
    fn validate(&self, store: &GraphStore, shapes: &[ShaclShape]) -> StoreResult<ValidationReport> {
        let mut violations = Vec::new();

        for shape in shapes {
            let focuses = store.select(&format!(
                "SELECT ?f WHERE {{ ?f <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <{}> }}",
                shape.target_class
            ))?;
            for row in &focuses {
                if let Some(focus) = row.get("f") {
                    self.check_focus(store, shape, focus, &mut violations)?;
                }
            }
        }

        Ok(ValidationReport {
            conforms: violations.is_empty(),
            violations,
        })
    }
}

/// Parse node shapes from a Turtle document using the SHACL vocabulary
pub fn parse_shapes(turtle: &str) -> StoreResult<Vec<ShaclShape>> {
    let store = GraphStore::new()?;
    store.load_turtle(turtle)?;

    let shape_rows = store.select(&format!(
        "SELECT ?shape ?target WHERE {{ ?shape <{sh}targetClass> ?target }}",
        sh = SH
    ))?;

    let mut shapes = Vec::new();
    for row in shape_rows {
        let (Some(id), Some(target)) = (row.get("shape"), row.get("target")) else {
            continue;
        };

        let prop_rows = store.select(&format!(
            "SELECT ?path ?min ?max ?dt WHERE {{
                <{id}> <{sh}property> ?p .
                ?p <{sh}path> ?path .
                OPTIONAL {{ ?p <{sh}minCount> ?min }}
                OPTIONAL {{ ?p <{sh}maxCount> ?max }}
                OPTIONAL {{ ?p <{sh}datatype> ?dt }}
            }}",
            id = id,
            sh = SH
        ))?;

        let properties = prop_rows
            .iter()
            .filter_map(|p| {
                Some(PropertyConstraint {
                    path: p.get("path")?.clone(),
                    min_count: p.get("min").and_then(|v| v.parse().ok()),
                    max_count: p.get("max").and_then(|v| v.parse().ok()),
                    datatype: p.get("dt").cloned(),
                })
            })
            .collect();

        shapes.push(ShaclShape {
            id: id.clone(),
            target_class: target.clone(),
            properties,
        });
    }

    Ok(shapes)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    const PERSON_SHAPE: &str = r#"
        @prefix sh: <http://www.w3.org/ns/shacl#> .
        @prefix ex: <http://example.org/> .

        ex:PersonShape a sh:NodeShape ;
            sh:targetClass ex:Person ;
            sh:property [
                sh:path ex:name ;
                sh:minCount 1 ;
            ] .
    "#;

    #[test]
    fn test_parse_shapes() {
        let shapes = parse_shapes(PERSON_SHAPE).unwrap();
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].target_class, "http://example.org/Person");
        assert_eq!(shapes[0].properties.len(), 1);
        assert_eq!(shapes[0].properties[0].min_count, Some(1));
    }

    #[test]
    fn test_validate_conforming_data() {
        let shapes = parse_shapes(PERSON_SHAPE).unwrap();
        let store = GraphStore::new().unwrap();
        store
            .load_turtle(
                r#"
                @prefix ex: <http://example.org/> .
                ex:Alice a ex:Person ;
                    ex:name "Alice" .
                "#,
            )
            .unwrap();

        let report = CoreShaclValidator::new().validate(&store, &shapes).unwrap();
        assert!(report.conforms);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn test_validate_min_count_violation() {
        let shapes = parse_shapes(PERSON_SHAPE).unwrap();
        let store = GraphStore::new().unwrap();
        // Person with no name
        store
            .load_turtle(
                r#"
                @prefix ex: <http://example.org/> .
                ex:Alice a ex:Person .
                "#,
            )
            .unwrap();

        let report = CoreShaclValidator::new().validate(&store, &shapes).unwrap();
        assert!(!report.conforms);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].focus, "http://example.org/Alice");
        assert!(report.violations[0].constraint.ends_with("minCount"));
    }

    #[test]
    fn test_validate_ignores_untargeted_nodes() {
        let shapes = parse_shapes(PERSON_SHAPE).unwrap();
        let store = GraphStore::new().unwrap();
        store
            .load_turtle(
                r#"
                @prefix ex: <http://example.org/> .
                ex:Rover a ex:Dog .
                "#,
            )
            .unwrap();

        let report = CoreShaclValidator::new().validate(&store, &shapes).unwrap();
        assert!(report.conforms);
    }
}
