//! Physics ontology registry
//!
//! Holds the `kgc_physics.ttl` document mapping pattern types to kernel
//! verbs. Loaded exactly once per orchestrator lifetime and immutable after
//! load; every lookup is a SPARQL query against this graph.

use crate::kernel::KernelVerb;
use crate::vocab::{dispatch_priority, maps_to_verb};
use crate::{PhysicsError, PhysicsResult};
use kgcl_net::PatternRegistry;
use kgcl_store::GraphStore;
use oxigraph::model::NamedNode;
use std::path::Path;

/// Default physics document shipped with the crate
const DEFAULT_PHYSICS_TTL: &str = include_str!("../assets/kgc_physics.ttl");

/// Immutable pattern-type → verb registry
pub struct PhysicsOntology {
    graph: GraphStore,
}

impl PhysicsOntology {
    /// Load the ontology from a Turtle string
    pub fn load_turtle(turtle: &str) -> PhysicsResult<Self> {
        let graph = GraphStore::new()?;
        graph.load_turtle(turtle)?;
        let ontology = Self { graph };
        if ontology.pattern_types()?.is_empty() {
            return Err(PhysicsError::OntologyNotLoaded(
                "document declares no kgc:mapsToVerb triples".to_string(),
            ));
        }
        Ok(ontology)
    }

    /// Load the ontology from a `.ttl` file
    pub fn load_file(path: impl AsRef<Path>) -> PhysicsResult<Self> {
        let turtle = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PhysicsError::OntologyNotLoaded(format!(
                "cannot read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::load_turtle(&turtle)
    }

    /// The embedded default physics document
    pub fn default_physics() -> PhysicsResult<Self> {
        Self::load_turtle(DEFAULT_PHYSICS_TTL)
    }

    /// Resolve the kernel verb for a pattern type
    ///
    /// Pure function of (ontology, pattern_type): the same inputs always
    /// resolve to the same verb.
    pub fn verb_for(&self, pattern: &NamedNode) -> PhysicsResult<Option<KernelVerb>> {
        let rows = self.graph.select(&format!(
            "SELECT ?verb WHERE {{ <{}> <{}> ?verb }}",
            pattern.as_str(),
            maps_to_verb().as_str()
        ))?;
        match rows.first().and_then(|r| r.get("verb")) {
            Some(iri) => Ok(Some(KernelVerb::from_iri(iri)?)),
            None => Ok(None),
        }
    }

    /// Dispatch priority for a pattern type (default 0)
    pub fn priority_for(&self, pattern: &NamedNode) -> PhysicsResult<i64> {
        let rows = self.graph.select(&format!(
            "SELECT ?p WHERE {{ <{}> <{}> ?p }}",
            pattern.as_str(),
            dispatch_priority().as_str()
        ))?;
        Ok(rows
            .first()
            .and_then(|r| r.get("p"))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    /// Every declared pattern type, ordered by (priority desc, IRI)
    pub fn pattern_types(&self) -> PhysicsResult<Vec<NamedNode>> {
        let rows = self.graph.select(&format!(
            "SELECT DISTINCT ?pt WHERE {{ ?pt <{}> ?verb }}",
            maps_to_verb().as_str()
        ))?;

        let mut patterns = Vec::new();
        for row in rows {
            if let Some(iri) = row.get("pt") {
                let node = NamedNode::new(iri.clone()).map_err(|e| {
                    PhysicsError::OntologyNotLoaded(format!("invalid pattern IRI {}: {}", iri, e))
                })?;
                patterns.push(node);
            }
        }

        let mut keyed = Vec::with_capacity(patterns.len());
        for node in patterns {
            let priority = self.priority_for(&node)?;
            keyed.push((priority, node));
        }
        keyed.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.as_str().cmp(b.1.as_str())));
        Ok(keyed.into_iter().map(|(_, n)| n).collect())
    }

    /// Cross-check declared verbs against the WCP descriptor table
    ///
    /// Pattern IRIs of the form `…WCP<N>_…` whose declared verb disagrees
    /// with the registry descriptor are logged; the ontology still wins.
    pub fn check_against_registry(&self, registry: &PatternRegistry) -> PhysicsResult<()> {
        for pattern in self.pattern_types()? {
            let Some(number) = wcp_number(pattern.as_str()) else {
                continue;
            };
            let Ok(id) = kgcl_net::PatternId::new(number) else {
                continue;
            };
            if let (Ok(descriptor), Some(verb)) = (registry.get(id), self.verb_for(&pattern)?) {
                if descriptor.verb != verb.name() {
                    tracing::warn!(
                        pattern = pattern.as_str(),
                        declared = verb.name(),
                        descriptor = descriptor.verb,
                        "physics ontology disagrees with pattern descriptor"
                    );
                }
            }
        }
        Ok(())
    }
}

fn wcp_number(iri: &str) -> Option<u32> {
    let idx = iri.find("WCP")?;
    let digits: String = iri[idx + 3..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

impl std::fmt::Debug for PhysicsOntology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsOntology").finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::vocab::kgc;

    #[test]
    fn test_default_physics_loads() {
        let ontology = PhysicsOntology::default_physics().unwrap();
        let patterns = ontology.pattern_types().unwrap();
        assert!(patterns.len() >= 8);
    }

    #[test]
    fn test_verb_lookup() {
        let ontology = PhysicsOntology::default_physics().unwrap();
        assert_eq!(
            ontology.verb_for(&kgc("WCP1_Sequence")).unwrap(),
            Some(KernelVerb::Transmute)
        );
        assert_eq!(
            ontology.verb_for(&kgc("WCP2_ParallelSplit")).unwrap(),
            Some(KernelVerb::Copy)
        );
        assert_eq!(
            ontology.verb_for(&kgc("WCP3_Synchronization")).unwrap(),
            Some(KernelVerb::Await)
        );
        assert_eq!(
            ontology.verb_for(&kgc("WCP4_ExclusiveChoice")).unwrap(),
            Some(KernelVerb::Filter)
        );
        assert_eq!(
            ontology.verb_for(&kgc("WCP19_CancelActivity")).unwrap(),
            Some(KernelVerb::Void)
        );
    }

    #[test]
    fn test_unmapped_pattern_is_none() {
        let ontology = PhysicsOntology::default_physics().unwrap();
        assert_eq!(ontology.verb_for(&kgc("NotAPattern")).unwrap(), None);
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let ontology = PhysicsOntology::default_physics().unwrap();
        let pattern = kgc("WCP1_Sequence");
        let first = ontology.verb_for(&pattern).unwrap();
        for _ in 0..10 {
            assert_eq!(ontology.verb_for(&pattern).unwrap(), first);
        }
    }

    #[test]
    fn test_priority_ordering() {
        let ontology = PhysicsOntology::default_physics().unwrap();
        let patterns = ontology.pattern_types().unwrap();
        let priorities: Vec<i64> = patterns
            .iter()
            .map(|p| ontology.priority_for(p).unwrap())
            .collect();
        let mut sorted = priorities.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn test_empty_document_rejected() {
        assert!(PhysicsOntology::load_turtle("").is_err());
    }

    #[test]
    fn test_registry_check_passes_for_default() {
        let ontology = PhysicsOntology::default_physics().unwrap();
        ontology
            .check_against_registry(&PatternRegistry::new())
            .unwrap();
    }
}
