//! In-memory graph store backed by oxigraph

use crate::delta::QuadDelta;
use crate::{StoreError, StoreResult};
use oxigraph::io::RdfFormat;
use oxigraph::model::{GraphName, Quad};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use std::collections::BTreeMap;

/// Graph store wrapper
///
/// The store is the only mutable shared resource inside a tick; every
/// observable change goes through [`GraphStore::apply_delta`], which records
/// the applied delta in a journal so an aborted tick can be rolled back.
pub struct GraphStore {
    store: Store,
    journal: Vec<QuadDelta>,
}

impl GraphStore {
    /// Create an empty store
    pub fn new() -> StoreResult<Self> {
        let store = Store::new().map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self {
            store,
            journal: Vec::new(),
        })
    }

    /// Load Turtle data into the default graph
    pub fn load_turtle(&self, turtle: &str) -> StoreResult<()> {
        self.store
            .load_from_reader(RdfFormat::Turtle, turtle.as_bytes())
            .map_err(|e| StoreError::Parse(format!("Failed to parse Turtle: {}", e)))
    }

    /// Insert a single quad
    pub fn insert(&self, quad: &Quad) -> StoreResult<bool> {
        self.store
            .insert(quad)
            .map_err(|e| StoreError::Storage(e.to_string()))
    }

    /// Remove a single quad
    pub fn remove(&self, quad: &Quad) -> StoreResult<bool> {
        self.store
            .remove(quad)
            .map_err(|e| StoreError::Storage(e.to_string()))
    }

    /// Check quad membership
    pub fn contains(&self, quad: &Quad) -> StoreResult<bool> {
        self.store
            .contains(quad)
            .map_err(|e| StoreError::Storage(e.to_string()))
    }

    /// Number of quads in the store
    pub fn len(&self) -> StoreResult<usize> {
        self.store
            .len()
            .map_err(|e| StoreError::Storage(e.to_string()))
    }

    /// True when the store holds no quads
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Snapshot of every quad, unordered
    pub fn quads(&self) -> StoreResult<Vec<Quad>> {
        self.store
            .iter()
            .map(|r| r.map_err(|e| StoreError::Storage(e.to_string())))
            .collect()
    }

    /// Execute a SPARQL ASK query
    pub fn ask(&self, query: &str) -> StoreResult<bool> {
        let results = self
            .store
            .query(query)
            .map_err(|e| StoreError::Query(format!("SPARQL query failed: {}", e)))?;
        match results {
            QueryResults::Boolean(b) => Ok(b),
            _ => Err(StoreError::Query("Expected ASK query results".to_string())),
        }
    }

    /// Execute a SPARQL SELECT query, returning variable → term bindings
    ///
    /// Literal terms are reduced to their lexical form so callers can read
    /// scalar values without N-Triples unescaping.
    pub fn select(&self, query: &str) -> StoreResult<Vec<BTreeMap<String, String>>> {
        let results = self
            .store
            .query(query)
            .map_err(|e| StoreError::Query(format!("SPARQL query failed: {}", e)))?;
        match results {
            QueryResults::Solutions(solutions) => {
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution =
                        solution.map_err(|e| StoreError::Query(format!("Solution error: {}", e)))?;
                    let mut row = BTreeMap::new();
                    for (var, term) in &solution {
                        row.insert(var.as_str().to_string(), term_value(term));
                    }
                    rows.push(row);
                }
                Ok(rows)
            }
            _ => Err(StoreError::Query(
                "Expected SELECT query results".to_string(),
            )),
        }
    }

    /// Apply a validated delta: removals first, then additions
    ///
    /// The delta is journalled so [`GraphStore::rollback_to`] can undo it.
    pub fn apply_delta(&mut self, delta: &QuadDelta) -> StoreResult<()> {
        delta.validate()?;
        for quad in delta.removals() {
            self.remove(quad)?;
        }
        for quad in delta.additions() {
            self.insert(quad)?;
        }
        self.journal.push(delta.clone());
        Ok(())
    }

    /// Current journal position, used as a rollback target
    pub fn checkpoint(&self) -> usize {
        self.journal.len()
    }

    /// (additions, removals) applied since a checkpoint
    pub fn journal_totals(&self, checkpoint: usize) -> (u32, u32) {
        self.journal[checkpoint.min(self.journal.len())..]
            .iter()
            .fold((0, 0), |(added, removed), delta| {
                (added + delta.added_count(), removed + delta.removed_count())
            })
    }

    /// Undo every delta applied since `checkpoint`, newest first
    pub fn rollback_to(&mut self, checkpoint: usize) -> StoreResult<()> {
        if checkpoint > self.journal.len() {
            return Err(StoreError::InvalidCheckpoint(checkpoint));
        }
        while self.journal.len() > checkpoint {
            // Invert: additions come out, removals go back in
            if let Some(delta) = self.journal.pop() {
                for quad in delta.additions() {
                    self.remove(quad)?;
                }
                for quad in delta.removals() {
                    self.insert(quad)?;
                }
            }
        }
        Ok(())
    }

    /// Drop all quads and the journal
    pub fn clear(&mut self) -> StoreResult<()> {
        self.store
            .clear()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        self.journal.clear();
        Ok(())
    }
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("journal_depth", &self.journal.len())
            .finish()
    }
}

/// Render a term for binding rows: literals by lexical form, IRIs bare
pub fn term_value(term: &oxigraph::model::Term) -> String {
    match term {
        oxigraph::model::Term::Literal(lit) => lit.value().to_string(),
        oxigraph::model::Term::NamedNode(n) => n.as_str().to_string(),
        oxigraph::model::Term::BlankNode(b) => format!("_:{}", b.as_str()),
        other => other.to_string(),
    }
}

/// Format one quad as an N-Quads line (default graph omits the graph term)
pub fn nquads_line(quad: &Quad) -> String {
    match &quad.graph_name {
        GraphName::DefaultGraph => {
            format!("{} {} {} .", quad.subject, quad.predicate, quad.object)
        }
        g => format!("{} {} {} {} .", quad.subject, quad.predicate, quad.object, g),
    }
}
