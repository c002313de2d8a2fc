//! Orchestrator
//!
//! Owns the graph store, tick controller, lockchain, and temporal store for
//! one workflow. External input enters through the barrier and is applied
//! inside the next tick; external events are queued and honored between
//! ticks. Lockchain and temporal failures are fatal — they compromise the
//! audit trail.

use crate::controller::{TickController, TickResult};
use crate::rules::{rules_from_ontology, DeltaQueue, EventQueue, SharedVariables};
use crate::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use kgcl_hooks::{EvaluationContext, Hook, Sample};
use kgcl_lockchain::{LockchainWriter, TickReceipt};
use kgcl_physics::statebased::ExternalEvent;
use kgcl_physics::vocab::{flows_into, has_token, next_element_ref};
use kgcl_physics::{PhysicsOntology, SemanticDriver};
use kgcl_store::{Barrier, GraphStore, ShaclShape};
use kgcl_temporal::{CompactionPolicy, EventId, TieredEventStore, VectorClock, WorkflowEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

/// Token presence at a task, as reported by `inspect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenState {
    Empty,
    HasToken,
}

impl std::fmt::Display for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenState::Empty => f.write_str("Empty"),
            TokenState::HasToken => f.write_str("HasToken"),
        }
    }
}

/// Owns one workflow's `(store, controller, lockchain, temporal)` quartet
pub struct Orchestrator {
    store: GraphStore,
    controller: TickController,
    driver: Arc<SemanticDriver>,
    lockchain: Option<LockchainWriter>,
    temporal: Option<TieredEventStore>,
    barrier: Barrier,
    variables: SharedVariables,
    events: EventQueue,
    deltas: DeltaQueue,
    samples: BTreeMap<String, Vec<Sample>>,
    previous: BTreeMap<String, f64>,
    receipts: Vec<TickReceipt>,
    workflow_id: String,
    actor: String,
    clock: VectorClock,
    last_tick_event: Option<EventId>,
}

impl Orchestrator {
    /// Build an orchestrator around a loaded physics ontology
    pub fn new(ontology: PhysicsOntology) -> EngineResult<Self> {
        let driver = Arc::new(SemanticDriver::new(Arc::new(ontology)));
        let variables: SharedVariables = Arc::new(parking_lot::RwLock::new(BTreeMap::new()));
        let events: EventQueue = Arc::new(parking_lot::Mutex::new(VecDeque::new()));
        let deltas: DeltaQueue = Arc::new(parking_lot::Mutex::new(VecDeque::new()));

        let mut controller = TickController::new();
        for rule in rules_from_ontology(&driver, &variables, &events, &deltas, "kgcl-engine")? {
            controller.register_rule(rule);
        }

        Ok(Self {
            store: GraphStore::new()?,
            controller,
            driver,
            lockchain: None,
            temporal: None,
            barrier: Barrier::new(Vec::new()),
            variables,
            events,
            deltas,
            samples: BTreeMap::new(),
            previous: BTreeMap::new(),
            receipts: Vec::new(),
            workflow_id: "default".to_string(),
            actor: "kgcl-engine".to_string(),
            clock: VectorClock::new(),
            last_tick_event: None,
        })
    }

    /// Orchestrator over the embedded default physics
    pub fn with_default_physics() -> EngineResult<Self> {
        Self::new(PhysicsOntology::default_physics()?)
    }

    pub fn set_workflow_id(&mut self, id: impl Into<String>) {
        self.workflow_id = id.into();
    }

    /// Back the audit trail with a git repository
    pub fn attach_lockchain(&mut self, repo_root: impl AsRef<Path>) -> EngineResult<()> {
        self.lockchain = Some(LockchainWriter::open(repo_root)?);
        Ok(())
    }

    /// Back the event log with a tiered store
    pub fn attach_temporal(
        &mut self,
        path: impl AsRef<Path>,
        policy: CompactionPolicy,
    ) -> EngineResult<()> {
        self.temporal = Some(TieredEventStore::open(path, policy)?);
        Ok(())
    }

    /// Fix the shapes the barrier validates external input against
    pub fn set_barrier_shapes(&mut self, shapes: Vec<ShaclShape>) {
        self.barrier = Barrier::new(shapes);
    }

    /// Load a workflow topology into the graph
    pub fn load_topology(&self, turtle: &str) -> EngineResult<()> {
        self.store.load_turtle(turtle)?;
        Ok(())
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn controller_mut(&mut self) -> &mut TickController {
        &mut self.controller
    }

    pub fn tick_count(&self) -> u64 {
        self.controller.tick_count()
    }

    /// Receipts emitted so far, in tick order
    pub fn receipts(&self) -> &[TickReceipt] {
        &self.receipts
    }

    /// Set a case variable (filter guards, threshold conditions)
    pub fn set_variable(&self, name: impl Into<String>, value: f64) {
        self.variables.write().insert(name.into(), value);
    }

    /// Record a sample for window conditions
    pub fn record_sample(&mut self, name: impl Into<String>, timestamp: DateTime<Utc>, value: f64) {
        self.samples
            .entry(name.into())
            .or_default()
            .push(Sample { timestamp, value });
    }

    /// Remember a scalar for delta conditions
    pub fn record_previous(&mut self, query: impl Into<String>, value: f64) {
        self.previous.insert(query.into(), value);
    }

    /// Register a knowledge hook
    pub fn register_hook(&mut self, hook: Hook) -> EngineResult<()> {
        self.controller.hook_registry_mut().register(hook)?;
        Ok(())
    }

    /// Queue an external event; honored inside the next tick
    pub fn submit_event(&self, event: ExternalEvent) {
        self.events.lock().push_back(event);
    }

    /// Admit a Turtle fragment through the barrier
    pub fn admit_turtle(&self, turtle: &str) -> EngineResult<()> {
        let delta = self.barrier.admit_turtle(turtle)?;
        self.deltas.lock().push_back(delta);
        Ok(())
    }

    /// Admit a JSON delta document through the barrier
    pub fn admit_json(&self, doc: &serde_json::Value) -> EngineResult<()> {
        let delta = self.barrier.admit_json(doc)?;
        self.deltas.lock().push_back(delta);
        Ok(())
    }

    fn evaluation_context(&self) -> EvaluationContext {
        EvaluationContext {
            variables: self.variables.read().clone(),
            previous: self.previous.clone(),
            samples: self.samples.clone(),
            now: Utc::now(),
        }
    }

    /// Execute one tick and append to the audit trail
    pub async fn tick(&mut self) -> EngineResult<TickResult> {
        let ctx = self.evaluation_context();
        let (result, receipt) = self.controller.execute_tick(&mut self.store, &ctx).await?;

        if let Some(lockchain) = &mut self.lockchain {
            lockchain.append(&receipt)?;
        }
        if let Some(temporal) = &mut self.temporal {
            self.clock.increment(&self.actor);
            let mut event = WorkflowEvent::new(
                "tick.completed",
                &self.workflow_id,
                receipt.tick,
                json!({
                    "rules_fired": receipt.rules_fired,
                    "triples_added": receipt.triples_added,
                    "triples_removed": receipt.triples_removed,
                    "converged": receipt.converged,
                    "state_hash_after": receipt.state_hash_after,
                }),
            )
            .with_clock(self.clock.clone());
            if let Some(previous) = self.last_tick_event {
                event = event.caused_by(vec![previous]);
            }
            let stored = temporal.append(event)?;
            self.last_tick_event = Some(stored.event_id);
        }

        self.receipts.push(receipt);
        Ok(result)
    }

    /// Tick until convergence or the budget runs out
    pub async fn run_to_completion(&mut self, max_ticks: u64) -> EngineResult<Vec<TickReceipt>> {
        let first = self.receipts.len();
        loop {
            let result = self.tick().await?;
            if result.converged {
                return Ok(self.receipts[first..].to_vec());
            }
            if self.controller.tick_count() >= max_ticks {
                return Err(EngineError::NonConvergence { ticks: max_ticks });
            }
        }
    }

    /// Token placement for every task node in the topology
    pub fn inspect(&self) -> EngineResult<BTreeMap<String, TokenState>> {
        let fi = flows_into();
        let ne = next_element_ref();
        let ht = has_token();

        let mut tasks: BTreeSet<String> = BTreeSet::new();
        let mut flow_nodes: BTreeSet<String> = BTreeSet::new();

        for row in self.store.select(&format!(
            "SELECT ?s ?f WHERE {{ ?s <{}> ?f }}",
            fi.as_str()
        ))? {
            if let Some(s) = row.get("s") {
                tasks.insert(s.clone());
            }
            if let Some(f) = row.get("f") {
                flow_nodes.insert(f.clone());
            }
        }
        for row in self.store.select(&format!(
            "SELECT ?s ?o WHERE {{ ?s <{}> ?o }}",
            ne.as_str()
        ))? {
            if let Some(s) = row.get("s") {
                tasks.insert(s.clone());
            }
            if let Some(o) = row.get("o") {
                tasks.insert(o.clone());
            }
        }
        for row in self.store.select(&format!(
            "SELECT ?n WHERE {{ ?n <{}> true }}",
            ht.as_str()
        ))? {
            if let Some(n) = row.get("n") {
                tasks.insert(n.clone());
            }
        }

        let mut placement = BTreeMap::new();
        for task in tasks.difference(&flow_nodes) {
            let state = if self
                .store
                .ask(&format!("ASK {{ <{}> <{}> true }}", task, ht.as_str()))?
            {
                TokenState::HasToken
            } else {
                TokenState::Empty
            };
            placement.insert(task.clone(), state);
        }
        Ok(placement)
    }

    /// Verify the lockchain; `None` means intact
    pub fn verify_chain(&self) -> EngineResult<Option<u64>> {
        match &self.lockchain {
            Some(lockchain) => Ok(lockchain.verify_chain()?),
            None => Ok(None),
        }
    }

    /// The driver, for provenance inspection
    pub fn driver(&self) -> &SemanticDriver {
        &self.driver
    }

    /// The attached temporal store, if any
    pub fn temporal(&self) -> Option<&TieredEventStore> {
        self.temporal.as_ref()
    }

    /// Latest receipt, surfaced on failure paths
    pub fn latest_receipt(&self) -> Option<&TickReceipt> {
        self.receipts.last()
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("workflow_id", &self.workflow_id)
            .field("tick_count", &self.controller.tick_count())
            .field("receipts", &self.receipts.len())
            .finish()
    }
}
