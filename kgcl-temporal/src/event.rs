//! Workflow events

use crate::clock::VectorClock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Time-ordered event identifier (UUIDv7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of the temporal log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub tick_number: u64,
    pub workflow_id: String,
    pub payload: serde_json::Value,
    /// Direct causal parents
    pub caused_by: Vec<EventId>,
    pub vector_clock: VectorClock,
    /// Previous event hash within the same workflow
    pub previous_hash: Option<String>,
    /// Assigned by the store at append time
    pub sequence_number: u64,
}

impl WorkflowEvent {
    /// Fresh event with no causal links; the store assigns the sequence
    pub fn new(
        event_type: impl Into<String>,
        workflow_id: impl Into<String>,
        tick_number: u64,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            timestamp: chrono::Utc::now(),
            tick_number,
            workflow_id: workflow_id.into(),
            payload,
            caused_by: Vec::new(),
            vector_clock: VectorClock::new(),
            previous_hash: None,
            sequence_number: 0,
        }
    }

    pub fn caused_by(mut self, parents: Vec<EventId>) -> Self {
        self.caused_by = parents;
        self
    }

    pub fn with_clock(mut self, clock: VectorClock) -> Self {
        self.vector_clock = clock;
        self
    }

    /// SHA-256 over the canonical JSON of every field
    pub fn event_hash(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}
