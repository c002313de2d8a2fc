//! Petri-net entities and firing semantics
//!
//! Markings are immutable: every update returns a new marking. Arcs are
//! bipartite by construction. A `WorkflowNet` is a Petri net with exactly one
//! source place, exactly one sink place, and every node on some source→sink
//! path; a case is properly completed when only the sink holds tokens.

use crate::{NetError, NetResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Node kind, used to enforce the bipartite arc invariant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Place,
    Transition,
}

/// Passive node holding tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub id: String,
    pub name: String,
    pub is_source: bool,
    pub is_sink: bool,
}

impl Place {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            is_source: false,
            is_sink: false,
        }
    }

    pub fn source(id: impl Into<String>) -> Self {
        Self {
            is_source: true,
            ..Self::new(id)
        }
    }

    pub fn sink(id: impl Into<String>) -> Self {
        Self {
            is_sink: true,
            ..Self::new(id)
        }
    }
}

/// Active node, fires when enabled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub id: String,
    pub name: String,
    /// Silent transitions route tokens without observable work
    pub is_silent: bool,
    pub guard: Option<String>,
}

impl Transition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            is_silent: false,
            guard: None,
        }
    }
}

/// Directed weighted arc between a place and a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arc {
    pub source: String,
    pub target: String,
    pub weight: u32,
}

impl Arc {
    /// Build an arc, rejecting zero weights (endpoint kinds are checked by
    /// the net when the arc is added)
    pub fn new(source: impl Into<String>, target: impl Into<String>, weight: u32) -> NetResult<Self> {
        let source = source.into();
        let target = target.into();
        if weight == 0 {
            return Err(NetError::InvalidArc {
                source,
                target,
                reason: "weight must be >= 1".to_string(),
            });
        }
        Ok(Self {
            source,
            target,
            weight,
        })
    }
}

/// Immutable multiset of places
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marking(BTreeMap<String, u32>);

impl Marking {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_counts(counts: impl IntoIterator<Item = (String, u32)>) -> Self {
        Self(counts.into_iter().filter(|(_, c)| *c > 0).collect())
    }

    /// Token count at a place (zero when absent)
    pub fn get(&self, place_id: &str) -> u32 {
        self.0.get(place_id).copied().unwrap_or(0)
    }

    /// New marking with tokens added
    pub fn with_added(&self, place_id: &str, count: u32) -> Self {
        let mut counts = self.0.clone();
        *counts.entry(place_id.to_string()).or_insert(0) += count;
        Self(counts)
    }

    /// New marking with tokens removed
    pub fn with_removed(&self, place_id: &str, count: u32) -> NetResult<Self> {
        let available = self.get(place_id);
        if available < count {
            return Err(NetError::InsufficientTokens {
                place: place_id.to_string(),
                available,
                needed: count,
            });
        }
        let mut counts = self.0.clone();
        if available == count {
            counts.remove(place_id);
        } else if let Some(c) = counts.get_mut(place_id) {
            *c -= count;
        }
        Ok(Self(counts))
    }

    /// Places currently holding at least one token
    pub fn support(&self) -> BTreeSet<String> {
        self.0.keys().cloned().collect()
    }

    /// Total token count
    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Place/transition net with id-indexed collections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PetriNet {
    places: HashMap<String, Place>,
    transitions: HashMap<String, Transition>,
    arcs: Vec<Arc>,
}

impl PetriNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_place(&mut self, place: Place) {
        self.places.insert(place.id.clone(), place);
    }

    pub fn add_transition(&mut self, transition: Transition) {
        self.transitions.insert(transition.id.clone(), transition);
    }

    /// Add an arc, enforcing the bipartite invariant
    pub fn add_arc(&mut self, arc: Arc) -> NetResult<()> {
        let source_kind = self.node_kind(&arc.source)?;
        let target_kind = self.node_kind(&arc.target)?;
        if source_kind == target_kind {
            return Err(NetError::InvalidArc {
                source: arc.source,
                target: arc.target,
                reason: "arcs must connect a place and a transition".to_string(),
            });
        }
        self.arcs.push(arc);
        Ok(())
    }

    pub fn get_place(&self, id: &str) -> Option<&Place> {
        self.places.get(id)
    }

    pub fn get_transition(&self, id: &str) -> Option<&Transition> {
        self.transitions.get(id)
    }

    pub fn places(&self) -> impl Iterator<Item = &Place> {
        self.places.values()
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.values()
    }

    fn node_kind(&self, id: &str) -> NetResult<NodeKind> {
        if self.places.contains_key(id) {
            Ok(NodeKind::Place)
        } else if self.transitions.contains_key(id) {
            Ok(NodeKind::Transition)
        } else {
            Err(NetError::UnknownNode(id.to_string()))
        }
    }

    /// Arcs entering a node
    pub fn input_arcs(&self, id: &str) -> Vec<&Arc> {
        self.arcs.iter().filter(|a| a.target == id).collect()
    }

    /// Arcs leaving a node
    pub fn output_arcs(&self, id: &str) -> Vec<&Arc> {
        self.arcs.iter().filter(|a| a.source == id).collect()
    }

    /// Nodes with an arc into `id`
    pub fn preset(&self, id: &str) -> BTreeSet<String> {
        self.input_arcs(id).iter().map(|a| a.source.clone()).collect()
    }

    /// Nodes with an arc out of `id`
    pub fn postset(&self, id: &str) -> BTreeSet<String> {
        self.output_arcs(id).iter().map(|a| a.target.clone()).collect()
    }

    /// A transition is enabled when every input place covers its arc weight
    pub fn is_enabled(&self, transition_id: &str, marking: &Marking) -> bool {
        if !self.transitions.contains_key(transition_id) {
            return false;
        }
        self.input_arcs(transition_id)
            .iter()
            .all(|arc| marking.get(&arc.source) >= arc.weight)
    }

    /// All enabled transitions under a marking
    pub fn enabled(&self, marking: &Marking) -> BTreeSet<String> {
        self.transitions
            .keys()
            .filter(|t| self.is_enabled(t, marking))
            .cloned()
            .collect()
    }

    /// Fire a transition: consume input tokens, produce output tokens
    pub fn fire(&self, transition_id: &str, marking: &Marking) -> NetResult<Marking> {
        if !self.is_enabled(transition_id, marking) {
            return Err(NetError::TransitionNotEnabled(transition_id.to_string()));
        }
        let mut next = marking.clone();
        for arc in self.input_arcs(transition_id) {
            next = next.with_removed(&arc.source, arc.weight)?;
        }
        for arc in self.output_arcs(transition_id) {
            next = next.with_added(&arc.target, arc.weight);
        }
        Ok(next)
    }
}

/// WF-net: a Petri net with a unique source and sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNet {
    net: PetriNet,
    source: String,
    sink: String,
}

impl WorkflowNet {
    pub fn new(net: PetriNet, source: impl Into<String>, sink: impl Into<String>) -> Self {
        Self {
            net,
            source: source.into(),
            sink: sink.into(),
        }
    }

    pub fn net(&self) -> &PetriNet {
        &self.net
    }

    pub fn source_place(&self) -> &str {
        &self.source
    }

    pub fn sink_place(&self) -> &str {
        &self.sink
    }

    /// `[i]` — one token on the source
    pub fn initial_marking(&self) -> Marking {
        Marking::empty().with_added(&self.source, 1)
    }

    /// `[o]` — one token on the sink
    pub fn final_marking(&self) -> Marking {
        Marking::empty().with_added(&self.sink, 1)
    }

    /// Structural soundness: unique source/sink with consistent flags, no
    /// arcs into the source or out of the sink, and every node on some
    /// source→sink path.
    pub fn is_proper_wf_net(&self) -> NetResult<()> {
        let source = self
            .net
            .get_place(&self.source)
            .ok_or_else(|| NetError::UnknownNode(self.source.clone()))?;
        let sink = self
            .net
            .get_place(&self.sink)
            .ok_or_else(|| NetError::UnknownNode(self.sink.clone()))?;

        if !source.is_source {
            return Err(NetError::Malformed(format!(
                "source place {} is not flagged is_source",
                self.source
            )));
        }
        if !sink.is_sink {
            return Err(NetError::Malformed(format!(
                "sink place {} is not flagged is_sink",
                self.sink
            )));
        }
        for place in self.net.places() {
            if place.is_source && place.id != self.source {
                return Err(NetError::Malformed(format!(
                    "extra source place {}",
                    place.id
                )));
            }
            if place.is_sink && place.id != self.sink {
                return Err(NetError::Malformed(format!("extra sink place {}", place.id)));
            }
        }
        if !self.net.input_arcs(&self.source).is_empty() {
            return Err(NetError::Malformed(format!(
                "source place {} has incoming arcs",
                self.source
            )));
        }
        if !self.net.output_arcs(&self.sink).is_empty() {
            return Err(NetError::Malformed(format!(
                "sink place {} has outgoing arcs",
                self.sink
            )));
        }

        let forward = self.reachable(&self.source, false);
        let backward = self.reachable(&self.sink, true);
        for id in self
            .net
            .places()
            .map(|p| p.id.clone())
            .chain(self.net.transitions().map(|t| t.id.clone()))
        {
            if !forward.contains(&id) || !backward.contains(&id) {
                return Err(NetError::Malformed(format!(
                    "node {} is not on a source-to-sink path",
                    id
                )));
            }
        }
        Ok(())
    }

    /// Proper completion: the marking is exactly `[o]`
    pub fn is_proper_completion(&self, marking: &Marking) -> bool {
        marking.support() == BTreeSet::from([self.sink.clone()]) && marking.get(&self.sink) == 1
    }

    /// Improper completion: the sink holds tokens but other places do too
    pub fn is_improper_completion(&self, marking: &Marking) -> bool {
        marking.get(&self.sink) > 0 && !self.is_proper_completion(marking)
    }

    fn reachable(&self, start: &str, reverse: bool) -> BTreeSet<String> {
        let mut seen = BTreeSet::from([start.to_string()]);
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(node) = queue.pop_front() {
            let next = if reverse {
                self.net.preset(&node)
            } else {
                self.net.postset(&node)
            };
            for n in next {
                if seen.insert(n.clone()) {
                    queue.push_back(n);
                }
            }
        }
        seen
    }
}

/// Record of fired transitions, in order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiringSequence(Vec<String>);

impl FiringSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// New sequence with one more firing appended
    pub fn appended(&self, transition_id: impl Into<String>) -> Self {
        let mut fired = self.0.clone();
        fired.push(transition_id.into());
        Self(fired)
    }

    pub fn transitions(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
