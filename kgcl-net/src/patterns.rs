//! WCP 1-27 pattern registry
//!
//! Patterns are frozen descriptors consulted by the kernel and the semantic
//! driver; they carry no behavior of their own. Each descriptor names the
//! kernel verb that realizes it and the enabling rule a conformant topology
//! must satisfy.

use crate::{NetError, NetResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pattern identifier (1-27)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternId(pub u32);

impl PatternId {
    /// Create a pattern id (must be 1-27)
    pub fn new(id: u32) -> NetResult<Self> {
        if (1..=27).contains(&id) {
            Ok(Self(id))
        } else {
            Err(NetError::PatternNotFound(id))
        }
    }
}

/// Pattern category per the classical catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternCategory {
    /// Basic control flow (1-5)
    BasicControlFlow,
    /// Advanced branching and synchronization (6-9)
    AdvancedBranching,
    /// Structural (10-11)
    Structural,
    /// Multiple instance (12-15)
    MultipleInstance,
    /// State-based (16-18)
    StateBased,
    /// Cancellation (19-20, 27)
    Cancellation,
    /// Iteration and termination (21-23)
    Iteration,
    /// Triggers (24-26)
    Trigger,
}

/// Frozen pattern descriptor
#[derive(Debug, Clone, Serialize)]
pub struct PatternDescriptor {
    pub id: PatternId,
    pub name: &'static str,
    pub category: PatternCategory,
    /// Kernel verb that realizes the pattern
    pub verb: &'static str,
    /// Enabling rule a topology must satisfy for the pattern to apply
    pub enabling_rule: &'static str,
}

/// Registry of all 27 descriptors
pub struct PatternRegistry {
    patterns: HashMap<PatternId, PatternDescriptor>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            patterns: HashMap::new(),
        };
        registry.register_all();
        registry
    }

    fn register_all(&mut self) {
        use PatternCategory::*;

        // Basic control flow (1-5)
        self.register(1, "Sequence", BasicControlFlow, "transmute",
            "one outgoing flow; token moves to the single successor");
        self.register(2, "Parallel Split", BasicControlFlow, "copy",
            "token duplicated onto every successor");
        self.register(3, "Synchronization", BasicControlFlow, "await",
            "fires only when every predecessor holds a token");
        self.register(4, "Exclusive Choice", BasicControlFlow, "filter",
            "exactly one guarded successor activates; lowest flow IRI breaks ties");
        self.register(5, "Simple Merge", BasicControlFlow, "transmute",
            "first token into the merge place wins; later ones are discarded");

        // Advanced branching (6-9)
        self.register(6, "Multi-Choice", AdvancedBranching, "filter",
            "every successor whose guard holds receives a token");
        self.register(7, "Structured Synchronizing Merge", AdvancedBranching, "await",
            "joins exactly the branches the paired multi-choice activated");
        self.register(8, "Multi-Merge", AdvancedBranching, "transmute",
            "each incoming token continues independently, no synchronization");
        self.register(9, "Discriminator", AdvancedBranching, "await",
            "first arriving branch fires the join; remaining arrivals are consumed silently");

        // Structural (10-11)
        self.register(10, "Arbitrary Cycles", Structural, "transmute",
            "flows may re-enter earlier nodes; convergence bounds the loop");
        self.register(11, "Implicit Termination", Structural, "void",
            "case ends when no transition can fire and only the sink is marked");

        // Multiple instance (12-15)
        self.register(12, "MI Without Synchronization", MultipleInstance, "copy",
            "instances spawn independently and never rejoin");
        self.register(13, "MI With Design-Time Knowledge", MultipleInstance, "copy",
            "instance count fixed in the topology; join waits for all of them");
        self.register(14, "MI With Runtime Knowledge", MultipleInstance, "copy",
            "instance count known at case start; join waits for all of them");
        self.register(15, "MI Without Runtime Knowledge", MultipleInstance, "copy",
            "instances keep spawning until a graph condition closes the set");

        // State-based (16-18)
        self.register(16, "Deferred Choice", StateBased, "filter",
            "all branches enabled; the first external event commits one and disables the rest in the same tick");
        self.register(17, "Interleaved Parallel Routing", StateBased, "transmute",
            "members of the named set execute one at a time under a mutex");
        self.register(18, "Milestone", StateBased, "filter",
            "enabled exactly while the milestone ASK condition holds; re-evaluated every tick");

        // Cancellation (19-20)
        self.register(19, "Cancel Activity", Cancellation, "void",
            "withdraw the token from a single activity");
        self.register(20, "Cancel Case", Cancellation, "void",
            "withdraw every token in the case");

        // Iteration and termination (21-23)
        self.register(21, "Structured Loop", Iteration, "filter",
            "guarded back-edge re-enters the loop body while the predicate holds");
        self.register(22, "Recursion", Iteration, "copy",
            "a task instantiates its own definition as a sub-case");
        self.register(23, "Transient Termination", Iteration, "void",
            "completion of the case voids any tokens still in flight");

        // Triggers (24-26)
        self.register(24, "Persistent Trigger Queueing", Trigger, "await",
            "trigger events queue until the task is ready to consume them");
        self.register(25, "Transient Trigger", Trigger, "filter",
            "fires at most once; further activations are no-ops");
        self.register(26, "Persistent Trigger", Trigger, "filter",
            "fires on every matching event while enabled; maintains a fire counter");

        // Cancel multi-instance (27)
        self.register(27, "Cancel Multi-Instance Activity", Cancellation, "void",
            "every instance of the task is marked cancelled with a timestamp in one delta");
    }

    fn register(
        &mut self,
        id: u32,
        name: &'static str,
        category: PatternCategory,
        verb: &'static str,
        enabling_rule: &'static str,
    ) {
        if let Ok(pattern_id) = PatternId::new(id) {
            self.patterns.insert(
                pattern_id,
                PatternDescriptor {
                    id: pattern_id,
                    name,
                    category,
                    verb,
                    enabling_rule,
                },
            );
        }
    }

    pub fn get(&self, id: PatternId) -> NetResult<&PatternDescriptor> {
        self.patterns
            .get(&id)
            .ok_or(NetError::PatternNotFound(id.0))
    }

    /// All descriptors ordered by pattern id
    pub fn list(&self) -> Vec<&PatternDescriptor> {
        let mut all: Vec<_> = self.patterns.values().collect();
        all.sort_by_key(|d| d.id.0);
        all
    }

    pub fn by_category(&self, category: PatternCategory) -> Vec<&PatternDescriptor> {
        self.list()
            .into_iter()
            .filter(|d| d.category == category)
            .collect()
    }
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_registry_has_all_27() {
        let registry = PatternRegistry::new();
        assert_eq!(registry.list().len(), 27);
        for id in 1..=27 {
            assert!(registry.get(PatternId::new(id).unwrap()).is_ok());
        }
    }

    #[test]
    fn test_pattern_id_range() {
        assert!(PatternId::new(0).is_err());
        assert!(PatternId::new(28).is_err());
        assert!(PatternId::new(1).is_ok());
        assert!(PatternId::new(27).is_ok());
    }

    #[test]
    fn test_verbs_are_kernel_verbs() {
        let registry = PatternRegistry::new();
        let verbs = ["transmute", "copy", "filter", "await", "void"];
        for descriptor in registry.list() {
            assert!(
                verbs.contains(&descriptor.verb),
                "pattern {} names unknown verb {}",
                descriptor.id.0,
                descriptor.verb
            );
        }
    }

    #[test]
    fn test_state_based_patterns() {
        let registry = PatternRegistry::new();
        let state_based = registry.by_category(PatternCategory::StateBased);
        let ids: Vec<u32> = state_based.iter().map(|d| d.id.0).collect();
        assert_eq!(ids, vec![16, 17, 18]);
    }
}
