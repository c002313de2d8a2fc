//! Vector clocks for causal ordering

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-actor logical clock
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock(BTreeMap<String, u64>);

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance this actor's component
    pub fn increment(&mut self, actor: &str) {
        *self.0.entry(actor.to_string()).or_insert(0) += 1;
    }

    /// Component for an actor (zero when absent)
    pub fn get(&self, actor: &str) -> u64 {
        self.0.get(actor).copied().unwrap_or(0)
    }

    /// Pointwise maximum with another clock
    pub fn merge(&mut self, other: &VectorClock) {
        for (actor, &count) in &other.0 {
            let entry = self.0.entry(actor.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
    }

    /// Strictly-before: every component <= and at least one <
    pub fn happened_before(&self, other: &VectorClock) -> bool {
        let mut strictly_less = false;
        for (actor, &count) in &self.0 {
            let theirs = other.get(actor);
            if count > theirs {
                return false;
            }
            if count < theirs {
                strictly_less = true;
            }
        }
        for (actor, &theirs) in &other.0 {
            if self.get(actor) < theirs {
                strictly_less = true;
            }
        }
        strictly_less
    }

    /// Neither clock happened before the other
    pub fn concurrent_with(&self, other: &VectorClock) -> bool {
        self != other && !self.happened_before(other) && !other.happened_before(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_and_get() {
        let mut clock = VectorClock::new();
        clock.increment("a");
        clock.increment("a");
        clock.increment("b");
        assert_eq!(clock.get("a"), 2);
        assert_eq!(clock.get("b"), 1);
        assert_eq!(clock.get("c"), 0);
    }

    #[test]
    fn test_happened_before() {
        let mut earlier = VectorClock::new();
        earlier.increment("a");

        let mut later = earlier.clone();
        later.increment("a");
        later.increment("b");

        assert!(earlier.happened_before(&later));
        assert!(!later.happened_before(&earlier));
        assert!(!earlier.happened_before(&earlier));
    }

    #[test]
    fn test_concurrent() {
        let mut left = VectorClock::new();
        left.increment("a");

        let mut right = VectorClock::new();
        right.increment("b");

        assert!(left.concurrent_with(&right));
        assert!(right.concurrent_with(&left));
    }

    #[test]
    fn test_merge_takes_pointwise_max() {
        let mut left = VectorClock::new();
        left.increment("a");
        left.increment("a");

        let mut right = VectorClock::new();
        right.increment("a");
        right.increment("b");

        left.merge(&right);
        assert_eq!(left.get("a"), 2);
        assert_eq!(left.get("b"), 1);
    }
}
