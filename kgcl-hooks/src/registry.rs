//! Hook registry
//!
//! Owns hooks, keyed by unique name. Execution order is priority descending
//! with insertion order preserved among equal priorities.

use crate::hook::Hook;
use crate::{HookError, HookResult};

/// Registry of named hooks
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Hook>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook; duplicate names are rejected
    pub fn register(&mut self, hook: Hook) -> HookResult<()> {
        if self.hooks.iter().any(|h| h.name == hook.name) {
            return Err(HookError::Validation(format!(
                "Hook '{}' already exists",
                hook.name
            )));
        }
        self.hooks.push(hook);
        Ok(())
    }

    /// Remove a hook by name (idempotent)
    pub fn unregister(&mut self, name: &str) {
        self.hooks.retain(|h| h.name != name);
    }

    pub fn get(&self, name: &str) -> Option<&Hook> {
        self.hooks.iter().find(|h| h.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Hook> {
        self.hooks.iter_mut().find(|h| h.name == name)
    }

    /// All hooks in registration order
    pub fn all(&self) -> &[Hook] {
        &self.hooks
    }

    /// Indices in execution order: priority descending, stable within ties
    pub fn execution_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.hooks.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(self.hooks[i].priority));
        order
    }

    /// Mutable access by index, for the executor
    pub(crate) fn at_mut(&mut self, index: usize) -> Option<&mut Hook> {
        self.hooks.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::conditions::Condition;
    use crate::hook::constant_handler;

    fn hook(name: &str, priority: u8) -> Hook {
        Hook::new(
            name,
            "",
            Condition::SparqlAsk {
                query: "ASK { ?s ?p ?o }".to_string(),
            },
            constant_handler(serde_json::Map::new()),
        )
        .unwrap()
        .with_priority(priority)
        .unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = HookRegistry::new();
        registry.register(hook("a", 10)).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("a").is_some());
        assert!(registry.get("b").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = HookRegistry::new();
        registry.register(hook("a", 10)).unwrap();
        let err = registry.register(hook("a", 20)).unwrap_err();
        assert!(matches!(err, HookError::Validation(_)));
    }

    #[test]
    fn test_unregister_idempotent() {
        let mut registry = HookRegistry::new();
        registry.register(hook("a", 10)).unwrap();
        registry.unregister("a");
        registry.unregister("a");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_execution_order_priority_desc_stable() {
        let mut registry = HookRegistry::new();
        registry.register(hook("low", 10)).unwrap();
        registry.register(hook("high", 90)).unwrap();
        registry.register(hook("mid-first", 50)).unwrap();
        registry.register(hook("mid-second", 50)).unwrap();

        let names: Vec<&str> = registry
            .execution_order()
            .into_iter()
            .map(|i| registry.all()[i].name.as_str())
            .collect();
        assert_eq!(names, vec!["high", "mid-first", "mid-second", "low"]);
    }
}
