//! Hook domain model

use crate::conditions::Condition;
use crate::{HookError, HookResult};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Hook lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookState {
    Pending,
    Active,
    Executed,
    Completed,
    Failed,
}

/// Context handed to a handler
#[derive(Debug, Clone)]
pub struct HookContext {
    pub hook_name: String,
    pub tick: u64,
    /// Metadata from the condition evaluation that triggered the handler
    pub condition_metadata: serde_json::Map<String, serde_json::Value>,
    /// Free-form input captured into the receipt
    pub data: serde_json::Value,
}

/// Handler: an awaitable from context to a result map
pub type HookHandler = Arc<
    dyn Fn(HookContext) -> BoxFuture<'static, Result<serde_json::Map<String, serde_json::Value>, String>>
        + Send
        + Sync,
>;

/// Hook definition with condition and handler
#[derive(Clone)]
pub struct Hook {
    pub name: String,
    pub description: String,
    pub condition: Condition,
    pub handler: HookHandler,
    /// Execution priority, 0-100; higher runs earlier
    pub priority: u8,
    pub timeout_s: f64,
    pub enabled: bool,
    pub actor: Option<String>,
    pub metadata: BTreeMap<String, String>,
    /// Condition cache TTL; zero disables caching
    pub cache_ttl_s: u64,

    // Lifecycle tracking
    pub state: HookState,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl Hook {
    /// Create a hook, validating name and priority
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        condition: Condition,
        handler: HookHandler,
    ) -> HookResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(HookError::Validation("hook name cannot be empty".to_string()));
        }
        if name.len() > 128 {
            return Err(HookError::Validation(format!(
                "hook name '{}' exceeds 128 characters",
                name
            )));
        }
        Ok(Self {
            name,
            description: description.into(),
            condition,
            handler,
            priority: 50,
            timeout_s: 30.0,
            enabled: true,
            actor: None,
            metadata: BTreeMap::new(),
            cache_ttl_s: 0,
            state: HookState::Pending,
            created_at: Utc::now(),
            executed_at: None,
        })
    }

    /// Set priority (must be 0-100)
    pub fn with_priority(mut self, priority: u8) -> HookResult<Self> {
        if priority > 100 {
            return Err(HookError::Validation(format!(
                "hook priority must be between 0 and 100, got {}",
                priority
            )));
        }
        self.priority = priority;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout_s: f64) -> Self {
        self.timeout_s = timeout_s;
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_cache_ttl(mut self, cache_ttl_s: u64) -> Self {
        self.cache_ttl_s = cache_ttl_s;
        self
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Move to a new lifecycle state, stamping terminal transitions
    pub(crate) fn transition(&mut self, state: HookState) {
        self.state = state;
        if matches!(
            state,
            HookState::Executed | HookState::Completed | HookState::Failed
        ) {
            self.executed_at = Some(Utc::now());
        }
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("state", &self.state)
            .finish()
    }
}

/// Handler that returns a fixed map, for wiring and tests
pub fn constant_handler(
    result: serde_json::Map<String, serde_json::Value>,
) -> HookHandler {
    Arc::new(move |_ctx| {
        let result = result.clone();
        Box::pin(async move { Ok(result) })
    })
}
