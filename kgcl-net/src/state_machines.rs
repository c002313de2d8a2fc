//! Runtime state machines for the state-based and trigger patterns
//!
//! WCP-17 interleaved parallel routing needs a mutex over a named task set;
//! WCP-25/26 need one-shot and counting triggers. These are plain state
//! machines: the graph-side effects of their siblings (deferred choice,
//! milestone, cancel multi-instance) live with the kernel deltas.

use parking_lot::Mutex;
use std::collections::BTreeSet;

/// Mutual exclusion over a named set of tasks (WCP-17)
///
/// Only one member may be active at a time; `acquire` returns false while
/// another member of the set holds the mutex.
#[derive(Debug)]
pub struct InterleaveGroup {
    name: String,
    members: BTreeSet<String>,
    holder: Mutex<Option<String>>,
}

impl InterleaveGroup {
    pub fn new(name: impl Into<String>, members: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: name.into(),
            members: members.into_iter().collect(),
            holder: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Try to take the mutex for `task`
    ///
    /// Re-acquisition by the current holder succeeds. Non-members are always
    /// refused.
    pub fn acquire(&self, task: &str) -> bool {
        if !self.members.contains(task) {
            return false;
        }
        let mut holder = self.holder.lock();
        match holder.as_deref() {
            None => {
                *holder = Some(task.to_string());
                true
            }
            Some(current) => current == task,
        }
    }

    /// Release the mutex if `task` holds it
    pub fn release(&self, task: &str) -> bool {
        let mut holder = self.holder.lock();
        if holder.as_deref() == Some(task) {
            *holder = None;
            true
        } else {
            false
        }
    }

    /// Current holder, if any
    pub fn holder(&self) -> Option<String> {
        self.holder.lock().clone()
    }
}

/// One-shot trigger (WCP-25): fires at most once
#[derive(Debug, Default)]
pub struct TransientTrigger {
    fired: Mutex<bool>,
}

impl TransientTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly on the first call; later activations are no-ops
    pub fn fire(&self) -> bool {
        let mut fired = self.fired.lock();
        if *fired {
            false
        } else {
            *fired = true;
            true
        }
    }

    pub fn has_fired(&self) -> bool {
        *self.fired.lock()
    }
}

/// Counting trigger (WCP-26): fires on every event while armed
#[derive(Debug)]
pub struct PersistentTrigger {
    armed: Mutex<bool>,
    count: Mutex<u64>,
}

impl PersistentTrigger {
    pub fn new() -> Self {
        Self {
            armed: Mutex::new(true),
            count: Mutex::new(0),
        }
    }

    /// Fire if armed; returns the updated fire counter, or None when disarmed
    pub fn fire(&self) -> Option<u64> {
        if !*self.armed.lock() {
            return None;
        }
        let mut count = self.count.lock();
        *count += 1;
        Some(*count)
    }

    pub fn arm(&self) {
        *self.armed.lock() = true;
    }

    pub fn disarm(&self) {
        *self.armed.lock() = false;
    }

    pub fn fire_count(&self) -> u64 {
        *self.count.lock()
    }
}

impl Default for PersistentTrigger {
    fn default() -> Self {
        Self::new()
    }
}
