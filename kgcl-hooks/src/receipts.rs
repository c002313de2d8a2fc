//! Hook execution receipts
//!
//! A receipt is an immutable value capturing one hook execution: the
//! condition outcome, the handler result (truncated when oversized), timing,
//! and any error. Receipts reference hooks by name only.

use crate::conditions::ConditionResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Immutable execution provenance for one hook run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookReceipt {
    pub receipt_id: Uuid,
    pub hook_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub actor: Option<String>,
    pub condition_result: ConditionResult,
    pub handler_result: Option<Map<String, Value>>,
    pub duration_ms: f64,
    pub error: Option<String>,
    pub stack_trace: Option<String>,
    pub memory_delta_bytes: Option<i64>,
    pub input_context: Option<Value>,
    pub truncated: bool,
    pub merkle_anchor: Option<String>,
}

impl HookReceipt {
    /// Build a receipt, truncating an oversized handler result
    ///
    /// When the serialized handler result exceeds `max_size_bytes`, it is
    /// replaced by `{"_truncated": true, "_size": n}`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hook_id: impl Into<String>,
        actor: Option<String>,
        condition_result: ConditionResult,
        handler_result: Option<Map<String, Value>>,
        duration_ms: f64,
        error: Option<String>,
        input_context: Option<Value>,
        max_size_bytes: Option<usize>,
    ) -> Self {
        let mut truncated = false;
        let handler_result = match (handler_result, max_size_bytes) {
            (Some(result), Some(max)) => {
                let size = serde_json::to_string(&result).map(|s| s.len()).unwrap_or(0);
                if size > max {
                    truncated = true;
                    let mut replacement = Map::new();
                    replacement.insert("_truncated".to_string(), json!(true));
                    replacement.insert("_size".to_string(), json!(size));
                    Some(replacement)
                } else {
                    Some(result)
                }
            }
            (result, _) => result,
        };

        Self {
            receipt_id: Uuid::new_v4(),
            hook_id: hook_id.into(),
            timestamp: chrono::Utc::now(),
            actor,
            condition_result,
            handler_result,
            duration_ms,
            error,
            stack_trace: None,
            memory_delta_bytes: None,
            input_context,
            truncated,
            merkle_anchor: None,
        }
    }

    /// True when the execution failed
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_receipt_ids_unique() {
        let a = HookReceipt::new(
            "hook",
            None,
            ConditionResult::bare(true),
            None,
            1.0,
            None,
            None,
            None,
        );
        let b = HookReceipt::new(
            "hook",
            None,
            ConditionResult::bare(true),
            None,
            1.0,
            None,
            None,
            None,
        );
        assert_ne!(a.receipt_id, b.receipt_id);
    }

    #[test]
    fn test_oversized_handler_result_truncated() {
        let mut big = Map::new();
        big.insert("payload".to_string(), json!("x".repeat(4096)));

        let receipt = HookReceipt::new(
            "hook",
            None,
            ConditionResult::bare(true),
            Some(big),
            1.0,
            None,
            None,
            Some(256),
        );

        assert!(receipt.truncated);
        let result = receipt.handler_result.unwrap();
        assert_eq!(result["_truncated"], json!(true));
        assert!(result["_size"].as_u64().unwrap() > 256);
    }

    #[test]
    fn test_small_result_not_truncated() {
        let mut small = Map::new();
        small.insert("ok".to_string(), json!(true));

        let receipt = HookReceipt::new(
            "hook",
            None,
            ConditionResult::bare(true),
            Some(small.clone()),
            1.0,
            None,
            None,
            Some(4096),
        );

        assert!(!receipt.truncated);
        assert_eq!(receipt.handler_result.unwrap(), small);
    }

    #[test]
    fn test_receipt_serializes() {
        let receipt = HookReceipt::new(
            "hook",
            Some("agent".to_string()),
            ConditionResult::bare(false),
            None,
            0.5,
            Some("boom".to_string()),
            Some(json!({"k": "v"})),
            None,
        );
        let json = serde_json::to_string(&receipt).unwrap();
        let back: HookReceipt = serde_json::from_str(&json).unwrap();
        assert_eq!(back.hook_id, "hook");
        assert!(back.is_failure());
    }
}
