//! Tick receipts and canonical YAML
//!
//! The canonical rendering — keys alphabetically sorted at every level,
//! RFC 3339 UTC timestamps, `rules_fired` as a flow sequence, strings
//! single-quoted — feeds the chain hash, so whitespace in the on-disk file
//! is never load-bearing.

use crate::{LockchainError, LockchainResult};
use chrono::{DateTime, SecondsFormat, Utc};
use kgcl_hooks::HookReceipt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Compact, chain-hashed view of a hook receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookReceiptSummary {
    pub receipt_id: String,
    pub hook_id: String,
    pub condition_triggered: bool,
    pub duration_ms: f64,
    pub error: Option<String>,
}

impl From<&HookReceipt> for HookReceiptSummary {
    fn from(receipt: &HookReceipt) -> Self {
        Self {
            receipt_id: receipt.receipt_id.to_string(),
            hook_id: receipt.hook_id.clone(),
            condition_triggered: receipt.condition_result.triggered,
            duration_ms: receipt.duration_ms,
            error: receipt.error.clone(),
        }
    }
}

/// Receipt for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReceipt {
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub state_hash_before: String,
    pub state_hash_after: String,
    pub rules_fired: Vec<String>,
    pub triples_added: u32,
    pub triples_removed: u32,
    pub converged: bool,
    pub hook_receipts: Vec<HookReceiptSummary>,
}

impl TickReceipt {
    /// Canonical YAML rendering
    pub fn to_canonical_yaml(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("converged: {}\n", self.converged));

        if self.hook_receipts.is_empty() {
            out.push_str("hook_receipts: []\n");
        } else {
            out.push_str("hook_receipts:\n");
            for hr in &self.hook_receipts {
                out.push_str(&format!(
                    "- condition_triggered: {}\n",
                    hr.condition_triggered
                ));
                out.push_str(&format!("  duration_ms: {}\n", hr.duration_ms));
                match &hr.error {
                    Some(e) => out.push_str(&format!("  error: {}\n", quote(e))),
                    None => out.push_str("  error: null\n"),
                }
                out.push_str(&format!("  hook_id: {}\n", quote(&hr.hook_id)));
                out.push_str(&format!("  receipt_id: {}\n", quote(&hr.receipt_id)));
            }
        }

        let rules: Vec<String> = self.rules_fired.iter().map(|r| quote(r)).collect();
        out.push_str(&format!("rules_fired: [{}]\n", rules.join(", ")));
        out.push_str(&format!(
            "state_hash_after: {}\n",
            quote(&self.state_hash_after)
        ));
        out.push_str(&format!(
            "state_hash_before: {}\n",
            quote(&self.state_hash_before)
        ));
        out.push_str(&format!("tick: {}\n", self.tick));
        out.push_str(&format!(
            "timestamp: {}\n",
            quote(&self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true))
        ));
        out.push_str(&format!("triples_added: {}\n", self.triples_added));
        out.push_str(&format!("triples_removed: {}\n", self.triples_removed));

        out
    }

    /// Parse a receipt back from its canonical YAML
    pub fn from_yaml(yaml: &str) -> LockchainResult<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml)
            .map_err(|e| LockchainError::Serialization(e.to_string()))?;

        let map = value
            .as_mapping()
            .ok_or_else(|| LockchainError::Serialization("receipt is not a mapping".to_string()))?;

        let get = |key: &str| -> LockchainResult<&serde_yaml::Value> {
            map.get(serde_yaml::Value::String(key.to_string()))
                .ok_or_else(|| LockchainError::Serialization(format!("missing key {}", key)))
        };

        let timestamp_raw = get("timestamp")?
            .as_str()
            .ok_or_else(|| LockchainError::Serialization("timestamp is not a string".to_string()))?;
        let timestamp = DateTime::parse_from_rfc3339(timestamp_raw)
            .map_err(|e| LockchainError::Serialization(format!("bad timestamp: {}", e)))?
            .with_timezone(&Utc);

        let rules_fired = get("rules_fired")?
            .as_sequence()
            .ok_or_else(|| LockchainError::Serialization("rules_fired is not a list".to_string()))?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        let mut hook_receipts = Vec::new();
        if let Some(seq) = get("hook_receipts")?.as_sequence() {
            for entry in seq {
                let hr: HookReceiptSummary = serde_yaml::from_value(entry.clone())
                    .map_err(|e| LockchainError::Serialization(e.to_string()))?;
                hook_receipts.push(hr);
            }
        }

        let as_u64 = |key: &str| -> LockchainResult<u64> {
            get(key)?
                .as_u64()
                .ok_or_else(|| LockchainError::Serialization(format!("{} is not an integer", key)))
        };
        let as_str = |key: &str| -> LockchainResult<String> {
            Ok(get(key)?
                .as_str()
                .ok_or_else(|| LockchainError::Serialization(format!("{} is not a string", key)))?
                .to_string())
        };

        Ok(Self {
            tick: as_u64("tick")?,
            timestamp,
            state_hash_before: as_str("state_hash_before")?,
            state_hash_after: as_str("state_hash_after")?,
            rules_fired,
            triples_added: as_u64("triples_added")? as u32,
            triples_removed: as_u64("triples_removed")? as u32,
            converged: get("converged")?
                .as_bool()
                .ok_or_else(|| LockchainError::Serialization("converged is not a bool".to_string()))?,
            hook_receipts,
        })
    }

    /// Chain hash: `hex(sha256(canonical_yaml || prev_commit_hash))`
    pub fn chain_hash(&self, prev_commit_hash: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_canonical_yaml().as_bytes());
        hasher.update(prev_commit_hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Single-quote a YAML scalar, doubling embedded quotes
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::TimeZone;

    fn receipt() -> TickReceipt {
        TickReceipt {
            tick: 1,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap(),
            state_hash_before: "sha256:abc123".to_string(),
            state_hash_after: "sha256:def456".to_string(),
            rules_fired: vec![
                "kgc:WCP1_Sequence".to_string(),
                "kgc:WCP2_ParallelSplit".to_string(),
            ],
            triples_added: 5,
            triples_removed: 2,
            converged: false,
            hook_receipts: vec![],
        }
    }

    #[test]
    fn test_canonical_yaml_structure() {
        let yaml = receipt().to_canonical_yaml();

        assert!(yaml.contains("tick: 1"));
        assert!(yaml.contains("state_hash_before: 'sha256:abc123'"));
        assert!(yaml.contains("state_hash_after: 'sha256:def456'"));
        assert!(yaml.contains("triples_added: 5"));
        assert!(yaml.contains("triples_removed: 2"));
        assert!(yaml.contains("converged: false"));
        assert!(yaml.contains("rules_fired: ['kgc:WCP1_Sequence', 'kgc:WCP2_ParallelSplit']"));
        assert!(yaml.contains("timestamp: '2025-01-15T10:30:00.000000Z'"));
    }

    #[test]
    fn test_keys_alphabetically_sorted() {
        let yaml = receipt().to_canonical_yaml();
        let keys: Vec<&str> = yaml
            .lines()
            .filter(|l| !l.starts_with([' ', '-']))
            .filter_map(|l| l.split(':').next())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_yaml_round_trip_byte_identical() {
        let original = receipt();
        let yaml1 = original.to_canonical_yaml();
        let parsed = TickReceipt::from_yaml(&yaml1).unwrap();
        let yaml2 = parsed.to_canonical_yaml();
        assert_eq!(yaml1, yaml2);
    }

    #[test]
    fn test_round_trip_with_hook_receipts() {
        let mut r = receipt();
        r.hook_receipts = vec![HookReceiptSummary {
            receipt_id: "3f2b8c1a-0000-4000-8000-000000000001".to_string(),
            hook_id: "validation_failure_handler".to_string(),
            condition_triggered: true,
            duration_ms: 1.25,
            error: None,
        }];

        let yaml1 = r.to_canonical_yaml();
        let parsed = TickReceipt::from_yaml(&yaml1).unwrap();
        assert_eq!(parsed.hook_receipts, r.hook_receipts);
        assert_eq!(parsed.to_canonical_yaml(), yaml1);
    }

    #[test]
    fn test_from_yaml_invalid() {
        assert!(TickReceipt::from_yaml("not: a: receipt:").is_err());
        assert!(TickReceipt::from_yaml("tick: 1").is_err());
    }

    #[test]
    fn test_chain_hash_depends_on_prev() {
        let r = receipt();
        let a = r.chain_hash(crate::GENESIS_HASH);
        let b = r.chain_hash(&a);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, r.chain_hash(crate::GENESIS_HASH));
    }

    #[test]
    fn test_chain_hash_sensitive_to_content() {
        let r1 = receipt();
        let mut r2 = receipt();
        r2.triples_added = 6;
        assert_ne!(
            r1.chain_hash(crate::GENESIS_HASH),
            r2.chain_hash(crate::GENESIS_HASH)
        );
    }

    #[test]
    fn test_quoting_escapes_single_quotes() {
        let mut r = receipt();
        r.rules_fired = vec!["rule'with'quotes".to_string()];
        let yaml = r.to_canonical_yaml();
        assert!(yaml.contains("'rule''with''quotes'"));
        let parsed = TickReceipt::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.rules_fired, r.rules_fired);
    }
}
