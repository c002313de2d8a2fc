//! Engine configuration
//!
//! Typed defaults with environment overrides. Only three variables are
//! honored: `KGCL_CACHE_DIR`, `KGCL_EYE_PATH`, and `KGCL_LOG_LEVEL`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine-wide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cache root (condition cache spill, reasoner scratch)
    pub cache_dir: PathBuf,
    /// Path to the N3 reasoner binary (warm reasoner only)
    pub eye_path: Option<PathBuf>,
    /// Log verbosity, EnvFilter syntax
    pub log_level: String,
    /// Default tick budget for run_to_completion
    pub max_ticks: u64,
    /// Stop hook execution after the first failure
    pub fail_fast: bool,
    /// Truncation threshold for hook handler results
    pub max_hook_result_bytes: usize,
    /// Bindings exposed in select-condition metadata
    pub max_bindings: usize,
    /// Hot-tier capacity of the temporal store
    pub max_hot_events: usize,
    /// Warm-tier capacity of the temporal store
    pub max_warm_events: usize,
    pub snapshot_interval_events: u64,
    pub snapshot_interval_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".kgcl-cache"),
            eye_path: None,
            log_level: "info".to_string(),
            max_ticks: 100,
            fail_fast: false,
            max_hook_result_bytes: 64 * 1024,
            max_bindings: 100,
            max_hot_events: 10_000,
            max_warm_events: 1_000_000,
            snapshot_interval_events: 10_000,
            snapshot_interval_seconds: 3_600,
        }
    }
}

impl EngineConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("KGCL_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("KGCL_EYE_PATH") {
            config.eye_path = Some(PathBuf::from(path));
        }
        if let Ok(level) = std::env::var("KGCL_LOG_LEVEL") {
            config.log_level = level;
        }
        config
    }

    /// Compaction policy slice of this configuration
    pub fn compaction_policy(&self) -> kgcl_temporal::CompactionPolicy {
        kgcl_temporal::CompactionPolicy {
            max_hot_events: self.max_hot_events,
            max_warm_events: self.max_warm_events,
            snapshot_interval_events: self.snapshot_interval_events,
            snapshot_interval_seconds: self.snapshot_interval_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_ticks, 100);
        assert_eq!(config.max_hot_events, 10_000);
        assert_eq!(config.max_warm_events, 1_000_000);
        assert!(!config.fail_fast);
        assert!(config.eye_path.is_none());
    }

    #[test]
    fn test_compaction_policy_mirrors_config() {
        let config = EngineConfig::default();
        let policy = config.compaction_policy();
        assert_eq!(policy.max_hot_events, config.max_hot_events);
        assert_eq!(policy.snapshot_interval_seconds, config.snapshot_interval_seconds);
    }
}
