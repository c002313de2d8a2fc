//! Warm reasoner pool
//!
//! A bounded pool of N3 reasoner subprocesses over a cached rules file. The
//! reasoner binary emits standalone executables from `--image`, not loadable
//! modules, so this is a process pool by contract: every run execs the
//! binary, and the pool slot is released on every exit path.

use crate::{EngineError, EngineResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Bounded pool of reasoner subprocess slots
pub struct WarmReasonerPool {
    eye_path: PathBuf,
    rules_file: PathBuf,
    slots: Arc<Semaphore>,
}

impl WarmReasonerPool {
    /// Build a pool; the binary and the cached rules file must exist
    pub fn new(
        eye_path: impl AsRef<Path>,
        rules_file: impl AsRef<Path>,
        pool_size: usize,
    ) -> EngineResult<Self> {
        let eye_path = eye_path.as_ref().to_path_buf();
        let rules_file = rules_file.as_ref().to_path_buf();
        if !eye_path.exists() {
            return Err(EngineError::Config(format!(
                "reasoner binary not found at {}",
                eye_path.display()
            )));
        }
        if !rules_file.exists() {
            return Err(EngineError::Config(format!(
                "cached rules file not found at {}",
                rules_file.display()
            )));
        }
        Ok(Self {
            eye_path,
            rules_file,
            slots: Arc::new(Semaphore::new(pool_size.max(1))),
        })
    }

    /// Run the reasoner over a Turtle document, returning its derivations
    ///
    /// Acquires a pool slot for the duration; the permit guard releases it
    /// on success, failure, and cancellation alike.
    pub async fn reason(&self, data_ttl: &str) -> EngineResult<String> {
        let _slot = self
            .slots
            .acquire()
            .await
            .map_err(|e| EngineError::Config(format!("reasoner pool closed: {}", e)))?;

        let mut data_file = tempfile::NamedTempFile::new()
            .map_err(|e| EngineError::Config(format!("cannot create scratch file: {}", e)))?;
        std::io::Write::write_all(&mut data_file, data_ttl.as_bytes())
            .map_err(|e| EngineError::Config(format!("cannot write scratch file: {}", e)))?;

        let output = tokio::process::Command::new(&self.eye_path)
            .arg("--quiet")
            .arg("--nope")
            .arg(&self.rules_file)
            .arg(data_file.path())
            .arg("--pass")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| EngineError::Config(format!("reasoner failed to start: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Config(format!(
                "reasoner exited with {}: {}",
                output.status, stderr
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Free slots right now
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

impl std::fmt::Debug for WarmReasonerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarmReasonerPool")
            .field("eye_path", &self.eye_path)
            .field("rules_file", &self.rules_file)
            .field("available_slots", &self.available_slots())
            .finish()
    }
}
