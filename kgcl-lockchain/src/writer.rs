//! Git-backed lockchain writer
//!
//! One YAML file per tick under `<repo>/.kgc/lockchain/`, each committed to
//! the backing repository. The file carries the receipt plus its
//! `prev_commit_hash`, so the SHA-256 chain can be verified offline from the
//! files alone; the git history is a second, independent witness.

use crate::receipt::TickReceipt;
use crate::{LockchainError, LockchainResult, GENESIS_HASH};
use git2::{Repository, Signature};
use std::fs;
use std::path::{Path, PathBuf};

const LOCKCHAIN_SUBDIR: &str = ".kgc/lockchain";

/// One verified link of the chain
#[derive(Debug, Clone)]
pub struct ChainEntry {
    pub receipt: TickReceipt,
    pub prev_commit_hash: String,
    pub commit_hash: String,
}

/// Append-only tick-receipt log over a git repository
pub struct LockchainWriter {
    repo: Repository,
    root: PathBuf,
    lockchain_dir: PathBuf,
}

impl LockchainWriter {
    /// Open a writer over an existing git repository
    pub fn open(root: impl AsRef<Path>) -> LockchainResult<Self> {
        let root = root.as_ref().to_path_buf();
        let repo = Repository::open(&root)
            .map_err(|_| LockchainError::NotARepository(root.display().to_string()))?;

        let lockchain_dir = root.join(LOCKCHAIN_SUBDIR);
        fs::create_dir_all(&lockchain_dir)?;

        Ok(Self {
            repo,
            root,
            lockchain_dir,
        })
    }

    /// Directory holding the receipt files
    pub fn lockchain_dir(&self) -> &Path {
        &self.lockchain_dir
    }

    fn receipt_path(&self, tick: u64) -> PathBuf {
        self.lockchain_dir.join(format!("tick_{:06}.yaml", tick))
    }

    /// Chain hash of the latest receipt on disk (genesis when empty)
    pub fn head_commit_hash(&self) -> LockchainResult<String> {
        let entries = self.entries()?;
        Ok(entries
            .last()
            .map(|e| e.commit_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string()))
    }

    /// Append a receipt: write its file, commit it, return the git commit id
    ///
    /// The file records `prev_commit_hash`; the chain hash itself is always
    /// recomputed from content, never stored.
    pub fn append(&mut self, receipt: &TickReceipt) -> LockchainResult<String> {
        let prev = self.head_commit_hash()?;

        let mut content = String::new();
        content.push_str(&format!("prev_commit_hash: '{}'\n", prev));
        content.push_str("receipt:\n");
        for line in receipt.to_canonical_yaml().lines() {
            content.push_str(&format!("  {}\n", line));
        }

        let path = self.receipt_path(receipt.tick);
        fs::write(&path, &content)?;

        let message = format!(
            "lockchain: tick {}\nstate_before: {}\nstate_after:  {}\nconverged: {}\n",
            receipt.tick, receipt.state_hash_before, receipt.state_hash_after, receipt.converged
        );
        let commit_id = self.commit_file(&path, &message)?;

        tracing::debug!(tick = receipt.tick, commit = %commit_id, "lockchain appended");
        Ok(commit_id)
    }

    fn commit_file(&self, path: &Path, message: &str) -> LockchainResult<String> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|e| LockchainError::Git(format!("receipt path outside repo: {}", e)))?;

        let mut index = self.repo.index()?;
        index.add_path(relative)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let sig = Signature::now("KGCL Lockchain", "lockchain@kgcl.io")?;

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
        Ok(oid.to_string())
    }

    fn read_file(&self, path: &Path) -> LockchainResult<(TickReceipt, String)> {
        let content = fs::read_to_string(path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&content)
            .map_err(|e| LockchainError::Serialization(e.to_string()))?;

        let prev = value
            .get("prev_commit_hash")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                LockchainError::Serialization(format!(
                    "{} is missing prev_commit_hash",
                    path.display()
                ))
            })?
            .to_string();

        let receipt_value = value.get("receipt").ok_or_else(|| {
            LockchainError::Serialization(format!("{} is missing receipt", path.display()))
        })?;
        let receipt_yaml = serde_yaml::to_string(receipt_value)
            .map_err(|e| LockchainError::Serialization(e.to_string()))?;
        let receipt = TickReceipt::from_yaml(&receipt_yaml)?;

        Ok((receipt, prev))
    }

    fn receipt_files(&self) -> LockchainResult<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.lockchain_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("tick_") && n.ends_with(".yaml"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Receipts in chronological order, optionally the last `limit`
    pub fn chain(&self, limit: Option<usize>) -> LockchainResult<Vec<TickReceipt>> {
        let mut receipts = Vec::new();
        for path in self.receipt_files()? {
            let (receipt, _) = self.read_file(&path)?;
            receipts.push(receipt);
        }
        if let Some(n) = limit {
            let start = receipts.len().saturating_sub(n);
            receipts.drain(..start);
        }
        Ok(receipts)
    }

    /// Full chain entries with recomputed chain hashes
    pub fn entries(&self) -> LockchainResult<Vec<ChainEntry>> {
        let mut entries = Vec::new();
        for path in self.receipt_files()? {
            let (receipt, prev_commit_hash) = self.read_file(&path)?;
            let commit_hash = receipt.chain_hash(&prev_commit_hash);
            entries.push(ChainEntry {
                receipt,
                prev_commit_hash,
                commit_hash,
            });
        }
        Ok(entries)
    }

    /// Verify prev-hash linkage and state-hash continuity
    ///
    /// Returns the tick of the first broken receipt, or None when the chain
    /// is intact.
    pub fn verify_chain(&self) -> LockchainResult<Option<u64>> {
        let entries = self.entries()?;
        let mut running = GENESIS_HASH.to_string();
        let mut previous: Option<&ChainEntry> = None;

        for entry in &entries {
            if entry.prev_commit_hash != running {
                return Ok(Some(entry.receipt.tick));
            }
            if let Some(prev) = previous {
                if prev.receipt.state_hash_after != entry.receipt.state_hash_before {
                    return Ok(Some(entry.receipt.tick));
                }
            }
            running = entry.commit_hash.clone();
            previous = Some(entry);
        }
        Ok(None)
    }

    /// Number of receipts on disk
    pub fn len(&self) -> LockchainResult<usize> {
        Ok(self.receipt_files()?.len())
    }

    pub fn is_empty(&self) -> LockchainResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl std::fmt::Debug for LockchainWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockchainWriter")
            .field("lockchain_dir", &self.lockchain_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn git_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        Repository::init(dir.path()).unwrap();
        dir
    }

    fn receipt(tick: u64, before: &str, after: &str) -> TickReceipt {
        TickReceipt {
            tick,
            timestamp: Utc::now(),
            state_hash_before: before.to_string(),
            state_hash_after: after.to_string(),
            rules_fired: vec!["kgc:WCP1_Sequence".to_string()],
            triples_added: 2,
            triples_removed: 1,
            converged: false,
            hook_receipts: vec![],
        }
    }

    #[test]
    fn test_open_requires_git_repo() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            LockchainWriter::open(dir.path()),
            Err(LockchainError::NotARepository(_))
        ));
    }

    #[test]
    fn test_open_creates_lockchain_dir() {
        let dir = git_repo();
        let writer = LockchainWriter::open(dir.path()).unwrap();
        assert!(writer.lockchain_dir().exists());
        assert!(writer.lockchain_dir().ends_with(".kgc/lockchain"));
    }

    #[test]
    fn test_append_creates_file_and_commit() {
        let dir = git_repo();
        let mut writer = LockchainWriter::open(dir.path()).unwrap();

        let commit = writer
            .append(&receipt(1, "sha256:abc", "sha256:def"))
            .unwrap();
        assert_eq!(commit.len(), 40);

        let file = writer.lockchain_dir().join("tick_000001.yaml");
        assert!(file.exists());
        let content = fs::read_to_string(&file).unwrap();
        assert!(content.contains("tick: 1"));
        assert!(content.contains(&format!("prev_commit_hash: '{}'", GENESIS_HASH)));

        // The commit message carries the state transition
        let repo = Repository::open(dir.path()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        let message = head.message().unwrap();
        assert!(message.contains("lockchain: tick 1"));
        assert!(message.contains("state_before: sha256:abc"));
        assert!(message.contains("state_after:  sha256:def"));
        assert!(message.contains("converged: false"));
    }

    #[test]
    fn test_chain_chronological_and_limited() {
        let dir = git_repo();
        let mut writer = LockchainWriter::open(dir.path()).unwrap();

        let mut before = "sha256:h0".to_string();
        for i in 1..=5 {
            let after = format!("sha256:h{}", i);
            writer.append(&receipt(i, &before, &after)).unwrap();
            before = after;
        }

        let all = writer.chain(None).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].tick, 1);
        assert_eq!(all[4].tick, 5);

        let last_two = writer.chain(Some(2)).unwrap();
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].tick, 4);
        assert_eq!(last_two[1].tick, 5);
    }

    #[test]
    fn test_verify_empty_and_single() {
        let dir = git_repo();
        let mut writer = LockchainWriter::open(dir.path()).unwrap();
        assert_eq!(writer.verify_chain().unwrap(), None);

        writer
            .append(&receipt(1, "sha256:abc", "sha256:def"))
            .unwrap();
        assert_eq!(writer.verify_chain().unwrap(), None);
    }

    #[test]
    fn test_verify_valid_sequence() {
        let dir = git_repo();
        let mut writer = LockchainWriter::open(dir.path()).unwrap();

        writer.append(&receipt(1, "sha256:h0", "sha256:h1")).unwrap();
        writer.append(&receipt(2, "sha256:h1", "sha256:h2")).unwrap();
        writer.append(&receipt(3, "sha256:h2", "sha256:h3")).unwrap();

        assert_eq!(writer.verify_chain().unwrap(), None);
    }

    #[test]
    fn test_verify_detects_state_discontinuity() {
        let dir = git_repo();
        let mut writer = LockchainWriter::open(dir.path()).unwrap();

        writer.append(&receipt(1, "sha256:h0", "sha256:h1")).unwrap();
        // state_hash_before does not match the previous after
        writer.append(&receipt(2, "sha256:WRONG", "sha256:h2")).unwrap();

        assert_eq!(writer.verify_chain().unwrap(), Some(2));
    }

    #[test]
    fn test_verify_detects_file_tampering() {
        let dir = git_repo();
        let mut writer = LockchainWriter::open(dir.path()).unwrap();

        writer.append(&receipt(1, "sha256:h0", "sha256:h1")).unwrap();
        writer.append(&receipt(2, "sha256:h1", "sha256:h2")).unwrap();
        writer.append(&receipt(3, "sha256:h2", "sha256:h3")).unwrap();

        // Tamper tick 2's recorded state_hash_before
        let path = writer.lockchain_dir().join("tick_000002.yaml");
        let tampered = fs::read_to_string(&path)
            .unwrap()
            .replace("sha256:h1", "sha256:tampered");
        fs::write(&path, tampered).unwrap();

        assert_eq!(writer.verify_chain().unwrap(), Some(2));
    }

    #[test]
    fn test_append_is_reload_safe() {
        let dir = git_repo();
        {
            let mut writer = LockchainWriter::open(dir.path()).unwrap();
            writer.append(&receipt(1, "sha256:h0", "sha256:h1")).unwrap();
        }
        // Re-open and continue the chain
        let mut writer = LockchainWriter::open(dir.path()).unwrap();
        writer.append(&receipt(2, "sha256:h1", "sha256:h2")).unwrap();
        assert_eq!(writer.verify_chain().unwrap(), None);
        assert_eq!(writer.len().unwrap(), 2);
    }
}
