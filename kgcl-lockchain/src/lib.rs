//! Lockchain: hash-chained, git-backed tick receipts
//!
//! Every tick emits a receipt; receipts chain through SHA-256 over their
//! canonical YAML plus the previous chain hash, and each receipt file is
//! committed to a git object database so the audit trail is tamper-evident
//! from two directions at once.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod merkle;
pub mod receipt;
pub mod writer;

pub use merkle::{MerkleAnchor, MerkleProof, MerkleTree};
pub use receipt::{HookReceiptSummary, TickReceipt};
pub use writer::{ChainEntry, LockchainWriter};

use thiserror::Error;

/// Fixed published constant: `prev_commit_hash` of the first receipt
pub const GENESIS_HASH: &str = "4d7c606c9002d3043ee3979533922e25752bd2755709057060b553593605bd62";

/// Result type for lockchain operations
pub type LockchainResult<T> = Result<T, LockchainError>;

/// Errors raised by the lockchain
#[derive(Debug, Error)]
pub enum LockchainError {
    /// The target directory is not a git repository
    #[error("Not a git repository: {0}")]
    NotARepository(String),

    /// Git plumbing failure
    #[error("Git error: {0}")]
    Git(String),

    /// Receipt file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Receipt YAML could not be parsed
    #[error("Invalid receipt YAML: {0}")]
    Serialization(String),

    /// Chain verification found a broken link
    #[error("Chain broken at tick {tick}: {reason}")]
    ChainBroken { tick: u64, reason: String },
}

impl From<git2::Error> for LockchainError {
    fn from(err: git2::Error) -> Self {
        LockchainError::Git(err.to_string())
    }
}
