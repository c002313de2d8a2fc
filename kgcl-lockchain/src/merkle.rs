//! Merkle anchoring
//!
//! A Merkle tree over a batch of receipt hashes binds the batch to a graph
//! version. Leaves are sha256 of the input bytes; internal nodes are
//! sha256(left || right), duplicating the last node when a level is odd.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn sha256_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Anchor binding a batch root to a graph version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerkleAnchor {
    pub root_hash: String,
    pub graph_version: u64,
    pub timestamp: DateTime<Utc>,
}

/// Merkle tree built bottom-up over leaf hashes
#[derive(Debug, Default)]
pub struct MerkleTree {
    leaves: Vec<[u8; 32]>,
    root: [u8; 32],
}

impl MerkleTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash `data` and append it as a leaf; returns the leaf hash
    pub fn add_leaf(&mut self, data: &[u8]) -> [u8; 32] {
        let leaf = sha256(data);
        self.leaves.push(leaf);
        leaf
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Compute the root: hash pairs level by level, duplicating an odd tail
    pub fn compute_root(&mut self) -> [u8; 32] {
        if self.leaves.is_empty() {
            self.root = [0u8; 32];
            return self.root;
        }

        let mut level = self.leaves.clone();
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let right = pair.get(1).unwrap_or(&pair[0]);
                next.push(sha256_pair(&pair[0], right));
            }
            level = next;
        }
        self.root = level[0];
        self.root
    }

    pub fn root(&self) -> [u8; 32] {
        self.root
    }

    /// Sibling path from a leaf up to the root
    pub fn generate_proof(&self, leaf_index: usize) -> Option<MerkleProof> {
        if leaf_index >= self.leaves.len() {
            return None;
        }

        let mut proof_hashes = Vec::new();
        let mut index = leaf_index;
        let mut level = self.leaves.clone();

        while level.len() > 1 {
            let sibling = if index % 2 == 0 { index + 1 } else { index - 1 };
            proof_hashes.push(if sibling < level.len() {
                level[sibling]
            } else {
                level[index]
            });

            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let right = pair.get(1).unwrap_or(&pair[0]);
                next.push(sha256_pair(&pair[0], right));
            }
            index /= 2;
            level = next;
        }

        Some(MerkleProof {
            leaf_index,
            leaf_hash: self.leaves[leaf_index],
            proof_hashes,
            root: self.root,
        })
    }

    /// Anchor the current root to a graph version
    pub fn anchor(&self, graph_version: u64) -> MerkleAnchor {
        MerkleAnchor {
            root_hash: hex::encode(self.root),
            graph_version,
            timestamp: Utc::now(),
        }
    }

    pub fn reset(&mut self) {
        self.leaves.clear();
        self.root = [0u8; 32];
    }
}

/// Inclusion proof for a single leaf
#[derive(Debug, Clone)]
pub struct MerkleProof {
    pub leaf_index: usize,
    pub leaf_hash: [u8; 32],
    pub proof_hashes: Vec<[u8; 32]>,
    pub root: [u8; 32],
}

impl MerkleProof {
    /// Reconstruct the root from the leaf and sibling hashes
    pub fn verify(&self) -> bool {
        let mut hash = self.leaf_hash;
        let mut index = self.leaf_index;
        for sibling in &self.proof_hashes {
            hash = if index % 2 == 0 {
                sha256_pair(&hash, sibling)
            } else {
                sha256_pair(sibling, &hash)
            };
            index /= 2;
        }
        hash == self.root
    }
}
