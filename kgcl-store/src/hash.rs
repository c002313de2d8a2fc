//! Canonical N-Quads state hashing
//!
//! The state hash is SHA-256 over the lexicographically sorted N-Quads
//! rendering of the whole store, so it is deterministic over contents and
//! independent of insertion order.

use crate::store::{nquads_line, GraphStore};
use crate::StoreResult;
use sha2::{Digest, Sha256};

/// Sorted canonical N-Quads serialization of the store
pub fn canonical_nquads(store: &GraphStore) -> StoreResult<String> {
    let mut lines: Vec<String> = store.quads()?.iter().map(nquads_line).collect();
    lines.sort();
    Ok(lines.join("\n"))
}

/// State hash: `"sha256:" + hex(sha256(canonical_nquads))`
pub fn state_hash(store: &GraphStore) -> StoreResult<String> {
    let canonical = canonical_nquads(store)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

/// Blake3 canonical hash, for fast isomorphism checks
pub fn canonical_hash_blake3(store: &GraphStore) -> StoreResult<String> {
    let canonical = canonical_nquads(store)?;
    Ok(blake3::hash(canonical.as_bytes()).to_hex().to_string())
}
