//! Deterministic key-to-index hashing
//!
//! Session affinity depends on every proxy instance mapping the same key to the
//! same member of a tier, so the hash is fixed: the first eight bytes of the
//! SHA-256 digest of the key, read big-endian, reduced modulo the tier size.
//! Never replace this with `std::hash` or anything seeded per process.

use sha2::{Digest, Sha256};

/// Stable hash over the raw bytes of a key
pub struct DeterministicHasher;

impl DeterministicHasher {
    /// 64-bit digest of `key`
    pub fn digest(key: &[u8]) -> u64 {
        let digest = Sha256::digest(key);
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix)
    }

    /// Index in `[0, n)` for `key`, or `None` when `n` is zero.
    pub fn select_index(key: &[u8], n: usize) -> Option<usize> {
        if n == 0 {
            return None;
        }
        Some((Self::digest(key) % n as u64) as usize)
    }
}
