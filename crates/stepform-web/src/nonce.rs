//! Nonces for step tokens, record ids and secret keys.

use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

pub trait NonceSource: Send + Sync {
    fn generate(&self) -> String;
}

/// Hex-encoded random bytes from the thread-local CSPRNG.
#[derive(Debug, Clone)]
pub struct RandomNonces {
    bytes: usize,
}

impl RandomNonces {
    pub fn new(bytes: usize) -> Self {
        Self {
            bytes: bytes.max(8),
        }
    }
}

impl Default for RandomNonces {
    fn default() -> Self {
        Self::new(16)
    }
}

impl NonceSource for RandomNonces {
    fn generate(&self) -> String {
        let mut buf = vec![0u8; self.bytes];
        rand::thread_rng().fill_bytes(&mut buf);
        hex::encode(buf)
    }
}

/// Predictable nonces (`{prefix}1`, `{prefix}2`, ...) for tests and
/// reproducible renders.
#[derive(Debug)]
pub struct SequentialNonces {
    prefix: String,
    next: AtomicU64,
}

impl SequentialNonces {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl NonceSource for SequentialNonces {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{n}", self.prefix)
    }
}

/// Digest stored in place of a secret key.
pub fn key_hash(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_nonces_are_hex_and_distinct() {
        let nonces = RandomNonces::default();
        let seen: HashSet<String> = (0..64).map(|_| nonces.generate()).collect();
        assert_eq!(seen.len(), 64);
        for n in &seen {
            assert_eq!(n.len(), 32);
            assert!(n.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_sequential_nonces() {
        let nonces = SequentialNonces::new("t");
        assert_eq!(nonces.generate(), "t1");
        assert_eq!(nonces.generate(), "t2");
    }

    #[test]
    fn test_key_hash_is_sha256_hex() {
        assert_eq!(
            key_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(key_hash("abc"), key_hash("abd"));
    }
}
