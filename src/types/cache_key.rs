//! Cache entry keys (`spec.md` §3 "Cache entries").
//!
//! Key: `(namespace, stable-hash-of-parameters)`. The hash must be stable
//! across process restarts (unlike `std::collections::hash_map`'s default
//! hasher, which is randomly seeded), so parameters are hashed with a
//! fixed-seed `DefaultHasher`-free approach: serialize to canonical JSON,
//! then FNV-1a.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub namespace: &'static str,
    pub params_hash: u64,
}

impl CacheKey {
    pub fn new<P: Serialize>(namespace: &'static str, params: &P) -> Self {
        let canonical = serde_json::to_vec(params).unwrap_or_default();
        Self {
            namespace,
            params_hash: fnv1a(&canonical),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:016x}", self.namespace, self.params_hash)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Params {
        limit: u32,
    }

    #[test]
    fn identical_params_hash_identically() {
        let a = CacheKey::new("recent_detections", &Params { limit: 10 });
        let b = CacheKey::new("recent_detections", &Params { limit: 10 });
        assert_eq!(a, b);
    }

    #[test]
    fn different_params_hash_differently() {
        let a = CacheKey::new("recent_detections", &Params { limit: 10 });
        let b = CacheKey::new("recent_detections", &Params { limit: 11 });
        assert_ne!(a, b);
    }
}
