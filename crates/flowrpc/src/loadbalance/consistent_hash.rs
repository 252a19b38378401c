// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Consistent hashing over a virtual node ring.
//!
//! Each address owns [`VIRTUAL_REPLICAS`] ring positions. Positions come in
//! groups of four: MD5 of `address + group index`, read as four little-endian
//! u32 words. Lookup takes the first position at or after the key hash and
//! wraps to the start of the ring.
//!
//! One ring is kept per service key. It is rebuilt when discovery hands out a
//! candidate list with a different identity (`Arc::ptr_eq`), never compared
//! by content. The ring holds the list it was built from, so that address
//! cannot be reused by a later list while the ring is cached.

use super::LoadBalance;
use crate::protocol::RpcRequest;
use dashmap::DashMap;
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ring positions per address.
pub const VIRTUAL_REPLICAS: usize = 160;

fn md5(key: &str) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(key.as_bytes());
    let mut out = [0u8; 16];
    out.copy_from_slice(&hasher.finalize());
    out
}

#[inline]
fn word(digest: &[u8; 16], idx: usize) -> u32 {
    let o = idx * 4;
    u32::from_le_bytes([digest[o], digest[o + 1], digest[o + 2], digest[o + 3]])
}

/// Immutable ring built from one candidate list.
#[derive(Debug, Clone)]
pub struct HashRing {
    ring: BTreeMap<u32, String>,
    source: Arc<Vec<String>>,
}

impl HashRing {
    pub fn build(candidates: &Arc<Vec<String>>) -> Self {
        let mut ring = BTreeMap::new();
        for address in candidates.iter() {
            for group in 0..VIRTUAL_REPLICAS / 4 {
                let digest = md5(&format!("{address}{group}"));
                for h in 0..4 {
                    ring.insert(word(&digest, h), address.clone());
                }
            }
        }
        Self {
            ring,
            source: Arc::clone(candidates),
        }
    }

    /// True when this ring was built from exactly `candidates`.
    #[inline]
    pub fn built_from(&self, candidates: &Arc<Vec<String>>) -> bool {
        Arc::ptr_eq(&self.source, candidates)
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Address owning `hash`.
    pub fn locate(&self, hash: u32) -> Option<&String> {
        self.ring
            .range(hash..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, address)| address)
    }

    /// Address owning the hash of `key`.
    pub fn select(&self, key: &str) -> Option<&String> {
        self.locate(word(&md5(key), 0))
    }
}

/// Consistent-hash strategy with one ring per service key.
#[derive(Debug, Default)]
pub struct ConsistentHashLoadBalance {
    selectors: DashMap<String, Arc<HashRing>>,
}

impl ConsistentHashLoadBalance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selection key: rendered service key followed by the parameters' JSON.
    fn selection_key(request: &RpcRequest) -> String {
        let mut key = request.rendered_service_key();
        for param in &request.parameters {
            key.push_str(&param.to_string());
        }
        key
    }

    fn ring_for(&self, service: &str, candidates: &Arc<Vec<String>>) -> Arc<HashRing> {
        if let Some(ring) = self.selectors.get(service) {
            if ring.built_from(candidates) {
                return Arc::clone(ring.value());
            }
        }
        // Rebuild under the entry lock so concurrent callers build once
        let mut entry = self
            .selectors
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(HashRing::build(candidates)));
        if !entry.built_from(candidates) {
            log::debug!(
                "[LB] rebuilding hash ring for {} ({} candidates)",
                service,
                candidates.len()
            );
            *entry = Arc::new(HashRing::build(candidates));
        }
        Arc::clone(entry.value())
    }
}

impl LoadBalance for ConsistentHashLoadBalance {
    fn do_select(&self, candidates: &Arc<Vec<String>>, request: &RpcRequest) -> Option<String> {
        let service = request.rendered_service_key();
        let ring = self.ring_for(&service, candidates);
        ring.select(&Self::selection_key(request)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServiceKey;
    use serde_json::json;

    fn request(param: &str) -> RpcRequest {
        RpcRequest::new(
            &ServiceKey::new("Greeter").with_version("v1"),
            "hello",
            vec!["string".into()],
            vec![json!(param)],
        )
    }

    fn candidates(n: usize) -> Arc<Vec<String>> {
        Arc::new((0..n).map(|i| format!("10.0.0.{i}:9998")).collect())
    }

    #[test]
    fn test_ring_size() {
        let ring = HashRing::build(&candidates(3));
        // Collisions across 480 u32 positions are practically impossible
        assert_eq!(ring.len(), 3 * VIRTUAL_REPLICAS);
    }

    #[test]
    fn test_same_identity_same_choice() {
        let lb = ConsistentHashLoadBalance::new();
        let list = candidates(5);
        let req = request("world");
        let first = lb.select(&list, &req).expect("pick");
        for _ in 0..50 {
            assert_eq!(lb.select(&list, &request("world")), Some(first.clone()));
        }
    }

    #[test]
    fn test_rebuild_on_new_identity() {
        let lb = ConsistentHashLoadBalance::new();
        let a = candidates(4);
        let b = Arc::new((*a).clone());
        lb.select(&a, &request("x"));
        let ring_a = lb.ring_for("Greeter::v1", &a);
        let ring_b = lb.ring_for("Greeter::v1", &b);
        assert!(ring_a.built_from(&a));
        assert!(ring_b.built_from(&b));
        assert!(!ring_b.built_from(&a));
        // Same content, same mapping
        assert_eq!(ring_a.select("k"), ring_b.select("k"));
    }

    #[test]
    fn test_replaced_list_never_serves_stale_addresses() {
        let lb = ConsistentHashLoadBalance::new();
        for round in 0..64 {
            let old: Arc<Vec<String>> =
                Arc::new((0..2).map(|i| format!("10.0.{round}.{i}:0")).collect());
            lb.select(&old, &request("world"));
            drop(old);
            // Same size as the dropped list, so the allocator may hand back its address
            let fresh: Arc<Vec<String>> =
                Arc::new((0..2).map(|i| format!("10.9.{round}.{i}:0")).collect());
            for i in 0..20 {
                let pick = lb.select(&fresh, &request(&format!("k{i}"))).expect("pick");
                assert!(fresh.contains(&pick), "round {round}: {pick} not in {fresh:?}");
            }
        }
    }

    #[test]
    fn test_wraparound() {
        let ring = HashRing::build(&candidates(2));
        let (&max, _) = ring.ring.iter().next_back().expect("non empty");
        let (_, first) = ring.ring.iter().next().expect("non empty");
        if max < u32::MAX {
            assert_eq!(ring.locate(max + 1), Some(first));
        }
        assert_eq!(ring.locate(0), Some(first));
    }

    #[test]
    fn test_bounded_redistribution() {
        let before = candidates(5);
        let mut grown = (*before).clone();
        grown.push("10.0.0.99:9998".to_string());
        let after = Arc::new(grown);

        let ring_before = HashRing::build(&before);
        let ring_after = HashRing::build(&after);
        let mut moved = 0;
        for i in 0..2000 {
            let key = format!("key-{i}");
            let old = ring_before.select(&key).expect("old");
            let new = ring_after.select(&key).expect("new");
            if old != new {
                assert_eq!(new, "10.0.0.99:9998");
                moved += 1;
            }
        }
        assert!(moved < 1000, "too many keys moved: {moved}");
    }
}
