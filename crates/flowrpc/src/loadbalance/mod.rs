// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Provider selection over a discovered candidate list.

mod consistent_hash;

pub use consistent_hash::{ConsistentHashLoadBalance, HashRing, VIRTUAL_REPLICAS};

use crate::protocol::RpcRequest;
use std::sync::Arc;

/// Picks one address per call.
///
/// Candidate lists are shared `Arc`s handed out by discovery; their pointer
/// identity tells strategies whether the list changed.
pub trait LoadBalance: Send + Sync {
    /// Empty lists yield `None`; a single candidate is returned as is.
    fn select(&self, candidates: &Arc<Vec<String>>, request: &RpcRequest) -> Option<String> {
        match candidates.len() {
            0 => None,
            1 => Some(candidates[0].clone()),
            _ => self.do_select(candidates, request),
        }
    }

    /// Strategy proper, only called with two or more candidates.
    fn do_select(&self, candidates: &Arc<Vec<String>>, request: &RpcRequest) -> Option<String>;
}

/// Uniform random selection.
#[derive(Debug, Default)]
pub struct RandomLoadBalance;

impl LoadBalance for RandomLoadBalance {
    fn do_select(&self, candidates: &Arc<Vec<String>>, _request: &RpcRequest) -> Option<String> {
        candidates.get(fastrand::usize(..candidates.len())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServiceKey;
    use std::collections::HashSet;

    fn request() -> RpcRequest {
        RpcRequest::new(&ServiceKey::new("Greeter"), "hello", vec![], vec![])
    }

    struct Exploding;
    impl LoadBalance for Exploding {
        fn do_select(&self, _: &Arc<Vec<String>>, _: &RpcRequest) -> Option<String> {
            panic!("strategy must not run for degenerate lists");
        }
    }

    #[test]
    fn test_degenerate_lists_bypass_strategy() {
        let req = request();
        assert_eq!(Exploding.select(&Arc::new(vec![]), &req), None);
        assert_eq!(
            Exploding.select(&Arc::new(vec!["10.0.0.5:9998".to_string()]), &req),
            Some("10.0.0.5:9998".to_string())
        );
        assert_eq!(RandomLoadBalance.select(&Arc::new(vec![]), &req), None);
    }

    #[test]
    fn test_random_covers_candidates() {
        let req = request();
        let candidates = Arc::new(vec!["a:1".to_string(), "b:1".to_string(), "c:1".to_string()]);
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let pick = RandomLoadBalance.select(&candidates, &req).expect("pick");
            assert!(candidates.contains(&pick));
            seen.insert(pick);
        }
        assert_eq!(seen.len(), 3);
    }
}
