// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-flight calls keyed by correlation id.

use crate::protocol::RpcResponse;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::oneshot;

/// A response arrived for a correlation id nobody is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unmatched response for correlation id {correlation_id}")]
pub struct UnmatchedResponse {
    pub correlation_id: u32,
}

/// Result slots of outstanding calls. Each entry is removed exactly once,
/// on completion or cancellation.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: DashMap<u32, oneshot::Sender<RpcResponse>>,
    unmatched: AtomicU64,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, correlation_id: u32, slot: oneshot::Sender<RpcResponse>) {
        if self.calls.insert(correlation_id, slot).is_some() {
            log::warn!(
                "[PENDING] correlation id {} reused while still in flight",
                correlation_id
            );
        }
    }

    /// Resolves the slot registered under `correlation_id`.
    pub fn complete(
        &self,
        correlation_id: u32,
        response: RpcResponse,
    ) -> Result<(), UnmatchedResponse> {
        match self.calls.remove(&correlation_id) {
            Some((_, slot)) => {
                if slot.send(response).is_err() {
                    log::debug!("[PENDING] caller for {} went away", correlation_id);
                }
                Ok(())
            }
            None => {
                self.unmatched.fetch_add(1, Ordering::Relaxed);
                Err(UnmatchedResponse { correlation_id })
            }
        }
    }

    /// Drops a slot without resolving it. Returns whether it was present.
    pub fn cancel(&self, correlation_id: u32) -> bool {
        self.calls.remove(&correlation_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Responses that matched no slot so far.
    pub fn unmatched_count(&self) -> u64 {
        self.unmatched.load(Ordering::Relaxed)
    }
}
