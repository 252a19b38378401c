// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service registration and discovery over a coordination store.
//!
//! # Layout
//!
//! ```text
//! /flow-rpc                       root namespace
//!   /Greeter::v1                  one node per service key
//!     /10.0.0.5:9998              one persistent node per provider address
//! ```

mod discovery;
mod memory;
mod remote;
mod store;
pub mod wire;

pub use discovery::ServiceDiscovery;
pub use memory::MemoryStore;
pub use remote::{RemoteStore, RemoteStoreConfig};
pub use store::{validate_path, ChildWatch, CoordinationStore};

use crate::error::StoreError;
use dashmap::DashSet;
use std::sync::Arc;

/// Default root namespace.
pub const DEFAULT_ROOT: &str = "/flow-rpc";

/// Path of the per-service-key namespace.
pub fn service_path(root: &str, service: &str) -> String {
    format!("{}/{}", root.trim_end_matches('/'), service)
}

fn check_segment(segment: &str, full: &str) -> Result<(), StoreError> {
    if segment.is_empty() || segment.contains('/') {
        return Err(StoreError::InvalidPath(full.to_string()));
    }
    Ok(())
}

/// Publishes provider addresses and removes them again on shutdown.
///
/// Only paths created through this instance are ever deleted.
pub struct ServiceRegistry {
    store: Arc<dyn CoordinationStore>,
    root: String,
    registered: DashSet<String>,
}

impl ServiceRegistry {
    pub fn new(store: Arc<dyn CoordinationStore>, root: impl Into<String>) -> Self {
        Self {
            store,
            root: root.into(),
            registered: DashSet::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    /// Registers `address` (`host:port`) under `service`. Registering the
    /// same pair again is a no-op.
    pub async fn register(&self, service: &str, address: &str) -> Result<(), StoreError> {
        let path = format!("{}/{}", service_path(&self.root, service), address);
        check_segment(service, &path)?;
        check_segment(address, &path)?;

        if self.registered.contains(&path) {
            log::debug!("[REGISTRY] {} already registered", path);
            return Ok(());
        }
        if self.store.exists(&path).await? {
            log::debug!("[REGISTRY] {} already present in store", path);
        } else if self.store.create_persistent(&path).await? {
            log::info!("[REGISTRY] registered {} at {}", service, address);
        }
        self.registered.insert(path);
        Ok(())
    }

    /// Paths this instance has registered.
    pub fn registered_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.registered.iter().map(|p| p.clone()).collect();
        paths.sort();
        paths
    }

    /// Deletes every path this instance registered. Failures are logged and
    /// skipped. Returns the number of deleted nodes.
    pub async fn deregister_all(&self) -> usize {
        let mut deleted = 0;
        for path in self.registered_paths() {
            match self.store.delete(&path).await {
                Ok(()) => deleted += 1,
                Err(StoreError::NoNode(_)) => {}
                Err(e) => log::warn!("[REGISTRY] failed to deregister {}: {}", path, e),
            }
            self.registered.remove(&path);
        }
        if deleted > 0 {
            log::info!("[REGISTRY] deregistered {} address(es)", deleted);
        }
        deleted
    }
}
