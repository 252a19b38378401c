// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cached address lookup with store-driven refresh.
//!
//! The first lookup of a service key installs a child watch and then reads
//! the store. Every watch event replaces the cached list with a new `Arc`,
//! which is what load balancers use to detect change. Entries are never
//! expired otherwise.
//!
//! A watch stream ends when the store session drops. The watch task then
//! re-subscribes with capped backoff, keeping the last known list in the
//! cache meanwhile, and reloads the children once the new watch is in.

use super::store::{ChildWatch, CoordinationStore};
use super::service_path;
use crate::error::RpcError;
use crate::loadbalance::LoadBalance;
use crate::protocol::RpcRequest;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const RESUBSCRIBE_BASE: Duration = Duration::from_millis(100);
const RESUBSCRIBE_MAX: Duration = Duration::from_secs(10);

/// Resolves service keys to provider addresses.
pub struct ServiceDiscovery {
    store: Arc<dyn CoordinationStore>,
    root: String,
    load_balance: Arc<dyn LoadBalance>,
    cache: Arc<DashMap<String, Arc<Vec<String>>>>,
    watched: DashSet<String>,
    watch_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ServiceDiscovery {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        root: impl Into<String>,
        load_balance: Arc<dyn LoadBalance>,
    ) -> Self {
        Self {
            store,
            root: root.into(),
            load_balance,
            cache: Arc::new(DashMap::new()),
            watched: DashSet::new(),
            watch_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Cached candidate list, if any.
    pub fn cached(&self, service: &str) -> Option<Arc<Vec<String>>> {
        self.cache.get(service).map(|list| Arc::clone(list.value()))
    }

    /// Full candidate list for `service`. An empty list is an error.
    pub async fn lookup(&self, service: &str) -> Result<Arc<Vec<String>>, RpcError> {
        if let Some(list) = self.cached(service) {
            return non_empty(service, list);
        }

        let path = service_path(&self.root, service);
        if self.watched.insert(service.to_string()) {
            match self.store.watch_children(&path).await {
                Ok(watch) => {
                    let handle = tokio::spawn(follow(
                        Arc::clone(&self.store),
                        Arc::clone(&self.cache),
                        service.to_string(),
                        watch,
                    ));
                    self.watch_tasks.lock().push(handle);
                }
                Err(e) => {
                    self.watched.remove(service);
                    return Err(e.into());
                }
            }
        }

        let children = self.store.children(&path).await?;
        // A watch event may have landed first; it is at least as fresh
        let list = Arc::clone(
            self.cache
                .entry(service.to_string())
                .or_insert_with(|| Arc::new(children))
                .value(),
        );
        non_empty(service, list)
    }

    /// Picks the provider for `request`.
    pub async fn resolve(&self, request: &RpcRequest) -> Result<SocketAddr, RpcError> {
        let service = request.rendered_service_key();
        let candidates = self.lookup(&service).await?;
        let address = self
            .load_balance
            .select(&candidates, request)
            .ok_or_else(|| RpcError::NoProviderAvailable(service.clone()))?;
        log::debug!("[DISCOVERY] {} -> {}", service, address);
        parse_address(&address).await
    }

    /// Stops all watch tasks.
    pub fn shutdown(&self) {
        for handle in self.watch_tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for ServiceDiscovery {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Applies watch events to the cache and re-subscribes whenever the
/// stream ends. Runs until aborted.
async fn follow(
    store: Arc<dyn CoordinationStore>,
    cache: Arc<DashMap<String, Arc<Vec<String>>>>,
    key: String,
    mut watch: ChildWatch,
) {
    let path = watch.path().to_string();
    loop {
        while let Some(children) = watch.changed().await {
            log::debug!("[DISCOVERY] {} now has {} provider(s)", key, children.len());
            cache.insert(key.clone(), Arc::new(children));
        }
        log::debug!("[DISCOVERY] watch for {} ended, re-subscribing", key);

        let mut delay = RESUBSCRIBE_BASE;
        watch = loop {
            match store.watch_children(&path).await {
                Ok(fresh) => break fresh,
                Err(e) => {
                    log::warn!(
                        "[DISCOVERY] re-subscribing to {} failed ({}), retrying in {:?}",
                        key,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(RESUBSCRIBE_MAX);
                }
            }
        };
        // Changes made while unsubscribed produce no event
        match store.children(&path).await {
            Ok(children) => {
                cache.insert(key.clone(), Arc::new(children));
            }
            Err(e) => log::warn!("[DISCOVERY] reload of {} failed: {}", key, e),
        }
    }
}

fn non_empty(service: &str, list: Arc<Vec<String>>) -> Result<Arc<Vec<String>>, RpcError> {
    if list.is_empty() {
        Err(RpcError::ServiceNotFound(service.to_string()))
    } else {
        Ok(list)
    }
}

async fn parse_address(address: &str) -> Result<SocketAddr, RpcError> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }
    tokio::net::lookup_host(address)
        .await
        .map_err(|_| RpcError::InvalidAddress(address.to_string()))?
        .next()
        .ok_or_else(|| RpcError::InvalidAddress(address.to_string()))
}
