// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process node tree. Also the storage backend of the registry server.

use super::store::{parent_of, validate_path, ChildWatch, CoordinationStore};
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::mpsc;

/// Persistent node tree with child watches.
#[derive(Debug, Default)]
pub struct MemoryStore {
    nodes: RwLock<BTreeSet<String>>,
    watchers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Vec<String>>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, path: &str) -> Result<bool, StoreError> {
        validate_path(path)?;
        if path == "/" {
            return Ok(false);
        }
        let mut changed_parents = Vec::new();
        {
            let mut nodes = self.nodes.write();
            if nodes.contains(path) {
                return Ok(false);
            }
            let mut current = Some(path);
            while let Some(node) = current {
                if node == "/" || nodes.contains(node) {
                    break;
                }
                nodes.insert(node.to_string());
                if let Some(parent) = parent_of(node) {
                    changed_parents.push(parent.to_string());
                }
                current = parent_of(node);
            }
        }
        for parent in changed_parents {
            self.notify(&parent);
        }
        Ok(true)
    }

    pub fn contains(&self, path: &str) -> bool {
        path == "/" || self.nodes.read().contains(path)
    }

    pub fn list_children(&self, path: &str) -> Vec<String> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        let nodes = self.nodes.read();
        nodes
            .range(prefix.clone()..)
            .take_while(|node| node.starts_with(&prefix))
            .filter_map(|node| {
                let rest = &node[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }

    pub fn remove(&self, path: &str) -> Result<(), StoreError> {
        validate_path(path)?;
        {
            let mut nodes = self.nodes.write();
            if !nodes.contains(path) {
                return Err(StoreError::NoNode(path.to_string()));
            }
            let prefix = format!("{path}/");
            if nodes
                .range(prefix.clone()..)
                .next()
                .is_some_and(|n| n.starts_with(&prefix))
            {
                return Err(StoreError::NotEmpty(path.to_string()));
            }
            nodes.remove(path);
        }
        if let Some(parent) = parent_of(path) {
            self.notify(parent);
        }
        Ok(())
    }

    /// Registers a child watch on `path`.
    pub fn subscribe(&self, path: &str) -> Result<ChildWatch, StoreError> {
        validate_path(path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers
            .lock()
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok(ChildWatch::new(path, rx))
    }

    /// Number of live watches on `path`.
    pub fn watch_count(&self, path: &str) -> usize {
        self.watchers
            .lock()
            .get(path)
            .map_or(0, |w| w.iter().filter(|tx| !tx.is_closed()).count())
    }

    fn notify(&self, parent: &str) {
        let children = self.list_children(parent);
        let mut watchers = self.watchers.lock();
        if let Some(senders) = watchers.get_mut(parent) {
            senders.retain(|tx| tx.send(children.clone()).is_ok());
            if senders.is_empty() {
                watchers.remove(parent);
            }
        }
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn create_persistent(&self, path: &str) -> Result<bool, StoreError> {
        self.create(path)
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        validate_path(path)?;
        Ok(self.contains(path))
    }

    async fn children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        validate_path(path)?;
        Ok(self.list_children(path))
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.remove(path)
    }

    async fn watch_children(&self, path: &str) -> Result<ChildWatch, StoreError> {
        self.subscribe(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_idempotent() {
        let store = MemoryStore::new();
        assert!(store.create("/flow-rpc/Greeter::v1/10.0.0.5:9998").expect("create"));
        assert!(!store.create("/flow-rpc/Greeter::v1/10.0.0.5:9998").expect("again"));
        assert!(store.contains("/flow-rpc"));
        assert!(store.contains("/flow-rpc/Greeter::v1"));
        assert_eq!(store.list_children("/flow-rpc/Greeter::v1"), vec!["10.0.0.5:9998"]);
    }

    #[test]
    fn test_children_are_direct_only() {
        let store = MemoryStore::new();
        store.create("/r/a/x").expect("create");
        store.create("/r/b").expect("create");
        store.create("/rx").expect("create");
        assert_eq!(store.list_children("/r"), vec!["a", "b"]);
        assert_eq!(store.list_children("/"), vec!["r", "rx"]);
        assert!(store.list_children("/missing").is_empty());
    }

    #[test]
    fn test_delete_rules() {
        let store = MemoryStore::new();
        store.create("/r/a").expect("create");
        assert_eq!(store.remove("/r"), Err(StoreError::NotEmpty("/r".into())));
        assert_eq!(store.remove("/r/zz"), Err(StoreError::NoNode("/r/zz".into())));
        store.remove("/r/a").expect("delete leaf");
        assert!(!store.contains("/r/a"));
        assert!(store.contains("/r"));
    }

    #[tokio::test]
    async fn test_watch_receives_child_lists() {
        let store = MemoryStore::new();
        store.create("/r/svc/a:1").expect("create");
        let mut watch = store.subscribe("/r/svc").expect("watch");

        store.create("/r/svc/b:1").expect("create");
        assert_eq!(watch.changed().await, Some(vec!["a:1".to_string(), "b:1".to_string()]));

        store.remove("/r/svc/a:1").expect("delete");
        assert_eq!(watch.changed().await, Some(vec!["b:1".to_string()]));
    }

    #[tokio::test]
    async fn test_dropped_watch_is_pruned() {
        let store = MemoryStore::new();
        let watch = store.subscribe("/r").expect("watch");
        assert_eq!(store.watch_count("/r"), 1);
        drop(watch);
        store.create("/r/a").expect("create");
        assert_eq!(store.watch_count("/r"), 0);
    }
}
