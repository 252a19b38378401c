// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Coordination store abstraction.

use crate::error::StoreError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Stream of full child lists for one watched path.
#[derive(Debug)]
pub struct ChildWatch {
    path: String,
    rx: mpsc::UnboundedReceiver<Vec<String>>,
}

impl ChildWatch {
    pub fn new(path: impl Into<String>, rx: mpsc::UnboundedReceiver<Vec<String>>) -> Self {
        Self {
            path: path.into(),
            rx,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Next child list, or `None` once the store stops delivering events.
    pub async fn changed(&mut self) -> Option<Vec<String>> {
        self.rx.recv().await
    }
}

/// Hierarchical store holding service registrations.
///
/// Paths are absolute and `/`-separated. Only persistent nodes exist.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Creates `path` and any missing parents. Returns `false` if it already
    /// existed.
    async fn create_persistent(&self, path: &str) -> Result<bool, StoreError>;

    async fn exists(&self, path: &str) -> Result<bool, StoreError>;

    /// Direct child names of `path`; empty when the path does not exist.
    async fn children(&self, path: &str) -> Result<Vec<String>, StoreError>;

    /// Deletes a leaf node.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Subscribes to child list changes of `path`.
    async fn watch_children(&self, path: &str) -> Result<ChildWatch, StoreError>;

    /// Releases the store connection.
    async fn close(&self) {}
}

/// Checks an absolute node path.
pub fn validate_path(path: &str) -> Result<(), StoreError> {
    if path == "/" {
        return Ok(());
    }
    if !path.starts_with('/') || path.ends_with('/') || path.contains("//") {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Parent of an absolute path (`/` for top level nodes).
pub fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(validate_path("/").is_ok());
        assert!(validate_path("/flow-rpc/Greeter::v1/10.0.0.5:9998").is_ok());
        assert!(validate_path("flow-rpc").is_err());
        assert!(validate_path("/flow-rpc/").is_err());
        assert!(validate_path("/a//b").is_err());
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/"), None);
        assert_eq!(parent_of("/flow-rpc"), Some("/"));
        assert_eq!(parent_of("/flow-rpc/key"), Some("/flow-rpc"));
    }
}
