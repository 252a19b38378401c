// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Named-implementation loader with two cache levels.
//!
//! The `name -> implementation` table is read once from the manifest sources.
//! Each implementation is constructed at most once, so names that map to the
//! same implementation share one instance.

use super::manifest::{parse_manifest, ManifestSource};
use crate::error::ExtensionError;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Constructor for one implementation, given a construction context.
pub type Factory<T, C> = Arc<dyn Fn(&C) -> Result<Arc<T>, ExtensionError> + Send + Sync>;

type Holder<T> = Arc<Mutex<Option<Arc<T>>>>;

/// Resolves implementations of capability `T` by name.
pub struct ExtensionLoader<T: ?Sized, C = ()> {
    capability: &'static str,
    sources: Vec<ManifestSource>,
    factories: HashMap<String, Factory<T, C>>,
    names: RwLock<Option<Arc<HashMap<String, String>>>>,
    instances: DashMap<String, Holder<T>>,
}

impl<T: ?Sized + Send + Sync, C> ExtensionLoader<T, C> {
    pub fn new(capability: &'static str) -> Self {
        Self {
            capability,
            sources: Vec::new(),
            factories: HashMap::new(),
            names: RwLock::new(None),
            instances: DashMap::new(),
        }
    }

    /// Adds a manifest source. Later sources override earlier names.
    pub fn with_source(mut self, source: ManifestSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Registers the constructor for `implementation`.
    pub fn with_factory<F>(mut self, implementation: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&C) -> Result<Arc<T>, ExtensionError> + Send + Sync + 'static,
    {
        self.factories.insert(implementation.into(), Arc::new(factory));
        self
    }

    #[inline]
    pub fn capability(&self) -> &'static str {
        self.capability
    }

    /// Returns the cached instance for `name`, constructing it on first use.
    pub fn resolve(&self, name: &str, ctx: &C) -> Result<Arc<T>, ExtensionError> {
        if name.is_empty() {
            return Err(ExtensionError::EmptyName {
                capability: self.capability,
            });
        }
        let names = self.names()?;
        let implementation = names
            .get(name)
            .ok_or_else(|| ExtensionError::NoSuchExtension {
                capability: self.capability,
                name: name.to_string(),
            })?;

        let holder = self
            .instances
            .entry(implementation.clone())
            .or_default()
            .value()
            .clone();

        if let Some(instance) = holder.lock().as_ref() {
            return Ok(Arc::clone(instance));
        }

        let factory =
            self.factories
                .get(implementation)
                .ok_or_else(|| ExtensionError::UnknownImplementation {
                    capability: self.capability,
                    name: name.to_string(),
                    implementation: implementation.clone(),
                })?;

        let mut slot = holder.lock();
        if let Some(instance) = slot.as_ref() {
            return Ok(Arc::clone(instance));
        }
        let instance = factory(ctx)?;
        log::debug!(
            "[EXT] {} '{}' -> {} constructed",
            self.capability,
            name,
            implementation
        );
        *slot = Some(Arc::clone(&instance));
        Ok(instance)
    }

    /// All extension names known for this capability.
    pub fn names(&self) -> Result<Arc<HashMap<String, String>>, ExtensionError> {
        if let Some(names) = self.names.read().as_ref() {
            return Ok(Arc::clone(names));
        }
        let mut guard = self.names.write();
        if let Some(names) = guard.as_ref() {
            return Ok(Arc::clone(names));
        }
        let mut table = HashMap::new();
        for source in &self.sources {
            if let Some(text) = source.read(self.capability)? {
                table.extend(parse_manifest(&text));
            }
        }
        log::debug!(
            "[EXT] loaded {} extension names for {}",
            table.len(),
            self.capability
        );
        let table = Arc::new(table);
        *guard = Some(Arc::clone(&table));
        Ok(table)
    }
}

impl<T: ?Sized, C> std::fmt::Debug for ExtensionLoader<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionLoader")
            .field("capability", &self.capability)
            .field("sources", &self.sources)
            .field("instances", &self.instances.len())
            .finish()
    }
}
