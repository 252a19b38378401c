// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Published services and their method tables.
//!
//! A [`ServiceDefinition`] maps `(method name, parameter descriptors)` to a
//! typed closure, built once at publish time.
//!
//! ```
//! use flowrpc::{HandlerError, ServiceDefinition};
//!
//! let greeter = ServiceDefinition::new("Greeter")
//!     .method("hello", |(name,): (String,)| Ok::<_, HandlerError>(format!("hello {name}")));
//! assert_eq!(greeter.len(), 1);
//! ```

use crate::params::ParamTuple;
use crate::protocol::ServiceKey;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Error returned by a handler method.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure while running a bound method.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("bad arguments: {0}")]
    BadArguments(String),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error("failed to encode result: {0}")]
    Result(String),
}

/// Method name plus parameter type descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub name: String,
    pub param_types: Vec<String>,
}

type Method = Arc<dyn Fn(Vec<Value>) -> Result<Value, InvokeError> + Send + Sync>;

/// Method table of one service implementation.
pub struct ServiceDefinition {
    interface: String,
    /// name -> parameter descriptors -> method
    methods: HashMap<String, HashMap<Vec<String>, Method>>,
}

impl ServiceDefinition {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            methods: HashMap::new(),
        }
    }

    /// Binds `name` with the parameter types of `P`.
    pub fn method<P, R, F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        P: ParamTuple + 'static,
        R: Serialize,
        F: Fn(P) -> Result<R, HandlerError> + Send + Sync + 'static,
    {
        let method: Method = Arc::new(move |values: Vec<Value>| {
            let params = P::from_values(values).map_err(InvokeError::BadArguments)?;
            let result = handler(params)?;
            serde_json::to_value(result).map_err(|e| InvokeError::Result(e.to_string()))
        });
        self.methods
            .entry(name.into())
            .or_default()
            .insert(P::type_descriptors(), method);
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Number of bound signatures.
    pub fn len(&self) -> usize {
        self.methods.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn signatures(&self) -> Vec<MethodSignature> {
        let mut out: Vec<MethodSignature> = self
            .methods
            .iter()
            .flat_map(|(name, overloads)| {
                overloads.keys().map(move |param_types| MethodSignature {
                    name: name.clone(),
                    param_types: param_types.clone(),
                })
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.param_types.cmp(&b.param_types)));
        out
    }

    pub(crate) fn find(&self, name: &str, param_types: &[String]) -> Option<&Method> {
        self.methods.get(name)?.get(param_types)
    }
}

impl std::fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("interface", &self.interface)
            .field("methods", &self.signatures())
            .finish()
    }
}

/// Registry of published service implementations, keyed by rendered
/// service key.
#[derive(Debug, Default)]
pub struct ServiceProvider {
    services: DashMap<String, Arc<ServiceDefinition>>,
}

impl ServiceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a service. The first definition for a key wins.
    pub fn add(&self, key: &ServiceKey, definition: ServiceDefinition) -> bool {
        let rendered = key.rendered();
        match self.services.entry(rendered) {
            dashmap::mapref::entry::Entry::Occupied(e) => {
                log::warn!("[PROVIDER] service {} already published, ignoring", e.key());
                false
            }
            dashmap::mapref::entry::Entry::Vacant(e) => {
                log::info!(
                    "[PROVIDER] added service {} ({} methods)",
                    e.key(),
                    definition.len()
                );
                e.insert(Arc::new(definition));
                true
            }
        }
    }

    pub fn get(&self, rendered_key: &str) -> Option<Arc<ServiceDefinition>> {
        self.services.get(rendered_key).map(|d| Arc::clone(d.value()))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn greeter() -> ServiceDefinition {
        ServiceDefinition::new("Greeter")
            .method("hello", |(name,): (String,)| Ok(format!("hello {name}")))
            .method("hello", |(name, n): (String, u32)| Ok(format!("hello {name} x{n}")))
            .method("fail", |(): ()| Err::<(), _>(HandlerError::new("nope")))
    }

    #[test]
    fn test_overloads_by_signature() {
        let def = greeter();
        assert_eq!(def.len(), 3);
        let one = def.find("hello", &<(String,)>::type_descriptors()).expect("one");
        assert_eq!(one(vec![json!("world")]), Ok(json!("hello world")));
        let two = def
            .find("hello", &<(String, u32)>::type_descriptors())
            .expect("two");
        assert_eq!(two(vec![json!("w"), json!(2)]), Ok(json!("hello w x2")));
        assert!(def.find("hello", &<(u32,)>::type_descriptors()).is_none());
    }

    #[test]
    fn test_signatures_listing() {
        let sigs = greeter().signatures();
        assert_eq!(sigs.len(), 3);
        assert_eq!(sigs[0].name, "fail");
        assert!(sigs[0].param_types.is_empty());
    }

    #[test]
    fn test_handler_error_passes_through() {
        let def = greeter();
        let fail = def.find("fail", &[]).expect("fail");
        assert_eq!(
            fail(vec![]),
            Err(InvokeError::Handler(HandlerError::new("nope")))
        );
    }

    #[test]
    fn test_provider_first_wins() {
        let provider = ServiceProvider::new();
        let key = ServiceKey::new("Greeter").with_version("v1");
        assert!(provider.add(&key, greeter()));
        assert!(!provider.add(&key, ServiceDefinition::new("Greeter")));
        assert_eq!(provider.get("Greeter::v1").expect("get").len(), 3);
        assert!(provider.get("Greeter::v2").is_none());
    }
}
