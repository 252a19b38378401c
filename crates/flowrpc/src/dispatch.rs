// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server-side request dispatch.

use crate::protocol::{RpcRequest, RpcResponse};
use crate::provider::ServiceProvider;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Why a request could not be served.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("method not found: {service}.{method}({})", param_types.join(", "))]
    MethodNotFound {
        service: String,
        method: String,
        param_types: Vec<String>,
    },

    #[error("invocation of {method} failed: {message}")]
    InvocationFailed { method: String, message: String },
}

/// Resolves a request to a published method and runs it.
#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    provider: Arc<ServiceProvider>,
}

impl RequestDispatcher {
    pub fn new(provider: Arc<ServiceProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<ServiceProvider> {
        &self.provider
    }

    /// Runs the method named by `request`. Handler panics are caught and
    /// reported as invocation failures.
    pub fn invoke(&self, request: &RpcRequest) -> Result<Value, DispatchError> {
        let service = request.rendered_service_key();
        let definition = self
            .provider
            .get(&service)
            .ok_or_else(|| DispatchError::ServiceNotFound(service.clone()))?;
        let method = definition
            .find(&request.method_name, &request.param_types)
            .ok_or_else(|| DispatchError::MethodNotFound {
                service: service.clone(),
                method: request.method_name.clone(),
                param_types: request.param_types.clone(),
            })?;

        let parameters = request.parameters.clone();
        let outcome = catch_unwind(AssertUnwindSafe(|| method(parameters)));
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DispatchError::InvocationFailed {
                method: request.method_name.clone(),
                message: e.to_string(),
            }),
            Err(panic) => Err(DispatchError::InvocationFailed {
                method: request.method_name.clone(),
                message: panic_message(&*panic),
            }),
        }
    }

    /// Runs the request and wraps the outcome into a response.
    pub fn handle(&self, request: &RpcRequest) -> RpcResponse {
        match self.invoke(request) {
            Ok(value) => RpcResponse::success(request.request_id.clone(), value),
            Err(e) => {
                log::warn!("[DISPATCH] request {} failed: {}", request.request_id, e);
                RpcResponse::fail(Some(request.request_id.clone()), e.to_string())
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}
