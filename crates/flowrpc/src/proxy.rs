// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed call surface over a request transport.

use crate::error::RpcError;
use crate::params::ParamTuple;
use crate::protocol::{RpcRequest, RpcResponse, ServiceKey};
use crate::transport::RpcRequestTransport;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Turns method calls on one service key into requests and checks the
/// responses.
///
/// Wrap a proxy in a small typed adapter to get a local-looking API:
///
/// ```no_run
/// use flowrpc::{RpcClientProxy, RpcError};
///
/// struct GreeterClient(RpcClientProxy);
///
/// impl GreeterClient {
///     async fn hello(&self, name: &str) -> Result<String, RpcError> {
///         self.0.call("hello", (name.to_string(),)).await
///     }
/// }
/// ```
#[derive(Clone)]
pub struct RpcClientProxy {
    key: ServiceKey,
    transport: Arc<dyn RpcRequestTransport>,
    call_timeout: Duration,
}

impl RpcClientProxy {
    pub fn new(
        key: ServiceKey,
        transport: Arc<dyn RpcRequestTransport>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            key,
            transport,
            call_timeout,
        }
    }

    pub fn service_key(&self) -> &ServiceKey {
        &self.key
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Calls `method` with `params` and decodes the returned value.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: ParamTuple,
        R: DeserializeOwned,
    {
        let values = params.into_values().map_err(|e| {
            RpcError::Serialization(format!(
                "cannot encode arguments of {}.{}: {}",
                self.key, method, e
            ))
        })?;
        let request = RpcRequest::new(&self.key, method, P::type_descriptors(), values);
        let value = self.call_raw(request).await?;
        serde_json::from_value(value).map_err(|e| {
            RpcError::Serialization(format!(
                "cannot decode result of {}.{}: {}",
                self.key, method, e
            ))
        })
    }

    /// Sends a prepared request and returns the raw result value.
    pub async fn call_raw(&self, request: RpcRequest) -> Result<Value, RpcError> {
        let future = self.transport.send_request(request.clone()).await?;
        let response = future.wait(self.call_timeout).await?;
        check(&request, response)
    }
}

impl std::fmt::Debug for RpcClientProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClientProxy")
            .field("key", &self.key)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

/// Validates a response against the request it answers.
pub fn check(request: &RpcRequest, response: Option<RpcResponse>) -> Result<Value, RpcError> {
    let response = response.ok_or_else(|| RpcError::NoResponse(request.rendered_service_key()))?;

    if response.request_id.as_deref() != Some(request.request_id.as_str()) {
        // A failure without an id is a frame-level fault reported by the peer
        if response.request_id.is_none() && !response.is_success() {
            return Err(invocation_failed(request, &response));
        }
        return Err(RpcError::RequestMismatch {
            request: request.request_id.clone(),
            response: response.request_id,
        });
    }

    if !response.is_success() {
        return Err(invocation_failed(request, &response));
    }
    Ok(response.data.unwrap_or(Value::Null))
}

fn invocation_failed(request: &RpcRequest, response: &RpcResponse) -> RpcError {
    RpcError::InvocationFailed {
        service: request.rendered_service_key(),
        method: request.method_name.clone(),
        code: response.code,
        message: response.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ResponseFuture;
    use async_trait::async_trait;
    use serde_json::json;

    fn request() -> RpcRequest {
        let key = ServiceKey::new("Greeter").with_version("v1");
        RpcRequest::new(&key, "hello", vec!["String".into()], vec![json!("world")])
    }

    #[test]
    fn test_check_success() {
        let req = request();
        let resp = RpcResponse::success(req.request_id.clone(), json!("hello world"));
        assert_eq!(check(&req, Some(resp)).expect("ok"), json!("hello world"));
    }

    #[test]
    fn test_check_no_response() {
        let err = check(&request(), None).expect_err("none");
        assert!(matches!(err, RpcError::NoResponse(ref s) if s == "Greeter::v1"));
    }

    #[test]
    fn test_check_mismatched_id() {
        let req = request();
        let resp = RpcResponse::success("someone-else", json!(1));
        let err = check(&req, Some(resp)).expect_err("mismatch");
        assert!(matches!(err, RpcError::RequestMismatch { .. }));
    }

    #[test]
    fn test_check_failure_code() {
        let req = request();
        let resp = RpcResponse::fail(Some(req.request_id.clone()), "boom");
        match check(&req, Some(resp)).expect_err("fail") {
            RpcError::InvocationFailed {
                service,
                method,
                code,
                message,
            } => {
                assert_eq!(service, "Greeter::v1");
                assert_eq!(method, "hello");
                assert_eq!(code, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_check_missing_data_is_null() {
        let req = request();
        let mut resp = RpcResponse::success(req.request_id.clone(), json!(null));
        resp.data = None;
        assert_eq!(check(&req, Some(resp)).expect("ok"), Value::Null);
    }

    struct Echo;

    #[async_trait]
    impl RpcRequestTransport for Echo {
        async fn send_request(&self, request: RpcRequest) -> Result<ResponseFuture, RpcError> {
            let joined = request
                .parameters
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",");
            Ok(ResponseFuture::ready(RpcResponse::success(
                request.request_id,
                json!(joined),
            )))
        }
    }

    #[tokio::test]
    async fn test_typed_call() {
        let proxy = RpcClientProxy::new(
            ServiceKey::new("Echo"),
            Arc::new(Echo),
            Duration::from_secs(1),
        );
        let out: String = proxy.call("echo", (1u32, "x".to_string())).await.expect("call");
        assert_eq!(out, "1,\"x\"");
    }

    #[tokio::test]
    async fn test_typed_call_decode_error() {
        let proxy = RpcClientProxy::new(
            ServiceKey::new("Echo"),
            Arc::new(Echo),
            Duration::from_secs(1),
        );
        let err = proxy.call::<_, u64>("echo", (1u32,)).await.expect_err("decode");
        assert!(matches!(err, RpcError::Serialization(_)));
    }
}
