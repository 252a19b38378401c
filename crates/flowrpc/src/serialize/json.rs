// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::Serializer;
use crate::error::PayloadError;
use crate::protocol::{RpcRequest, RpcResponse, SerializerKind};

/// JSON payloads via `serde_json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn kind(&self) -> SerializerKind {
        SerializerKind::Json
    }

    fn serialize_request(&self, request: &RpcRequest) -> Result<Vec<u8>, PayloadError> {
        serde_json::to_vec(request).map_err(PayloadError::new)
    }

    fn deserialize_request(&self, bytes: &[u8]) -> Result<RpcRequest, PayloadError> {
        serde_json::from_slice(bytes).map_err(PayloadError::new)
    }

    fn serialize_response(&self, response: &RpcResponse) -> Result<Vec<u8>, PayloadError> {
        serde_json::to_vec(response).map_err(PayloadError::new)
    }

    fn deserialize_response(&self, bytes: &[u8]) -> Result<RpcResponse, PayloadError> {
        serde_json::from_slice(bytes).map_err(PayloadError::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServiceKey;
    use serde_json::json;

    #[test]
    fn test_json_request() {
        let req = RpcRequest::new(
            &ServiceKey::new("Greeter").with_version("v1"),
            "hello",
            vec!["string".into()],
            vec![json!("world")],
        );
        let bytes = JsonSerializer.serialize_request(&req).expect("serialize");
        assert_eq!(JsonSerializer.deserialize_request(&bytes).expect("deserialize"), req);
    }

    #[test]
    fn test_json_rejects_garbage() {
        assert!(JsonSerializer.deserialize_response(b"{not json").is_err());
    }
}
