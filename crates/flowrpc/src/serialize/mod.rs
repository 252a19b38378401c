// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Payload serializers selected by the `codec` header byte.

#[cfg(feature = "cbor")]
mod cbor;
mod json;

#[cfg(feature = "cbor")]
pub use cbor::CborSerializer;
pub use json::JsonSerializer;

use crate::error::PayloadError;
use crate::protocol::{RpcRequest, RpcResponse, SerializerKind};

/// Converts call payloads to and from bytes.
pub trait Serializer: Send + Sync {
    /// Identifier written to the frame header.
    fn kind(&self) -> SerializerKind;

    fn serialize_request(&self, request: &RpcRequest) -> Result<Vec<u8>, PayloadError>;

    fn deserialize_request(&self, bytes: &[u8]) -> Result<RpcRequest, PayloadError>;

    fn serialize_response(&self, response: &RpcResponse) -> Result<Vec<u8>, PayloadError>;

    fn deserialize_response(&self, bytes: &[u8]) -> Result<RpcResponse, PayloadError>;
}
