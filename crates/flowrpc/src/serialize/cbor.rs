// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::Serializer;
use crate::error::PayloadError;
use crate::protocol::{RpcRequest, RpcResponse, SerializerKind};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Compact binary payloads via `ciborium`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CborSerializer;

fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, PayloadError> {
    let mut out = Vec::with_capacity(128);
    ciborium::ser::into_writer(value, &mut out).map_err(PayloadError::new)?;
    Ok(out)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PayloadError> {
    ciborium::de::from_reader(bytes).map_err(PayloadError::new)
}

impl Serializer for CborSerializer {
    fn kind(&self) -> SerializerKind {
        SerializerKind::Cbor
    }

    fn serialize_request(&self, request: &RpcRequest) -> Result<Vec<u8>, PayloadError> {
        to_cbor(request)
    }

    fn deserialize_request(&self, bytes: &[u8]) -> Result<RpcRequest, PayloadError> {
        from_cbor(bytes)
    }

    fn serialize_response(&self, response: &RpcResponse) -> Result<Vec<u8>, PayloadError> {
        to_cbor(response)
    }

    fn deserialize_response(&self, bytes: &[u8]) -> Result<RpcResponse, PayloadError> {
        from_cbor(bytes)
    }
}
