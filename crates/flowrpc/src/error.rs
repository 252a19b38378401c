// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types, one enum per layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for RPC operations
pub type RpcResult<T> = Result<T, RpcError>;

/// Wire codec errors.
///
/// Protocol faults make the byte stream unreadable and must close the
/// connection. Frame faults only lose one frame.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("bad magic {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("frame length {len} exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("frame length {0} shorter than header")]
    FrameTooShort(usize),

    #[error("unknown message type {kind} (correlation {correlation_id})")]
    UnknownMessageType { kind: u8, correlation_id: u32 },

    #[error("unknown serializer id {id} (correlation {correlation_id})")]
    UnknownSerializer { id: u8, correlation_id: u32 },

    #[error("unknown compressor id {id} (correlation {correlation_id})")]
    UnknownCompressor { id: u8, correlation_id: u32 },

    #[error("frame stream unusable after an earlier protocol fault")]
    StreamPoisoned,

    #[error("body error (correlation {correlation_id}): {message}")]
    Body { correlation_id: u32, message: String },

    #[error("encode failed: {0}")]
    Encode(String),
}

impl CodecError {
    /// True when the connection carrying the frame cannot be used anymore.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::BadMagic(_)
                | Self::UnsupportedVersion(_)
                | Self::FrameTooLarge { .. }
                | Self::FrameTooShort(_)
                | Self::StreamPoisoned
        )
    }

    /// Correlation id of the lost frame, for frame-local faults.
    pub fn correlation_id(&self) -> Option<u32> {
        match self {
            Self::UnknownMessageType { correlation_id, .. }
            | Self::UnknownSerializer { correlation_id, .. }
            | Self::UnknownCompressor { correlation_id, .. }
            | Self::Body { correlation_id, .. } => Some(*correlation_id),
            _ => None,
        }
    }
}

/// Serialization or compression failure inside one payload.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PayloadError(pub String);

impl PayloadError {
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self(message.to_string())
    }
}

/// Extension resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtensionError {
    #[error("extension name for {capability} must not be empty")]
    EmptyName { capability: &'static str },

    #[error("No such extension of name {name} for {capability}")]
    NoSuchExtension {
        capability: &'static str,
        name: String,
    },

    #[error("manifest for {capability} maps {name} to unknown implementation {implementation}")]
    UnknownImplementation {
        capability: &'static str,
        name: String,
        implementation: String,
    },

    #[error("failed to read manifest {path}: {message}")]
    Manifest { path: String, message: String },

    #[error("failed to construct {implementation}: {message}")]
    Construct {
        implementation: String,
        message: String,
    },
}

/// Coordination store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StoreError {
    #[error("no node at {0}")]
    NoNode(String),

    #[error("node {0} still has children")]
    NotEmpty(String),

    #[error("invalid path {0}")]
    InvalidPath(String),

    #[error("timed out connecting to coordination store at {0}")]
    ConnectTimeout(String),

    #[error("coordination store connection: {0}")]
    Connection(String),

    #[error("coordination store protocol: {0}")]
    Protocol(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level error surfaced at proxies, clients and servers.
#[derive(Debug, Error)]
pub enum RpcError {
    /// No address is registered for the service key
    #[error("service can not be found: {0}")]
    ServiceNotFound(String),

    /// Load balancer returned no selection
    #[error("no provider available for {0}")]
    NoProviderAvailable(String),

    #[error("invalid provider address {0}")]
    InvalidAddress(String),

    /// No response where one was structurally expected
    #[error("no response for request {0}")]
    NoResponse(String),

    #[error("response id {response:?} does not match request {request}")]
    RequestMismatch {
        request: String,
        response: Option<String>,
    },

    /// Remote side answered with a failure code
    #[error("remote call to {service}.{method} failed ({code}): {message}")]
    InvocationFailed {
        service: String,
        method: String,
        code: u16,
        message: String,
    },

    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("transport closed")]
    Shutdown,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Extension(#[from] ExtensionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_fatality() {
        assert!(CodecError::BadMagic(*b"nope").is_fatal());
        assert!(CodecError::UnsupportedVersion(7).is_fatal());
        assert!(CodecError::FrameTooLarge { len: 10, max: 5 }.is_fatal());
        assert!(CodecError::FrameTooShort(3).is_fatal());

        let body = CodecError::Body {
            correlation_id: 9,
            message: "bad gzip".into(),
        };
        assert!(!body.is_fatal());
        assert_eq!(body.correlation_id(), Some(9));
        assert_eq!(CodecError::BadMagic(*b"nope").correlation_id(), None);
    }

    #[test]
    fn test_error_display() {
        let err = ExtensionError::NoSuchExtension {
            capability: "flowrpc.Serializer",
            name: "xml".into(),
        };
        assert_eq!(
            err.to_string(),
            "No such extension of name xml for flowrpc.Serializer"
        );

        let rpc: RpcError = StoreError::NoNode("/flow-rpc/a".into()).into();
        assert_eq!(rpc.to_string(), "no node at /flow-rpc/a");
    }
}
