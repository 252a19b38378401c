// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire protocol constants and the message envelope.
//!
//! # Frame Layout
//!
//! ```text
//! +--------+---------+-------------+------+-------+----------+----------------+
//! | magic  | version | full length | kind | codec | compress | correlation id |
//! | 4 B    | 1 B     | 4 B (BE)    | 1 B  | 1 B   | 1 B      | 4 B (BE)       |
//! +--------+---------+-------------+------+-------+----------+----------------+
//! | body (absent for heartbeats)                                               |
//! +----------------------------------------------------------------------------+
//! ```
//!
//! `full length` covers header and body. It is written after the body has been
//! serialized and compressed.

mod call;

pub use call::{ResponseCode, RpcRequest, RpcResponse, ServiceKey};

/// Frame magic, checked first on decode.
pub const MAGIC: [u8; 4] = *b"flow";

/// Supported protocol version.
pub const VERSION: u8 = 1;

/// Fixed header length in bytes.
pub const HEAD_LENGTH: usize = 16;

/// Upper bound on a full frame (header + body).
pub const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// Offset of the full-length field inside the header.
pub const LENGTH_FIELD_OFFSET: usize = 5;

/// Sentinel payload carried by heartbeat requests.
pub const PING: &str = "ping";

/// Sentinel payload carried by heartbeat responses.
pub const PONG: &str = "pong";

/// Message kind byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Request = 1,
    Response = 2,
    HeartbeatPing = 3,
    HeartbeatPong = 4,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Request),
            2 => Some(Self::Response),
            3 => Some(Self::HeartbeatPing),
            4 => Some(Self::HeartbeatPong),
            _ => None,
        }
    }

    #[inline]
    pub fn is_heartbeat(self) -> bool {
        matches!(self, Self::HeartbeatPing | Self::HeartbeatPong)
    }
}

/// Serializer identifiers carried in the `codec` header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SerializerKind {
    Json = 1,
    Cbor = 2,
}

impl SerializerKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Json),
            2 => Some(Self::Cbor),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "json" => Some(Self::Json),
            "cbor" => Some(Self::Cbor),
            _ => None,
        }
    }

    /// Extension name used to resolve the implementation.
    pub fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Cbor => "cbor",
        }
    }
}

/// Compressor identifiers carried in the `compress` header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompressorKind {
    None = 0,
    Gzip = 1,
    Lz4 = 2,
}

impl CompressorKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Gzip),
            2 => Some(Self::Lz4),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "gzip" => Some(Self::Gzip),
            "lz4" => Some(Self::Lz4),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Lz4 => "lz4",
        }
    }
}

/// Envelope payload.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Request(RpcRequest),
    Response(RpcResponse),
    Ping,
    Pong,
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Request(_) => MessageType::Request,
            Self::Response(_) => MessageType::Response,
            Self::Ping => MessageType::HeartbeatPing,
            Self::Pong => MessageType::HeartbeatPong,
        }
    }

    /// Sentinel text for heartbeat bodies.
    pub fn heartbeat_text(&self) -> Option<&'static str> {
        match self {
            Self::Ping => Some(PING),
            Self::Pong => Some(PONG),
            _ => None,
        }
    }
}

/// The unit the wire codec operates on.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcMessage {
    pub serializer: SerializerKind,
    pub compressor: CompressorKind,
    pub correlation_id: u32,
    pub body: MessageBody,
}

impl RpcMessage {
    pub fn new(
        serializer: SerializerKind,
        compressor: CompressorKind,
        correlation_id: u32,
        body: MessageBody,
    ) -> Self {
        Self {
            serializer,
            compressor,
            correlation_id,
            body,
        }
    }

    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    /// Builds a reply envelope reusing this message's codec choice and id.
    pub fn reply(&self, body: MessageBody) -> Self {
        Self {
            serializer: self.serializer,
            compressor: self.compressor,
            correlation_id: self.correlation_id,
            body,
        }
    }
}
