// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Envelope encode/decode.
//!
//! Encode runs serialize, then compress, then writes the header. The length
//! slot is reserved first and backfilled once the body size is known. Decode
//! checks the header, short-circuits heartbeats, then decompresses and
//! deserializes the body with the implementations named by the header bytes.

mod frame;

pub use frame::FrameAssembler;

use crate::compress::Compressor;
use crate::error::{CodecError, PayloadError};
use crate::extension::ExtensionLoader;
use crate::protocol::{
    CompressorKind, MessageBody, MessageType, RpcMessage, SerializerKind, HEAD_LENGTH,
    LENGTH_FIELD_OFFSET, MAGIC, MAX_FRAME_LENGTH, VERSION,
};
use crate::serialize::Serializer;
use frame::{read_u32, validate_header};
use std::sync::Arc;

/// Encodes and decodes [`RpcMessage`] frames.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    serializers: Arc<ExtensionLoader<dyn Serializer>>,
    compressors: Arc<ExtensionLoader<dyn Compressor>>,
    max_frame_size: usize,
}

impl MessageCodec {
    pub fn new(
        serializers: Arc<ExtensionLoader<dyn Serializer>>,
        compressors: Arc<ExtensionLoader<dyn Compressor>>,
        max_frame_size: usize,
    ) -> Self {
        Self {
            serializers,
            compressors,
            max_frame_size: max_frame_size.min(MAX_FRAME_LENGTH),
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Fresh assembler bounded by this codec's max frame size.
    pub fn assembler(&self) -> FrameAssembler {
        FrameAssembler::new(self.max_frame_size)
    }

    pub fn encode(&self, message: &RpcMessage) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(HEAD_LENGTH + 256);
        self.encode_into(message, &mut out)?;
        Ok(out)
    }

    /// Appends one encoded frame to `out`.
    pub fn encode_into(&self, message: &RpcMessage, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let start = out.len();
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        // Full length, backfilled below
        out.extend_from_slice(&[0u8; 4]);
        out.push(message.message_type() as u8);
        out.push(message.serializer as u8);
        out.push(message.compressor as u8);
        out.extend_from_slice(&message.correlation_id.to_be_bytes());

        if !message.message_type().is_heartbeat() {
            let body = self.encode_body(message).map_err(|e| {
                out.truncate(start);
                CodecError::Encode(e.to_string())
            })?;
            out.extend_from_slice(&body);
        }

        let full_length = out.len() - start;
        if full_length > self.max_frame_size {
            out.truncate(start);
            return Err(CodecError::FrameTooLarge {
                len: full_length,
                max: self.max_frame_size,
            });
        }
        let slot = start + LENGTH_FIELD_OFFSET;
        out[slot..slot + 4].copy_from_slice(&(full_length as u32).to_be_bytes());
        Ok(())
    }

    fn encode_body(&self, message: &RpcMessage) -> Result<Vec<u8>, PayloadError> {
        let serializer = self
            .serializers
            .resolve(message.serializer.name(), &())
            .map_err(PayloadError::new)?;
        let raw = match &message.body {
            MessageBody::Request(request) => serializer.serialize_request(request)?,
            MessageBody::Response(response) => serializer.serialize_response(response)?,
            MessageBody::Ping | MessageBody::Pong => return Ok(Vec::new()),
        };
        let compressor = self
            .compressors
            .resolve(message.compressor.name(), &())
            .map_err(PayloadError::new)?;
        compressor.compress(&raw)
    }

    /// Decodes one complete frame as produced by [`FrameAssembler`].
    pub fn decode(&self, frame: &[u8]) -> Result<RpcMessage, CodecError> {
        let full_length = validate_header(frame, self.max_frame_size)?;
        if full_length != frame.len() {
            return Err(CodecError::FrameTooShort(frame.len()));
        }

        let correlation_id = read_u32(frame, 12);
        let kind = MessageType::from_u8(frame[9]).ok_or(CodecError::UnknownMessageType {
            kind: frame[9],
            correlation_id,
        })?;
        let serializer = SerializerKind::from_u8(frame[10]).ok_or(CodecError::UnknownSerializer {
            id: frame[10],
            correlation_id,
        })?;
        let compressor = CompressorKind::from_u8(frame[11]).ok_or(CodecError::UnknownCompressor {
            id: frame[11],
            correlation_id,
        })?;

        let body = match kind {
            MessageType::HeartbeatPing => MessageBody::Ping,
            MessageType::HeartbeatPong => MessageBody::Pong,
            MessageType::Request | MessageType::Response => {
                let body_error = |e: &dyn std::fmt::Display| CodecError::Body {
                    correlation_id,
                    message: e.to_string(),
                };
                let raw = self
                    .compressors
                    .resolve(compressor.name(), &())
                    .map_err(|e| body_error(&e))?
                    .decompress(&frame[HEAD_LENGTH..])
                    .map_err(|e| body_error(&e))?;
                let serializer_impl = self
                    .serializers
                    .resolve(serializer.name(), &())
                    .map_err(|e| body_error(&e))?;
                if kind == MessageType::Request {
                    MessageBody::Request(
                        serializer_impl
                            .deserialize_request(&raw)
                            .map_err(|e| body_error(&e))?,
                    )
                } else {
                    MessageBody::Response(
                        serializer_impl
                            .deserialize_response(&raw)
                            .map_err(|e| body_error(&e))?,
                    )
                }
            }
        };

        Ok(RpcMessage {
            serializer,
            compressor,
            correlation_id,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::Extensions;
    use crate::protocol::{RpcRequest, RpcResponse, ServiceKey};
    use serde_json::json;

    fn codec() -> MessageCodec {
        Extensions::builtin().codec(MAX_FRAME_LENGTH)
    }

    fn request_message(serializer: SerializerKind, compressor: CompressorKind) -> RpcMessage {
        let request = RpcRequest::new(
            &ServiceKey::new("Greeter").with_version("v1"),
            "hello",
            vec!["string".into()],
            vec![json!("world")],
        );
        RpcMessage::new(serializer, compressor, 0x0102_0304, MessageBody::Request(request))
    }

    #[test]
    fn test_header_layout() {
        let codec = codec();
        let msg = request_message(SerializerKind::Json, CompressorKind::Gzip);
        let bytes = codec.encode(&msg).expect("encode");
        assert_eq!(&bytes[0..4], b"flow");
        assert_eq!(bytes[4], VERSION);
        assert_eq!(read_u32(&bytes, 5) as usize, bytes.len());
        assert_eq!(bytes[9], MessageType::Request as u8);
        assert_eq!(bytes[10], SerializerKind::Json as u8);
        assert_eq!(bytes[11], CompressorKind::Gzip as u8);
        assert_eq!(&bytes[12..16], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_request_and_response_survive_codec() {
        let codec = codec();
        for (s, c) in [
            (SerializerKind::Json, CompressorKind::Gzip),
            (SerializerKind::Json, CompressorKind::None),
            (SerializerKind::Cbor, CompressorKind::Gzip),
        ] {
            let msg = request_message(s, c);
            assert_eq!(codec.decode(&codec.encode(&msg).expect("encode")).expect("decode"), msg);
        }

        let resp = RpcMessage::new(
            SerializerKind::Json,
            CompressorKind::Gzip,
            u32::MAX,
            MessageBody::Response(RpcResponse::success("id-1", json!("hello world"))),
        );
        assert_eq!(codec.decode(&codec.encode(&resp).expect("encode")).expect("decode"), resp);
    }

    #[test]
    fn test_heartbeat_has_no_body() {
        let codec = codec();
        let ping = RpcMessage::new(SerializerKind::Json, CompressorKind::Gzip, 5, MessageBody::Ping);
        let bytes = codec.encode(&ping).expect("encode");
        assert_eq!(bytes.len(), HEAD_LENGTH);
        assert_eq!(codec.decode(&bytes).expect("decode").body, MessageBody::Ping);
    }

    #[test]
    fn test_heartbeat_skips_codec_resolution() {
        let codec = codec();
        let mut bytes = codec
            .encode(&RpcMessage::new(SerializerKind::Json, CompressorKind::Gzip, 1, MessageBody::Pong))
            .expect("encode");
        // Lz4 may be compiled out; heartbeats must not care
        bytes[11] = CompressorKind::Lz4 as u8;
        assert_eq!(codec.decode(&bytes).expect("decode").body, MessageBody::Pong);
    }

    #[test]
    fn test_altered_magic_or_version_rejected() {
        let codec = codec();
        let good = codec
            .encode(&request_message(SerializerKind::Json, CompressorKind::Gzip))
            .expect("encode");

        for i in 0..4 {
            let mut bad = good.clone();
            bad[i] ^= 0xFF;
            let err = codec.decode(&bad).expect_err("bad magic");
            assert!(matches!(err, CodecError::BadMagic(_)));
            assert!(err.is_fatal());
        }

        let mut bad = good.clone();
        bad[4] = 2;
        let err = codec.decode(&bad).expect_err("bad version");
        assert!(matches!(err, CodecError::UnsupportedVersion(2)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_corrupt_body_is_frame_local() {
        let codec = codec();
        let mut bytes = codec
            .encode(&request_message(SerializerKind::Json, CompressorKind::Gzip))
            .expect("encode");
        let last = bytes.len() - 12;
        bytes[HEAD_LENGTH..last].fill(0xAB);
        let err = codec.decode(&bytes).expect_err("corrupt body");
        assert!(!err.is_fatal());
        assert_eq!(err.correlation_id(), Some(0x0102_0304));
    }

    #[test]
    fn test_unknown_serializer_id() {
        let codec = codec();
        let mut bytes = codec
            .encode(&request_message(SerializerKind::Json, CompressorKind::None))
            .expect("encode");
        bytes[10] = 42;
        assert!(matches!(
            codec.decode(&bytes),
            Err(CodecError::UnknownSerializer { id: 42, .. })
        ));
    }

    #[test]
    fn test_encode_respects_max_frame() {
        let codec = Extensions::builtin().codec(HEAD_LENGTH + 8);
        let err = codec
            .encode(&request_message(SerializerKind::Json, CompressorKind::None))
            .expect_err("too large");
        assert!(matches!(err, CodecError::FrameTooLarge { .. }));
    }

    #[test]
    fn test_assembler_feeds_decoder() {
        let codec = codec();
        let a = codec
            .encode(&request_message(SerializerKind::Json, CompressorKind::Gzip))
            .expect("encode");
        let b = codec
            .encode(&RpcMessage::new(SerializerKind::Json, CompressorKind::Gzip, 9, MessageBody::Ping))
            .expect("encode");
        let mut stream = a.clone();
        stream.extend_from_slice(&b);

        let mut asm = codec.assembler();
        let mut decoded = Vec::new();
        for chunk in stream.chunks(7) {
            asm.feed(chunk);
            while let Some(frame) = asm.next_frame().expect("frame") {
                decoded.push(codec.decode(&frame).expect("decode"));
            }
        }
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].body, MessageBody::Ping);
        assert_eq!(decoded[1].correlation_id, 9);
    }
}
