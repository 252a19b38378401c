// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Short-lived transport: one connection per call.
//!
//! `send_request` returns once the request frame is written; a spawned task
//! reads the single reply and closes the connection.

use super::{ResponseFuture, RpcRequestTransport, TransportContext};
use crate::codec::MessageCodec;
use crate::error::RpcError;
use crate::protocol::{
    CompressorKind, MessageBody, RpcMessage, RpcRequest, RpcResponse, SerializerKind,
};
use crate::registry::ServiceDiscovery;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

/// Connects, writes one request frame, then hands the read to a task.
pub struct SocketTransport {
    discovery: Arc<ServiceDiscovery>,
    codec: Arc<MessageCodec>,
    connect_timeout: Duration,
    serializer: SerializerKind,
    compressor: CompressorKind,
}

impl SocketTransport {
    pub fn new(ctx: &TransportContext) -> Result<Self, RpcError> {
        Ok(Self {
            discovery: Arc::clone(&ctx.discovery),
            codec: Arc::clone(&ctx.codec),
            connect_timeout: ctx.config.connect_timeout(),
            serializer: ctx.config.serializer_kind()?,
            compressor: ctx.config.compressor_kind()?,
        })
    }
}

#[async_trait]
impl RpcRequestTransport for SocketTransport {
    async fn send_request(&self, request: RpcRequest) -> Result<ResponseFuture, RpcError> {
        let addr = self.discovery.resolve(&request).await?;
        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| RpcError::Connection(format!("connect to {} timed out", addr)))?
            .map_err(|e| RpcError::Connection(format!("connect to {}: {}", addr, e)))?;

        let frame = self.codec.encode(&RpcMessage::new(
            self.serializer,
            self.compressor,
            1,
            MessageBody::Request(request),
        ))?;
        stream.write_all(&frame).await?;

        // The frame is out; the reply is read in the background
        let (tx, rx) = oneshot::channel();
        let codec = Arc::clone(&self.codec);
        let reader = tokio::spawn(async move {
            match read_reply(&mut stream, &codec).await {
                Ok(reply) => {
                    let _ = tx.send(reply);
                }
                Err(e) => log::warn!("[CLIENT] no reply from {}: {}", addr, e),
            }
            let _ = stream.shutdown().await;
        });
        Ok(ResponseFuture::from_task(rx, reader.abort_handle()))
    }
}

/// Reads frames until the first response, skipping pongs.
async fn read_reply(stream: &mut TcpStream, codec: &MessageCodec) -> Result<RpcResponse, RpcError> {
    let mut assembler = codec.assembler();
    let mut buf = vec![0u8; 8 * 1024];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(RpcError::Connection(
                "peer closed before responding".to_string(),
            ));
        }
        assembler.feed(&buf[..n]);
        while let Some(frame) = assembler.next_frame()? {
            match codec.decode(&frame)?.body {
                MessageBody::Response(response) => return Ok(response),
                MessageBody::Pong => {}
                other => {
                    return Err(RpcError::Connection(format!(
                        "unexpected {:?} frame",
                        other.message_type()
                    )))
                }
            }
        }
    }
}
