// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multiplexed TCP transport.

use super::connection::{ClientConnection, ConnectionCache, ConnectionOptions};
use super::pending::PendingCalls;
use super::{ResponseFuture, RpcRequestTransport, TransportContext};
use crate::codec::MessageCodec;
use crate::error::RpcError;
use crate::protocol::{MessageBody, RpcMessage, RpcRequest};
use crate::registry::ServiceDiscovery;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Sends requests over cached persistent connections and matches responses
/// by correlation id.
pub struct TcpClientTransport {
    discovery: Arc<ServiceDiscovery>,
    codec: Arc<MessageCodec>,
    options: ConnectionOptions,
    connections: ConnectionCache,
    pending: Arc<PendingCalls>,
    next_id: AtomicU32,
}

impl TcpClientTransport {
    pub fn new(ctx: &TransportContext) -> Result<Self, RpcError> {
        Ok(Self {
            discovery: Arc::clone(&ctx.discovery),
            codec: Arc::clone(&ctx.codec),
            options: ConnectionOptions {
                connect_timeout: ctx.config.connect_timeout(),
                heartbeat_interval: ctx.config.heartbeat_interval(),
                serializer: ctx.config.serializer_kind()?,
                compressor: ctx.config.compressor_kind()?,
            },
            connections: ConnectionCache::new(),
            pending: Arc::new(PendingCalls::new()),
            next_id: AtomicU32::new(1),
        })
    }

    pub fn pending(&self) -> &Arc<PendingCalls> {
        &self.pending
    }

    pub fn connections(&self) -> &ConnectionCache {
        &self.connections
    }

    fn next_correlation_id(&self) -> u32 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            // 0 is used by heartbeats
            if id != 0 {
                return id;
            }
        }
    }

    async fn connection(&self, addr: SocketAddr) -> Result<Arc<ClientConnection>, RpcError> {
        if let Some(conn) = self.connections.get(&addr) {
            return Ok(conn);
        }
        let conn = Arc::new(
            ClientConnection::connect(
                addr,
                &self.options,
                Arc::clone(&self.codec),
                Arc::clone(&self.pending),
            )
            .await?,
        );
        self.connections.put(addr, Arc::clone(&conn));
        Ok(conn)
    }
}

#[async_trait]
impl RpcRequestTransport for TcpClientTransport {
    async fn send_request(&self, request: RpcRequest) -> Result<ResponseFuture, RpcError> {
        let addr = self.discovery.resolve(&request).await?;
        let conn = self.connection(addr).await?;

        let correlation_id = self.next_correlation_id();
        let (tx, rx) = oneshot::channel();
        self.pending.register(correlation_id, tx);

        let message = RpcMessage::new(
            self.options.serializer,
            self.options.compressor,
            correlation_id,
            MessageBody::Request(request),
        );
        if let Err(e) = conn.send(&message).await {
            self.pending.cancel(correlation_id);
            // Lookup evicts the entry if the connection died
            let _ = self.connections.get(&addr);
            return Err(e);
        }
        Ok(ResponseFuture::pending(
            rx,
            Arc::clone(&self.pending),
            correlation_id,
        ))
    }

    async fn close(&self) {
        self.connections.close_all();
    }
}
