// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client connections and the per-address connection cache.

use super::pending::PendingCalls;
use crate::codec::MessageCodec;
use crate::error::RpcError;
use crate::protocol::{CompressorKind, MessageBody, RpcMessage, SerializerKind};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Outbound frames buffered per connection.
const OUTBOUND_CAPACITY: usize = 1024;

/// Read buffer size for the reader task.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Connection parameters.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub connect_timeout: Duration,
    /// Write-idle interval before a heartbeat ping
    pub heartbeat_interval: Duration,
    pub serializer: SerializerKind,
    pub compressor: CompressorKind,
}

/// One multiplexed connection to a provider.
///
/// A writer task drains the outbound queue in order and pings the peer when
/// nothing was written for a heartbeat interval. A reader task completes
/// pending calls from response frames. Dropping every handle closes the
/// outbound queue, which ends the writer and half-closes the socket.
#[derive(Debug)]
pub struct ClientConnection {
    peer: SocketAddr,
    codec: Arc<MessageCodec>,
    outbound: mpsc::Sender<Vec<u8>>,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ClientConnection {
    pub async fn connect(
        peer: SocketAddr,
        options: &ConnectionOptions,
        codec: Arc<MessageCodec>,
        pending: Arc<PendingCalls>,
    ) -> Result<Self, RpcError> {
        let stream = tokio::time::timeout(options.connect_timeout, TcpStream::connect(peer))
            .await
            .map_err(|_| RpcError::Connection(format!("connect to {} timed out", peer)))?
            .map_err(|e| RpcError::Connection(format!("connect to {}: {}", peer, e)))?;
        let _ = stream.set_nodelay(true);
        log::info!("[CLIENT] connected to {}", peer);

        let (mut rd, mut wr) = stream.into_split();
        let (outbound, mut outbound_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_CAPACITY);
        let closed = Arc::new(AtomicBool::new(false));

        let ping = codec.encode(&RpcMessage::new(
            options.serializer,
            options.compressor,
            0,
            MessageBody::Ping,
        ))?;
        let heartbeat = options.heartbeat_interval;
        let writer_closed = Arc::clone(&closed);
        let writer = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    next = outbound_rx.recv() => match next {
                        Some(frame) => frame,
                        None => break,
                    },
                    _ = tokio::time::sleep(heartbeat) => {
                        log::debug!("[CLIENT] write idle on {}, sending ping", peer);
                        ping.clone()
                    }
                };
                if let Err(e) = wr.write_all(&frame).await {
                    log::warn!("[CLIENT] write to {} failed: {}", peer, e);
                    break;
                }
            }
            writer_closed.store(true, Ordering::Release);
            let _ = wr.shutdown().await;
        });

        let reader_codec = Arc::clone(&codec);
        let reader_closed = Arc::clone(&closed);
        let reader = tokio::spawn(async move {
            let mut assembler = reader_codec.assembler();
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            'read: loop {
                let n = match rd.read(&mut buf).await {
                    Ok(0) => {
                        log::debug!("[CLIENT] {} closed the connection", peer);
                        break;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        log::warn!("[CLIENT] read from {} failed: {}", peer, e);
                        break;
                    }
                };
                assembler.feed(&buf[..n]);
                loop {
                    let frame = match assembler.next_frame() {
                        Ok(Some(frame)) => frame,
                        Ok(None) => break,
                        Err(e) => {
                            log::warn!("[CLIENT] protocol fault from {}: {}", peer, e);
                            break 'read;
                        }
                    };
                    match reader_codec.decode(&frame) {
                        Ok(message) => on_message(peer, message, &pending),
                        Err(e) if e.is_fatal() => {
                            log::warn!("[CLIENT] protocol fault from {}: {}", peer, e);
                            break 'read;
                        }
                        Err(e) => log::warn!("[CLIENT] dropping frame from {}: {}", peer, e),
                    }
                }
            }
            reader_closed.store(true, Ordering::Release);
        });

        Ok(Self {
            peer,
            codec,
            outbound,
            closed,
            reader,
            writer,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Liveness check used before reuse.
    pub fn is_active(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    /// Encodes `message` and queues it behind earlier frames.
    pub async fn send(&self, message: &RpcMessage) -> Result<(), RpcError> {
        let frame = self.codec.encode(message)?;
        self.outbound.send(frame).await.map_err(|_| {
            self.closed.store(true, Ordering::Release);
            RpcError::Connection(format!("connection to {} closed", self.peer))
        })
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.reader.abort();
        self.writer.abort();
    }
}

fn on_message(peer: SocketAddr, message: RpcMessage, pending: &PendingCalls) {
    match message.body {
        MessageBody::Response(response) => {
            if let Err(e) = pending.complete(message.correlation_id, response) {
                log::warn!("[CLIENT] {} from {}", e, peer);
            }
        }
        MessageBody::Pong => log::debug!("[CLIENT] pong from {}", peer),
        MessageBody::Ping => log::debug!("[CLIENT] unexpected ping from {}", peer),
        MessageBody::Request(_) => log::warn!("[CLIENT] unexpected request from {}", peer),
    }
}

/// Live connections keyed by peer address.
///
/// Dead entries are evicted when looked up. Two callers racing to connect
/// to the same address both succeed and the last `put` wins.
#[derive(Debug, Default)]
pub struct ConnectionCache {
    connections: DashMap<SocketAddr, Arc<ClientConnection>>,
}

impl ConnectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<Arc<ClientConnection>> {
        if let Some(conn) = self.connections.get(addr) {
            if conn.is_active() {
                return Some(Arc::clone(conn.value()));
            }
        }
        if self
            .connections
            .remove_if(addr, |_, conn| !conn.is_active())
            .is_some()
        {
            log::debug!("[CLIENT] evicted dead connection to {}", addr);
        }
        None
    }

    /// Replaced connections are not closed; calls already in flight on them
    /// still complete and their tasks wind down once the last handle drops.
    pub fn put(&self, addr: SocketAddr, conn: Arc<ClientConnection>) {
        self.connections.insert(addr, conn);
    }

    pub fn remove(&self, addr: &SocketAddr) -> Option<Arc<ClientConnection>> {
        self.connections.remove(addr).map(|(_, conn)| conn)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn close_all(&self) {
        for entry in self.connections.iter() {
            entry.value().close();
        }
        self.connections.clear();
    }
}
