// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC server: accepts connections, dispatches requests on a bounded
//! blocking pool and publishes its address to the registry.

use crate::codec::MessageCodec;
use crate::config::RpcConfig;
use crate::dispatch::RequestDispatcher;
use crate::error::{CodecError, RpcError};
use crate::extension::Extensions;
use crate::protocol::{
    CompressorKind, MessageBody, RpcMessage, RpcRequest, RpcResponse, SerializerKind, ServiceKey,
};
use crate::provider::{ServiceDefinition, ServiceProvider};
use crate::registry::{CoordinationStore, ServiceRegistry};
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify, Semaphore};

/// Outbound frames buffered per connection.
const OUTBOUND_CAPACITY: usize = 256;

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// State shared by all connection handlers.
struct ConnectionContext {
    codec: Arc<MessageCodec>,
    dispatcher: RequestDispatcher,
    handler_permits: Arc<Semaphore>,
    reader_idle: Duration,
    serializer: SerializerKind,
    compressor: CompressorKind,
    shutdown: Arc<Notify>,
    stopping: AtomicBool,
    active_connections: AtomicUsize,
}

/// Serves published services on one listening socket.
pub struct RpcServer {
    config: Arc<RpcConfig>,
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    advertised_addr: SocketAddr,
    provider: Arc<ServiceProvider>,
    registry: ServiceRegistry,
    /// Set when the store was opened by `bind` rather than passed in
    owns_store: bool,
    ctx: Arc<ConnectionContext>,
    running: AtomicBool,
}

impl RpcServer {
    /// Binds using the coordination store named by `config.registry`.
    pub async fn bind(config: RpcConfig) -> Result<Self, RpcError> {
        let extensions = Extensions::with_manifest_dirs(&config.extension_dirs);
        let store = extensions.store(&config.registry, &config)?;
        Self::bind_with(config, &extensions, store, true).await
    }

    /// Binds with an already constructed store. The store is left open on
    /// shutdown since others may share it.
    pub async fn bind_with_store(
        config: RpcConfig,
        store: Arc<dyn CoordinationStore>,
    ) -> Result<Self, RpcError> {
        let extensions = Extensions::with_manifest_dirs(&config.extension_dirs);
        Self::bind_with(config, &extensions, store, false).await
    }

    async fn bind_with(
        config: RpcConfig,
        extensions: &Extensions,
        store: Arc<dyn CoordinationStore>,
        owns_store: bool,
    ) -> Result<Self, RpcError> {
        config.validate()?;
        let listener = TcpListener::bind(config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        let advertised_addr = advertised_address(&config, local_addr);
        log::info!(
            "[SERVER] listening on {} (advertised as {})",
            local_addr,
            advertised_addr
        );

        let provider = Arc::new(ServiceProvider::new());
        let ctx = Arc::new(ConnectionContext {
            codec: Arc::new(extensions.codec(config.max_frame_size)),
            dispatcher: RequestDispatcher::new(Arc::clone(&provider)),
            handler_permits: Arc::new(Semaphore::new(config.handler_threads)),
            reader_idle: config.reader_idle(),
            serializer: config.serializer_kind()?,
            compressor: config.compressor_kind()?,
            shutdown: Arc::new(Notify::new()),
            stopping: AtomicBool::new(false),
            active_connections: AtomicUsize::new(0),
        });

        Ok(Self {
            registry: ServiceRegistry::new(store, config.registry_root.clone()),
            owns_store,
            config: Arc::new(config),
            listener: Mutex::new(Some(listener)),
            local_addr,
            advertised_addr,
            provider,
            ctx,
            running: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address written to the registry.
    pub fn advertised_addr(&self) -> SocketAddr {
        self.advertised_addr
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<ServiceProvider> {
        &self.provider
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn active_connections(&self) -> usize {
        self.ctx.active_connections.load(Ordering::Relaxed)
    }

    /// Makes `definition` callable under `key` and registers this server's
    /// address for it.
    pub async fn publish(
        &self,
        key: &ServiceKey,
        definition: ServiceDefinition,
    ) -> Result<(), RpcError> {
        self.provider.add(key, definition);
        self.registry
            .register(&key.rendered(), &self.advertised_addr.to_string())
            .await?;
        Ok(())
    }

    /// Accepts connections until [`RpcServer::shutdown`].
    pub async fn run(&self) -> Result<(), RpcError> {
        let listener = self
            .listener
            .lock()
            .take()
            .ok_or_else(|| RpcError::Connection("server already running".to_string()))?;
        self.running.store(true, Ordering::SeqCst);

        let shutdown = Arc::clone(&self.ctx.shutdown);
        let notified = shutdown.notified();
        tokio::pin!(notified);

        while !self.ctx.stopping.load(Ordering::SeqCst) {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            log::debug!("[SERVER] new connection from {}", peer_addr);
                            let ctx = Arc::clone(&self.ctx);
                            tokio::spawn(async move {
                                ctx.active_connections.fetch_add(1, Ordering::Relaxed);
                                handle_connection(stream, peer_addr, &ctx).await;
                                ctx.active_connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => log::error!("[SERVER] accept error: {}", e),
                    }
                }
                _ = &mut notified => {
                    log::info!("[SERVER] shutdown signal received");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Deregisters every published address, then stops accepting and
    /// closes connections. Closes the store only if `bind` opened it.
    pub async fn shutdown(&self) {
        let removed = self.registry.deregister_all().await;
        log::info!("[SERVER] deregistered {} address(es)", removed);
        self.ctx.stopping.store(true, Ordering::SeqCst);
        self.ctx.shutdown.notify_waiters();
        if self.owns_store {
            self.registry.store().close().await;
        }
    }
}

fn advertised_address(config: &RpcConfig, local: SocketAddr) -> SocketAddr {
    let ip = match config.advertise_address {
        Some(ip) => ip,
        None if local.ip().is_unspecified() => local_ip_address::local_ip().unwrap_or_else(|e| {
            log::warn!("[SERVER] could not detect local address ({}), using loopback", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }),
        None => local.ip(),
    };
    SocketAddr::new(ip, local.port())
}

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, ctx: &Arc<ConnectionContext>) {
    let _ = stream.set_nodelay(true);
    let (mut rd, mut wr) = stream.into_split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = wr.write_all(&frame).await {
                log::warn!("[SERVER] write to {} failed: {}", peer_addr, e);
                break;
            }
        }
        let _ = wr.shutdown().await;
    });

    let mut assembler = ctx.codec.assembler();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    'read: while !ctx.stopping.load(Ordering::SeqCst) {
        let read = tokio::select! {
            r = tokio::time::timeout(ctx.reader_idle, rd.read(&mut buf)) => r,
            _ = ctx.shutdown.notified() => {
                log::debug!("[SERVER] closing {} on shutdown", peer_addr);
                break;
            }
        };
        let n = match read {
            Err(_) => {
                log::info!(
                    "[SERVER] no data from {} for {:?}, closing",
                    peer_addr,
                    ctx.reader_idle
                );
                break;
            }
            Ok(Ok(0)) => {
                log::debug!("[SERVER] connection closed: {}", peer_addr);
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                log::warn!("[SERVER] read error from {}: {}", peer_addr, e);
                break;
            }
        };

        assembler.feed(&buf[..n]);
        loop {
            let frame = match assembler.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("[SERVER] protocol fault from {}: {}", peer_addr, e);
                    break 'read;
                }
            };
            match ctx.codec.decode(&frame) {
                Ok(message) => on_message(peer_addr, message, ctx, &outbound_tx).await,
                Err(e) if e.is_fatal() => {
                    log::warn!("[SERVER] protocol fault from {}: {}", peer_addr, e);
                    break 'read;
                }
                Err(e) => on_frame_error(peer_addr, e, ctx, &outbound_tx).await,
            }
        }
    }

    // Handler tasks hold their own senders; the writer drains their replies
    drop(outbound_tx);
    let _ = writer.await;
}

async fn on_message(
    peer_addr: SocketAddr,
    message: RpcMessage,
    ctx: &Arc<ConnectionContext>,
    outbound: &mpsc::Sender<Vec<u8>>,
) {
    let RpcMessage {
        serializer,
        compressor,
        correlation_id,
        body,
    } = message;
    match body {
        MessageBody::Ping => {
            log::debug!("[SERVER] ping from {}", peer_addr);
            let pong = RpcMessage::new(serializer, compressor, correlation_id, MessageBody::Pong);
            send_reply(ctx, outbound, pong).await;
        }
        MessageBody::Request(request) => {
            let ctx = Arc::clone(ctx);
            let outbound = outbound.clone();
            tokio::spawn(async move {
                let response = dispatch(&ctx, request).await;
                let reply = RpcMessage::new(
                    serializer,
                    compressor,
                    correlation_id,
                    MessageBody::Response(response),
                );
                send_reply(&ctx, &outbound, reply).await;
            });
        }
        other => {
            log::warn!(
                "[SERVER] unexpected {:?} from {}",
                other.message_type(),
                peer_addr
            );
        }
    }
}

/// Runs the handler on the blocking pool, bounded by the handler permits.
async fn dispatch(ctx: &Arc<ConnectionContext>, request: RpcRequest) -> RpcResponse {
    let request_id = request.request_id.clone();
    let _permit = match Arc::clone(&ctx.handler_permits).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return RpcResponse::fail(Some(request_id), "server shutting down"),
    };
    let dispatcher = ctx.dispatcher.clone();
    tokio::task::spawn_blocking(move || dispatcher.handle(&request))
        .await
        .unwrap_or_else(|e| RpcResponse::fail(Some(request_id), format!("handler task failed: {e}")))
}

/// A body that could not be decoded still gets a failure reply when its
/// correlation id is known.
async fn on_frame_error(
    peer_addr: SocketAddr,
    error: CodecError,
    ctx: &Arc<ConnectionContext>,
    outbound: &mpsc::Sender<Vec<u8>>,
) {
    log::warn!("[SERVER] dropping frame from {}: {}", peer_addr, error);
    if let Some(correlation_id) = error.correlation_id() {
        let reply = RpcMessage::new(
            ctx.serializer,
            ctx.compressor,
            correlation_id,
            MessageBody::Response(RpcResponse::fail(None, error.to_string())),
        );
        send_reply(ctx, outbound, reply).await;
    }
}

async fn send_reply(ctx: &ConnectionContext, outbound: &mpsc::Sender<Vec<u8>>, reply: RpcMessage) {
    let frame = match ctx.codec.encode(&reply) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("[SERVER] failed to encode reply {}: {}", reply.correlation_id, e);
            let fallback = reply.reply(MessageBody::Response(RpcResponse::fail(
                request_id_of(&reply),
                format!("failed to encode response: {e}"),
            )));
            match ctx.codec.encode(&fallback) {
                Ok(frame) => frame,
                Err(_) => return,
            }
        }
    };
    if outbound.send(frame).await.is_err() {
        log::warn!(
            "[SERVER] connection closed before reply {} could be sent",
            reply.correlation_id
        );
    }
}

fn request_id_of(message: &RpcMessage) -> Option<String> {
    match &message.body {
        MessageBody::Response(response) => response.request_id.clone(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::registry::{ChildWatch, MemoryStore};
    use async_trait::async_trait;

    /// Memory store that counts `close` calls.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        closes: AtomicUsize,
    }

    #[async_trait]
    impl CoordinationStore for CountingStore {
        async fn create_persistent(&self, path: &str) -> Result<bool, StoreError> {
            self.inner.create_persistent(path).await
        }
        async fn exists(&self, path: &str) -> Result<bool, StoreError> {
            self.inner.exists(path).await
        }
        async fn children(&self, path: &str) -> Result<Vec<String>, StoreError> {
            self.inner.children(path).await
        }
        async fn delete(&self, path: &str) -> Result<(), StoreError> {
            self.inner.delete(path).await
        }
        async fn watch_children(&self, path: &str) -> Result<ChildWatch, StoreError> {
            self.inner.watch_children(path).await
        }
        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_shutdown_leaves_injected_store_open() {
        let store = Arc::new(CountingStore::default());
        let config = RpcConfig::default().with_bind("127.0.0.1:0".parse().expect("addr"));
        let server = RpcServer::bind_with_store(config, Arc::clone(&store) as _)
            .await
            .expect("bind");
        server
            .publish(
                &ServiceKey::new("Greeter").with_version("v1"),
                ServiceDefinition::new("Greeter").method("ping", |(): ()| Ok(1u8)),
            )
            .await
            .expect("publish");

        server.shutdown().await;
        assert_eq!(store.closes.load(Ordering::SeqCst), 0);
        assert!(store.inner.list_children("/flow-rpc/Greeter::v1").is_empty());
    }
}
