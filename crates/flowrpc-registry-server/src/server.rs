// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry Server core implementation.

use crate::config::{ConfigError, ServerConfig};
use flowrpc::registry::wire::{
    read_message, write_message, StoreOp, StoreOutcome, StoreReply, StoreRequest,
};
use flowrpc::registry::{CoordinationStore, MemoryStore};
use flowrpc::StoreError;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Replies buffered per session.
const OUTBOUND_CAPACITY: usize = 256;

/// Registry Server - coordination tree shared by providers and clients.
#[derive(Clone)]
pub struct RegistryServer {
    config: Arc<ServerConfig>,
    store: Arc<MemoryStore>,
    listener: Arc<Mutex<Option<TcpListener>>>,
    local_addr: SocketAddr,
    shutdown: Arc<Notify>,
    stopping: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    sessions: Arc<AtomicUsize>,
}

impl RegistryServer {
    /// Validate `config` and bind the listening socket.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let listener = TcpListener::bind(config.bind_addr())
            .await
            .map_err(|e| ServerError::Bind(format!("{}: {}", config.bind_addr(), e)))?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(MemoryStore::new()),
            listener: Arc::new(Mutex::new(Some(listener))),
            local_addr,
            shutdown: Arc::new(Notify::new()),
            stopping: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            sessions: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The hosted tree.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Number of open client sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.load(Ordering::Relaxed)
    }

    /// Check if server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the registry server.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self
            .listener
            .lock()
            .map_err(|_| ServerError::AlreadyRunning)?
            .take()
            .ok_or(ServerError::AlreadyRunning)?;
        self.running.store(true, Ordering::SeqCst);
        info!("Registry server listening on {}", self.local_addr);

        let shutdown = self.shutdown.clone();
        let notified = shutdown.notified();
        tokio::pin!(notified);

        while !self.stopping.load(Ordering::SeqCst) {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            if self.session_count() >= self.config.max_sessions {
                                warn!("Max sessions reached, rejecting {}", peer_addr);
                                continue;
                            }
                            info!("New session from {}", peer_addr);
                            let server = self.clone();
                            tokio::spawn(async move {
                                server.sessions.fetch_add(1, Ordering::Relaxed);
                                if let Err(e) = server.handle_session(stream, peer_addr).await {
                                    warn!("Session error from {}: {}", peer_addr, e);
                                }
                                server.sessions.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = &mut notified => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        // Release the port before reporting stopped
        drop(listener);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Handle one client session.
    async fn handle_session(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let _ = stream.set_nodelay(true);
        let (mut reader, mut writer) = stream.into_split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<StoreReply>(OUTBOUND_CAPACITY);

        let writer_task = tokio::spawn(async move {
            while let Some(reply) = outbound_rx.recv().await {
                if let Err(e) = write_message(&mut writer, &reply).await {
                    warn!("Failed to send reply to {}: {}", peer_addr, e);
                    break;
                }
            }
        });

        let mut watch_tasks: Vec<JoinHandle<()>> = Vec::new();
        let timeout = self.config.session_timeout();
        let max_size = self.config.max_message_size;
        let mut outcome = Ok(());

        while !self.stopping.load(Ordering::SeqCst) {
            let read = tokio::select! {
                r = tokio::time::timeout(timeout, read_message::<_, StoreRequest>(&mut reader, max_size)) => r,
                _ = self.shutdown.notified() => {
                    debug!("Session handler shutting down: {}", peer_addr);
                    break;
                }
            };
            let request = match read {
                Err(_) => {
                    info!("Session {} silent for {:?}, closing", peer_addr, timeout);
                    break;
                }
                Ok(Ok(Some(request))) => request,
                Ok(Ok(None)) => {
                    info!("Session closed: {}", peer_addr);
                    break;
                }
                Ok(Err(e)) => {
                    outcome = Err(ServerError::Protocol(e.to_string()));
                    break;
                }
            };

            let result = self
                .apply(request.op, peer_addr, &outbound_tx, &mut watch_tasks)
                .await;
            let reply = StoreReply::Response {
                id: request.id,
                result,
            };
            if outbound_tx.send(reply).await.is_err() {
                break;
            }
        }

        for task in watch_tasks {
            task.abort();
        }
        drop(outbound_tx);
        let _ = writer_task.await;
        outcome
    }

    /// Execute one operation against the tree.
    async fn apply(
        &self,
        op: StoreOp,
        peer_addr: SocketAddr,
        outbound: &mpsc::Sender<StoreReply>,
        watch_tasks: &mut Vec<JoinHandle<()>>,
    ) -> Result<StoreOutcome, StoreError> {
        match op {
            StoreOp::Create { path } => {
                let created = self.store.create_persistent(&path).await?;
                if created {
                    debug!("{} created {}", peer_addr, path);
                }
                Ok(StoreOutcome::Created(created))
            }
            StoreOp::Exists { path } => Ok(StoreOutcome::Exists(self.store.exists(&path).await?)),
            StoreOp::Children { path } => {
                Ok(StoreOutcome::Children(self.store.children(&path).await?))
            }
            StoreOp::Delete { path } => {
                self.store.delete(&path).await?;
                debug!("{} deleted {}", peer_addr, path);
                Ok(StoreOutcome::Deleted)
            }
            StoreOp::Watch { path } => {
                let mut watch = self.store.watch_children(&path).await?;
                let outbound = outbound.clone();
                watch_tasks.push(tokio::spawn(async move {
                    while let Some(children) = watch.changed().await {
                        let event = StoreReply::ChildrenChanged {
                            path: watch.path().to_string(),
                            children,
                        };
                        if outbound.send(event).await.is_err() {
                            break;
                        }
                    }
                }));
                debug!("{} watching {}", peer_addr, path);
                Ok(StoreOutcome::Watching)
            }
            StoreOp::Ping => Ok(StoreOutcome::Pong),
        }
    }

    /// Signal the server to shutdown.
    pub async fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Server already running")]
    AlreadyRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}
