// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP client for `flowrpc-registry-server`.
//!
//! The session is opened on first use and reopened on the next operation
//! after it drops. Each attempt is bounded by the connect timeout; failed
//! attempts are retried with exponential backoff (`retry_base * 2^n`, up to
//! `max_retries` retries) before the triggering operation fails. Requests are
//! multiplexed over one connection and matched by id; watch events are
//! routed to local subscribers by path. Watch streams end with their
//! session, and subscribers re-subscribe to get a watch on the new one.

use super::store::{validate_path, ChildWatch, CoordinationStore};
use super::wire::{
    read_message, write_message, StoreOp, StoreOutcome, StoreReply, StoreRequest,
    DEFAULT_MAX_MESSAGE_SIZE,
};
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};

type Pending = Arc<DashMap<u64, oneshot::Sender<Result<StoreOutcome, StoreError>>>>;
type Watchers = Arc<DashMap<String, Vec<mpsc::UnboundedSender<Vec<String>>>>>;

/// Remote store tuning.
#[derive(Debug, Clone)]
pub struct RemoteStoreConfig {
    pub address: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Keepalive interval while the session is idle
    pub ping_interval: Duration,
    pub max_message_size: usize,
    /// First reconnect delay, doubled per attempt
    pub retry_base: Duration,
    /// Retries after the first failed connect
    pub max_retries: u32,
}

impl RemoteStoreConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(10),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            retry_base: Duration::from_millis(1000),
            max_retries: 3,
        }
    }

    /// Delay before retry `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.retry_base.saturating_mul(factor)
    }
}

struct Session {
    outbound: mpsc::UnboundedSender<StoreRequest>,
    pending: Pending,
    watchers: Watchers,
    closed: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

/// Coordination store backed by a registry server.
pub struct RemoteStore {
    config: RemoteStoreConfig,
    session: Mutex<Option<Arc<Session>>>,
    /// Serializes reconnects
    connecting: tokio::sync::Mutex<()>,
    /// Set by `close`; no reconnects afterwards
    closed: AtomicBool,
    next_id: AtomicU64,
}

impl RemoteStore {
    /// Creates the client without connecting.
    pub fn new(config: RemoteStoreConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
            connecting: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn address(&self) -> &str {
        &self.config.address
    }

    pub fn is_connected(&self) -> bool {
        self.live_session().is_some()
    }

    fn live_session(&self) -> Option<Arc<Session>> {
        self.session
            .lock()
            .as_ref()
            .filter(|s| !s.closed.load(Ordering::Acquire))
            .cloned()
    }

    async fn session(&self) -> Result<Arc<Session>, StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Connection(format!(
                "store for {} is closed",
                self.config.address
            )));
        }
        if let Some(session) = self.live_session() {
            return Ok(session);
        }
        let _guard = self.connecting.lock().await;
        if let Some(session) = self.live_session() {
            return Ok(session);
        }
        let session = Arc::new(self.connect_with_retry().await?);
        *self.session.lock() = Some(Arc::clone(&session));
        Ok(session)
    }

    async fn connect_with_retry(&self) -> Result<Session, StoreError> {
        let mut attempt = 0;
        loop {
            match self.connect().await {
                Ok(session) => return Ok(session),
                Err(e) if attempt < self.config.max_retries => {
                    let delay = self.config.backoff(attempt);
                    log::warn!(
                        "[REGISTRY] connect to {} failed ({}), retrying in {:?}",
                        self.config.address,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn connect(&self) -> Result<Session, StoreError> {
        let address = self.config.address.clone();
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| StoreError::ConnectTimeout(address.clone()))?
            .map_err(|e| StoreError::Connection(format!("{}: {}", address, e)))?;
        let _ = stream.set_nodelay(true);
        log::info!("[REGISTRY] connected to coordination store at {}", address);

        let (mut reader, mut writer) = stream.into_split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<StoreRequest>();
        let pending: Pending = Arc::new(DashMap::new());
        let watchers: Watchers = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());

        let ping_interval = self.config.ping_interval;
        let writer_closed = Arc::clone(&closed);
        let writer_shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            loop {
                let request = tokio::select! {
                    msg = outbound_rx.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                    _ = tokio::time::sleep(ping_interval) => StoreRequest { id: 0, op: StoreOp::Ping },
                    _ = writer_shutdown.notified() => break,
                };
                if let Err(e) = write_message(&mut writer, &request).await {
                    log::warn!("[REGISTRY] write failed: {}", e);
                    break;
                }
            }
            writer_closed.store(true, Ordering::Release);
        });

        let max_size = self.config.max_message_size;
        let reader_pending = Arc::clone(&pending);
        let reader_watchers = Arc::clone(&watchers);
        let reader_closed = Arc::clone(&closed);
        let reader_shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            loop {
                let reply = tokio::select! {
                    r = read_message::<_, StoreReply>(&mut reader, max_size) => r,
                    _ = reader_shutdown.notified() => break,
                };
                match reply {
                    Ok(Some(StoreReply::Response { id, result })) => {
                        if let Some((_, tx)) = reader_pending.remove(&id) {
                            let _ = tx.send(result);
                        } else if id != 0 {
                            log::warn!("[REGISTRY] unmatched reply id {}", id);
                        }
                    }
                    Ok(Some(StoreReply::ChildrenChanged { path, children })) => {
                        if let Some(mut senders) = reader_watchers.get_mut(&path) {
                            senders.retain(|tx| tx.send(children.clone()).is_ok());
                        }
                    }
                    Ok(None) => {
                        log::info!("[REGISTRY] coordination store closed the session");
                        break;
                    }
                    Err(e) => {
                        log::warn!("[REGISTRY] read failed: {}", e);
                        break;
                    }
                }
            }
            reader_closed.store(true, Ordering::Release);
            // Stops the writer; waiters and watch streams see closed channels
            reader_shutdown.notify_waiters();
            reader_pending.clear();
            reader_watchers.clear();
        });

        Ok(Session {
            outbound,
            pending,
            watchers,
            closed,
            shutdown,
        })
    }

    async fn call(&self, op: StoreOp) -> Result<StoreOutcome, StoreError> {
        let session = self.session().await?;
        self.call_on(&session, op).await
    }

    async fn call_on(&self, session: &Session, op: StoreOp) -> Result<StoreOutcome, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        session.pending.insert(id, tx);

        if session.outbound.send(StoreRequest { id, op }).is_err() {
            session.pending.remove(&id);
            return Err(StoreError::Connection("session writer stopped".to_string()));
        }

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(StoreError::Connection("session closed".to_string())),
            Err(_) => {
                session.pending.remove(&id);
                Err(StoreError::Connection(format!(
                    "request {} timed out after {:?}",
                    id, self.config.request_timeout
                )))
            }
        }
    }
}

fn unexpected(outcome: StoreOutcome) -> StoreError {
    StoreError::Protocol(format!("unexpected reply {:?}", outcome))
}

#[async_trait]
impl CoordinationStore for RemoteStore {
    async fn create_persistent(&self, path: &str) -> Result<bool, StoreError> {
        validate_path(path)?;
        match self.call(StoreOp::Create { path: path.to_string() }).await? {
            StoreOutcome::Created(created) => Ok(created),
            other => Err(unexpected(other)),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        validate_path(path)?;
        match self.call(StoreOp::Exists { path: path.to_string() }).await? {
            StoreOutcome::Exists(exists) => Ok(exists),
            other => Err(unexpected(other)),
        }
    }

    async fn children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        validate_path(path)?;
        match self.call(StoreOp::Children { path: path.to_string() }).await? {
            StoreOutcome::Children(children) => Ok(children),
            other => Err(unexpected(other)),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        validate_path(path)?;
        match self.call(StoreOp::Delete { path: path.to_string() }).await? {
            StoreOutcome::Deleted => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn watch_children(&self, path: &str) -> Result<ChildWatch, StoreError> {
        validate_path(path)?;
        let session = self.session().await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let first = {
            let mut senders = session.watchers.entry(path.to_string()).or_default();
            senders.push(tx);
            senders.len() == 1
        };
        if first {
            match self
                .call_on(&session, StoreOp::Watch { path: path.to_string() })
                .await?
            {
                StoreOutcome::Watching => {}
                other => return Err(unexpected(other)),
            }
        }
        Ok(ChildWatch::new(path, rx))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(session) = self.session.lock().take() {
            session.closed.store(true, Ordering::Release);
            session.shutdown.notify_waiters();
            log::info!("[REGISTRY] session to {} closed", self.config.address);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_is_error() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let mut config = RemoteStoreConfig::new(addr.to_string());
        config.connect_timeout = Duration::from_secs(2);
        config.max_retries = 0;
        let store = RemoteStore::new(config);
        let err = store.exists("/flow-rpc").await.expect_err("no server");
        assert!(matches!(
            err,
            StoreError::Connection(_) | StoreError::ConnectTimeout(_)
        ));
        assert!(!store.is_connected());
    }

    #[test]
    fn test_backoff_doubles() {
        let mut config = RemoteStoreConfig::new("127.0.0.1:1");
        config.retry_base = Duration::from_millis(100);
        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(800));
        // Saturates instead of overflowing
        assert!(config.backoff(64) >= config.backoff(31));
    }

    #[tokio::test]
    async fn test_retries_before_failing() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let mut config = RemoteStoreConfig::new(addr.to_string());
        config.retry_base = Duration::from_millis(20);
        config.max_retries = 2;
        let store = RemoteStore::new(config);
        let started = std::time::Instant::now();
        assert!(store.exists("/flow-rpc").await.is_err());
        // 20ms + 40ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_closed_store_does_not_reconnect() {
        let store = RemoteStore::new(RemoteStoreConfig::new("127.0.0.1:1"));
        store.close().await;
        let err = store.exists("/flow-rpc").await.expect_err("closed");
        assert!(matches!(err, StoreError::Connection(ref m) if m.contains("closed")));
    }

    #[tokio::test]
    async fn test_invalid_path_rejected_before_connect() {
        let store = RemoteStore::new(RemoteStoreConfig::new("127.0.0.1:1"));
        assert_eq!(
            store.children("relative").await,
            Err(StoreError::InvalidPath("relative".into()))
        );
        assert!(!store.is_connected());
    }
}
