// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client request transports.
//!
//! - `tcp`: multiplexed persistent connections, see [`TcpClientTransport`]
//! - `socket`: one short-lived connection per call, see [`SocketTransport`]

mod connection;
mod pending;
mod socket;
mod tcp;

pub use connection::{ClientConnection, ConnectionCache, ConnectionOptions};
pub use pending::{PendingCalls, UnmatchedResponse};
pub use socket::SocketTransport;
pub use tcp::TcpClientTransport;

use crate::codec::MessageCodec;
use crate::config::RpcConfig;
use crate::error::RpcError;
use crate::protocol::{RpcRequest, RpcResponse};
use crate::registry::ServiceDiscovery;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

/// Everything a transport needs at construction.
#[derive(Clone)]
pub struct TransportContext {
    pub config: RpcConfig,
    pub discovery: Arc<ServiceDiscovery>,
    pub codec: Arc<MessageCodec>,
}

/// Result slot of one call.
///
/// Returned as soon as the request frame is handed to the transport; the
/// caller suspends only in [`ResponseFuture::wait`].
#[derive(Debug)]
pub struct ResponseFuture {
    rx: oneshot::Receiver<RpcResponse>,
    registration: Option<(Arc<PendingCalls>, u32)>,
    reader: Option<AbortHandle>,
}

impl ResponseFuture {
    /// Slot resolved by a [`PendingCalls`] entry.
    pub fn pending(
        rx: oneshot::Receiver<RpcResponse>,
        pending: Arc<PendingCalls>,
        correlation_id: u32,
    ) -> Self {
        Self {
            rx,
            registration: Some((pending, correlation_id)),
            reader: None,
        }
    }

    /// Slot filled by a dedicated reader task, aborted if the wait times out.
    pub fn from_task(rx: oneshot::Receiver<RpcResponse>, reader: AbortHandle) -> Self {
        Self {
            rx,
            registration: None,
            reader: Some(reader),
        }
    }

    /// Slot that already holds its response.
    pub fn ready(response: RpcResponse) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(response);
        Self {
            rx,
            registration: None,
            reader: None,
        }
    }

    pub fn correlation_id(&self) -> Option<u32> {
        self.registration.as_ref().map(|(_, id)| *id)
    }

    /// Waits for the response. `Ok(None)` means the slot was dropped
    /// without a response. On timeout the pending entry is removed.
    pub async fn wait(self, timeout: Duration) -> Result<Option<RpcResponse>, RpcError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(response)) => Ok(Some(response)),
            Ok(Err(_)) => Ok(None),
            Err(_) => {
                if let Some((pending, id)) = self.registration {
                    pending.cancel(id);
                    log::debug!("[CLIENT] call {} timed out after {:?}", id, timeout);
                }
                if let Some(reader) = self.reader {
                    reader.abort();
                }
                Err(RpcError::Timeout)
            }
        }
    }
}

/// Sends call requests to the provider chosen by discovery.
#[async_trait]
pub trait RpcRequestTransport: Send + Sync {
    async fn send_request(&self, request: RpcRequest) -> Result<ResponseFuture, RpcError>;

    /// Releases connections. Further sends may reconnect.
    async fn close(&self) {}
}
