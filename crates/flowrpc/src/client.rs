// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client bootstrap: store, discovery and transport wired from one config.

use crate::config::RpcConfig;
use crate::error::RpcError;
use crate::extension::Extensions;
use crate::protocol::ServiceKey;
use crate::proxy::RpcClientProxy;
use crate::registry::{CoordinationStore, ServiceDiscovery};
use crate::transport::{RpcRequestTransport, TransportContext};
use std::sync::Arc;

/// Entry point for calling remote services.
///
/// ```no_run
/// # async fn demo() -> Result<(), flowrpc::RpcError> {
/// use flowrpc::{RpcClient, RpcConfig, ServiceKey};
///
/// let client = RpcClient::new(RpcConfig::default()).await?;
/// let greeter = client.make_proxy(ServiceKey::new("Greeter").with_version("v1"));
/// let reply: String = greeter.call("hello", ("world".to_string(),)).await?;
/// # let _ = reply;
/// # Ok(())
/// # }
/// ```
pub struct RpcClient {
    config: Arc<RpcConfig>,
    store: Arc<dyn CoordinationStore>,
    discovery: Arc<ServiceDiscovery>,
    transport: Arc<dyn RpcRequestTransport>,
    owns_store: bool,
}

impl RpcClient {
    /// Builds a client using the store named by `config.registry`.
    pub async fn new(config: RpcConfig) -> Result<Self, RpcError> {
        let extensions = Extensions::with_manifest_dirs(&config.extension_dirs);
        let store = extensions.store(&config.registry, &config)?;
        Self::build(config, &extensions, store, true)
    }

    /// Builds a client over an already constructed store, which
    /// [`shutdown`](Self::shutdown) leaves open.
    pub async fn with_store(
        config: RpcConfig,
        store: Arc<dyn CoordinationStore>,
    ) -> Result<Self, RpcError> {
        let extensions = Extensions::with_manifest_dirs(&config.extension_dirs);
        Self::build(config, &extensions, store, false)
    }

    fn build(
        config: RpcConfig,
        extensions: &Extensions,
        store: Arc<dyn CoordinationStore>,
        owns_store: bool,
    ) -> Result<Self, RpcError> {
        config.validate()?;
        let load_balance = extensions.load_balance(&config.load_balance)?;
        let discovery = Arc::new(ServiceDiscovery::new(
            Arc::clone(&store),
            config.registry_root.clone(),
            load_balance,
        ));
        let ctx = TransportContext {
            config: config.clone(),
            discovery: Arc::clone(&discovery),
            codec: Arc::new(extensions.codec(config.max_frame_size)),
        };
        let transport = extensions.transport(&config.transport, &ctx)?;
        log::info!(
            "[CLIENT] ready (transport={}, serializer={}, compressor={}, load_balance={})",
            config.transport,
            config.serializer,
            config.compressor,
            config.load_balance
        );
        Ok(Self {
            config: Arc::new(config),
            store,
            discovery,
            transport,
            owns_store,
        })
    }

    /// Proxy for one service key. Proxies are cheap to clone.
    pub fn make_proxy(&self, key: ServiceKey) -> RpcClientProxy {
        RpcClientProxy::new(
            key,
            Arc::clone(&self.transport),
            self.config.call_timeout(),
        )
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    pub fn discovery(&self) -> &Arc<ServiceDiscovery> {
        &self.discovery
    }

    pub fn transport(&self) -> &Arc<dyn RpcRequestTransport> {
        &self.transport
    }

    /// Closes connections and stops watches. The store session is closed
    /// only if `new` opened it.
    pub async fn shutdown(&self) {
        self.transport.close().await;
        self.discovery.shutdown();
        if self.owns_store {
            self.store.close().await;
        }
        log::debug!("[CLIENT] shut down");
    }
}
