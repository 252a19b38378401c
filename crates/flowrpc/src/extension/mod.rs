// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Named extensions for serializers, compressors, load balancers,
//! coordination stores and transports.
//!
//! Each capability has a manifest (`name=implementation` lines) compiled
//! into the crate. Directories added with [`Extensions::with_manifest_dirs`]
//! may remap names to other built-in implementations.

mod loader;
mod manifest;

pub use loader::{ExtensionLoader, Factory};
pub use manifest::{parse_manifest, ManifestSource};

use crate::codec::MessageCodec;
use crate::compress::{Compressor, GzipCompressor, IdentityCompressor};
use crate::config::RpcConfig;
use crate::error::ExtensionError;
use crate::loadbalance::{ConsistentHashLoadBalance, LoadBalance, RandomLoadBalance};
use crate::registry::{CoordinationStore, MemoryStore, RemoteStore, RemoteStoreConfig};
use crate::serialize::{JsonSerializer, Serializer};
use crate::transport::{RpcRequestTransport, SocketTransport, TcpClientTransport, TransportContext};
use std::path::PathBuf;
use std::sync::Arc;

pub const SERIALIZER: &str = "flowrpc.Serializer";
pub const COMPRESSOR: &str = "flowrpc.Compressor";
pub const LOAD_BALANCE: &str = "flowrpc.LoadBalance";
pub const COORDINATION_STORE: &str = "flowrpc.CoordinationStore";
pub const TRANSPORT: &str = "flowrpc.RpcRequestTransport";

const SERIALIZER_MANIFEST: &str = include_str!("../../manifests/flowrpc.Serializer");
const COMPRESSOR_MANIFEST: &str = include_str!("../../manifests/flowrpc.Compressor");
const LOAD_BALANCE_MANIFEST: &str = include_str!("../../manifests/flowrpc.LoadBalance");
const STORE_MANIFEST: &str = include_str!("../../manifests/flowrpc.CoordinationStore");
const TRANSPORT_MANIFEST: &str = include_str!("../../manifests/flowrpc.RpcRequestTransport");

/// One loader per capability, owned by a client or server.
#[derive(Debug)]
pub struct Extensions {
    serializers: Arc<ExtensionLoader<dyn Serializer>>,
    compressors: Arc<ExtensionLoader<dyn Compressor>>,
    load_balancers: ExtensionLoader<dyn LoadBalance>,
    stores: ExtensionLoader<dyn CoordinationStore, RpcConfig>,
    transports: ExtensionLoader<dyn RpcRequestTransport, TransportContext>,
}

fn sources(embedded: &'static str, dirs: &[PathBuf]) -> Vec<ManifestSource> {
    std::iter::once(ManifestSource::Embedded(embedded))
        .chain(dirs.iter().cloned().map(ManifestSource::Directory))
        .collect()
}

fn with_sources<T: ?Sized + Send + Sync, C>(
    mut loader: ExtensionLoader<T, C>,
    sources: Vec<ManifestSource>,
) -> ExtensionLoader<T, C> {
    for source in sources {
        loader = loader.with_source(source);
    }
    loader
}

impl Extensions {
    /// Built-in manifests only.
    pub fn builtin() -> Self {
        Self::with_manifest_dirs(&[])
    }

    /// Built-in manifests overlaid by manifest files found in `dirs`.
    pub fn with_manifest_dirs(dirs: &[PathBuf]) -> Self {
        let serializers = ExtensionLoader::<dyn Serializer>::new(SERIALIZER).with_factory(
            "flowrpc::serialize::JsonSerializer",
            |_: &()| Ok(Arc::new(JsonSerializer) as Arc<dyn Serializer>),
        );
        #[cfg(feature = "cbor")]
        let serializers = serializers.with_factory("flowrpc::serialize::CborSerializer", |_: &()| {
            Ok(Arc::new(crate::serialize::CborSerializer) as Arc<dyn Serializer>)
        });

        let compressors = ExtensionLoader::<dyn Compressor>::new(COMPRESSOR)
            .with_factory("flowrpc::compress::IdentityCompressor", |_: &()| {
                Ok(Arc::new(IdentityCompressor) as Arc<dyn Compressor>)
            })
            .with_factory("flowrpc::compress::GzipCompressor", |_: &()| {
                Ok(Arc::new(GzipCompressor::default()) as Arc<dyn Compressor>)
            });
        #[cfg(feature = "lz4")]
        let compressors = compressors.with_factory("flowrpc::compress::Lz4Compressor", |_: &()| {
            Ok(Arc::new(crate::compress::Lz4Compressor) as Arc<dyn Compressor>)
        });

        let load_balancers = ExtensionLoader::<dyn LoadBalance>::new(LOAD_BALANCE)
            .with_factory("flowrpc::loadbalance::RandomLoadBalance", |_: &()| {
                Ok(Arc::new(RandomLoadBalance) as Arc<dyn LoadBalance>)
            })
            .with_factory("flowrpc::loadbalance::ConsistentHashLoadBalance", |_: &()| {
                Ok(Arc::new(ConsistentHashLoadBalance::new()) as Arc<dyn LoadBalance>)
            });

        let stores = ExtensionLoader::<dyn CoordinationStore, RpcConfig>::new(COORDINATION_STORE)
            .with_factory("flowrpc::registry::RemoteStore", |config: &RpcConfig| {
                let mut remote = RemoteStoreConfig::new(config.registry_address.clone());
                remote.connect_timeout = config.registry_connect_timeout();
                Ok(Arc::new(RemoteStore::new(remote)) as Arc<dyn CoordinationStore>)
            })
            .with_factory("flowrpc::registry::MemoryStore", |_: &RpcConfig| {
                Ok(Arc::new(MemoryStore::new()) as Arc<dyn CoordinationStore>)
            });

        let transports =
            ExtensionLoader::<dyn RpcRequestTransport, TransportContext>::new(TRANSPORT)
                .with_factory(
                    "flowrpc::transport::TcpClientTransport",
                    |ctx: &TransportContext| {
                        TcpClientTransport::new(ctx)
                            .map(|t| Arc::new(t) as Arc<dyn RpcRequestTransport>)
                            .map_err(|e| construct_error("TcpClientTransport", e))
                    },
                )
                .with_factory("flowrpc::transport::SocketTransport", |ctx: &TransportContext| {
                    SocketTransport::new(ctx)
                        .map(|t| Arc::new(t) as Arc<dyn RpcRequestTransport>)
                        .map_err(|e| construct_error("SocketTransport", e))
                });

        Self {
            serializers: Arc::new(with_sources(serializers, sources(SERIALIZER_MANIFEST, dirs))),
            compressors: Arc::new(with_sources(compressors, sources(COMPRESSOR_MANIFEST, dirs))),
            load_balancers: with_sources(load_balancers, sources(LOAD_BALANCE_MANIFEST, dirs)),
            stores: with_sources(stores, sources(STORE_MANIFEST, dirs)),
            transports: with_sources(transports, sources(TRANSPORT_MANIFEST, dirs)),
        }
    }

    /// Wire codec resolving serializers and compressors through this bundle.
    pub fn codec(&self, max_frame_size: usize) -> MessageCodec {
        MessageCodec::new(
            Arc::clone(&self.serializers),
            Arc::clone(&self.compressors),
            max_frame_size,
        )
    }

    pub fn serializer(&self, name: &str) -> Result<Arc<dyn Serializer>, ExtensionError> {
        self.serializers.resolve(name, &())
    }

    pub fn compressor(&self, name: &str) -> Result<Arc<dyn Compressor>, ExtensionError> {
        self.compressors.resolve(name, &())
    }

    pub fn load_balance(&self, name: &str) -> Result<Arc<dyn LoadBalance>, ExtensionError> {
        self.load_balancers.resolve(name, &())
    }

    pub fn store(
        &self,
        name: &str,
        config: &RpcConfig,
    ) -> Result<Arc<dyn CoordinationStore>, ExtensionError> {
        self.stores.resolve(name, config)
    }

    pub fn transport(
        &self,
        name: &str,
        ctx: &TransportContext,
    ) -> Result<Arc<dyn RpcRequestTransport>, ExtensionError> {
        self.transports.resolve(name, ctx)
    }
}

impl Default for Extensions {
    fn default() -> Self {
        Self::builtin()
    }
}

fn construct_error(implementation: &str, e: impl std::fmt::Display) -> ExtensionError {
    ExtensionError::Construct {
        implementation: implementation.to_string(),
        message: e.to_string(),
    }
}
