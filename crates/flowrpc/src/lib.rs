// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! flowrpc - service-oriented RPC over TCP
//!
//! Providers publish services under a key (`interface:group:version`) into a
//! coordination store; consumers discover providers through the same store,
//! pick one with a load balancer and exchange length-prefixed frames with it.
//!
//! # Features
//!
//! - **Wire codec**: 16-byte header, pluggable serializer (`json`, `cbor`) and
//!   compressor (`none`, `gzip`, `lz4`) per frame
//! - **Multiplexed transport**: one cached connection per provider, many
//!   in-flight calls matched by correlation id, heartbeats on idle
//! - **Discovery**: watched, cached provider lists with random or
//!   consistent-hash selection
//! - **Extensions**: named implementations loaded from manifests, overridable
//!   from configuration directories
//!
//! # Quick Start
//!
//! ```no_run
//! use flowrpc::{RpcClient, RpcConfig, RpcServer, ServiceDefinition, ServiceKey};
//!
//! # async fn demo() -> Result<(), flowrpc::RpcError> {
//! let key = ServiceKey::new("Greeter").with_version("v1");
//!
//! let server = RpcServer::bind(RpcConfig::default()).await?;
//! server
//!     .publish(
//!         &key,
//!         ServiceDefinition::new("Greeter")
//!             .method("hello", |(name,): (String,)| Ok(format!("hello {name}"))),
//!     )
//!     .await?;
//! tokio::spawn(async move { server.run().await });
//!
//! let client = RpcClient::new(RpcConfig::default()).await?;
//! let greeting: String = client
//!     .make_proxy(key)
//!     .call("hello", ("world".to_string(),))
//!     .await?;
//! assert_eq!(greeting, "hello world");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod compress;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extension;
pub mod loadbalance;
pub mod params;
pub mod protocol;
pub mod provider;
pub mod proxy;
pub mod registry;
pub mod serialize;
pub mod server;
pub mod transport;

pub use client::RpcClient;
pub use codec::{FrameAssembler, MessageCodec};
pub use config::RpcConfig;
pub use dispatch::{DispatchError, RequestDispatcher};
pub use error::{
    CodecError, ConfigError, ExtensionError, PayloadError, RpcError, RpcResult, StoreError,
};
pub use extension::Extensions;
pub use params::{ParamTuple, TypeDescriptor};
pub use protocol::{
    CompressorKind, MessageBody, MessageType, RpcMessage, RpcRequest, RpcResponse,
    SerializerKind, ServiceKey,
};
pub use provider::{HandlerError, ServiceDefinition, ServiceProvider};
pub use proxy::RpcClientProxy;
pub use registry::{
    CoordinationStore, MemoryStore, RemoteStore, RemoteStoreConfig, ServiceDiscovery,
    ServiceRegistry,
};
pub use server::RpcServer;
pub use transport::{ResponseFuture, RpcRequestTransport, TransportContext};
