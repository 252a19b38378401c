// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! `RemoteStore` sessions against a live registry server, and a full call
//! routed through it.

use flowrpc::registry::{CoordinationStore, RemoteStore, RemoteStoreConfig};
use flowrpc::loadbalance::RandomLoadBalance;
use flowrpc::{
    RpcClient, RpcConfig, RpcServer, ServiceDefinition, ServiceDiscovery, ServiceKey,
    ServiceRegistry, StoreError,
};
use flowrpc_registry_server::{RegistryServer, ServerConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};

async fn registry() -> RegistryServer {
    registry_on(0).await
}

async fn registry_on(port: u16) -> RegistryServer {
    let config = ServerConfig {
        bind_address: "127.0.0.1".parse().expect("ip"),
        port,
        ..Default::default()
    };
    let server = RegistryServer::bind(config).await.expect("bind registry");
    let runner = server.clone();
    tokio::spawn(async move { runner.run().await });
    server
}

fn remote(server: &RegistryServer) -> Arc<RemoteStore> {
    Arc::new(RemoteStore::new(RemoteStoreConfig::new(
        server.local_addr().to_string(),
    )))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_remote_store_operations() {
    let server = registry().await;
    let store = remote(&server);

    assert!(store
        .create_persistent("/flow-rpc/Greeter::v1/10.0.0.5:9998")
        .await
        .expect("create"));
    assert!(!store
        .create_persistent("/flow-rpc/Greeter::v1/10.0.0.5:9998")
        .await
        .expect("create again"));
    assert!(store.exists("/flow-rpc/Greeter::v1").await.expect("exists"));
    assert_eq!(
        store.children("/flow-rpc/Greeter::v1").await.expect("children"),
        vec!["10.0.0.5:9998".to_string()]
    );
    assert!(matches!(
        store.delete("/flow-rpc/Greeter::v1").await,
        Err(StoreError::NotEmpty(_))
    ));
    store
        .delete("/flow-rpc/Greeter::v1/10.0.0.5:9998")
        .await
        .expect("delete");
    assert!(store
        .children("/flow-rpc/Greeter::v1")
        .await
        .expect("children")
        .is_empty());

    store.close().await;
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_watches_cross_sessions() {
    let server = registry().await;
    let watcher = remote(&server);
    let writer = remote(&server);

    let mut watch = watcher
        .watch_children("/flow-rpc/Greeter::v1")
        .await
        .expect("watch");

    let registry = ServiceRegistry::new(Arc::clone(&writer) as _, "/flow-rpc");
    registry
        .register("Greeter::v1", "10.0.0.5:9998")
        .await
        .expect("register");

    let children = tokio::time::timeout(Duration::from_secs(5), watch.changed())
        .await
        .expect("event in time")
        .expect("event");
    assert_eq!(children, vec!["10.0.0.5:9998".to_string()]);

    assert_eq!(registry.deregister_all().await, 1);
    let children = tokio::time::timeout(Duration::from_secs(5), watch.changed())
        .await
        .expect("event in time")
        .expect("event");
    assert!(children.is_empty());

    watcher.close().await;
    writer.close().await;
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_call_routed_through_registry_server() {
    let server = registry().await;
    let key = ServiceKey::new("Greeter").with_version("v1");

    let config = RpcConfig::default()
        .with_registry("remote")
        .with_registry_address(server.local_addr().to_string());

    let provider = Arc::new(
        RpcServer::bind(config.clone().with_bind("127.0.0.1:0".parse().expect("addr")))
            .await
            .expect("bind provider"),
    );
    provider
        .publish(
            &key,
            ServiceDefinition::new("Greeter")
                .method("hello", |(name,): (String,)| Ok(format!("hello {}", name))),
        )
        .await
        .expect("publish");
    let runner = Arc::clone(&provider);
    tokio::spawn(async move { runner.run().await });

    let client = RpcClient::new(config).await.expect("client");
    let reply: String = client
        .make_proxy(key)
        .call("hello", ("world".to_string(),))
        .await
        .expect("call");
    assert_eq!(reply, "hello world");

    client.shutdown().await;
    provider.shutdown().await;
    assert!(server
        .store()
        .list_children("/flow-rpc/Greeter::v1")
        .is_empty());
    server.shutdown().await;
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Stops `server` and waits until its listener is released.
async fn stop(server: &RegistryServer) {
    eventually("registry to start", || server.is_running()).await;
    server.shutdown().await;
    eventually("registry to stop", || !server.is_running()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_session_recovers_after_registry_restart() {
    let first = registry().await;
    let port = first.local_addr().port();
    let mut config = RemoteStoreConfig::new(first.local_addr().to_string());
    config.retry_base = Duration::from_millis(50);
    config.max_retries = 5;
    let store = Arc::new(RemoteStore::new(config));

    assert!(store
        .create_persistent("/flow-rpc/Greeter::v1/10.0.0.5:9998")
        .await
        .expect("create"));
    let discovery = ServiceDiscovery::new(
        Arc::clone(&store) as _,
        "/flow-rpc",
        Arc::new(RandomLoadBalance),
    );
    discovery.lookup("Greeter::v1").await.expect("lookup");

    stop(&first).await;
    eventually("session to drop", || !store.is_connected()).await;

    let second = registry_on(port).await;
    // The new registry starts empty; the store reconnects on demand
    assert!(!store.exists("/flow-rpc/Greeter::v1").await.expect("exists"));
    assert!(store.is_connected());

    // Discovery re-subscribes on the new session and follows its changes
    let writer = remote(&second);
    ServiceRegistry::new(Arc::clone(&writer) as _, "/flow-rpc")
        .register("Greeter::v1", "10.0.0.6:9998")
        .await
        .expect("register");
    eventually("discovery to follow the new registry", || {
        discovery
            .cached("Greeter::v1")
            .is_some_and(|list| *list == vec!["10.0.0.6:9998".to_string()])
    })
    .await;

    discovery.shutdown();
    store.close().await;
    writer.close().await;
    second.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_provider_shutdown_keeps_shared_store_open() {
    let server = registry().await;
    let store = remote(&server);
    let key = ServiceKey::new("Greeter").with_version("v1");

    let provider = Arc::new(
        RpcServer::bind_with_store(
            RpcConfig::default().with_bind("127.0.0.1:0".parse().expect("addr")),
            Arc::clone(&store) as _,
        )
        .await
        .expect("bind provider"),
    );
    provider
        .publish(
            &key,
            ServiceDefinition::new("Greeter").method("ping", |(): ()| Ok(true)),
        )
        .await
        .expect("publish");
    provider.shutdown().await;

    // Same session still serves the other user of the store
    assert!(store.is_connected());
    assert!(store
        .children("/flow-rpc/Greeter::v1")
        .await
        .expect("children")
        .is_empty());

    store.close().await;
    server.shutdown().await;
}
