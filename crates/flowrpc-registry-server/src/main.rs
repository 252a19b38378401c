// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! flowrpc Registry Server
//!
//! Standalone coordination store for flowrpc deployments:
//! - providers register `host:port` nodes under their service key
//! - clients read and watch those nodes to find providers
//!
//! # Usage
//!
//! ```bash
//! # Start server on default port (2181)
//! flowrpc-registry-server
//!
//! # Custom port and config
//! flowrpc-registry-server --port 2200 --config registry.json
//! ```

use clap::Parser;
use flowrpc_registry_server::{RegistryServer, ServerConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// flowrpc Registry Server - service registration and discovery
#[derive(Parser, Debug)]
#[command(name = "flowrpc-registry-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "2181")]
    port: u16,

    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Close sessions silent for this many seconds
    #[arg(long, default_value = "30")]
    session_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG takes precedence over --log-level
    let level = match args.log_level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => args.log_level.as_str(),
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Also bridges `log` records from the flowrpc library
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| -> Box<dyn std::error::Error> { e })?;

    // Load or create config
    let config = if let Some(config_path) = args.config {
        info!("Loading config from {:?}", config_path);
        ServerConfig::from_file(&config_path)?
    } else {
        ServerConfig {
            bind_address: args.bind.parse()?,
            port: args.port,
            session_timeout_secs: args.session_timeout,
            ..Default::default()
        }
    };

    let server = RegistryServer::bind(config.clone()).await?;

    info!("+----------------------------------------------------+");
    info!(
        "|       flowrpc Registry Server v{}              |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Bind:     {:38} |", server.local_addr());
    info!(
        "|  Session:  {:38} |",
        format!("{}s", config.session_timeout_secs)
    );
    info!("|  Max msg:  {:38} |", config.max_message_size);
    info!("+----------------------------------------------------+");

    // Handle shutdown signals
    let server_handle = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping server...");
        server_handle.shutdown().await;
    });

    server.run().await?;

    info!("Registry server stopped");
    Ok(())
}
