// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! flowrpc Registry Server
//!
//! Hosts the coordination tree that providers register into and clients
//! watch. Speaks the length-prefixed JSON protocol of
//! [`flowrpc::registry::wire`], so any process can point
//! `registry = "remote"` at it.

pub mod config;
pub mod server;

pub use config::{ConfigError, ServerConfig};
pub use server::{RegistryServer, ServerError};
