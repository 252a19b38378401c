// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client and server configuration.

use crate::error::ConfigError;
use crate::protocol::{CompressorKind, SerializerKind, MAX_FRAME_LENGTH};
use crate::registry::DEFAULT_ROOT;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime configuration shared by [`crate::RpcClient`] and
/// [`crate::RpcServer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Coordination store address (default: 127.0.0.1:2181)
    #[serde(default = "default_registry_address")]
    pub registry_address: String,

    /// Coordination store extension name (`remote` or `memory`)
    #[serde(default = "default_registry")]
    pub registry: String,

    /// Root namespace for registrations
    #[serde(default = "default_registry_root")]
    pub registry_root: String,

    /// Bound on reaching the coordination store (milliseconds)
    #[serde(default = "default_registry_connect_timeout")]
    pub registry_connect_timeout_ms: u64,

    /// Payload serializer extension name
    #[serde(default = "default_serializer")]
    pub serializer: String,

    /// Body compressor extension name
    #[serde(default = "default_compressor")]
    pub compressor: String,

    /// Load balancer extension name
    #[serde(default = "default_load_balance")]
    pub load_balance: String,

    /// Client transport extension name (`tcp` or `socket`)
    #[serde(default = "default_transport")]
    pub transport: String,

    /// Additional manifest directories, searched after the built-in manifests
    #[serde(default)]
    pub extension_dirs: Vec<PathBuf>,

    /// Server bind address (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Server port (default: 9998)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address published to the registry instead of the detected one
    #[serde(default)]
    pub advertise_address: Option<IpAddr>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Client-side bound on waiting for a response
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,

    /// Client write-idle interval before a heartbeat ping
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Server read-idle interval before the connection is closed
    #[serde(default = "default_reader_idle")]
    pub reader_idle_ms: u64,

    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Concurrent handler invocations on the server
    #[serde(default = "default_handler_threads")]
    pub handler_threads: usize,
}

fn default_registry_address() -> String {
    "127.0.0.1:2181".to_string()
}

fn default_registry() -> String {
    "remote".to_string()
}

fn default_registry_root() -> String {
    DEFAULT_ROOT.to_string()
}

fn default_registry_connect_timeout() -> u64 {
    30_000
}

fn default_serializer() -> String {
    "json".to_string()
}

fn default_compressor() -> String {
    "gzip".to_string()
}

fn default_load_balance() -> String {
    "consistent-hash".to_string()
}

fn default_transport() -> String {
    "tcp".to_string()
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    9998
}

fn default_connect_timeout() -> u64 {
    5_000
}

fn default_call_timeout() -> u64 {
    10_000
}

fn default_heartbeat_interval() -> u64 {
    5_000
}

fn default_reader_idle() -> u64 {
    30_000
}

fn default_max_frame_size() -> usize {
    MAX_FRAME_LENGTH
}

fn default_handler_threads() -> usize {
    std::thread::available_parallelism().map_or(4, |n| n.get() * 2)
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            registry_address: default_registry_address(),
            registry: default_registry(),
            registry_root: default_registry_root(),
            registry_connect_timeout_ms: default_registry_connect_timeout(),
            serializer: default_serializer(),
            compressor: default_compressor(),
            load_balance: default_load_balance(),
            transport: default_transport(),
            extension_dirs: Vec::new(),
            bind_address: default_bind_address(),
            port: default_port(),
            advertise_address: None,
            connect_timeout_ms: default_connect_timeout(),
            call_timeout_ms: default_call_timeout(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            reader_idle_ms: default_reader_idle(),
            max_frame_size: default_max_frame_size(),
            handler_threads: default_handler_threads(),
        }
    }
}

impl RpcConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn with_registry(mut self, name: impl Into<String>) -> Self {
        self.registry = name.into();
        self
    }

    pub fn with_registry_address(mut self, address: impl Into<String>) -> Self {
        self.registry_address = address.into();
        self
    }

    pub fn with_serializer(mut self, name: impl Into<String>) -> Self {
        self.serializer = name.into();
        self
    }

    pub fn with_compressor(mut self, name: impl Into<String>) -> Self {
        self.compressor = name.into();
        self
    }

    pub fn with_load_balance(mut self, name: impl Into<String>) -> Self {
        self.load_balance = name.into();
        self
    }

    pub fn with_transport(mut self, name: impl Into<String>) -> Self {
        self.transport = name.into();
        self
    }

    pub fn with_bind(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr.ip();
        self.port = addr.port();
        self
    }

    pub fn with_advertise_address(mut self, addr: IpAddr) -> Self {
        self.advertise_address = Some(addr);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_reader_idle(mut self, idle: Duration) -> Self {
        self.reader_idle_ms = idle.as_millis() as u64;
        self
    }

    pub fn with_handler_threads(mut self, threads: usize) -> Self {
        self.handler_threads = threads;
        self
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn registry_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.registry_connect_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reader_idle(&self) -> Duration {
        Duration::from_millis(self.reader_idle_ms)
    }

    /// Header byte for the configured serializer.
    pub fn serializer_kind(&self) -> Result<SerializerKind, ConfigError> {
        SerializerKind::from_name(&self.serializer)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown serializer {}", self.serializer)))
    }

    /// Header byte for the configured compressor.
    pub fn compressor_kind(&self) -> Result<CompressorKind, ConfigError> {
        CompressorKind::from_name(&self.compressor)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown compressor {}", self.compressor)))
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.serializer_kind()?;
        self.compressor_kind()?;
        if !self.registry_root.starts_with('/') || self.registry_root.len() < 2 {
            return Err(ConfigError::Invalid(
                "registry_root must be an absolute path below /".into(),
            ));
        }
        if self.connect_timeout_ms == 0 || self.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts cannot be 0".into()));
        }
        if self.heartbeat_interval_ms == 0 || self.reader_idle_ms == 0 {
            return Err(ConfigError::Invalid("idle intervals cannot be 0".into()));
        }
        if self.heartbeat_interval_ms >= self.reader_idle_ms {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_ms must be below reader_idle_ms".into(),
            ));
        }
        if self.max_frame_size < crate::protocol::HEAD_LENGTH || self.max_frame_size > MAX_FRAME_LENGTH {
            return Err(ConfigError::Invalid("max_frame_size out of range".into()));
        }
        if self.handler_threads == 0 {
            return Err(ConfigError::Invalid("handler_threads cannot be 0".into()));
        }
        Ok(())
    }
}
