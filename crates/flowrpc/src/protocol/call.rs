// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Call request/response payloads carried by request and response frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identity of a publishable service: interface, group and version.
///
/// Group disambiguates multiple implementations of one interface; version
/// lets incompatible revisions coexist. Both default to empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ServiceKey {
    pub interface: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
}

impl ServiceKey {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            group: String::new(),
            version: String::new(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Rendered key used in the registry and the dispatcher
    /// (`interface:group:version`).
    pub fn rendered(&self) -> String {
        format!("{}:{}:{}", self.interface, self.group, self.version)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.interface, self.group, self.version)
    }
}

/// Outgoing call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    pub request_id: String,
    pub interface_name: String,
    pub method_name: String,
    #[serde(default)]
    pub param_types: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<Value>,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
}

impl RpcRequest {
    /// Builds a request with a fresh random request id.
    pub fn new(
        service: &ServiceKey,
        method_name: impl Into<String>,
        param_types: Vec<String>,
        parameters: Vec<Value>,
    ) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            interface_name: service.interface.clone(),
            method_name: method_name.into(),
            param_types,
            parameters,
            group: service.group.clone(),
            version: service.version.clone(),
        }
    }

    pub fn service_key(&self) -> ServiceKey {
        ServiceKey {
            interface: self.interface_name.clone(),
            group: self.group.clone(),
            version: self.version.clone(),
        }
    }

    pub fn rendered_service_key(&self) -> String {
        format!("{}:{}:{}", self.interface_name, self.group, self.version)
    }
}

/// Response status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ResponseCode {
    Success = 200,
    Fail = 500,
}

impl ResponseCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Reply to a [`RpcRequest`], matched by `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcResponse {
    pub fn success(request_id: impl Into<String>, data: Value) -> Self {
        Self {
            request_id: Some(request_id.into()),
            code: ResponseCode::Success.as_u16(),
            message: "The remote call is successful".to_string(),
            data: Some(data),
        }
    }

    /// Failure reply. Never carries data.
    pub fn fail(request_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            request_id,
            code: ResponseCode::Fail.as_u16(),
            message: message.into(),
            data: None,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.code == ResponseCode::Success.as_u16()
    }
}
