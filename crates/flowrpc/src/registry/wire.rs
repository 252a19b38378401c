// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry server protocol: JSON messages with a 4-byte big-endian length
//! prefix.

use crate::error::StoreError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default maximum message size (1 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Store operation sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StoreOp {
    Create { path: String },
    Exists { path: String },
    Children { path: String },
    Delete { path: String },
    Watch { path: String },
    Ping,
}

/// Client to server message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRequest {
    pub id: u64,
    #[serde(flatten)]
    pub op: StoreOp,
}

/// Successful result of a [`StoreOp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOutcome {
    Created(bool),
    Exists(bool),
    Children(Vec<String>),
    Deleted,
    Watching,
    Pong,
}

/// Server to client message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreReply {
    Response {
        id: u64,
        result: Result<StoreOutcome, StoreError>,
    },
    /// Pushed when a watched path's child list changes
    ChildrenChanged { path: String, children: Vec<String> },
}

/// Reads one length-prefixed message. `Ok(None)` on clean EOF.
pub async fn read_message<R, T>(reader: &mut R, max_size: usize) -> Result<Option<T>, StoreError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(StoreError::Connection(e.to_string())),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_size {
        return Err(StoreError::Protocol(format!(
            "message too large: {} > {}",
            len, max_size
        )));
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?;

    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| StoreError::Protocol(format!("invalid JSON: {}", e)))
}

/// Writes one length-prefixed message.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), StoreError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(message).map_err(|e| StoreError::Protocol(e.to_string()))?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    writer
        .write_all(&frame)
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let req = StoreRequest {
            id: 3,
            op: StoreOp::Create {
                path: "/flow-rpc/a".into(),
            },
        };
        let json = serde_json::to_string(&req).expect("serialize");
        assert!(json.contains("\"op\":\"create\""));
        assert!(json.contains("\"id\":3"));
        let back: StoreRequest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, req);
    }

    #[test]
    fn test_error_reply_shape() {
        let reply = StoreReply::Response {
            id: 1,
            result: Err(StoreError::NoNode("/x".into())),
        };
        let json = serde_json::to_string(&reply).expect("serialize");
        let back: StoreReply = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, reply);
    }

    #[tokio::test]
    async fn test_framed_io() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let reply = StoreReply::ChildrenChanged {
            path: "/r/s".into(),
            children: vec!["a:1".into()],
        };
        write_message(&mut a, &reply).await.expect("write");
        drop(a);
        let got: Option<StoreReply> = read_message(&mut b, 1024).await.expect("read");
        assert_eq!(got, Some(reply));
        let eof: Option<StoreReply> = read_message(&mut b, 1024).await.expect("eof");
        assert!(eof.is_none());
    }

    #[tokio::test]
    async fn test_oversized_message() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        write_message(&mut a, &vec!["x".repeat(200)]).await.expect("write");
        let got: Result<Option<Vec<String>>, _> = read_message(&mut b, 16).await;
        assert!(matches!(got, Err(StoreError::Protocol(_))));
    }
}
