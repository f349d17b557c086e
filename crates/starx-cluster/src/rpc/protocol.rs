//! Node-to-node RPC wire format.
//!
//! Every frame is a 4-byte big-endian length prefix followed by a UTF-8 JSON
//! document:
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! Requests flow from the calling node to the node owning the route; replies
//! flow back on the same connection and are matched by `id`. One-way requests
//! (`expects_reply = false`) never get a reply.

use crate::config::RpcConfig;
use crate::error::{Result, StarxError};
use crate::transport::MessageKind;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// RPC request sent to a remote node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub kind: MessageKind,
    pub route: String,
    pub session_id: u64,
    pub raw_session_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<i64>,
    pub expects_reply: bool,
    /// Encoded argument envelope.
    pub args: Bytes,
}

/// Reply to an [`RpcRequest`] that expected one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcReply {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// Application-level failure reported by the remote handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcReply {
    pub fn success(id: u64, payload: Bytes) -> Self {
        Self {
            id,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failure(id: u64, err: &StarxError) -> Self {
        Self {
            id,
            payload: None,
            error: Some(RpcError {
                code: err.to_rpc_error_code(),
                message: err.to_string(),
            }),
        }
    }

    /// Turn the reply into the caller-facing result.
    pub fn into_result(self) -> Result<Bytes> {
        if let Some(err) = self.error {
            return Err(StarxError::Remote {
                code: err.code,
                message: err.message,
            });
        }
        Ok(self.payload.unwrap_or_default())
    }
}

/// Read a length-prefixed frame from an async reader.
///
/// Returns `None` on clean EOF (peer closed connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > RpcConfig::MAX_FRAME_SIZE {
        return Err(StarxError::FrameTooLarge {
            size: len,
            max: RpcConfig::MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

/// Write a length-prefixed frame to an async writer.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > RpcConfig::MAX_FRAME_SIZE {
        return Err(StarxError::FrameTooLarge {
            size: payload.len(),
            max: RpcConfig::MAX_FRAME_SIZE,
        });
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Serialize a request or reply into frame payload bytes.
pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(message).map_err(|e| StarxError::Serialization {
        serializer: "rpc-frame".to_string(),
        message: e.to_string(),
        source: Some(e),
    })
}
