//! Raw-or-structured payloads.

use super::Serializer;
use crate::error::{Result, StarxError};
use bytes::Bytes;
use serde::Serialize;
use tracing::error;

/// Payload handed to push/response.
///
/// Handlers often already hold encoded frames; those go in as [`Payload::Raw`]
/// and are never encoded a second time.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Already-encoded bytes, delivered as-is.
    Raw(Bytes),
    /// Structured value, encoded by the node's serializer.
    Structured(serde_json::Value),
}

impl Payload {
    /// Build a structured payload from any serializable value.
    pub fn structured<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Payload::Structured)
            .map_err(|e| StarxError::Serialization {
                serializer: "serde_json::to_value".to_string(),
                message: e.to_string(),
                source: Some(e),
            })
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Payload::Raw(_))
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Payload::Raw(data)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::Raw(Bytes::from(data))
    }
}

impl From<&'static [u8]> for Payload {
    fn from(data: &'static [u8]) -> Self {
        Payload::Raw(Bytes::from_static(data))
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Structured(value)
    }
}

/// Return raw bytes unchanged, or encode a structured value.
///
/// Serializer failures are logged here and returned to the caller.
pub fn serialize_or_raw(payload: Payload, serializer: &dyn Serializer) -> Result<Bytes> {
    match payload {
        Payload::Raw(data) => Ok(data),
        Payload::Structured(value) => match serializer.serialize(&value) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) => {
                error!("Payload serialization with {} failed: {}", serializer.name(), e);
                Err(e)
            }
        },
    }
}
