//! Payload and RPC argument serialization.
//!
//! Two independent needs are covered here:
//!
//! - **Payloads** for push/response: a [`Payload`] is either bytes that are
//!   already encoded (passed through untouched) or a structured value that the
//!   node's configured [`Serializer`] encodes. See [`serialize_or_raw`].
//! - **RPC arguments**: a heterogeneous, variable-length argument list is
//!   encoded as one self-describing envelope of tagged [`Arg`] values, so the
//!   receiving node can decode it back into typed targets without a shared IDL.

mod envelope;
mod payload;

pub use envelope::{decode_args, decode_args_into, decode_reply, encode_args, Arg};
pub use payload::{serialize_or_raw, Payload};

use crate::error::{Result, StarxError};

/// Generic serializer for structured payloads.
pub trait Serializer: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Encode a structured value to bytes.
    fn serialize(&self, value: &serde_json::Value) -> Result<Vec<u8>>;
}

/// JSON serializer backed by `serde_json`. This is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, value: &serde_json::Value) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| StarxError::Serialization {
            serializer: self.name().to_string(),
            message: e.to_string(),
            source: Some(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_serializer_encodes_value() {
        let bytes = JsonSerializer
            .serialize(&serde_json::json!({"hp": 10}))
            .unwrap();
        assert_eq!(bytes, br#"{"hp":10}"#);
    }
}
