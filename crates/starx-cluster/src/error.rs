//! Error types for starx-cluster.
//!
//! Every failure the session and routing layer can report is a variant of
//! [`StarxError`]. None of them is fatal to the node: callers decide whether to
//! retry, drop, or surface the failure to the client.

use std::time::Duration;
use thiserror::Error;

/// Main error type for the session and routing layer.
#[derive(Debug, Error)]
pub enum StarxError {
    // Routing errors
    #[error("RPC target {route} must be located on a different server type")]
    RpcMustBeRemote { route: String },

    #[error("Malformed route {route:?}: {reason}")]
    MalformedRoute { route: String, reason: String },

    #[error("No remote registered for server type {server_type}")]
    NoRemoteForServerType { server_type: String },

    // Session errors
    #[error("Invalid binding for session {session_id}: {reason}")]
    InvalidBinding { session_id: u64, reason: String },

    #[error("Invalid status transition for session {session_id}: {from} -> {to}")]
    InvalidTransition {
        session_id: u64,
        from: String,
        to: String,
    },

    #[error("Session {session_id} is closed")]
    SessionClosed { session_id: u64 },

    // Proxy errors
    #[error("Remote session not found for raw session {raw_session_id}")]
    RemoteSessionNotFound { raw_session_id: u64 },

    #[error("Session {session_id} is not registered on remote session {raw_session_id}")]
    TargetSidNotFound {
        session_id: u64,
        raw_session_id: u64,
    },

    // Serialization errors
    #[error("Serialization failed ({serializer}): {message}")]
    Serialization {
        serializer: String,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Decode error: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // RPC transport errors
    #[error("RPC {route} timed out after {timeout:?}")]
    RpcTimeout { route: String, timeout: Duration },

    #[error("Operation cancelled: node is shutting down")]
    Cancelled,

    #[error("Remote error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("Connection to {peer} lost")]
    ConnectionLost { peer: String },

    #[error("Outbound queue to {peer} is full")]
    QueueFull { peer: String },

    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for starx-cluster operations.
pub type Result<T> = std::result::Result<T, StarxError>;

impl From<std::io::Error> for StarxError {
    fn from(err: std::io::Error) -> Self {
        StarxError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl StarxError {
    /// Wrap a `serde_json` failure while decoding an envelope or reply.
    pub fn decode(context: &str, err: serde_json::Error) -> Self {
        StarxError::Decode {
            message: format!("{}: {}", context, err),
            source: Some(err),
        }
    }

    /// Convert to a JSON-RPC style error code for node-to-node replies.
    ///
    /// - -32700: Parse error (undecodable request)
    /// - -32600: Invalid request (malformed route)
    /// - -32602: Invalid params (argument decode failure)
    /// - -32603: Internal error
    ///
    /// Application-defined codes:
    /// - -32000: Transport failure (timeout, lost connection, cancelled)
    /// - -32001: Session closed
    /// - -32002: Remote session or target sid missing
    /// - -32003: Invalid binding
    /// - -32004: Routing rejected (same-role RPC, no remote for server type)
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            StarxError::RpcTimeout { .. }
            | StarxError::ConnectionLost { .. }
            | StarxError::QueueFull { .. }
            | StarxError::Cancelled
            | StarxError::Io { .. } => -32000,

            StarxError::SessionClosed { .. } => -32001,

            StarxError::RemoteSessionNotFound { .. } | StarxError::TargetSidNotFound { .. } => {
                -32002
            }

            StarxError::InvalidBinding { .. } => -32003,

            StarxError::RpcMustBeRemote { .. } | StarxError::NoRemoteForServerType { .. } => {
                -32004
            }

            StarxError::MalformedRoute { .. } => -32600,

            StarxError::Decode { .. } => -32602,

            // A remote error keeps the code the remote node chose
            StarxError::Remote { code, .. } => *code,

            _ => -32603,
        }
    }

    /// Check if this error comes from the transport rather than the application.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StarxError::RpcTimeout { .. }
                | StarxError::ConnectionLost { .. }
                | StarxError::QueueFull { .. }
                | StarxError::Io { .. }
        )
    }
}
