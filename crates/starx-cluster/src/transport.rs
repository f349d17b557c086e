//! Outbound message envelope and delivery boundaries.
//!
//! The core only builds [`OutboundMessage`]s. Getting bytes onto a socket is
//! the job of two collaborators:
//!
//! - [`LocalTransport`]: used on frontend nodes, where the client socket is
//!   local.
//! - [`ResponseWriter`]: used on backend nodes to forward the message to the
//!   frontend node that owns the socket.

use crate::error::Result;
use crate::registry::RemoteSession;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Kind tag carried on every inter-node message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// User-initiated RPC request.
    Request,
    /// Fire-and-forget notification to a client.
    Push,
    /// Reply to a specific prior client request.
    Response,
    /// Packet written to the client unchanged, with no route or request id.
    Raw,
}

/// Message addressed to one client connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub kind: MessageKind,
    /// Set for pushes; responses are correlated by `request_id` instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Raw connection id on the node that owns the socket.
    pub target_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    pub payload: Bytes,
}

impl OutboundMessage {
    pub fn push(target_id: u64, route: impl Into<String>, payload: Bytes) -> Self {
        Self {
            kind: MessageKind::Push,
            route: Some(route.into()),
            target_id,
            request_id: None,
            payload,
        }
    }

    pub fn raw(target_id: u64, payload: Bytes) -> Self {
        Self {
            kind: MessageKind::Raw,
            route: None,
            target_id,
            request_id: None,
            payload,
        }
    }

    pub fn response(target_id: u64, request_id: u64, payload: Bytes) -> Self {
        Self {
            kind: MessageKind::Response,
            route: None,
            target_id,
            request_id: Some(request_id),
            payload,
        }
    }
}

/// Delivers messages to client connections held by this (frontend) node.
#[async_trait]
pub trait LocalTransport: Send + Sync {
    async fn deliver(&self, message: OutboundMessage) -> Result<()>;
}

/// Forwards messages from a backend node to the frontend node that owns the
/// client socket.
///
/// Delivery failures below this boundary belong to the transport; callers do
/// not retry.
#[async_trait]
pub trait ResponseWriter: Send + Sync {
    async fn deliver(&self, remote: &RemoteSession, message: OutboundMessage) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_response_shapes() {
        let push = OutboundMessage::push(99, "onChat", Bytes::from_static(b"hi"));
        assert_eq!(push.kind, MessageKind::Push);
        assert_eq!(push.route.as_deref(), Some("onChat"));
        assert_eq!(push.request_id, None);

        let resp = OutboundMessage::response(99, 12, Bytes::from_static(b"ok"));
        assert_eq!(resp.kind, MessageKind::Response);
        assert!(resp.route.is_none());
        assert_eq!(resp.request_id, Some(12));
    }

    #[test]
    fn test_raw_has_no_route_or_request_id() {
        let raw = OutboundMessage::raw(7, Bytes::from_static(b"\x01\x02"));
        assert_eq!(raw.kind, MessageKind::Raw);
        assert!(raw.route.is_none());
        assert!(raw.request_id.is_none());

        let json = serde_json::to_string(&raw).unwrap();
        assert!(json.contains("\"kind\":\"raw\""));
        assert!(!json.contains("\"request_id\""));
    }

    #[test]
    fn test_response_omits_route_on_the_wire() {
        let resp = OutboundMessage::response(5, 1, Bytes::new());
        let json = serde_json::to_string(&resp).unwrap();

        assert!(json.contains("\"kind\":\"response\""));
        assert!(!json.contains("\"route\""));
    }
}
