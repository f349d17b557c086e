//! Node configuration.
//!
//! [`NodeConfig`] is the read-only runtime value every node is started with.
//! It is passed explicitly into the node context instead of being read from
//! process globals, so one process can host frontend and backend contexts side
//! by side (tests do exactly that). [`RpcConfig`] holds the fixed limits of the
//! node-to-node RPC link.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits and timeouts for the node-to-node RPC link.
pub struct RpcConfig;

impl RpcConfig {
    pub const CALL_TIMEOUT: Duration = Duration::from_secs(5);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
    pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024; // 4MB
    pub const MAX_CONNECTIONS: usize = 256;
    /// Frames buffered per connection before senders see backpressure.
    pub const OUTBOUND_QUEUE: usize = 1024;
}

/// Runtime configuration of a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Server type (node role) this node serves, e.g. `"gate"` or `"game"`.
    pub server_type: String,
    /// Whether this node terminates client connections.
    pub is_frontend: bool,
    /// Upper bound for a synchronous RPC round trip.
    #[serde(default = "default_rpc_timeout", with = "duration_millis")]
    pub rpc_timeout: Duration,
}

fn default_rpc_timeout() -> Duration {
    RpcConfig::CALL_TIMEOUT
}

impl NodeConfig {
    /// Configuration for a frontend node of the given server type.
    pub fn frontend(server_type: impl Into<String>) -> Self {
        Self {
            server_type: server_type.into(),
            is_frontend: true,
            rpc_timeout: RpcConfig::CALL_TIMEOUT,
        }
    }

    /// Configuration for a backend node of the given server type.
    pub fn backend(server_type: impl Into<String>) -> Self {
        Self {
            server_type: server_type.into(),
            is_frontend: false,
            rpc_timeout: RpcConfig::CALL_TIMEOUT,
        }
    }

    /// Override the synchronous RPC timeout.
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
