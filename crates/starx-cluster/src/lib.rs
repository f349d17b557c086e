//! Starx Cluster - session identity and RPC routing for a frontend/backend server fleet.
//!
//! Clients connect to frontend nodes. Backend nodes act on behalf of those
//! clients through sessions that address the client by its frontend session id.
//! A [`Session`] pushes messages, answers requests, and calls remote handlers
//! by route string, and it picks the delivery path from the node's role.
//!
//! # Example
//!
//! ```rust,ignore
//! use starx_cluster::{rpc_args, NodeConfig, NodeContext, Session};
//!
//! async fn greet(writer: Arc<dyn ResponseWriter>) -> starx_cluster::Result<()> {
//!     let ctx = NodeContext::builder(NodeConfig::backend("game"))
//!         .response_writer(writer)
//!         .build()?;
//!
//!     let session = Session::create(ctx, 7);
//!     session.push("onChat", serde_json::json!({"text": "hi"})).await?;
//!
//!     let args = rpc_args!["alice", 3]?;
//!     let reply = session.rpc("chat.room.join", &args).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod registry;
pub mod route;
pub mod rpc;
pub mod serializer;
pub mod session;
pub mod shutdown;
pub mod transport;

// Re-export commonly used types
pub use config::{NodeConfig, RpcConfig};
pub use context::{NodeContext, NodeContextBuilder};
pub use error::{Result, StarxError};
pub use registry::{
    RemoteSession, RemoteSessionIndex, RemoteSessionRegistry, SequentialIdAllocator,
    SessionIdAllocator,
};
pub use route::{Locality, RouteInfo};
pub use rpc::{
    RemoteRouter, RpcCall, RpcClient, RpcDispatcher, RpcHandler, RpcServer, RpcServerHandle,
};
pub use serializer::{Arg, JsonSerializer, Payload, Serializer};
pub use session::{Session, SessionStatus, SessionTable};
pub use shutdown::ShutdownSignal;
pub use transport::{LocalTransport, MessageKind, OutboundMessage, ResponseWriter};
