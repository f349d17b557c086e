//! Node-to-node user RPC.
//!
//! Sessions hand remote calls to an [`RpcDispatcher`]. The TCP implementation
//! here uses length-prefixed JSON frames between nodes.
//!
//! # Architecture
//!
//! - **Dispatcher**: the boundary sessions call through, plus [`RemoteRouter`]
//!   which picks a remote node by server type
//! - **Client**: one connection to one remote node, implements the dispatcher
//! - **Server**: accepts connections and hands calls to an [`RpcHandler`]
//! - **Protocol**: framing and request/reply types shared by both sides

pub mod client;
pub mod dispatcher;
pub mod protocol;
pub mod server;

pub use client::RpcClient;
pub use dispatcher::{RemoteRouter, RpcCall, RpcDispatcher};
pub use protocol::{RpcReply, RpcRequest};
pub use server::{RpcHandler, RpcServer, RpcServerHandle};
