//! Node context: configuration plus the collaborators sessions work through.
//!
//! Every [`Session`](crate::Session) holds an `Arc<NodeContext>`. The context is
//! built once at node start and is immutable afterwards.

use crate::config::NodeConfig;
use crate::error::{Result, StarxError};
use crate::registry::{
    RemoteSessionIndex, RemoteSessionRegistry, SequentialIdAllocator, SessionIdAllocator,
};
use crate::rpc::{RemoteRouter, RpcDispatcher};
use crate::serializer::{JsonSerializer, Serializer};
use crate::shutdown::ShutdownSignal;
use crate::transport::{LocalTransport, ResponseWriter};
use std::sync::Arc;

/// Configuration and collaborators shared by all sessions of a node.
pub struct NodeContext {
    config: NodeConfig,
    serializer: Arc<dyn Serializer>,
    session_ids: Arc<dyn SessionIdAllocator>,
    remote_sessions: Arc<dyn RemoteSessionIndex>,
    local_transport: Option<Arc<dyn LocalTransport>>,
    response_writer: Option<Arc<dyn ResponseWriter>>,
    dispatcher: Arc<dyn RpcDispatcher>,
    shutdown: ShutdownSignal,
}

impl NodeContext {
    /// Create a builder for a node context.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let ctx = NodeContext::builder(NodeConfig::backend("game"))
    ///     .remote_sessions(registry.clone())
    ///     .response_writer(writer)
    ///     .dispatcher(router)
    ///     .build()?;
    /// ```
    pub fn builder(config: NodeConfig) -> NodeContextBuilder {
        NodeContextBuilder::new(config)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn is_frontend(&self) -> bool {
        self.config.is_frontend
    }

    pub fn serializer(&self) -> &dyn Serializer {
        &*self.serializer
    }

    pub fn remote_sessions(&self) -> &dyn RemoteSessionIndex {
        &*self.remote_sessions
    }

    pub fn dispatcher(&self) -> &dyn RpcDispatcher {
        &*self.dispatcher
    }

    pub(crate) fn next_session_id(&self) -> u64 {
        self.session_ids.next_session_id()
    }

    pub(crate) fn local_transport(&self) -> Result<&dyn LocalTransport> {
        self.local_transport
            .as_deref()
            .ok_or_else(|| StarxError::Config {
                message: "frontend node has no local transport".to_string(),
            })
    }

    pub(crate) fn response_writer(&self) -> Result<&dyn ResponseWriter> {
        self.response_writer
            .as_deref()
            .ok_or_else(|| StarxError::Config {
                message: "backend node has no response writer".to_string(),
            })
    }

    /// Signal observed by in-flight synchronous RPC calls.
    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Cancel all in-flight synchronous RPC calls and refuse new ones.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }
}

/// Builder for [`NodeContext`].
///
/// Defaults: JSON serializer, sequential session ids, an empty in-memory
/// remote-session index, and a [`RemoteRouter`] with no remotes registered.
pub struct NodeContextBuilder {
    config: NodeConfig,
    serializer: Arc<dyn Serializer>,
    session_ids: Arc<dyn SessionIdAllocator>,
    remote_sessions: Arc<dyn RemoteSessionIndex>,
    local_transport: Option<Arc<dyn LocalTransport>>,
    response_writer: Option<Arc<dyn ResponseWriter>>,
    dispatcher: Option<Arc<dyn RpcDispatcher>>,
    shutdown: ShutdownSignal,
}

impl NodeContextBuilder {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            serializer: Arc::new(JsonSerializer),
            session_ids: Arc::new(SequentialIdAllocator::new()),
            remote_sessions: Arc::new(RemoteSessionRegistry::new()),
            local_transport: None,
            response_writer: None,
            dispatcher: None,
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn session_ids(mut self, session_ids: Arc<dyn SessionIdAllocator>) -> Self {
        self.session_ids = session_ids;
        self
    }

    pub fn remote_sessions(mut self, index: Arc<dyn RemoteSessionIndex>) -> Self {
        self.remote_sessions = index;
        self
    }

    /// Required on frontend nodes.
    pub fn local_transport(mut self, transport: Arc<dyn LocalTransport>) -> Self {
        self.local_transport = Some(transport);
        self
    }

    /// Required on backend nodes.
    pub fn response_writer(mut self, writer: Arc<dyn ResponseWriter>) -> Self {
        self.response_writer = Some(writer);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn RpcDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Share a shutdown signal with the rest of the node.
    pub fn shutdown_signal(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Build the context, checking that the node role has its delivery path.
    pub fn build(self) -> Result<Arc<NodeContext>> {
        if self.config.server_type.trim().is_empty() || self.config.server_type.contains('.') {
            return Err(StarxError::Config {
                message: format!("invalid server type {:?}", self.config.server_type),
            });
        }
        if self.config.is_frontend && self.local_transport.is_none() {
            return Err(StarxError::Config {
                message: format!(
                    "frontend node {} requires a local transport",
                    self.config.server_type
                ),
            });
        }
        if !self.config.is_frontend && self.response_writer.is_none() {
            return Err(StarxError::Config {
                message: format!(
                    "backend node {} requires a response writer",
                    self.config.server_type
                ),
            });
        }

        Ok(Arc::new(NodeContext {
            config: self.config,
            serializer: self.serializer,
            session_ids: self.session_ids,
            remote_sessions: self.remote_sessions,
            local_transport: self.local_transport,
            response_writer: self.response_writer,
            dispatcher: self
                .dispatcher
                .unwrap_or_else(|| Arc::new(RemoteRouter::new())),
            shutdown: self.shutdown,
        }))
    }
}
