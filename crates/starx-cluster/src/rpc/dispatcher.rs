//! The RPC dispatch boundary and server-type routing.

use crate::error::{Result, StarxError};
use crate::route::RouteInfo;
use crate::serializer::decode_args_into;
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// A user RPC on its way to, or arriving at, the node owning the route.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    pub route: RouteInfo,
    /// Id of the calling session on the calling node.
    pub session_id: u64,
    pub raw_session_id: u64,
    pub uid: Option<i64>,
    /// Encoded argument envelope.
    pub args: Bytes,
}

impl RpcCall {
    /// Decode the argument envelope into typed targets.
    pub fn decode_args<T: DeserializeOwned>(&self) -> Result<T> {
        decode_args_into(&self.args)
    }
}

/// Sends RPC calls to remote nodes.
///
/// Timeouts and cancellation of synchronous calls are applied by the caller;
/// implementations only need to deliver the request and resolve with the reply.
#[async_trait]
pub trait RpcDispatcher: Send + Sync {
    /// Send a request and wait for the reply payload.
    async fn call(&self, call: RpcCall) -> Result<Bytes>;

    /// Enqueue a one-way request and return without waiting.
    ///
    /// There is no completion signal: `Ok(())` only means the request was
    /// queued. Later delivery failures are logged by the implementation.
    fn notify(&self, call: RpcCall) -> Result<()>;
}

/// Routes calls to the dispatchers registered for each server type.
///
/// Several dispatchers (nodes) can serve one server type; calls rotate over
/// them.
#[derive(Default)]
pub struct RemoteRouter {
    remotes: RwLock<HashMap<String, Vec<Arc<dyn RpcDispatcher>>>>,
    cursor: AtomicUsize,
}

impl RemoteRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dispatcher for a server type.
    pub fn register(&self, server_type: impl Into<String>, remote: Arc<dyn RpcDispatcher>) {
        let server_type = server_type.into();
        debug!("Registered remote for server type {}", server_type);
        self.remotes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(server_type)
            .or_default()
            .push(remote);
    }

    /// Drop all dispatchers for a server type.
    pub fn unregister(&self, server_type: &str) -> bool {
        self.remotes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(server_type)
            .is_some()
    }

    fn select(&self, route: &RouteInfo) -> Result<Arc<dyn RpcDispatcher>> {
        let remotes = self.remotes.read().unwrap_or_else(PoisonError::into_inner);
        let candidates = remotes
            .get(route.server_type())
            .filter(|candidates| !candidates.is_empty())
            .ok_or_else(|| StarxError::NoRemoteForServerType {
                server_type: route.server_type().to_string(),
            })?;

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Ok(candidates[index].clone())
    }
}

#[async_trait]
impl RpcDispatcher for RemoteRouter {
    async fn call(&self, call: RpcCall) -> Result<Bytes> {
        let remote = self.select(&call.route)?;
        remote.call(call).await
    }

    fn notify(&self, call: RpcCall) -> Result<()> {
        self.select(&call.route)?.notify(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct NamedRemote {
        name: &'static str,
        notified: Mutex<Vec<String>>,
    }

    impl NamedRemote {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                notified: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RpcDispatcher for NamedRemote {
        async fn call(&self, _call: RpcCall) -> Result<Bytes> {
            Ok(Bytes::from(self.name))
        }

        fn notify(&self, call: RpcCall) -> Result<()> {
            self.notified.lock().unwrap().push(call.route.to_string());
            Ok(())
        }
    }

    fn call_to(route: &str) -> RpcCall {
        RpcCall {
            route: RouteInfo::parse(route).unwrap(),
            session_id: 1,
            raw_session_id: 1,
            uid: None,
            args: Bytes::from_static(b"[]"),
        }
    }

    #[tokio::test]
    async fn test_routes_by_server_type() {
        let router = RemoteRouter::new();
        router.register("game", NamedRemote::new("game-1"));
        router.register("chat", NamedRemote::new("chat-1"));

        assert_eq!(router.call(call_to("game.room.join")).await.unwrap(), "game-1");
        assert_eq!(router.call(call_to("chat.channel.say")).await.unwrap(), "chat-1");
    }

    #[tokio::test]
    async fn test_rotates_over_nodes_of_one_type() {
        let router = RemoteRouter::new();
        router.register("game", NamedRemote::new("game-1"));
        router.register("game", NamedRemote::new("game-2"));

        let first = router.call(call_to("game.room.join")).await.unwrap();
        let second = router.call(call_to("game.room.join")).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_unknown_server_type() {
        let router = RemoteRouter::new();
        let result = router.call(call_to("game.room.join")).await;
        match result {
            Err(StarxError::NoRemoteForServerType { server_type }) => {
                assert_eq!(server_type, "game")
            }
            other => panic!("Expected NoRemoteForServerType, got: {:?}", other),
        }

        router.register("game", NamedRemote::new("game-1"));
        assert!(router.unregister("game"));
        assert!(router.notify(call_to("game.room.join")).is_err());
    }

    #[test]
    fn test_notify_goes_to_selected_remote() {
        let router = RemoteRouter::new();
        let remote = NamedRemote::new("game-1");
        router.register("game", remote.clone());

        router.notify(call_to("game.room.leave")).unwrap();
        assert_eq!(*remote.notified.lock().unwrap(), vec!["game.room.leave".to_string()]);
    }

    #[test]
    fn test_call_decode_args() {
        let mut call = call_to("game.room.join");
        call.args = Bytes::from_static(br#"[{"t":"int","v":5},{"t":"str","v":"red"}]"#);
        let (seat, team): (u8, String) = call.decode_args().unwrap();
        assert_eq!((seat, team.as_str()), (5, "red"));
    }
}
