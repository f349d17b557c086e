//! TCP RPC client for one remote node.
//!
//! A connection is driven by two background tasks: a writer that drains the
//! outbound frame queue and a reader that matches replies to pending calls by
//! request id. Queuing a frame never waits for the socket, which is what makes
//! [`RpcDispatcher::notify`] fire-and-forget. The queue holds at most
//! [`RpcConfig::OUTBOUND_QUEUE`] frames: `notify` fails with `QueueFull` when it
//! is full, while `call` waits for room.
//!
//! # Thread Safety
//!
//! `RpcClient` is `Send + Sync`; any number of tasks can issue calls
//! concurrently over the same connection.

use super::dispatcher::{RpcCall, RpcDispatcher};
use super::protocol::{encode_message, read_frame, write_frame, RpcReply, RpcRequest};
use crate::config::RpcConfig;
use crate::error::{Result, StarxError};
use crate::shutdown::ShutdownSignal;
use crate::transport::MessageKind;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<RpcReply>>>;

/// RPC connection to a single remote node.
#[derive(Debug)]
pub struct RpcClient {
    peer: SocketAddr,
    outbound: mpsc::Sender<Vec<u8>>,
    pending: Arc<PendingMap>,
    next_id: AtomicU64,
    closed: ShutdownSignal,
    tasks: Vec<JoinHandle<()>>,
}

/// Removes a pending entry when the waiting call is dropped (e.g. on timeout).
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl RpcClient {
    /// Connect to a remote node's RPC server.
    pub async fn connect(peer: SocketAddr) -> Result<Self> {
        let lost = || StarxError::ConnectionLost {
            peer: peer.to_string(),
        };
        let stream = tokio::time::timeout(RpcConfig::CONNECT_TIMEOUT, TcpStream::connect(peer))
            .await
            .map_err(|_| lost())?
            .map_err(|_| lost())?;
        stream.set_nodelay(true)?;

        debug!("RPC client connected to {}", peer);

        let (reader, writer) = stream.into_split();
        let (outbound, outbound_rx) = mpsc::channel(RpcConfig::OUTBOUND_QUEUE);
        let pending = Arc::new(PendingMap::default());
        let closed = ShutdownSignal::new();

        let tasks = vec![
            tokio::spawn(Self::write_loop(writer, outbound_rx, closed.clone(), peer)),
            tokio::spawn(Self::read_loop(reader, pending.clone(), closed.clone(), peer)),
        ];

        Ok(Self {
            peer,
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            closed,
            tasks,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the connection has been lost or closed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_triggered()
    }

    fn connection_lost(&self) -> StarxError {
        StarxError::ConnectionLost {
            peer: self.peer.to_string(),
        }
    }

    fn encode_request(&self, call: RpcCall, expects_reply: bool) -> Result<(u64, Vec<u8>)> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            id,
            kind: MessageKind::Request,
            route: call.route.to_string(),
            session_id: call.session_id,
            raw_session_id: call.raw_session_id,
            uid: call.uid,
            expects_reply,
            args: call.args,
        };
        Ok((id, encode_message(&request)?))
    }

    /// Queue a frame without waiting. A full queue fails with `QueueFull`.
    fn enqueue(&self, frame: Vec<u8>) -> Result<()> {
        if self.is_closed() {
            return Err(self.connection_lost());
        }
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                warn!("RPC queue to {} is full, dropping one-way request", self.peer);
                StarxError::QueueFull {
                    peer: self.peer.to_string(),
                }
            }
            mpsc::error::TrySendError::Closed(_) => self.connection_lost(),
        })
    }

    /// Queue a frame, waiting for room in the queue.
    async fn send_frame(&self, frame: Vec<u8>) -> Result<()> {
        if self.is_closed() {
            return Err(self.connection_lost());
        }
        self.outbound
            .send(frame)
            .await
            .map_err(|_| self.connection_lost())
    }

    async fn write_loop(
        mut writer: OwnedWriteHalf,
        mut outbound: mpsc::Receiver<Vec<u8>>,
        closed: ShutdownSignal,
        peer: SocketAddr,
    ) {
        loop {
            let frame = tokio::select! {
                frame = outbound.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
                _ = closed.triggered() => break,
            };

            if let Err(e) = write_frame(&mut writer, &frame).await {
                warn!("RPC write to {} failed, dropping connection: {}", peer, e);
                closed.trigger();
                break;
            }
        }
        debug!("RPC writer for {} stopped", peer);
    }

    async fn read_loop(
        mut reader: OwnedReadHalf,
        pending: Arc<PendingMap>,
        closed: ShutdownSignal,
        peer: SocketAddr,
    ) {
        loop {
            let frame = tokio::select! {
                result = read_frame(&mut reader) => match result {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        debug!("RPC connection to {} closed by peer", peer);
                        break;
                    }
                    Err(e) => {
                        debug!("RPC connection to {} ended: {}", peer, e);
                        break;
                    }
                },
                _ = closed.triggered() => break,
            };

            let reply: RpcReply = match serde_json::from_slice(&frame) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Discarding undecodable RPC reply from {}: {}", peer, e);
                    continue;
                }
            };

            let waiter = pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&reply.id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(reply);
                }
                None => debug!("Late RPC reply {} from {} discarded", reply.id, peer),
            }
        }

        closed.trigger();
        // Dropping the senders fails every waiting call with ConnectionLost.
        pending.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.closed.trigger();
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[async_trait]
impl RpcDispatcher for RpcClient {
    async fn call(&self, call: RpcCall) -> Result<Bytes> {
        let (id, frame) = self.encode_request(call, true)?;
        let (tx, rx) = oneshot::channel();

        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        // The reader clears pending entries after marking the connection closed,
        // so checking here cannot miss a concurrent close.
        self.send_frame(frame).await?;

        let reply = rx.await.map_err(|_| self.connection_lost())?;
        reply.into_result()
    }

    fn notify(&self, call: RpcCall) -> Result<()> {
        let (_, frame) = self.encode_request(call, false)?;
        self.enqueue(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::RouteInfo;
    use crate::rpc::server::{RpcHandler, RpcServer};
    use std::time::Duration;

    struct TestHandler;

    #[async_trait]
    impl RpcHandler for TestHandler {
        async fn handle(&self, call: RpcCall) -> Result<Bytes> {
            match call.route.method() {
                "ping" => Ok(Bytes::from_static(b"\"pong\"")),
                "add" => {
                    let (a, b): (i64, i64) = call.decode_args()?;
                    Ok(Bytes::from((a + b).to_string()))
                }
                _ => Err(StarxError::Internal(format!(
                    "Unknown handler: {}",
                    call.route
                ))),
            }
        }
    }

    fn call(route: &str, args: &'static [u8]) -> RpcCall {
        RpcCall {
            route: RouteInfo::parse(route).unwrap(),
            session_id: 1,
            raw_session_id: 1,
            uid: None,
            args: Bytes::from_static(args),
        }
    }

    #[tokio::test]
    async fn test_client_call_success() {
        let mut handle = RpcServer::bind_local(Arc::new(TestHandler)).await.unwrap();
        let client = RpcClient::connect(handle.addr()).await.unwrap();

        let reply = client.call(call("game.sys.ping", b"[]")).await.unwrap();
        assert_eq!(reply, Bytes::from_static(b"\"pong\""));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_client_call_with_args() {
        let mut handle = RpcServer::bind_local(Arc::new(TestHandler)).await.unwrap();
        let client = RpcClient::connect(handle.addr()).await.unwrap();

        let reply = client
            .call(call(
                "game.math.add",
                br#"[{"t":"int","v":3},{"t":"int","v":4}]"#,
            ))
            .await
            .unwrap();
        assert_eq!(reply, Bytes::from_static(b"7"));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_matched_by_id() {
        let mut handle = RpcServer::bind_local(Arc::new(TestHandler)).await.unwrap();
        let client = Arc::new(RpcClient::connect(handle.addr()).await.unwrap());

        let mut tasks = Vec::new();
        for i in 0..16i64 {
            let client = client.clone();
            tasks.push(tokio::spawn(async move {
                let args = format!(r#"[{{"t":"int","v":{}}},{{"t":"int","v":1}}]"#, i);
                let mut c = call("game.math.add", b"[]");
                c.args = Bytes::from(args);
                let reply = client.call(c).await.unwrap();
                assert_eq!(reply, Bytes::from((i + 1).to_string()));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_client_call_error_returns_remote() {
        let mut handle = RpcServer::bind_local(Arc::new(TestHandler)).await.unwrap();
        let client = RpcClient::connect(handle.addr()).await.unwrap();

        let result = client.call(call("game.sys.nonexistent", b"[]")).await;
        match result {
            Err(StarxError::Remote { code, message }) => {
                assert_eq!(code, -32603);
                assert!(message.contains("game.sys.nonexistent"));
            }
            other => panic!("Expected Remote error, got: {:?}", other),
        }

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_notify_reports_full_queue() {
        let mut handle = RpcServer::bind_local(Arc::new(TestHandler)).await.unwrap();
        let client = RpcClient::connect(handle.addr()).await.unwrap();

        // Nothing yields in between, so the writer task cannot drain the queue.
        for _ in 0..RpcConfig::OUTBOUND_QUEUE {
            client.notify(call("game.sys.ping", b"[]")).unwrap();
        }
        match client.notify(call("game.sys.ping", b"[]")) {
            Err(StarxError::QueueFull { peer }) => assert_eq!(peer, handle.addr().to_string()),
            other => panic!("Expected QueueFull, got: {:?}", other),
        }

        // Once drained, the connection is usable again.
        let reply = client.call(call("game.sys.ping", b"[]")).await.unwrap();
        assert_eq!(reply, Bytes::from_static(b"\"pong\""));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_connect_to_dead_server_returns_connection_lost() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        match RpcClient::connect(addr).await {
            Err(StarxError::ConnectionLost { peer }) => assert_eq!(peer, "127.0.0.1:1"),
            other => panic!("Expected ConnectionLost, got: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_client_detects_server_shutdown() {
        let mut handle = RpcServer::bind_local(Arc::new(TestHandler)).await.unwrap();
        let client = RpcClient::connect(handle.addr()).await.unwrap();

        assert!(client.call(call("game.sys.ping", b"[]")).await.is_ok());

        handle.shutdown();

        let mut detected_shutdown = false;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if client.call(call("game.sys.ping", b"[]")).await.is_err() {
                detected_shutdown = true;
                break;
            }
        }
        assert!(detected_shutdown, "Client should detect server shutdown");
        assert!(client.is_closed());
    }
}
