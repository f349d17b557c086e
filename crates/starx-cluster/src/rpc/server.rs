//! TCP RPC server for inbound calls from nodes of other server types.
//!
//! Each connection is served by its own task. Requests on one connection are
//! handled concurrently; replies are written back through a per-connection
//! writer task in completion order and matched by id on the calling side.

use super::dispatcher::RpcCall;
use super::protocol::{encode_message, read_frame, write_frame, RpcReply, RpcRequest};
use crate::config::RpcConfig;
use crate::error::{Result, StarxError};
use crate::route::RouteInfo;
use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Application handler for inbound RPC calls.
#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    /// Handle a call and return the reply payload.
    async fn handle(&self, call: RpcCall) -> Result<Bytes>;
}

/// Handle to a running RPC server. Dropping shuts down the server.
pub struct RpcServerHandle {
    addr: SocketAddr,
    shutdown: ShutdownSignal,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl RpcServerHandle {
    /// Get the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and close all active ones.
    pub fn shutdown(&mut self) {
        if self.shutdown.trigger() {
            info!("RPC server on {} shutting down", self.addr);
        }
    }
}

impl Drop for RpcServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// RPC server that accepts connections from other nodes.
pub struct RpcServer;

impl RpcServer {
    /// Start the server on `addr`.
    pub async fn bind<H: RpcHandler>(addr: SocketAddr, handler: Arc<H>) -> Result<RpcServerHandle> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        info!("RPC server listening on {}", addr);

        let shutdown = ShutdownSignal::new();
        let active_connections = Arc::new(AtomicUsize::new(0));
        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            handler,
            shutdown.clone(),
            active_connections,
        ));

        Ok(RpcServerHandle {
            addr,
            shutdown,
            task_handle: Some(task_handle),
        })
    }

    /// Start the server on an OS-assigned loopback port.
    pub async fn bind_local<H: RpcHandler>(handler: Arc<H>) -> Result<RpcServerHandle> {
        Self::bind(SocketAddr::from(([127, 0, 0, 1], 0)), handler).await
    }

    async fn accept_loop<H: RpcHandler>(
        listener: TcpListener,
        handler: Arc<H>,
        shutdown: ShutdownSignal,
        active_connections: Arc<AtomicUsize>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let current = active_connections.load(Ordering::Relaxed);
                            if current >= RpcConfig::MAX_CONNECTIONS {
                                warn!(
                                    "Rejecting RPC connection from {}: at max capacity ({})",
                                    peer_addr,
                                    RpcConfig::MAX_CONNECTIONS
                                );
                                continue;
                            }

                            active_connections.fetch_add(1, Ordering::Relaxed);
                            let handler = handler.clone();
                            let conns = active_connections.clone();
                            let shutdown = shutdown.clone();

                            tokio::spawn(async move {
                                debug!("RPC connection from {}", peer_addr);
                                let result =
                                    Self::handle_connection(stream, handler, shutdown).await;
                                if let Err(e) = result {
                                    debug!("RPC connection {} ended: {}", peer_addr, e);
                                }
                                conns.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("RPC accept error: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection<H: RpcHandler>(
        stream: TcpStream,
        handler: Arc<H>,
        shutdown: ShutdownSignal,
    ) -> Result<()> {
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();
        let (replies, mut replies_rx) = mpsc::channel::<Vec<u8>>(RpcConfig::OUTBOUND_QUEUE);

        let writer_shutdown = shutdown.clone();
        let writer_task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    frame = replies_rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                    _ = writer_shutdown.triggered() => break,
                };
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    debug!("RPC reply write failed: {}", e);
                    break;
                }
            }
        });

        let result = loop {
            let frame = tokio::select! {
                result = read_frame(&mut reader) => match result {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                },
                _ = shutdown.triggered() => break Ok(()),
            };

            let request: RpcRequest = match serde_json::from_slice(&frame) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Discarding undecodable RPC request: {}", e);
                    if let Some(id) = Self::peek_request_id(&frame) {
                        let err = StarxError::decode("rpc request", e);
                        Self::queue_reply(&replies, &RpcReply::failure(id, &err)).await;
                    }
                    continue;
                }
            };

            let handler = handler.clone();
            let replies = replies.clone();
            tokio::spawn(async move {
                let expects_reply = request.expects_reply;
                let id = request.id;
                let reply = match Self::process_request(request, &*handler).await {
                    Ok(payload) => RpcReply::success(id, payload),
                    Err(e) => {
                        debug!("RPC request {} failed: {}", id, e);
                        RpcReply::failure(id, &e)
                    }
                };
                if expects_reply {
                    Self::queue_reply(&replies, &reply).await;
                }
            });
        };

        drop(replies);
        if shutdown.is_triggered() {
            writer_task.abort();
        } else {
            let _ = writer_task.await;
        }
        result
    }

    async fn process_request<H: RpcHandler>(request: RpcRequest, handler: &H) -> Result<Bytes> {
        let route = RouteInfo::parse(&request.route)?;
        let call = RpcCall {
            route,
            session_id: request.session_id,
            raw_session_id: request.raw_session_id,
            uid: request.uid,
            args: request.args,
        };
        handler.handle(call).await
    }

    fn peek_request_id(frame: &[u8]) -> Option<u64> {
        serde_json::from_slice::<serde_json::Value>(frame)
            .ok()?
            .get("id")?
            .as_u64()
    }

    /// Waits for room in the reply queue, which slows the connection down
    /// instead of buffering without limit.
    async fn queue_reply(replies: &mpsc::Sender<Vec<u8>>, reply: &RpcReply) {
        match encode_message(reply) {
            Ok(frame) => {
                let _ = replies.send(frame).await;
            }
            Err(e) => error!("Failed to encode RPC reply {}: {}", reply.id, e),
        }
    }
}
