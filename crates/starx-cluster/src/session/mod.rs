//! Network-wide client sessions.
//!
//! A [`Session`] is the logical identity of one client. On a frontend node it
//! wraps a local connection; on a backend node it is a proxy for a connection
//! that lives on some frontend node. Application code uses the same calls in
//! both cases:
//!
//! - [`Session::push`] / [`Session::response`] / [`Session::send`] deliver to
//!   the client, locally or through the frontend that owns the socket
//! - [`Session::rpc`] / [`Session::async_rpc`] invoke a handler on a node of a
//!   different server type
//!
//! # Thread Safety
//!
//! Sessions are shared as `Arc<Session>`. Writes to `status`, `uid` and the
//! request sequence are serialized behind one mutex; `last_activity` is an
//! atomic and may be read one update stale.

mod status;
mod table;

pub use status::SessionStatus;
pub use table::SessionTable;

use crate::context::NodeContext;
use crate::error::{Result, StarxError};
use crate::registry::RemoteSession;
use crate::route::RouteInfo;
use crate::rpc::RpcCall;
use crate::serializer::{decode_reply, encode_args, serialize_or_raw, Arg, Payload};
use crate::shutdown::ShutdownSignal;
use crate::transport::OutboundMessage;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

#[derive(Debug)]
struct SessionState {
    uid: Option<i64>,
    request_seq: u64,
    status: SessionStatus,
}

/// Logical identity of one client, valid across node boundaries.
pub struct Session {
    id: u64,
    raw_session_id: u64,
    ctx: Arc<NodeContext>,
    state: Mutex<SessionState>,
    /// Unix milliseconds of the last heartbeat.
    last_activity: AtomicI64,
    closed: ShutdownSignal,
}

impl Session {
    /// Create a session for the connection `raw_session_id`.
    ///
    /// The id comes from the node's session-id allocator. On a backend node,
    /// `raw_session_id` is the id of the frontend link this session proxies for.
    pub fn create(ctx: Arc<NodeContext>, raw_session_id: u64) -> Arc<Self> {
        let id = ctx.next_session_id();
        debug!("Created session {} on raw session {}", id, raw_session_id);

        Arc::new(Self {
            id,
            raw_session_id,
            ctx,
            state: Mutex::new(SessionState {
                uid: None,
                request_seq: 0,
                status: SessionStatus::Start,
            }),
            last_activity: AtomicI64::new(Utc::now().timestamp_millis()),
            closed: ShutdownSignal::new(),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn raw_session_id(&self) -> u64 {
        self.raw_session_id
    }

    /// Bound user id, `None` until [`Session::bind`] succeeds.
    pub fn uid(&self) -> Option<i64> {
        self.lock_state().uid
    }

    pub fn status(&self) -> SessionStatus {
        self.lock_state().status
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_triggered()
    }

    /// Sequence number of the last request processed for this session.
    pub fn request_seq(&self) -> u64 {
        self.lock_state().request_seq
    }

    /// Record the sequence number of the request being processed.
    pub fn set_request_seq(&self, seq: u64) {
        self.lock_state().request_seq = seq;
    }

    /// Assign the next request sequence number and return it.
    pub fn next_request_seq(&self) -> u64 {
        let mut state = self.lock_state();
        state.request_seq += 1;
        state.request_seq
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        let millis = self.last_activity.load(Ordering::Relaxed);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Record heartbeat or traffic on this session.
    pub fn touch(&self) {
        self.last_activity
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Bind the session to an application user id.
    ///
    /// Succeeds only when no valid uid is bound yet. A non-positive uid or a
    /// second bind fails with `InvalidBinding` and leaves the session as it was.
    pub fn bind(&self, uid: i64) -> Result<()> {
        let mut state = self.lock_state();
        if state.status.is_closed() {
            return Err(StarxError::SessionClosed {
                session_id: self.id,
            });
        }

        let reason = if uid <= 0 {
            Some(format!("uid {} is not positive", uid))
        } else {
            state
                .uid
                .map(|bound| format!("already bound to uid {}", bound))
        };
        if let Some(reason) = reason {
            warn!("Rejected bind of session {}: {}", self.id, reason);
            return Err(StarxError::InvalidBinding {
                session_id: self.id,
                reason,
            });
        }

        state.uid = Some(uid);
        debug!("Session {} bound to uid {}", self.id, uid);
        Ok(())
    }

    /// Move the session one step forward, or to `Closed`.
    ///
    /// Any other transition is a programming error and is rejected.
    pub fn advance_status(&self, next: SessionStatus) -> Result<()> {
        let mut state = self.lock_state();
        let current = state.status;
        if !current.can_advance_to(next) {
            error!(
                "Invalid status transition for session {}: {} -> {}",
                self.id, current, next
            );
            return Err(StarxError::InvalidTransition {
                session_id: self.id,
                from: current.to_string(),
                to: next.to_string(),
            });
        }

        state.status = next;
        drop(state);

        if next.is_closed() {
            self.closed.trigger();
        }
        Ok(())
    }

    /// Close the session. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let mut state = self.lock_state();
        if state.status.is_closed() {
            return false;
        }
        state.status = SessionStatus::Closed;
        drop(state);

        self.closed.trigger();
        debug!("Session {} closed", self.id);
        true
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StarxError::SessionClosed {
                session_id: self.id,
            });
        }
        Ok(())
    }

    /// Find the frontend link and frontend connection id this proxy stands for.
    fn remote_target(&self) -> Result<(Arc<RemoteSession>, u64)> {
        let remote = self
            .ctx
            .remote_sessions()
            .lookup(self.raw_session_id)
            .ok_or_else(|| {
                warn!(
                    "Dropping message for session {}: remote session {} not found",
                    self.id, self.raw_session_id
                );
                StarxError::RemoteSessionNotFound {
                    raw_session_id: self.raw_session_id,
                }
            })?;

        let target = remote.translate(self.id).ok_or_else(|| {
            warn!(
                "Dropping message for session {}: not registered on remote session {}",
                self.id, self.raw_session_id
            );
            StarxError::TargetSidNotFound {
                session_id: self.id,
                raw_session_id: self.raw_session_id,
            }
        })?;

        Ok((remote, target))
    }

    async fn deliver(&self, build: impl FnOnce(u64) -> OutboundMessage) -> Result<()> {
        if self.ctx.is_frontend() {
            let message = build(self.raw_session_id);
            return self.ctx.local_transport()?.deliver(message).await;
        }

        let (remote, target) = self.remote_target()?;
        self.ctx
            .response_writer()?
            .deliver(&remote, build(target))
            .await
    }

    /// Push a message on `route` to the client.
    ///
    /// On a backend node a missing remote session or sid mapping drops the push
    /// with an error; nothing is retried.
    pub async fn push(&self, route: &str, data: impl Into<Payload>) -> Result<()> {
        self.ensure_open()?;
        let payload = serialize_or_raw(data.into(), self.ctx.serializer())?;
        self.deliver(|target| OutboundMessage::push(target, route, payload))
            .await
    }

    /// Reply to the client request identified by the current request sequence.
    pub async fn response(&self, data: impl Into<Payload>) -> Result<()> {
        self.ensure_open()?;
        let payload = serialize_or_raw(data.into(), self.ctx.serializer())?;
        let request_id = self.request_seq();
        self.deliver(|target| OutboundMessage::response(target, request_id, payload))
            .await
    }

    /// Send a packet to the client as-is, with no route or request id.
    pub async fn send(&self, data: impl Into<Payload>) -> Result<()> {
        self.ensure_open()?;
        let payload = serialize_or_raw(data.into(), self.ctx.serializer())?;
        self.deliver(|target| OutboundMessage::raw(target, payload))
            .await
    }

    fn prepare_call(&self, route: &str, args: &[Arg]) -> Result<RpcCall> {
        self.ensure_open()?;

        let route = RouteInfo::parse(route)?;
        if route.is_local(self.ctx.config()) {
            return Err(StarxError::RpcMustBeRemote {
                route: route.to_string(),
            });
        }

        let args = encode_args(args)?;
        Ok(RpcCall {
            route,
            session_id: self.id,
            raw_session_id: self.raw_session_id,
            uid: self.uid(),
            args,
        })
    }

    /// Call a handler on a node of another server type and wait for its reply.
    ///
    /// Fails with `RpcMustBeRemote` for routes owned by this node's server type,
    /// `RpcTimeout` after the configured timeout, `Cancelled` on node shutdown,
    /// `SessionClosed` if the session closes while waiting, and `Remote` when
    /// the remote handler reports an error.
    pub async fn rpc(&self, route: &str, args: &[Arg]) -> Result<Bytes> {
        let call = self.prepare_call(route, args)?;
        let shutdown = self.ctx.shutdown_signal();
        if shutdown.is_triggered() {
            return Err(StarxError::Cancelled);
        }

        let timeout = self.ctx.config().rpc_timeout;
        let route = call.route.to_string();

        tokio::select! {
            result = tokio::time::timeout(timeout, self.ctx.dispatcher().call(call)) => {
                result.unwrap_or_else(|_| {
                    warn!("RPC {} from session {} timed out after {:?}", route, self.id, timeout);
                    Err(StarxError::RpcTimeout { route, timeout })
                })
            }
            _ = shutdown.triggered() => Err(StarxError::Cancelled),
            _ = self.closed.triggered() => Err(StarxError::SessionClosed { session_id: self.id }),
        }
    }

    /// Like [`Session::rpc`], decoding the reply into `T`.
    pub async fn rpc_as<T: DeserializeOwned>(&self, route: &str, args: &[Arg]) -> Result<T> {
        let reply = self.rpc(route, args).await?;
        decode_reply(&reply)
    }

    /// Fire-and-forget call to a handler on a node of another server type.
    ///
    /// Returns once the request is queued. There is no completion signal:
    /// `Ok(())` does not mean the remote node received or handled the call.
    pub fn async_rpc(&self, route: &str, args: &[Arg]) -> Result<()> {
        let call = self.prepare_call(route, args)?;
        if self.ctx.shutdown_signal().is_triggered() {
            return Err(StarxError::Cancelled);
        }
        self.ctx.dispatcher().notify(call)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        write!(
            f,
            "Id: {}, Uid: {}, Raw: {}, Status: {}",
            self.id,
            state.uid.unwrap_or(0),
            self.raw_session_id,
            state.status
        )
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("raw_session_id", &self.raw_session_id)
            .field("state", &*self.lock_state())
            .finish()
    }
}
