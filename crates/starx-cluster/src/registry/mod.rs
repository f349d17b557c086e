//! Shared registries consulted by sessions.
//!
//! - [`RemoteSessionIndex`]: raw session id to [`RemoteSession`] record, used by
//!   backend nodes to find the frontend connection a proxy session stands for.
//! - [`SessionIdAllocator`]: source of process-wide unique session ids.
//!
//! Both are traits so the node can plug in its own connection service; the
//! in-memory implementations here cover single-process use and tests.

mod remote_session;
mod session_ids;

pub use remote_session::{RemoteSession, RemoteSessionIndex, RemoteSessionRegistry};
pub use session_ids::{SequentialIdAllocator, SessionIdAllocator};
