//! Live sessions of one node, indexed by session id and bound uid.

use super::Session;
use crate::context::NodeContext;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

#[derive(Default)]
struct TableInner {
    sessions: HashMap<u64, Arc<Session>>,
    by_uid: HashMap<i64, u64>,
}

/// Table of live sessions.
///
/// Both indexes sit behind a single lock, so a session is never visible by id
/// without its uid entry or the other way round.
pub struct SessionTable {
    ctx: Arc<NodeContext>,
    inner: RwLock<TableInner>,
}

impl SessionTable {
    pub fn new(ctx: Arc<NodeContext>) -> Self {
        Self {
            ctx,
            inner: RwLock::new(TableInner::default()),
        }
    }

    /// Create a session on `raw_session_id` and add it to the table.
    pub fn create(&self, raw_session_id: u64) -> Arc<Session> {
        let session = Session::create(self.ctx.clone(), raw_session_id);
        self.insert(session.clone());
        session
    }

    /// Add an existing session.
    pub fn insert(&self, session: Arc<Session>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(uid) = session.uid() {
            inner.by_uid.insert(uid, session.id());
        }
        inner.sessions.insert(session.id(), session);
    }

    pub fn get(&self, session_id: u64) -> Option<Arc<Session>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sessions
            .get(&session_id)
            .cloned()
    }

    /// Find the session currently bound to `uid`.
    pub fn find_by_uid(&self, uid: i64) -> Option<Arc<Session>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let session_id = inner.by_uid.get(&uid)?;
        inner.sessions.get(session_id).cloned()
    }

    /// Bind a session to `uid` and make it addressable by that uid.
    ///
    /// A later login of the same uid on another session takes over the index
    /// entry.
    pub fn bind(&self, session: &Session, uid: i64) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        session.bind(uid)?;
        if let Some(previous) = inner.by_uid.insert(uid, session.id()) {
            if previous != session.id() {
                debug!(
                    "uid {} moved from session {} to session {}",
                    uid,
                    previous,
                    session.id()
                );
            }
        }
        Ok(())
    }

    /// Remove and close a session.
    pub fn remove(&self, session_id: u64) -> Option<Arc<Session>> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let session = inner.sessions.remove(&session_id)?;
        if let Some(uid) = session.uid() {
            if inner.by_uid.get(&uid) == Some(&session_id) {
                inner.by_uid.remove(&uid);
            }
        }
        drop(inner);

        session.close();
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sessions
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::error::StarxError;
    use crate::transport::{LocalTransport, OutboundMessage};
    use async_trait::async_trait;

    struct NullTransport;

    #[async_trait]
    impl LocalTransport for NullTransport {
        async fn deliver(&self, _message: OutboundMessage) -> Result<()> {
            Ok(())
        }
    }

    fn table() -> SessionTable {
        let ctx = NodeContext::builder(NodeConfig::frontend("gate"))
            .local_transport(Arc::new(NullTransport))
            .build()
            .unwrap();
        SessionTable::new(ctx)
    }

    #[test]
    fn test_create_and_get() {
        let table = table();
        let session = table.create(5);

        assert_eq!(table.len(), 1);
        let found = table.get(session.id()).unwrap();
        assert!(Arc::ptr_eq(&found, &session));
    }

    #[test]
    fn test_bind_indexes_by_uid() {
        let table = table();
        let session = table.create(5);
        assert!(table.find_by_uid(42).is_none());

        table.bind(&session, 42).unwrap();
        assert_eq!(table.find_by_uid(42).unwrap().id(), session.id());
    }

    #[test]
    fn test_failed_bind_leaves_index_unchanged() {
        let table = table();
        let session = table.create(5);
        table.bind(&session, 42).unwrap();

        assert!(matches!(
            table.bind(&session, 43),
            Err(StarxError::InvalidBinding { .. })
        ));
        assert!(table.find_by_uid(43).is_none());
        assert_eq!(table.find_by_uid(42).unwrap().id(), session.id());
    }

    #[test]
    fn test_relogin_takes_over_uid() {
        let table = table();
        let first = table.create(5);
        let second = table.create(6);
        table.bind(&first, 42).unwrap();
        table.bind(&second, 42).unwrap();

        assert_eq!(table.find_by_uid(42).unwrap().id(), second.id());

        // Removing the stale session keeps the newer uid entry.
        table.remove(first.id());
        assert_eq!(table.find_by_uid(42).unwrap().id(), second.id());
    }

    #[test]
    fn test_remove_closes_and_unindexes() {
        let table = table();
        let session = table.create(5);
        table.bind(&session, 42).unwrap();

        let removed = table.remove(session.id()).unwrap();
        assert!(removed.is_closed());
        assert!(table.get(session.id()).is_none());
        assert!(table.find_by_uid(42).is_none());
        assert!(table.is_empty());
        assert!(table.remove(session.id()).is_none());
    }
}
