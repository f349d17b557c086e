//! Remote session records and their index.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// A frontend connection as seen from a backend node.
///
/// Maps backend-local session ids to the raw connection id the client socket
/// has on the frontend node.
#[derive(Debug)]
pub struct RemoteSession {
    raw_session_id: u64,
    frontend: String,
    sid_map: RwLock<HashMap<u64, u64>>,
}

impl RemoteSession {
    /// Create a record for the frontend link `raw_session_id` from `frontend`.
    pub fn new(raw_session_id: u64, frontend: impl Into<String>) -> Self {
        Self {
            raw_session_id,
            frontend: frontend.into(),
            sid_map: RwLock::new(HashMap::new()),
        }
    }

    /// Builder-style registration, used before the record is published.
    pub fn with_session(self, local_session_id: u64, frontend_sid: u64) -> Self {
        self.register(local_session_id, frontend_sid);
        self
    }

    pub fn raw_session_id(&self) -> u64 {
        self.raw_session_id
    }

    /// Identifier of the frontend node that owns the sockets.
    pub fn frontend(&self) -> &str {
        &self.frontend
    }

    /// Map a backend-local session id to a frontend raw connection id.
    pub fn register(&self, local_session_id: u64, frontend_sid: u64) -> Option<u64> {
        self.sid_map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(local_session_id, frontend_sid)
    }

    pub fn unregister(&self, local_session_id: u64) -> Option<u64> {
        self.sid_map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&local_session_id)
    }

    /// Translate a backend-local session id to the frontend raw connection id.
    pub fn translate(&self, local_session_id: u64) -> Option<u64> {
        self.sid_map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&local_session_id)
            .copied()
    }

    pub fn session_count(&self) -> usize {
        self.sid_map.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Lookup of remote session records by raw session id.
pub trait RemoteSessionIndex: Send + Sync {
    fn lookup(&self, raw_session_id: u64) -> Option<Arc<RemoteSession>>;
}

/// In-memory [`RemoteSessionIndex`].
///
/// Records are published as fully built `Arc`s, so a concurrent lookup sees
/// either nothing or the complete record.
#[derive(Debug, Default)]
pub struct RemoteSessionRegistry {
    records: RwLock<HashMap<u64, Arc<RemoteSession>>>,
}

impl RemoteSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a record, replacing any previous one for the same raw id.
    pub fn insert(&self, record: RemoteSession) -> Arc<RemoteSession> {
        let record = Arc::new(record);
        debug!(
            "Registered remote session {} from {}",
            record.raw_session_id, record.frontend
        );
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.raw_session_id, record.clone());
        record
    }

    pub fn remove(&self, raw_session_id: u64) -> Option<Arc<RemoteSession>> {
        let removed = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&raw_session_id);
        if removed.is_some() {
            debug!("Removed remote session {}", raw_session_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RemoteSessionIndex for RemoteSessionRegistry {
    fn lookup(&self, raw_session_id: u64) -> Option<Arc<RemoteSession>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&raw_session_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_registered_session() {
        let record = RemoteSession::new(3, "gate-1").with_session(7, 99);
        assert_eq!(record.translate(7), Some(99));
        assert_eq!(record.translate(8), None);
        assert_eq!(record.frontend(), "gate-1");
    }

    #[test]
    fn test_unregister() {
        let record = RemoteSession::new(3, "gate-1").with_session(7, 99);
        assert_eq!(record.unregister(7), Some(99));
        assert_eq!(record.translate(7), None);
        assert_eq!(record.session_count(), 0);
    }

    #[test]
    fn test_registry_lookup_and_remove() {
        let registry = RemoteSessionRegistry::new();
        assert!(registry.lookup(3).is_none());

        registry.insert(RemoteSession::new(3, "gate-1").with_session(7, 99));
        let found = registry.lookup(3).expect("record should be present");
        assert_eq!(found.translate(7), Some(99));

        assert!(registry.remove(3).is_some());
        assert!(registry.lookup(3).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lookup_handle_survives_removal() {
        let registry = RemoteSessionRegistry::new();
        registry.insert(RemoteSession::new(3, "gate-1").with_session(7, 99));

        let held = registry.lookup(3).unwrap();
        registry.remove(3);
        assert_eq!(held.translate(7), Some(99));
    }

    #[test]
    fn test_concurrent_lookups_see_complete_records() {
        let registry = Arc::new(RemoteSessionRegistry::new());

        let writer = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for raw in 0..200u64 {
                    let record = RemoteSession::new(raw, "gate-1").with_session(raw, raw + 1000);
                    registry.insert(record);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for raw in 0..200u64 {
                        if let Some(record) = registry.lookup(raw) {
                            assert_eq!(record.translate(raw), Some(raw + 1000));
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(registry.len(), 200);
    }
}
