use std::sync::atomic::{AtomicU64, Ordering};

/// Source of globally unique session ids.
pub trait SessionIdAllocator: Send + Sync {
    fn next_session_id(&self) -> u64;
}

/// Allocates ids from an atomic counter, starting at 1.
#[derive(Debug)]
pub struct SequentialIdAllocator {
    next: AtomicU64,
}

impl SequentialIdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Start from a custom first id, e.g. to keep node id ranges disjoint.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionIdAllocator for SequentialIdAllocator {
    fn next_session_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
