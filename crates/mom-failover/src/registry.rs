//! Registry of the session wrappers that depend on a connection wrapper.
//!
//! Membership only: the registry holds weak references and never keeps a
//! session wrapper alive. The lock is held for map updates and snapshots
//! only, never across an await, so registering from inside a fan-out cannot
//! deadlock.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// The part of a session wrapper the owning connection fans out to.
#[async_trait]
pub(crate) trait ManagedSession: Send + Sync {
    /// Discards the session provider, keeping the wrapper usable.
    async fn invalidate(&self);

    /// Closes the wrapper for good.
    async fn close(&self);
}

#[derive(Default)]
pub(crate) struct SessionRegistry {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<u64, Weak<dyn ManagedSession>>>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn register(&self, id: u64, session: Weak<dyn ManagedSession>) {
        self.sessions.lock().insert(id, session);
    }

    pub(crate) fn unregister(&self, id: u64) -> bool {
        self.sessions.lock().remove(&id).is_some()
    }

    /// Live members in unspecified order. Entries whose wrapper is gone are
    /// pruned on the way.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn ManagedSession>> {
        let mut sessions = self.sessions.lock();
        let mut live = Vec::with_capacity(sessions.len());
        sessions.retain(|_, session| match session.upgrade() {
            Some(session) => {
                live.push(session);
                true
            }
            None => false,
        });
        live
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.lock().len()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("len", &self.len())
            .finish()
    }
}
