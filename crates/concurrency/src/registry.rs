//! Session registry (the checkboard)
//!
//! Maps live transaction ids to their sessions. Lookups never block;
//! [`SessionRegistry::wait_for`] blocks until a session is registered, for
//! messages that overtake their own begin.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fdb_core::{Error, Result, TransactionId};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::session::RemoteSession;

/// Registry of live remote sessions
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<TransactionId, Arc<RemoteSession>>,
    /// Registration generation; bumped under the lock on every register
    arrivals: Mutex<u64>,
    arrived: Condvar,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its transaction id
    pub fn register(&self, session: Arc<RemoteSession>) -> Result<()> {
        let tid = session.tid();
        match self.sessions.entry(tid) {
            Entry::Occupied(_) => return Err(Error::DuplicateTransaction(tid)),
            Entry::Vacant(slot) => {
                slot.insert(session);
            }
        }
        *self.arrivals.lock() += 1;
        self.arrived.notify_all();
        Ok(())
    }

    /// Remove a session
    pub fn unregister(&self, tid: TransactionId) -> Option<Arc<RemoteSession>> {
        self.sessions.remove(&tid).map(|(_, session)| session)
    }

    /// Look up a session
    pub fn lookup(&self, tid: TransactionId) -> Option<Arc<RemoteSession>> {
        self.sessions.get(&tid).map(|s| Arc::clone(s.value()))
    }

    /// Look up a session by numeric request id
    pub fn lookup_request_id(&self, id: u64) -> Option<Arc<RemoteSession>> {
        self.lookup(TransactionId::RequestId(id))
    }

    /// Look up a session by UUID
    pub fn lookup_uuid(&self, id: Uuid) -> Option<Arc<RemoteSession>> {
        self.lookup(TransactionId::Uuid(id))
    }

    /// Wait until a session is registered
    ///
    /// Each wait on the condition variable is bounded by `poll`. Returns
    /// `None` once `deadline` passes.
    pub fn wait_for(
        &self,
        tid: TransactionId,
        poll: Duration,
        deadline: Option<Instant>,
    ) -> Option<Arc<RemoteSession>> {
        let mut generation = self.arrivals.lock();
        loop {
            if let Some(session) = self.lookup(tid) {
                return Some(session);
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    poll.min(deadline - now)
                }
                None => poll,
            };
            self.arrived.wait_for(&mut generation, wait);
        }
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if no session is live
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
