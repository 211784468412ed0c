//! Remote session state
//!
//! A [`RemoteSession`] is the server-side half of a peer's transaction. All
//! of its mutable state sits behind one lock:
//!
//! - the set of open cursors
//! - the sequence turnstile (next expected sequence number)
//! - the shared cursor-transaction handle and the shadow transaction
//! - the write and finished flags
//!
//! The condition variable is signalled whenever a cursor closes or the
//! turnstile advances. Waits are bounded by the configured poll interval, so
//! a missed wakeup costs at most one interval.
//!
//! ## Sequencing
//!
//! Messages of one transaction may arrive out of order. Each carries the
//! sequence number the peer assigned to it (begin is 0). A message with
//! sequence `n` waits until `n - 1` has passed, then advances the turnstile
//! and runs its log submission while still holding the lock.

use chrono_tz::Tz;
use fdb_core::{IsolationLevel, Result, TransactionId, TransactionMode};
use fdb_storage::{CursorTran, CursorTranRef, ShadowTran, ShadowTranRef, StorageEngine};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cursor id, unique within a session
pub type CursorId = u64;

/// Per-transaction message sequence number
pub type SequenceNumber = u64;

/// How a cursor holds its cursor-transaction handle
#[derive(Debug)]
pub enum CursorTranBinding {
    /// Uses the session's shared handle; never released by the cursor
    Shared(CursorTranRef),
    /// Owns a handle acquired for this cursor alone
    Standalone(CursorTran),
}

impl CursorTranBinding {
    /// Check if the cursor owns its handle
    pub fn is_standalone(&self) -> bool {
        matches!(self, CursorTranBinding::Standalone(_))
    }

    /// Id of the bound handle
    pub fn tran_id(&self) -> u64 {
        match self {
            CursorTranBinding::Shared(shared) => shared.id(),
            CursorTranBinding::Standalone(tran) => tran.id(),
        }
    }

    /// Reference to open storage cursors with
    pub fn reference(&self) -> CursorTranRef {
        match self {
            CursorTranBinding::Shared(shared) => *shared,
            CursorTranBinding::Standalone(tran) => tran.reference(),
        }
    }
}

/// Row effects of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Effects {
    /// Rows inserted
    pub inserted: u64,
    /// Rows updated
    pub updated: u64,
    /// Rows deleted
    pub deleted: u64,
}

/// What a session remembers about an open cursor
#[derive(Debug, Clone)]
struct OpenCursor {
    table: String,
    index: Option<usize>,
}

#[derive(Debug)]
struct SessionState {
    timezone: Tz,
    open_cursors: FxHashMap<CursorId, OpenCursor>,
    next_cursor_id: CursorId,
    next_sequence: SequenceNumber,
    commit_sequence: Option<SequenceNumber>,
    cursor_tran: Option<CursorTran>,
    shadow_tran: Option<ShadowTran>,
    write_transaction: bool,
    finished: bool,
}

/// Options fixed when a session is created
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Temporal conversion timezone
    pub timezone: Tz,
    /// Request flags from the peer
    pub flags: u32,
    /// Peer code release, for standalone sessions
    pub code_release: Option<u32>,
    /// Begin-created (sequenced) or standalone
    pub transactional: bool,
    /// Sequence number of the creating message
    pub first_sequence: SequenceNumber,
    /// Bound on one condition-variable wait
    pub poll_interval: Duration,
    /// Emit tracking diagnostics
    pub track: bool,
}

/// Server-side state of one remote transaction
#[derive(Debug)]
pub struct RemoteSession {
    tid: TransactionId,
    mode: TransactionMode,
    flags: u32,
    code_release: Option<u32>,
    transactional: bool,
    poll_interval: Duration,
    track: bool,
    state: Mutex<SessionState>,
    changed: Condvar,
    inserted: AtomicU64,
    updated: AtomicU64,
    deleted: AtomicU64,
}

impl RemoteSession {
    /// Create a session
    pub fn new(tid: TransactionId, mode: TransactionMode, options: SessionOptions) -> Self {
        Self {
            tid,
            mode,
            flags: options.flags,
            code_release: options.code_release,
            transactional: options.transactional,
            poll_interval: options.poll_interval,
            track: options.track,
            state: Mutex::new(SessionState {
                timezone: options.timezone,
                open_cursors: FxHashMap::default(),
                next_cursor_id: 1,
                next_sequence: options.first_sequence + 1,
                commit_sequence: None,
                cursor_tran: None,
                shadow_tran: None,
                write_transaction: false,
                finished: false,
            }),
            changed: Condvar::new(),
            inserted: AtomicU64::new(0),
            updated: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
        }
    }

    /// Transaction id
    pub fn tid(&self) -> TransactionId {
        self.tid
    }

    /// Transaction mode, fixed at creation
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Isolation level of the mode
    pub fn isolation(&self) -> IsolationLevel {
        self.mode.isolation()
    }

    /// Request flags
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Peer code release (standalone sessions)
    pub fn code_release(&self) -> Option<u32> {
        self.code_release
    }

    /// Check if the session was created by a begin
    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    /// Timezone used for row conversion
    pub fn timezone(&self) -> Tz {
        self.state.lock().timezone
    }

    /// Change the conversion timezone
    pub fn set_timezone(&self, tz: Tz) {
        self.state.lock().timezone = tz;
    }

    /// Install the handles acquired at begin
    pub fn install_handles(&self, cursor_tran: CursorTran, shadow_tran: Option<ShadowTran>) {
        let mut state = self.state.lock();
        state.cursor_tran = Some(cursor_tran);
        state.shadow_tran = shadow_tran;
    }

    /// Check if the shared cursor-transaction handle is held
    pub fn has_cursor_tran(&self) -> bool {
        self.state.lock().cursor_tran.is_some()
    }

    /// Check if a shadow transaction is held
    pub fn has_shadow_tran(&self) -> bool {
        self.state.lock().shadow_tran.is_some()
    }

    /// Take the shared cursor-transaction handle
    pub fn take_cursor_tran(&self) -> Option<CursorTran> {
        self.state.lock().cursor_tran.take()
    }

    /// Take the shadow transaction
    pub fn take_shadow_tran(&self) -> Option<ShadowTran> {
        self.state.lock().shadow_tran.take()
    }

    /// Reference to the session's shadow handle
    pub fn shadow_ref(&self) -> Option<ShadowTranRef> {
        self.state.lock().shadow_tran.as_ref().map(ShadowTran::reference)
    }

    /// Register a cursor and bind it to a cursor-transaction handle
    ///
    /// Binds the shared handle when the session holds one, otherwise acquires
    /// a standalone handle from `storage`.
    pub fn register_cursor(
        &self,
        table: &str,
        index: Option<usize>,
        storage: &dyn StorageEngine,
    ) -> Result<(CursorId, CursorTranBinding)> {
        let mut state = self.state.lock();
        let binding = match &state.cursor_tran {
            Some(shared) => CursorTranBinding::Shared(shared.reference()),
            None => {
                let tran = storage.acquire_cursor_tran()?;
                if self.track {
                    info!(tid = %self.tid, %tran, table, "acquired standalone cursor transaction");
                }
                CursorTranBinding::Standalone(tran)
            }
        };

        let id = state.next_cursor_id;
        state.next_cursor_id += 1;
        state.open_cursors.insert(
            id,
            OpenCursor {
                table: table.to_string(),
                index,
            },
        );
        Ok((id, binding))
    }

    /// Forget a cursor, waking anyone draining the session
    pub fn release_cursor(&self, id: CursorId) -> bool {
        let removed = self.state.lock().open_cursors.remove(&id);
        self.changed.notify_all();
        removed.is_some()
    }

    /// Number of open cursors
    pub fn open_cursor_count(&self) -> usize {
        self.state.lock().open_cursors.len()
    }

    /// Tables of the open cursors, for diagnostics
    pub fn open_cursor_tables(&self) -> Vec<(String, Option<usize>)> {
        self.state
            .lock()
            .open_cursors
            .values()
            .map(|c| (c.table.clone(), c.index))
            .collect()
    }

    /// Pass the sequence turnstile, then run `f` under the session lock
    ///
    /// A sequence number below the expected one is a late or duplicated
    /// message; it is logged and `f` still runs, but the turnstile does not
    /// move. Standalone sessions are not sequenced.
    pub fn sequenced<R>(&self, sequence: SequenceNumber, f: impl FnOnce() -> R) -> R {
        let mut state = self.state.lock();
        if self.transactional {
            self.advance(&mut state, sequence);
        }
        let result = f();
        drop(state);
        result
    }

    /// Pass the turnstile for a message that failed before submitting
    ///
    /// Later messages and the commit or rollback would otherwise wait on
    /// this sequence number forever.
    pub fn skip_sequence(&self, sequence: SequenceNumber) {
        self.sequenced(sequence, || {
            debug!(tid = %self.tid, sequence, "sequence consumed by failed message");
        })
    }

    fn advance(&self, state: &mut parking_lot::MutexGuard<'_, SessionState>, sequence: SequenceNumber) {
        while state.next_sequence < sequence {
            self.changed.wait_for(state, self.poll_interval);
        }
        if sequence < state.next_sequence {
            warn!(
                tid = %self.tid,
                sequence,
                expected = state.next_sequence,
                "late or duplicate sequence number"
            );
            return;
        }
        state.next_sequence = sequence + 1;
        self.changed.notify_all();
    }

    /// Next sequence number the turnstile expects
    pub fn next_sequence(&self) -> SequenceNumber {
        self.state.lock().next_sequence
    }

    /// Commit/rollback barrier
    ///
    /// Records the finishing sequence, waits for every earlier message to
    /// pass the turnstile, then waits until no cursor is open.
    pub fn wait_for_drain(&self, sequence: SequenceNumber) {
        let mut state = self.state.lock();
        state.commit_sequence = Some(sequence);
        if self.transactional {
            self.advance(&mut state, sequence);
        }
        while !state.open_cursors.is_empty() {
            self.changed.wait_for(&mut state, self.poll_interval);
        }
    }

    /// Sequence number of the commit or rollback, once one arrived
    pub fn commit_sequence(&self) -> Option<SequenceNumber> {
        self.state.lock().commit_sequence
    }

    /// Flag the transaction as having written
    pub fn mark_write(&self) {
        self.state.lock().write_transaction = true;
    }

    /// Check if the transaction has written
    pub fn is_write_transaction(&self) -> bool {
        self.state.lock().write_transaction
    }

    /// Mark the transaction finished and clear the write flag
    pub fn mark_finished(&self) {
        let mut state = self.state.lock();
        state.write_transaction = false;
        state.finished = true;
    }

    /// Check if commit or rollback has completed
    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    /// Count one inserted row
    #[inline]
    pub fn record_insert(&self) {
        self.inserted.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one updated row
    #[inline]
    pub fn record_update(&self) {
        self.updated.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one deleted row
    #[inline]
    pub fn record_delete(&self) {
        self.deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Effects so far
    pub fn effects(&self) -> Effects {
        Effects {
            inserted: self.inserted.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
        }
    }

    /// Check if tracking diagnostics are on
    pub fn tracking(&self) -> bool {
        self.track
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdb_storage::MemoryStorage;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    fn options(transactional: bool) -> SessionOptions {
        SessionOptions {
            timezone: Tz::UTC,
            flags: 0,
            code_release: None,
            transactional,
            first_sequence: 0,
            poll_interval: Duration::from_millis(1),
            track: false,
        }
    }

    fn session(transactional: bool) -> Arc<RemoteSession> {
        Arc::new(RemoteSession::new(
            TransactionId::RequestId(1),
            TransactionMode::Sosql,
            options(transactional),
        ))
    }

    #[test]
    fn test_shared_binding_when_handle_installed() {
        let storage = MemoryStorage::new();
        let s = session(true);
        s.install_handles(storage.acquire_cursor_tran().unwrap(), None);

        let (_, binding) = s.register_cursor("t", None, &storage).unwrap();
        assert!(!binding.is_standalone());
        assert_eq!(storage.live_cursor_trans(), 1);
    }

    #[test]
    fn test_standalone_binding_without_handle() {
        let storage = MemoryStorage::new();
        let s = session(false);
        let (id, binding) = s.register_cursor("t", Some(0), &storage).unwrap();
        assert!(binding.is_standalone());
        assert_eq!(storage.live_cursor_trans(), 1);
        assert_eq!(s.open_cursor_tables(), vec![("t".to_string(), Some(0))]);

        assert!(s.release_cursor(id));
        assert!(!s.release_cursor(id));
        match binding {
            CursorTranBinding::Standalone(tran) => storage.release_cursor_tran(tran).unwrap(),
            CursorTranBinding::Shared(_) => unreachable!(),
        }
    }

    #[test]
    fn test_turnstile_orders_out_of_order_messages() {
        let s = session(true);
        let order = Arc::new(Mutex::new(Vec::new()));

        let late = {
            let s = Arc::clone(&s);
            let order = Arc::clone(&order);
            thread::spawn(move || s.sequenced(2, || order.lock().push(2)))
        };
        // Give the second message a head start
        thread::sleep(Duration::from_millis(20));
        assert!(order.lock().is_empty());

        s.sequenced(1, || order.lock().push(1));
        late.join().unwrap();

        assert_eq!(*order.lock(), vec![1, 2]);
        assert_eq!(s.next_sequence(), 3);
    }

    #[test]
    fn test_duplicate_sequence_does_not_move_turnstile() {
        let s = session(true);
        s.sequenced(1, || ());
        s.sequenced(1, || ());
        assert_eq!(s.next_sequence(), 2);
    }

    #[test]
    fn test_skipped_sequence_releases_later_messages() {
        let s = session(true);
        let later = {
            let s = Arc::clone(&s);
            thread::spawn(move || s.sequenced(2, || 2))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(s.next_sequence(), 1);

        s.skip_sequence(1);
        assert_eq!(later.join().unwrap(), 2);
        assert_eq!(s.next_sequence(), 3);

        // The drain barrier passes a skipped sequence too
        s.skip_sequence(3);
        s.wait_for_drain(4);
        assert_eq!(s.commit_sequence(), Some(4));
    }

    #[test]
    fn test_bindings_reference_their_handle() {
        let storage = MemoryStorage::new();
        let s = session(true);
        assert_eq!(s.shadow_ref(), None);

        let tran = storage.acquire_cursor_tran().unwrap();
        let shadow = storage.begin_shadow_tran().unwrap();
        let (tran_ref, shadow_ref) = (tran.reference(), shadow.reference());
        s.install_handles(tran, Some(shadow));
        assert_eq!(s.shadow_ref(), Some(shadow_ref));

        let (_, binding) = s.register_cursor("t", None, &storage).unwrap();
        assert_eq!(binding.reference(), tran_ref);
        assert_eq!(binding.tran_id(), tran_ref.id());
    }

    #[test]
    fn test_standalone_session_is_not_sequenced() {
        let s = session(false);
        assert_eq!(s.sequenced(7, || 42), 42);
        assert_eq!(s.next_sequence(), 1);
    }

    #[test]
    fn test_drain_waits_for_open_cursors() {
        let storage = MemoryStorage::new();
        let s = session(true);
        s.install_handles(storage.acquire_cursor_tran().unwrap(), None);
        let (id, _) = s.register_cursor("t", None, &storage).unwrap();

        let drained = Arc::new(AtomicBool::new(false));
        let waiter = {
            let s = Arc::clone(&s);
            let drained = Arc::clone(&drained);
            thread::spawn(move || {
                s.wait_for_drain(1);
                drained.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!drained.load(Ordering::SeqCst));

        s.release_cursor(id);
        waiter.join().unwrap();
        assert!(drained.load(Ordering::SeqCst));
        assert_eq!(s.commit_sequence(), Some(1));
    }

    #[test]
    fn test_effects_and_flags() {
        let s = session(true);
        s.record_insert();
        s.record_insert();
        s.record_delete();
        s.mark_write();
        assert!(s.is_write_transaction());
        assert_eq!(
            s.effects(),
            Effects {
                inserted: 2,
                updated: 0,
                deleted: 1
            }
        );
        s.mark_finished();
        assert!(!s.is_write_transaction());
        assert!(s.is_finished());
    }
}
