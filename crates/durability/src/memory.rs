//! In-memory transaction log
//!
//! Reference [`TransactionLog`]. Each registered transaction accumulates
//! CRC-framed entries in its own buffer; commit moves them, followed by a
//! Commit entry, onto the durable log. Abort discards them and records an
//! Abort entry.
//!
//! Fault hooks let tests make the next commit abort, the next mutation be
//! rejected, or the next abort fail.

use dashmap::DashMap;
use fdb_core::{AbortReason, CommitOutcome, Error, Result, TransactionId, TransactionMode};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::encoding::{decode_all, encode_entry, EntryError};
use crate::log::{DeleteOp, InsertOp, RequestKind, TransactionLog, UpdateOp};
use crate::wal::LogEntry;

#[derive(Debug)]
struct Pending {
    mode: TransactionMode,
    frames: Vec<u8>,
}

/// In-memory transaction log
#[derive(Default)]
pub struct MemoryLog {
    pending: DashMap<TransactionId, Pending>,
    durable: Mutex<Vec<u8>>,
    scopes: DashMap<TransactionId, i64>,
    commits: AtomicU64,
    aborts: AtomicU64,
    next_commit_abort: Mutex<Option<AbortReason>>,
    next_submit_rejection: Mutex<Option<String>>,
    fail_next_abort: AtomicBool,
}

impl MemoryLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit come back aborted
    pub fn abort_next_commit(&self, reason: AbortReason) {
        *self.next_commit_abort.lock() = Some(reason);
    }

    /// Make the next mutation submission fail
    pub fn reject_next_submit(&self, reason: impl Into<String>) {
        *self.next_submit_rejection.lock() = Some(reason.into());
    }

    /// Make the next abort fail after discarding the transaction
    pub fn fail_next_abort(&self) {
        self.fail_next_abort.store(true, Ordering::Release);
    }

    /// Check if a transaction is registered
    pub fn is_registered(&self, tid: TransactionId) -> bool {
        self.pending.contains_key(&tid)
    }

    /// Number of registered transactions
    pub fn registered(&self) -> usize {
        self.pending.len()
    }

    /// Entries recorded so far for a live transaction, in submission order
    pub fn pending_entries(&self, tid: TransactionId) -> std::result::Result<Vec<LogEntry>, EntryError> {
        match self.pending.get(&tid) {
            Some(p) => decode_all(&p.frames),
            None => Ok(Vec::new()),
        }
    }

    /// Every entry on the durable log
    pub fn durable_entries(&self) -> std::result::Result<Vec<LogEntry>, EntryError> {
        decode_all(&self.durable.lock())
    }

    /// Currently open shadow scopes for a transaction
    pub fn scope_depth(&self, tid: TransactionId) -> i64 {
        self.scopes.get(&tid).map(|d| *d).unwrap_or(0)
    }

    /// Number of committed transactions
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Acquire)
    }

    /// Number of aborted transactions (refused commits and rollbacks)
    pub fn aborts(&self) -> u64 {
        self.aborts.load(Ordering::Acquire)
    }

    fn append(&self, tid: TransactionId, entry: &LogEntry, op: &'static str) -> Result<()> {
        if let Some(reason) = self.next_submit_rejection.lock().take() {
            return Err(Error::MutationRejected {
                tid,
                operation: op,
                reason,
            });
        }
        let frame = encode_entry(entry).map_err(|e| Error::MutationRejected {
            tid,
            operation: op,
            reason: e.to_string(),
        })?;
        let mut pending = self
            .pending
            .get_mut(&tid)
            .ok_or_else(|| Error::MutationRejected {
                tid,
                operation: op,
                reason: "transaction not registered".into(),
            })?;
        pending.frames.extend_from_slice(&frame);
        Ok(())
    }

    fn finish(&self, tid: TransactionId, expected: TransactionMode) -> Result<CommitOutcome> {
        let pending = self.take_pending(tid, expected)?;

        if let Some(reason) = self.next_commit_abort.lock().take() {
            debug!(%tid, %reason, "commit refused");
            self.record_abort(tid, Some(reason))?;
            return Ok(CommitOutcome::Aborted(reason));
        }

        let commit = encode_entry(&LogEntry::Commit { tid })
            .map_err(|e| Error::Storage(e.to_string()))?;
        {
            let mut durable = self.durable.lock();
            durable.extend_from_slice(&pending.frames);
            durable.extend_from_slice(&commit);
        }
        self.commits.fetch_add(1, Ordering::AcqRel);
        Ok(CommitOutcome::Committed)
    }

    /// Detach the pending entries, leaving the registration in place
    fn take_pending(&self, tid: TransactionId, expected: TransactionMode) -> Result<Pending> {
        let mut pending = self
            .pending
            .get_mut(&tid)
            .ok_or(Error::TransactionNotFound(tid))?;
        if pending.mode != expected {
            return Err(Error::FatalConfiguration(format!(
                "transaction {} registered as {:?}, finished as {:?}",
                tid, pending.mode, expected
            )));
        }
        Ok(Pending {
            mode: pending.mode,
            frames: std::mem::take(&mut pending.frames),
        })
    }

    fn record_abort(&self, tid: TransactionId, reason: Option<AbortReason>) -> Result<()> {
        let frame = encode_entry(&LogEntry::Abort { tid, reason })
            .map_err(|e| Error::Storage(e.to_string()))?;
        self.durable.lock().extend_from_slice(&frame);
        self.aborts.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn rollback(&self, tid: TransactionId, expected: TransactionMode) -> Result<()> {
        self.take_pending(tid, expected)?;
        self.record_abort(tid, None)?;
        if self.fail_next_abort.swap(false, Ordering::AcqRel) {
            return Err(Error::Storage(format!("injected abort failure for {}", tid)));
        }
        Ok(())
    }
}

impl TransactionLog for MemoryLog {
    fn register_transaction(&self, tid: TransactionId, mode: TransactionMode) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        let begin = encode_entry(&LogEntry::Begin { tid, mode })
            .map_err(|e| Error::Storage(e.to_string()))?;
        match self.pending.entry(tid) {
            Entry::Occupied(_) => Err(Error::DuplicateTransaction(tid)),
            Entry::Vacant(slot) => {
                slot.insert(Pending { mode, frames: begin });
                Ok(())
            }
        }
    }

    fn unregister_transaction(&self, tid: TransactionId) -> Result<()> {
        self.scopes.remove(&tid);
        self.pending
            .remove(&tid)
            .map(|_| ())
            .ok_or(Error::TransactionNotFound(tid))
    }

    fn begin_shadow_scope(&self, tid: TransactionId) {
        *self.scopes.entry(tid).or_insert(0) += 1;
    }

    fn end_shadow_scope(&self, tid: TransactionId) {
        let mut depth = self.scopes.entry(tid).or_insert(0);
        if *depth == 0 {
            warn!(%tid, "shadow scope closed without being opened");
            return;
        }
        *depth -= 1;
    }

    fn submit_insert(&self, tid: TransactionId, op: &InsertOp<'_>) -> Result<()> {
        self.append(tid, &LogEntry::insert(tid, op), "insert")
    }

    fn submit_update(&self, tid: TransactionId, op: &UpdateOp<'_>) -> Result<()> {
        self.append(tid, &LogEntry::update(tid, op), "update")
    }

    fn submit_delete(&self, tid: TransactionId, op: &DeleteOp<'_>) -> Result<()> {
        self.append(tid, &LogEntry::delete(tid, op), "delete")
    }

    fn commit_optimistic(&self, tid: TransactionId) -> Result<CommitOutcome> {
        self.finish(tid, TransactionMode::Sosql)
    }

    fn abort_optimistic(&self, tid: TransactionId, kind: RequestKind) -> Result<()> {
        debug!(%tid, ?kind, "optimistic abort");
        self.rollback(tid, TransactionMode::Sosql)
    }

    fn commit_read_committed(&self, tid: TransactionId, timezone: &str) -> Result<CommitOutcome> {
        debug!(%tid, timezone, "read-committed commit");
        self.finish(tid, TransactionMode::ReadCommitted)
    }

    fn abort_read_committed(&self, tid: TransactionId) -> Result<()> {
        self.rollback(tid, TransactionMode::ReadCommitted)
    }
}
