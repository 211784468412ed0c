//! Write-ahead log collaborator
//!
//! The backend hands every mutation of a remote transaction to a
//! [`TransactionLog`], which owns atomicity and replication. Commit decisions
//! come back as [`CommitOutcome`]; an abort decided by the log is a normal
//! outcome, not an error.

use fdb_core::{CommitOutcome, IndexKeys, OnDiskRow, Result, RowId, TransactionId, TransactionMode};

/// Who asked for an optimistic abort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Request arrived over a peer socket
    Socket,
    /// Request originated on this node
    Local,
}

/// Insert of a converted row
#[derive(Debug)]
pub struct InsertOp<'a> {
    /// Table name
    pub table: &'a str,
    /// Row id of the new row
    pub row_id: RowId,
    /// Converted row
    pub row: &'a OnDiskRow,
    /// Index keys
    pub keys: &'a IndexKeys,
}

/// Update of an existing row
#[derive(Debug)]
pub struct UpdateOp<'a> {
    /// Table name
    pub table: &'a str,
    /// Row id being replaced
    pub old_row_id: RowId,
    /// Row id after the update
    pub new_row_id: RowId,
    /// Converted new row
    pub row: &'a OnDiskRow,
    /// Keys to remove
    pub delete_keys: &'a IndexKeys,
    /// Keys to add
    pub insert_keys: &'a IndexKeys,
}

/// Delete of an existing row
#[derive(Debug)]
pub struct DeleteOp<'a> {
    /// Table name
    pub table: &'a str,
    /// Row id being deleted
    pub row_id: RowId,
    /// Keys to remove
    pub keys: &'a IndexKeys,
}

/// Write-ahead log and shadow-table operations used by the backend
pub trait TransactionLog: Send + Sync {
    /// Register a transaction; fails with `DuplicateTransaction` if present
    fn register_transaction(&self, tid: TransactionId, mode: TransactionMode) -> Result<()>;

    /// Forget a transaction
    fn unregister_transaction(&self, tid: TransactionId) -> Result<()>;

    /// Enter a shadow-table scope on the calling thread
    fn begin_shadow_scope(&self, tid: TransactionId);

    /// Leave a shadow-table scope
    fn end_shadow_scope(&self, tid: TransactionId);

    /// Record an insert
    fn submit_insert(&self, tid: TransactionId, op: &InsertOp<'_>) -> Result<()>;

    /// Record an update
    fn submit_update(&self, tid: TransactionId, op: &UpdateOp<'_>) -> Result<()>;

    /// Record a delete
    fn submit_delete(&self, tid: TransactionId, op: &DeleteOp<'_>) -> Result<()>;

    /// Commit an optimistic (SOSQL) transaction
    fn commit_optimistic(&self, tid: TransactionId) -> Result<CommitOutcome>;

    /// Abort an optimistic (SOSQL) transaction
    fn abort_optimistic(&self, tid: TransactionId, kind: RequestKind) -> Result<()>;

    /// Commit a read-committed transaction; `timezone` is the session's
    fn commit_read_committed(&self, tid: TransactionId, timezone: &str) -> Result<CommitOutcome>;

    /// Abort a read-committed transaction
    fn abort_read_committed(&self, tid: TransactionId) -> Result<()>;
}
