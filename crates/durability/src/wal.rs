//! Log entry types
//!
//! Every change a remote transaction makes is recorded as a [`LogEntry`]:
//! - Begin: transaction registered with its mode
//! - Insert / Update / Delete: row mutations with their index keys
//! - Commit: transaction made durable
//! - Abort: transaction discarded, with the abort reason when there is one
//!
//! All entries carry the transaction id, so a log can be filtered per
//! transaction.

use fdb_core::{AbortReason, IndexKeys, OnDiskRow, RowId, TransactionId, TransactionMode};
use serde::{Deserialize, Serialize};

use crate::log::{DeleteOp, InsertOp, UpdateOp};

/// Log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogEntry {
    /// Transaction registered
    Begin {
        /// Transaction
        tid: TransactionId,
        /// Mode fixed at registration
        mode: TransactionMode,
    },

    /// Row inserted
    Insert {
        /// Transaction
        tid: TransactionId,
        /// Table name
        table: String,
        /// Row id of the new row
        row_id: RowId,
        /// On-disk record
        row: Vec<u8>,
        /// Out-of-line blob payloads
        blobs: Vec<Option<Vec<u8>>>,
        /// Index keys, by index number
        keys: Vec<Option<Vec<u8>>>,
    },

    /// Row replaced
    Update {
        /// Transaction
        tid: TransactionId,
        /// Table name
        table: String,
        /// Row id being replaced
        old_row_id: RowId,
        /// Row id after the update
        new_row_id: RowId,
        /// New on-disk record
        row: Vec<u8>,
        /// New blob payloads
        blobs: Vec<Option<Vec<u8>>>,
        /// Keys to remove
        delete_keys: Vec<Option<Vec<u8>>>,
        /// Keys to add
        insert_keys: Vec<Option<Vec<u8>>>,
    },

    /// Row deleted
    Delete {
        /// Transaction
        tid: TransactionId,
        /// Table name
        table: String,
        /// Row id being deleted
        row_id: RowId,
        /// Keys to remove
        keys: Vec<Option<Vec<u8>>>,
    },

    /// Transaction committed
    Commit {
        /// Transaction
        tid: TransactionId,
    },

    /// Transaction aborted
    Abort {
        /// Transaction
        tid: TransactionId,
        /// Why the commit was refused; `None` for a requested rollback
        reason: Option<AbortReason>,
    },
}

fn key_bytes(keys: &IndexKeys) -> Vec<Option<Vec<u8>>> {
    keys.iter()
        .map(|slot| slot.map(|key| key.as_bytes().to_vec()))
        .collect()
}

fn row_parts(row: &OnDiskRow) -> (Vec<u8>, Vec<Option<Vec<u8>>>) {
    (row.data().as_bytes().to_vec(), row.blobs().to_vec())
}

impl LogEntry {
    /// Entry for an insert
    pub fn insert(tid: TransactionId, op: &InsertOp<'_>) -> Self {
        let (row, blobs) = row_parts(op.row);
        LogEntry::Insert {
            tid,
            table: op.table.to_string(),
            row_id: op.row_id,
            row,
            blobs,
            keys: key_bytes(op.keys),
        }
    }

    /// Entry for an update
    pub fn update(tid: TransactionId, op: &UpdateOp<'_>) -> Self {
        let (row, blobs) = row_parts(op.row);
        LogEntry::Update {
            tid,
            table: op.table.to_string(),
            old_row_id: op.old_row_id,
            new_row_id: op.new_row_id,
            row,
            blobs,
            delete_keys: key_bytes(op.delete_keys),
            insert_keys: key_bytes(op.insert_keys),
        }
    }

    /// Entry for a delete
    pub fn delete(tid: TransactionId, op: &DeleteOp<'_>) -> Self {
        LogEntry::Delete {
            tid,
            table: op.table.to_string(),
            row_id: op.row_id,
            keys: key_bytes(op.keys),
        }
    }

    /// Transaction this entry belongs to
    pub fn tid(&self) -> TransactionId {
        match self {
            LogEntry::Begin { tid, .. }
            | LogEntry::Insert { tid, .. }
            | LogEntry::Update { tid, .. }
            | LogEntry::Delete { tid, .. }
            | LogEntry::Commit { tid }
            | LogEntry::Abort { tid, .. } => *tid,
        }
    }

    /// Table touched by a mutation entry
    pub fn table(&self) -> Option<&str> {
        match self {
            LogEntry::Insert { table, .. }
            | LogEntry::Update { table, .. }
            | LogEntry::Delete { table, .. } => Some(table),
            _ => None,
        }
    }

    /// Check if entry is a transaction boundary
    pub fn is_txn_boundary(&self) -> bool {
        matches!(
            self,
            LogEntry::Begin { .. } | LogEntry::Commit { .. } | LogEntry::Abort { .. }
        )
    }

    /// Check if entry is a row mutation
    pub fn is_mutation(&self) -> bool {
        self.table().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdb_core::{KeyBuffer, OnDiskBuffer, WireBuffer};

    fn tid() -> TransactionId {
        TransactionId::RequestId(0x2a)
    }

    #[test]
    fn test_insert_entry_from_op() {
        let row = OnDiskRow::new(OnDiskBuffer::from_bytes(vec![8, 1]), vec![Some(vec![9])]);
        let mut keys = IndexKeys::new();
        keys.set(1, KeyBuffer::Wire(WireBuffer::new(vec![5])));
        let op = InsertOp {
            table: "t",
            row_id: RowId::new(3),
            row: &row,
            keys: &keys,
        };

        let entry = LogEntry::insert(tid(), &op);
        assert_eq!(entry.tid(), tid());
        assert_eq!(entry.table(), Some("t"));
        assert!(entry.is_mutation());
        assert!(!entry.is_txn_boundary());
        match entry {
            LogEntry::Insert { row, blobs, keys, .. } => {
                assert_eq!(row, vec![8, 1]);
                assert_eq!(blobs, vec![Some(vec![9])]);
                assert_eq!(keys, vec![None, Some(vec![5])]);
            }
            other => panic!("unexpected entry {:?}", other),
        }
    }

    #[test]
    fn test_boundaries() {
        let begin = LogEntry::Begin {
            tid: tid(),
            mode: TransactionMode::Sosql,
        };
        let abort = LogEntry::Abort {
            tid: tid(),
            reason: Some(AbortReason::Deadlock),
        };
        assert!(begin.is_txn_boundary());
        assert!(abort.is_txn_boundary());
        assert_eq!(begin.table(), None);
    }
}
