//! Core identifier types for the federated backend
//!
//! This module defines the identifiers used throughout the system:
//! - [`TransactionId`]: Registry key for a remote transaction
//! - [`RowId`]: Storage row identifier (genid)
//! - [`IsolationLevel`]: Isolation requested by the remote peer
//! - [`TransactionMode`]: The subset of isolation levels a federated session can run

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a remote transaction
///
/// A remote peer names its transaction either with a 64-bit request id or
/// with a UUID. Exactly one form is active for a session, and that form is
/// the key under which the session is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionId {
    /// Legacy 64-bit request id
    RequestId(u64),
    /// 128-bit request UUID
    Uuid(Uuid),
}

impl TransactionId {
    /// Build a transaction id from the raw bytes carried by a remote request
    ///
    /// Request ids are 8 big-endian bytes, UUIDs are 16 bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use fdb_core::types::TransactionId;
    ///
    /// let tid = TransactionId::from_bytes(&[0, 0, 0, 0, 0, 0, 0, 42], false).unwrap();
    /// assert_eq!(tid, TransactionId::RequestId(42));
    /// ```
    pub fn from_bytes(bytes: &[u8], is_uuid: bool) -> Result<Self> {
        if is_uuid {
            let raw: [u8; 16] = bytes
                .try_into()
                .map_err(|_| Error::InvalidTransactionId { len: bytes.len() })?;
            Ok(TransactionId::Uuid(Uuid::from_bytes(raw)))
        } else if bytes.len() == 8 {
            Ok(TransactionId::RequestId(BigEndian::read_u64(bytes)))
        } else {
            Err(Error::InvalidTransactionId { len: bytes.len() })
        }
    }

    /// Check if this id uses the UUID form
    pub fn is_uuid(&self) -> bool {
        matches!(self, TransactionId::Uuid(_))
    }

    /// Get the request id, if this is the 64-bit form
    pub fn request_id(&self) -> Option<u64> {
        match self {
            TransactionId::RequestId(id) => Some(*id),
            TransactionId::Uuid(_) => None,
        }
    }

    /// Get the UUID, if this is the UUID form
    pub fn uuid(&self) -> Option<Uuid> {
        match self {
            TransactionId::RequestId(_) => None,
            TransactionId::Uuid(uuid) => Some(*uuid),
        }
    }
}

impl From<u64> for TransactionId {
    fn from(id: u64) -> Self {
        TransactionId::RequestId(id)
    }
}

impl From<Uuid> for TransactionId {
    fn from(uuid: Uuid) -> Self {
        TransactionId::Uuid(uuid)
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionId::RequestId(id) => write!(f, "{:x}", id),
            TransactionId::Uuid(uuid) => write!(f, "{}", uuid.hyphenated()),
        }
    }
}

/// Storage row identifier (genid)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct RowId(u64);

impl RowId {
    /// Width of a row id when embedded in a row
    pub const WIDTH: usize = 8;

    /// Create a row id from its raw value
    pub fn new(raw: u64) -> Self {
        RowId(raw)
    }

    /// Get the raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Extract the row id stored in the trailing 8 big-endian bytes of a row
    ///
    /// Rows streamed back to a peer carry their genid as the last column.
    /// Returns `None` if the row is shorter than a row id.
    pub fn from_row_trailer(row: &[u8]) -> Option<Self> {
        if row.len() < Self::WIDTH {
            return None;
        }
        Some(RowId(BigEndian::read_u64(&row[row.len() - Self::WIDTH..])))
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Isolation level requested for a remote transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    /// Block SQL: writes shipped as one block, no shadow tables
    BlockSql,
    /// Socket SQL: optimistic concurrency, write log shipped at commit
    Sosql,
    /// Read committed with a local shadow transaction
    ReadCommitted,
    /// Snapshot isolation
    SnapshotIsolation,
    /// Serializable
    Serializable,
}

impl IsolationLevel {
    /// Check if this level keeps uncommitted writes in shadow tables
    ///
    /// Shadow tables make a transaction's own writes visible to its later
    /// reads, so every cursor opened under these levels runs inside a
    /// shadow query scope.
    pub fn uses_shadow_tables(&self) -> bool {
        !matches!(self, IsolationLevel::BlockSql)
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            IsolationLevel::BlockSql => "BLOCKSQL",
            IsolationLevel::Sosql => "SOSQL",
            IsolationLevel::ReadCommitted => "RECOM",
            IsolationLevel::SnapshotIsolation => "SNAPISOL",
            IsolationLevel::Serializable => "SERIAL",
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Isolation modes a federated session can run
///
/// Snapshot and serializable isolation are not supported over federated
/// sessions at this layer. Converting them fails at session creation, so
/// commit and rollback dispatch over this enum is exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionMode {
    /// Read committed: local shadow transaction, committed through the log
    ReadCommitted,
    /// Socket SQL: optimistic commit of the accumulated write log
    Sosql,
}

impl TransactionMode {
    /// The isolation level this mode implements
    pub fn isolation(&self) -> IsolationLevel {
        match self {
            TransactionMode::ReadCommitted => IsolationLevel::ReadCommitted,
            TransactionMode::Sosql => IsolationLevel::Sosql,
        }
    }
}

impl TryFrom<IsolationLevel> for TransactionMode {
    type Error = Error;

    fn try_from(level: IsolationLevel) -> Result<Self> {
        match level {
            IsolationLevel::ReadCommitted => Ok(TransactionMode::ReadCommitted),
            IsolationLevel::Sosql => Ok(TransactionMode::Sosql),
            other => Err(Error::FatalConfiguration(format!(
                "isolation level {} is not supported for federated transactions",
                other
            ))),
        }
    }
}

impl std::fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.isolation().name())
    }
}
