//! Commit outcomes and SQL-level error codes
//!
//! A transaction abort reported by the log layer is a legitimate outcome
//! (optimistic-concurrency conflicts surface this way), so it is modelled as
//! a value rather than an [`crate::Error`]. The abort reason maps to the SQL
//! error code returned to the remote caller.

use serde::{Deserialize, Serialize};

/// Status code for a successful statement
pub const SQL_OK: i32 = 0;

/// Reason the storage or log layer aborted a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    /// A row read by the transaction changed before commit
    VerifyConflict,
    /// Unique key violation
    DuplicateKey,
    /// Check or cascade constraint violation
    ConstraintViolation,
    /// Null written to a non-nullable column
    NullConstraint,
    /// Foreign key violation
    ForeignKey,
    /// Chosen as deadlock victim
    Deadlock,
    /// Any other block processor error code
    Other(i32),
}

impl AbortReason {
    /// SQL error code for this abort reason
    pub fn sql_code(&self) -> SqlErrorCode {
        match self {
            AbortReason::VerifyConflict => SqlErrorCode::VerifyError,
            AbortReason::DuplicateKey => SqlErrorCode::Duplicate,
            AbortReason::ConstraintViolation => SqlErrorCode::Constraints,
            AbortReason::NullConstraint => SqlErrorCode::NullConstraint,
            AbortReason::ForeignKey => SqlErrorCode::ForeignKey,
            AbortReason::Deadlock => SqlErrorCode::Deadlock,
            AbortReason::Other(_) => SqlErrorCode::Internal,
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::VerifyConflict => f.write_str("verify conflict"),
            AbortReason::DuplicateKey => f.write_str("duplicate key"),
            AbortReason::ConstraintViolation => f.write_str("constraint violation"),
            AbortReason::NullConstraint => f.write_str("null constraint"),
            AbortReason::ForeignKey => f.write_str("foreign key violation"),
            AbortReason::Deadlock => f.write_str("deadlock"),
            AbortReason::Other(code) => write!(f, "block processor error {}", code),
        }
    }
}

/// SQL error codes visible to the remote caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlErrorCode {
    /// Optimistic verify failed
    VerifyError,
    /// Duplicate key
    Duplicate,
    /// Constraint failure
    Constraints,
    /// Not-null constraint failure
    NullConstraint,
    /// Foreign key failure
    ForeignKey,
    /// Deadlock
    Deadlock,
    /// Unclassified failure
    Internal,
}

impl SqlErrorCode {
    /// Numeric code sent on the wire
    pub fn code(&self) -> i32 {
        match self {
            SqlErrorCode::VerifyError => 4,
            SqlErrorCode::ForeignKey => 3,
            SqlErrorCode::Deadlock => 203,
            SqlErrorCode::Duplicate => 299,
            SqlErrorCode::Internal => 300,
            SqlErrorCode::Constraints => 403,
            SqlErrorCode::NullConstraint => 404,
        }
    }
}

/// Storage-level decision for a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitOutcome {
    /// All writes are durable
    Committed,
    /// The transaction was aborted
    Aborted(AbortReason),
}

impl CommitOutcome {
    /// Check if the transaction committed
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed)
    }

    /// Status code for the remote caller: [`SQL_OK`] or the mapped SQL error
    pub fn sql_code(&self) -> i32 {
        match self {
            CommitOutcome::Committed => SQL_OK,
            CommitOutcome::Aborted(reason) => reason.sql_code().code(),
        }
    }
}
