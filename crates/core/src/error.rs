//! Error types for the federated backend
//!
//! [`Error`] is the canonical error for every layer. Each variant belongs to
//! one [`ErrorKind`], which is what callers branch on and what determines the
//! negative status code sent back to the remote dispatcher.
//!
//! Transaction aborts reported by the log layer are not errors: they surface
//! as [`crate::status::CommitOutcome::Aborted`].

use crate::types::TransactionId;
use thiserror::Error;

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A row, key or handle could not be allocated
    AllocationFailure,
    /// Duplicate, missing or malformed transaction registration
    Registration,
    /// Unknown table, unknown root page or malformed DDL
    SchemaResolution,
    /// Row or index codec mismatch
    Conversion,
    /// Cursor or cursor-transaction handle lifecycle failure
    CursorLifecycle,
    /// The write-ahead log refused a mutation
    MutationRejected,
    /// Internal consistency violation; not retryable
    FatalConfiguration,
}

/// Backend errors
#[derive(Debug, Error)]
pub enum Error {
    /// Buffer allocation failed
    #[error("failed to allocate {what} ({size} bytes)")]
    AllocationFailure {
        /// What was being allocated
        what: &'static str,
        /// Requested size
        size: usize,
    },

    /// Transaction id bytes have the wrong length
    #[error("invalid transaction id of {len} bytes")]
    InvalidTransactionId {
        /// Length received
        len: usize,
    },

    /// The transaction id is already registered
    #[error("transaction {0} is already registered")]
    DuplicateTransaction(TransactionId),

    /// The transaction id is not registered (yet)
    #[error("transaction {0} is not registered")]
    TransactionNotFound(TransactionId),

    /// No table with this name
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// No table or index at this root page
    #[error("no table or index at root page {0}")]
    RootPageNotFound(i64),

    /// DDL text or schema record is not well formed
    #[error("malformed ddl: {0}")]
    MalformedDdl(String),

    /// Wire row could not be converted to the on-disk layout
    #[error("row conversion failed: {0}")]
    RowConversionFailed(#[source] ConversionError),

    /// Wire index key could not be converted to the on-disk layout
    #[error("index conversion failed: {0}")]
    IndexConversionFailed(#[source] ConversionError),

    /// The storage engine could not open a cursor
    #[error("failed to open cursor on {table}: {reason}")]
    CursorOpenFailed {
        /// Table the cursor was for
        table: String,
        /// Storage engine reason
        reason: String,
    },

    /// A cursor-transaction handle expected to be present was missing
    #[error("transaction {tid}: cursor transaction missing during {operation}")]
    MissingCursorTransaction {
        /// Transaction
        tid: TransactionId,
        /// Operation that expected the handle
        operation: &'static str,
    },

    /// The write-ahead log rejected a mutation
    #[error("{operation} rejected for transaction {tid}: {reason}")]
    MutationRejected {
        /// Transaction
        tid: TransactionId,
        /// Mutation kind
        operation: &'static str,
        /// Log layer reason
        reason: String,
    },

    /// Storage engine failure outside cursor open
    #[error("storage error: {0}")]
    Storage(String),

    /// Unsupported mode or inconsistent configuration reached a code path
    #[error("fatal configuration error: {0}")]
    FatalConfiguration(String),
}

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AllocationFailure { .. } => ErrorKind::AllocationFailure,
            Error::InvalidTransactionId { .. }
            | Error::DuplicateTransaction(_)
            | Error::TransactionNotFound(_) => ErrorKind::Registration,
            Error::TableNotFound(_) | Error::RootPageNotFound(_) | Error::MalformedDdl(_) => {
                ErrorKind::SchemaResolution
            }
            Error::RowConversionFailed(_) | Error::IndexConversionFailed(_) => {
                ErrorKind::Conversion
            }
            Error::CursorOpenFailed { .. }
            | Error::MissingCursorTransaction { .. }
            | Error::Storage(_) => ErrorKind::CursorLifecycle,
            Error::MutationRejected { .. } => ErrorKind::MutationRejected,
            Error::FatalConfiguration(_) => ErrorKind::FatalConfiguration,
        }
    }

    /// Check if the caller should retry later
    ///
    /// A missing transaction usually means the begin message has not
    /// arrived yet.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransactionNotFound(_))
    }

    /// Check if this is an unrecoverable internal-consistency violation
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::FatalConfiguration
    }

    /// Negative status code reported to the remote dispatcher
    pub fn status_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::AllocationFailure => -1,
            ErrorKind::Registration => -2,
            ErrorKind::SchemaResolution => -3,
            ErrorKind::Conversion => -4,
            ErrorKind::CursorLifecycle => -5,
            ErrorKind::MutationRejected => -6,
            ErrorKind::FatalConfiguration => -7,
        }
    }

    /// Wrap a row codec failure, surfacing allocation failures as such
    pub fn row_conversion(err: ConversionError) -> Self {
        match err.kind {
            ConversionErrorKind::AllocationFailed { size } => Error::AllocationFailure {
                what: "on-disk row",
                size,
            },
            _ => Error::RowConversionFailed(err),
        }
    }

    /// Wrap an index codec failure, surfacing allocation failures as such
    pub fn index_conversion(err: ConversionError) -> Self {
        match err.kind {
            ConversionErrorKind::AllocationFailed { size } => Error::AllocationFailure {
                what: "on-disk index key",
                size,
            },
            _ => Error::IndexConversionFailed(err),
        }
    }
}

/// Reason a single field (or key) failed to convert
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionErrorKind {
    /// Wire value type cannot be stored in the on-disk field type
    #[error("type mismatch: cannot store {found} as {expected}")]
    TypeMismatch {
        /// On-disk field type
        expected: &'static str,
        /// Wire value type
        found: &'static str,
    },

    /// Input ended inside a field
    #[error("truncated input")]
    TruncatedInput,

    /// Null value for a non-nullable field
    #[error("null value for non-nullable field")]
    NullConstraint,

    /// Value does not fit the on-disk field
    #[error("value out of range for {target}")]
    OutOfRange {
        /// On-disk field type
        target: &'static str,
    },

    /// Wire row has a different number of fields than the schema
    #[error("field count mismatch: schema has {expected}, row has {found}")]
    FieldCountMismatch {
        /// Schema field count
        expected: usize,
        /// Wire field count
        found: usize,
    },

    /// Converted key length differs from the index's declared key size
    #[error("on-disk key size mismatch: expected {expected} bytes, produced {actual}")]
    IndexSizeMismatch {
        /// Declared key size
        expected: usize,
        /// Produced length
        actual: usize,
    },

    /// Unknown wire tag or malformed payload
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Output buffer could not be allocated
    #[error("failed to allocate {size} bytes")]
    AllocationFailed {
        /// Requested size
        size: usize,
    },
}

/// Row or index conversion failure with diagnostic context
///
/// Identifies the offending field, the table, and the source and target
/// format names so a peer/schema mismatch can be diagnosed from the log.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{table}: cannot convert field '{field}' from {from} to {to}: {kind}")]
pub struct ConversionError {
    /// What went wrong
    pub kind: ConversionErrorKind,
    /// Table name
    pub table: String,
    /// Field (or index) name
    pub field: String,
    /// Source format name
    pub from: &'static str,
    /// Target format name
    pub to: &'static str,
}

impl ConversionError {
    /// Create a conversion error
    pub fn new(
        kind: ConversionErrorKind,
        table: impl Into<String>,
        field: impl Into<String>,
        from: &'static str,
        to: &'static str,
    ) -> Self {
        Self {
            kind,
            table: table.into(),
            field: field.into(),
            from,
            to,
        }
    }

    /// Check if this is a key size mismatch between peers
    pub fn is_size_mismatch(&self) -> bool {
        matches!(self.kind, ConversionErrorKind::IndexSizeMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let tid = TransactionId::RequestId(7);
        assert_eq!(
            Error::DuplicateTransaction(tid).kind(),
            ErrorKind::Registration
        );
        assert_eq!(
            Error::TableNotFound("t".into()).kind(),
            ErrorKind::SchemaResolution
        );
        assert_eq!(
            Error::MissingCursorTransaction {
                tid,
                operation: "rollback"
            }
            .kind(),
            ErrorKind::CursorLifecycle
        );
        assert_eq!(
            Error::FatalConfiguration("x".into()).kind(),
            ErrorKind::FatalConfiguration
        );
    }

    #[test]
    fn test_only_missing_transaction_is_retryable() {
        let tid = TransactionId::RequestId(1);
        assert!(Error::TransactionNotFound(tid).is_retryable());
        assert!(!Error::DuplicateTransaction(tid).is_retryable());
        assert!(!Error::Storage("io".into()).is_retryable());
    }

    #[test]
    fn test_status_codes_are_negative_and_distinct() {
        let tid = TransactionId::RequestId(1);
        let conversion = ConversionError::new(
            ConversionErrorKind::TruncatedInput,
            "t",
            "a",
            "wire",
            ".ONDISK",
        );
        let errors = vec![
            Error::AllocationFailure { what: "row", size: 8 },
            Error::TransactionNotFound(tid),
            Error::MalformedDdl("x".into()),
            Error::RowConversionFailed(conversion),
            Error::Storage("x".into()),
            Error::MutationRejected {
                tid,
                operation: "insert",
                reason: "full".into(),
            },
            Error::FatalConfiguration("x".into()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.status_code()).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_allocation_failure_unwrapped_from_conversion() {
        let err = ConversionError::new(
            ConversionErrorKind::AllocationFailed { size: 64 },
            "t",
            "*",
            "wire",
            ".ONDISK",
        );
        assert!(matches!(
            Error::row_conversion(err),
            Error::AllocationFailure { size: 64, .. }
        ));
    }

    #[test]
    fn test_conversion_error_message_names_formats() {
        let err = ConversionError::new(
            ConversionErrorKind::NullConstraint,
            "orders",
            "qty",
            "wire",
            ".ONDISK",
        );
        let msg = err.to_string();
        assert!(msg.contains("orders"));
        assert!(msg.contains("qty"));
        assert!(msg.contains("wire"));
        assert!(msg.contains(".ONDISK"));
    }
}
