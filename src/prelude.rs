//! Convenient imports
//!
//! ```
//! use fdb_bend::prelude::*;
//!
//! let backend = Backend::builder().config(BackendConfig::diagnostics()).build().unwrap();
//! assert!(backend.coordinator().registry().is_empty());
//! ```

// Entry point
pub use crate::backend::{Backend, BackendBuilder};

// Errors
pub use fdb_core::{Error, ErrorKind, Result};

// Core types
pub use fdb_core::{
    AbortReason, BackendConfig, CommitOutcome, Field, FieldType, IndexDef, IndexKeys,
    IsolationLevel, RowId, Schema, TableDef, TransactionId, TransactionMode, WireBuffer,
};

// Sessions
pub use fdb_concurrency::{RemoteSession, SequenceNumber};

// Cursors and statements
pub use fdb_engine::{
    CursorTarget, DeleteRequest, InsertRequest, RemoteSql, RowSink, RowStatus, SqlDispatcher,
    UpdateRequest,
};

// Wire rows
pub use fdb_wire::{encode_row, WireValue};

// In-memory collaborators
pub use fdb_durability::MemoryLog;
pub use fdb_storage::MemoryStorage;
