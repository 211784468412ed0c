//! Core types for the federated SQL backend
//!
//! This crate defines the vocabulary shared by every layer:
//! - [`types`]: transaction ids, row ids, isolation levels
//! - [`schema`]: table and index layouts
//! - [`buffer`]: move-only row and key buffers
//! - [`status`]: commit outcomes and SQL error codes
//! - [`error`]: the error taxonomy
//! - [`config`]: backend configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod config;
pub mod error;
pub mod schema;
pub mod status;
pub mod types;

pub use buffer::{IndexKeys, KeyBuffer, OnDiskBuffer, OnDiskRow, WireBuffer};
pub use config::{BackendConfig, DEFAULT_TIMEZONE};
pub use error::{ConversionError, ConversionErrorKind, Error, ErrorKind, Result};
pub use schema::{Field, FieldType, IndexDef, Schema, TableDef, MAX_BLOBS};
pub use status::{AbortReason, CommitOutcome, SqlErrorCode, SQL_OK};
pub use types::{IsolationLevel, RowId, TransactionId, TransactionMode};
