//! Write-ahead log seam for the federated backend
//!
//! This crate defines what the backend needs from the log layer:
//! - [`log`]: the [`TransactionLog`] trait and mutation descriptions
//! - [`wal`]: [`LogEntry`], the recorded form of every change
//! - [`encoding`]: CRC-checked framing of entries
//! - [`memory`]: [`MemoryLog`], an in-memory log with fault hooks

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoding;
pub mod log;
pub mod memory;
pub mod wal;

pub use encoding::{decode_all, decode_entry, encode_entry, EntryError, FRAME_HEADER_SIZE};
pub use log::{DeleteOp, InsertOp, RequestKind, TransactionLog, UpdateOp};
pub use memory::MemoryLog;
pub use wal::LogEntry;
