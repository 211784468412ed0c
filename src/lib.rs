//! # fdb-bend
//!
//! Backend bridge for federated SQL. When a remote peer runs a statement
//! against tables owned by this node, the bridge keeps the server-side
//! session for that peer's transaction, opens cursors over local storage on
//! its behalf, converts rows and index keys from the wire format into the
//! on-disk layout, and orders commit and rollback against a stream of
//! possibly delayed messages.
//!
//! ## Quick Start
//!
//! ```
//! use fdb_bend::prelude::*;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(MemoryStorage::new());
//! storage.register_table(TableDef::new(
//!     "t",
//!     vec![Field::new("a", FieldType::Int64)],
//! ));
//! let backend = Backend::builder().storage(storage).build().unwrap();
//!
//! let tid = TransactionId::RequestId(1);
//! backend.begin(tid, IsolationLevel::ReadCommitted, 0, 0).unwrap();
//! backend
//!     .insert(
//!         tid,
//!         InsertRequest {
//!             target: CursorTarget::Table("t".into()),
//!             row_id: RowId::new(1),
//!             row: encode_row(&[WireValue::Integer(42)]).unwrap(),
//!             index_keys: IndexKeys::new(),
//!             sequence: 1,
//!         },
//!     )
//!     .unwrap();
//! let outcome = backend.commit(tid, IsolationLevel::ReadCommitted, 2).unwrap();
//! assert_eq!(outcome, CommitOutcome::Committed);
//! ```
//!
//! ## Crates
//!
//! - [`fdb_core`]: ids, schema model, buffers, errors, configuration
//! - [`fdb_wire`]: wire rows and the on-disk row codec
//! - [`fdb_storage`]: storage engine seam
//! - [`fdb_durability`]: transaction log seam
//! - [`fdb_concurrency`]: sessions, registry, coordinator
//! - [`fdb_engine`]: cursors, covering-index rewrite, remote SQL

#![warn(missing_docs)]

mod backend;

pub mod prelude;

pub use backend::{Backend, BackendBuilder};
pub use fdb_core::{Error, ErrorKind, Result};

pub use fdb_concurrency;
pub use fdb_core;
pub use fdb_durability;
pub use fdb_engine;
pub use fdb_storage;
pub use fdb_wire;
