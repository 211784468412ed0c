//! Cursor and statement surface for remote sessions
//!
//! - [`cursor`]: [`CursorManager`], cursor lifecycle and remote mutations
//! - [`covering`]: covering-index DDL rewrite for remote planners
//! - [`remote`]: remote SQL dispatch and row streaming

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod covering;
pub mod cursor;
pub mod remote;

pub use covering::{append_covering_columns, CoveringIndexRewriter, SchemaRecord, DATACOPY_COLLATION};
pub use cursor::{Cursor, CursorManager, CursorTarget, DeleteRequest, InsertRequest, UpdateRequest};
pub use remote::{run_remote_sql, send_row, RemoteSql, RowSink, RowStatus, SqlDispatcher};
