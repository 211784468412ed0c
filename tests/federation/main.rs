//! Federation Integration Tests
//!
//! Remote transactions, cursors and schema rewrite through the `Backend`
//! facade over in-memory storage and log.

#[path = "../common/mod.rs"]
mod common;

mod cursors;
mod schema;
mod transactions;
