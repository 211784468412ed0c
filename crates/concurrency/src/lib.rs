//! Remote transaction coordination
//!
//! This crate owns the server-side state of federated transactions:
//! - [`RemoteSession`]: per-transaction state, sequence turnstile and drain barrier
//! - [`SessionRegistry`]: live sessions by transaction id
//! - [`TransactionCoordinator`]: begin, commit, rollback and join

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod registry;
pub mod session;

pub use coordinator::TransactionCoordinator;
pub use registry::SessionRegistry;
pub use session::{
    CursorId, CursorTranBinding, Effects, RemoteSession, SequenceNumber, SessionOptions,
};
