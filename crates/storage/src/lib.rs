//! Storage engine seam for the federated backend
//!
//! - [`engine`]: the [`StorageEngine`] trait and its move-only handles
//! - [`memory`]: [`MemoryStorage`], an in-memory engine with fault injection

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod memory;

pub use engine::{
    CursorMode, CursorTran, CursorTranRef, ShadowTran, ShadowTranRef, StorageCursor, StorageEngine,
};
pub use memory::{MemoryStorage, RootPages};
