//! Storage engine collaborator
//!
//! The backend never touches B-trees directly. It resolves tables, obtains
//! cursor-transaction and shadow-transaction handles, and opens cursors
//! through [`StorageEngine`].
//!
//! Handles are move-only tokens: releasing, committing or aborting one
//! consumes it, so every acquisition pairs with exactly one release.
//! Cursors are opened against a [`CursorTranRef`], a copyable reference to a
//! handle that stays with its owner.

use fdb_core::{Result, TableDef};
use std::fmt;
use std::sync::Arc;

/// Cursor-transaction handle
///
/// Carries the read snapshot a cursor sees. Not `Clone`; hand it back to
/// [`StorageEngine::release_cursor_tran`] exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct CursorTran {
    id: u64,
}

impl CursorTran {
    /// Issue a handle; only storage engines should call this
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    /// Engine-assigned id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Reference for opening cursors while the handle stays with its owner
    pub fn reference(&self) -> CursorTranRef {
        CursorTranRef(self.id)
    }
}

impl fmt::Display for CursorTran {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "curtran#{}", self.id)
    }
}

/// Copyable reference to a live [`CursorTran`]
///
/// Valid only while the handle it came from is unreleased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorTranRef(u64);

impl CursorTranRef {
    /// Id of the referenced handle
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CursorTranRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "curtran#{}", self.0)
    }
}

/// Shadow-transaction handle holding uncommitted read-committed writes
#[derive(Debug, PartialEq, Eq)]
pub struct ShadowTran {
    id: u64,
}

impl ShadowTran {
    /// Issue a handle; only storage engines should call this
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    /// Engine-assigned id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Reference for opening cursors that read through this shadow
    pub fn reference(&self) -> ShadowTranRef {
        ShadowTranRef(self.id)
    }
}

/// Copyable reference to a live [`ShadowTran`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShadowTranRef(u64);

impl ShadowTranRef {
    /// Id of the referenced handle
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Which data a cursor reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    /// Committed data only
    RealOnly,
    /// Committed data overlaid with the session's shadow writes
    RealAndShadow,
}

/// An open storage-engine cursor
pub trait StorageCursor: Send {
    /// Index number, `None` for the base table
    fn index(&self) -> Option<usize>;

    /// Read mode the cursor was opened with
    fn mode(&self) -> CursorMode;

    /// Close the cursor
    fn close(self: Box<Self>) -> Result<()>;
}

/// Storage engine operations used by the backend
pub trait StorageEngine: Send + Sync {
    /// Resolve a table by name (ASCII case-insensitive)
    fn table_by_name(&self, name: &str) -> Option<Arc<TableDef>>;

    /// Resolve a root page to its table and index number (`None` = table)
    fn table_by_root_page(&self, root_page: i64) -> Option<(Arc<TableDef>, Option<usize>)>;

    /// Acquire a cursor-transaction handle
    fn acquire_cursor_tran(&self) -> Result<CursorTran>;

    /// Release a cursor-transaction handle
    fn release_cursor_tran(&self, tran: CursorTran) -> Result<()>;

    /// Start a shadow transaction
    fn begin_shadow_tran(&self) -> Result<ShadowTran>;

    /// Commit a shadow transaction
    fn commit_shadow_tran(&self, tran: ShadowTran) -> Result<()>;

    /// Abort a shadow transaction
    fn abort_shadow_tran(&self, tran: ShadowTran) -> Result<()>;

    /// Open a cursor on a table or one of its indexes
    ///
    /// Fails when `tran` or `shadow` no longer refers to a live handle.
    fn open_cursor(
        &self,
        table: &TableDef,
        index: Option<usize>,
        tran: CursorTranRef,
        shadow: Option<ShadowTranRef>,
        mode: CursorMode,
    ) -> Result<Box<dyn StorageCursor>>;
}
