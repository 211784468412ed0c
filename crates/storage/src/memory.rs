//! In-memory storage engine
//!
//! Reference [`StorageEngine`] backed by DashMaps. It assigns root pages on
//! table registration, tracks every live handle and open cursor, and can be
//! told to fail the next cursor open, cursor close or handle release.

use dashmap::DashMap;
use fdb_core::{Error, Result, TableDef};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::engine::{
    CursorMode, CursorTran, CursorTranRef, ShadowTran, ShadowTranRef, StorageCursor, StorageEngine,
};

/// First root page handed out
const FIRST_ROOT_PAGE: i64 = 2;

/// Root pages assigned to a registered table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPages {
    /// Root page of the base table
    pub table: i64,
    /// Root page of each index, by index number
    pub indexes: Vec<i64>,
}

#[derive(Debug, Default)]
struct Faults {
    open: AtomicBool,
    close: AtomicBool,
    release: AtomicBool,
}

impl Faults {
    #[inline]
    fn take(flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::AcqRel)
    }
}

/// In-memory storage engine
pub struct MemoryStorage {
    tables: DashMap<String, Arc<TableDef>>,
    root_pages: DashMap<i64, (Arc<TableDef>, Option<usize>)>,
    next_root_page: AtomicI64,
    next_handle: AtomicU64,
    cursor_trans: DashMap<u64, ()>,
    shadow_trans: DashMap<u64, ()>,
    shadow_commits: AtomicU64,
    shadow_aborts: AtomicU64,
    open_cursors: Arc<AtomicUsize>,
    opened_modes: Mutex<Vec<CursorMode>>,
    faults: Faults,
}

impl MemoryStorage {
    /// Create an empty engine
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            root_pages: DashMap::new(),
            next_root_page: AtomicI64::new(FIRST_ROOT_PAGE),
            next_handle: AtomicU64::new(1),
            cursor_trans: DashMap::new(),
            shadow_trans: DashMap::new(),
            shadow_commits: AtomicU64::new(0),
            shadow_aborts: AtomicU64::new(0),
            open_cursors: Arc::new(AtomicUsize::new(0)),
            opened_modes: Mutex::new(Vec::new()),
            faults: Faults::default(),
        }
    }

    /// Register a table, assigning root pages to it and each of its indexes
    pub fn register_table(&self, table: TableDef) -> RootPages {
        let table = Arc::new(table);
        let base = self.next_root_page.fetch_add(1, Ordering::AcqRel);
        self.root_pages.insert(base, (Arc::clone(&table), None));

        let indexes = (0..table.index_count())
            .map(|ix| {
                let page = self.next_root_page.fetch_add(1, Ordering::AcqRel);
                self.root_pages.insert(page, (Arc::clone(&table), Some(ix)));
                page
            })
            .collect();

        debug!(table = %table.name, root_page = base, "registered table");
        self.tables
            .insert(table.name.to_ascii_lowercase(), Arc::clone(&table));
        RootPages {
            table: base,
            indexes,
        }
    }

    #[inline]
    fn next_id(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::AcqRel)
    }

    /// Number of cursor-transaction handles not yet released
    pub fn live_cursor_trans(&self) -> usize {
        self.cursor_trans.len()
    }

    /// Number of shadow transactions not yet committed or aborted
    pub fn live_shadow_trans(&self) -> usize {
        self.shadow_trans.len()
    }

    /// Number of shadow transactions committed
    pub fn shadow_commits(&self) -> u64 {
        self.shadow_commits.load(Ordering::Acquire)
    }

    /// Number of shadow transactions aborted
    pub fn shadow_aborts(&self) -> u64 {
        self.shadow_aborts.load(Ordering::Acquire)
    }

    /// Number of cursors currently open
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::Acquire)
    }

    /// Modes of every cursor opened so far, in order
    pub fn opened_modes(&self) -> Vec<CursorMode> {
        self.opened_modes.lock().clone()
    }

    /// Make the next cursor open fail
    pub fn fail_next_open(&self) {
        self.faults.open.store(true, Ordering::Release);
    }

    /// Make the next cursor close fail (the cursor is still closed)
    pub fn fail_next_close(&self) {
        self.faults.close.store(true, Ordering::Release);
    }

    /// Make the next cursor-transaction release fail (the handle is still released)
    pub fn fail_next_release(&self) {
        self.faults.release.store(true, Ordering::Release);
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for MemoryStorage {
    fn table_by_name(&self, name: &str) -> Option<Arc<TableDef>> {
        self.tables
            .get(&name.to_ascii_lowercase())
            .map(|t| Arc::clone(t.value()))
    }

    fn table_by_root_page(&self, root_page: i64) -> Option<(Arc<TableDef>, Option<usize>)> {
        self.root_pages
            .get(&root_page)
            .map(|entry| (Arc::clone(&entry.0), entry.1))
    }

    fn acquire_cursor_tran(&self) -> Result<CursorTran> {
        let id = self.next_id();
        self.cursor_trans.insert(id, ());
        Ok(CursorTran::new(id))
    }

    fn release_cursor_tran(&self, tran: CursorTran) -> Result<()> {
        if self.cursor_trans.remove(&tran.id()).is_none() {
            return Err(Error::Storage(format!("unknown {}", tran)));
        }
        if Faults::take(&self.faults.release) {
            return Err(Error::Storage(format!("injected release failure for {}", tran)));
        }
        Ok(())
    }

    fn begin_shadow_tran(&self) -> Result<ShadowTran> {
        let id = self.next_id();
        self.shadow_trans.insert(id, ());
        Ok(ShadowTran::new(id))
    }

    fn commit_shadow_tran(&self, tran: ShadowTran) -> Result<()> {
        self.shadow_trans
            .remove(&tran.id())
            .ok_or_else(|| Error::Storage(format!("unknown shadow tran {}", tran.id())))?;
        self.shadow_commits.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn abort_shadow_tran(&self, tran: ShadowTran) -> Result<()> {
        self.shadow_trans
            .remove(&tran.id())
            .ok_or_else(|| Error::Storage(format!("unknown shadow tran {}", tran.id())))?;
        self.shadow_aborts.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn open_cursor(
        &self,
        table: &TableDef,
        index: Option<usize>,
        tran: CursorTranRef,
        shadow: Option<ShadowTranRef>,
        mode: CursorMode,
    ) -> Result<Box<dyn StorageCursor>> {
        if Faults::take(&self.faults.open) {
            return Err(Error::CursorOpenFailed {
                table: table.name.clone(),
                reason: "injected open failure".into(),
            });
        }
        if !self.cursor_trans.contains_key(&tran.id()) {
            return Err(Error::CursorOpenFailed {
                table: table.name.clone(),
                reason: format!("{} is not live", tran),
            });
        }
        if let Some(shadow) = shadow {
            if !self.shadow_trans.contains_key(&shadow.id()) {
                return Err(Error::CursorOpenFailed {
                    table: table.name.clone(),
                    reason: format!("shadow tran {} is not live", shadow.id()),
                });
            }
        }
        if let Some(ix) = index {
            if ix >= table.index_count() {
                return Err(Error::CursorOpenFailed {
                    table: table.name.clone(),
                    reason: format!("no index {}", ix),
                });
            }
        }

        self.open_cursors.fetch_add(1, Ordering::AcqRel);
        self.opened_modes.lock().push(mode);
        Ok(Box::new(MemoryCursor {
            index,
            mode,
            open_cursors: Arc::clone(&self.open_cursors),
            fail_close: Faults::take(&self.faults.close),
        }))
    }
}

struct MemoryCursor {
    index: Option<usize>,
    mode: CursorMode,
    open_cursors: Arc<AtomicUsize>,
    fail_close: bool,
}

impl StorageCursor for MemoryCursor {
    fn index(&self) -> Option<usize> {
        self.index
    }

    fn mode(&self) -> CursorMode {
        self.mode
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.open_cursors.fetch_sub(1, Ordering::AcqRel);
        if self.fail_close {
            return Err(Error::Storage("injected close failure".into()));
        }
        Ok(())
    }
}
