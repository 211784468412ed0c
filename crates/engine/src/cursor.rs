//! Cursor management for remote sessions
//!
//! A remote peer reads and writes local tables through cursors opened on
//! its behalf. Each cursor is bound to a cursor-transaction handle:
//!
//! - **Shared**: the session's handle from begin; outlives the cursor
//! - **Standalone**: acquired for the cursor alone, released when it closes
//!
//! Mutations open a cursor, convert index keys and then the row into the
//! on-disk layout, pass the session's sequence turnstile, submit to the log,
//! and always close the cursor again. A mutation that fails before reaching
//! the turnstile still consumes its sequence number.
//!
//! Storage cursors are opened without holding the session lock.

use fdb_concurrency::{
    CursorId, CursorTranBinding, RemoteSession, SequenceNumber, TransactionCoordinator,
};
use fdb_core::{
    BackendConfig, Error, IndexKeys, OnDiskRow, Result, RowId, TableDef, TransactionMode,
    WireBuffer,
};
use fdb_durability::{DeleteOp, InsertOp, TransactionLog, UpdateOp};
use fdb_storage::{CursorMode, StorageCursor, StorageEngine};
use fdb_wire::RowCodec;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// What a cursor is opened on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorTarget {
    /// Base table, by name
    Table(String),
    /// Table or index, by root page
    RootPage(i64),
}

impl fmt::Display for CursorTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorTarget::Table(name) => write!(f, "table '{}'", name),
            CursorTarget::RootPage(page) => write!(f, "root page {}", page),
        }
    }
}

/// A cursor opened for a remote session
pub struct Cursor {
    id: CursorId,
    table: Arc<TableDef>,
    index: Option<usize>,
    row_id: RowId,
    storage_cursor: Option<Box<dyn StorageCursor>>,
    binding: CursorTranBinding,
    row: Option<OnDiskRow>,
}

impl Cursor {
    /// Id within the session
    pub fn id(&self) -> CursorId {
        self.id
    }

    /// Resolved table
    pub fn table(&self) -> &TableDef {
        &self.table
    }

    /// Index number, `None` for the base table
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Row the cursor is positioned on
    pub fn row_id(&self) -> RowId {
        self.row_id
    }

    /// Check if the cursor owns its cursor-transaction handle
    pub fn is_standalone(&self) -> bool {
        self.binding.is_standalone()
    }

    /// Read mode of the storage cursor, if one was opened
    pub fn mode(&self) -> Option<CursorMode> {
        self.storage_cursor.as_ref().map(|c| c.mode())
    }

    /// Converted row attached by the last mutation
    pub fn row(&self) -> Option<&OnDiskRow> {
        self.row.as_ref()
    }

    /// Attach a converted row; the cursor owns it until closed
    fn attach_row(&mut self, row: OnDiskRow) -> &OnDiskRow {
        self.row.insert(row)
    }

    fn index_label(&self) -> i64 {
        self.index.map_or(-1, |ix| ix as i64)
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("id", &self.id)
            .field("table", &self.table.name)
            .field("index", &self.index_label())
            .field("row_id", &self.row_id)
            .field("binding", &self.binding)
            .field("storage_cursor", &self.storage_cursor.is_some())
            .finish()
    }
}

/// Insert of one row
#[derive(Debug)]
pub struct InsertRequest {
    /// Table to insert into
    pub target: CursorTarget,
    /// Row id of the new row
    pub row_id: RowId,
    /// Row in wire format
    pub row: WireBuffer,
    /// Wire keys of the table's indexes
    pub index_keys: IndexKeys,
    /// Message sequence number
    pub sequence: SequenceNumber,
}

/// Update of one row
#[derive(Debug)]
pub struct UpdateRequest {
    /// Table to update
    pub target: CursorTarget,
    /// Row being replaced
    pub old_row_id: RowId,
    /// Row id after the update
    pub new_row_id: RowId,
    /// New row in wire format
    pub row: WireBuffer,
    /// Wire keys to remove
    pub delete_keys: IndexKeys,
    /// Wire keys to add
    pub insert_keys: IndexKeys,
    /// Message sequence number
    pub sequence: SequenceNumber,
}

/// Delete of one row
#[derive(Debug)]
pub struct DeleteRequest {
    /// Table to delete from
    pub target: CursorTarget,
    /// Row being deleted
    pub row_id: RowId,
    /// Wire keys to remove
    pub index_keys: IndexKeys,
    /// Message sequence number
    pub sequence: SequenceNumber,
}

/// Opens and closes cursors and applies remote mutations
pub struct CursorManager {
    storage: Arc<dyn StorageEngine>,
    log: Arc<dyn TransactionLog>,
    codec: RowCodec,
    track: bool,
}

impl CursorManager {
    /// Create a cursor manager
    pub fn new(
        storage: Arc<dyn StorageEngine>,
        log: Arc<dyn TransactionLog>,
        config: &BackendConfig,
    ) -> Self {
        Self {
            storage,
            log,
            codec: RowCodec::from_config(config),
            track: config.track,
        }
    }

    /// Create a cursor manager sharing a coordinator's collaborators
    pub fn for_coordinator(coordinator: &TransactionCoordinator) -> Self {
        Self::new(
            Arc::clone(coordinator.storage()),
            Arc::clone(coordinator.log()),
            coordinator.config(),
        )
    }

    /// Row codec in use
    pub fn codec(&self) -> &RowCodec {
        &self.codec
    }

    fn resolve(&self, target: &CursorTarget) -> Result<(Arc<TableDef>, Option<usize>)> {
        match target {
            CursorTarget::Table(name) => self
                .storage
                .table_by_name(name)
                .map(|table| (table, None))
                .ok_or_else(|| Error::TableNotFound(name.clone())),
            CursorTarget::RootPage(page) => self
                .storage
                .table_by_root_page(*page)
                .ok_or(Error::RootPageNotFound(*page)),
        }
    }

    /// Open a cursor for a session
    ///
    /// When `needs_storage_cursor` is false only the bookkeeping is done; a
    /// plain insert needs nothing more.
    pub fn open_cursor(
        &self,
        session: &RemoteSession,
        target: CursorTarget,
        row_id: RowId,
        needs_storage_cursor: bool,
    ) -> Result<Cursor> {
        let tid = session.tid();
        let (table, index) = self.resolve(&target)?;
        let (id, binding) = session.register_cursor(&table.name, index, self.storage.as_ref())?;

        let shadowed = session.isolation().uses_shadow_tables();
        if shadowed {
            self.log.begin_shadow_scope(tid);
        }

        let storage_cursor = if needs_storage_cursor {
            let shadow = session.shadow_ref();
            let mode = match (shadow, session.mode()) {
                (Some(_), TransactionMode::ReadCommitted) => CursorMode::RealAndShadow,
                _ => CursorMode::RealOnly,
            };
            let opened = self
                .storage
                .open_cursor(&table, index, binding.reference(), shadow, mode);
            match opened {
                Ok(cursor) => Some(cursor),
                Err(e) => {
                    error!(%tid, table = %table.name, error = %e, "failed to open cursor");
                    if let CursorTranBinding::Standalone(tran) = binding {
                        if let Err(release) = self.storage.release_cursor_tran(tran) {
                            error!(%tid, error = %release, "failed to release cursor transaction");
                        }
                    }
                    if shadowed {
                        self.log.end_shadow_scope(tid);
                    }
                    session.release_cursor(id);
                    return Err(match e {
                        Error::CursorOpenFailed { .. } => e,
                        other => Error::CursorOpenFailed {
                            table: table.name.clone(),
                            reason: other.to_string(),
                        },
                    });
                }
            }
        } else {
            None
        };

        let cursor = Cursor {
            id,
            table,
            index,
            row_id,
            storage_cursor,
            binding,
            row: None,
        };
        if self.track {
            info!(
                %tid,
                cursor = cursor.id,
                table = %cursor.table.name,
                index = cursor.index_label(),
                standalone = cursor.is_standalone(),
                "open cursor"
            );
        }
        Ok(cursor)
    }

    /// Close a cursor
    ///
    /// A storage cursor close failure is only logged. A failure to release a
    /// standalone handle is logged and returned. Shared handles stay with
    /// the session.
    pub fn close_cursor(&self, session: &RemoteSession, cursor: Cursor) -> Result<()> {
        let tid = session.tid();
        let Cursor {
            id,
            table,
            index,
            storage_cursor,
            binding,
            row,
            ..
        } = cursor;

        if let Some(storage_cursor) = storage_cursor {
            if let Err(e) = storage_cursor.close() {
                error!(%tid, table = %table.name, error = %e, "failed to close storage cursor");
            }
        }
        if session.isolation().uses_shadow_tables() {
            self.log.end_shadow_scope(tid);
        }

        let mut result = Ok(());
        if let CursorTranBinding::Standalone(tran) = binding {
            if self.track {
                info!(%tid, %tran, cursor = id, "releasing standalone cursor transaction");
            }
            if let Err(e) = self.storage.release_cursor_tran(tran) {
                error!(%tid, table = %table.name, error = %e, "missing trans");
                result = Err(e);
            }
        }
        drop(row);
        session.release_cursor(id);

        if self.track {
            info!(%tid, cursor = id, index = index.map_or(-1, |ix| ix as i64), "close cursor");
        }
        result
    }

    /// Insert a row
    pub fn insert(&self, session: &RemoteSession, request: InsertRequest) -> Result<()> {
        let InsertRequest {
            target,
            row_id,
            row,
            index_keys,
            sequence,
        } = request;

        let mut cursor = self
            .open_cursor(session, target, row_id, false)
            .map_err(|e| self.unsequenced(session, sequence, e))?;
        let applied = self.apply_insert(session, &mut cursor, row, index_keys, sequence);
        self.finish_mutation(session, cursor, applied, RemoteSession::record_insert)
    }

    fn apply_insert(
        &self,
        session: &RemoteSession,
        cursor: &mut Cursor,
        row: WireBuffer,
        index_keys: IndexKeys,
        sequence: SequenceNumber,
    ) -> Result<()> {
        let tid = session.tid();
        let table = Arc::clone(&cursor.table);

        let keys = self
            .convert_keys(session, &table, index_keys, "insert")
            .map_err(|e| self.unsequenced(session, sequence, e))?;
        let row = self
            .convert_row(session, &table, row, "insert")
            .map_err(|e| self.unsequenced(session, sequence, e))?;
        let row_id = cursor.row_id;
        let row = cursor.attach_row(row);

        session.sequenced(sequence, || {
            self.log.submit_insert(
                tid,
                &InsertOp {
                    table: &table.name,
                    row_id,
                    row,
                    keys: &keys,
                },
            )
        })
    }

    /// Update a row
    pub fn update(&self, session: &RemoteSession, request: UpdateRequest) -> Result<()> {
        let UpdateRequest {
            target,
            old_row_id,
            new_row_id,
            row,
            delete_keys,
            insert_keys,
            sequence,
        } = request;

        let mut cursor = self
            .open_cursor(session, target, old_row_id, true)
            .map_err(|e| self.unsequenced(session, sequence, e))?;
        let applied = self.apply_update(
            session,
            &mut cursor,
            new_row_id,
            row,
            delete_keys,
            insert_keys,
            sequence,
        );
        self.finish_mutation(session, cursor, applied, RemoteSession::record_update)
    }

    /// Delete a row
    pub fn delete(&self, session: &RemoteSession, request: DeleteRequest) -> Result<()> {
        let DeleteRequest {
            target,
            row_id,
            index_keys,
            sequence,
        } = request;

        let cursor = self
            .open_cursor(session, target, row_id, true)
            .map_err(|e| self.unsequenced(session, sequence, e))?;
        let applied = self.apply_delete(session, &cursor, index_keys, sequence);
        self.finish_mutation(session, cursor, applied, RemoteSession::record_delete)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_update(
        &self,
        session: &RemoteSession,
        cursor: &mut Cursor,
        new_row_id: RowId,
        row: WireBuffer,
        delete_keys: IndexKeys,
        insert_keys: IndexKeys,
        sequence: SequenceNumber,
    ) -> Result<()> {
        let tid = session.tid();
        let table = Arc::clone(&cursor.table);

        let converted = self
            .convert_keys(session, &table, delete_keys, "update")
            .and_then(|delete_keys| {
                let insert_keys = self.convert_keys(session, &table, insert_keys, "update")?;
                let row = self.convert_row(session, &table, row, "update")?;
                Ok((delete_keys, insert_keys, row))
            });
        let (delete_keys, insert_keys, row) =
            converted.map_err(|e| self.unsequenced(session, sequence, e))?;
        let old_row_id = cursor.row_id;
        let row = cursor.attach_row(row);

        session.sequenced(sequence, || {
            self.log.submit_update(
                tid,
                &UpdateOp {
                    table: &table.name,
                    old_row_id,
                    new_row_id,
                    row,
                    delete_keys: &delete_keys,
                    insert_keys: &insert_keys,
                },
            )
        })
    }

    fn apply_delete(
        &self,
        session: &RemoteSession,
        cursor: &Cursor,
        index_keys: IndexKeys,
        sequence: SequenceNumber,
    ) -> Result<()> {
        let tid = session.tid();
        let keys = self
            .convert_keys(session, &cursor.table, index_keys, "delete")
            .map_err(|e| self.unsequenced(session, sequence, e))?;
        session.sequenced(sequence, || {
            self.log.submit_delete(
                tid,
                &DeleteOp {
                    table: &cursor.table.name,
                    row_id: cursor.row_id,
                    keys: &keys,
                },
            )
        })
    }

    fn convert_keys(
        &self,
        session: &RemoteSession,
        table: &TableDef,
        keys: IndexKeys,
        op: &'static str,
    ) -> Result<IndexKeys> {
        self.codec
            .convert_index_keys(table, keys, session.timezone())
            .map_err(|e| {
                error!(tid = %session.tid(), table = %table.name, op, error = %e, "index conversion failed");
                Error::index_conversion(e)
            })
    }

    fn convert_row(
        &self,
        session: &RemoteSession,
        table: &TableDef,
        row: WireBuffer,
        op: &'static str,
    ) -> Result<OnDiskRow> {
        self.codec
            .convert_row(table, row, session.timezone())
            .map_err(|e| {
                error!(tid = %session.tid(), table = %table.name, op, error = %e, "row conversion failed");
                Error::row_conversion(e)
            })
    }

    /// Consume the sequence number of a mutation that failed before submitting
    fn unsequenced(&self, session: &RemoteSession, sequence: SequenceNumber, err: Error) -> Error {
        session.skip_sequence(sequence);
        err
    }

    /// Close the mutation's cursor and settle the result; the first error wins
    ///
    /// Effects are counted only when both the mutation and the close succeed.
    fn finish_mutation(
        &self,
        session: &RemoteSession,
        cursor: Cursor,
        applied: Result<()>,
        count: fn(&RemoteSession),
    ) -> Result<()> {
        let closed = self.close_cursor(session, cursor);
        let settled = applied.and(closed);
        if settled.is_ok() {
            session.mark_write();
            count(session);
        }
        settled
    }
}
