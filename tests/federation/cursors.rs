//! Cursors on behalf of remote sessions: handles, conversion, failures

use crate::common::*;
use fdb_bend::fdb_core::{OnDiskBuffer, OnDiskRow};
use fdb_bend::fdb_durability::{LogEntry, TransactionLog};
use fdb_bend::fdb_engine::{send_row, Cursor};
use fdb_bend::fdb_storage::CursorMode;
use fdb_bend::fdb_wire::{decode_row, parse_datetime, RowCodec, WIRE_FORMAT};
use fdb_bend::prelude::*;
use parking_lot::Mutex;

// ============================================================================
// Handle ownership
// ============================================================================

#[test]
fn standalone_cursors_release_their_handles() {
    let t = TestBackend::new();
    let session = t.backend.standalone(tid(20), 3);
    assert!(!session.is_transactional());
    assert_eq!(session.code_release(), Some(3));

    let cursors = t.backend.cursors();
    let a = cursors
        .open_cursor(&session, CursorTarget::Table("orders".into()), RowId::new(0), true)
        .unwrap();
    let b = cursors
        .open_cursor(&session, CursorTarget::RootPage(t.orders.indexes[1]), RowId::new(0), true)
        .unwrap();
    assert!(a.is_standalone() && b.is_standalone());
    assert_eq!(t.storage.live_cursor_trans(), 2);
    assert_eq!(b.index(), Some(1));

    cursors.close_cursor(&session, a).unwrap();
    cursors.close_cursor(&session, b).unwrap();
    assert_eq!(t.storage.live_cursor_trans(), 0);
    assert_eq!(t.storage.open_cursors(), 0);
    assert_eq!(session.open_cursor_count(), 0);
}

#[test]
fn transaction_cursors_share_the_session_handle() {
    let t = TestBackend::new();
    let id = tid(21);
    let session = t.backend.begin(id, IsolationLevel::Sosql, 0, 0).unwrap();

    let cursor = t
        .backend
        .cursors()
        .open_cursor(&session, CursorTarget::Table("orders".into()), RowId::new(0), true)
        .unwrap();
    assert!(!cursor.is_standalone());
    assert_eq!(cursor.mode(), Some(CursorMode::RealOnly));
    assert_eq!(t.storage.live_cursor_trans(), 1);

    t.backend.cursors().close_cursor(&session, cursor).unwrap();
    // Closing leaves the shared handle with the session
    assert_eq!(t.storage.live_cursor_trans(), 1);
    t.backend.commit(id, IsolationLevel::Sosql, 1).unwrap();
    assert_eq!(t.storage.live_cursor_trans(), 0);
}

#[test]
fn shared_handle_outlives_cursors_closed_out_of_order() {
    let t = TestBackend::new();
    let id = tid(30);
    let session = t.backend.begin(id, IsolationLevel::Sosql, 0, 0).unwrap();
    let cursors = t.backend.cursors();

    let targets = [
        CursorTarget::Table("orders".into()),
        CursorTarget::RootPage(t.orders.indexes[0]),
        CursorTarget::RootPage(t.orders.indexes[1]),
    ];
    let mut open: Vec<Cursor> = targets
        .iter()
        .cloned()
        .map(|target| cursors.open_cursor(&session, target, RowId::new(0), true).unwrap())
        .collect();
    assert!(open.iter().all(|c| !c.is_standalone()));
    assert_eq!(t.storage.live_cursor_trans(), 1);
    assert_eq!(t.storage.open_cursors(), 3);

    for position in [1, 0, 0] {
        let cursor = open.remove(position);
        cursors.close_cursor(&session, cursor).unwrap();
        assert_eq!(t.storage.live_cursor_trans(), 1);
        assert!(session.has_cursor_tran());
    }
    assert_eq!(session.open_cursor_count(), 0);
    assert_eq!(t.storage.open_cursors(), 0);

    t.backend.commit(id, IsolationLevel::Sosql, 1).unwrap();
    assert_eq!(t.storage.live_cursor_trans(), 0);
}

#[test]
fn failed_standalone_insert_counts_nothing() {
    let t = TestBackend::new();
    let session = t.backend.standalone(tid(31), 1);
    t.log
        .register_transaction(session.tid(), TransactionMode::Sosql)
        .unwrap();

    t.storage.fail_next_release();
    let err = t.backend.cursors().insert(&session, insert(1, 0)).unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(session.effects().inserted, 0);
    assert!(!session.is_write_transaction());
    assert_eq!(t.storage.live_cursor_trans(), 0);
}

#[test]
fn read_committed_cursors_read_through_shadow() {
    let t = TestBackend::new();
    let id = tid(22);
    let session = t.backend.begin(id, IsolationLevel::ReadCommitted, 0, 0).unwrap();

    let cursor = t
        .backend
        .cursors()
        .open_cursor(&session, CursorTarget::Table("orders".into()), RowId::new(0), true)
        .unwrap();
    assert_eq!(cursor.mode(), Some(CursorMode::RealAndShadow));
    t.backend.cursors().close_cursor(&session, cursor).unwrap();
    assert_eq!(t.log.scope_depth(id), 0);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn failed_open_leaves_nothing_behind() {
    let t = TestBackend::new();
    let session = t.backend.standalone(tid(23), 1);
    t.storage.fail_next_open();

    let err = t
        .backend
        .cursors()
        .open_cursor(&session, CursorTarget::Table("orders".into()), RowId::new(0), true)
        .unwrap_err();
    assert!(matches!(err, Error::CursorOpenFailed { ref table, .. } if table == "orders"));
    assert_eq!(err.kind(), ErrorKind::CursorLifecycle);
    assert_eq!(t.storage.live_cursor_trans(), 0);
    assert_eq!(session.open_cursor_count(), 0);
    assert_eq!(t.log.scope_depth(session.tid()), 0);
}

#[test]
fn failed_release_is_reported_but_cursor_is_gone() {
    let t = TestBackend::new();
    let session = t.backend.standalone(tid(24), 1);
    let cursor = t
        .backend
        .cursors()
        .open_cursor(&session, CursorTarget::Table("orders".into()), RowId::new(0), true)
        .unwrap();

    t.storage.fail_next_release();
    let err = t.backend.cursors().close_cursor(&session, cursor).unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(session.open_cursor_count(), 0);
    assert_eq!(t.storage.live_cursor_trans(), 0);
}

#[test]
fn failed_storage_close_is_not_an_error() {
    let t = TestBackend::new();
    let session = t.backend.standalone(tid(25), 1);
    let cursor = t
        .backend
        .cursors()
        .open_cursor(&session, CursorTarget::Table("orders".into()), RowId::new(0), true)
        .unwrap();

    t.storage.fail_next_close();
    t.backend.cursors().close_cursor(&session, cursor).unwrap();
    assert_eq!(t.storage.live_cursor_trans(), 0);
}

#[test]
fn bad_expression_key_fails_the_insert() {
    let t = TestBackend::new();
    let id = tid(26);
    t.backend.begin(id, IsolationLevel::Sosql, 0, 0).unwrap();

    let request = InsertRequest {
        index_keys: IndexKeys::new().with_wire(1, encode_row(&[WireValue::Text("x".into())]).unwrap()),
        ..insert(1, 1)
    };
    let err = t.backend.insert(id, request).unwrap_err();
    match err {
        Error::IndexConversionFailed(ref conversion) => {
            assert_eq!(conversion.table, "orders");
            assert_eq!(conversion.from, WIRE_FORMAT);
        }
        ref other => panic!("unexpected error: {}", other),
    }
    assert_eq!(err.status_code(), -4);

    let session = t.backend.session(id);
    assert_eq!(session.effects().inserted, 0);
    assert!(!session.is_write_transaction());
    assert_eq!(session.open_cursor_count(), 0);
}

// ============================================================================
// Conversion
// ============================================================================

#[test]
fn inserted_rows_are_converted_in_session_timezone() {
    let t = TestBackend::new();
    let id = tid(27);
    let session = t.backend.begin(id, IsolationLevel::Sosql, 0, 0).unwrap();
    session.set_timezone("UTC".parse().unwrap());
    t.backend.insert(id, insert(7, 1)).unwrap();

    let entries = t.log.pending_entries(id).unwrap();
    let (row, blobs, keys) = match entries.last() {
        Some(LogEntry::Insert {
            row, blobs, keys, ..
        }) => (row.clone(), blobs.clone(), keys.clone()),
        other => panic!("expected insert, got {:?}", other),
    };

    // The expression key was converted; the plain slot was left empty
    assert_eq!(keys.len(), 2);
    assert!(keys[0].is_none());
    assert_eq!(keys[1].as_ref().map(Vec::len), Some(9));

    let table = orders_table();
    let on_disk = OnDiskRow::new(OnDiskBuffer::from_bytes(row), blobs);
    let wire = RowCodec::default()
        .row_to_wire(&table, &on_disk, session.timezone())
        .unwrap();
    let values = decode_row(wire.as_bytes()).unwrap();
    assert_eq!(values[0], WireValue::Integer(7));
    assert_eq!(values[1], WireValue::Text("acme".into()));
    assert_eq!(
        values[3],
        WireValue::Datetime(parse_datetime("2024-03-01 09:30:00").unwrap())
    );
    assert_eq!(values[4], WireValue::Blob(b"gift wrap".to_vec()));
}

#[test]
fn update_and_delete_count_effects() {
    let t = TestBackend::new();
    let id = tid(28);
    let session = t.backend.begin(id, IsolationLevel::ReadCommitted, 0, 0).unwrap();

    t.backend
        .update(
            id,
            UpdateRequest {
                target: CursorTarget::Table("orders".into()),
                old_row_id: RowId::new(1),
                new_row_id: RowId::new(2),
                row: order(1, "globex"),
                delete_keys: IndexKeys::new().with_wire(1, encode_row(&[WireValue::Integer(100)]).unwrap()),
                insert_keys: IndexKeys::new().with_wire(1, encode_row(&[WireValue::Integer(200)]).unwrap()),
                sequence: 1,
            },
        )
        .unwrap();
    t.backend
        .delete(
            id,
            DeleteRequest {
                target: CursorTarget::RootPage(t.orders.table),
                row_id: RowId::new(2),
                index_keys: IndexKeys::new(),
                sequence: 2,
            },
        )
        .unwrap();

    let effects = session.effects();
    assert_eq!((effects.inserted, effects.updated, effects.deleted), (0, 1, 1));
    assert!(session.is_write_transaction());
    assert_eq!(
        t.backend.commit(id, IsolationLevel::ReadCommitted, 3).unwrap(),
        CommitOutcome::Committed
    );
}

// ============================================================================
// Row streaming
// ============================================================================

#[derive(Default)]
struct CollectingSink {
    rows: Mutex<Vec<(RowId, RowStatus)>>,
}

impl RowSink for CollectingSink {
    fn send_row(&self, _tid: TransactionId, row_id: RowId, _row: &[u8], status: RowStatus) -> Result<()> {
        self.rows.lock().push((row_id, status));
        Ok(())
    }
}

#[test]
fn streamed_rows_carry_trailing_row_id() {
    let sink = CollectingSink::default();
    let mut row = b"payload".to_vec();
    row.extend_from_slice(&42u64.to_be_bytes());

    send_row(&sink, tid(29), &row, RowStatus::Found).unwrap();
    send_row(&sink, tid(29), &[], RowStatus::Empty).unwrap();

    assert_eq!(
        *sink.rows.lock(),
        vec![(RowId::new(42), RowStatus::Found), (RowId::new(0), RowStatus::Empty)]
    );
}
