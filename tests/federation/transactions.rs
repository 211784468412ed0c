//! Remote transaction lifecycle: begin, commit, rollback, sequencing

use crate::common::*;
use fdb_bend::fdb_durability::LogEntry;
use fdb_bend::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Commit paths
// ============================================================================

#[test]
fn sosql_commit_makes_mutations_durable() {
    let t = TestBackend::new();
    let id = tid(1);

    t.backend.begin(id, IsolationLevel::Sosql, 0, 0).unwrap();
    t.backend.insert(id, insert(1, 1)).unwrap();
    t.backend.insert(id, insert(2, 2)).unwrap();
    let outcome = t.backend.commit(id, IsolationLevel::Sosql, 3).unwrap();

    assert_eq!(outcome, CommitOutcome::Committed);
    assert_eq!(outcome.sql_code(), 0);
    let durable = t.log.durable_entries().unwrap();
    assert!(matches!(durable.first(), Some(LogEntry::Begin { .. })));
    assert_eq!(durable.iter().filter(|e| e.is_mutation()).count(), 2);
    assert!(matches!(durable.last(), Some(LogEntry::Commit { tid }) if *tid == id));

    assert!(t.backend.coordinator().registry().is_empty());
    assert!(!t.log.is_registered(id));
    assert_eq!(t.storage.live_cursor_trans(), 0);
}

#[test]
fn read_committed_commit_finishes_shadow() {
    let t = TestBackend::new();
    let id = tid(2);

    let session = t.backend.begin(id, IsolationLevel::ReadCommitted, 0, 0).unwrap();
    assert!(session.has_shadow_tran());
    t.backend.insert(id, insert(10, 1)).unwrap();

    let outcome = t.backend.commit(id, IsolationLevel::ReadCommitted, 2).unwrap();
    assert_eq!(outcome, CommitOutcome::Committed);
    assert_eq!(t.storage.shadow_commits(), 1);
    assert_eq!(t.storage.live_shadow_trans(), 0);
    assert_eq!(t.storage.live_cursor_trans(), 0);
    assert!(session.is_finished());
    assert_eq!(session.effects().inserted, 1);
}

#[test]
fn aborted_commit_reports_sql_code() {
    let t = TestBackend::new();
    let id = tid(3);

    t.backend.begin(id, IsolationLevel::ReadCommitted, 0, 0).unwrap();
    t.backend.insert(id, insert(1, 1)).unwrap();
    t.log.abort_next_commit(AbortReason::DuplicateKey);

    let outcome = t.backend.commit(id, IsolationLevel::ReadCommitted, 2).unwrap();
    assert_eq!(outcome, CommitOutcome::Aborted(AbortReason::DuplicateKey));
    assert_eq!(outcome.sql_code(), 299);
    assert_eq!(t.storage.shadow_aborts(), 1);
    assert_eq!(t.storage.live_cursor_trans(), 0);
    assert!(t.backend.coordinator().registry().is_empty());
}

#[test]
fn rollback_discards_pending_mutations() {
    let t = TestBackend::new();
    let id = tid(4);

    t.backend.begin(id, IsolationLevel::Sosql, 0, 0).unwrap();
    t.backend.insert(id, insert(1, 1)).unwrap();
    t.backend.rollback(id, IsolationLevel::Sosql, 2).unwrap();

    let durable = t.log.durable_entries().unwrap();
    assert_eq!(durable.len(), 1);
    assert!(matches!(durable[0], LogEntry::Abort { reason: None, .. }));
    assert_eq!(t.log.aborts(), 1);
    assert_eq!(t.storage.live_cursor_trans(), 0);
}

// ============================================================================
// Failed mutations
// ============================================================================

/// Run `f` on a thread, failing the test if it does not finish in time
fn within<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(Duration::from_secs(5))
        .expect("operation blocked on the sequence turnstile")
}

#[test]
fn rollback_after_failed_insert_completes() {
    let t = Arc::new(TestBackend::new());
    let id = tid(11);
    t.backend.begin(id, IsolationLevel::Sosql, 0, 0).unwrap();

    let request = InsertRequest {
        target: CursorTarget::Table("no_such_table".into()),
        ..insert(1, 1)
    };
    let err = t.backend.insert(id, request).unwrap_err();
    assert!(matches!(err, Error::TableNotFound(_)));

    let rolled_back = {
        let t = Arc::clone(&t);
        within(move || t.backend.rollback(id, IsolationLevel::Sosql, 2))
    };
    rolled_back.unwrap();
    assert_eq!(t.log.aborts(), 1);
    assert!(t.backend.coordinator().registry().is_empty());
    assert_eq!(t.storage.live_cursor_trans(), 0);
}

#[test]
fn commit_after_failed_conversion_completes() {
    let t = Arc::new(TestBackend::new());
    let id = tid(12);
    t.backend.begin(id, IsolationLevel::ReadCommitted, 0, 0).unwrap();

    let request = InsertRequest {
        row: encode_row(&[WireValue::Null]).unwrap(),
        ..insert(1, 1)
    };
    assert!(t.backend.insert(id, request).is_err());
    t.backend.insert(id, insert(2, 2)).unwrap();

    let committed = {
        let t = Arc::clone(&t);
        within(move || t.backend.commit(id, IsolationLevel::ReadCommitted, 3))
    };
    assert_eq!(committed.unwrap(), CommitOutcome::Committed);
    let durable = t.log.durable_entries().unwrap();
    assert_eq!(durable.iter().filter(|e| e.is_mutation()).count(), 1);
    assert_eq!(t.storage.live_cursor_trans(), 0);
}

#[test]
fn commit_after_failed_cursor_open_completes() {
    let t = Arc::new(TestBackend::new());
    let id = tid(13);
    t.backend.begin(id, IsolationLevel::Sosql, 0, 0).unwrap();

    t.storage.fail_next_open();
    let err = t
        .backend
        .delete(
            id,
            DeleteRequest {
                target: CursorTarget::Table("orders".into()),
                row_id: RowId::new(1),
                index_keys: IndexKeys::new(),
                sequence: 1,
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::CursorOpenFailed { .. }));
    assert!(!t.backend.session(id).is_write_transaction());

    let committed = {
        let t = Arc::clone(&t);
        within(move || t.backend.commit(id, IsolationLevel::Sosql, 2))
    };
    assert_eq!(committed.unwrap(), CommitOutcome::Committed);
}

// ============================================================================
// Registration
// ============================================================================

#[test]
fn duplicate_begin_is_rejected() {
    let t = TestBackend::new();
    let id = tid(5);

    let first = t.backend.begin(id, IsolationLevel::Sosql, 0, 0).unwrap();
    let err = t.backend.begin(id, IsolationLevel::Sosql, 0, 0).unwrap_err();
    assert!(matches!(err, Error::DuplicateTransaction(d) if d == id));
    assert_eq!(err.kind(), ErrorKind::Registration);

    // The first session survives and can still commit
    assert!(Arc::ptr_eq(&first, &t.backend.session(id)));
    assert_eq!(
        t.backend.commit(id, IsolationLevel::Sosql, 1).unwrap(),
        CommitOutcome::Committed
    );
    assert_eq!(t.storage.live_cursor_trans(), 0);
}

#[test]
fn unsupported_isolation_is_fatal() {
    let t = TestBackend::new();
    let err = t
        .backend
        .begin(tid(6), IsolationLevel::Serializable, 0, 0)
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(t.backend.coordinator().registry().is_empty());
    assert_eq!(t.storage.live_cursor_trans(), 0);
}

#[test]
fn mismatched_isolation_on_commit_is_fatal() {
    let t = TestBackend::new();
    let id = tid(7);

    t.backend.begin(id, IsolationLevel::Sosql, 0, 0).unwrap();
    let err = t
        .backend
        .commit(id, IsolationLevel::ReadCommitted, 1)
        .unwrap_err();
    assert!(matches!(err, Error::FatalConfiguration(_)));
    assert!(!err.is_retryable());
}

#[test]
fn uuid_transactions_join_by_uuid() {
    let t = TestBackend::new();
    let uuid = Uuid::new_v4();
    let id = TransactionId::Uuid(uuid);

    t.backend.begin(id, IsolationLevel::Sosql, 0, 0).unwrap();
    let joined = t.backend.coordinator().join_by_uuid(uuid).unwrap();
    assert_eq!(joined.tid(), id);

    let missing = t.backend.coordinator().join_by_uuid(Uuid::new_v4()).unwrap_err();
    assert!(missing.is_retryable());
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn commit_overtaking_begin_waits_for_it() {
    let t = Arc::new(TestBackend::new());
    let id = tid(8);

    let committer = {
        let t = Arc::clone(&t);
        thread::spawn(move || t.backend.commit(id, IsolationLevel::Sosql, 1))
    };
    thread::sleep(Duration::from_millis(20));
    t.backend.begin(id, IsolationLevel::Sosql, 0, 0).unwrap();

    assert_eq!(committer.join().unwrap().unwrap(), CommitOutcome::Committed);
    assert!(t.backend.coordinator().registry().is_empty());
}

#[test]
fn mutations_submit_in_sequence_order() {
    let t = Arc::new(TestBackend::new());
    let id = tid(9);
    t.backend.begin(id, IsolationLevel::Sosql, 0, 0).unwrap();

    // Sequence 2 arrives first and must wait for sequence 1
    let barrier = Arc::new(Barrier::new(2));
    let late = {
        let t = Arc::clone(&t);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            t.backend.insert(id, insert(2, 2))
        })
    };
    barrier.wait();
    thread::sleep(Duration::from_millis(20));
    t.backend.insert(id, insert(1, 1)).unwrap();
    late.join().unwrap().unwrap();

    let row_ids: Vec<RowId> = t
        .log
        .pending_entries(id)
        .unwrap()
        .into_iter()
        .filter_map(|e| match e {
            LogEntry::Insert { row_id, .. } => Some(row_id),
            _ => None,
        })
        .collect();
    assert_eq!(row_ids, vec![RowId::new(1), RowId::new(2)]);
}

#[test]
fn commit_waits_for_open_cursors() {
    let t = Arc::new(TestBackend::new());
    let id = tid(10);
    let session = t.backend.begin(id, IsolationLevel::ReadCommitted, 0, 0).unwrap();

    let cursor = t
        .backend
        .cursors()
        .open_cursor(
            &session,
            CursorTarget::RootPage(t.orders.indexes[0]),
            RowId::new(0),
            true,
        )
        .unwrap();

    let committed = Arc::new(AtomicBool::new(false));
    let committer = {
        let t = Arc::clone(&t);
        let committed = Arc::clone(&committed);
        thread::spawn(move || {
            let outcome = t.backend.commit(id, IsolationLevel::ReadCommitted, 1);
            committed.store(true, Ordering::SeqCst);
            outcome
        })
    };

    thread::sleep(Duration::from_millis(30));
    assert!(!committed.load(Ordering::SeqCst));
    // The shared handle is still held while the cursor is open
    assert!(session.has_cursor_tran());

    t.backend.cursors().close_cursor(&session, cursor).unwrap();
    assert_eq!(committer.join().unwrap().unwrap(), CommitOutcome::Committed);
    assert!(!session.has_cursor_tran());
    assert_eq!(t.storage.live_cursor_trans(), 0);
}
