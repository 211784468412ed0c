//! Remote SQL dispatch and row streaming

use chrono::{DateTime, Utc};
use fdb_concurrency::RemoteSession;
use fdb_core::{Result, RowId, TransactionId};
use fdb_wire::parse_timezone;
use tracing::{debug, warn};

/// A statement sent by a remote peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSql {
    /// Peer protocol version
    pub version: u32,
    /// Request flags
    pub flags: u32,
    /// Statement text
    pub sql: String,
    /// Key bounding the scan, if the peer pushed one down
    pub trim_key: Option<Vec<u8>>,
    /// Session timezone requested by the peer
    pub timezone: Option<String>,
}

impl RemoteSql {
    /// Statement with no trim key or timezone
    pub fn new(version: u32, flags: u32, sql: impl Into<String>) -> Self {
        Self {
            version,
            flags,
            sql: sql.into(),
            trim_key: None,
            timezone: None,
        }
    }
}

/// Runs statements on behalf of remote sessions
pub trait SqlDispatcher: Send + Sync {
    /// Run a statement to completion, returning its SQL result code
    fn dispatch(&self, session: &RemoteSession, request: &RemoteSql) -> Result<i32>;
}

/// Hand a remote statement to the dispatcher
///
/// Applies the requested timezone to the session first; an unknown zone
/// keeps the session's current one.
pub fn run_remote_sql(
    dispatcher: &dyn SqlDispatcher,
    session: &RemoteSession,
    request: &RemoteSql,
) -> Result<i32> {
    let received: DateTime<Utc> = Utc::now();
    let tid = session.tid();

    if let Some(name) = request.timezone.as_deref() {
        match parse_timezone(name) {
            Some(tz) => session.set_timezone(tz),
            None => warn!(%tid, timezone = name, "unknown timezone, keeping session default"),
        }
    }
    if session.tracking() {
        debug!(
            %tid,
            version = request.version,
            flags = request.flags,
            trimmed = request.trim_key.is_some(),
            sql = %request.sql,
            "remote sql received"
        );
    }

    let rc = dispatcher.dispatch(session, request);
    debug!(
        %tid,
        elapsed_ms = (Utc::now() - received).num_milliseconds(),
        ok = rc.is_ok(),
        "remote sql done"
    );
    rc
}

/// Outcome attached to each streamed row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    /// Row found, last of the batch
    Found,
    /// Row found, more follow
    FoundMore,
    /// No matching row
    NotFound,
    /// Scan ran past the end
    PastEnd,
    /// Table is empty
    Empty,
}

impl RowStatus {
    /// Check if the status carries a row
    pub fn has_row(self) -> bool {
        matches!(self, RowStatus::Found | RowStatus::FoundMore)
    }
}

/// Transport for rows streamed back to the peer
pub trait RowSink: Send + Sync {
    /// Send one row
    fn send_row(&self, tid: TransactionId, row_id: RowId, row: &[u8], status: RowStatus)
        -> Result<()>;
}

/// Send a row, taking its row id from the trailing eight bytes
pub fn send_row(sink: &dyn RowSink, tid: TransactionId, row: &[u8], status: RowStatus) -> Result<()> {
    let row_id = if status.has_row() {
        RowId::from_row_trailer(row).unwrap_or_else(|| {
            warn!(%tid, len = row.len(), "row too short for a row id");
            RowId::new(0)
        })
    } else {
        RowId::new(0)
    };
    sink.send_row(tid, row_id, row, status)
}
