//! Transaction coordinator for remote transactions
//!
//! Drives the lifecycle of a peer's transaction on this node:
//!
//! ```text
//! begin     -> acquire shared cursor tran (+ shadow tran for read committed)
//!              register with the log layer and the registry
//! ...       -> cursors and mutations, each sequenced (see session)
//! commit    -> drain barrier, shadow scope, mode-specific commit,
//!              unregister, release handles
//! rollback  -> drain barrier, mode-specific abort,
//!              unregister, release handles
//! ```
//!
//! Cleanup after commit or rollback always runs, whatever the outcome.
//! Failures during cleanup are logged; they never replace the primary result.

use chrono_tz::Tz;
use fdb_core::{
    BackendConfig, CommitOutcome, Error, IsolationLevel, Result, TransactionId, TransactionMode,
};
use fdb_durability::{RequestKind, TransactionLog};
use fdb_storage::StorageEngine;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::registry::SessionRegistry;
use crate::session::{RemoteSession, SequenceNumber, SessionOptions};

/// Coordinates begin, commit, rollback and join of remote transactions
pub struct TransactionCoordinator {
    config: BackendConfig,
    default_timezone: Tz,
    registry: SessionRegistry,
    log: Arc<dyn TransactionLog>,
    storage: Arc<dyn StorageEngine>,
}

impl TransactionCoordinator {
    /// Create a coordinator
    ///
    /// Fails with `FatalConfiguration` if the default timezone is unknown.
    pub fn new(
        config: BackendConfig,
        log: Arc<dyn TransactionLog>,
        storage: Arc<dyn StorageEngine>,
    ) -> Result<Self> {
        let default_timezone: Tz = config.default_timezone.parse().map_err(|_| {
            Error::FatalConfiguration(format!(
                "unknown default timezone '{}'",
                config.default_timezone
            ))
        })?;
        Ok(Self {
            config,
            default_timezone,
            registry: SessionRegistry::new(),
            log,
            storage,
        })
    }

    /// Backend configuration
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Session registry
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Log layer
    pub fn log(&self) -> &Arc<dyn TransactionLog> {
        &self.log
    }

    /// Storage engine
    pub fn storage(&self) -> &Arc<dyn StorageEngine> {
        &self.storage
    }

    /// Timezone for sessions that do not set one
    pub fn default_timezone(&self) -> Tz {
        self.default_timezone
    }

    fn session_options(&self, transactional: bool, sequence: SequenceNumber) -> SessionOptions {
        SessionOptions {
            timezone: self.default_timezone,
            flags: 0,
            code_release: None,
            transactional,
            first_sequence: sequence,
            poll_interval: self.config.drain_poll_interval(),
            track: self.config.track,
        }
    }

    /// Start a remote transaction
    ///
    /// `sequence` is the begin message's own sequence number.
    pub fn begin(
        &self,
        tid: TransactionId,
        isolation: IsolationLevel,
        flags: u32,
        sequence: SequenceNumber,
    ) -> Result<Arc<RemoteSession>> {
        let mode = TransactionMode::try_from(isolation)?;
        let session = Arc::new(RemoteSession::new(
            tid,
            mode,
            SessionOptions {
                flags,
                ..self.session_options(true, sequence)
            },
        ));

        let cursor_tran = self.storage.acquire_cursor_tran()?;
        let shadow_tran = match mode {
            TransactionMode::ReadCommitted => match self.storage.begin_shadow_tran() {
                Ok(shadow) => Some(shadow),
                Err(e) => {
                    self.release_quietly(tid, cursor_tran);
                    return Err(e);
                }
            },
            TransactionMode::Sosql => None,
        };
        if self.config.track {
            info!(%tid, %cursor_tran, mode = mode.isolation().name(), "begin: acquired shared cursor transaction");
        }
        session.install_handles(cursor_tran, shadow_tran);

        if let Err(e) = self.log.register_transaction(tid, mode) {
            self.discard_handles(&session);
            return Err(e);
        }
        if let Err(e) = self.registry.register(Arc::clone(&session)) {
            if let Err(unreg) = self.log.unregister_transaction(tid) {
                warn!(%tid, error = %unreg, "failed to undo log registration");
            }
            self.discard_handles(&session);
            return Err(e);
        }

        debug!(%tid, mode = mode.isolation().name(), sequence, "transaction started");
        Ok(session)
    }

    /// Commit a remote transaction
    ///
    /// Returns the log layer's decision. An aborted commit is
    /// `Ok(CommitOutcome::Aborted(..))`, not an error.
    pub fn commit(
        &self,
        tid: TransactionId,
        isolation: IsolationLevel,
        session: &RemoteSession,
        sequence: SequenceNumber,
    ) -> Result<CommitOutcome> {
        self.check_session(tid, isolation, session)?;
        session.wait_for_drain(sequence);

        self.log.begin_shadow_scope(tid);
        let result = match session.mode() {
            TransactionMode::ReadCommitted => self.commit_read_committed(session),
            TransactionMode::Sosql => self.log.commit_optimistic(tid),
        };
        self.log.end_shadow_scope(tid);

        match &result {
            Ok(CommitOutcome::Committed) => {
                if self.config.track {
                    info!(%tid, effects = ?session.effects(), "commit");
                }
            }
            Ok(CommitOutcome::Aborted(reason)) => {
                debug!(%tid, %reason, sql_code = reason.sql_code().code(), "commit aborted");
            }
            Err(e) => error!(%tid, error = %e, "commit failed"),
        }

        self.finish(session, "commit");
        result
    }

    fn commit_read_committed(&self, session: &RemoteSession) -> Result<CommitOutcome> {
        let tid = session.tid();
        let tz = session.timezone();
        let result = self.log.commit_read_committed(tid, tz.name());

        if let Some(shadow) = session.take_shadow_tran() {
            let finished = match result {
                Ok(CommitOutcome::Committed) => self.storage.commit_shadow_tran(shadow),
                _ => self.storage.abort_shadow_tran(shadow),
            };
            if let Err(e) = finished {
                error!(%tid, error = %e, "failed to finish shadow transaction");
            }
        }
        result
    }

    /// Roll back a remote transaction
    pub fn rollback(
        &self,
        tid: TransactionId,
        isolation: IsolationLevel,
        session: &RemoteSession,
        sequence: SequenceNumber,
    ) -> Result<()> {
        self.check_session(tid, isolation, session)?;
        session.wait_for_drain(sequence);

        let result = match session.mode() {
            TransactionMode::ReadCommitted => {
                let aborted = self.log.abort_read_committed(tid);
                if let Some(shadow) = session.take_shadow_tran() {
                    if let Err(e) = self.storage.abort_shadow_tran(shadow) {
                        error!(%tid, error = %e, "failed to abort shadow transaction");
                    }
                }
                aborted
            }
            TransactionMode::Sosql => self.log.abort_optimistic(tid, RequestKind::Socket),
        };
        if let Err(e) = &result {
            error!(%tid, error = %e, "rollback failed");
        } else if self.config.track {
            info!(%tid, "rollback");
        }

        self.finish(session, "rollback");
        result
    }

    fn check_session(
        &self,
        tid: TransactionId,
        isolation: IsolationLevel,
        session: &RemoteSession,
    ) -> Result<()> {
        if session.tid() != tid {
            return Err(Error::FatalConfiguration(format!(
                "transaction {} finished through session of {}",
                tid,
                session.tid()
            )));
        }
        if session.isolation() != isolation {
            return Err(Error::FatalConfiguration(format!(
                "transaction {} is {}, finished as {}",
                tid,
                session.isolation().name(),
                isolation.name()
            )));
        }
        Ok(())
    }

    /// Post-commit/rollback cleanup; always runs
    fn finish(&self, session: &RemoteSession, operation: &'static str) {
        let tid = session.tid();
        if let Err(e) = self.log.unregister_transaction(tid) {
            warn!(%tid, op = operation, error = %e, "log unregister failed");
        }
        if self.registry.unregister(tid).is_none() {
            warn!(%tid, op = operation, "session missing from registry");
        }
        if let Some(shadow) = session.take_shadow_tran() {
            if let Err(e) = self.storage.abort_shadow_tran(shadow) {
                error!(%tid, error = %e, "failed to drop shadow transaction");
            }
        }
        match session.take_cursor_tran() {
            Some(tran) => {
                if self.config.track {
                    info!(%tid, %tran, op = operation, "releasing shared cursor transaction");
                }
                if let Err(e) = self.storage.release_cursor_tran(tran) {
                    error!(%tid, op = operation, error = %e, "failed to release cursor transaction");
                }
            }
            None => {
                let missing = Error::MissingCursorTransaction { tid, operation };
                error!(%tid, op = operation, error = %missing, "missing trans");
            }
        }
        session.mark_finished();
    }

    fn discard_handles(&self, session: &RemoteSession) {
        let tid = session.tid();
        if let Some(shadow) = session.take_shadow_tran() {
            if let Err(e) = self.storage.abort_shadow_tran(shadow) {
                warn!(%tid, error = %e, "failed to abort shadow transaction");
            }
        }
        if let Some(tran) = session.take_cursor_tran() {
            self.release_quietly(tid, tran);
        }
    }

    fn release_quietly(&self, tid: TransactionId, tran: fdb_storage::CursorTran) {
        if let Err(e) = self.storage.release_cursor_tran(tran) {
            warn!(%tid, error = %e, "failed to release cursor transaction");
        }
    }

    /// Find a live session; never blocks
    pub fn join(&self, tid: TransactionId) -> Result<Arc<RemoteSession>> {
        self.registry
            .lookup(tid)
            .ok_or(Error::TransactionNotFound(tid))
    }

    /// Find a live session by numeric request id
    pub fn join_by_request_id(&self, id: u64) -> Result<Arc<RemoteSession>> {
        self.join(TransactionId::RequestId(id))
    }

    /// Find a live session by UUID
    pub fn join_by_uuid(&self, id: Uuid) -> Result<Arc<RemoteSession>> {
        self.join(TransactionId::Uuid(id))
    }

    /// Find a session, waiting for its begin if it has not arrived yet
    ///
    /// Blocks until the session is registered.
    pub fn get_or_wait(&self, tid: TransactionId) -> Arc<RemoteSession> {
        loop {
            if let Some(session) =
                self.registry
                    .wait_for(tid, self.config.join_poll_interval(), None)
            {
                return session;
            }
        }
    }

    /// Like [`get_or_wait`](Self::get_or_wait), giving up after `timeout`
    pub fn get_or_wait_timeout(
        &self,
        tid: TransactionId,
        timeout: Duration,
    ) -> Option<Arc<RemoteSession>> {
        self.registry.wait_for(
            tid,
            self.config.join_poll_interval(),
            Some(Instant::now() + timeout),
        )
    }

    /// Create a private, unregistered session for standalone cursor access
    ///
    /// Every cursor opened on it acquires and releases its own handle.
    pub fn open_standalone(&self, tid: TransactionId, code_release: u32) -> Arc<RemoteSession> {
        if self.config.track {
            info!(%tid, code_release, "standalone session");
        }
        Arc::new(RemoteSession::new(
            tid,
            TransactionMode::Sosql,
            SessionOptions {
                code_release: Some(code_release),
                ..self.session_options(false, 0)
            },
        ))
    }
}
