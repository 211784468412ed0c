//! Backend entry point
//!
//! [`Backend`] wires the transaction coordinator, the cursor manager and the
//! covering-index rewriter over one storage engine and one transaction log.
//! Messages that name a transaction id rejoin their session through the
//! registry, waiting for it when the message overtook its begin.

use fdb_concurrency::{RemoteSession, SequenceNumber, TransactionCoordinator};
use fdb_core::{BackendConfig, CommitOutcome, IsolationLevel, Result, TransactionId};
use fdb_durability::{MemoryLog, TransactionLog};
use fdb_engine::{
    run_remote_sql, CoveringIndexRewriter, CursorManager, DeleteRequest, InsertRequest, RemoteSql,
    SqlDispatcher, UpdateRequest,
};
use fdb_storage::{MemoryStorage, StorageEngine};
use std::sync::Arc;
use tracing::debug;

/// The federated backend
///
/// # Example
///
/// ```
/// use fdb_bend::prelude::*;
///
/// let backend = Backend::builder().build().unwrap();
/// let tid = TransactionId::RequestId(7);
/// backend.begin(tid, IsolationLevel::Sosql, 0, 0).unwrap();
/// let outcome = backend.commit(tid, IsolationLevel::Sosql, 1).unwrap();
/// assert_eq!(outcome, CommitOutcome::Committed);
/// ```
pub struct Backend {
    coordinator: TransactionCoordinator,
    cursors: CursorManager,
    rewriter: CoveringIndexRewriter,
}

impl Backend {
    /// Create a builder
    pub fn builder() -> BackendBuilder {
        BackendBuilder::default()
    }

    /// Transaction coordinator
    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    /// Cursor manager
    pub fn cursors(&self) -> &CursorManager {
        &self.cursors
    }

    /// Covering-index rewriter
    pub fn rewriter(&self) -> &CoveringIndexRewriter {
        &self.rewriter
    }

    /// Begin a remote transaction
    pub fn begin(
        &self,
        tid: TransactionId,
        isolation: IsolationLevel,
        flags: u32,
        sequence: SequenceNumber,
    ) -> Result<Arc<RemoteSession>> {
        self.coordinator.begin(tid, isolation, flags, sequence)
    }

    /// Commit a remote transaction
    pub fn commit(
        &self,
        tid: TransactionId,
        isolation: IsolationLevel,
        sequence: SequenceNumber,
    ) -> Result<CommitOutcome> {
        let session = self.coordinator.get_or_wait(tid);
        self.coordinator.commit(tid, isolation, &session, sequence)
    }

    /// Roll back a remote transaction
    pub fn rollback(
        &self,
        tid: TransactionId,
        isolation: IsolationLevel,
        sequence: SequenceNumber,
    ) -> Result<()> {
        let session = self.coordinator.get_or_wait(tid);
        self.coordinator.rollback(tid, isolation, &session, sequence)
    }

    /// Session for a transaction, waiting for its begin if needed
    pub fn session(&self, tid: TransactionId) -> Arc<RemoteSession> {
        self.coordinator.get_or_wait(tid)
    }

    /// Private session for cursors opened outside a transaction
    pub fn standalone(&self, tid: TransactionId, code_release: u32) -> Arc<RemoteSession> {
        self.coordinator.open_standalone(tid, code_release)
    }

    /// Insert a row within a transaction
    pub fn insert(&self, tid: TransactionId, request: InsertRequest) -> Result<()> {
        let session = self.session(tid);
        self.cursors.insert(&session, request)
    }

    /// Update a row within a transaction
    pub fn update(&self, tid: TransactionId, request: UpdateRequest) -> Result<()> {
        let session = self.session(tid);
        self.cursors.update(&session, request)
    }

    /// Delete a row within a transaction
    pub fn delete(&self, tid: TransactionId, request: DeleteRequest) -> Result<()> {
        let session = self.session(tid);
        self.cursors.delete(&session, request)
    }

    /// Run a remote statement on a session
    pub fn run_sql(
        &self,
        dispatcher: &dyn SqlDispatcher,
        session: &RemoteSession,
        request: &RemoteSql,
    ) -> Result<i32> {
        run_remote_sql(dispatcher, session, request)
    }
}

/// Builder for [`Backend`]
///
/// Storage and log default to the in-memory implementations.
#[derive(Default)]
pub struct BackendBuilder {
    config: BackendConfig,
    storage: Option<Arc<dyn StorageEngine>>,
    log: Option<Arc<dyn TransactionLog>>,
}

impl BackendBuilder {
    /// Use a configuration
    pub fn config(mut self, config: BackendConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a storage engine
    pub fn storage(mut self, storage: Arc<dyn StorageEngine>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use a transaction log
    pub fn log(mut self, log: Arc<dyn TransactionLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Build the backend
    ///
    /// Fails when the configured default timezone is unknown.
    pub fn build(self) -> Result<Backend> {
        let storage: Arc<dyn StorageEngine> = match self.storage {
            Some(storage) => storage,
            None => Arc::new(MemoryStorage::new()),
        };
        let log: Arc<dyn TransactionLog> = match self.log {
            Some(log) => log,
            None => Arc::new(MemoryLog::new()),
        };
        debug!(
            track = self.config.track,
            expression_indexes = self.config.expression_indexes,
            timezone = %self.config.default_timezone,
            "building backend"
        );

        let rewriter = CoveringIndexRewriter::new(Arc::clone(&storage));
        let coordinator = TransactionCoordinator::new(self.config, log, storage)?;
        let cursors = CursorManager::for_coordinator(&coordinator);
        Ok(Backend {
            coordinator,
            cursors,
            rewriter,
        })
    }
}
