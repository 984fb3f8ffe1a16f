//! Unit of work
//!
//! A [`UnitOfWork`] owns one session: a storage engine handle, a change
//! tracker shared by every repository it hands out, and at most one open
//! explicit transaction. Repositories only stage changes; [`UnitOfWork::commit`]
//! stamps audit fields with a single instant and writes everything in one
//! atomic flush.
//!
//! # Example
//!
//! ```rust,ignore
//! use generic_repository::prelude::*;
//!
//! let uow = UnitOfWork::new(Arc::new(MemoryEngine::new()));
//! let notes = uow.of::<Note>();
//!
//! notes.add(Note::new(1, "hello")).await?;
//! assert_eq!(uow.commit().await?, 1);
//!
//! let stored = notes.find_by_id(&1).await?.expect("committed");
//! assert!(stored.audit.is_stamped());
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, PagingConfig, SessionConfig};
use crate::entity::Entity;
use crate::health::SessionHealth;
use crate::repository::{EntityRepository, RepositoryError, RepositoryOperation, RepositoryResult};
use crate::session::Session;
use crate::storage::{StorageEngine, TransactionId};
use crate::tracking::{ChangeSummary, ChangeTracker, EntityState};

/// Coordinator for repositories, change tracking and commits
pub struct UnitOfWork {
    session: Session,
    clock: Arc<dyn Clock>,
}

impl UnitOfWork {
    /// Unit of work over `engine` with default settings and the system clock
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self::with_settings(engine, SessionConfig::default(), PagingConfig::default())
    }

    /// Unit of work over `engine` using the `session` and `paging` sections
    pub fn from_config(engine: Arc<dyn StorageEngine>, config: &Config) -> Self {
        Self::with_settings(engine, config.session.clone(), config.paging.clone())
    }

    fn with_settings(
        engine: Arc<dyn StorageEngine>,
        session: SessionConfig,
        paging: PagingConfig,
    ) -> Self {
        tracing::debug!(
            session = %session.name,
            engine = engine.name(),
            "unit of work created"
        );
        Self {
            session: Session::new(engine, session, paging),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source used for audit stamping
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Repository for entity type `E`
    ///
    /// A new, cheap view is built on every call; all of them share this
    /// unit of work's tracker.
    pub fn of<E: Entity>(&self) -> EntityRepository<'_, E> {
        EntityRepository::new(&self.session)
    }

    /// Flush every staged change, honouring the session cancellation token
    pub async fn commit(&self) -> RepositoryResult<u64> {
        self.commit_with(&self.session.cancel).await
    }

    /// Flush every staged change
    ///
    /// Audit fields of added and modified entities are stamped with one
    /// instant read from the clock on entry. The flush is atomic: on failure
    /// the engine error is returned and every staged entry stays tracked.
    /// On success added, modified and deleted entries leave the tracker and
    /// the affected-row count is returned. With nothing staged the engine is
    /// not called and 0 is returned.
    pub async fn commit_with(&self, cancel: &CancellationToken) -> RepositoryResult<u64> {
        if cancel.is_cancelled() {
            return Err(RepositoryError::cancelled(RepositoryOperation::Commit));
        }
        let now = self.clock.now();
        let mut tracker = self.session.tracker.lock().await;

        let summary = tracker.summary();
        if summary.pending() == 0 {
            tracing::debug!(session = %self.session.config.name, "nothing to commit");
            return Ok(0);
        }

        let stamped = stamp_audit_fields(&mut tracker, now);
        let changes = tracker.pending_changes().map_err(|e| {
            RepositoryError::serialization_error(RepositoryOperation::Commit, e.to_string())
        })?;
        let transaction = self.session.transaction();

        let span = tracing::info_span!(
            "commit",
            session = %self.session.config.name,
            engine = self.session.engine.name(),
            added = summary.added,
            modified = summary.modified,
            deleted = summary.deleted,
            stamped,
            transaction = ?transaction,
        );

        let result = self
            .session
            .engine
            .flush(transaction, changes, cancel)
            .instrument(span.clone())
            .await;

        match result {
            Ok(affected) => {
                tracker.accept_changes();
                span.in_scope(|| tracing::info!(affected, "changes committed"));
                Ok(affected)
            }
            Err(err) => {
                span.in_scope(|| tracing::error!(error = %err, "commit failed"));
                Err(RepositoryError::from(err).with_operation(RepositoryOperation::Commit))
            }
        }
    }

    /// Open an explicit transaction spanning any number of commits
    ///
    /// Only one transaction may be open per unit of work. The returned
    /// handle must be committed or rolled back; dropping it discards the
    /// transaction.
    pub async fn begin_transaction(&self) -> RepositoryResult<Transaction<'_>> {
        if let Some(open) = self.session.transaction() {
            return Err(already_open(open));
        }

        let id = self
            .session
            .engine
            .begin_transaction(&self.session.cancel)
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::BeginTransaction))?;

        if let Err(open) = self.session.claim_transaction(id) {
            self.session.engine.discard_transaction(id);
            return Err(already_open(open));
        }

        tracing::info!(
            session = %self.session.config.name,
            transaction = %id,
            "transaction started"
        );
        Ok(Transaction {
            session: &self.session,
            id,
            completed: false,
        })
    }

    /// Id of the open explicit transaction, if any
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.session.transaction()
    }

    /// Probe the engine; any failure or timeout yields `false`
    pub async fn check_connectivity(&self) -> bool {
        self.probe().await.is_some()
    }

    /// Snapshot of engine reachability and tracker contents
    pub async fn health(&self) -> SessionHealth {
        let latency = self.probe().await;
        let (tracked_entries, pending) = {
            let tracker = self.session.tracker.lock().await;
            (tracker.len(), tracker.summary())
        };

        SessionHealth {
            session: self.session.config.name.clone(),
            engine: self.session.engine.name().to_string(),
            reachable: latency.is_some(),
            latency_ms: latency.map(|elapsed| elapsed.as_millis() as u64),
            tracked_entries,
            pending,
            in_transaction: self.session.transaction().is_some(),
        }
    }

    async fn probe(&self) -> Option<std::time::Duration> {
        let started = Instant::now();
        let timeout = self.session.config.connectivity_timeout();
        match tokio::time::timeout(timeout, self.session.engine.ping(&self.session.cancel)).await {
            Ok(Ok(())) => Some(started.elapsed()),
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "connectivity probe failed");
                None
            }
            Err(_) => {
                tracing::debug!(timeout_ms = timeout.as_millis() as u64, "connectivity probe timed out");
                None
            }
        }
    }

    /// Whether any staged change awaits commit
    pub async fn has_changes(&self) -> bool {
        self.session.tracker.lock().await.has_changes()
    }

    /// Counts of tracked entries per state
    pub async fn pending_changes(&self) -> ChangeSummary {
        self.session.tracker.lock().await.summary()
    }

    /// Forget every tracked entity, discarding staged changes
    pub async fn clear_tracking(&self) {
        let mut tracker = self.session.tracker.lock().await;
        let discarded = tracker.summary().pending();
        tracker.clear();
        tracing::debug!(discarded, "tracking cleared");
    }

    /// Session-wide cancellation token
    ///
    /// Cancelling it fails every later storage call of this unit of work
    /// with `Cancelled`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.session.cancel.clone()
    }

    /// Release the session now instead of at end of scope
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.session.cancel.cancel();
        let discarded = match self.session.tracker.try_lock() {
            Ok(mut tracker) => {
                let pending = tracker.summary().pending();
                tracker.clear();
                pending
            }
            Err(_) => 0,
        };
        tracing::debug!(
            session = %self.session.config.name,
            discarded,
            "unit of work released"
        );
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("session", &self.session)
            .finish()
    }
}

fn already_open(open: TransactionId) -> RepositoryError {
    RepositoryError::transaction_state(
        RepositoryOperation::BeginTransaction,
        format!("Transaction {} is already open", open),
    )
}

/// Stamp audit fields of pending entries with the commit instant
///
/// Added entries get `created_at = updated_at = now` and `is_deleted = false`;
/// modified entries get `updated_at = now`. Returns how many were stamped.
fn stamp_audit_fields(tracker: &mut ChangeTracker, now: DateTime<Utc>) -> usize {
    let mut stamped = 0;
    for (state, entity) in tracker.pending_entries_mut() {
        let Some(audit) = entity.audit_mut() else {
            continue;
        };
        match state {
            EntityState::Added => audit.stamp_added(now),
            EntityState::Modified => audit.stamp_modified(now),
            _ => continue,
        }
        stamped += 1;
    }
    stamped
}

/// Handle to an explicit transaction
///
/// Consumed by [`commit`](Transaction::commit) or
/// [`rollback`](Transaction::rollback). Dropping an unfinished handle logs a
/// warning and discards the transaction on the engine.
#[must_use = "an unfinished transaction is discarded when dropped"]
pub struct Transaction<'u> {
    session: &'u Session,
    id: TransactionId,
    completed: bool,
}

impl Transaction<'_> {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Make every commit flushed inside the transaction durable
    pub async fn commit(mut self) -> RepositoryResult<()> {
        let result = self.session.engine.commit_transaction(self.id).await;
        self.completed = true;
        self.session.release_transaction(self.id);
        match result {
            Ok(()) => {
                tracing::info!(transaction = %self.id, "transaction committed");
                Ok(())
            }
            Err(err) => {
                self.session.engine.discard_transaction(self.id);
                tracing::error!(transaction = %self.id, error = %err, "transaction commit failed");
                Err(RepositoryError::from(err).with_operation(RepositoryOperation::CommitTransaction))
            }
        }
    }

    /// Throw away every commit flushed inside the transaction
    ///
    /// Entities attached while the transaction was open stay tracked; call
    /// [`UnitOfWork::clear_tracking`] to drop them.
    pub async fn rollback(mut self) -> RepositoryResult<()> {
        let result = self.session.engine.rollback_transaction(self.id).await;
        self.completed = true;
        self.session.release_transaction(self.id);
        match result {
            Ok(()) => {
                tracing::info!(transaction = %self.id, "transaction rolled back");
                Ok(())
            }
            Err(err) => {
                self.session.engine.discard_transaction(self.id);
                tracing::error!(transaction = %self.id, error = %err, "transaction rollback failed");
                Err(RepositoryError::from(err)
                    .with_operation(RepositoryOperation::RollbackTransaction))
            }
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        tracing::warn!(
            transaction = %self.id,
            "transaction dropped without commit or rollback, discarding"
        );
        self.session.engine.discard_transaction(self.id);
        self.session.release_transaction(self.id);
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("completed", &self.completed)
            .finish()
    }
}
