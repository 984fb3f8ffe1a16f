//! Shared state behind a unit of work and its repositories

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::{PagingConfig, SessionConfig};
use crate::storage::{Document, StorageEngine, StorageResult, StoredDocument, TransactionId};
use crate::tracking::ChangeTracker;

/// One logical session: engine handle, change tracker and open transaction
pub(crate) struct Session {
    pub(crate) engine: Arc<dyn StorageEngine>,
    pub(crate) tracker: Mutex<ChangeTracker>,
    pub(crate) cancel: CancellationToken,
    pub(crate) config: SessionConfig,
    pub(crate) paging: PagingConfig,
    // never held across an await
    transaction: StdMutex<Option<TransactionId>>,
}

impl Session {
    pub(crate) fn new(
        engine: Arc<dyn StorageEngine>,
        config: SessionConfig,
        paging: PagingConfig,
    ) -> Self {
        Self {
            engine,
            tracker: Mutex::new(ChangeTracker::new()),
            cancel: CancellationToken::new(),
            config,
            paging,
            transaction: StdMutex::new(None),
        }
    }

    /// Explicit transaction currently open on this session
    pub(crate) fn transaction(&self) -> Option<TransactionId> {
        *self
            .transaction
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `id` as the open transaction unless one is already recorded
    ///
    /// Returns the transaction that was already open on conflict.
    pub(crate) fn claim_transaction(&self, id: TransactionId) -> Result<(), TransactionId> {
        let mut slot = self
            .transaction
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *slot {
            Some(open) => Err(open),
            None => {
                *slot = Some(id);
                Ok(())
            }
        }
    }

    /// Clear the open transaction if it is `id`
    pub(crate) fn release_transaction(&self, id: TransactionId) {
        let mut slot = self
            .transaction
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *slot == Some(id) {
            *slot = None;
        }
    }

    pub(crate) async fn fetch(&self, set: &str, key: &str) -> StorageResult<Option<Document>> {
        self.engine
            .fetch(self.transaction(), set, key, &self.cancel)
            .await
    }

    pub(crate) async fn scan(&self, set: &str) -> StorageResult<Vec<StoredDocument>> {
        self.engine.scan(self.transaction(), set, &self.cancel).await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.config.name)
            .field("engine", &self.engine.name())
            .field("transaction", &self.transaction())
            .finish()
    }
}
