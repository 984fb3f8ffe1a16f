//! In-process storage engine
//!
//! Keeps every entity set as an ordered map of key to JSON document. Flushes
//! are applied to a copy and swapped in only when every change succeeded,
//! which gives the same all-or-nothing behaviour as a database transaction.
//! Explicit transactions read and write a private view of the committed
//! state and keep a log of the changes flushed into it. Commit replays that
//! log onto the current committed state, so rows other sessions committed
//! meanwhile are kept and conflicting writes fail the commit.
//!
//! Intended for tests and embedding. Not optimized for large data sets.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{
    Document, RowChange, StorageEngine, StorageError, StorageOperation, StorageResult,
    StoredDocument, TransactionId,
};

type Sets = HashMap<String, BTreeMap<String, Document>>;

#[derive(Debug, Default)]
struct MemoryState {
    committed: Sets,
    transactions: HashMap<TransactionId, OpenTransaction>,
}

#[derive(Debug)]
struct OpenTransaction {
    /// Committed state at begin plus this transaction's own writes
    view: Sets,
    /// Changes flushed into the transaction, in order
    log: Vec<RowChange>,
}

/// In-memory document store
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use generic_repository::storage::{MemoryEngine, StorageEngine};
///
/// let engine = Arc::new(MemoryEngine::new());
/// assert_eq!(engine.name(), "memory");
/// assert_eq!(engine.document_count("orders"), 0);
/// ```
#[derive(Debug)]
pub struct MemoryEngine {
    name: String,
    state: RwLock<MemoryState>,
    available: AtomicBool,
    flushes: AtomicU64,
}

impl MemoryEngine {
    /// Create an empty, reachable engine
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Create an empty engine with a custom name for logs
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(MemoryState::default()),
            available: AtomicBool::new(true),
            flushes: AtomicU64::new(0),
        }
    }

    /// Simulate the engine going down or coming back
    ///
    /// While unavailable every operation fails with `ConnectionFailed`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether the engine currently accepts operations
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of committed documents in a set
    pub fn document_count(&self, set: &str) -> usize {
        self.read_state()
            .map(|state| state.committed.get(set).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Committed document stored under `key`, bypassing any transaction
    pub fn committed_document(&self, set: &str, key: &str) -> Option<Document> {
        self.read_state()
            .ok()
            .and_then(|state| state.committed.get(set).and_then(|rows| rows.get(key).cloned()))
    }

    /// Number of successful flushes so far
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Number of explicit transactions currently open
    pub fn open_transactions(&self) -> usize {
        self.read_state()
            .map(|state| state.transactions.len())
            .unwrap_or(0)
    }

    fn ensure_ready(
        &self,
        operation: StorageOperation,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        if cancel.is_cancelled() {
            return Err(StorageError::cancelled(operation));
        }
        if !self.is_available() {
            return Err(StorageError::connection_failed(
                operation,
                format!("Engine '{}' is unavailable", self.name),
            ));
        }
        Ok(())
    }

    fn read_state(&self) -> StorageResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| StorageError::query_failed(StorageOperation::Scan, "lock poisoned"))
    }

    fn write_state(&self) -> StorageResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| StorageError::query_failed(StorageOperation::Flush, "lock poisoned"))
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn visible_sets<'a>(
    state: &'a MemoryState,
    tx: Option<TransactionId>,
    operation: StorageOperation,
) -> StorageResult<&'a Sets> {
    match tx {
        Some(id) => state
            .transactions
            .get(&id)
            .map(|open| &open.view)
            .ok_or_else(|| {
                StorageError::transaction_failed(format!("Unknown transaction {}", id))
                    .add_context(operation.to_string())
            }),
        None => Ok(&state.committed),
    }
}

/// Apply every change to a copy of `target` and swap it in only if all succeed
fn apply_all(target: &mut Sets, changes: impl IntoIterator<Item = RowChange>) -> StorageResult<u64> {
    let mut working = target.clone();
    let mut affected = 0_u64;
    for change in changes {
        apply_change(&mut working, change)?;
        affected += 1;
    }
    *target = working;
    Ok(affected)
}

fn apply_change(sets: &mut Sets, change: RowChange) -> StorageResult<()> {
    match change {
        RowChange::Insert { set, key, document } => {
            let rows = sets.entry(set.clone()).or_default();
            if rows.contains_key(&key) {
                return Err(StorageError::constraint_violation("Duplicate primary key")
                    .add_context(format!("{}/{}", set, key)));
            }
            rows.insert(key, document);
        }
        RowChange::Update { set, key, document } => {
            match sets.get_mut(&set).and_then(|rows| rows.get_mut(&key)) {
                Some(row) => *row = document,
                None => {
                    return Err(StorageError::concurrency(
                        "Update expected to affect 1 row but affected 0",
                    )
                    .add_context(format!("{}/{}", set, key)))
                }
            }
        }
        RowChange::Delete { set, key } => {
            if sets.get_mut(&set).and_then(|rows| rows.remove(&key)).is_none() {
                return Err(StorageError::concurrency(
                    "Delete expected to affect 1 row but affected 0",
                )
                .add_context(format!("{}/{}", set, key)));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        tx: Option<TransactionId>,
        set: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<Option<Document>> {
        self.ensure_ready(StorageOperation::Fetch, cancel)?;
        let state = self.read_state()?;
        let sets = visible_sets(&state, tx, StorageOperation::Fetch)?;
        Ok(sets.get(set).and_then(|rows| rows.get(key).cloned()))
    }

    async fn scan(
        &self,
        tx: Option<TransactionId>,
        set: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<Vec<StoredDocument>> {
        self.ensure_ready(StorageOperation::Scan, cancel)?;
        let state = self.read_state()?;
        let sets = visible_sets(&state, tx, StorageOperation::Scan)?;
        Ok(sets
            .get(set)
            .map(|rows| {
                rows.iter()
                    .map(|(key, document)| StoredDocument {
                        key: key.clone(),
                        document: document.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn flush(
        &self,
        tx: Option<TransactionId>,
        changes: Vec<RowChange>,
        cancel: &CancellationToken,
    ) -> StorageResult<u64> {
        self.ensure_ready(StorageOperation::Flush, cancel)?;
        let mut guard = self.write_state()?;
        let state = &mut *guard;

        let affected = match tx {
            Some(id) => {
                let open = state.transactions.get_mut(&id).ok_or_else(|| {
                    StorageError::transaction_failed(format!("Unknown transaction {}", id))
                })?;
                let affected = apply_all(&mut open.view, changes.iter().cloned())?;
                open.log.extend(changes);
                affected
            }
            None => apply_all(&mut state.committed, changes)?,
        };

        self.flushes.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(engine = %self.name, affected, "memory flush applied");
        Ok(affected)
    }

    async fn begin_transaction(&self, cancel: &CancellationToken) -> StorageResult<TransactionId> {
        self.ensure_ready(StorageOperation::Transaction, cancel)?;
        let mut state = self.write_state()?;
        let id = TransactionId::new();
        let view = state.committed.clone();
        state.transactions.insert(
            id,
            OpenTransaction {
                view,
                log: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn commit_transaction(&self, tx: TransactionId) -> StorageResult<()> {
        self.ensure_ready(StorageOperation::Transaction, &CancellationToken::new())?;
        let mut state = self.write_state()?;
        let open = state.transactions.remove(&tx).ok_or_else(|| {
            StorageError::transaction_failed(format!("Unknown transaction {}", tx))
        })?;
        let replayed = open.log.len();
        apply_all(&mut state.committed, open.log)
            .map_err(|e| e.add_context(format!("commit of {}", tx)))?;
        tracing::trace!(engine = %self.name, transaction = %tx, replayed, "memory transaction committed");
        Ok(())
    }

    async fn rollback_transaction(&self, tx: TransactionId) -> StorageResult<()> {
        let mut state = self.write_state()?;
        state.transactions.remove(&tx).ok_or_else(|| {
            StorageError::transaction_failed(format!("Unknown transaction {}", tx))
        })?;
        Ok(())
    }

    fn discard_transaction(&self, tx: TransactionId) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.transactions.remove(&tx);
    }

    async fn ping(&self, cancel: &CancellationToken) -> StorageResult<()> {
        self.ensure_ready(StorageOperation::Ping, cancel)
    }
}
