//! Storage engine contract
//!
//! The unit of work never talks to a database directly. It stages changes in
//! its own tracker and hands an engine three kinds of requests: reads
//! (`fetch`, `scan`), one atomic write batch per commit (`flush`), and
//! transaction boundaries. Anything that can do those over JSON documents
//! keyed by string can back a unit of work.
//!
//! Two engines ship with the crate:
//!
//! - [`MemoryEngine`]: in-process store for tests and embedding
//! - `LibsqlEngine` (feature `turso`): documents in libsql/SQLite tables

mod error;
pub mod memory;

#[cfg(feature = "turso")]
pub mod turso;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use error::{StorageError, StorageErrorKind, StorageOperation, StorageResult};
pub use memory::MemoryEngine;

#[cfg(feature = "turso")]
pub use turso::LibsqlEngine;

/// Stored representation of an entity
pub type Document = Value;

/// Identifier of an explicit transaction opened on an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Allocate a fresh, time-ordered transaction id
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx_{}", self.0.simple())
    }
}

/// A document read back from an entity set together with its key
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Canonical key string
    pub key: String,
    /// Document body
    pub document: Document,
}

/// One staged write
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    /// New row; fails if the key already exists
    Insert {
        set: String,
        key: String,
        document: Document,
    },
    /// Full replacement of an existing row; fails if the key is missing
    Update {
        set: String,
        key: String,
        document: Document,
    },
    /// Removal of an existing row; fails if the key is missing
    Delete { set: String, key: String },
}

impl RowChange {
    /// Entity set the change targets
    pub fn set(&self) -> &str {
        match self {
            Self::Insert { set, .. } | Self::Update { set, .. } | Self::Delete { set, .. } => set,
        }
    }

    /// Key of the row the change targets
    pub fn key(&self) -> &str {
        match self {
            Self::Insert { key, .. } | Self::Update { key, .. } | Self::Delete { key, .. } => key,
        }
    }
}

impl fmt::Display for RowChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        };
        write!(f, "{} {}/{}", verb, self.set(), self.key())
    }
}

/// Backend that persists entity documents
///
/// Every call that touches storage receives the caller's cancellation
/// token; engines check it before doing work and, where they can, while
/// waiting on I/O. `tx` is the explicit transaction the session currently
/// has open, if any; reads and writes issued with it must observe and land
/// in that transaction.
#[async_trait]
pub trait StorageEngine: Send + Sync + fmt::Debug {
    /// Short engine name for logs and health output
    fn name(&self) -> &str;

    /// Read one document by key
    async fn fetch(
        &self,
        tx: Option<TransactionId>,
        set: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<Option<Document>>;

    /// Read every document of an entity set
    async fn scan(
        &self,
        tx: Option<TransactionId>,
        set: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<Vec<StoredDocument>>;

    /// Apply a batch of changes atomically, returning the affected row count
    ///
    /// Either every change is applied or none is.
    async fn flush(
        &self,
        tx: Option<TransactionId>,
        changes: Vec<RowChange>,
        cancel: &CancellationToken,
    ) -> StorageResult<u64>;

    /// Open an explicit transaction
    async fn begin_transaction(&self, cancel: &CancellationToken) -> StorageResult<TransactionId>;

    /// Make an explicit transaction's writes durable
    async fn commit_transaction(&self, tx: TransactionId) -> StorageResult<()>;

    /// Throw away an explicit transaction's writes
    async fn rollback_transaction(&self, tx: TransactionId) -> StorageResult<()>;

    /// Best-effort rollback from a synchronous context (drop paths)
    fn discard_transaction(&self, tx: TransactionId);

    /// Connectivity probe
    async fn ping(&self, cancel: &CancellationToken) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transaction_ids_are_unique() {
        let first = TransactionId::new();
        let second = TransactionId::new();
        assert_ne!(first, second);
        assert!(first.to_string().starts_with("tx_"));
    }

    #[test]
    fn test_row_change_accessors() {
        let change = RowChange::Insert {
            set: "orders".to_string(),
            key: "1".to_string(),
            document: json!({"id": 1}),
        };
        assert_eq!(change.set(), "orders");
        assert_eq!(change.key(), "1");
        assert_eq!(change.to_string(), "insert orders/1");

        let change = RowChange::Delete {
            set: "orders".to_string(),
            key: "2".to_string(),
        };
        assert_eq!(change.to_string(), "delete orders/2");
    }
}
