//! Repository error types
//!
//! Structured errors for repository and unit-of-work operations. Each error
//! records what was being attempted, what category of failure occurred and,
//! when known, which entity was involved.
//!
//! # Example
//!
//! ```rust
//! use generic_repository::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
//!
//! let error = RepositoryError::not_found("orders", "42");
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert_eq!(error.operation, RepositoryOperation::FindById);
//! ```

use std::fmt;

use crate::storage::{StorageError, StorageErrorKind};

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Looking up a single entity by key
    FindById,
    /// First entity matching an optional predicate
    FindFirst,
    /// Lookup by the name attribute
    FindByName,
    /// Filtered, ordered listing
    ListAll,
    /// Full materialization of an entity set
    Records,
    /// Executing a composed query
    Query,
    /// Fetching one page of results
    Page,
    /// Counting entities
    Count,
    /// Checking if an entity exists
    Exists,
    /// Staging an insert
    Add,
    /// Staging a full update
    Update,
    /// Staging a delete
    Remove,
    /// Eager-loading navigation data
    Include,
    /// Flushing staged changes
    Commit,
    /// Opening an explicit transaction
    BeginTransaction,
    /// Committing an explicit transaction
    CommitTransaction,
    /// Rolling back an explicit transaction
    RollbackTransaction,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FindById => write!(f, "find_by_id"),
            Self::FindFirst => write!(f, "find_first"),
            Self::FindByName => write!(f, "find_by_name"),
            Self::ListAll => write!(f, "list_all"),
            Self::Records => write!(f, "records"),
            Self::Query => write!(f, "query"),
            Self::Page => write!(f, "page"),
            Self::Count => write!(f, "count"),
            Self::Exists => write!(f, "exists"),
            Self::Add => write!(f, "add"),
            Self::Update => write!(f, "update"),
            Self::Remove => write!(f, "remove"),
            Self::Include => write!(f, "include"),
            Self::Commit => write!(f, "commit"),
            Self::BeginTransaction => write!(f, "begin_transaction"),
            Self::CommitTransaction => write!(f, "commit_transaction"),
            Self::RollbackTransaction => write!(f, "rollback_transaction"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Entity was not found
    NotFound,
    /// Entity already exists (duplicate key)
    AlreadyExists,
    /// Storage constraint violation
    ConstraintViolation,
    /// A staged update or delete matched no stored row
    Concurrency,
    /// Validation failed before touching storage
    ValidationFailed,
    /// The entity type lacks a capability the operation needs
    UnsupportedShape,
    /// Failed to reach the storage engine
    ConnectionFailed,
    /// Operation timed out
    Timeout,
    /// Caller cancelled the operation
    Cancelled,
    /// Transaction begun twice, or used after completion
    TransactionState,
    /// Underlying storage error
    DatabaseError,
    /// Serialization or deserialization error
    SerializationError,
    /// Other unclassified error
    Other,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::AlreadyExists => write!(f, "already_exists"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::Concurrency => write!(f, "concurrency"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::UnsupportedShape => write!(f, "unsupported_shape"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::TransactionState => write!(f, "transaction_state"),
            Self::DatabaseError => write!(f, "database_error"),
            Self::SerializationError => write!(f, "serialization_error"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured repository error with operation context
///
/// # Example
///
/// ```rust
/// use generic_repository::repository::RepositoryError;
///
/// let error = RepositoryError::not_found("orders", "42");
/// assert_eq!(
///     error.to_string(),
///     "Repository not_found error during find_by_id: Entity not found [orders: 42]"
/// );
/// assert!(!error.is_retriable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The entity set involved (e.g., "orders")
    pub entity_type: Option<String>,
    /// The canonical key of the entity involved
    pub entity_id: Option<String>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create a "not found" error with entity context
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::FindById,
            RepositoryErrorKind::NotFound,
            "Entity not found",
        )
        .with_entity(entity_type, entity_id)
    }

    /// Create an "already exists" error with entity context
    pub fn already_exists(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Add,
            RepositoryErrorKind::AlreadyExists,
            "Entity with the same key is already tracked",
        )
        .with_entity(entity_type, entity_id)
    }

    /// Create a validation failed error
    ///
    /// ```rust
    /// use generic_repository::repository::{RepositoryError, RepositoryOperation};
    ///
    /// let error = RepositoryError::validation_failed(RepositoryOperation::Page, "page_size must be > 0");
    /// assert_eq!(error.operation, RepositoryOperation::Page);
    /// ```
    pub fn validation_failed(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::ValidationFailed, message)
    }

    /// Create an unsupported shape error
    pub fn unsupported_shape(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::UnsupportedShape, message)
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Query,
            RepositoryErrorKind::ConnectionFailed,
            message,
        )
    }

    /// Create a timeout error
    pub fn timeout(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Timeout, message)
    }

    /// Create a cancellation error
    pub fn cancelled(operation: RepositoryOperation) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::Cancelled,
            "Operation cancelled by caller",
        )
    }

    /// Create a transaction state error
    pub fn transaction_state(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::TransactionState, message)
    }

    /// Create a database error
    pub fn database_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::DatabaseError, message)
    }

    /// Create a serialization error
    pub fn serialization_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::SerializationError, message)
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Add the entity set without a key
    #[must_use]
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionFailed | RepositoryErrorKind::Timeout
        )
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        match (&self.entity_type, &self.entity_id) {
            (Some(entity_type), Some(entity_id)) => write!(f, " [{}: {}]", entity_type, entity_id)?,
            (Some(entity_type), None) => write!(f, " [{}]", entity_type)?,
            _ => {}
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

/// Storage errors keep their message; the operation defaults to `Query`
/// and is normally overridden with [`RepositoryError::with_operation`].
impl From<StorageError> for RepositoryError {
    fn from(err: StorageError) -> Self {
        let kind = match err.kind {
            StorageErrorKind::ConnectionFailed => RepositoryErrorKind::ConnectionFailed,
            StorageErrorKind::ConstraintViolation => RepositoryErrorKind::ConstraintViolation,
            StorageErrorKind::Concurrency => RepositoryErrorKind::Concurrency,
            StorageErrorKind::TransactionFailed => RepositoryErrorKind::TransactionState,
            StorageErrorKind::TypeConversion => RepositoryErrorKind::SerializationError,
            StorageErrorKind::Cancelled => RepositoryErrorKind::Cancelled,
            StorageErrorKind::Timeout => RepositoryErrorKind::Timeout,
            StorageErrorKind::QueryFailed => RepositoryErrorKind::DatabaseError,
            StorageErrorKind::Other => RepositoryErrorKind::Other,
        };
        let mut error = Self::new(RepositoryOperation::Query, kind, err.message);
        if let Some(context) = err.context {
            error.message = format!("{} ({})", error.message, context);
        }
        error
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_error(RepositoryOperation::Query, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageOperation;

    #[test]
    fn test_repository_operation_display() {
        assert_eq!(format!("{}", RepositoryOperation::FindById), "find_by_id");
        assert_eq!(format!("{}", RepositoryOperation::FindByName), "find_by_name");
        assert_eq!(format!("{}", RepositoryOperation::ListAll), "list_all");
        assert_eq!(format!("{}", RepositoryOperation::Remove), "remove");
        assert_eq!(format!("{}", RepositoryOperation::Commit), "commit");
        assert_eq!(
            format!("{}", RepositoryOperation::BeginTransaction),
            "begin_transaction"
        );
    }

    #[test]
    fn test_repository_error_kind_display() {
        assert_eq!(format!("{}", RepositoryErrorKind::NotFound), "not_found");
        assert_eq!(
            format!("{}", RepositoryErrorKind::UnsupportedShape),
            "unsupported_shape"
        );
        assert_eq!(format!("{}", RepositoryErrorKind::Concurrency), "concurrency");
        assert_eq!(format!("{}", RepositoryErrorKind::Cancelled), "cancelled");
        assert_eq!(
            format!("{}", RepositoryErrorKind::TransactionState),
            "transaction_state"
        );
    }

    #[test]
    fn test_not_found_convenience() {
        let error = RepositoryError::not_found("orders", "42");
        assert_eq!(error.operation, RepositoryOperation::FindById);
        assert_eq!(error.kind, RepositoryErrorKind::NotFound);
        assert_eq!(error.entity_type, Some("orders".to_string()));
        assert_eq!(error.entity_id, Some("42".to_string()));
    }

    #[test]
    fn test_already_exists_convenience() {
        let error = RepositoryError::already_exists("orders", "7");
        assert_eq!(error.operation, RepositoryOperation::Add);
        assert_eq!(error.kind, RepositoryErrorKind::AlreadyExists);
    }

    #[test]
    fn test_with_operation_overrides() {
        let error = RepositoryError::not_found("orders", "1")
            .with_operation(RepositoryOperation::Remove);
        assert_eq!(error.operation, RepositoryOperation::Remove);
        assert_eq!(error.kind, RepositoryErrorKind::NotFound);
    }

    #[test]
    fn test_is_retriable() {
        assert!(RepositoryError::connection_failed("refused").is_retriable());
        assert!(RepositoryError::timeout(RepositoryOperation::Query, "slow").is_retriable());
        assert!(!RepositoryError::not_found("orders", "1").is_retriable());
        assert!(!RepositoryError::cancelled(RepositoryOperation::Commit).is_retriable());
        assert!(
            !RepositoryError::validation_failed(RepositoryOperation::Page, "bad").is_retriable()
        );
    }

    #[test]
    fn test_display_variants() {
        let error = RepositoryError::database_error(RepositoryOperation::Commit, "disk full");
        assert_eq!(
            error.to_string(),
            "Repository database_error error during commit: disk full"
        );

        let error = RepositoryError::unsupported_shape(
            RepositoryOperation::FindByName,
            "no name attribute",
        )
        .with_entity_type("lines");
        assert!(error.to_string().ends_with("[lines]"));
    }

    #[test]
    fn test_from_storage_error_maps_kind_and_keeps_message() {
        let storage = StorageError::concurrency("Update affected 0 rows");
        let error: RepositoryError = storage.into();
        assert_eq!(error.kind, RepositoryErrorKind::Concurrency);
        assert_eq!(error.message, "Update affected 0 rows");

        let storage = StorageError::constraint_violation("Duplicate primary key")
            .add_context("orders/1");
        let error: RepositoryError = storage.into();
        assert_eq!(error.kind, RepositoryErrorKind::ConstraintViolation);
        assert_eq!(error.message, "Duplicate primary key (orders/1)");

        let storage = StorageError::cancelled(StorageOperation::Flush);
        let error = RepositoryError::from(storage).with_operation(RepositoryOperation::Commit);
        assert_eq!(error.kind, RepositoryErrorKind::Cancelled);
        assert_eq!(error.operation, RepositoryOperation::Commit);
    }

    #[test]
    fn test_error_is_error_trait() {
        let error: Box<dyn std::error::Error> = Box::new(RepositoryError::not_found("orders", "1"));
        assert!(error.to_string().contains("not_found"));
    }
}
