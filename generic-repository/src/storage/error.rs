//! Storage engine error types

use std::fmt;

/// Engine operation being performed when the error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOperation {
    /// Establishing a connection
    Connect,
    /// Fetching one document by key
    Fetch,
    /// Reading every document of a set
    Scan,
    /// Writing a batch of changes
    Flush,
    /// Transaction operations (begin, commit, rollback)
    Transaction,
    /// Connectivity probe
    Ping,
}

impl fmt::Display for StorageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Fetch => write!(f, "fetch"),
            Self::Scan => write!(f, "scan"),
            Self::Flush => write!(f, "flush"),
            Self::Transaction => write!(f, "transaction"),
            Self::Ping => write!(f, "ping"),
        }
    }
}

/// Category of storage error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageErrorKind {
    /// Engine unreachable
    ConnectionFailed,
    /// Unique or key constraint rejected a write
    ConstraintViolation,
    /// Update or delete matched no stored row
    Concurrency,
    /// Query execution failed
    QueryFailed,
    /// Transaction begin, commit or rollback failed
    TransactionFailed,
    /// Stored data could not be converted
    TypeConversion,
    /// Caller cancelled the operation
    Cancelled,
    /// Operation timed out
    Timeout,
    /// Other/unknown error
    Other,
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::Concurrency => write!(f, "concurrency"),
            Self::QueryFailed => write!(f, "query_failed"),
            Self::TransactionFailed => write!(f, "transaction_failed"),
            Self::TypeConversion => write!(f, "type_conversion"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Timeout => write!(f, "timeout"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured storage error with operation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageError {
    /// The operation being performed when the error occurred
    pub operation: StorageOperation,
    /// The category of error
    pub kind: StorageErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Additional context (e.g., entity set, key)
    pub context: Option<String>,
}

impl StorageError {
    /// Create a new storage error
    pub fn new(
        operation: StorageOperation,
        kind: StorageErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// Create a connection failed error
    pub fn connection_failed(operation: StorageOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StorageErrorKind::ConnectionFailed, message)
    }

    /// Create a constraint violation error
    pub fn constraint_violation(message: impl Into<String>) -> Self {
        Self::new(
            StorageOperation::Flush,
            StorageErrorKind::ConstraintViolation,
            message,
        )
    }

    /// Create a concurrency conflict error (write matched no row)
    pub fn concurrency(message: impl Into<String>) -> Self {
        Self::new(StorageOperation::Flush, StorageErrorKind::Concurrency, message)
    }

    /// Create a query failed error
    pub fn query_failed(operation: StorageOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StorageErrorKind::QueryFailed, message)
    }

    /// Create a transaction failed error
    pub fn transaction_failed(message: impl Into<String>) -> Self {
        Self::new(
            StorageOperation::Transaction,
            StorageErrorKind::TransactionFailed,
            message,
        )
    }

    /// Create a cancellation error
    pub fn cancelled(operation: StorageOperation) -> Self {
        Self::new(
            operation,
            StorageErrorKind::Cancelled,
            "Operation cancelled by caller",
        )
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            StorageErrorKind::ConnectionFailed | StorageErrorKind::Timeout
        )
    }

    /// Add context to an existing error
    #[must_use]
    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Storage {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let Some(ref ctx) = self.context {
            write!(f, " [context: {}]", ctx)?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {}

/// Result type for storage engine operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_context() {
        let error = StorageError::constraint_violation("duplicate key")
            .add_context("orders/\"ord-1\"");
        let display = error.to_string();
        assert!(display.contains("constraint_violation"));
        assert!(display.contains("flush"));
        assert!(display.contains("[context: orders/\"ord-1\"]"));
    }

    #[test]
    fn test_display_without_context() {
        let error = StorageError::cancelled(StorageOperation::Scan);
        let display = error.to_string();
        assert!(display.contains("cancelled"));
        assert!(display.contains("scan"));
        assert!(!display.contains("[context"));
    }

    #[test]
    fn test_retriable_kinds() {
        assert!(StorageError::connection_failed(StorageOperation::Ping, "down").is_retriable());
        assert!(!StorageError::concurrency("stale").is_retriable());
        assert!(!StorageError::transaction_failed("nested").is_retriable());
    }
}
