//! Crate-level error type
//!
//! Repository and unit-of-work operations return the structured
//! [`RepositoryError`]; engines return [`StorageError`]. This type wraps both
//! together with configuration and I/O failures for host wiring such as
//! [`Config::load`](crate::config::Config::load) and engine bootstrap.

use thiserror::Error;

use crate::repository::RepositoryError;
use crate::storage::StorageError;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for configuration, bootstrap and data access
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Structured repository error
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    /// Structured storage engine error
    #[error("{0}")]
    Storage(#[from] StorageError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{RepositoryErrorKind, RepositoryOperation};

    #[test]
    fn test_repository_error_is_transparent() {
        let err: Error = RepositoryError::not_found("orders", "9").into();
        assert_eq!(
            err.to_string(),
            "Repository not_found error during find_by_id: Entity not found [orders: 9]"
        );
        match err {
            Error::Repository(inner) => assert_eq!(inner.kind, RepositoryErrorKind::NotFound),
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn test_storage_error_converts() {
        let err: Error = StorageError::concurrency("stale").into();
        assert!(matches!(err, Error::Storage(_)));
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_question_mark_lifts_repository_errors() {
        fn stage() -> Result<()> {
            Err(RepositoryError::validation_failed(
                RepositoryOperation::Add,
                "empty batch",
            ))?;
            Ok(())
        }
        assert!(matches!(stage(), Err(Error::Repository(_))));
    }
}
