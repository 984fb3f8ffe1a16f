//! # generic-repository
//!
//! Generic repository and unit-of-work layer over pluggable storage engines.
//!
//! ## Features
//!
//! - **Repositories**: one generic [`Repository`](repository::Repository)
//!   contract for every entity type, with lookup, listing, paging and staging
//! - **Unit of work**: a shared change tracker per session, committed in one
//!   atomic flush
//! - **Audit stamping**: creation and modification timestamps written at
//!   commit from a single instant
//! - **Queries**: predicates, ordering, include paths, skip/take and
//!   no-tracking reads with identity resolution against the tracker
//! - **Transactions**: explicit transactions spanning several commits
//! - **Engines**: in-memory engine built in, libsql/Turso behind the `turso`
//!   feature
//!
//! ## Example
//!
//! ```rust,ignore
//! use generic_repository::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let uow = UnitOfWork::from_config(Arc::new(MemoryEngine::new()), &config);
//!     let customers = uow.of::<Customer>();
//!
//!     customers.add(Customer::new(1, "Ada")).await?;
//!     uow.commit().await?;
//!
//!     let page = customers.page(1, None, ListOptions::new()).await?;
//!     println!("{} of {}", page.len(), page.total_item_count());
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod health;
pub mod observability;
pub mod repository;
mod session;
pub mod storage;
pub mod tracking;
mod unit_of_work;

pub use unit_of_work::{Transaction, UnitOfWork};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::config::{
        Config, PagingConfig, SessionConfig, TracingConfig, TursoConfig, TursoMode,
    };
    pub use crate::entity::{AuditMetadata, Entity, Navigation, NavigationKind};
    pub use crate::error::{Error, Result};
    pub use crate::health::{HealthStatus, SessionHealth};
    pub use crate::observability::init_tracing;
    pub use crate::repository::{
        EntityRepository, Filter, ListOptions, OrderDirection, PagedList, Query, Repository,
        RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult,
    };
    pub use crate::storage::{
        MemoryEngine, StorageEngine, StorageError, StorageErrorKind, TransactionId,
    };
    pub use crate::tracking::{ChangeSummary, EntityState};
    pub use crate::{Transaction, UnitOfWork};

    #[cfg(feature = "turso")]
    pub use crate::storage::LibsqlEngine;

    pub use std::sync::Arc;
    pub use tokio_util::sync::CancellationToken;
}
