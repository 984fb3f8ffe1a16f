//! Generic repositories over entity sets
//!
//! # Features
//!
//! - **Contract**: [`Repository`] trait with lookup and staging operations
//! - **Session-bound implementation**: [`EntityRepository`], handed out by
//!   [`UnitOfWork::of`](crate::UnitOfWork::of)
//! - **Queries**: [`Query`] with predicates, ordering, include paths,
//!   skip/take and no-tracking reads
//! - **Paging**: [`PagedList`] with derived navigation metadata
//! - **Errors**: structured [`RepositoryError`]
//!
//! # Example
//!
//! ```rust,ignore
//! use generic_repository::prelude::*;
//!
//! let uow = UnitOfWork::new(Arc::new(MemoryEngine::new()));
//! let customers = uow.of::<Customer>();
//!
//! customers.add(Customer::new(1, "Ada")).await?;
//! uow.commit().await?;
//!
//! let page = customers
//!     .page(1, Some(20), ListOptions::new().order_by(|c: &Customer| c.name.clone()))
//!     .await?;
//! ```

mod entity_repository;
mod error;
mod pagination;
mod query;
mod traits;

pub use entity_repository::EntityRepository;
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use pagination::{OrderDirection, PagedList, Pagination};
pub use query::{Filter, ListOptions, Query, SortKey};
pub use traits::{Repository, RepositoryResult};
