//! Repository trait definitions
//!
//! The trait uses RPITIT (Return Position Impl Trait In Traits), available
//! since Rust 1.75, so implementations can be written with plain `async fn`.
//!
//! Two failure policies coexist:
//!
//! - read-shaped lookups (`find_first`, `find_by_name`, `list_all`) return
//!   `Option` and map every failure to `None` after logging it;
//! - `find_by_id` and every mutation return [`RepositoryResult`] and
//!   propagate failures unchanged.
//!
//! Mutations only stage changes. Nothing is written until the owning unit of
//! work commits.

use std::future::Future;

use super::error::RepositoryError;
use super::query::{Filter, ListOptions};
use crate::entity::Entity;

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Query and mutation contract for one entity type
///
/// # Example
///
/// ```rust,ignore
/// use generic_repository::repository::{ListOptions, Repository};
///
/// async fn rename<R: Repository<Customer>>(repo: &R, id: u64, name: &str) -> RepositoryResult<()> {
///     if let Some(mut customer) = repo.find_by_id(&id).await? {
///         customer.name = name.to_string();
///         repo.update(customer).await?;
///     }
///     Ok(())
/// }
/// ```
pub trait Repository<E: Entity>: Send + Sync {
    /// First entity matching `filter` (or any entity), `None` on any failure
    fn find_first(&self, filter: Option<Filter<E>>) -> impl Future<Output = Option<E>> + Send;

    /// Entity with the given key
    ///
    /// Entities already tracked by the session are returned from the
    /// tracker; an entity staged for deletion reads as `None`.
    fn find_by_id(&self, id: &E::Key)
        -> impl Future<Output = RepositoryResult<Option<E>>> + Send;

    /// First entity whose name attribute equals `name`
    ///
    /// Types without a name attribute always yield `None`.
    fn find_by_name(&self, name: &str) -> impl Future<Output = Option<E>> + Send;

    /// Entities matching `options`, `None` on any failure
    fn list_all(&self, options: ListOptions<E>) -> impl Future<Output = Option<Vec<E>>> + Send;

    /// Stage a new entity for insert
    fn add(&self, entity: E) -> impl Future<Output = RepositoryResult<E>> + Send;

    /// Stage several new entities, returning the last one
    fn add_range(&self, entities: Vec<E>) -> impl Future<Output = RepositoryResult<E>> + Send;

    /// Stage a full-document update
    fn update(&self, entity: E) -> impl Future<Output = RepositoryResult<E>> + Send;

    /// Stage deletion of the entity with the given key
    fn remove_by_id(&self, id: &E::Key) -> impl Future<Output = RepositoryResult<E>> + Send;

    /// Stage deletion of an entity
    fn remove(&self, entity: E) -> impl Future<Output = RepositoryResult<E>> + Send;

    /// Stage deletion of several entities, returning the last one
    fn remove_range(&self, entities: Vec<E>) -> impl Future<Output = RepositoryResult<E>> + Send;
}
