//! Composable queries over an entity set
//!
//! A [`Query`] is a description of what to read: predicates, ordering,
//! navigation properties to eager-load, an offset/limit window and whether
//! results should be tracked. Nothing touches storage until one of the
//! terminal methods (`to_list`, `first`, `count`, `to_paged_list`) is
//! awaited.
//!
//! # Example
//!
//! ```rust,ignore
//! let recent = uow
//!     .of::<Order>()
//!     .query()
//!     .filter(|o: &Order| o.total_cents > 1_000)
//!     .order_by_descending(|o: &Order| o.placed_at)
//!     .include("customer")?
//!     .take(10)
//!     .to_list()
//!     .await?;
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::error::{RepositoryError, RepositoryOperation};
use super::pagination::{OrderDirection, PagedList, Pagination};
use super::RepositoryResult;
use crate::entity::{Entity, Navigation, NavigationKind};
use crate::session::Session;
use crate::storage::StoredDocument;
use crate::tracking::EntityState;

/// Predicate over entities
pub struct Filter<E> {
    predicate: Arc<dyn Fn(&E) -> bool + Send + Sync>,
}

impl<E> Filter<E> {
    pub fn new(predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    pub fn matches(&self, entity: &E) -> bool {
        (self.predicate)(entity)
    }
}

impl<E> Clone for Filter<E> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<E> fmt::Debug for Filter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Filter(..)")
    }
}

/// One ordering key with its direction
pub struct SortKey<E> {
    compare: Arc<dyn Fn(&E, &E) -> Ordering + Send + Sync>,
    direction: OrderDirection,
}

impl<E> SortKey<E> {
    fn new<K, F>(selector: F, direction: OrderDirection) -> Self
    where
        K: Ord,
        F: Fn(&E) -> K + Send + Sync + 'static,
    {
        Self {
            compare: Arc::new(move |a, b| selector(a).cmp(&selector(b))),
            direction,
        }
    }

    fn compare(&self, a: &E, b: &E) -> Ordering {
        let ordering = (self.compare)(a, b);
        match self.direction {
            OrderDirection::Ascending => ordering,
            OrderDirection::Descending => ordering.reverse(),
        }
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }
}

impl<E> Clone for SortKey<E> {
    fn clone(&self) -> Self {
        Self {
            compare: Arc::clone(&self.compare),
            direction: self.direction,
        }
    }
}

impl<E> fmt::Debug for SortKey<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SortKey({})", self.direction)
    }
}

fn compare_all<E>(keys: &[SortKey<E>], a: &E, b: &E) -> Ordering {
    keys.iter()
        .map(|key| key.compare(a, b))
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Optional filter, ordering and include paths for `list_all` and `page`
///
/// ```rust,ignore
/// let options = ListOptions::new()
///     .filter(|c: &Customer| c.active)
///     .order_by(|c: &Customer| c.name.clone())
///     .include("orders");
/// ```
pub struct ListOptions<E> {
    pub(crate) filter: Option<Filter<E>>,
    pub(crate) order: Vec<SortKey<E>>,
    pub(crate) include: Option<String>,
}

impl<E> ListOptions<E> {
    pub fn new() -> Self {
        Self {
            filter: None,
            order: Vec::new(),
            include: None,
        }
    }

    #[must_use]
    pub fn filter(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Filter::new(predicate));
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter<E>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Primary ascending sort; replaces any earlier ordering
    #[must_use]
    pub fn order_by<K: Ord>(mut self, selector: impl Fn(&E) -> K + Send + Sync + 'static) -> Self {
        self.order = vec![SortKey::new(selector, OrderDirection::Ascending)];
        self
    }

    /// Primary descending sort; replaces any earlier ordering
    #[must_use]
    pub fn order_by_descending<K: Ord>(
        mut self,
        selector: impl Fn(&E) -> K + Send + Sync + 'static,
    ) -> Self {
        self.order = vec![SortKey::new(selector, OrderDirection::Descending)];
        self
    }

    /// Secondary sort applied when earlier keys compare equal
    #[must_use]
    pub fn then_by<K: Ord>(
        mut self,
        selector: impl Fn(&E) -> K + Send + Sync + 'static,
        direction: OrderDirection,
    ) -> Self {
        self.order.push(SortKey::new(selector, direction));
        self
    }

    /// Comma-separated navigation properties to eager-load
    #[must_use]
    pub fn include(mut self, paths: impl Into<String>) -> Self {
        self.include = Some(paths.into());
        self
    }
}

impl<E> Default for ListOptions<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for ListOptions<E> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            order: self.order.clone(),
            include: self.include.clone(),
        }
    }
}

impl<E> fmt::Debug for ListOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListOptions")
            .field("filtered", &self.filter.is_some())
            .field("order", &self.order)
            .field("include", &self.include)
            .finish()
    }
}

/// Lazy query over the entity set of `E`
pub struct Query<'s, E: Entity> {
    session: &'s Session,
    filters: Vec<Filter<E>>,
    order: Vec<SortKey<E>>,
    includes: Vec<&'static Navigation>,
    window: Option<Pagination>,
    skip: u64,
    take: Option<u64>,
    tracking: bool,
    deferred_error: Option<RepositoryError>,
}

impl<'s, E: Entity> Query<'s, E> {
    pub(crate) fn new(session: &'s Session) -> Self {
        Self {
            session,
            filters: Vec::new(),
            order: Vec::new(),
            includes: Vec::new(),
            window: None,
            skip: 0,
            take: None,
            tracking: true,
            deferred_error: None,
        }
    }

    pub(crate) fn with_options(mut self, options: ListOptions<E>) -> Self {
        if let Some(filter) = options.filter {
            self.filters.push(filter);
        }
        if !options.order.is_empty() {
            self.order = options.order;
        }
        if let Some(paths) = options.include {
            self = self.include(&paths);
        }
        self
    }

    /// Keep only entities matching `predicate`; repeated calls are ANDed
    #[must_use]
    pub fn filter(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.filters.push(Filter::new(predicate));
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter<E>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Primary ascending sort; replaces any earlier ordering
    #[must_use]
    pub fn order_by<K: Ord>(mut self, selector: impl Fn(&E) -> K + Send + Sync + 'static) -> Self {
        self.order = vec![SortKey::new(selector, OrderDirection::Ascending)];
        self
    }

    /// Primary descending sort; replaces any earlier ordering
    #[must_use]
    pub fn order_by_descending<K: Ord>(
        mut self,
        selector: impl Fn(&E) -> K + Send + Sync + 'static,
    ) -> Self {
        self.order = vec![SortKey::new(selector, OrderDirection::Descending)];
        self
    }

    /// Secondary sort applied when earlier keys compare equal
    #[must_use]
    pub fn then_by<K: Ord>(
        mut self,
        selector: impl Fn(&E) -> K + Send + Sync + 'static,
        direction: OrderDirection,
    ) -> Self {
        self.order.push(SortKey::new(selector, direction));
        self
    }

    /// Eager-load navigation properties named in a comma-separated list
    ///
    /// Unknown properties and nested (dotted) paths make the query fail with
    /// `UnsupportedShape` when it executes.
    #[must_use]
    pub fn include(mut self, paths: &str) -> Self {
        for path in paths.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match resolve_navigation::<E>(path) {
                Ok(navigation) => {
                    if !self
                        .includes
                        .iter()
                        .any(|known| known.property == navigation.property)
                    {
                        self.includes.push(navigation);
                    }
                }
                Err(err) => {
                    self.deferred_error.get_or_insert(err);
                }
            }
        }
        self
    }

    #[must_use]
    pub fn skip(mut self, count: u64) -> Self {
        self.skip = count;
        self
    }

    #[must_use]
    pub fn take(mut self, count: u64) -> Self {
        self.take = Some(count);
        self
    }

    /// Return storage values without attaching them to the session
    #[must_use]
    pub fn no_tracking(mut self) -> Self {
        self.tracking = false;
        self
    }

    /// Execute and return every matching entity
    pub async fn to_list(self) -> RepositoryResult<Vec<E>> {
        let (rows, _) = self.execute(true).await?;
        Ok(rows)
    }

    /// Execute and return the first matching entity, if any
    pub async fn first(self) -> RepositoryResult<Option<E>> {
        let (rows, _) = self.take(1).execute(true).await?;
        Ok(rows.into_iter().next())
    }

    /// Number of entities the query would return
    pub async fn count(mut self) -> RepositoryResult<u64> {
        self.includes.clear();
        let (_, total) = self.execute(false).await?;
        Ok(total)
    }

    /// Execute and cut one page out of the matches
    ///
    /// `page_number` is 1-based. Both arguments must be positive; the page
    /// size is clamped to the configured maximum. Any `skip`/`take` already
    /// on the query is replaced by the page window.
    pub async fn to_paged_list(
        mut self,
        page_number: u64,
        page_size: u64,
    ) -> RepositoryResult<PagedList<E>> {
        if page_number == 0 {
            return Err(RepositoryError::validation_failed(
                RepositoryOperation::Page,
                "page_number must be at least 1",
            )
            .with_entity_type(E::SET));
        }
        if page_size == 0 {
            return Err(RepositoryError::validation_failed(
                RepositoryOperation::Page,
                "page_size must be at least 1",
            )
            .with_entity_type(E::SET));
        }
        let page_size = self.session.paging.effective_page_size(Some(page_size));
        self.window = Some(Pagination::page(page_number, page_size));

        let (items, total) = self.execute(true).await?;
        Ok(PagedList::new(items, total, page_number, page_size))
    }

    /// Run the query, returning the windowed rows and the unwindowed match count
    async fn execute(self, materialize: bool) -> RepositoryResult<(Vec<E>, u64)> {
        if let Some(err) = self.deferred_error {
            return Err(err);
        }

        let mut documents = self
            .session
            .scan(E::SET)
            .await
            .map_err(|e| storage_error::<E>(e, RepositoryOperation::Query))?;

        if materialize && !self.includes.is_empty() {
            load_includes(self.session, &self.includes, &mut documents).await?;
        }

        let mut rows: Vec<(String, E, bool)> = Vec::with_capacity(documents.len());
        {
            let tracker = self.session.tracker.lock().await;
            for stored in documents {
                if self.tracking {
                    match tracker.get::<E>(&stored.key) {
                        Some((_, EntityState::Deleted)) => continue,
                        Some((tracked, _)) => {
                            rows.push((stored.key, tracked, true));
                            continue;
                        }
                        None => {}
                    }
                }
                let entity = decode::<E>(&stored.key, stored.document)?;
                rows.push((stored.key, entity, false));
            }
        }

        rows.retain(|(_, entity, _)| self.filters.iter().all(|f| f.matches(entity)));
        if !self.order.is_empty() {
            rows.sort_by(|(_, a, _), (_, b, _)| compare_all(&self.order, a, b));
        }

        let total = rows.len() as u64;
        let (offset, limit) = match self.window {
            Some(window) => (window.offset, Some(window.limit)),
            None => (self.skip, self.take),
        };
        let total_after_window = match limit {
            Some(limit) => total.saturating_sub(offset).min(limit),
            None => total.saturating_sub(offset),
        };
        if !materialize {
            return Ok((Vec::new(), total_after_window));
        }

        let windowed: Vec<(String, E, bool)> = rows
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX)))
            .collect();

        if self.tracking {
            let mut tracker = self.session.tracker.lock().await;
            for (key, entity, tracked) in &windowed {
                if !tracked {
                    tracker.track(key.clone(), entity.clone(), EntityState::Unchanged);
                }
            }
        }

        let items = windowed.into_iter().map(|(_, entity, _)| entity).collect();
        let total = if self.window.is_some() {
            total
        } else {
            total_after_window
        };
        Ok((items, total))
    }
}

impl<E: Entity> fmt::Debug for Query<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("set", &E::SET)
            .field("filters", &self.filters.len())
            .field("order", &self.order)
            .field(
                "includes",
                &self
                    .includes
                    .iter()
                    .map(|n| n.property)
                    .collect::<Vec<_>>(),
            )
            .field("skip", &self.skip)
            .field("take", &self.take)
            .field("tracking", &self.tracking)
            .finish()
    }
}

fn resolve_navigation<E: Entity>(path: &str) -> RepositoryResult<&'static Navigation> {
    if path.contains('.') {
        return Err(RepositoryError::unsupported_shape(
            RepositoryOperation::Include,
            format!("Nested include path '{}' is not supported", path),
        )
        .with_entity_type(E::SET));
    }
    E::navigations()
        .iter()
        .find(|navigation| navigation.property == path)
        .ok_or_else(|| {
            RepositoryError::unsupported_shape(
                RepositoryOperation::Include,
                format!("Unknown navigation property '{}'", path),
            )
            .with_entity_type(E::SET)
        })
}

pub(crate) fn decode<E: Entity>(key: &str, document: Value) -> RepositoryResult<E> {
    serde_json::from_value(document).map_err(|e| {
        RepositoryError::serialization_error(RepositoryOperation::Query, e.to_string())
            .with_entity(E::SET, key)
    })
}

pub(crate) fn storage_error<E: Entity>(
    err: crate::storage::StorageError,
    operation: RepositoryOperation,
) -> RepositoryError {
    RepositoryError::from(err)
        .with_operation(operation)
        .with_entity_type(E::SET)
}

/// Attach related documents to each document under the navigation property
async fn load_includes(
    session: &Session,
    navigations: &[&'static Navigation],
    documents: &mut [StoredDocument],
) -> RepositoryResult<()> {
    for navigation in navigations {
        let targets = session.scan(navigation.target_set).await.map_err(|e| {
            RepositoryError::from(e)
                .with_operation(RepositoryOperation::Include)
                .with_entity_type(navigation.target_set)
        })?;

        for stored in documents.iter_mut() {
            let related = match navigation.kind {
                NavigationKind::Reference => {
                    let foreign = stored
                        .document
                        .get(navigation.foreign_key)
                        .filter(|value| !value.is_null());
                    foreign
                        .and_then(|foreign| {
                            targets.iter().find(|target| {
                                target.document.get(navigation.principal_key) == Some(foreign)
                            })
                        })
                        .map_or(Value::Null, |target| target.document.clone())
                }
                NavigationKind::Collection => {
                    let principal = stored
                        .document
                        .get(navigation.principal_key)
                        .filter(|value| !value.is_null());
                    let items = match principal {
                        Some(principal) => targets
                            .iter()
                            .filter(|target| {
                                target.document.get(navigation.foreign_key) == Some(principal)
                            })
                            .map(|target| target.document.clone())
                            .collect(),
                        None => Vec::new(),
                    };
                    Value::Array(items)
                }
            };

            if let Some(object) = stored.document.as_object_mut() {
                object.insert(navigation.property.to_string(), related);
            }
        }
    }
    Ok(())
}
