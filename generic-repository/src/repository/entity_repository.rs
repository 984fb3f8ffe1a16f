//! Session-bound repository for one entity type

use std::fmt;
use std::marker::PhantomData;

use super::error::{RepositoryError, RepositoryOperation};
use super::pagination::PagedList;
use super::query::{decode, storage_error, Filter, ListOptions, Query};
use super::traits::{Repository, RepositoryResult};
use crate::entity::{key_string, Entity};
use crate::session::Session;
use crate::tracking::{ChangeTracker, EntityState};

/// Repository over the entity set of `E`, borrowed from a unit of work
///
/// Obtained with [`UnitOfWork::of`](crate::UnitOfWork::of). Cheap to
/// create; every repository of a unit of work shares one change tracker
/// and one engine handle.
pub struct EntityRepository<'s, E: Entity> {
    session: &'s Session,
    _entity: PhantomData<fn() -> E>,
}

impl<'s, E: Entity> EntityRepository<'s, E> {
    pub(crate) fn new(session: &'s Session) -> Self {
        Self {
            session,
            _entity: PhantomData,
        }
    }

    /// Start a lazy query over the entity set
    pub fn query(&self) -> Query<'s, E> {
        Query::new(self.session)
    }

    /// Like [`Repository::find_first`], keeping the error
    pub async fn try_find_first(&self, filter: Option<Filter<E>>) -> RepositoryResult<Option<E>> {
        let query = match filter {
            Some(filter) => self.query().with_filter(filter),
            None => self.query(),
        };
        query
            .first()
            .await
            .map_err(|e| e.with_operation(RepositoryOperation::FindFirst))
    }

    /// Like [`Repository::find_by_name`], keeping the error
    ///
    /// Fails with `UnsupportedShape` when `E` has no name attribute.
    pub async fn try_find_by_name(&self, name: &str) -> RepositoryResult<Option<E>> {
        if !E::NAMED {
            return Err(RepositoryError::unsupported_shape(
                RepositoryOperation::FindByName,
                "Entity type has no name attribute",
            )
            .with_entity_type(E::SET));
        }
        let wanted = name.to_string();
        self.query()
            .filter(move |entity: &E| entity.name() == Some(wanted.as_str()))
            .first()
            .await
            .map_err(|e| e.with_operation(RepositoryOperation::FindByName))
    }

    /// Like [`Repository::list_all`], keeping the error
    pub async fn try_list_all(&self, options: ListOptions<E>) -> RepositoryResult<Option<Vec<E>>> {
        self.query()
            .with_options(options)
            .to_list()
            .await
            .map(Some)
            .map_err(|e| e.with_operation(RepositoryOperation::ListAll))
    }

    /// Every entity in the set; fails on the first error
    pub async fn records(&self) -> RepositoryResult<Vec<E>> {
        self.query()
            .to_list()
            .await
            .map_err(|e| e.with_operation(RepositoryOperation::Records))
    }

    /// One page of the entities matching `options`
    ///
    /// `page_size` defaults to the configured default page size.
    pub async fn page(
        &self,
        page_number: u64,
        page_size: Option<u64>,
        options: ListOptions<E>,
    ) -> RepositoryResult<PagedList<E>> {
        let page_size = page_size.unwrap_or(self.session.paging.default_page_size);
        self.query()
            .with_options(options)
            .to_paged_list(page_number, page_size)
            .await
            .map_err(|e| e.with_operation(RepositoryOperation::Page))
    }

    /// Number of stored entities matching `filter`
    pub async fn count(&self, filter: Option<Filter<E>>) -> RepositoryResult<u64> {
        let query = match filter {
            Some(filter) => self.query().with_filter(filter),
            None => self.query(),
        };
        query
            .count()
            .await
            .map_err(|e| e.with_operation(RepositoryOperation::Count))
    }

    /// Whether an entity with the key exists, without attaching it
    pub async fn exists(&self, id: &E::Key) -> RepositoryResult<bool> {
        let key = self.key_of(id, RepositoryOperation::Exists)?;
        match self.session.tracker.lock().await.state_of(E::SET, &key) {
            EntityState::Deleted => return Ok(false),
            EntityState::Added | EntityState::Modified | EntityState::Unchanged => {
                return Ok(true)
            }
            EntityState::Detached => {}
        }
        let document = self
            .session
            .fetch(E::SET, &key)
            .await
            .map_err(|e| storage_error::<E>(e, RepositoryOperation::Exists))?;
        Ok(document.is_some())
    }

    /// Stop tracking an entity; returns whether it was tracked
    ///
    /// Any staged change for it is discarded.
    pub async fn detach(&self, entity: &E) -> RepositoryResult<bool> {
        let key = self.key_of(&entity.key(), RepositoryOperation::Remove)?;
        let detached = self.session.tracker.lock().await.detach(E::SET, &key);
        if detached {
            tracing::debug!(set = E::SET, key = %key, "entity detached");
        }
        Ok(detached)
    }

    /// Tracking state of an entity in this session
    pub async fn state_of(&self, entity: &E) -> RepositoryResult<EntityState> {
        let key = self.key_of(&entity.key(), RepositoryOperation::Query)?;
        Ok(self.session.tracker.lock().await.state_of(E::SET, &key))
    }

    fn key_of(&self, id: &E::Key, operation: RepositoryOperation) -> RepositoryResult<String> {
        key_string(id).map_err(|e| {
            RepositoryError::serialization_error(operation, format!("Invalid key {:?}: {}", id, e))
                .with_entity_type(E::SET)
        })
    }

    fn stage_add(tracker: &mut ChangeTracker, key: String, entity: E) {
        if tracker.state_of(E::SET, &key) == EntityState::Deleted {
            // still stored until the delete is flushed
            tracing::debug!(set = E::SET, key = %key, "entity re-added over pending delete");
            tracker.track_readded(key, entity);
            return;
        }
        tracing::debug!(set = E::SET, key = %key, state = %EntityState::Added, "entity staged");
        tracker.track(key, entity, EntityState::Added);
    }

    fn stage_remove(tracker: &mut ChangeTracker, key: String, entity: E) {
        match tracker.state_of(E::SET, &key) {
            EntityState::Added if tracker.replaces_stored_row(E::SET, &key) => {
                tracing::debug!(set = E::SET, key = %key, "entity staged for delete");
                tracker.track(key, entity, EntityState::Deleted);
            }
            EntityState::Added => {
                tracker.detach(E::SET, &key);
                tracing::debug!(set = E::SET, key = %key, "pending insert discarded");
            }
            EntityState::Deleted => {}
            _ => {
                tracing::debug!(set = E::SET, key = %key, "entity staged for delete");
                tracker.track(key, entity, EntityState::Deleted);
            }
        }
    }

    fn ensure_addable(
        &self,
        tracker: &ChangeTracker,
        key: &str,
    ) -> RepositoryResult<()> {
        match tracker.state_of(E::SET, key) {
            EntityState::Detached | EntityState::Deleted => Ok(()),
            _ => Err(RepositoryError::already_exists(E::SET, key)),
        }
    }
}

fn log_swallowed<E: Entity>(operation: RepositoryOperation, err: &RepositoryError) {
    tracing::warn!(
        operation = %operation,
        set = E::SET,
        kind = %err.kind,
        error = %err,
        "read failed, returning no result"
    );
}

impl<E: Entity> Repository<E> for EntityRepository<'_, E> {
    async fn find_first(&self, filter: Option<Filter<E>>) -> Option<E> {
        match self.try_find_first(filter).await {
            Ok(found) => found,
            Err(err) => {
                log_swallowed::<E>(RepositoryOperation::FindFirst, &err);
                None
            }
        }
    }

    async fn find_by_id(&self, id: &E::Key) -> RepositoryResult<Option<E>> {
        let key = self.key_of(id, RepositoryOperation::FindById)?;
        if let Some((entity, state)) = self.session.tracker.lock().await.get::<E>(&key) {
            return Ok((state != EntityState::Deleted).then_some(entity));
        }

        let document = self
            .session
            .fetch(E::SET, &key)
            .await
            .map_err(|e| storage_error::<E>(e, RepositoryOperation::FindById))?;
        let Some(document) = document else {
            return Ok(None);
        };
        let entity: E =
            decode(&key, document).map_err(|e| e.with_operation(RepositoryOperation::FindById))?;

        let mut tracker = self.session.tracker.lock().await;
        // a concurrent read may have attached it meanwhile
        if let Some((tracked, state)) = tracker.get::<E>(&key) {
            return Ok((state != EntityState::Deleted).then_some(tracked));
        }
        tracker.track(key, entity.clone(), EntityState::Unchanged);
        Ok(Some(entity))
    }

    async fn find_by_name(&self, name: &str) -> Option<E> {
        match self.try_find_by_name(name).await {
            Ok(found) => found,
            Err(err) => {
                log_swallowed::<E>(RepositoryOperation::FindByName, &err);
                None
            }
        }
    }

    async fn list_all(&self, options: ListOptions<E>) -> Option<Vec<E>> {
        match self.try_list_all(options).await {
            Ok(found) => found,
            Err(err) => {
                log_swallowed::<E>(RepositoryOperation::ListAll, &err);
                None
            }
        }
    }

    async fn add(&self, entity: E) -> RepositoryResult<E> {
        let key = self.key_of(&entity.key(), RepositoryOperation::Add)?;
        let mut tracker = self.session.tracker.lock().await;
        self.ensure_addable(&tracker, &key)?;
        Self::stage_add(&mut tracker, key, entity.clone());
        Ok(entity)
    }

    async fn add_range(&self, entities: Vec<E>) -> RepositoryResult<E> {
        if entities.is_empty() {
            return Err(RepositoryError::validation_failed(
                RepositoryOperation::Add,
                "add_range needs at least one entity",
            )
            .with_entity_type(E::SET));
        }

        let mut keyed = Vec::with_capacity(entities.len());
        for entity in entities {
            keyed.push((self.key_of(&entity.key(), RepositoryOperation::Add)?, entity));
        }

        let mut tracker = self.session.tracker.lock().await;
        for (index, (key, _)) in keyed.iter().enumerate() {
            self.ensure_addable(&tracker, key)?;
            if keyed[..index].iter().any(|(earlier, _)| earlier == key) {
                return Err(RepositoryError::already_exists(E::SET, key.as_str()));
            }
        }

        let mut last = None;
        for (key, entity) in keyed {
            Self::stage_add(&mut tracker, key, entity.clone());
            last = Some(entity);
        }
        last.ok_or_else(|| {
            RepositoryError::validation_failed(RepositoryOperation::Add, "nothing staged")
        })
    }

    async fn update(&self, entity: E) -> RepositoryResult<E> {
        let key = self.key_of(&entity.key(), RepositoryOperation::Update)?;
        let mut tracker = self.session.tracker.lock().await;
        let state = match tracker.state_of(E::SET, &key) {
            EntityState::Added => EntityState::Added,
            _ => EntityState::Modified,
        };
        tracing::debug!(set = E::SET, key = %key, state = %state, "entity staged");
        tracker.track(key, entity.clone(), state);
        Ok(entity)
    }

    async fn remove_by_id(&self, id: &E::Key) -> RepositoryResult<E> {
        let entity = self
            .find_by_id(id)
            .await
            .map_err(|e| e.with_operation(RepositoryOperation::Remove))?;
        match entity {
            Some(entity) => self.remove(entity).await,
            None => Err(RepositoryError::not_found(E::SET, format!("{:?}", id))
                .with_operation(RepositoryOperation::Remove)),
        }
    }

    async fn remove(&self, entity: E) -> RepositoryResult<E> {
        let key = self.key_of(&entity.key(), RepositoryOperation::Remove)?;
        let mut tracker = self.session.tracker.lock().await;
        Self::stage_remove(&mut tracker, key, entity.clone());
        Ok(entity)
    }

    async fn remove_range(&self, entities: Vec<E>) -> RepositoryResult<E> {
        if entities.is_empty() {
            return Err(RepositoryError::validation_failed(
                RepositoryOperation::Remove,
                "remove_range needs at least one entity",
            )
            .with_entity_type(E::SET));
        }

        let mut keyed = Vec::with_capacity(entities.len());
        for entity in entities {
            keyed.push((self.key_of(&entity.key(), RepositoryOperation::Remove)?, entity));
        }

        let mut tracker = self.session.tracker.lock().await;
        let mut last = None;
        for (key, entity) in keyed {
            Self::stage_remove(&mut tracker, key, entity.clone());
            last = Some(entity);
        }
        last.ok_or_else(|| {
            RepositoryError::validation_failed(RepositoryOperation::Remove, "nothing staged")
        })
    }
}

impl<E: Entity> fmt::Debug for EntityRepository<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRepository")
            .field("set", &E::SET)
            .field("session", self.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;
    use crate::storage::MemoryEngine;
    use crate::UnitOfWork;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tag {
        id: String,
        label: String,
    }

    impl Entity for Tag {
        const SET: &'static str = "tags";
        const NAMED: bool = true;
        type Key = String;

        fn key(&self) -> String {
            self.id.clone()
        }

        fn name(&self) -> Option<&str> {
            Some(&self.label)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Reading {
        id: u64,
        value: f64,
    }

    impl Entity for Reading {
        const SET: &'static str = "readings";
        type Key = u64;

        fn key(&self) -> u64 {
            self.id
        }
    }

    fn tag(id: &str, label: &str) -> Tag {
        Tag {
            id: id.to_string(),
            label: label.to_string(),
        }
    }

    fn unit_of_work() -> (Arc<MemoryEngine>, UnitOfWork) {
        let engine = Arc::new(MemoryEngine::new());
        let uow = UnitOfWork::new(engine.clone());
        (engine, uow)
    }

    #[tokio::test]
    async fn test_add_twice_is_already_exists() {
        let (_, uow) = unit_of_work();
        let tags = uow.of::<Tag>();

        tags.add(tag("t1", "red")).await.unwrap();
        let err = tags.add(tag("t1", "blue")).await.unwrap_err();

        assert_eq!(err.kind, RepositoryErrorKind::AlreadyExists);
        assert_eq!(err.entity_id.as_deref(), Some("\"t1\""));
    }

    #[tokio::test]
    async fn test_add_range_returns_last_and_rejects_empty() {
        let (_, uow) = unit_of_work();
        let tags = uow.of::<Tag>();

        let last = tags
            .add_range(vec![tag("a", "one"), tag("b", "two"), tag("c", "three")])
            .await
            .unwrap();
        assert_eq!(last.id, "c");
        assert_eq!(uow.pending_changes().await.added, 3);

        let err = tags.add_range(Vec::new()).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn test_add_range_with_duplicate_stages_nothing() {
        let (_, uow) = unit_of_work();
        let tags = uow.of::<Tag>();

        let err = tags
            .add_range(vec![tag("a", "one"), tag("a", "again")])
            .await
            .unwrap_err();

        assert_eq!(err.kind, RepositoryErrorKind::AlreadyExists);
        assert!(!uow.has_changes().await);
    }

    #[tokio::test]
    async fn test_remove_of_added_entity_unstages_it() {
        let (engine, uow) = unit_of_work();
        let tags = uow.of::<Tag>();

        let staged = tags.add(tag("x", "temp")).await.unwrap();
        tags.remove(staged.clone()).await.unwrap();

        assert_eq!(tags.state_of(&staged).await.unwrap(), EntityState::Detached);
        assert_eq!(uow.commit().await.unwrap(), 0);
        assert_eq!(engine.flush_count(), 0);
    }

    #[tokio::test]
    async fn test_readd_of_removed_entity_is_staged_as_added() {
        let (engine, uow) = unit_of_work();
        let tags = uow.of::<Tag>();
        tags.add(tag("x", "old")).await.unwrap();
        uow.commit().await.unwrap();

        tags.remove_by_id(&"x".to_string()).await.unwrap();
        let readded = tags.add(tag("x", "new")).await.unwrap();
        assert_eq!(tags.state_of(&readded).await.unwrap(), EntityState::Added);

        // removing it again goes back to a delete of the stored row
        tags.remove(readded.clone()).await.unwrap();
        assert_eq!(tags.state_of(&readded).await.unwrap(), EntityState::Deleted);

        tags.add(readded).await.unwrap();
        assert_eq!(uow.commit().await.unwrap(), 1);
        assert_eq!(engine.document_count("tags"), 1);
        assert_eq!(engine.committed_document("tags", "\"x\"").unwrap()["label"], "new");
    }

    #[tokio::test]
    async fn test_update_of_added_entity_stays_added() {
        let (_, uow) = unit_of_work();
        let tags = uow.of::<Tag>();

        tags.add(tag("x", "draft")).await.unwrap();
        let edited = tags.update(tag("x", "final")).await.unwrap();

        assert_eq!(tags.state_of(&edited).await.unwrap(), EntityState::Added);
        assert_eq!(
            tags.find_by_id(&"x".to_string()).await.unwrap().unwrap().label,
            "final"
        );
    }

    #[tokio::test]
    async fn test_find_by_name_requires_name_attribute() {
        let (_, uow) = unit_of_work();
        uow.of::<Tag>().add(tag("g", "green")).await.unwrap();
        uow.of::<Reading>()
            .add(Reading { id: 1, value: 0.5 })
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let found = uow.of::<Tag>().find_by_name("green").await;
        assert_eq!(found.map(|t| t.id), Some("g".to_string()));
        assert!(uow.of::<Tag>().find_by_name("purple").await.is_none());

        assert!(uow.of::<Reading>().find_by_name("anything").await.is_none());
        let err = uow
            .of::<Reading>()
            .try_find_by_name("anything")
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::UnsupportedShape);
    }

    #[tokio::test]
    async fn test_exists_does_not_attach() {
        let (_, uow) = unit_of_work();
        let readings = uow.of::<Reading>();
        readings.add(Reading { id: 9, value: 1.0 }).await.unwrap();
        uow.commit().await.unwrap();

        assert!(readings.exists(&9).await.unwrap());
        assert!(!readings.exists(&10).await.unwrap());
        assert_eq!(uow.pending_changes().await.unchanged, 0);
    }

    #[tokio::test]
    async fn test_detach_discards_staged_change() {
        let (_, uow) = unit_of_work();
        let readings = uow.of::<Reading>();
        let reading = readings.add(Reading { id: 3, value: 2.0 }).await.unwrap();

        assert!(readings.detach(&reading).await.unwrap());
        assert!(!readings.detach(&reading).await.unwrap());
        assert!(!uow.has_changes().await);
    }

    #[tokio::test]
    async fn test_count_and_records() {
        let (_, uow) = unit_of_work();
        let readings = uow.of::<Reading>();
        for id in 1..=4 {
            readings
                .add(Reading {
                    id,
                    value: id as f64 / 2.0,
                })
                .await
                .unwrap();
        }
        uow.commit().await.unwrap();

        assert_eq!(readings.records().await.unwrap().len(), 4);
        assert_eq!(
            readings
                .count(Some(Filter::new(|r: &Reading| r.value >= 1.0)))
                .await
                .unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_remove_range_marks_all_deleted() {
        let (engine, uow) = unit_of_work();
        let readings = uow.of::<Reading>();
        let batch = vec![
            Reading { id: 1, value: 1.0 },
            Reading { id: 2, value: 2.0 },
        ];
        readings.add_range(batch.clone()).await.unwrap();
        uow.commit().await.unwrap();

        let last = readings.remove_range(batch).await.unwrap();
        assert_eq!(last.id, 2);
        assert_eq!(uow.pending_changes().await.deleted, 2);
        assert_eq!(uow.commit().await.unwrap(), 2);
        assert_eq!(engine.document_count("readings"), 0);
    }
}
