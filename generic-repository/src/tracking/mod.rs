//! Change tracking
//!
//! The tracker remembers every entity a session has staged or materialized,
//! keyed by entity set and canonical key, together with its
//! [`EntityState`]. At commit time the unit of work walks it to stamp audit
//! fields and turns it into a batch of [`RowChange`]s for the engine.
//!
//! Entries of different entity types live side by side behind the
//! object-safe [`TrackedEntity`] view; typed access goes through
//! [`ChangeTracker::get`], which downcasts back to the concrete type.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::entity::{AuditMetadata, Entity};
use crate::storage::{Document, RowChange};

/// Lifecycle state of a tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// Not tracked by the session
    Detached,
    /// Tracked, matches what was read from storage
    Unchanged,
    /// Staged for insert
    Added,
    /// Staged for full-document update
    Modified,
    /// Staged for physical delete
    Deleted,
}

impl EntityState {
    /// Whether the state produces a write on commit
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Added | Self::Modified | Self::Deleted)
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detached => write!(f, "detached"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Type-erased view of a tracked entity
pub trait TrackedEntity: Send + Sync {
    /// Entity set the value belongs to
    fn set(&self) -> &'static str;

    /// Rust type name, for diagnostics
    fn type_name(&self) -> &'static str;

    /// Audit fields, when the type carries them
    fn audit_mut(&mut self) -> Option<&mut AuditMetadata>;

    /// Stored form of the value with navigation properties removed
    fn to_document(&self) -> Result<Document, serde_json::Error>;

    fn as_any(&self) -> &dyn Any;
}

impl<E: Entity> TrackedEntity for E {
    fn set(&self) -> &'static str {
        E::SET
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<E>()
    }

    fn audit_mut(&mut self) -> Option<&mut AuditMetadata> {
        Entity::audit_mut(self)
    }

    fn to_document(&self) -> Result<Document, serde_json::Error> {
        let mut document = serde_json::to_value(self)?;
        if let Some(object) = document.as_object_mut() {
            for navigation in E::navigations() {
                object.remove(navigation.property);
            }
        }
        Ok(document)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Entry {
    entity: Box<dyn TrackedEntity>,
    state: EntityState,
    sequence: u64,
    // an Added entry re-staged over a stored row is written as an update
    row_exists: bool,
}

type EntryKey = (&'static str, String);

/// Counts of tracked entries per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl ChangeSummary {
    /// Entries that will produce a write on the next commit
    pub fn pending(&self) -> usize {
        self.added + self.modified + self.deleted
    }
}

/// Per-session record of staged and materialized entities
#[derive(Default)]
pub struct ChangeTracker {
    entries: HashMap<EntryKey, Entry>,
    next_sequence: u64,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of the entry for `set`/`key`, `Detached` when untracked
    pub fn state_of(&self, set: &'static str, key: &str) -> EntityState {
        self.entries
            .get(&(set, key.to_string()))
            .map_or(EntityState::Detached, |entry| entry.state)
    }

    /// Tracked value and state for an entity key
    pub fn get<E: Entity>(&self, key: &str) -> Option<(E, EntityState)> {
        let entry = self.entries.get(&(E::SET, key.to_string()))?;
        entry
            .entity
            .as_any()
            .downcast_ref::<E>()
            .map(|entity| (entity.clone(), entry.state))
    }

    /// Start tracking `entity` in `state`, replacing any existing entry
    ///
    /// Replacing keeps the entry's original position in the flush order.
    /// Tracking in `Detached` state removes the entry.
    pub fn track<E: Entity>(&mut self, key: String, entity: E, state: EntityState) {
        if state == EntityState::Detached {
            self.entries.remove(&(E::SET, key));
            return;
        }
        let entry_key = (E::SET, key);
        match self.entries.get_mut(&entry_key) {
            Some(entry) => {
                entry.entity = Box::new(entity);
                entry.state = state;
            }
            None => {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                self.entries.insert(
                    entry_key,
                    Entry {
                        entity: Box::new(entity),
                        state,
                        sequence,
                        row_exists: false,
                    },
                );
            }
        }
    }

    /// Track `entity` as Added over a row that is still stored
    ///
    /// Used when a key staged for delete is added again: the entry stamps and
    /// counts as an add but is flushed as a full-document update.
    pub fn track_readded<E: Entity>(&mut self, key: String, entity: E) {
        let entry_key = (E::SET, key.clone());
        self.track(key, entity, EntityState::Added);
        if let Some(entry) = self.entries.get_mut(&entry_key) {
            entry.row_exists = true;
        }
    }

    /// Whether an Added entry replaces a row already in storage
    pub fn replaces_stored_row(&self, set: &'static str, key: &str) -> bool {
        self.entries
            .get(&(set, key.to_string()))
            .is_some_and(|entry| entry.row_exists)
    }

    /// Change the state of an existing entry, returning the previous state
    pub fn set_state(&mut self, set: &'static str, key: &str, state: EntityState) -> EntityState {
        let entry_key = (set, key.to_string());
        if state == EntityState::Detached {
            return self
                .entries
                .remove(&entry_key)
                .map_or(EntityState::Detached, |entry| entry.state);
        }
        match self.entries.get_mut(&entry_key) {
            Some(entry) => std::mem::replace(&mut entry.state, state),
            None => EntityState::Detached,
        }
    }

    /// Stop tracking an entry; returns whether it was tracked
    pub fn detach(&mut self, set: &'static str, key: &str) -> bool {
        self.entries.remove(&(set, key.to_string())).is_some()
    }

    /// Mutable access to every entry that will be written, in staging order
    pub fn pending_entries_mut(
        &mut self,
    ) -> impl Iterator<Item = (EntityState, &mut (dyn TrackedEntity + 'static))> + '_ {
        let mut pending: Vec<&mut Entry> = self
            .entries
            .values_mut()
            .filter(|entry| entry.state.is_pending())
            .collect();
        pending.sort_by_key(|entry| entry.sequence);
        pending
            .into_iter()
            .map(|entry| (entry.state, entry.entity.as_mut()))
    }

    /// Write batch for every pending entry, in staging order
    pub fn pending_changes(&self) -> Result<Vec<RowChange>, serde_json::Error> {
        let mut pending: Vec<(&EntryKey, &Entry)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.state.is_pending())
            .collect();
        pending.sort_by_key(|(_, entry)| entry.sequence);

        pending
            .into_iter()
            .map(|((set, key), entry)| {
                let set = (*set).to_string();
                let key = key.clone();
                Ok(match entry.state {
                    EntityState::Added if entry.row_exists => RowChange::Update {
                        set,
                        key,
                        document: entry.entity.to_document()?,
                    },
                    EntityState::Added => RowChange::Insert {
                        set,
                        key,
                        document: entry.entity.to_document()?,
                    },
                    EntityState::Modified => RowChange::Update {
                        set,
                        key,
                        document: entry.entity.to_document()?,
                    },
                    _ => RowChange::Delete { set, key },
                })
            })
            .collect()
    }

    /// Forget every entry whose changes were just flushed
    pub fn accept_changes(&mut self) {
        self.entries.retain(|_, entry| !entry.state.is_pending());
    }

    pub fn summary(&self) -> ChangeSummary {
        self.entries
            .values()
            .fold(ChangeSummary::default(), |mut summary, entry| {
                match entry.state {
                    EntityState::Added => summary.added += 1,
                    EntityState::Modified => summary.modified += 1,
                    EntityState::Deleted => summary.deleted += 1,
                    EntityState::Unchanged => summary.unchanged += 1,
                    EntityState::Detached => {}
                }
                summary
            })
    }

    pub fn has_changes(&self) -> bool {
        self.entries.values().any(|entry| entry.state.is_pending())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("entries", &self.entries.len())
            .field("summary", &self.summary())
            .finish()
    }
}
