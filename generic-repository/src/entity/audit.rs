//! Audit fields carried by entities that opt into automatic stamping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Creation, update and deletion bookkeeping for an entity
///
/// Embed it with `#[serde(flatten)]` so the four fields become the audit
/// columns of the stored document (`isDeleted`, `createdAt`, `updatedAt`,
/// `deletedAt`), then expose it through [`Entity::audit`] and
/// [`Entity::audit_mut`](crate::entity::Entity::audit_mut).
///
/// `created_at` and `updated_at` are written by the unit of work at commit
/// time. `is_deleted` is reset to `false` when an entity is first added;
/// beyond that `is_deleted` and `deleted_at` belong to the caller.
///
/// # Example
///
/// ```rust
/// use generic_repository::entity::{AuditMetadata, Entity};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Invoice {
///     id: u64,
///     #[serde(flatten)]
///     audit: AuditMetadata,
/// }
///
/// impl Entity for Invoice {
///     const SET: &'static str = "invoices";
///     type Key = u64;
///
///     fn key(&self) -> u64 {
///         self.id
///     }
///
///     fn audit(&self) -> Option<&AuditMetadata> {
///         Some(&self.audit)
///     }
///
///     fn audit_mut(&mut self) -> Option<&mut AuditMetadata> {
///         Some(&mut self.audit)
///     }
/// }
/// ```
///
/// [`Entity::audit`]: crate::entity::Entity::audit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditMetadata {
    /// Soft-delete flag, owned by the caller after the first commit
    #[serde(default)]
    pub is_deleted: bool,
    /// Instant of the commit that first persisted the entity
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Instant of the most recent commit that wrote the entity
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Caller-managed deletion instant
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AuditMetadata {
    /// Empty metadata for a brand-new entity
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a commit has stamped this entity at least once
    pub fn is_stamped(&self) -> bool {
        self.created_at.is_some()
    }

    pub(crate) fn stamp_added(&mut self, at: DateTime<Utc>) {
        self.created_at = Some(at);
        self.updated_at = Some(at);
        self.is_deleted = false;
    }

    pub(crate) fn stamp_modified(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stamp_added_sets_both_timestamps() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let mut audit = AuditMetadata {
            is_deleted: true,
            ..AuditMetadata::new()
        };

        audit.stamp_added(at);

        assert_eq!(audit.created_at, Some(at));
        assert_eq!(audit.updated_at, Some(at));
        assert!(!audit.is_deleted);
        assert!(audit.deleted_at.is_none());
        assert!(audit.is_stamped());
    }

    #[test]
    fn test_stamp_modified_keeps_creation_and_delete_flags() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
        let mut audit = AuditMetadata::new();
        audit.stamp_added(created);
        audit.is_deleted = true;

        audit.stamp_modified(later);

        assert_eq!(audit.created_at, Some(created));
        assert_eq!(audit.updated_at, Some(later));
        assert!(audit.is_deleted);
        assert!(audit.deleted_at.is_none());
    }

    #[test]
    fn test_serializes_as_camel_case_columns() {
        let value = serde_json::to_value(AuditMetadata::new()).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("isDeleted"));
        assert!(object.contains_key("createdAt"));
        assert!(object.contains_key("updatedAt"));
        assert!(object.contains_key("deletedAt"));
    }

    #[test]
    fn test_missing_columns_deserialize_to_defaults() {
        let audit: AuditMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(audit, AuditMetadata::default());
    }
}
