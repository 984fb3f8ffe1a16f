//! Entity contract
//!
//! Any `Clone + Serialize + DeserializeOwned` type becomes persistable by
//! implementing [`Entity`]. Optional capabilities (a name attribute, audit
//! fields, navigation properties) are declared on the trait with defaults
//! that mean "not supported", so each capability is resolved per type at
//! compile time.
//!
//! # Example
//!
//! ```rust
//! use generic_repository::entity::{AuditMetadata, Entity, Navigation};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Customer {
//!     id: u64,
//!     name: String,
//!     #[serde(default)]
//!     orders: Vec<Order>,
//! }
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Order {
//!     id: u64,
//!     customer_id: u64,
//! }
//!
//! impl Entity for Customer {
//!     const SET: &'static str = "customers";
//!     const NAMED: bool = true;
//!     type Key = u64;
//!
//!     fn key(&self) -> u64 {
//!         self.id
//!     }
//!
//!     fn name(&self) -> Option<&str> {
//!         Some(&self.name)
//!     }
//!
//!     fn navigations() -> &'static [Navigation] {
//!         const NAVIGATIONS: &[Navigation] =
//!             &[Navigation::collection("orders", "orders", "customer_id")];
//!         NAVIGATIONS
//!     }
//! }
//! ```

pub mod audit;

use std::fmt;

use serde::{de::DeserializeOwned, Serialize};

pub use audit::AuditMetadata;

/// A persistent record type
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name of the entity set (table, collection) the engine stores it in
    const SET: &'static str;

    /// Whether the type carries a name attribute usable by `find_by_name`
    const NAMED: bool = false;

    /// Primary key type
    type Key: Serialize + Clone + fmt::Debug + Send + Sync + 'static;

    /// Primary key of this instance
    fn key(&self) -> Self::Key;

    /// Value of the name attribute, for types with `NAMED = true`
    fn name(&self) -> Option<&str> {
        None
    }

    /// Audit fields, for types that opt into stamping
    fn audit(&self) -> Option<&AuditMetadata> {
        None
    }

    /// Mutable audit fields, for types that opt into stamping
    fn audit_mut(&mut self) -> Option<&mut AuditMetadata> {
        None
    }

    /// Related entity sets that can be eager-loaded with `include`
    ///
    /// Navigation properties must be `#[serde(default)]` fields; they are
    /// stripped from the document before it is written.
    fn navigations() -> &'static [Navigation] {
        &[]
    }
}

/// Canonical string form of a key, as stored by engines
pub fn key_string<K: Serialize>(key: &K) -> Result<String, serde_json::Error> {
    serde_json::to_string(key)
}

/// Shape of a navigation property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    /// Single related document referenced by a foreign key on this entity
    Reference,
    /// Related documents whose foreign key points back at this entity
    Collection,
}

impl fmt::Display for NavigationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::Collection => write!(f, "collection"),
        }
    }
}

/// Relationship between an entity and another entity set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    /// Property on the entity that receives the related data
    pub property: &'static str,
    /// Entity set holding the related documents
    pub target_set: &'static str,
    /// Field carrying the foreign key
    ///
    /// On this entity for [`NavigationKind::Reference`], on the related
    /// documents for [`NavigationKind::Collection`].
    pub foreign_key: &'static str,
    /// Field the foreign key is matched against (`id` by default)
    pub principal_key: &'static str,
    /// Reference or collection
    pub kind: NavigationKind,
}

impl Navigation {
    /// Reference navigation matched on the related document's `id`
    pub const fn reference(
        property: &'static str,
        target_set: &'static str,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            property,
            target_set,
            foreign_key,
            principal_key: "id",
            kind: NavigationKind::Reference,
        }
    }

    /// Collection navigation matched on this entity's `id`
    pub const fn collection(
        property: &'static str,
        target_set: &'static str,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            property,
            target_set,
            foreign_key,
            principal_key: "id",
            kind: NavigationKind::Collection,
        }
    }

    /// Match on a principal field other than `id`
    #[must_use]
    pub const fn with_principal_key(mut self, principal_key: &'static str) -> Self {
        self.principal_key = principal_key;
        self
    }
}
