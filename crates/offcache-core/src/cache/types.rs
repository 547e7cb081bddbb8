//! Data types for the offline cache.

use serde::{Deserialize, Serialize};

use crate::id::{first_bigger_or_eq, first_bigger_than_second};

/// One cached server entity.
///
/// `list_id` decides the partition: list entities live in `list_entities`
/// keyed by `(type, listId, elementId)`, element entities in
/// `element_entities` keyed by `(type, elementId)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEntity {
    /// Namespaced type name (e.g., "tutanota/Mail")
    pub type_ref: String,

    /// List the entity belongs to, `None` for element entities
    pub list_id: Option<String>,

    /// Element id within the list (or globally, for element entities)
    pub element_id: String,

    /// Serialized, encrypted entity
    pub entity: Vec<u8>,
}

impl PersistedEntity {
    pub fn list_element(
        type_ref: impl Into<String>,
        list_id: impl Into<String>,
        element_id: impl Into<String>,
        entity: Vec<u8>,
    ) -> Self {
        Self {
            type_ref: type_ref.into(),
            list_id: Some(list_id.into()),
            element_id: element_id.into(),
            entity,
        }
    }

    pub fn element(
        type_ref: impl Into<String>,
        element_id: impl Into<String>,
        entity: Vec<u8>,
    ) -> Self {
        Self {
            type_ref: type_ref.into(),
            list_id: None,
            element_id: element_id.into(),
            entity,
        }
    }
}

/// The contiguous window of a list that is known to be fully cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRange {
    pub lower: String,
    pub upper: String,
}

impl ListRange {
    pub fn new(lower: impl Into<String>, upper: impl Into<String>) -> Self {
        Self {
            lower: lower.into(),
            upper: upper.into(),
        }
    }

    /// Whether `lower <= upper` under the id ordering.
    pub fn is_ordered(&self) -> bool {
        !first_bigger_than_second(&self.lower, &self.upper)
    }

    /// Whether `id` lies within `[lower, upper]`.
    pub fn contains(&self, id: &str) -> bool {
        first_bigger_or_eq(id, &self.lower) && !first_bigger_than_second(id, &self.upper)
    }
}

/// Options for opening a cache, embeddable in host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Verify every page HMAC on open. Only disable for tests and benchmarks.
    pub verify_integrity: bool,

    /// Minimum number of days between two compactions.
    pub compaction_interval_days: u32,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            verify_integrity: true,
            compaction_interval_days: 7,
        }
    }
}
