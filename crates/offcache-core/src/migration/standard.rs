//! Reusable building blocks for migration steps.
//!
//! Payloads touched here are JSON objects. Transforms must be safe to run
//! on an entity that was already migrated, so a step interrupted half way
//! can simply run again.

use serde_json::{Map, Value};
use tracing::debug;

use crate::cache::{CacheStore, PersistedEntity};
use crate::error::{OfflineError, Result};

/// A decoded entity payload.
pub type EntityObject = Map<String, Value>;

/// Rewrites one decoded entity.
pub type EntityTransform = Box<dyn Fn(EntityObject) -> Result<EntityObject> + Send + Sync>;

/// Apply `transforms` to every cached element entity of `type_ref`.
///
/// Returns the number of rewritten entities.
pub fn migrate_all_elements(
    store: &mut CacheStore,
    type_ref: &str,
    transforms: &[EntityTransform],
) -> Result<usize> {
    migrate_partition(store, type_ref, false, transforms)
}

/// Apply `transforms` to every cached list entity of `type_ref`, in all lists.
pub fn migrate_all_list_elements(
    store: &mut CacheStore,
    type_ref: &str,
    transforms: &[EntityTransform],
) -> Result<usize> {
    migrate_partition(store, type_ref, true, transforms)
}

/// Drop every cached instance of `type_ref`, including its ranges.
pub fn delete_instances_of_type(store: &mut CacheStore, type_ref: &str) -> Result<usize> {
    store.delete_all_of_type(type_ref)
}

/// Insert each field of `defaults` that the entity does not have yet.
/// Existing values are left alone.
pub fn add_missing_fields(defaults: EntityObject) -> EntityTransform {
    Box::new(move |mut entity| {
        for (field, value) in &defaults {
            if !entity.contains_key(field) {
                entity.insert(field.clone(), value.clone());
            }
        }
        Ok(entity)
    })
}

/// Remove `field` from the entity if present.
pub fn remove_field(field: impl Into<String>) -> EntityTransform {
    let field = field.into();
    Box::new(move |mut entity| {
        entity.remove(&field);
        Ok(entity)
    })
}

fn migrate_partition(
    store: &mut CacheStore,
    type_ref: &str,
    list_elements: bool,
    transforms: &[EntityTransform],
) -> Result<usize> {
    let mut migrated = Vec::new();
    for entity in store.entities_of_type(type_ref)? {
        if entity.list_id.is_some() != list_elements {
            continue;
        }
        let mut object = decode_object(&entity)?;
        for transform in transforms {
            object = transform(object)?;
        }
        migrated.push(PersistedEntity {
            entity: serde_json::to_vec(&object)?,
            ..entity
        });
    }

    store.put_all(&migrated)?;
    debug!(type_ref, count = migrated.len(), "migrated cached entities");
    Ok(migrated.len())
}

fn decode_object(entity: &PersistedEntity) -> Result<EntityObject> {
    match serde_json::from_slice::<Value>(&entity.entity)? {
        Value::Object(object) => Ok(object),
        other => Err(OfflineError::InvalidInput(format!(
            "{} {} is not a JSON object (found {})",
            entity.type_ref,
            entity.element_id,
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
