//! Component Store
//!
//! Authoritative component data keyed by (entity, identifier), plus a
//! secondary index from component identifier to the entities owning it so
//! component-scoped queries never scan the whole entity population.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;

use super::builtin::{self, builtin_schemas};
use super::schema::{ComponentSchema, Fields};
use crate::entity::EntityRef;
use crate::error::{Result, ScriptError};

/// Detached copy of a component's fields
///
/// Edits stay local to the handle until committed with
/// `ScriptRuntime::apply_component_changes`. Two handles for the same
/// component never observe each other's uncommitted edits.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentHandle {
    entity: EntityRef,
    identifier: String,
    fields: Fields,
}

impl ComponentHandle {
    pub fn entity(&self) -> EntityRef {
        self.entity
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(Value::as_f64)
    }

    /// Stage a field value
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Script-facing JSON form: the fields plus reference metadata
    pub fn to_json(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("__type__".to_string(), Value::from("component"));
        object.insert("__identifier__".to_string(), Value::from(self.identifier.clone()));
        Value::Object(object)
    }
}

/// Schema-validated component storage with a per-component entity index
#[derive(Debug)]
pub struct ComponentStore {
    schemas: HashMap<String, ComponentSchema>,
    data: HashMap<EntityRef, BTreeMap<String, Fields>>,
    index: HashMap<String, BTreeSet<EntityRef>>,
}

impl ComponentStore {
    /// Create a store preloaded with the built-in schema table
    pub fn new() -> Self {
        let schemas = builtin_schemas()
            .into_iter()
            .map(|schema| (schema.identifier.clone(), schema))
            .collect();
        Self {
            schemas,
            data: HashMap::new(),
            index: HashMap::new(),
        }
    }

    /// Register a custom component schema
    pub fn register_schema(&mut self, schema: ComponentSchema) -> Result<()> {
        let identifier = schema.identifier.clone();
        if identifier.trim().is_empty() {
            return Err(ScriptError::UnknownComponent(identifier));
        }
        if builtin::is_reserved(&identifier)
            || self.schemas.get(&identifier).is_some_and(|s| s.builtin)
        {
            return Err(ScriptError::ReservedComponent(identifier));
        }
        if self.schemas.contains_key(&identifier) {
            return Err(ScriptError::DuplicateComponent(identifier));
        }
        schema.validate_defaults()?;
        if !identifier.contains(':') {
            tracing::warn!(
                "Component '{}' has no namespace; use 'namespace:name' to avoid collisions",
                identifier
            );
        }

        tracing::debug!("Registered component '{}' ({} fields)", identifier, schema.fields.len());
        self.schemas.insert(identifier, ComponentSchema { builtin: false, ..schema });
        Ok(())
    }

    pub fn schema(&self, identifier: &str) -> Option<&ComponentSchema> {
        self.schemas.get(identifier)
    }

    fn require_schema(&self, identifier: &str) -> Result<&ComponentSchema> {
        self.schema(identifier)
            .ok_or_else(|| ScriptError::UnknownComponent(identifier.to_string()))
    }

    pub fn is_builtin(&self, identifier: &str) -> bool {
        self.schema(identifier).is_some_and(|s| s.builtin)
    }

    /// Attach a component, or return the existing one unchanged
    pub fn create(&mut self, entity: EntityRef, identifier: &str) -> Result<ComponentHandle> {
        let defaults = self.require_schema(identifier)?.instantiate();
        let fields = self
            .data
            .entry(entity)
            .or_default()
            .entry(identifier.to_string())
            .or_insert_with(|| {
                tracing::trace!("Attached '{}' to {}", identifier, entity);
                defaults
            })
            .clone();
        self.index
            .entry(identifier.to_string())
            .or_default()
            .insert(entity);

        Ok(ComponentHandle {
            entity,
            identifier: identifier.to_string(),
            fields,
        })
    }

    /// Attach a component and merge `overrides` over its defaults
    pub fn create_with(
        &mut self,
        entity: EntityRef,
        identifier: &str,
        overrides: &Fields,
    ) -> Result<ComponentHandle> {
        let mut handle = self.create(entity, identifier)?;
        handle.fields.extend(overrides.clone());
        self.commit(&handle)?;
        self.get(entity, identifier)
    }

    /// Whether `entity` owns the component; unknown identifiers fail
    pub fn has(&self, entity: EntityRef, identifier: &str) -> Result<bool> {
        self.require_schema(identifier)?;
        Ok(self.fields(entity, identifier).is_some())
    }

    /// Detached copy of a component
    pub fn get(&self, entity: EntityRef, identifier: &str) -> Result<ComponentHandle> {
        self.require_schema(identifier)?;
        let fields = self
            .fields(entity, identifier)
            .ok_or_else(|| ScriptError::MissingComponent {
                entity,
                component: identifier.to_string(),
            })?;
        Ok(ComponentHandle {
            entity,
            identifier: identifier.to_string(),
            fields: fields.clone(),
        })
    }

    /// Replace the authoritative copy with the handle's staged fields
    ///
    /// Unknown fields are dropped; a field of the wrong kind rejects the whole
    /// commit and leaves the stored copy untouched. Returns the committed fields.
    pub fn commit(&mut self, handle: &ComponentHandle) -> Result<Fields> {
        let schema = self.require_schema(&handle.identifier)?;
        let current = self
            .fields(handle.entity, &handle.identifier)
            .ok_or_else(|| ScriptError::MissingComponent {
                entity: handle.entity,
                component: handle.identifier.clone(),
            })?;

        let mut merged = schema.merge(current, &handle.fields)?;
        if schema.builtin {
            builtin::normalize(&handle.identifier, &mut merged);
        }

        if let Some(slot) = self
            .data
            .get_mut(&handle.entity)
            .and_then(|components| components.get_mut(&handle.identifier))
        {
            *slot = merged.clone();
        }
        Ok(merged)
    }

    /// Remove a custom component from an entity
    pub fn destroy(&mut self, entity: EntityRef, identifier: &str) -> Result<()> {
        if self.require_schema(identifier)?.builtin {
            return Err(ScriptError::BuiltinComponentRemoval(identifier.to_string()));
        }
        let removed = self
            .data
            .get_mut(&entity)
            .and_then(|components| components.remove(identifier));
        if removed.is_none() {
            return Err(ScriptError::MissingComponent {
                entity,
                component: identifier.to_string(),
            });
        }
        self.unindex(entity, identifier);
        Ok(())
    }

    /// Drop every component of an entity without any per-component notification
    pub fn remove_entity(&mut self, entity: EntityRef) {
        if let Some(components) = self.data.remove(&entity) {
            for identifier in components.keys() {
                self.unindex(entity, identifier);
            }
        }
    }

    fn unindex(&mut self, entity: EntityRef, identifier: &str) {
        if let Some(owners) = self.index.get_mut(identifier) {
            owners.remove(&entity);
            if owners.is_empty() {
                self.index.remove(identifier);
            }
        }
    }

    /// Borrow the authoritative fields of a component
    pub fn fields(&self, entity: EntityRef, identifier: &str) -> Option<&Fields> {
        self.data
            .get(&entity)
            .and_then(|components| components.get(identifier))
    }

    /// Entities owning a component, in ascending id order
    pub fn owners(&self, identifier: &str) -> impl Iterator<Item = EntityRef> + '_ {
        self.index.get(identifier).into_iter().flatten().copied()
    }

    pub fn owner_count(&self, identifier: &str) -> usize {
        self.index.get(identifier).map_or(0, BTreeSet::len)
    }

    /// Identifiers of the components an entity owns
    pub fn components_of(&self, entity: EntityRef) -> Vec<&str> {
        self.data
            .get(&entity)
            .map(|components| components.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

impl Default for ComponentStore {
    fn default() -> Self {
        Self::new()
    }
}
