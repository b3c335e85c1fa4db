//! Entity Registry
//!
//! Sole owner of entity identity and validity. Everything else holds
//! [`EntityRef`] values, which are weak: they may outlive the entity, and
//! [`EntityRegistry::is_valid`] is the only way to know whether they still resolve.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScriptError};

/// Template identifier of player entities
pub const PLAYER_TEMPLATE: &str = "minecraft:player";

/// Type tag of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[serde(alias = "generic")]
    Entity,
    #[serde(alias = "item")]
    ItemEntity,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Entity => "entity",
            EntityType::ItemEntity => "item_entity",
        }
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "entity" | "generic" => Ok(EntityType::Entity),
            "item_entity" | "item" => Ok(EntityType::ItemEntity),
            other => Err(format!("unknown entity type '{}'", other)),
        }
    }
}

/// Script-facing reference to an entity
///
/// Serializes as `{"__type__": "entity", "id": 7}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: u64,
    #[serde(rename = "__type__")]
    pub kind: EntityType,
}

impl EntityRef {
    /// Read an entity reference out of a JSON payload
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "__type__": self.kind.as_str(), "id": self.id })
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind.as_str(), self.id)
    }
}

/// Bookkeeping for a live entity
#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub entity: EntityRef,
    /// Template the entity was instantiated from, if any
    pub template: Option<String>,
}

/// Identity and validity tracking for world objects
///
/// Identifiers are allocated monotonically and never reused, so a destroyed
/// reference can never resolve to a live entity again.
#[derive(Debug)]
pub struct EntityRegistry {
    next_id: u64,
    live: BTreeMap<u64, EntityRecord>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            live: BTreeMap::new(),
        }
    }

    /// Allocate a new live entity
    pub fn create(&mut self, kind: EntityType, template: Option<String>) -> EntityRef {
        let entity = EntityRef {
            id: self.next_id,
            kind,
        };
        self.next_id += 1;
        self.live.insert(entity.id, EntityRecord { entity, template });
        entity
    }

    /// Invalidate an entity; fails if it is not (or no longer) live
    pub fn destroy(&mut self, entity: EntityRef) -> Result<EntityRecord> {
        if !self.is_valid(entity) {
            return Err(ScriptError::InvalidEntity(entity));
        }
        self.live
            .remove(&entity.id)
            .ok_or(ScriptError::InvalidEntity(entity))
    }

    pub fn is_valid(&self, entity: EntityRef) -> bool {
        self.live
            .get(&entity.id)
            .is_some_and(|record| record.entity.kind == entity.kind)
    }

    /// Fail with `InvalidEntity` unless the entity is live
    pub fn ensure_valid(&self, entity: EntityRef) -> Result<()> {
        if self.is_valid(entity) {
            Ok(())
        } else {
            Err(ScriptError::InvalidEntity(entity))
        }
    }

    pub fn record(&self, entity: EntityRef) -> Option<&EntityRecord> {
        self.live
            .get(&entity.id)
            .filter(|record| record.entity.kind == entity.kind)
    }

    /// Template identifier of a live entity
    pub fn template(&self, entity: EntityRef) -> Option<&str> {
        self.record(entity).and_then(|r| r.template.as_deref())
    }

    pub fn is_player(&self, entity: EntityRef) -> bool {
        self.template(entity) == Some(PLAYER_TEMPLATE)
    }

    /// Live entities in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.live.values().map(|record| record.entity)
    }

    /// Live player entities in ascending id order
    pub fn players(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.live
            .values()
            .filter(|record| record.template.as_deref() == Some(PLAYER_TEMPLATE))
            .map(|record| record.entity)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
