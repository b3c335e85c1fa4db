use serde::Serialize;

use crate::entity::EntityRef;

/// Highest permission level (World Owner / console)
pub const MAX_PERMISSION_LEVEL: u8 = 4;

/// Invocation context of a command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOrigin {
    pub name: String,
    pub block_pos: [i32; 3],
    pub world_pos: [f64; 3],
    /// Acting entity; `None` for the console
    pub entity: Option<EntityRef>,
    pub permission_level: u8,
}

impl CommandOrigin {
    /// Console origin at World Owner level
    pub fn console(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            block_pos: [0; 3],
            world_pos: [0.0; 3],
            entity: None,
            permission_level: MAX_PERMISSION_LEVEL,
        }
    }

    /// Origin acting as an entity standing at `world_pos`
    pub fn entity(name: impl Into<String>, entity: EntityRef, world_pos: [f64; 3], permission_level: u8) -> Self {
        Self {
            name: name.into(),
            block_pos: world_pos.map(|c| c.floor() as i32),
            world_pos,
            entity: Some(entity),
            permission_level: permission_level.min(MAX_PERMISSION_LEVEL),
        }
    }

    pub fn with_permission_level(mut self, level: u8) -> Self {
        self.permission_level = level.min(MAX_PERMISSION_LEVEL);
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use serde_json::json;

    #[test]
    fn test_block_pos_floors_world_pos() {
        let steve = EntityRef {
            id: 2,
            kind: EntityType::Entity,
        };
        let origin = CommandOrigin::entity("Steve", steve, [1.5, -0.5, 3.0], 9);
        assert_eq!(origin.block_pos, [1, -1, 3]);
        assert_eq!(origin.permission_level, MAX_PERMISSION_LEVEL);
    }

    #[test]
    fn test_json_shape() {
        let origin = CommandOrigin::console("Server");
        assert_eq!(
            origin.to_json(),
            json!({
                "name": "Server",
                "blockPos": [0, 0, 0],
                "worldPos": [0.0, 0.0, 0.0],
                "entity": null,
                "permissionLevel": 4
            })
        );
    }
}
