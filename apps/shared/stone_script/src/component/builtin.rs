//! Built-in component table
//!
//! Fixed schemas the host entity representation requires, plus the
//! schema-specific normalization applied when a script commits changes.

use serde_json::{Value, json};

use super::schema::{ComponentSchema, FieldKind, Fields, number};

/// Reserved namespace of built-in components and events
pub const BUILTIN_PREFIX: &str = "minecraft:";

pub const POSITION: &str = "minecraft:position";
pub const ROTATION: &str = "minecraft:rotation";
pub const HEALTH: &str = "minecraft:health";
pub const NAMEABLE: &str = "minecraft:nameable";
pub const ATTACK: &str = "minecraft:attack";
pub const COLLISION_BOX: &str = "minecraft:collision_box";
pub const EQUIPMENT: &str = "minecraft:equipment";

/// Largest finite resistance; JSON cannot carry infinity
const MAX_RESISTANCE: f64 = 3.4e38;

/// Every built-in schema
pub fn builtin_schemas() -> Vec<ComponentSchema> {
    use FieldKind::*;

    vec![
        ComponentSchema::new(ATTACK)
            .with_field("damage", Range, json!([1, 1]))
            .with_field("effect_name", String, json!(""))
            .with_field("effect_duration", Number, json!(0.0)),
        ComponentSchema::new(COLLISION_BOX)
            .with_field("width", Number, json!(1.0))
            .with_field("height", Number, json!(1.0)),
        ComponentSchema::new("minecraft:damage_sensor")
            .with_field("on_damage", Any, json!([]))
            .with_field("deals_damage", Bool, json!(true))
            .with_field("cause", String, json!("all")),
        ComponentSchema::new(EQUIPMENT)
            .with_field("table", String, json!(""))
            .with_field("slot_drop_chance", List, json!([])),
        ComponentSchema::new("minecraft:equippable")
            .with_field("accepted_items", List, json!([]))
            .with_field("interact_text", String, json!(""))
            .with_field("item", String, json!(""))
            .with_field("on_equip", String, json!(""))
            .with_field("on_unequip", String, json!(""))
            .with_field("slot", Number, json!(0)),
        ComponentSchema::new("minecraft:explode")
            .with_field("fuseLength", Range, json!([0.0, 0.0]))
            .with_field("power", Number, json!(3.0))
            .with_field("maxResistance", Number, json!(MAX_RESISTANCE))
            .with_field("fuseLit", Bool, json!(false))
            .with_field("causesFire", Bool, json!(false))
            .with_field("breaks_blocks", Bool, json!(true))
            .with_field("fireAffectedByGriefing", Bool, json!(false))
            .with_field("destroyAffectedByGriefing", Bool, json!(false)),
        ComponentSchema::new("minecraft:healable")
            .with_field("force_use", Bool, json!(false))
            .with_field("filters", Any, json!({"all_of": []}))
            .with_field("items", List, json!([])),
        ComponentSchema::new(HEALTH)
            .with_field("value", Number, json!(1))
            .with_field("max", Number, json!(10)),
        ComponentSchema::new("minecraft:interact")
            .with_field("spawn_entities", List, json!([]))
            .with_field("on_interact", String, json!(""))
            .with_field("cooldown", Number, json!(0.0))
            .with_field("swing", Bool, json!(false))
            .with_field("use_item", Bool, json!(false))
            .with_field("hurt_item", Number, json!(0))
            .with_field("interact_text", String, json!(""))
            .with_field("transform_to_item", String, json!(""))
            .with_field("play_sounds", Any, json!([])),
        ComponentSchema::new("minecraft:inventory")
            .with_field("container_type", String, json!("none"))
            .with_field("inventory_size", Number, json!(5))
            .with_field("can_be_siphoned_from", Bool, json!(false))
            .with_field("private", Bool, json!(false))
            .with_field("restrict_to_owner", Bool, json!(false))
            .with_field("additional_slots_per_strength", Number, json!(0)),
        ComponentSchema::new("minecraft:lookat")
            .with_field("filters", Any, json!({"all_of": []}))
            .with_field("look_cooldown", Range, json!([0.0, 0.0]))
            .with_field("look_event", String, json!(""))
            .with_field("mAllowInvulnerable", Bool, json!(false))
            .with_field("searchRadius", Number, json!(10.0))
            .with_field("setTarget", Bool, json!(true)),
        ComponentSchema::new(NAMEABLE)
            .with_field("name_actions", Any, json!(null))
            .with_field("default_trigger", String, json!(""))
            .with_field("alwaysShow", Bool, json!(false))
            .with_field("allowNameTagRenaming", Bool, json!(true))
            .with_field("name", String, json!("")),
        ComponentSchema::new(POSITION)
            .with_field("x", Number, json!(0.0))
            .with_field("y", Number, json!(0.0))
            .with_field("z", Number, json!(0.0)),
        ComponentSchema::new(ROTATION)
            .with_field("x", Number, json!(0.0))
            .with_field("y", Number, json!(0.0)),
        ComponentSchema::new("minecraft:shooter")
            .with_field("def", String, json!(""))
            .with_field("auxVal", Number, json!(-1)),
        ComponentSchema::new("minecraft:spawn_entity")
            .with_field("min_wait_time", Number, json!(300))
            .with_field("max_wait_time", Number, json!(600))
            .with_field("spawn_sound", String, json!("plop"))
            .with_field("spawn_item", String, json!("egg"))
            .with_field("spawn_entity", String, json!(""))
            .with_field("spawn_method", String, json!("born"))
            .with_field("spawn_event", String, json!("minecraft:entity_born")),
        ComponentSchema::new("minecraft:teleport")
            .with_field("darkTeleportChance", Number, json!(0.01))
            .with_field("lightTeleportChance", Number, json!(0.01))
            .with_field("maxRandomTeleportTime", Number, json!(20.0))
            .with_field("minRandomTeleportTime", Number, json!(0.0))
            .with_field("randomTeleportCube", Vec3, json!([32.0, 16.0, 32.0]))
            .with_field("randomTeleports", Bool, json!(true))
            .with_field("targetDistance", Number, json!(16.0))
            .with_field("target_teleport_chance", Number, json!(1.0)),
    ]
    .into_iter()
    .map(ComponentSchema::as_builtin)
    .collect()
}

/// Whether an identifier lives in the reserved built-in namespace
pub fn is_reserved(identifier: &str) -> bool {
    identifier.starts_with(BUILTIN_PREFIX)
}

/// Apply the schema-specific invariants of a built-in component before commit
pub fn normalize(identifier: &str, fields: &mut Fields) {
    match identifier {
        HEALTH => {
            if let (Some(value), Some(max)) = (number(fields, "value"), number(fields, "max")) {
                if value > max {
                    fields.insert("value".to_string(), json!(max));
                }
            }
        }
        ATTACK => {
            if let Some(Value::Array(damage)) = fields.get_mut("damage") {
                let low = damage.first().and_then(Value::as_f64);
                let high = damage.get(1).and_then(Value::as_f64);
                if let (Some(low), Some(high)) = (low, high) {
                    if low > high {
                        damage.swap(0, 1);
                    }
                }
            }
        }
        COLLISION_BOX => {
            for dimension in ["width", "height"] {
                if number(fields, dimension).is_some_and(|v| v < 0.0) {
                    fields.insert(dimension.to_string(), json!(0.0));
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_builtin_defaults_match_their_kinds() {
        for schema in builtin_schemas() {
            assert!(schema.builtin);
            assert!(is_reserved(&schema.identifier));
            schema.validate_defaults().unwrap();
        }
    }

    #[test]
    fn test_health_is_clamped_to_max() {
        let mut health = fields(json!({"value": 25, "max": 20}));
        normalize(HEALTH, &mut health);
        assert_eq!(health["value"], json!(20.0));
    }

    #[test]
    fn test_attack_range_is_ordered() {
        let mut attack = fields(json!({"damage": [7, 3]}));
        normalize(ATTACK, &mut attack);
        assert_eq!(attack["damage"], json!([3, 7]));
    }

    #[test]
    fn test_negative_collision_box_is_zeroed() {
        let mut collision = fields(json!({"width": -2.0, "height": 1.5}));
        normalize(COLLISION_BOX, &mut collision);
        assert_eq!(collision["width"], json!(0.0));
        assert_eq!(collision["height"], json!(1.5));
    }
}
