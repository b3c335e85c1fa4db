//! Component schemas
//!
//! A schema is a closed, ordered list of field descriptors. Component data is a
//! JSON object validated against it on creation and on every commit.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::EntityRef;
use crate::error::{Result, ScriptError};

/// Field values of one component instance
pub type Fields = Map<String, Value>;

/// Primitive kind of a schema field
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Bool,
    Number,
    String,
    /// `[min, max]` pair of numbers
    Range,
    /// `[x, y, z]` triple of numbers
    Vec3,
    /// Entity reference object, or null
    Entity,
    /// Any JSON array
    List,
    /// Any JSON value
    Any,
}

impl FieldKind {
    /// Validate a JSON value against this kind
    pub fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        match self {
            FieldKind::Bool if !value.is_boolean() => Err("expected a boolean".to_string()),
            FieldKind::Number if !value.is_number() => Err("expected a number".to_string()),
            FieldKind::String if !value.is_string() => Err("expected a string".to_string()),
            FieldKind::Range if !is_numeric_array(value, 2) => Err("expected [min, max]".to_string()),
            FieldKind::Vec3 if !is_numeric_array(value, 3) => Err("expected [x, y, z]".to_string()),
            FieldKind::Entity => {
                if value.is_null() || EntityRef::from_json(value).is_some() {
                    Ok(())
                } else {
                    Err("expected an entity reference".to_string())
                }
            }
            FieldKind::List if !value.is_array() => Err("expected an array".to_string()),
            _ => Ok(()),
        }
    }

    /// Infer a kind from the default value a script registers a field with
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => FieldKind::Bool,
            Value::Number(_) => FieldKind::Number,
            Value::String(_) => FieldKind::String,
            Value::Array(_) => FieldKind::List,
            Value::Object(_) if EntityRef::from_json(value).is_some() => FieldKind::Entity,
            Value::Object(_) | Value::Null => FieldKind::Any,
        }
    }
}

fn is_numeric_array(value: &Value, len: usize) -> bool {
    value
        .as_array()
        .is_some_and(|items| items.len() == len && items.iter().all(Value::is_number))
}

/// One field of a schema
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub default: Value,
}

/// Schema of a built-in or custom component
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ComponentSchema {
    /// Namespaced identifier (e.g. "minecraft:health", "mypack:mana")
    pub identifier: String,
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub builtin: bool,
}

impl ComponentSchema {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            fields: Vec::new(),
            builtin: false,
        }
    }

    /// Add a field; a later field with the same name replaces the earlier one
    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind, default: Value) -> Self {
        let name = name.into();
        self.fields.retain(|f| f.name != name);
        self.fields.push(FieldDescriptor { name, kind, default });
        self
    }

    pub(crate) fn as_builtin(mut self) -> Self {
        self.builtin = true;
        self
    }

    /// Build a custom schema from a JSON object of field defaults
    ///
    /// Each field's kind is inferred from its default value.
    pub fn from_defaults(identifier: impl Into<String>, defaults: &Value) -> Result<Self> {
        let identifier = identifier.into();
        let object = defaults.as_object().ok_or_else(|| ScriptError::SchemaViolation {
            component: identifier.clone(),
            field: String::new(),
            reason: "component data must be an object".to_string(),
        })?;

        let mut schema = Self::new(identifier);
        for (name, default) in object {
            schema = schema.with_field(name.clone(), FieldKind::infer(default), default.clone());
        }
        Ok(schema)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Fresh field set holding every default
    pub fn instantiate(&self) -> Fields {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.default.clone()))
            .collect()
    }

    /// Check schema defaults against their declared kinds
    pub fn validate_defaults(&self) -> Result<()> {
        for field in &self.fields {
            field
                .kind
                .validate(&field.default)
                .map_err(|reason| self.violation(&field.name, reason))?;
        }
        Ok(())
    }

    /// Merge a partial update over `base`
    ///
    /// Fields the schema does not declare are ignored; a declared field with a
    /// value of the wrong kind fails the whole merge.
    pub fn merge(&self, base: &Fields, updates: &Fields) -> Result<Fields> {
        let mut merged = base.clone();
        for (name, value) in updates {
            let Some(field) = self.field(name) else {
                tracing::trace!("Ignoring unknown field '{}' on '{}'", name, self.identifier);
                continue;
            };
            field
                .kind
                .validate(value)
                .map_err(|reason| self.violation(name, reason))?;
            merged.insert(name.clone(), value.clone());
        }
        Ok(merged)
    }

    fn violation(&self, field: &str, reason: String) -> ScriptError {
        ScriptError::SchemaViolation {
            component: self.identifier.clone(),
            field: field.to_string(),
            reason,
        }
    }
}

/// Read a numeric field
pub fn number(fields: &Fields, name: &str) -> Option<f64> {
    fields.get(name).and_then(Value::as_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_field_kind_validation() {
        assert!(FieldKind::Number.validate(&json!(3.5)).is_ok());
        assert!(FieldKind::Number.validate(&json!("3.5")).is_err());
        assert!(FieldKind::Range.validate(&json!([1, 2])).is_ok());
        assert!(FieldKind::Range.validate(&json!([1, 2, 3])).is_err());
        assert!(FieldKind::Vec3.validate(&json!([0, 1.5, -2])).is_ok());
        assert!(FieldKind::Vec3.validate(&json!(["a", 1, 2])).is_err());
        assert!(FieldKind::Entity.validate(&json!(null)).is_ok());
        assert!(FieldKind::Entity.validate(&json!({"__type__": "entity", "id": 1})).is_ok());
        assert!(FieldKind::Entity.validate(&json!(1)).is_err());
        assert!(FieldKind::Any.validate(&json!({"whatever": [1]})).is_ok());
    }

    #[test]
    fn test_kind_inference() {
        let schema = ComponentSchema::from_defaults(
            "pack:stats",
            &json!({"mana": 10, "name": "", "alive": true, "tags": [], "owner": null}),
        )
        .unwrap();
        assert_eq!(schema.field("mana").unwrap().kind, FieldKind::Number);
        assert_eq!(schema.field("name").unwrap().kind, FieldKind::String);
        assert_eq!(schema.field("alive").unwrap().kind, FieldKind::Bool);
        assert_eq!(schema.field("tags").unwrap().kind, FieldKind::List);
        assert_eq!(schema.field("owner").unwrap().kind, FieldKind::Any);
    }

    #[test]
    fn test_defaults_must_be_object() {
        assert!(ComponentSchema::from_defaults("pack:bad", &json!(5)).is_err());
    }

    #[test]
    fn test_merge_ignores_unknown_fields() {
        let schema = ComponentSchema::new("pack:pos")
            .with_field("x", FieldKind::Number, json!(0))
            .with_field("y", FieldKind::Number, json!(0));
        let merged = schema
            .merge(&schema.instantiate(), &fields(json!({"x": 4, "w": 9})))
            .unwrap();
        assert_eq!(merged, fields(json!({"x": 4, "y": 0})));
    }

    #[test]
    fn test_merge_rejects_wrong_kind() {
        let schema = ComponentSchema::new("pack:pos").with_field("x", FieldKind::Number, json!(0));
        let err = schema
            .merge(&schema.instantiate(), &fields(json!({"x": "far"})))
            .unwrap_err();
        assert!(matches!(err, ScriptError::SchemaViolation { field, .. } if field == "x"));
    }

    #[test]
    fn test_with_field_replaces_same_name() {
        let schema = ComponentSchema::new("pack:a")
            .with_field("v", FieldKind::Number, json!(1))
            .with_field("v", FieldKind::String, json!(""));
        assert_eq!(schema.fields.len(), 1);
        assert_eq!(schema.field("v").unwrap().kind, FieldKind::String);
    }
}
