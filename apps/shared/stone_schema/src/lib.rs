//! Schema checked loading for Stone documents
//!
//! The server config is described once with `schemars` derives. Documents are
//! checked against that schema before serde sees them, so a bad value is reported
//! with its JSON pointer (`/tick_rate: 0 is less than the minimum of 1`) and not as
//! a bare deserialization failure. Script API version checks are in [`version`].

use serde::Deserialize;
use schemars::JsonSchema;
use std::fs;

pub mod error;
pub mod version;

pub use error::{SchemaError, Result};
pub use version::{ApiVersion, check_api_compatibility};

/// A document whose derived JSON Schema gates deserialization
pub trait Validatable: JsonSchema + for<'de> Deserialize<'de> {
    /// Read `path`, then go through [`Validatable::from_json_str`]
    fn from_json_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| SchemaError::IoError(path.to_string(), e))?;
        Self::from_json_str(&content)
    }

    fn from_json_str(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_json_value(value)
    }

    /// Check `value` against the schema, then deserialize it
    ///
    /// Every violation is reported, one per line, prefixed with the pointer of
    /// the offending value.
    fn from_json_value(value: serde_json::Value) -> Result<Self> {
        let schema = serde_json::to_value(Self::root_schema())?;
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| SchemaError::ValidationError(e.to_string()))?;

        let violations: Vec<String> = validator
            .iter_errors(&value)
            .map(|e| match e.instance_path.to_string() {
                at if at.is_empty() => e.to_string(),
                at => format!("{}: {}", at, e),
            })
            .collect();
        if !violations.is_empty() {
            return Err(SchemaError::ValidationError(violations.join("\n")));
        }

        Ok(serde_json::from_value(value)?)
    }

    fn root_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Self)
    }

    /// Pretty printed schema, what `--print-schema` shows
    fn schema_json() -> Result<String> {
        Ok(serde_json::to_string_pretty(&Self::root_schema())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct Settings {
        /// Ticks per second
        #[schemars(range(min = 1, max = 10))]
        tick_rate: u8,
        #[serde(default)]
        console_name: String,
    }

    impl Validatable for Settings {}

    #[test]
    fn test_valid_document() {
        let settings = Settings::from_json_str(r#"{"tick_rate": 3}"#).unwrap();
        assert_eq!(settings.tick_rate, 3);
        assert_eq!(settings.console_name, "");
    }

    #[test]
    fn test_schema_violation() {
        let err = Settings::from_json_str(r#"{"tick_rate": 42}"#).unwrap_err();
        assert!(matches!(err, SchemaError::ValidationError(_)));
    }

    #[test]
    fn test_violations_name_their_location() {
        let err = Settings::from_json_value(json!({"tick_rate": 0, "console_name": 5})).unwrap_err();
        let SchemaError::ValidationError(message) = err else {
            panic!("expected a validation error, got {:?}", err);
        };
        let lines: Vec<&str> = message.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|line| line.starts_with("/tick_rate: ")));
        assert!(lines.iter().any(|line| line.starts_with("/console_name: ")));
    }

    #[test]
    fn test_parse_error() {
        let err = Settings::from_json_str("{tick_rate").unwrap_err();
        assert!(matches!(err, SchemaError::ParseError(_)));
    }

    #[test]
    fn test_schema_json_carries_descriptions() {
        let json = Settings::schema_json().unwrap();
        assert!(json.contains("\"tick_rate\""));
        assert!(json.contains("Ticks per second"));
    }
}
