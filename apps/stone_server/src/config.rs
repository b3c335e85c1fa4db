use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use stone_schema::Validatable;
use stone_script::WorldFacts;

use crate::systems::BUILTIN_SYSTEMS;

/// Components an entity template starts with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateConfig {
    /// Whether the template describes an item entity
    #[serde(default)]
    #[schemars(description = "Template describes an item entity rather than a generic one")]
    pub item: bool,

    /// Component identifier -> field overrides
    #[serde(default)]
    #[schemars(description = "Components the entity starts with, as identifier -> field overrides")]
    pub components: BTreeMap<String, Map<String, Value>>,
}

/// Player spawned at start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlayerConfig {
    #[schemars(description = "Player name (minecraft:nameable)")]
    pub name: String,

    #[serde(default)]
    #[schemars(description = "Spawn position [x, y, z]")]
    pub position: [f64; 3],

    #[serde(default)]
    #[schemars(description = "Command permission level", range(min = 0, max = 4))]
    pub permission_level: u8,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Server name
    #[serde(default = "default_name")]
    #[schemars(description = "Human-readable server name")]
    pub name: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[schemars(description = "Log level: trace, debug, info, warn, error")]
    #[schemars(regex(pattern = r"^(trace|debug|info|warn|error)$"))]
    pub log_level: String,

    /// Server tick rate in Hz
    #[serde(default = "default_tick_rate")]
    #[schemars(description = "Update frequency in ticks per second", range(min = 1, max = 1000))]
    pub tick_rate: u64,

    /// Name the stdin console uses as command origin
    #[serde(default = "default_console_name")]
    #[schemars(description = "Origin name of commands typed on the server console")]
    pub console_name: String,

    #[serde(default = "default_console_permission_level")]
    #[schemars(description = "Permission level of the server console", range(min = 0, max = 4))]
    pub console_permission_level: u8,

    /// Initial world state
    #[serde(default)]
    #[schemars(description = "Initial time, weather, difficulty and game rules")]
    pub world: WorldFacts,

    #[serde(default)]
    #[schemars(description = "Entity templates by identifier")]
    pub templates: BTreeMap<String, TemplateConfig>,

    #[serde(default)]
    #[schemars(description = "Players spawned at start")]
    pub players: Vec<PlayerConfig>,

    /// Built-in systems to run
    #[serde(default = "default_systems")]
    #[schemars(description = "Built-in systems to register, in order")]
    pub systems: Vec<String>,
}

fn default_name() -> String {
    "Stone Server".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_rate() -> u64 {
    20
}

fn default_console_name() -> String {
    "Server".to_string()
}

fn default_console_permission_level() -> u8 {
    4
}

fn default_systems() -> Vec<String> {
    vec!["commands".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            tick_rate: default_tick_rate(),
            console_name: default_console_name(),
            console_permission_level: default_console_permission_level(),
            world: WorldFacts::default(),
            templates: BTreeMap::new(),
            players: Vec::new(),
            systems: default_systems(),
        }
    }
}

impl Validatable for Config {}

impl Config {
    /// Checks the schema cannot express
    pub fn validate_systems(&self) -> Result<(), String> {
        for name in &self.systems {
            if !BUILTIN_SYSTEMS.contains(&name.as_str()) {
                return Err(format!(
                    "Unknown system '{}' (available: {})",
                    name,
                    BUILTIN_SYSTEMS.join(", ")
                ));
            }
        }
        for template in self.templates.keys() {
            if !template.contains(':') {
                return Err(format!("Template '{}' must be namespaced (e.g. 'minecraft:cow')", template));
            }
        }
        Ok(())
    }
}
