//! World-level facts consulted by filters

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Ticks in one in-game day
pub const TICKS_PER_DAY: u32 = 24000;

/// Daylight covers the first half of the day cycle
const DAYLIGHT_TICKS: u32 = 12000;

const MOON_PHASES: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    #[default]
    Clear,
    Rain,
    Thunder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Peaceful,
    Easy,
    #[default]
    Normal,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Peaceful => "peaceful",
            Difficulty::Easy => "easy",
            Difficulty::Normal => "normal",
            Difficulty::Hard => "hard",
        }
    }
}

/// Time, weather and rules of the running world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorldFacts {
    /// Ticks into the current day (0..24000)
    #[serde(default)]
    #[schemars(range(max = 23999))]
    pub time_of_day: u32,

    #[serde(default)]
    pub day: u64,

    #[serde(default)]
    pub weather: Weather,

    #[serde(default)]
    pub difficulty: Difficulty,

    /// Boolean game rules by name
    #[serde(default = "default_game_rules")]
    pub game_rules: BTreeMap<String, bool>,
}

fn default_game_rules() -> BTreeMap<String, bool> {
    [
        ("dodaylightcycle", true),
        ("domobspawning", true),
        ("keepinventory", false),
        ("pvp", true),
    ]
    .into_iter()
    .map(|(rule, enabled)| (rule.to_string(), enabled))
    .collect()
}

impl Default for WorldFacts {
    fn default() -> Self {
        Self {
            time_of_day: 0,
            day: 0,
            weather: Weather::default(),
            difficulty: Difficulty::default(),
            game_rules: default_game_rules(),
        }
    }
}

impl WorldFacts {
    pub fn is_daytime(&self) -> bool {
        self.time_of_day < DAYLIGHT_TICKS
    }

    /// Fraction of the day elapsed, in `[0.0, 1.0)`
    pub fn clock_time(&self) -> f64 {
        f64::from(self.time_of_day) / f64::from(TICKS_PER_DAY)
    }

    pub fn moon_phase(&self) -> u64 {
        self.day % MOON_PHASES
    }

    /// Game rules are case-insensitive
    pub fn game_rule(&self, rule: &str) -> Option<bool> {
        self.game_rules
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(rule))
            .map(|(_, enabled)| *enabled)
    }

    pub fn set_game_rule(&mut self, rule: &str, enabled: bool) {
        self.game_rules.retain(|name, _| !name.eq_ignore_ascii_case(rule));
        self.game_rules.insert(rule.to_ascii_lowercase(), enabled);
    }

    /// Move the clock forward, rolling over into following days
    ///
    /// A disabled `dodaylightcycle` rule freezes the clock.
    pub fn advance(&mut self, ticks: u32) {
        if self.game_rule("dodaylightcycle") == Some(false) {
            return;
        }
        let total = u64::from(self.time_of_day) + u64::from(ticks);
        let per_day = u64::from(TICKS_PER_DAY);
        self.day += total / per_day;
        self.time_of_day = (total % per_day) as u32;
    }
}
