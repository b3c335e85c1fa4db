//! Filter Evaluator
//!
//! Filters are immutable boolean trees parsed from JSON documents:
//!
//! ```json
//! { "all_of": [
//!     { "test": "has_component", "value": "minecraft:health" },
//!     { "test": "is_daytime", "value": true },
//!     { "test": "moon_phase", "operator": ">=", "value": 4 }
//! ] }
//! ```
//!
//! All configuration errors are reported by [`Filter::from_json`]. Evaluation
//! is total: an unbound subject, an unknown predicate or a type mismatch make
//! a leaf `false` instead of failing.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::component::{ComponentStore, builtin, number};
use crate::entity::{EntityRef, EntityRegistry};
use crate::error::{Result, ScriptError};
use crate::host::Host;
use crate::world::{Weather, WorldFacts};

/// Entity a leaf test is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Subject {
    #[default]
    This,
    Other,
    Parent,
    Player,
    Target,
}

impl FromStr for Subject {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "self" => Ok(Subject::This),
            "other" => Ok(Subject::Other),
            "parent" => Ok(Subject::Parent),
            "player" => Ok(Subject::Player),
            "target" => Ok(Subject::Target),
            other => Err(ScriptError::InvalidFilter(format!("unknown subject '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    #[default]
    Equals,
    NotEquals,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

impl Operator {
    pub fn is_ordering(&self) -> bool {
        !matches!(self, Operator::Equals | Operator::NotEquals)
    }
}

impl FromStr for Operator {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "equals" | "==" => Ok(Operator::Equals),
            "not" | "!=" | "<>" => Ok(Operator::NotEquals),
            "<" => Ok(Operator::Less),
            ">" => Ok(Operator::Greater),
            "<=" => Ok(Operator::LessOrEqual),
            ">=" => Ok(Operator::GreaterOrEqual),
            other => Err(ScriptError::InvalidFilter(format!("unknown operator '{}'", other))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Equals => "==",
            Operator::NotEquals => "!=",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::LessOrEqual => "<=",
            Operator::GreaterOrEqual => ">=",
        };
        f.write_str(symbol)
    }
}

/// Value kind a known predicate compares against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateKind {
    /// `true`, `false` or `null` (which means `true`)
    Bool,
    Number,
    Text,
}

/// Known predicate names and the value kind each one takes
///
/// Predicates outside this table are still accepted and resolved by the
/// host; only their operator/value pairing is checked.
pub fn predicate_kind(test: &str) -> Option<PredicateKind> {
    use PredicateKind::*;

    let kind = match test {
        "is_daytime" | "is_game_rule" | "is_underwater" | "in_water" | "is_underground"
        | "in_water_or_rain" | "on_ground" | "is_humid" | "in_lava" | "in_clouds"
        | "on_ladder" | "is_sneaking" | "is_owner" | "is_target" | "is_immobile"
        | "is_altitude" | "is_moving" | "is_climbing" | "is_riding" | "in_caravan"
        | "is_leashed" | "is_variant" | "is_snow_covered" => Bool,
        "hourly_clock_time" | "clock_time" | "moon_intensity" | "moon_phase"
        | "distance_to_nearest_player" | "is_brightness" | "is_mark_variant"
        | "is_temperature_value" => Number,
        "has_equipment" | "is_color" | "has_component" | "is_family" | "has_ability"
        | "has_damage" | "has_tag" | "is_difficulty" | "is_biome" | "has_biome_tag"
        | "is_temperature_type" => Text,
        _ => return None,
    };
    Some(kind)
}

/// One leaf test
#[derive(Debug, Clone, PartialEq)]
pub struct FilterTest {
    pub test: String,
    pub subject: Subject,
    pub operator: Operator,
    pub domain: Option<String>,
    pub value: Value,
}

impl FilterTest {
    pub fn new(test: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            test: test.into(),
            subject: Subject::default(),
            operator: Operator::default(),
            domain: None,
            value: value.into(),
        }
    }

    /// Expected value with `null` on bool predicates read as `true`
    fn expected(&self) -> Value {
        if self.value.is_null() && predicate_kind(&self.test) == Some(PredicateKind::Bool) {
            Value::Bool(true)
        } else {
            self.value.clone()
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(kind) = predicate_kind(&self.test) {
            let ok = match kind {
                PredicateKind::Bool => self.value.is_boolean() || self.value.is_null(),
                PredicateKind::Number => self.value.is_number(),
                PredicateKind::Text => self.value.is_string(),
            };
            if !ok {
                return Err(ScriptError::InvalidFilter(format!(
                    "test '{}' expects a {:?} value, got {}",
                    self.test, kind, self.value
                )));
            }
        }
        if self.operator.is_ordering() && !self.value.is_number() {
            return Err(ScriptError::InvalidFilter(format!(
                "operator '{}' on test '{}' requires a numeric value",
                self.operator, self.test
            )));
        }
        Ok(())
    }
}

/// What a predicate resolved to for one subject
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Current value of the subject's property, compared with the expected value
    Value(Value),
    /// Whether the subject's set (components, families, tags) holds the expected value
    Contains(bool),
}

impl Resolution {
    fn compare(&self, operator: Operator, expected: &Value) -> bool {
        match self {
            Resolution::Contains(found) => match operator {
                Operator::Equals => *found,
                Operator::NotEquals => !*found,
                _ => false,
            },
            Resolution::Value(actual) => compare_values(actual, operator, expected),
        }
    }
}

fn compare_values(actual: &Value, operator: Operator, expected: &Value) -> bool {
    if let (Some(a), Some(e)) = (actual.as_f64(), expected.as_f64()) {
        return match operator {
            Operator::Equals => a == e,
            Operator::NotEquals => a != e,
            Operator::Less => a < e,
            Operator::Greater => a > e,
            Operator::LessOrEqual => a <= e,
            Operator::GreaterOrEqual => a >= e,
        };
    }
    let same_kind = matches!(
        (actual, expected),
        (Value::Bool(_), Value::Bool(_)) | (Value::String(_), Value::String(_))
    );
    match operator {
        Operator::Equals if same_kind => actual == expected,
        Operator::NotEquals if same_kind => actual != expected,
        _ => false,
    }
}

/// Validated filter tree
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    AllOf(Vec<Filter>),
    AnyOf(Vec<Filter>),
    Test(FilterTest),
}

impl Filter {
    /// Parse and validate a filter document
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| ScriptError::InvalidFilter(format!("expected an object, got {}", value)))?;

        let combinators: [(&str, fn(Vec<Filter>) -> Filter); 2] =
            [("all_of", Filter::AllOf), ("any_of", Filter::AnyOf)];
        for (key, ctor) in combinators {
            if let Some(children) = object.get(key) {
                let children = children
                    .as_array()
                    .ok_or_else(|| ScriptError::InvalidFilter(format!("'{}' must be an array", key)))?;
                let parsed = children
                    .iter()
                    .map(Filter::from_json)
                    .collect::<Result<Vec<_>>>()?;
                return Ok(ctor(parsed));
            }
        }

        let test = object
            .get("test")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ScriptError::InvalidFilter("expected 'all_of', 'any_of' or a string 'test'".to_string())
            })?;
        let value = object
            .get("value")
            .cloned()
            .ok_or_else(|| ScriptError::InvalidFilter(format!("test '{}' has no value", test)))?;

        let subject = match object.get("subject") {
            None => Subject::default(),
            Some(Value::String(s)) => s.parse()?,
            Some(other) => {
                return Err(ScriptError::InvalidFilter(format!("subject must be a string, got {}", other)));
            }
        };
        let operator = match object.get("operator") {
            None => Operator::default(),
            Some(Value::String(s)) => s.parse()?,
            Some(other) => {
                return Err(ScriptError::InvalidFilter(format!("operator must be a string, got {}", other)));
            }
        };
        let domain = match object.get("domain") {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(ScriptError::InvalidFilter(format!("domain must be a string, got {}", other)));
            }
        };

        let leaf = FilterTest {
            test: test.to_string(),
            subject,
            operator,
            domain,
            value,
        };
        leaf.validate()?;
        Ok(Filter::Test(leaf))
    }

    /// Leaf requiring the subject to own a component
    pub fn has_component(identifier: impl Into<String>) -> Self {
        Filter::Test(FilterTest::new("has_component", identifier.into()))
    }

    /// Components every match must own: unconditional `has_component` leaves
    /// reached through `all_of` nodes only
    pub fn required_components(&self) -> Vec<&str> {
        match self {
            Filter::AllOf(children) => children.iter().flat_map(Filter::required_components).collect(),
            Filter::AnyOf(_) => Vec::new(),
            Filter::Test(leaf) => {
                let required = leaf.test == "has_component"
                    && leaf.subject == Subject::This
                    && leaf.operator == Operator::Equals;
                match leaf.value.as_str() {
                    Some(identifier) if required => vec![identifier],
                    _ => Vec::new(),
                }
            }
        }
    }

    /// Evaluate against a context; never fails
    pub fn evaluate(&self, ctx: &FilterContext<'_>) -> bool {
        match self {
            Filter::AllOf(children) => children.iter().all(|child| child.evaluate(ctx)),
            Filter::AnyOf(children) => children.iter().any(|child| child.evaluate(ctx)),
            Filter::Test(leaf) => {
                let Some(entity) = ctx.bindings.get(leaf.subject) else {
                    return false;
                };
                match ctx.resolve(entity, leaf) {
                    Some(resolution) => resolution.compare(leaf.operator, &leaf.expected()),
                    None => false,
                }
            }
        }
    }
}

/// Subject bindings of one evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bindings {
    pub this: Option<EntityRef>,
    pub other: Option<EntityRef>,
    pub parent: Option<EntityRef>,
    pub player: Option<EntityRef>,
    pub target: Option<EntityRef>,
}

impl Bindings {
    /// Bind only `self`
    pub fn subject(entity: EntityRef) -> Self {
        Self {
            this: Some(entity),
            ..Default::default()
        }
    }

    pub fn with(mut self, subject: Subject, entity: EntityRef) -> Self {
        *self.slot(subject) = Some(entity);
        self
    }

    pub fn get(&self, subject: Subject) -> Option<EntityRef> {
        match subject {
            Subject::This => self.this,
            Subject::Other => self.other,
            Subject::Parent => self.parent,
            Subject::Player => self.player,
            Subject::Target => self.target,
        }
    }

    fn slot(&mut self, subject: Subject) -> &mut Option<EntityRef> {
        match subject {
            Subject::This => &mut self.this,
            Subject::Other => &mut self.other,
            Subject::Parent => &mut self.parent,
            Subject::Player => &mut self.player,
            Subject::Target => &mut self.target,
        }
    }
}

/// Everything a filter may consult
#[derive(Clone, Copy)]
pub struct FilterContext<'a> {
    pub bindings: Bindings,
    pub entities: &'a EntityRegistry,
    pub components: &'a ComponentStore,
    pub world: &'a WorldFacts,
    pub host: &'a dyn Host,
}

impl FilterContext<'_> {
    /// Runtime-intrinsic predicates first, then the host
    fn resolve(&self, entity: EntityRef, leaf: &FilterTest) -> Option<Resolution> {
        if !self.entities.is_valid(entity) {
            return None;
        }
        self.resolve_intrinsic(entity, leaf)
            .or_else(|| self.host.resolve_predicate(entity, leaf))
    }

    fn resolve_intrinsic(&self, entity: EntityRef, leaf: &FilterTest) -> Option<Resolution> {
        let world = self.world;
        let resolution = match leaf.test.as_str() {
            "has_component" => {
                let identifier = leaf.value.as_str()?;
                Resolution::Contains(self.components.fields(entity, identifier).is_some())
            }
            "is_family" if leaf.value.as_str() == Some("player") => {
                Resolution::Contains(self.entities.is_player(entity))
            }
            "is_daytime" => Resolution::Value(Value::Bool(world.is_daytime())),
            "clock_time" => Resolution::Value(Value::from(world.clock_time())),
            "hourly_clock_time" => Resolution::Value(Value::from(world.time_of_day)),
            "moon_phase" => Resolution::Value(Value::from(world.moon_phase())),
            "is_game_rule" => {
                let rule = leaf.domain.as_deref()?;
                Resolution::Value(Value::Bool(world.game_rule(rule)?))
            }
            "is_difficulty" => Resolution::Value(Value::from(world.difficulty.as_str())),
            // water is the host's to know; rain is a world fact
            "in_water_or_rain" if world.weather != Weather::Clear => Resolution::Value(Value::Bool(true)),
            "distance_to_nearest_player" => {
                Resolution::Value(Value::from(self.distance_to_nearest_player(entity)?))
            }
            _ => return None,
        };
        Some(resolution)
    }

    fn distance_to_nearest_player(&self, entity: EntityRef) -> Option<f64> {
        let origin = position(self.components, entity)?;
        self.entities
            .players()
            .filter(|player| *player != entity)
            .filter_map(|player| position(self.components, player))
            .map(|p| distance(origin, p))
            .min_by(f64::total_cmp)
    }
}

/// `minecraft:position` of an entity
pub fn position(components: &ComponentStore, entity: EntityRef) -> Option<[f64; 3]> {
    let fields = components.fields(entity, builtin::POSITION)?;
    Some([number(fields, "x")?, number(fields, "y")?, number(fields, "z")?])
}

pub fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(p, q)| (p - q) * (p - q))
        .sum::<f64>()
        .sqrt()
}
