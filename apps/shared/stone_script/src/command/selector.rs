//! Target selectors
//!
//! `@a` all players, `@p` nearest player, `@r` random player, `@e` all
//! entities, `@s` the invoking entity, or a bare player name. Selector
//! arguments narrow the match: `@e[type=minecraft:cow,r=10,c=2]`,
//! `@a[name=!Steve]`.

use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::origin::CommandOrigin;
use crate::component::{ComponentStore, builtin};
use crate::entity::{EntityRef, EntityRegistry};
use crate::filter::{Filter, FilterContext, FilterTest, distance, position};
use crate::query::QueryEngine;

#[derive(Debug, Clone, PartialEq)]
pub enum SelectorBase {
    AllPlayers,
    NearestPlayer,
    RandomPlayer,
    AllEntities,
    Executor,
    /// Player with this name
    Name(String),
}

/// `key=value` or `key=!value`
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub value: String,
    pub negated: bool,
}

impl Match {
    fn parse(raw: &str) -> Self {
        match raw.strip_prefix('!') {
            Some(value) => Self {
                value: value.to_string(),
                negated: true,
            },
            None => Self {
                value: raw.to_string(),
                negated: false,
            },
        }
    }

    fn accepts(&self, candidate: Option<&str>) -> bool {
        (candidate == Some(self.value.as_str())) != self.negated
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub base: SelectorBase,
    /// Entity template identifier; bare names get the `minecraft:` namespace
    pub entity_type: Option<Match>,
    pub name: Option<Match>,
    /// Positive: nearest first; negative: farthest first
    pub count: Option<i32>,
    /// Maximum distance from the origin's world position
    pub radius: Option<f64>,
}

impl Selector {
    fn with_base(base: SelectorBase) -> Self {
        Self {
            base,
            entity_type: None,
            name: None,
            count: None,
            radius: None,
        }
    }

    fn players_only(&self) -> bool {
        !matches!(self.base, SelectorBase::AllEntities | SelectorBase::Executor)
    }

    /// Resolve against the live world; an empty result is a valid match
    pub fn resolve(&self, players_only: bool, scope: &mut SelectorScope<'_>) -> Vec<EntityRef> {
        let ctx = scope.ctx;
        let players_only = players_only || self.players_only();

        let mut matched: Vec<EntityRef> = match &self.base {
            SelectorBase::Executor => scope
                .origin
                .entity
                .filter(|entity| ctx.entities.is_valid(*entity))
                .into_iter()
                .collect(),
            _ if players_only => QueryEngine::select(Some(&player_filter()), ctx),
            _ => QueryEngine::select(None, ctx),
        };

        if players_only {
            matched.retain(|entity| ctx.entities.is_player(*entity));
        }
        if let SelectorBase::Name(name) = &self.base {
            matched.retain(|entity| nameable(ctx.components, *entity) == Some(name.as_str()));
        }
        if let Some(entity_type) = &self.entity_type {
            let wanted = Match {
                value: namespaced(&entity_type.value),
                negated: entity_type.negated,
            };
            matched.retain(|entity| wanted.accepts(ctx.entities.template(*entity)));
        }
        if let Some(name) = &self.name {
            matched.retain(|entity| name.accepts(nameable(ctx.components, *entity)));
        }

        let origin = scope.origin.world_pos;
        let distance_to = |entity: &EntityRef| {
            position(ctx.components, *entity).map_or(f64::INFINITY, |p| distance(origin, p))
        };
        if let Some(radius) = self.radius {
            matched.retain(|entity| distance_to(entity) <= radius);
        }

        let by_distance = |a: &EntityRef, b: &EntityRef| distance_to(a).total_cmp(&distance_to(b));
        let limit = match (&self.base, self.count) {
            (SelectorBase::NearestPlayer, count) => {
                matched.sort_by(by_distance);
                Some(count.unwrap_or(1))
            }
            (SelectorBase::RandomPlayer, count) => {
                matched.shuffle(&mut *scope.rng);
                Some(count.unwrap_or(1))
            }
            (_, Some(count)) if count < 0 => {
                matched.sort_by(|a, b| by_distance(b, a));
                Some(count)
            }
            (_, Some(count)) => {
                matched.sort_by(by_distance);
                Some(count)
            }
            (_, None) => None,
        };
        if let Some(limit) = limit {
            matched.truncate(limit.unsigned_abs() as usize);
        }
        matched
    }
}

impl FromStr for Selector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(rest) = s.strip_prefix('@') else {
            if s.is_empty() || s.contains(['[', ']', '=', ',']) {
                return Err(format!("'{}' is not a selector or player name", s));
            }
            return Ok(Self::with_base(SelectorBase::Name(s.to_string())));
        };

        let mut chars = rest.chars();
        let base = match chars.next() {
            Some('a') => SelectorBase::AllPlayers,
            Some('p') => SelectorBase::NearestPlayer,
            Some('r') => SelectorBase::RandomPlayer,
            Some('e') => SelectorBase::AllEntities,
            Some('s') => SelectorBase::Executor,
            _ => return Err(format!("unknown selector '{}'", s)),
        };
        let mut selector = Self::with_base(base);

        let arguments = chars.as_str();
        if arguments.is_empty() {
            return Ok(selector);
        }
        let inner = arguments
            .strip_prefix('[')
            .and_then(|a| a.strip_suffix(']'))
            .ok_or_else(|| format!("malformed selector arguments in '{}'", s))?;

        for pair in inner.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("selector argument '{}' has no value", pair))?;
            let value = value.trim();
            match key.trim() {
                "type" => selector.entity_type = Some(Match::parse(value)),
                "name" => selector.name = Some(Match::parse(value)),
                "c" => {
                    let count = value
                        .parse::<i32>()
                        .map_err(|_| format!("selector count '{}' is not an integer", value))?;
                    selector.count = Some(count);
                }
                "r" => {
                    let radius = value
                        .parse::<f64>()
                        .ok()
                        .filter(|r| r.is_finite() && *r >= 0.0)
                        .ok_or_else(|| format!("selector radius '{}' is invalid", value))?;
                    selector.radius = Some(radius);
                }
                other => return Err(format!("unknown selector argument '{}'", other)),
            }
        }
        Ok(selector)
    }
}

/// What a selector may consult while resolving
pub struct SelectorScope<'a> {
    pub origin: &'a CommandOrigin,
    pub ctx: FilterContext<'a>,
    pub rng: &'a mut StdRng,
}

fn player_filter() -> Filter {
    Filter::Test(FilterTest::new("is_family", "player"))
}

fn namespaced(identifier: &str) -> String {
    if identifier.contains(':') {
        identifier.to_string()
    } else {
        format!("{}{}", builtin::BUILTIN_PREFIX, identifier)
    }
}

/// `minecraft:nameable` name, when set
pub fn nameable(components: &ComponentStore, entity: EntityRef) -> Option<&str> {
    components
        .fields(entity, builtin::NAMEABLE)
        .and_then(|fields| fields.get("name"))
        .and_then(|name| name.as_str())
        .filter(|name| !name.is_empty())
}

/// Display name of an entity: its nameable name, else its template, else its reference
pub fn display_name(entities: &EntityRegistry, components: &ComponentStore, entity: EntityRef) -> String {
    nameable(components, entity)
        .or_else(|| entities.template(entity))
        .map(str::to_string)
        .unwrap_or_else(|| entity.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityType, PLAYER_TEMPLATE};
    use crate::host::NullHost;
    use crate::world::WorldFacts;
    use rand::SeedableRng;
    use serde_json::json;

    struct World {
        entities: EntityRegistry,
        components: ComponentStore,
        world: WorldFacts,
    }

    impl World {
        fn new() -> Self {
            Self {
                entities: EntityRegistry::new(),
                components: ComponentStore::new(),
                world: WorldFacts::default(),
            }
        }

        fn spawn(&mut self, template: &str, name: &str, pos: [f64; 3]) -> EntityRef {
            let entity = self.entities.create(EntityType::Entity, Some(template.to_string()));
            let at = json!({"x": pos[0], "y": pos[1], "z": pos[2]});
            self.components
                .create_with(entity, builtin::POSITION, at.as_object().unwrap())
                .unwrap();
            if !name.is_empty() {
                let named = json!({"name": name});
                self.components
                    .create_with(entity, builtin::NAMEABLE, named.as_object().unwrap())
                    .unwrap();
            }
            entity
        }

        fn resolve(&self, selector: &str, players_only: bool, origin: &CommandOrigin) -> Vec<EntityRef> {
            let mut rng = StdRng::seed_from_u64(7);
            let mut scope = SelectorScope {
                origin,
                ctx: FilterContext {
                    bindings: Default::default(),
                    entities: &self.entities,
                    components: &self.components,
                    world: &self.world,
                    host: &NullHost,
                },
                rng: &mut rng,
            };
            selector.parse::<Selector>().unwrap().resolve(players_only, &mut scope)
        }
    }

    #[test]
    fn test_parse_forms() {
        let s: Selector = "@e[type=cow,c=-2,r=5.5,name=!Bob]".parse().unwrap();
        assert_eq!(s.base, SelectorBase::AllEntities);
        assert_eq!(s.count, Some(-2));
        assert_eq!(s.radius, Some(5.5));
        assert!(s.name.unwrap().negated);
        assert_eq!("Steve".parse::<Selector>().unwrap().base, SelectorBase::Name("Steve".into()));
        assert!("@x".parse::<Selector>().is_err());
        assert!("@e[type=cow".parse::<Selector>().is_err());
        assert!("@e[size=3]".parse::<Selector>().is_err());
        assert!("@e[r=-1]".parse::<Selector>().is_err());
        assert!("".parse::<Selector>().is_err());
    }

    #[test]
    fn test_players_and_entities() {
        let mut w = World::new();
        let steve = w.spawn(PLAYER_TEMPLATE, "Steve", [0.0, 0.0, 0.0]);
        let alex = w.spawn(PLAYER_TEMPLATE, "Alex", [10.0, 0.0, 0.0]);
        let cow = w.spawn("minecraft:cow", "", [2.0, 0.0, 0.0]);
        let console = CommandOrigin::console("Server");

        assert_eq!(w.resolve("@a", false, &console), vec![steve, alex]);
        assert_eq!(w.resolve("@e", false, &console), vec![steve, alex, cow]);
        assert_eq!(w.resolve("@e", true, &console), vec![steve, alex]);
        assert_eq!(w.resolve("@e[type=cow]", false, &console), vec![cow]);
        assert_eq!(w.resolve("@e[type=!cow]", false, &console), vec![steve, alex]);
        assert_eq!(w.resolve("Alex", false, &console), vec![alex]);
        assert!(w.resolve("Herobrine", false, &console).is_empty());
    }

    #[test]
    fn test_distance_selectors() {
        let mut w = World::new();
        let near = w.spawn(PLAYER_TEMPLATE, "Near", [1.0, 0.0, 0.0]);
        let far = w.spawn(PLAYER_TEMPLATE, "Far", [50.0, 0.0, 0.0]);
        let cow = w.spawn("minecraft:cow", "", [3.0, 0.0, 0.0]);
        let origin = CommandOrigin::entity("Far", far, [49.0, 0.0, 0.0], 0);

        assert_eq!(w.resolve("@p", false, &origin), vec![far]);
        assert_eq!(w.resolve("@e[r=4]", false, &CommandOrigin::console("Server")), vec![near, cow]);
        assert_eq!(w.resolve("@e[c=1]", false, &CommandOrigin::console("Server")), vec![near]);
        assert_eq!(w.resolve("@e[c=-1]", false, &CommandOrigin::console("Server")), vec![far]);
        assert_eq!(w.resolve("@s", false, &origin), vec![far]);
        assert!(w.resolve("@s", false, &CommandOrigin::console("Server")).is_empty());
    }

    #[test]
    fn test_random_player_is_a_player() {
        let mut w = World::new();
        let a = w.spawn(PLAYER_TEMPLATE, "A", [0.0; 3]);
        let b = w.spawn(PLAYER_TEMPLATE, "B", [0.0; 3]);
        w.spawn("minecraft:cow", "", [0.0; 3]);
        let picked = w.resolve("@r", false, &CommandOrigin::console("Server"));
        assert_eq!(picked.len(), 1);
        assert!(picked[0] == a || picked[0] == b);
        assert_eq!(w.resolve("@r[c=5]", false, &CommandOrigin::console("Server")).len(), 2);
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut w = World::new();
        let named = w.spawn(PLAYER_TEMPLATE, "Steve", [0.0; 3]);
        let cow = w.spawn("minecraft:cow", "", [0.0; 3]);
        let bare = w.entities.create(EntityType::Entity, None);
        assert_eq!(display_name(&w.entities, &w.components, named), "Steve");
        assert_eq!(display_name(&w.entities, &w.components, cow), "minecraft:cow");
        assert_eq!(display_name(&w.entities, &w.components, bare), bare.to_string());
    }
}
