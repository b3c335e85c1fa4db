//! Query Engine
//!
//! Persistent views over the entity population. A query holds conjunctive
//! filters, required components and optionally a component index whose three
//! numeric fields can be range-checked.
//!
//! Candidates always come from the component secondary index when the query
//! names a component (indexed, required, or an unconditional `has_component`
//! leaf), so evaluation costs O(owners of that component).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::component::{ComponentStore, number};
use crate::entity::EntityRef;
use crate::error::{Result, ScriptError};
use crate::filter::{Bindings, Filter, FilterContext};

/// Field names an index uses when the caller gives none
pub const DEFAULT_INDEX_FIELDS: [&str; 3] = ["x", "y", "z"];

/// Script-facing reference to a registered query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryId(pub u64);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query#{}", self.0)
    }
}

/// Component and up to three of its fields a query is indexed by
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentIndex {
    pub component: String,
    /// `None` where the requested name is absent from the schema
    pub fields: [Option<String>; 3],
}

#[derive(Debug, Clone, Default)]
struct Query {
    filters: Vec<Filter>,
    components: Vec<String>,
    index: Option<ComponentIndex>,
}

impl Query {
    /// Component whose owners bound the candidate set, if any
    fn driving_component<'a>(&'a self, store: &ComponentStore) -> Option<&'a str> {
        if let Some(index) = &self.index {
            return Some(&index.component);
        }
        self.components
            .iter()
            .map(String::as_str)
            .chain(self.filters.iter().flat_map(Filter::required_components))
            .min_by_key(|component| store.owner_count(component))
    }

    fn matches(&self, entity: EntityRef, ctx: FilterContext<'_>) -> bool {
        if !ctx.entities.is_valid(entity) {
            return false;
        }
        if !self
            .components
            .iter()
            .all(|component| ctx.components.fields(entity, component).is_some())
        {
            return false;
        }
        let ctx = FilterContext {
            bindings: Bindings::subject(entity),
            ..ctx
        };
        self.filters.iter().all(|filter| filter.evaluate(&ctx))
    }
}

/// Registry of persistent queries
#[derive(Debug)]
pub struct QueryEngine {
    next_id: u64,
    queries: BTreeMap<QueryId, Query>,
}

impl QueryEngine {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            queries: BTreeMap::new(),
        }
    }

    fn insert(&mut self, query: Query) -> QueryId {
        let id = QueryId(self.next_id);
        self.next_id += 1;
        self.queries.insert(id, query);
        tracing::debug!("Registered {}", id);
        id
    }

    /// Register a query over every entity, optionally filtered
    pub fn register(&mut self, filter: Option<Filter>) -> QueryId {
        self.insert(Query {
            filters: filter.into_iter().collect(),
            ..Default::default()
        })
    }

    /// Register a query indexed by a component's fields
    ///
    /// Missing names default to `x`, `y`, `z`; names the schema does not
    /// declare are dropped from the index and impose no bound.
    pub fn register_indexed(
        &mut self,
        store: &ComponentStore,
        component: &str,
        fields: [Option<&str>; 3],
    ) -> Result<QueryId> {
        let schema = store
            .schema(component)
            .ok_or_else(|| ScriptError::UnknownComponent(component.to_string()))?;

        let mut indexed: [Option<String>; 3] = Default::default();
        for (slot, (requested, default)) in indexed
            .iter_mut()
            .zip(fields.iter().zip(DEFAULT_INDEX_FIELDS))
        {
            let name = requested.unwrap_or(default);
            if schema.has_field(name) {
                *slot = Some(name.to_string());
            } else {
                tracing::debug!("Dropping field '{}' from index on '{}'", name, component);
            }
        }

        Ok(self.insert(Query {
            index: Some(ComponentIndex {
                component: component.to_string(),
                fields: indexed,
            }),
            ..Default::default()
        }))
    }

    fn query_mut(&mut self, id: QueryId) -> Result<&mut Query> {
        self.queries.get_mut(&id).ok_or(ScriptError::UnknownQuery(id))
    }

    fn query(&self, id: QueryId) -> Result<&Query> {
        self.queries.get(&id).ok_or(ScriptError::UnknownQuery(id))
    }

    /// Require matches to own `component`; requirements accumulate
    ///
    /// The component must be registered in `store`.
    pub fn add_filter(&mut self, store: &ComponentStore, id: QueryId, component: &str) -> Result<()> {
        let query = self.query_mut(id)?;
        if store.schema(component).is_none() {
            return Err(ScriptError::UnknownComponent(component.to_string()));
        }
        if !query.components.iter().any(|c| c == component) {
            query.components.push(component.to_string());
        }
        Ok(())
    }

    /// Conjoin a full filter tree
    pub fn add_filter_tree(&mut self, id: QueryId, filter: Filter) -> Result<()> {
        self.query_mut(id)?.filters.push(filter);
        Ok(())
    }

    pub fn unregister(&mut self, id: QueryId) -> Result<()> {
        if self.queries.remove(&id).is_none() {
            return Err(ScriptError::UnknownQuery(id));
        }
        tracing::debug!("Unregistered {}", id);
        Ok(())
    }

    pub fn contains(&self, id: QueryId) -> bool {
        self.queries.contains_key(&id)
    }

    pub fn index(&self, id: QueryId) -> Result<Option<&ComponentIndex>> {
        Ok(self.query(id)?.index.as_ref())
    }

    /// Evaluate a transient filter without registering a query
    pub fn select(filter: Option<&Filter>, ctx: FilterContext<'_>) -> Vec<EntityRef> {
        let query = Query {
            filters: filter.cloned().into_iter().collect(),
            ..Default::default()
        };
        candidates(&query, ctx)
            .into_iter()
            .filter(|entity| query.matches(*entity, ctx))
            .collect()
    }

    /// Entities matching a query, in ascending id order
    pub fn evaluate(&self, id: QueryId, ctx: FilterContext<'_>) -> Result<Vec<EntityRef>> {
        let query = self.query(id)?;
        Ok(candidates(query, ctx)
            .into_iter()
            .filter(|entity| query.matches(*entity, ctx))
            .collect())
    }

    /// Entities matching an indexed query whose indexed fields fall inside
    /// the closed intervals `[min[i], max[i]]`
    pub fn evaluate_range(
        &self,
        id: QueryId,
        ctx: FilterContext<'_>,
        min: [f64; 3],
        max: [f64; 3],
    ) -> Result<Vec<EntityRef>> {
        let query = self.query(id)?;
        let index = query.index.as_ref().ok_or(ScriptError::QueryNotIndexed(id))?;

        let in_range = |entity: &EntityRef| {
            let Some(fields) = ctx.components.fields(*entity, &index.component) else {
                return false;
            };
            index.fields.iter().enumerate().all(|(i, field)| match field {
                None => true,
                Some(name) => number(fields, name).is_some_and(|v| min[i] <= v && v <= max[i]),
            })
        };

        Ok(candidates(query, ctx)
            .into_iter()
            .filter(in_range)
            .filter(|entity| query.matches(*entity, ctx))
            .collect())
    }
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn candidates(query: &Query, ctx: FilterContext<'_>) -> Vec<EntityRef> {
    match query.driving_component(ctx.components) {
        Some(component) => ctx.components.owners(component).collect(),
        None => ctx.entities.iter().collect(),
    }
}
