//! Script runtime context
//!
//! [`ScriptRuntime`] owns every registry (entities, components, queries,
//! listeners, commands) plus the world facts and the host. Systems, command
//! handlers and event listeners all receive it as `&mut ScriptRuntime`, so
//! there is no global state and no shared ownership of registries.
//!
//! Handlers and listeners are cloned out of their registry before they run.
//! Registrations made while one runs therefore apply from the next dispatch
//! on, and a handler may freely call back into the runtime.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::rc::Rc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Value, json};

use crate::command::{
    Command, CommandArgs, CommandLine, CommandOrigin, CommandRegistry, Handler, MAX_PERMISSION_LEVEL,
    Overload, SelectorScope, bind, display_name,
};
use crate::component::{ComponentHandle, ComponentSchema, ComponentStore, builtin, number};
use crate::console::ConsoleApi;
use crate::entity::{EntityRef, EntityRegistry, EntityType, PLAYER_TEMPLATE};
use crate::error::{CommandError, Result, ScriptError};
use crate::events::{self, EventBus, ListenerId};
use crate::filter::{Bindings, Filter, FilterContext, position};
use crate::host::Host;
use crate::query::{QueryEngine, QueryId};
use crate::world::WorldFacts;

/// Outcome of a command invocation: an optional message, or the reason it failed
pub type CommandResult = std::result::Result<Option<String>, CommandError>;

/// Console name used when none is configured
pub const DEFAULT_CONSOLE_NAME: &str = "Server";

/// Explicit context every script operation runs against
pub struct ScriptRuntime {
    entities: EntityRegistry,
    components: ComponentStore,
    queries: QueryEngine,
    events: EventBus,
    commands: CommandRegistry,
    world: WorldFacts,
    host: Box<dyn Host>,
    rng: StdRng,
    /// Origins of the commands currently executing, innermost last
    origins: Vec<CommandOrigin>,
    permissions: HashMap<EntityRef, u8>,
    console_name: String,
    current_system: Option<String>,
    tick: u64,
}

impl ScriptRuntime {
    pub fn new(host: Box<dyn Host>) -> Self {
        Self {
            entities: EntityRegistry::new(),
            components: ComponentStore::new(),
            queries: QueryEngine::new(),
            events: EventBus::new(),
            commands: CommandRegistry::new(),
            world: WorldFacts::default(),
            host,
            rng: StdRng::from_entropy(),
            origins: Vec::new(),
            permissions: HashMap::new(),
            console_name: DEFAULT_CONSOLE_NAME.to_string(),
            current_system: None,
            tick: 0,
        }
    }

    pub fn with_world(mut self, world: WorldFacts) -> Self {
        self.world = world;
        self
    }

    pub fn with_console_name(mut self, name: impl Into<String>) -> Self {
        self.console_name = name.into();
        self
    }

    /// Make `@r` selection reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn world(&self) -> &WorldFacts {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut WorldFacts {
        &mut self.world
    }

    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    pub fn host_mut(&mut self) -> &mut dyn Host {
        self.host.as_mut()
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    pub fn components(&self) -> &ComponentStore {
        &self.components
    }

    pub fn console_name(&self) -> &str {
        &self.console_name
    }

    /// Ticks elapsed since start
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub(crate) fn set_current_system(&mut self, system: Option<String>) {
        self.current_system = system;
    }

    /// System whose callback is running, if any
    pub fn current_system(&self) -> Option<&str> {
        self.current_system.as_deref()
    }

    fn filter_context(&self, bindings: Bindings) -> FilterContext<'_> {
        FilterContext {
            bindings,
            entities: &self.entities,
            components: &self.components,
            world: &self.world,
            host: self.host.as_ref(),
        }
    }

    /// Log a line on behalf of the running system
    pub fn log(&self, message: &str) {
        ConsoleApi::log(self.current_system().unwrap_or("script"), message);
    }

    // ---- entities ----

    /// Create an empty entity
    pub fn create_entity(&mut self) -> EntityRef {
        self.entities.create(EntityType::Entity, None)
    }

    /// Create an entity from a host template
    ///
    /// Nothing is left behind when the host fails or returns a component the
    /// store rejects.
    pub fn create_entity_from_template(&mut self, kind: EntityType, template: &str) -> Result<EntityRef> {
        let components = self.host.instantiate_template(kind, template)?;
        let entity = self.entities.create(kind, Some(template.to_string()));

        for (identifier, overrides) in &components {
            if let Err(e) = self.components.create_with(entity, identifier, overrides) {
                self.components.remove_entity(entity);
                self.entities.destroy(entity)?;
                return Err(e);
            }
        }
        tracing::debug!("Created {} from template '{}'", entity, template);
        Ok(entity)
    }

    /// Destroy an entity and silently drop its components
    pub fn destroy_entity(&mut self, entity: EntityRef) -> Result<()> {
        self.entities.destroy(entity)?;
        self.components.remove_entity(entity);
        self.permissions.remove(&entity);
        tracing::debug!("Destroyed {}", entity);
        Ok(())
    }

    pub fn is_valid_entity(&self, entity: EntityRef) -> bool {
        self.entities.is_valid(entity)
    }

    /// Create from a template and announce it on `minecraft:entity_created`
    pub fn spawn_entity(&mut self, kind: EntityType, template: &str) -> Result<EntityRef> {
        let entity = self.create_entity_from_template(kind, template)?;
        self.announce(events::ENTITY_CREATED, entity);
        Ok(entity)
    }

    /// Add a named player at a position
    pub fn add_player(&mut self, name: &str, at: [f64; 3]) -> Result<EntityRef> {
        let entity = self.entities.create(EntityType::Entity, Some(PLAYER_TEMPLATE.to_string()));
        let nameable = json!({ "name": name });
        let position = json!({ "x": at[0], "y": at[1], "z": at[2] });
        for (identifier, overrides) in [(builtin::NAMEABLE, nameable), (builtin::POSITION, position)] {
            let overrides = overrides.as_object().cloned().unwrap_or_default();
            self.components.create_with(entity, identifier, &overrides)?;
        }
        tracing::info!("Player '{}' joined as {}", name, entity);
        self.announce(events::ENTITY_CREATED, entity);
        Ok(entity)
    }

    /// Announce a death on `minecraft:entity_death`, then destroy the entity
    pub fn kill_entity(&mut self, entity: EntityRef) -> Result<()> {
        self.entities.ensure_valid(entity)?;
        self.announce(events::ENTITY_DEATH, entity);
        // a listener may already have destroyed it
        if self.entities.is_valid(entity) {
            self.destroy_entity(entity)?;
        }
        Ok(())
    }

    fn announce(&mut self, channel: &str, entity: EntityRef) {
        if let Err(e) = self.broadcast_event(channel, &json!({ "entity": entity.to_json() })) {
            tracing::warn!("Failed to announce {} on '{}': {}", entity, channel, e);
        }
    }

    pub fn set_permission_level(&mut self, entity: EntityRef, level: u8) {
        self.permissions.insert(entity, level.min(MAX_PERMISSION_LEVEL));
    }

    /// Permission level of an entity acting as a command origin (default 0)
    pub fn permission_level(&self, entity: EntityRef) -> u8 {
        self.permissions.get(&entity).copied().unwrap_or(0)
    }

    // ---- components ----

    /// Register a custom component from a JSON object of field defaults
    pub fn register_component(&mut self, identifier: &str, defaults: &Value) -> Result<()> {
        let schema = ComponentSchema::from_defaults(identifier, defaults)?;
        self.components.register_schema(schema)
    }

    /// Register a custom component with explicit field kinds
    pub fn register_component_schema(&mut self, schema: ComponentSchema) -> Result<()> {
        self.components.register_schema(schema)
    }

    pub fn create_component(&mut self, entity: EntityRef, identifier: &str) -> Result<ComponentHandle> {
        self.entities.ensure_valid(entity)?;
        self.components.create(entity, identifier)
    }

    /// Whether a live entity owns a component; unknown identifiers fail
    pub fn has_component(&self, entity: EntityRef, identifier: &str) -> Result<bool> {
        let owned = self.components.has(entity, identifier)?;
        Ok(owned && self.entities.is_valid(entity))
    }

    pub fn get_component(&self, entity: EntityRef, identifier: &str) -> Result<ComponentHandle> {
        self.entities.ensure_valid(entity)?;
        self.components.get(entity, identifier)
    }

    /// Commit a handle's staged fields
    ///
    /// The store commit happens first. A host hook failure is reported after
    /// it and leaves the committed data in place. Health at or below zero
    /// announces the death on `minecraft:entity_death`.
    pub fn apply_component_changes(&mut self, entity: EntityRef, handle: &ComponentHandle) -> Result<()> {
        self.entities.ensure_valid(entity)?;
        if handle.entity() != entity {
            return Err(ScriptError::script(format!(
                "component handle for {} cannot be applied to {}",
                handle.entity(),
                entity
            )));
        }

        let committed = self.components.commit(handle)?;
        let hook = self.host.component_applied(entity, handle.identifier(), &committed);

        if handle.identifier() == builtin::HEALTH && number(&committed, "value").is_some_and(|v| v <= 0.0) {
            self.announce(events::ENTITY_DEATH, entity);
        }
        hook.map_err(ScriptError::from)
    }

    /// Remove a custom component; built-ins cannot be removed
    pub fn destroy_component(&mut self, entity: EntityRef, identifier: &str) -> Result<()> {
        self.entities.ensure_valid(entity)?;
        self.components.destroy(entity, identifier)
    }

    // ---- events ----

    /// Listen on a channel; the running system (if any) owns the listener
    pub fn listen_for_event<F>(&mut self, channel: &str, listener: F) -> Result<ListenerId>
    where
        F: Fn(&mut ScriptRuntime, &Value) -> Result<()> + 'static,
    {
        let owner = self.current_system.clone();
        self.events.listen(channel, owner, Rc::new(listener))
    }

    pub fn unlisten(&mut self, id: ListenerId) -> bool {
        self.events.unlisten(id)
    }

    /// Remove every listener a system registered
    pub fn remove_listeners_of(&mut self, system: &str) {
        self.events.remove_owner(system);
    }

    /// Deliver an event synchronously to the channel's current listeners
    ///
    /// Listeners run in registration order over a snapshot of the list. A
    /// failing listener is logged and the rest still run. Triggerable
    /// built-in channels then apply their effect.
    pub fn broadcast_event(&mut self, channel: &str, payload: &Value) -> Result<()> {
        events::validate_payload(channel, payload)?;

        let listeners = self.events.snapshot(channel);
        tracing::trace!("Broadcasting '{}' to {} listener(s)", channel, listeners.len());
        for (id, listener) in listeners {
            if let Err(e) = listener(self, payload) {
                tracing::warn!("Listener {} on '{}' failed: {}", id, channel, e);
            }
        }

        match channel {
            events::DISPLAY_CHAT_EVENT => {
                if let Some(message) = payload.as_str() {
                    self.host.display_chat(message);
                }
            }
            events::EXECUTE_COMMAND => {
                if let Some(command) = payload.as_str() {
                    let console = CommandOrigin::console(self.console_name.clone());
                    let output = render(self.invoke(console, command));
                    if !output.is_empty() {
                        tracing::info!(command = command, origin = %self.console_name, "{}", output);
                    }
                }
            }
            events::SPAWN_PARTICLE_ATTACHED_ENTITY => {
                let entity = EntityRef::from_json(&payload["entity"]).ok_or_else(|| ScriptError::InvalidEvent {
                    channel: channel.to_string(),
                    reason: "entity is not an entity reference".to_string(),
                })?;
                self.entities.ensure_valid(entity)?;
                let effect = payload["effect"].as_str().unwrap_or_default();
                let mut offset = [0.0; 3];
                for (axis, value) in offset.iter_mut().zip(payload["offset"].as_array().into_iter().flatten()) {
                    *axis = value.as_f64().unwrap_or_default();
                }
                self.host.spawn_particle(effect, entity, offset)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Send a chat line to every player (`minecraft:display_chat_event`)
    pub fn broadcast_message(&mut self, message: &str) -> Result<()> {
        self.broadcast_event(events::DISPLAY_CHAT_EVENT, &Value::from(message))
    }

    // ---- queries ----

    /// Register a query with an optional filter document
    pub fn register_query(&mut self, filter: Option<&Value>) -> Result<QueryId> {
        let filter = filter.map(Filter::from_json).transpose()?;
        Ok(self.queries.register(filter))
    }

    /// Register a query indexed by three fields of a component
    /// (default `x`, `y`, `z`)
    pub fn register_indexed_query(
        &mut self,
        component: &str,
        field1: Option<&str>,
        field2: Option<&str>,
        field3: Option<&str>,
    ) -> Result<QueryId> {
        self.queries
            .register_indexed(&self.components, component, [field1, field2, field3])
    }

    /// Require query matches to own a component
    pub fn add_filter_to_query(&mut self, query: QueryId, component: &str) -> Result<()> {
        self.queries.add_filter(&self.components, query, component)
    }

    /// Conjoin a filter document to a query
    pub fn add_filter_tree_to_query(&mut self, query: QueryId, filter: &Value) -> Result<()> {
        let filter = Filter::from_json(filter)?;
        self.queries.add_filter_tree(query, filter)
    }

    pub fn unregister_query(&mut self, query: QueryId) -> Result<()> {
        self.queries.unregister(query)
    }

    pub fn get_entities_from_query(&self, query: QueryId) -> Result<Vec<EntityRef>> {
        self.queries.evaluate(query, self.filter_context(Bindings::default()))
    }

    /// Entities of an indexed query whose indexed fields lie in `[min, max]`
    pub fn get_entities_from_query_in_range(&self, query: QueryId, min: [f64; 3], max: [f64; 3]) -> Result<Vec<EntityRef>> {
        self.queries
            .evaluate_range(query, self.filter_context(Bindings::default()), min, max)
    }

    /// Evaluate a filter against explicit subject bindings
    pub fn evaluate_filter(&self, filter: &Filter, bindings: Bindings) -> bool {
        filter.evaluate(&self.filter_context(bindings))
    }

    // ---- commands ----

    pub fn register_command(&mut self, name: &str, description: &str, level: u8, overloads: Vec<Overload>) -> Result<()> {
        self.commands.register(name, description, level, overloads)
    }

    /// Registered commands in name order
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.commands()
    }

    /// Origin of the innermost executing command
    pub fn current_command_origin(&self) -> Option<&CommandOrigin> {
        self.origins.last()
    }

    /// Run a full command line as `origin`
    pub fn invoke(&mut self, origin: CommandOrigin, line: &str) -> CommandResult {
        self.dispatch(origin, line, true)
    }

    fn dispatch(&mut self, origin: CommandOrigin, line: &str, check_permission: bool) -> CommandResult {
        let parsed = CommandLine::parse(line)?;
        let command = self.commands.lookup(&parsed.name)?;

        let mut scope = SelectorScope {
            origin: &origin,
            ctx: FilterContext {
                bindings: Bindings::default(),
                entities: &self.entities,
                components: &self.components,
                world: &self.world,
                host: self.host.as_ref(),
            },
            rng: &mut self.rng,
        };
        let selected = command.overloads.iter().find_map(|overload| {
            bind(overload, &parsed, &mut scope).map(|args| (Rc::clone(&overload.handler), args))
        });

        let Some((handler, args)) = selected else {
            return Err(CommandError::Usage {
                command: command.name.clone(),
                usage: command.usage(),
            });
        };
        if check_permission && origin.permission_level < command.level {
            return Err(CommandError::PermissionDenied {
                command: command.name.clone(),
                required: command.level,
                actual: origin.permission_level,
            });
        }

        let name = command.name.clone();
        tracing::trace!(command = %name, origin = %origin.name, "Dispatching");
        self.run_handler(origin, &name, handler, &args)
    }

    fn run_handler(
        &mut self,
        origin: CommandOrigin,
        name: &str,
        handler: Handler,
        args: &CommandArgs,
    ) -> CommandResult {
        self.origins.push(origin);
        let result = handler(self, args);
        self.origins.pop();
        result.map_err(|e| CommandError::Failed {
            command: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Origin for an entity acting on its own behalf
    pub fn origin_for(&self, entity: EntityRef) -> std::result::Result<CommandOrigin, CommandError> {
        if !self.entities.is_valid(entity) {
            return Err(CommandError::InvalidOrigin(entity.to_string()));
        }
        let name = display_name(&self.entities, &self.components, entity);
        let at = position(&self.components, entity).unwrap_or_default();
        Ok(CommandOrigin::entity(name, entity, at, self.permission_level(entity)))
    }

    /// Run a command as the current origin, or as the console outside any handler
    pub fn invoke_command(&mut self, line: &str) -> String {
        let origin = self
            .current_command_origin()
            .cloned()
            .unwrap_or_else(|| CommandOrigin::console(self.console_name.clone()));
        render(self.invoke(origin, line))
    }

    /// Run a command as an entity
    pub fn invoke_command_as(&mut self, entity: EntityRef, line: &str) -> String {
        let result = self.origin_for(entity).and_then(|origin| self.invoke(origin, line));
        render(result)
    }

    /// Run a command as a named console at World Owner level
    pub fn invoke_console_command(&mut self, name: &str, line: &str) -> String {
        render(self.invoke(CommandOrigin::console(name), line))
    }

    /// Run a command as an entity without the permission check
    pub fn invoke_privileged_command(&mut self, entity: EntityRef, line: &str) -> String {
        let result = self
            .origin_for(entity)
            .and_then(|origin| self.dispatch(origin, line, false));
        render(result)
    }

    /// Move a player to another server (`/transferserver`)
    pub fn transfer_player(&mut self, player: EntityRef, host: &str, port: u16) -> Result<()> {
        self.entities.ensure_valid(player)?;
        if !self.entities.is_player(player) {
            return Err(ScriptError::script(format!("{} is not a player", player)));
        }
        tracing::info!("Transferring {} to {}:{}", player, host, port);
        self.host.transfer_player(player, host, port)?;
        Ok(())
    }

    // ---- lifecycle ----

    /// Advance one tick: world clock, then `minecraft:entity_tick` for every
    /// non-player entity when anyone listens
    pub fn tick(&mut self) {
        self.tick += 1;
        self.world.advance(1);

        if self.events.listener_count(events::ENTITY_TICK) == 0 {
            return;
        }
        let ticking: Vec<EntityRef> = self
            .entities
            .iter()
            .filter(|entity| !self.entities.is_player(*entity))
            .collect();
        for entity in ticking {
            if self.entities.is_valid(entity) {
                self.announce(events::ENTITY_TICK, entity);
            }
        }
    }
}

/// Render a command outcome as the text the invoker sees
pub fn render(result: CommandResult) -> String {
    match result {
        Ok(message) => message.unwrap_or_default(),
        Err(e) => e.to_string(),
    }
}
