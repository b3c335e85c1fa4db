//! Event Bus
//!
//! Named-channel publish/subscribe. Listeners are kept per channel in
//! registration order; delivery itself is driven by
//! [`ScriptRuntime::broadcast_event`](crate::ScriptRuntime::broadcast_event),
//! which takes a snapshot of the list so listeners registered during a
//! broadcast only see later broadcasts.
//!
//! Built-in channels (`minecraft:` prefix) validate their payload shape before
//! delivery. Any other channel is custom and carries arbitrary JSON.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::component::FieldKind;
use crate::error::{Result, ScriptError};
use crate::runtime::ScriptRuntime;

pub const ENTITY_CREATED: &str = "minecraft:entity_created";
pub const ENTITY_DEATH: &str = "minecraft:entity_death";
pub const ENTITY_START_RIDING: &str = "minecraft:entity_start_riding";
pub const ENTITY_STOP_RIDING: &str = "minecraft:entity_stop_riding";
pub const ENTITY_TICK: &str = "minecraft:entity_tick";
pub const PLAYER_ATTACKED_ACTOR: &str = "minecraft:player_attacked_actor";
pub const DISPLAY_CHAT_EVENT: &str = "minecraft:display_chat_event";
pub const EXECUTE_COMMAND: &str = "minecraft:execute_command";
pub const SPAWN_PARTICLE_ATTACHED_ENTITY: &str = "minecraft:spawn_particle_attached_entity";

/// Callback invoked with the runtime and the event payload
pub type Listener = Rc<dyn Fn(&mut ScriptRuntime, &Value) -> Result<()>>;

/// Shape of a built-in channel's payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayloadShape {
    /// Object with these fields, each of the given kind
    Object(&'static [(&'static str, FieldKind)]),
    /// Bare string
    Text,
}

/// Payload shape of a built-in channel
pub fn builtin_payload(channel: &str) -> Option<PayloadShape> {
    use FieldKind::{Bool, Entity, String as Str, Vec3};

    let shape = match channel {
        ENTITY_CREATED | ENTITY_DEATH | ENTITY_TICK => PayloadShape::Object(&[("entity", Entity)]),
        ENTITY_START_RIDING => PayloadShape::Object(&[("entity", Entity), ("ride", Entity)]),
        ENTITY_STOP_RIDING => PayloadShape::Object(&[
            ("entity", Entity),
            ("exit_from_rider", Bool),
            ("entity_is_being_destroyed", Bool),
            ("switching_rides", Bool),
        ]),
        PLAYER_ATTACKED_ACTOR => PayloadShape::Object(&[("player", Entity), ("attacked_entity", Entity)]),
        DISPLAY_CHAT_EVENT | EXECUTE_COMMAND => PayloadShape::Text,
        SPAWN_PARTICLE_ATTACHED_ENTITY => {
            PayloadShape::Object(&[("effect", Str), ("entity", Entity), ("offset", Vec3)])
        }
        _ => return None,
    };
    Some(shape)
}

/// Check a payload against its channel's built-in shape; custom channels accept anything
pub fn validate_payload(channel: &str, payload: &Value) -> Result<()> {
    let invalid = |reason: String| ScriptError::InvalidEvent {
        channel: channel.to_string(),
        reason,
    };

    match builtin_payload(channel) {
        None => Ok(()),
        Some(PayloadShape::Text) if payload.is_string() => Ok(()),
        Some(PayloadShape::Text) => Err(invalid(format!("expected a string, got {}", payload))),
        Some(PayloadShape::Object(fields)) => {
            let object = payload
                .as_object()
                .ok_or_else(|| invalid(format!("expected an object, got {}", payload)))?;
            for (name, kind) in fields {
                let value = object
                    .get(*name)
                    .ok_or_else(|| invalid(format!("missing field '{}'", name)))?;
                // entity fields are required, so null is not acceptable here
                if *kind == FieldKind::Entity && value.is_null() {
                    return Err(invalid(format!("field '{}': expected an entity reference", name)));
                }
                kind.validate(value)
                    .map_err(|reason| invalid(format!("field '{}': {}", name, reason)))?;
            }
            Ok(())
        }
    }
}

/// Handle returned by [`EventBus::listen`]
pub type ListenerId = u64;

#[derive(Clone)]
struct Registration {
    id: ListenerId,
    /// System that registered the listener, if any
    owner: Option<String>,
    listener: Listener,
}

/// Per-channel listener lists
#[derive(Default)]
pub struct EventBus {
    channels: HashMap<String, Vec<Registration>>,
    next_id: ListenerId,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener to a channel
    ///
    /// # Arguments
    /// * `channel` - Channel identifier; must not be empty
    /// * `owner` - System registering the listener, used by [`EventBus::remove_owner`]
    /// * `listener` - Callback run on every later broadcast
    pub fn listen(&mut self, channel: &str, owner: Option<String>, listener: Listener) -> Result<ListenerId> {
        if channel.trim().is_empty() {
            return Err(ScriptError::InvalidEvent {
                channel: channel.to_string(),
                reason: "channel identifier is empty".to_string(),
            });
        }
        self.next_id += 1;
        let id = self.next_id;
        self.channels
            .entry(channel.to_string())
            .or_default()
            .push(Registration { id, owner, listener });
        tracing::debug!("Listener {} registered on '{}'", id, channel);
        Ok(id)
    }

    /// Remove one listener; returns whether it existed
    pub fn unlisten(&mut self, id: ListenerId) -> bool {
        for registrations in self.channels.values_mut() {
            if let Some(pos) = registrations.iter().position(|r| r.id == id) {
                registrations.remove(pos);
                return true;
            }
        }
        false
    }

    /// Remove every listener a system registered
    pub fn remove_owner(&mut self, owner: &str) {
        for registrations in self.channels.values_mut() {
            registrations.retain(|r| r.owner.as_deref() != Some(owner));
        }
    }

    /// Current listeners of a channel, in registration order
    pub fn snapshot(&self, channel: &str) -> Vec<(ListenerId, Listener)> {
        self.channels
            .get(channel)
            .map(|registrations| {
                registrations
                    .iter()
                    .map(|r| (r.id, Rc::clone(&r.listener)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, Vec::len)
    }
}
