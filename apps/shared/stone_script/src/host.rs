//! Host collaborator
//!
//! The simulation that owns the real world state sits behind [`Host`]. The
//! runtime consults it for template contents and world predicates it cannot
//! answer itself, and notifies it of side effects scripts request.

use crate::component::Fields;
use crate::entity::{EntityRef, EntityType};
use crate::error::HostError;
use crate::filter::{FilterTest, Resolution};

pub type HostResult<T> = std::result::Result<T, HostError>;

/// External world-state collaborator
///
/// Every method has an inert default so a host only implements what it
/// actually simulates.
pub trait Host {
    /// Components `(identifier, field overrides)` an entity created from
    /// `template` starts with
    fn instantiate_template(&self, kind: EntityType, template: &str) -> HostResult<Vec<(String, Fields)>> {
        let _ = kind;
        Err(HostError::UnknownTemplate(template.to_string()))
    }

    /// Answer a filter predicate the runtime does not resolve itself
    ///
    /// `None` means the host has no answer, which makes the test `false`.
    fn resolve_predicate(&self, entity: EntityRef, test: &FilterTest) -> Option<Resolution> {
        let _ = (entity, test);
        None
    }

    /// A committed component change the simulation must mirror
    /// (teleport on position, resize on collision box, ...)
    fn component_applied(&mut self, entity: EntityRef, identifier: &str, fields: &Fields) -> HostResult<()> {
        let _ = (entity, identifier, fields);
        Ok(())
    }

    /// Chat line addressed to every player
    fn display_chat(&mut self, message: &str) {
        let _ = message;
    }

    fn spawn_particle(&mut self, effect: &str, entity: EntityRef, offset: [f64; 3]) -> HostResult<()> {
        let _ = (effect, entity, offset);
        Ok(())
    }

    /// Move a player to another server
    fn transfer_player(&mut self, player: EntityRef, host: &str, port: u16) -> HostResult<()> {
        let _ = (player, host, port);
        Err(HostError::Unsupported("transfer_player".to_string()))
    }
}

/// Host that simulates nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {}
