//! Stone Script Bridge
//!
//! Lets script systems manipulate an entity/component world they do not own.
//! The simulation sits behind the [`Host`] trait; scripts only see the
//! operations on [`ScriptRuntime`].
//!
//! # Architecture
//!
//! - **EntityRegistry**: opaque entity references and their validity
//! - **ComponentStore**: built-in and custom component schemas, per-entity data,
//!   copy-out handles committed with `apply_component_changes`
//! - **Filter**: declarative predicate trees over entities and world facts
//! - **QueryEngine**: filtered and range-indexed entity queries
//! - **EventBus**: named channels with synchronous, ordered delivery
//! - **CommandRegistry**: typed, overloaded, permission-checked commands
//! - **SystemManager**: the `initialize`/`update`/`shutdown` lifecycle

pub mod command;
pub mod component;
pub mod console;
pub mod entity;
pub mod error;
pub mod events;
pub mod filter;
pub mod host;
pub mod query;
pub mod runtime;
pub mod system;
pub mod world;

pub use command::{ArgSpec, ArgType, ArgValue, CommandArgs, CommandOrigin, Overload};
pub use component::{ComponentHandle, ComponentSchema, FieldKind, Fields};
pub use console::ConsoleApi;
pub use entity::{EntityRef, EntityType};
pub use error::{CommandError, HostError, Result, ScriptError};
pub use events::ListenerId;
pub use filter::{Bindings, Filter, FilterTest, Resolution};
pub use host::{Host, HostResult, NullHost};
pub use query::QueryId;
pub use runtime::{CommandResult, ScriptRuntime, render};
pub use system::{ENGINE_API_VERSION, ScriptSystem, SystemManager};
pub use world::{Difficulty, Weather, WorldFacts};
