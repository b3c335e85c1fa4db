use thiserror::Error;

use crate::entity::EntityRef;
use crate::query::QueryId;

pub type Result<T> = std::result::Result<T, ScriptError>;

/// Failure of a script-facing operation
///
/// Expected negatives (`has_component` on a missing component, `is_valid_entity`
/// on a destroyed entity, empty query results) are plain values, never errors.
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Entity {0} is not valid")]
    InvalidEntity(EntityRef),

    #[error("Unknown component '{0}'")]
    UnknownComponent(String),

    #[error("Component '{0}' is already registered")]
    DuplicateComponent(String),

    #[error("Component identifier '{0}' is reserved for built-in components")]
    ReservedComponent(String),

    #[error("Entity {entity} has no component '{component}'")]
    MissingComponent { entity: EntityRef, component: String },

    #[error("Built-in component '{0}' cannot be removed")]
    BuiltinComponentRemoval(String),

    #[error("Component '{component}' field '{field}': {reason}")]
    SchemaViolation {
        component: String,
        field: String,
        reason: String,
    },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Unknown query {0}")]
    UnknownQuery(QueryId),

    #[error("Query {0} has no component index")]
    QueryNotIndexed(QueryId),

    #[error("Invalid event '{channel}': {reason}")]
    InvalidEvent { channel: String, reason: String },

    #[error("Invalid command registration '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },

    #[error("Incompatible system: {0}")]
    IncompatibleSystem(#[from] stone_schema::SchemaError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("{0}")]
    Script(String),
}

impl ScriptError {
    /// Failure raised by script code itself (handlers, listeners, systems)
    pub fn script(message: impl Into<String>) -> Self {
        ScriptError::Script(message.into())
    }
}

/// Failure reported to the origin of a command invocation
///
/// Never fatal to the tick: the dispatcher turns these into a result for the invoker.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("Unknown command: {0}. Please check that the command exists and that you have permission to use it.")]
    UnknownCommand(String),

    #[error("Syntax error: unexpected arguments for /{command}. Usage: {usage}")]
    Usage { command: String, usage: String },

    #[error("You do not have permission to use /{command} (requires level {required}, have {actual})")]
    PermissionDenied {
        command: String,
        required: u8,
        actual: u8,
    },

    #[error("/{command} failed: {message}")]
    Failed { command: String, message: String },

    #[error("No command given")]
    Empty,

    #[error("Cannot run a command as {0}: it is not a valid entity")]
    InvalidOrigin(String),
}

/// Failure inside the host collaborator (template resolution, side-effect hooks)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("Unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("Host rejected '{operation}': {reason}")]
    Rejected { operation: String, reason: String },

    #[error("Host operation '{0}' is not supported")]
    Unsupported(String),
}
