use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::EntityRef;
use crate::error::{Result, ScriptError};
use crate::runtime::ScriptRuntime;

/// Argument type of the command grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgType {
    /// Remaining text with selectors replaced by entity names
    Message,
    /// One token
    String,
    Int,
    Float,
    Bool,
    /// Remaining raw text
    Text,
    /// Three absolute or `~`-relative coordinates
    Position,
    Selector,
    PlayerSelector,
}

impl ArgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgType::Message => "message",
            ArgType::String => "string",
            ArgType::Int => "int",
            ArgType::Float => "float",
            ArgType::Bool => "bool",
            ArgType::Text => "text",
            ArgType::Position => "position",
            ArgType::Selector => "selector",
            ArgType::PlayerSelector => "player-selector",
        }
    }

    /// Whether the argument swallows every remaining token
    pub fn is_greedy(&self) -> bool {
        matches!(self, ArgType::Message | ArgType::Text)
    }

    /// Tokens the argument consumes when not greedy
    pub fn width(&self) -> usize {
        match self {
            ArgType::Position => 3,
            _ => 1,
        }
    }
}

impl FromStr for ArgType {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(Value::from(s))
            .map_err(|_| ScriptError::script(format!("unknown argument type '{}'", s)))
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared argument of an overload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ArgType,
    #[serde(default)]
    pub optional: bool,
}

impl ArgSpec {
    pub fn required(name: impl Into<String>, ty: ArgType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ArgType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: true,
        }
    }
}

impl fmt::Display for ArgSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "[{}: {}]", self.name, self.ty)
        } else {
            write!(f, "<{}: {}>", self.name, self.ty)
        }
    }
}

/// Coerced argument value
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Bool(bool),
    Int(i32),
    Float(f64),
    /// `string`, `text` and `message` arguments
    String(String),
    Position([f64; 3]),
    /// `selector` and `player-selector` arguments, possibly empty
    Entities(Vec<EntityRef>),
}

impl ArgValue {
    pub fn to_json(&self) -> Value {
        match self {
            ArgValue::Bool(b) => Value::Bool(*b),
            ArgValue::Int(i) => Value::from(*i),
            ArgValue::Float(f) => Value::from(*f),
            ArgValue::String(s) => Value::from(s.clone()),
            ArgValue::Position(p) => Value::from(p.to_vec()),
            ArgValue::Entities(entities) => Value::Array(entities.iter().map(EntityRef::to_json).collect()),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

/// Arguments a handler receives, in declaration order
///
/// Optional arguments the invoker left out are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandArgs {
    values: Vec<(String, Option<ArgValue>)>,
}

impl CommandArgs {
    pub(crate) fn push(&mut self, name: &str, value: Option<ArgValue>) {
        self.values.push((name.to_string(), value));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    /// Value by position
    pub fn at(&self, index: usize) -> Option<&ArgValue> {
        self.values.get(index).and_then(|(_, v)| v.as_ref())
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(ArgValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i32> {
        match self.get(name) {
            Some(ArgValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            Some(ArgValue::Float(f)) => Some(*f),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(ArgValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn position(&self, name: &str) -> Option<[f64; 3]> {
        match self.get(name) {
            Some(ArgValue::Position(p)) => Some(*p),
            _ => None,
        }
    }

    pub fn entities(&self, name: &str) -> Option<&[EntityRef]> {
        match self.get(name) {
            Some(ArgValue::Entities(e)) => Some(e),
            _ => None,
        }
    }
}

/// Command handler: returns an optional message for the invoker
pub type Handler = Rc<dyn Fn(&mut ScriptRuntime, &CommandArgs) -> Result<Option<String>>>;

/// One typed signature of a command
#[derive(Clone)]
pub struct Overload {
    pub args: Vec<ArgSpec>,
    pub handler: Handler,
}

impl Overload {
    pub fn new<F>(args: Vec<ArgSpec>, handler: F) -> Self
    where
        F: Fn(&mut ScriptRuntime, &CommandArgs) -> Result<Option<String>> + 'static,
    {
        Self {
            args,
            handler: Rc::new(handler),
        }
    }

    /// Build from a JSON argument list such as
    /// `[{"name": "port", "type": "int", "optional": true}]`
    pub fn from_json<F>(args: &Value, handler: F) -> Result<Self>
    where
        F: Fn(&mut ScriptRuntime, &CommandArgs) -> Result<Option<String>> + 'static,
    {
        let args: Vec<ArgSpec> = serde_json::from_value(args.clone())
            .map_err(|e| ScriptError::script(format!("invalid argument list: {}", e)))?;
        Ok(Self::new(args, handler))
    }

    /// Human-readable signature, e.g. `/tp <target: selector> [pos: position]`
    pub fn usage(&self, command: &str) -> String {
        let mut usage = format!("/{}", command);
        for arg in &self.args {
            usage.push(' ');
            usage.push_str(&arg.to_string());
        }
        usage
    }

    pub(crate) fn validate(&self, command: &str) -> Result<()> {
        let invalid = |reason: String| ScriptError::InvalidCommand {
            command: command.to_string(),
            reason,
        };
        let mut seen_optional = false;
        for (i, arg) in self.args.iter().enumerate() {
            if arg.name.trim().is_empty() {
                return Err(invalid(format!("argument {} has no name", i + 1)));
            }
            if seen_optional && !arg.optional {
                return Err(invalid(format!(
                    "required argument '{}' follows an optional one",
                    arg.name
                )));
            }
            if arg.ty.is_greedy() && i + 1 != self.args.len() {
                return Err(invalid(format!(
                    "'{}' argument '{}' must be the last argument",
                    arg.ty, arg.name
                )));
            }
            seen_optional |= arg.optional;
        }
        Ok(())
    }
}

impl fmt::Debug for Overload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overload").field("args", &self.args).finish_non_exhaustive()
    }
}
