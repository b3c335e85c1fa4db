//! Command Engine
//!
//! Commands are registered with a permission level and an ordered list of
//! overloads. Dispatch picks the first overload, in registration order, whose
//! arguments bind to the line's tokens; it never looks for a better match
//! later in the list. Registering an existing name again appends its
//! overloads to the end of that list.
//!
//! Dispatch order:
//! 1. tokenize the line and look the command up (`UnknownCommand`)
//! 2. bind overloads first-match (`Usage` when none binds)
//! 3. check the origin's permission level (`PermissionDenied`)
//! 4. run the handler (`Failed` when it errors)

mod origin;
mod parse;
mod selector;
mod types;

use std::collections::BTreeMap;

pub use origin::{CommandOrigin, MAX_PERMISSION_LEVEL};
pub use parse::{CommandLine, Token, bind, coerce, tokenize};
pub use selector::{Selector, SelectorBase, SelectorScope, display_name, nameable};
pub use types::{ArgSpec, ArgType, ArgValue, CommandArgs, Handler, Overload};

use crate::error::{CommandError, Result, ScriptError};

/// A registered command
#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub description: String,
    /// Minimum origin permission level (0..=4)
    pub level: u8,
    pub overloads: Vec<Overload>,
}

impl Command {
    /// Every overload's signature, one per line
    pub fn usage(&self) -> String {
        self.overloads
            .iter()
            .map(|overload| overload.usage(&self.name))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Command table keyed by lowercased name
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Command>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or extend a command
    ///
    /// # Arguments
    /// * `name` - Command name; a leading `/` is ignored, case-insensitive
    /// * `description` - Replaces any previous description
    /// * `level` - Required permission level; replaces any previous level
    /// * `overloads` - Appended after the overloads already registered
    pub fn register(&mut self, name: &str, description: &str, level: u8, overloads: Vec<Overload>) -> Result<()> {
        let name = name.strip_prefix('/').unwrap_or(name).to_lowercase();
        let invalid = |reason: &str| ScriptError::InvalidCommand {
            command: name.clone(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(invalid("command name is empty"));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(invalid("command name contains whitespace"));
        }
        if level > MAX_PERMISSION_LEVEL {
            return Err(invalid("permission level must be between 0 and 4"));
        }
        if overloads.is_empty() {
            return Err(invalid("at least one overload is required"));
        }
        for overload in &overloads {
            overload.validate(&name)?;
        }

        match self.commands.get_mut(&name) {
            Some(command) => {
                tracing::debug!(
                    "Command '/{}' registered again; appending {} overload(s) after {}",
                    name,
                    overloads.len(),
                    command.overloads.len()
                );
                command.description = description.to_string();
                command.level = level;
                command.overloads.extend(overloads);
            }
            None => {
                tracing::debug!("Registered command '/{}' (level {}, {} overload(s))", name, level, overloads.len());
                self.commands.insert(
                    name.clone(),
                    Command {
                        name,
                        description: description.to_string(),
                        level,
                        overloads,
                    },
                );
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(&name.to_lowercase())
    }

    pub fn lookup(&self, name: &str) -> std::result::Result<&Command, CommandError> {
        self.get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))
    }

    /// Registered commands in name order
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Overload {
        Overload::new(vec![], |_, _| Ok(None))
    }

    #[test]
    fn test_register_validation() {
        let mut registry = CommandRegistry::new();
        assert!(registry.register("", "d", 0, vec![noop()]).is_err());
        assert!(registry.register("two words", "d", 0, vec![noop()]).is_err());
        assert!(registry.register("ok", "d", 5, vec![noop()]).is_err());
        assert!(registry.register("ok", "d", 0, vec![]).is_err());
        assert!(registry.register("/Ok", "d", 0, vec![noop()]).is_ok());
        assert!(registry.get("OK").is_some());
    }

    #[test]
    fn test_reregistration_appends_overloads() {
        let mut registry = CommandRegistry::new();
        registry.register("string", "first", 0, vec![noop()]).unwrap();
        let with_arg = Overload::new(vec![ArgSpec::required("s", ArgType::String)], |_, _| Ok(None));
        registry.register("string", "second", 2, vec![with_arg]).unwrap();

        let command = registry.get("string").unwrap();
        assert_eq!(command.overloads.len(), 2);
        assert!(command.overloads[0].args.is_empty());
        assert_eq!(command.description, "second");
        assert_eq!(command.level, 2);
        assert_eq!(command.usage(), "/string\n/string <s: string>");
    }

    #[test]
    fn test_unknown_command() {
        let registry = CommandRegistry::new();
        assert_eq!(
            registry.lookup("nope").unwrap_err(),
            CommandError::UnknownCommand("nope".to_string())
        );
    }
}
