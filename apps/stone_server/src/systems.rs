//! Built-in script systems
//!
//! `commands` registers the utility commands every server carries; `demo`
//! registers one command per argument type and echoes what it receives.

use serde_json::Value;

use stone_script::events::{DISPLAY_CHAT_EVENT, ENTITY_CREATED, EXECUTE_COMMAND};
use stone_script::{
    ArgSpec, ArgType, ArgValue, CommandArgs, ConsoleApi, EntityRef, Overload, Result, ScriptError, ScriptRuntime,
    ScriptSystem,
};

/// Systems the server can register by name
pub const BUILTIN_SYSTEMS: [&str; 2] = ["commands", "demo"];

/// Port `/transferserver` uses when none is given
pub const DEFAULT_TRANSFER_PORT: u16 = 19132;

/// Instantiate a built-in system by name
pub fn create(name: &str) -> Option<Box<dyn ScriptSystem>> {
    match name {
        "commands" => Some(Box::new(CommandsSystem)),
        "demo" => Some(Box::new(DemoSystem)),
        _ => None,
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| ScriptError::script(format!("missing argument '{}'", name)))
}

/// Text of a command argument, `null` when an optional one was left out
fn echo(args: &CommandArgs, name: &str) -> String {
    match args.get(name) {
        None => "null".to_string(),
        Some(ArgValue::String(text)) => text.clone(),
        Some(value) => script_number(value.to_json()).to_string(),
    }
}

/// Largest integer an f64 holds exactly
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Whole floats print without a fractional part (`[1,2,3]`, not `[1.0,2.0,3.0]`)
fn script_number(value: Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() <= MAX_EXACT_INTEGER => Value::from(f as i64),
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(script_number).collect()),
        other => other,
    }
}

pub struct CommandsSystem;

impl ScriptSystem for CommandsSystem {
    fn initialize(&mut self, runtime: &mut ScriptRuntime) -> Result<()> {
        runtime.register_command(
            "alias",
            "Register a command that runs another command",
            1,
            vec![Overload::new(
                vec![
                    ArgSpec::required("name", ArgType::String),
                    ArgSpec::required("desc", ArgType::String),
                    ArgSpec::required("level", ArgType::Int),
                    ArgSpec::required("command", ArgType::String),
                ],
                |rt, args| {
                    let name = required(args.string("name"), "name")?;
                    let desc = required(args.string("desc"), "desc")?;
                    let level = u8::try_from(required(args.int("level"), "level")?)
                        .map_err(|_| ScriptError::script("level must be between 0 and 4"))?;
                    let target = required(args.string("command"), "command")?.to_string();

                    rt.register_command(
                        name,
                        desc,
                        level,
                        vec![Overload::new(vec![], move |rt, _| Ok(Some(rt.invoke_command(&target))))],
                    )?;
                    Ok(Some(format!("Alias /{} registered", name)))
                },
            )],
        )?;

        runtime.register_command(
            "broadcast",
            "Send a chat line to every player",
            1,
            vec![Overload::new(vec![ArgSpec::required("string", ArgType::String)], |rt, args| {
                rt.broadcast_message(required(args.string("string"), "string")?)?;
                Ok(None)
            })],
        )?;

        runtime.register_command(
            "say",
            "Broadcast a message in the name of the invoker",
            1,
            vec![Overload::new(vec![ArgSpec::required("message", ArgType::Message)], |rt, args| {
                let sender = rt
                    .current_command_origin()
                    .map_or_else(|| rt.console_name().to_string(), |origin| origin.name.clone());
                let message = required(args.string("message"), "message")?;
                rt.broadcast_message(&format!("[{}] {}", sender, message))?;
                Ok(None)
            })],
        )?;

        runtime.register_command(
            "transferserver",
            "Move players to another server",
            1,
            vec![Overload::new(
                vec![
                    ArgSpec::required("target", ArgType::PlayerSelector),
                    ArgSpec::required("host", ArgType::String),
                    ArgSpec::optional("port", ArgType::Int),
                ],
                |rt, args| {
                    let targets: Vec<EntityRef> = required(args.entities("target"), "target")?.to_vec();
                    let host = required(args.string("host"), "host")?;
                    let port = match args.int("port") {
                        Some(port) => u16::try_from(port).map_err(|_| ScriptError::script(format!("invalid port {}", port)))?,
                        None => DEFAULT_TRANSFER_PORT,
                    };
                    for player in targets {
                        rt.transfer_player(player, host, port)?;
                    }
                    Ok(Some("commands.transferserver.successful".to_string()))
                },
            )],
        )?;

        runtime.register_command(
            "id",
            "Show the current command origin",
            0,
            vec![Overload::new(vec![], |rt, _| {
                Ok(rt.current_command_origin().map(|origin| origin.to_json().to_string()))
            })],
        )?;

        runtime.register_command(
            "proxy",
            "Run a command as the invoking entity",
            0,
            vec![Overload::new(vec![ArgSpec::required("command", ArgType::String)], |rt, args| {
                let command = required(args.string("command"), "command")?;
                let entity = rt.current_command_origin().and_then(|origin| origin.entity);
                Ok(Some(match entity {
                    Some(entity) => rt.invoke_command_as(entity, command),
                    None => rt.invoke_command(command),
                }))
            })],
        )?;

        runtime.register_command(
            "sudo",
            "Run a command as the invoking entity, ignoring permission levels",
            0,
            vec![Overload::new(vec![ArgSpec::required("command", ArgType::String)], |rt, args| {
                let command = required(args.string("command"), "command")?;
                let entity = rt.current_command_origin().and_then(|origin| origin.entity);
                Ok(Some(match entity {
                    Some(entity) => rt.invoke_privileged_command(entity, command),
                    None => rt.invoke_command(command),
                }))
            })],
        )?;

        runtime.register_command(
            "help",
            "List commands or show the usage of one",
            0,
            vec![
                Overload::new(vec![], |rt, _| {
                    let lines: Vec<String> = rt
                        .commands()
                        .map(|command| format!("/{} - {}", command.name, command.description))
                        .collect();
                    Ok(Some(lines.join("\n")))
                }),
                Overload::new(vec![ArgSpec::required("command", ArgType::String)], |rt, args| {
                    let name = required(args.string("command"), "command")?;
                    let name = name.strip_prefix('/').unwrap_or(name).to_lowercase();
                    let usage = rt
                        .commands()
                        .find(|command| command.name == name)
                        .map(|command| command.usage())
                        .ok_or_else(|| ScriptError::script(format!("unknown command /{}", name)))?;
                    Ok(Some(usage))
                }),
            ],
        )?;

        Ok(())
    }
}

pub struct DemoSystem;

impl DemoSystem {
    const ID: &'static str = "demo";
}

impl ScriptSystem for DemoSystem {
    fn initialize(&mut self, runtime: &mut ScriptRuntime) -> Result<()> {
        // (command, reply label, type, optional)
        let single = [
            ("string", "string", ArgType::String, false),
            ("int", "int", ArgType::Int, true),
            ("float", "float", ArgType::Float, false),
            ("bool", "bool", ArgType::Bool, false),
            ("text", "text", ArgType::Text, false),
            ("position", "position", ArgType::Position, false),
            ("selector", "selector", ArgType::Selector, false),
            ("player-selector", "players", ArgType::PlayerSelector, false),
        ];
        for (name, label, ty, optional) in single {
            let spec = if optional {
                ArgSpec::optional(name, ty)
            } else {
                ArgSpec::required(name, ty)
            };
            runtime.register_command(
                name,
                &format!("Echo a {} argument", ty),
                0,
                vec![Overload::new(vec![spec], move |_, args| {
                    Ok(Some(format!("{}: {}", label, echo(args, name))))
                })],
            )?;
        }

        runtime.register_command(
            "complex",
            "Echo a bool and a position",
            0,
            vec![Overload::new(
                vec![
                    ArgSpec::required("bool", ArgType::Bool),
                    ArgSpec::required("position", ArgType::Position),
                ],
                |_, args| Ok(Some(format!(":: {}, {}", echo(args, "bool"), echo(args, "position")))),
            )],
        )?;

        runtime.broadcast_event(DISPLAY_CHAT_EVENT, &Value::from("test"))?;
        runtime.listen_for_event(ENTITY_CREATED, |rt: &mut ScriptRuntime, payload: &Value| {
            let valid = EntityRef::from_json(&payload["entity"]).is_some_and(|entity| rt.is_valid_entity(entity));
            ConsoleApi::log(DemoSystem::ID, &format!("{} {}", payload, valid));
            Ok(())
        })?;
        Ok(())
    }

    fn shutdown(&mut self, runtime: &mut ScriptRuntime) -> Result<()> {
        runtime.broadcast_event(EXECUTE_COMMAND, &Value::from("/say bye"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stone_script::{CommandOrigin, NullHost};

    fn runtime(systems: &[&str]) -> ScriptRuntime {
        let mut runtime = ScriptRuntime::new(Box::new(NullHost)).with_seed(1);
        for name in systems {
            create(name).unwrap().initialize(&mut runtime).unwrap();
        }
        runtime
    }

    #[test]
    fn test_alias_runs_target_command() {
        let mut rt = runtime(&["commands", "demo"]);
        assert_eq!(rt.invoke_command("/alias hi greeting 0 \"/string hello\""), "Alias /hi registered");
        assert_eq!(rt.invoke_command("/hi"), "string: hello");
    }

    #[test]
    fn test_demo_echoes() {
        let mut rt = runtime(&["demo"]);
        assert_eq!(rt.invoke_command("/int"), "int: null");
        assert_eq!(rt.invoke_command("/int 5"), "int: 5");
        assert_eq!(rt.invoke_command("/text a b  c"), "text: a b  c");
        assert_eq!(rt.invoke_command("/complex true 1 2 3"), ":: true, [1,2,3]");
        assert_eq!(rt.invoke_command("/position 1 2.5 3"), "position: [1,2.5,3]");
        assert_eq!(rt.invoke_command("/float 2"), "float: 2");
        assert_eq!(rt.invoke_command("/selector @a"), "selector: []");
        assert_eq!(rt.invoke_command("/player-selector @a"), "players: []");
    }

    #[test]
    fn test_proxy_and_sudo_respect_levels() {
        let mut rt = runtime(&["commands"]);
        let steve = rt.add_player("Steve", [0.0; 3]).unwrap();
        let origin = rt.origin_for(steve).unwrap();

        let denied = rt.invoke(origin.clone(), "/proxy \"/broadcast hi\"").unwrap();
        assert!(denied.unwrap().starts_with("You do not have permission"));

        let allowed = rt.invoke(origin, "/sudo \"/broadcast hi\"").unwrap();
        assert_eq!(allowed, Some(String::new()));
    }

    #[test]
    fn test_id_reports_origin() {
        let mut rt = runtime(&["commands"]);
        let json: Value = serde_json::from_str(&rt.invoke_command("/id")).unwrap();
        assert_eq!(json["name"], "Server");
        assert_eq!(json["permissionLevel"], 4);

        let console = CommandOrigin::console("Admin");
        assert!(rt.invoke(console, "/id").unwrap().unwrap().contains("Admin"));
    }

    #[test]
    fn test_transfer_defaults_port() {
        let mut rt = ScriptRuntime::new(Box::new(crate::host::StoneHost::new(Default::default())));
        CommandsSystem.initialize(&mut rt).unwrap();
        rt.add_player("Steve", [0.0; 3]).unwrap();
        assert_eq!(
            rt.invoke_command("/transferserver @a example.org"),
            "commands.transferserver.successful"
        );
        assert!(rt.invoke_command("/transferserver @a example.org 70000").contains("invalid port"));
    }

    #[test]
    fn test_help_lists_commands() {
        let mut rt = runtime(&["commands"]);
        assert!(rt.invoke_command("/help").contains("/sudo - "));
        assert_eq!(rt.invoke_command("/help /id"), "/id");
    }
}
