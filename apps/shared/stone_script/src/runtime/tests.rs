use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;

use super::*;
use crate::command::{ArgSpec, ArgType};
use crate::component::Fields;
use crate::error::HostError;
use crate::host::HostResult;

/// Host with a fixed template table that records the side effects it sees
#[derive(Default)]
struct RecordingHost {
    chat: Rc<RefCell<Vec<String>>>,
    particles: Rc<RefCell<Vec<(String, EntityRef)>>>,
}

impl Host for RecordingHost {
    fn instantiate_template(&self, _kind: EntityType, template: &str) -> HostResult<Vec<(String, Fields)>> {
        let fields = |value: Value| value.as_object().cloned().unwrap_or_default();
        match template {
            "minecraft:cow" => Ok(vec![
                (builtin::POSITION.to_string(), fields(json!({"x": 0, "y": 64, "z": 0}))),
                (builtin::HEALTH.to_string(), fields(json!({"value": 10, "max": 10}))),
            ]),
            "test:broken" => Ok(vec![("test:not_registered".to_string(), Fields::new())]),
            other => Err(HostError::UnknownTemplate(other.to_string())),
        }
    }

    fn display_chat(&mut self, message: &str) {
        self.chat.borrow_mut().push(message.to_string());
    }

    fn spawn_particle(&mut self, effect: &str, entity: EntityRef, _offset: [f64; 3]) -> HostResult<()> {
        self.particles.borrow_mut().push((effect.to_string(), entity));
        Ok(())
    }
}

fn runtime() -> ScriptRuntime {
    ScriptRuntime::new(Box::new(RecordingHost::default())).with_seed(7)
}

fn place(rt: &mut ScriptRuntime, entity: EntityRef, at: [f64; 3]) {
    let mut handle = rt.create_component(entity, builtin::POSITION).unwrap();
    handle.set("x", at[0]).set("y", at[1]).set("z", at[2]);
    rt.apply_component_changes(entity, &handle).unwrap();
}

fn counter() -> Rc<Cell<u32>> {
    Rc::new(Cell::new(0))
}

#[test]
fn test_destroyed_entity_leaves_queries() {
    let mut rt = runtime();
    let cow = rt.spawn_entity(EntityType::Entity, "minecraft:cow").unwrap();
    let query = rt.register_query(None).unwrap();
    rt.add_filter_to_query(query, builtin::HEALTH).unwrap();
    assert_eq!(rt.get_entities_from_query(query).unwrap(), vec![cow]);

    rt.destroy_entity(cow).unwrap();
    assert!(!rt.is_valid_entity(cow));
    assert!(rt.get_entities_from_query(query).unwrap().is_empty());
    assert!(!rt.has_component(cow, builtin::HEALTH).unwrap());
    assert!(rt.get_component(cow, builtin::HEALTH).is_err());
    assert!(rt.destroy_entity(cow).is_err());
}

#[test]
fn test_component_handles_are_copies() {
    let mut rt = runtime();
    let cow = rt.spawn_entity(EntityType::Entity, "minecraft:cow").unwrap();

    let mut handle = rt.get_component(cow, builtin::HEALTH).unwrap();
    handle.set("value", 3);
    assert_eq!(rt.get_component(cow, builtin::HEALTH).unwrap().number("value"), Some(10.0));

    rt.apply_component_changes(cow, &handle).unwrap();
    assert_eq!(rt.get_component(cow, builtin::HEALTH).unwrap().number("value"), Some(3.0));
}

#[test]
fn test_handle_applies_only_to_its_entity() {
    let mut rt = runtime();
    let a = rt.spawn_entity(EntityType::Entity, "minecraft:cow").unwrap();
    let b = rt.spawn_entity(EntityType::Entity, "minecraft:cow").unwrap();
    let handle = rt.get_component(a, builtin::HEALTH).unwrap();
    assert!(rt.apply_component_changes(b, &handle).is_err());
}

#[test]
fn test_empty_combinators() {
    let mut rt = runtime();
    let a = rt.create_entity();
    let b = rt.create_entity();

    let all = rt.register_query(Some(&json!({"all_of": []}))).unwrap();
    let any = rt.register_query(Some(&json!({"any_of": []}))).unwrap();
    assert_eq!(rt.get_entities_from_query(all).unwrap(), vec![a, b]);
    assert!(rt.get_entities_from_query(any).unwrap().is_empty());
}

#[test]
fn test_range_query_bounds_are_inclusive() {
    let mut rt = runtime();
    let inside = rt.create_entity();
    let edge = rt.create_entity();
    let outside = rt.create_entity();
    place(&mut rt, inside, [1.0, 1.0, 1.0]);
    place(&mut rt, edge, [10.0, 0.0, 10.0]);
    place(&mut rt, outside, [10.5, 0.0, 0.0]);

    let query = rt.register_indexed_query(builtin::POSITION, None, None, None).unwrap();
    let found = rt
        .get_entities_from_query_in_range(query, [0.0, 0.0, 0.0], [10.0, 10.0, 10.0])
        .unwrap();
    assert_eq!(found, vec![inside, edge]);

    let plain = rt.register_query(None).unwrap();
    assert!(matches!(
        rt.get_entities_from_query_in_range(plain, [0.0; 3], [1.0; 3]),
        Err(ScriptError::QueryNotIndexed(_))
    ));
}

#[test]
fn test_unknown_component_queries_fail() {
    let mut rt = runtime();
    assert!(rt.register_indexed_query("test:nothing", None, None, None).is_err());
    let query = rt.register_query(None).unwrap();
    assert!(matches!(
        rt.add_filter_to_query(query, "test:nothing"),
        Err(ScriptError::UnknownComponent(_))
    ));
    rt.unregister_query(query).unwrap();
    assert!(rt.get_entities_from_query(query).is_err());
}

#[test]
fn test_first_binding_overload_wins() {
    let mut rt = runtime();
    let picked = Rc::new(Cell::new(0));
    let (first, second) = (Rc::clone(&picked), Rc::clone(&picked));
    let overloads = vec![
        Overload::new(vec![ArgSpec::required("flag", ArgType::Bool)], move |_, _| {
            first.set(1);
            Ok(None)
        }),
        Overload::new(
            vec![
                ArgSpec::required("flag", ArgType::Bool),
                ArgSpec::required("at", ArgType::Position),
            ],
            move |_, args| {
                second.set(2);
                Ok(Some(format!("{:?} {:?}", args.bool("flag"), args.position("at"))))
            },
        ),
    ];
    rt.register_command("bool", "test", 0, overloads).unwrap();

    let output = rt.invoke_console_command("console", "/bool true 1 2 3");
    assert_eq!(picked.get(), 2);
    assert_eq!(output, "Some(true) Some([1.0, 2.0, 3.0])");
    rt.invoke_console_command("console", "/bool true");
    assert_eq!(picked.get(), 1);

    let usage = rt.invoke_console_command("console", "/bool maybe");
    assert!(usage.starts_with("Syntax error"), "{}", usage);
}

#[test]
fn test_reregistered_command_keeps_first_overload() {
    let mut rt = runtime();
    for (description, reply) in [("first", "first"), ("second", "second")] {
        rt.register_command(
            "string",
            description,
            0,
            vec![Overload::new(vec![ArgSpec::required("string", ArgType::String)], move |_, _| {
                Ok(Some(reply.to_string()))
            })],
        )
        .unwrap();
    }

    assert_eq!(rt.invoke_console_command("console", "/string hi"), "first");
    let command = rt.commands().find(|c| c.name == "string").unwrap();
    assert_eq!(command.overloads.len(), 2);
    assert_eq!(command.description, "second");
}

#[test]
fn test_permission_denied_skips_handler() {
    let mut rt = runtime();
    let runs = counter();
    let seen = Rc::clone(&runs);
    rt.register_command(
        "secret",
        "level two",
        2,
        vec![Overload::new(vec![], move |_, _| {
            seen.set(seen.get() + 1);
            Ok(Some("ok".to_string()))
        })],
    )
    .unwrap();

    let player = rt.add_player("Steve", [0.0; 3]).unwrap();
    rt.set_permission_level(player, 1);
    let origin = rt.origin_for(player).unwrap();
    assert!(matches!(
        rt.invoke(origin, "/secret"),
        Err(CommandError::PermissionDenied { required: 2, actual: 1, .. })
    ));
    assert_eq!(runs.get(), 0);

    assert_eq!(rt.invoke_privileged_command(player, "/secret"), "ok");
    assert_eq!(runs.get(), 1);
}

#[test]
fn test_listener_added_during_delivery_waits() {
    let mut rt = runtime();
    let order = Rc::new(RefCell::new(Vec::new()));

    let log = Rc::clone(&order);
    rt.listen_for_event("test:ping", move |rt: &mut ScriptRuntime, _: &Value| {
        log.borrow_mut().push("a");
        let late = Rc::clone(&log);
        rt.listen_for_event("test:ping", move |_: &mut ScriptRuntime, _: &Value| {
            late.borrow_mut().push("d");
            Ok(())
        })?;
        Ok(())
    })
    .unwrap();
    for name in ["b", "c"] {
        let log = Rc::clone(&order);
        rt.listen_for_event("test:ping", move |_: &mut ScriptRuntime, _: &Value| {
            log.borrow_mut().push(name);
            Ok(())
        })
        .unwrap();
    }

    rt.broadcast_event("test:ping", &json!({})).unwrap();
    assert_eq!(*order.borrow(), vec!["a", "b", "c"]);

    order.borrow_mut().clear();
    rt.broadcast_event("test:ping", &json!({})).unwrap();
    assert_eq!(*order.borrow(), vec!["a", "b", "c", "d"]);
}

#[test]
fn test_failing_listener_does_not_stop_delivery() {
    let mut rt = runtime();
    let delivered = counter();
    rt.listen_for_event("test:ping", |_: &mut ScriptRuntime, _: &Value| Err(ScriptError::script("boom")))
        .unwrap();
    let seen = Rc::clone(&delivered);
    rt.listen_for_event("test:ping", move |_: &mut ScriptRuntime, _: &Value| {
        seen.set(seen.get() + 1);
        Ok(())
    })
    .unwrap();

    rt.broadcast_event("test:ping", &json!(null)).unwrap();
    assert_eq!(delivered.get(), 1);
}

#[test]
fn test_unlisten() {
    let mut rt = runtime();
    let delivered = counter();
    let seen = Rc::clone(&delivered);
    let id = rt
        .listen_for_event("test:ping", move |_: &mut ScriptRuntime, _: &Value| {
            seen.set(seen.get() + 1);
            Ok(())
        })
        .unwrap();
    assert!(rt.unlisten(id));
    assert!(!rt.unlisten(id));
    rt.broadcast_event("test:ping", &json!({})).unwrap();
    assert_eq!(delivered.get(), 0);
}

#[test]
fn test_builtin_payload_is_checked() {
    let mut rt = runtime();
    assert!(rt.broadcast_event(events::ENTITY_CREATED, &json!({"entity": null})).is_err());
    assert!(rt.broadcast_event(events::DISPLAY_CHAT_EVENT, &json!(3)).is_err());
}

#[test]
fn test_template_failure_leaves_nothing_behind() {
    let mut rt = runtime();
    assert!(matches!(
        rt.create_entity_from_template(EntityType::Entity, "minecraft:dragon"),
        Err(ScriptError::Host(HostError::UnknownTemplate(_)))
    ));
    assert!(rt.create_entity_from_template(EntityType::Entity, "test:broken").is_err());
    assert!(rt.entities().is_empty());
}

#[test]
fn test_execute_command_event_runs_as_world_owner() {
    let mut rt = runtime();
    let level = Rc::new(Cell::new(0u8));
    let seen = Rc::clone(&level);
    rt.register_command(
        "op",
        "owner only",
        4,
        vec![Overload::new(vec![], move |rt, _| {
            seen.set(rt.current_command_origin().map_or(0, |o| o.permission_level));
            Ok(None)
        })],
    )
    .unwrap();

    rt.broadcast_event(events::EXECUTE_COMMAND, &json!("/op")).unwrap();
    assert_eq!(level.get(), 4);
}

#[test]
fn test_chat_and_particles_reach_host() {
    let host = RecordingHost::default();
    let (chat, particles) = (Rc::clone(&host.chat), Rc::clone(&host.particles));
    let mut rt = ScriptRuntime::new(Box::new(host));
    let cow = rt.spawn_entity(EntityType::Entity, "minecraft:cow").unwrap();

    rt.broadcast_message("hello").unwrap();
    let payload = json!({"effect": "minecraft:heart", "entity": cow.to_json(), "offset": [0, 1, 0]});
    rt.broadcast_event(events::SPAWN_PARTICLE_ATTACHED_ENTITY, &payload).unwrap();

    assert_eq!(*chat.borrow(), vec!["hello".to_string()]);
    assert_eq!(*particles.borrow(), vec![("minecraft:heart".to_string(), cow)]);
}

#[test]
fn test_destroy_inside_listener_is_immediate() {
    let mut rt = runtime();
    let cow = rt.spawn_entity(EntityType::Entity, "minecraft:cow").unwrap();
    let observed = Rc::new(Cell::new(true));

    rt.listen_for_event("test:cull", |rt: &mut ScriptRuntime, payload: &Value| {
        let entity = EntityRef::from_json(&payload["entity"]).ok_or_else(|| ScriptError::script("no entity"))?;
        rt.destroy_entity(entity)
    })
    .unwrap();
    let seen = Rc::clone(&observed);
    rt.listen_for_event("test:cull", move |rt: &mut ScriptRuntime, payload: &Value| {
        let entity = EntityRef::from_json(&payload["entity"]).ok_or_else(|| ScriptError::script("no entity"))?;
        seen.set(rt.is_valid_entity(entity));
        Ok(())
    })
    .unwrap();

    rt.broadcast_event("test:cull", &json!({"entity": cow.to_json()})).unwrap();
    assert!(!observed.get());
    assert!(!rt.is_valid_entity(cow));
}

#[test]
fn test_zero_health_announces_death() {
    let mut rt = runtime();
    let cow = rt.spawn_entity(EntityType::Entity, "minecraft:cow").unwrap();
    let deaths = counter();
    let seen = Rc::clone(&deaths);
    rt.listen_for_event(events::ENTITY_DEATH, move |_: &mut ScriptRuntime, _: &Value| {
        seen.set(seen.get() + 1);
        Ok(())
    })
    .unwrap();

    let mut health = rt.get_component(cow, builtin::HEALTH).unwrap();
    health.set("value", 0);
    rt.apply_component_changes(cow, &health).unwrap();
    assert_eq!(deaths.get(), 1);
    assert!(rt.is_valid_entity(cow));

    rt.kill_entity(cow).unwrap();
    assert_eq!(deaths.get(), 2);
    assert!(!rt.is_valid_entity(cow));
}

#[test]
fn test_nested_invoke_keeps_origin() {
    let mut rt = runtime();
    rt.register_command(
        "whoami",
        "origin name",
        0,
        vec![Overload::new(vec![], |rt, _| {
            Ok(rt.current_command_origin().map(|o| o.name.clone()))
        })],
    )
    .unwrap();
    rt.register_command(
        "relay",
        "runs whoami",
        0,
        vec![Overload::new(vec![], |rt, _| Ok(Some(rt.invoke_command("/whoami"))))],
    )
    .unwrap();

    let player = rt.add_player("Alex", [0.0; 3]).unwrap();
    assert_eq!(rt.invoke_command_as(player, "/relay"), "Alex");
    assert!(rt.current_command_origin().is_none());
    assert_eq!(rt.invoke_command("/whoami"), DEFAULT_CONSOLE_NAME);
}

#[test]
fn test_selector_arguments_and_messages() {
    let mut rt = runtime();
    let steve = rt.add_player("Steve", [0.0; 3]).unwrap();
    let alex = rt.add_player("Alex", [50.0, 0.0, 0.0]).unwrap();
    rt.register_command(
        "count",
        "count targets",
        0,
        vec![Overload::new(
            vec![ArgSpec::required("targets", ArgType::PlayerSelector)],
            |_, args| Ok(Some(args.entities("targets").map_or(0, <[_]>::len).to_string())),
        )],
    )
    .unwrap();

    assert_eq!(rt.invoke_command_as(steve, "/count @a"), "2");
    assert_eq!(rt.invoke_command_as(alex, "/count @p"), "1");
    assert_eq!(rt.invoke_command_as(steve, "/count Alex"), "1");
}

#[test]
fn test_invalid_origin() {
    let mut rt = runtime();
    let ghost = rt.create_entity();
    rt.destroy_entity(ghost).unwrap();
    assert!(matches!(rt.origin_for(ghost), Err(CommandError::InvalidOrigin(_))));
    assert!(rt.invoke_command_as(ghost, "/anything").starts_with("Cannot run"));
}

#[test]
fn test_unknown_and_failing_commands() {
    let mut rt = runtime();
    assert!(rt.invoke_command("/nope").starts_with("Unknown command"));
    rt.register_command(
        "fail",
        "always fails",
        0,
        vec![Overload::new(vec![], |_, _| Err(ScriptError::script("nope")))],
    )
    .unwrap();
    assert_eq!(rt.invoke_command("/fail"), "/fail failed: nope");
}

#[test]
fn test_transfer_requires_player() {
    let mut rt = runtime();
    let cow = rt.spawn_entity(EntityType::Entity, "minecraft:cow").unwrap();
    assert!(rt.transfer_player(cow, "example.org", 19132).is_err());
    let steve = rt.add_player("Steve", [0.0; 3]).unwrap();
    // the recording host does not implement transfers
    assert!(matches!(
        rt.transfer_player(steve, "example.org", 19132),
        Err(ScriptError::Host(HostError::Unsupported(_)))
    ));
}

#[test]
fn test_tick_announces_non_players() {
    let mut rt = runtime();
    let cow = rt.spawn_entity(EntityType::Entity, "minecraft:cow").unwrap();
    rt.add_player("Steve", [0.0; 3]).unwrap();
    let ticked = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&ticked);
    rt.listen_for_event(events::ENTITY_TICK, move |_: &mut ScriptRuntime, payload: &Value| {
        seen.borrow_mut().extend(EntityRef::from_json(&payload["entity"]));
        Ok(())
    })
    .unwrap();

    let before = rt.world().time_of_day;
    rt.tick();
    assert_eq!(rt.current_tick(), 1);
    assert_eq!(rt.world().time_of_day, before + 1);
    assert_eq!(*ticked.borrow(), vec![cow]);
}
