//! Script systems and their lifecycle
//!
//! A system is registered once with the script API version it was written
//! against, then driven by the host: `initialize` once, `update` every tick,
//! `shutdown` once. A failing system is logged and never stops the others.

use stone_schema::{ApiVersion, check_api_compatibility};

use crate::error::Result;
use crate::runtime::ScriptRuntime;

/// Script API version this engine provides
pub const ENGINE_API_VERSION: &str = "0.1.0";

/// A unit of script code driven by the lifecycle
///
/// Every callback has a no-op default, so a system implements only what it needs.
pub trait ScriptSystem {
    fn initialize(&mut self, runtime: &mut ScriptRuntime) -> Result<()> {
        let _ = runtime;
        Ok(())
    }

    fn update(&mut self, runtime: &mut ScriptRuntime) -> Result<()> {
        let _ = runtime;
        Ok(())
    }

    fn shutdown(&mut self, runtime: &mut ScriptRuntime) -> Result<()> {
        let _ = runtime;
        Ok(())
    }
}

struct RegisteredSystem {
    name: String,
    version: ApiVersion,
    system: Box<dyn ScriptSystem>,
}

#[derive(Clone, Copy, Debug)]
enum Phase {
    Initialize,
    Update,
    Shutdown,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Initialize => "initialize",
            Phase::Update => "update",
            Phase::Shutdown => "shutdown",
        }
    }
}

/// Registered systems, driven in registration order
#[derive(Default)]
pub struct SystemManager {
    systems: Vec<RegisteredSystem>,
}

impl SystemManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system
    ///
    /// # Arguments
    /// * `name` - System id used in log lines and as listener owner
    /// * `major` - Script API major version the system was written for
    /// * `minor` - Script API minor version; must not exceed the engine's
    /// * `system` - The system itself
    pub fn register_system(
        &mut self,
        name: &str,
        major: u64,
        minor: u64,
        system: Box<dyn ScriptSystem>,
    ) -> Result<()> {
        let version = ApiVersion::new(major, minor);
        check_api_compatibility(name, version, ENGINE_API_VERSION)?;

        tracing::info!("Registered system '{}' (script API {})", name, version);
        self.systems.push(RegisteredSystem {
            name: name.to_string(),
            version,
            system,
        });
        Ok(())
    }

    /// Names and API versions of the registered systems
    pub fn systems(&self) -> impl Iterator<Item = (&str, ApiVersion)> {
        self.systems.iter().map(|s| (s.name.as_str(), s.version))
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn initialize(&mut self, runtime: &mut ScriptRuntime) {
        self.run(runtime, Phase::Initialize);
    }

    /// Advance the runtime one tick, then update every system
    pub fn update(&mut self, runtime: &mut ScriptRuntime) {
        runtime.tick();
        self.run(runtime, Phase::Update);
    }

    /// Shut every system down and drop the listeners it registered
    pub fn shutdown(&mut self, runtime: &mut ScriptRuntime) {
        self.run(runtime, Phase::Shutdown);
        for registered in &self.systems {
            runtime.remove_listeners_of(&registered.name);
        }
        tracing::info!("{} system(s) shut down", self.systems.len());
    }

    fn run(&mut self, runtime: &mut ScriptRuntime, phase: Phase) {
        for registered in &mut self.systems {
            runtime.set_current_system(Some(registered.name.clone()));
            let result = match phase {
                Phase::Initialize => registered.system.initialize(runtime),
                Phase::Update => registered.system.update(runtime),
                Phase::Shutdown => registered.system.shutdown(runtime),
            };
            runtime.set_current_system(None);

            if let Err(e) = result {
                match phase {
                    Phase::Update => tracing::warn!(system_id = %registered.name, "{} failed: {}", phase.as_str(), e),
                    _ => tracing::error!(system_id = %registered.name, "{} failed: {}", phase.as_str(), e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::Value;

    use super::*;
    use crate::error::ScriptError;
    use crate::host::NullHost;

    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
        fail_update: bool,
    }

    impl ScriptSystem for Recorder {
        fn initialize(&mut self, runtime: &mut ScriptRuntime) -> Result<()> {
            let log = Rc::clone(&self.log);
            runtime.listen_for_event("test:ping", move |_: &mut ScriptRuntime, _: &Value| {
                log.borrow_mut().push("ping".to_string());
                Ok(())
            })?;
            self.log.borrow_mut().push(format!("init:{}", runtime.current_system().unwrap_or("-")));
            Ok(())
        }

        fn update(&mut self, runtime: &mut ScriptRuntime) -> Result<()> {
            if self.fail_update {
                return Err(ScriptError::script("broken"));
            }
            self.log.borrow_mut().push(format!("update:{}", runtime.current_tick()));
            Ok(())
        }

        fn shutdown(&mut self, _runtime: &mut ScriptRuntime) -> Result<()> {
            self.log.borrow_mut().push("shutdown".to_string());
            Ok(())
        }
    }

    fn recorder(log: &Rc<RefCell<Vec<String>>>, fail_update: bool) -> Box<dyn ScriptSystem> {
        Box::new(Recorder {
            log: Rc::clone(log),
            fail_update,
        })
    }

    #[test]
    fn test_incompatible_version_is_rejected() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut manager = SystemManager::new();
        assert!(matches!(
            manager.register_system("future", 0, 9, recorder(&log, false)),
            Err(ScriptError::IncompatibleSystem(_))
        ));
        assert!(manager.register_system("legacy", 1, 0, recorder(&log, false)).is_err());
        assert!(manager.register_system("current", 0, 0, recorder(&log, false)).is_ok());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_lifecycle_order_and_isolation() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut runtime = ScriptRuntime::new(Box::new(NullHost));
        let mut manager = SystemManager::new();
        manager.register_system("broken", 0, 0, recorder(&log, true)).unwrap();
        manager.register_system("healthy", 0, 0, recorder(&log, false)).unwrap();

        manager.initialize(&mut runtime);
        manager.update(&mut runtime);
        assert_eq!(
            *log.borrow(),
            vec!["init:broken", "init:healthy", "update:1"]
        );
        assert!(runtime.current_system().is_none());

        manager.shutdown(&mut runtime);
        log.borrow_mut().clear();
        runtime.broadcast_event("test:ping", &Value::Null).unwrap();
        assert!(log.borrow().is_empty());
    }
}
