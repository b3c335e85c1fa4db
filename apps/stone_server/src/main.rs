use std::env;
use std::io::{self, BufRead};
use std::path::Path;
use std::thread;

use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{Level, debug, error, info, warn};

use stone_log::{LogConfig, init_logging, parse_level};
use stone_schema::Validatable;
use stone_script::{CommandOrigin, ENGINE_API_VERSION, ScriptRuntime, SystemManager, render};

mod config;
use config::Config;

mod host;
use host::StoneHost;

mod systems;

const VERSION: &str = "0.1.0";

/// Get default config path based on executable location
fn default_config_path() -> String {
    env::current_exe()
        .ok()
        .and_then(|exe_path| {
            let stem = exe_path.file_stem()?;
            let parent = exe_path.parent()?;
            Some(parent.join(stem).with_extension("json"))
        })
        .and_then(|path| path.to_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "./stone_server.json".to_string())
}

/// Stone Server - headless script bridge host
#[derive(Parser, Debug)]
#[command(name = "stone_server")]
#[command(version = VERSION)]
#[command(about = "Runs Stone script systems against a headless world", long_about = None)]
struct Args {
    /// Path to configuration file (JSON)
    #[arg(short, long, default_value_t = default_config_path())]
    config: String,

    /// Enable logging to file (stone_server.log in current directory)
    #[arg(long, env = "STONE_LOG_FILE")]
    log_file: bool,

    /// Print the configuration JSON Schema and exit
    #[arg(long)]
    print_schema: bool,
}

/// Forward lines from `reader` to the main loop
///
/// Reads on a plain OS thread: a blocked read never holds up runtime
/// shutdown, and the thread dies with the process.
fn spawn_line_reader<R: BufRead + Send + 'static>(reader: R) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    let spawned = thread::Builder::new().name("stone-console".to_string()).spawn(move || {
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    if let Err(e) = spawned {
        warn!("Console input disabled, reader thread failed to start: {}", e);
    }
    rx
}

fn spawn_console_reader() -> mpsc::Receiver<String> {
    spawn_line_reader(io::BufReader::new(io::stdin()))
}

/// Load the config file; a missing file means defaults
fn load_config(path: &str) -> Result<(Config, bool), String> {
    if !Path::new(path).exists() {
        return Ok((Config::default(), false));
    }
    let config = Config::from_json_file(path).map_err(|e| e.to_string())?;
    Ok((config, true))
}

fn build_systems(config: &Config) -> SystemManager {
    let mut manager = SystemManager::new();
    for name in &config.systems {
        let Some(system) = systems::create(name) else {
            warn!("Unknown system '{}', skipped", name);
            continue;
        };
        if let Err(e) = manager.register_system(name, 0, 0, system) {
            error!("Failed to register system '{}': {}", name, e);
        }
    }
    manager
}

fn spawn_players(runtime: &mut ScriptRuntime, config: &Config) {
    for player in &config.players {
        match runtime.add_player(&player.name, player.position) {
            Ok(entity) => runtime.set_permission_level(entity, player.permission_level),
            Err(e) => error!("Failed to spawn player '{}': {}", player.name, e),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    if args.print_schema {
        match Config::schema_json() {
            Ok(schema) => println!("{}", schema),
            Err(e) => {
                eprintln!("Failed to generate schema: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // Logging is not up yet, so early failures go to stderr
    let (config, from_file) = match load_config(&args.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load config from '{}': {}", args.config, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = config.validate_systems() {
        eprintln!("Configuration validation error: {}", e);
        std::process::exit(1);
    }

    let log_level = parse_level(&config.log_level).unwrap_or(Level::INFO);
    let log_config = if args.log_file {
        match std::fs::File::create("stone_server.log") {
            Ok(file) => LogConfig::new("stone_server::").with_level(log_level).with_log_file(file),
            Err(e) => {
                eprintln!("Unable to create stone_server.log: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        LogConfig::<std::fs::File>::new("stone_server::").with_level(log_level)
    };
    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!("Stone Server v{} (script API {})", VERSION, ENGINE_API_VERSION);
    if from_file {
        info!("Configuration: {}", args.config);
    } else {
        info!("No configuration at '{}', using defaults", args.config);
    }

    debug!("Settings:");
    debug!("  Name: {}", config.name);
    debug!("  Tick Rate: {} Hz", config.tick_rate);
    debug!("  Log Level: {}", config.log_level);
    debug!("  Templates: {}", config.templates.len());
    debug!("  Systems: {}", config.systems.join(", "));

    let mut runtime = ScriptRuntime::new(Box::new(StoneHost::new(config.templates.clone())))
        .with_world(config.world.clone())
        .with_console_name(config.console_name.clone());

    let mut manager = build_systems(&config);
    manager.initialize(&mut runtime);
    spawn_players(&mut runtime, &config);

    let mut ticker = interval(Duration::from_micros(1_000_000 / config.tick_rate.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut console = spawn_console_reader();
    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Entering Main Loop. Type commands on stdin, 'stop' or Ctrl+C to shut down");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                manager.update(&mut runtime);
            }
            Some(line) = console.recv() => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("stop") {
                    info!("Stop requested from console");
                    break;
                }
                let origin = CommandOrigin::console(config.console_name.clone())
                    .with_permission_level(config.console_permission_level);
                let command = if line.starts_with('/') { line.to_string() } else { format!("/{}", line) };
                let output = render(runtime.invoke(origin, &command));
                if !output.is_empty() {
                    info!(command = %command, origin = %config.console_name, "{}", output);
                }
            }
            _ = &mut shutdown => {
                info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    manager.shutdown(&mut runtime);
    info!("Stone Server stopped after {} ticks", runtime.current_tick());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test(flavor = "current_thread")]
    async fn test_line_reader_forwards_then_closes() {
        let mut lines = spawn_line_reader(Cursor::new("say hi\nstop\n"));
        assert_eq!(lines.recv().await.as_deref(), Some("say hi"));
        assert_eq!(lines.recv().await.as_deref(), Some("stop"));
        assert_eq!(lines.recv().await, None);
    }

    #[test]
    fn test_missing_config_means_defaults() {
        let (config, from_file) = load_config("/nonexistent/stone_server.json").unwrap();
        assert!(!from_file);
        assert_eq!(config.tick_rate, Config::default().tick_rate);
    }
}
