//! Centralized logging for Stone applications
//!
//! Provides a custom formatter for tracing that:
//! - Renders script log lines (events carrying a `system_id` field) as `system::<id>: message`
//! - Renders command dispatch lines (events carrying `command` and `origin`) as `/<command> by <origin>:`
//! - Strips the application prefix from targets for cleaner output
//! - Filters external dependency logs based on the `STONE_LOGDEPS` environment variable
//!
//! # Environment Variables
//!
//! - `STONE_LOGDEPS`: Set to `1` to enable logging from external dependencies (tokio, etc.).
//!   Default is `0` which only shows logs from Stone crates.
//! - `RUST_LOG`: Overrides the generated filter directives entirely.
//!
//! # Usage
//!
//! ```rust,ignore
//! use stone_log::{init_logging, LogConfig};
//! use tracing::Level;
//!
//! let file = std::fs::File::create("stone_server.log")?;
//! let config = LogConfig::new("stone_server::")
//!     .with_log_file(file)
//!     .with_level(Level::DEBUG);
//! init_logging(config)?;
//! ```

use std::fmt as std_fmt;
use std::io::Write;
use tracing::Level;
use tracing::field::Field;
use tracing_subscriber::field::Visit;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::fmt::{
    self, FmtContext, FormatEvent, FormatFields, format::Writer,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// Crates whose logs are shown when dependency logging is off
const STONE_TARGETS: &[&str] = &[
    "stone_server",
    "stone_script",
    "stone_schema",
    "stone_log",
];

/// Field extractor for the fields the formatter gives special treatment
#[derive(Default)]
pub struct FieldExtractor {
    pub system_id: Option<String>,
    pub command: Option<String>,
    pub origin: Option<String>,
    pub message: Option<String>,
}

impl FieldExtractor {
    fn store(&mut self, name: &str, value: String) {
        match name {
            "system_id" => self.system_id = Some(value),
            "command" => self.command = Some(value),
            "origin" => self.origin = Some(value),
            "message" => self.message = Some(value),
            _ => {}
        }
    }
}

impl Visit for FieldExtractor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.store(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std_fmt::Debug) {
        self.store(
            field.name(),
            format!("{:?}", value).trim_matches('"').to_string(),
        );
    }
}

/// Custom event formatter for Stone applications
pub struct CustomFormatter<T> {
    timer: T,
    ansi: bool,
    /// Prefix to strip from log targets (e.g., "stone_server::")
    strip_prefix: Option<String>,
}

impl<T> CustomFormatter<T> {
    pub fn new(timer: T, ansi: bool) -> Self {
        Self {
            timer,
            ansi,
            strip_prefix: None,
        }
    }

    /// Set the prefix to strip from log targets
    pub fn with_strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefix = Some(prefix.into());
        self
    }

    fn display_target<'t>(&self, target: &'t str) -> Option<&'t str> {
        let Some(prefix) = &self.strip_prefix else {
            return Some(target);
        };
        let app_name = prefix.trim_end_matches("::");
        if target == app_name {
            return None;
        }
        Some(target.strip_prefix(prefix.as_str()).unwrap_or(target))
    }
}

impl<T: Clone> Clone for CustomFormatter<T> {
    fn clone(&self) -> Self {
        Self {
            timer: self.timer.clone(),
            ansi: self.ansi,
            strip_prefix: self.strip_prefix.clone(),
        }
    }
}

impl<S, N, T> FormatEvent<S, N> for CustomFormatter<T>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    T: fmt::time::FormatTime,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std_fmt::Result {
        let metadata = event.metadata();

        let (dim_start, dim_end) = if self.ansi {
            ("\x1b[2m", "\x1b[0m")
        } else {
            ("", "")
        };
        let (level_color, level_str) = match *metadata.level() {
            Level::ERROR => (if self.ansi { "\x1b[31m" } else { "" }, "ERROR"),
            Level::WARN => (if self.ansi { "\x1b[33m" } else { "" }, " WARN"),
            Level::INFO => (if self.ansi { "\x1b[32m" } else { "" }, " INFO"),
            Level::DEBUG => (if self.ansi { "\x1b[34m" } else { "" }, "DEBUG"),
            Level::TRACE => (if self.ansi { "\x1b[35m" } else { "" }, "TRACE"),
        };
        let color_end = if self.ansi { "\x1b[0m" } else { "" };

        write!(writer, "{}", dim_start)?;
        self.timer.format_time(&mut writer)?;
        write!(writer, "{} ", dim_end)?;
        write!(writer, "{}{}{} ", level_color, level_str, color_end)?;

        let mut extractor = FieldExtractor::default();
        event.record(&mut extractor);

        if let Some(system_id) = &extractor.system_id {
            write!(writer, "{}system::{}{}: ", dim_start, system_id, dim_end)?;
            if let Some(msg) = &extractor.message {
                write!(writer, "{}", msg)?;
            }
        } else if let (Some(command), Some(origin)) = (&extractor.command, &extractor.origin) {
            write!(writer, "{}/{} by {}{}: ", dim_start, command, origin, dim_end)?;
            if let Some(msg) = &extractor.message {
                write!(writer, "{}", msg)?;
            }
        } else {
            if let Some(target) = self.display_target(metadata.target()) {
                if !target.is_empty() {
                    write!(writer, "{}{}{}: ", dim_start, target, dim_end)?;
                }
            }
            ctx.field_format().format_fields(writer.by_ref(), event)?;
        }

        writeln!(writer)
    }
}

/// Create a timer with the Stone format
///
/// Uses format: `[year]/[month]/[day] [hour]:[minute]:[second].[subsecond digits:4]`
pub fn create_custom_timer()
-> OffsetTime<&'static [time::format_description::BorrowedFormatItem<'static>]> {
    use time::macros::format_description;

    let format =
        format_description!("[year]/[month]/[day] [hour]:[minute]:[second].[subsecond digits:4]");
    let offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    OffsetTime::new(offset, format)
}

/// Check if dependency logging is enabled via `STONE_LOGDEPS=1`
pub fn is_dependency_logging_enabled() -> bool {
    std::env::var("STONE_LOGDEPS")
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Build the filter directive for the given level
///
/// Without dependency logging only Stone crates are shown; everything else is `off`.
pub fn build_filter_directives(level: Level, log_deps: bool) -> String {
    let level_str = match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    };

    if log_deps {
        return level_str.to_string();
    }

    let mut directives = String::from("off");
    for target in STONE_TARGETS {
        directives.push_str(&format!(",{}={}", target, level_str));
    }
    directives
}

/// Parse a configured level name, case-insensitively
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Detect if ANSI colors should be used
///
/// Disabled when stdout is not a TTY, `NO_COLOR` is set, or `TERM=dumb`.
pub fn should_use_ansi() -> bool {
    atty::is(atty::Stream::Stdout)
        && std::env::var("NO_COLOR").is_err()
        && std::env::var("TERM").map(|t| t != "dumb").unwrap_or(true)
}

/// Logging configuration
pub struct LogConfig<W: Write + Send + 'static = std::fs::File> {
    /// Prefix to strip from log targets (e.g., "stone_server::")
    pub strip_prefix: String,
    /// Whether to use ANSI color codes (auto-detected if None)
    pub use_ansi: Option<bool>,
    /// Minimum log level
    pub level: Level,
    /// Optional file to write logs to
    pub log_file: Option<W>,
}

impl<W: Write + Send + 'static> LogConfig<W> {
    pub fn new(strip_prefix: impl Into<String>) -> Self {
        Self {
            strip_prefix: strip_prefix.into(),
            use_ansi: None,
            level: Level::INFO,
            log_file: None,
        }
    }

    pub fn with_ansi(mut self, use_ansi: bool) -> Self {
        self.use_ansi = Some(use_ansi);
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_log_file(mut self, file: W) -> Self {
        self.log_file = Some(file);
        self
    }
}

/// Initialize logging with the given configuration
pub fn init_logging<W: Write + Send + 'static>(
    config: LogConfig<W>,
) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::EnvFilter;

    let timer = create_custom_timer();
    let use_ansi = config.use_ansi.unwrap_or_else(should_use_ansi);
    let filter_directives =
        build_filter_directives(config.level, is_dependency_logging_enabled());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&filter_directives));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .event_format(
            CustomFormatter::new(timer.clone(), use_ansi).with_strip_prefix(&config.strip_prefix),
        )
        .with_ansi(use_ansi)
        .with_writer(std::io::stdout);

    let file_layer = config.log_file.map(|file| {
        tracing_subscriber::fmt::layer()
            .event_format(CustomFormatter::new(timer, false).with_strip_prefix(&config.strip_prefix))
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(env_filter)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives_without_deps() {
        let directives = build_filter_directives(Level::DEBUG, false);
        assert!(directives.starts_with("off,"));
        assert!(directives.contains("stone_script=debug"));
        assert!(directives.contains("stone_server=debug"));
    }

    #[test]
    fn test_filter_directives_with_deps() {
        assert_eq!(build_filter_directives(Level::WARN, true), "warn");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("INFO"), Some(Level::INFO));
        assert_eq!(parse_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_level("verbose"), None);
    }

    #[test]
    fn test_display_target_strips_prefix() {
        let formatter = CustomFormatter::new((), false).with_strip_prefix("stone_server::");
        assert_eq!(formatter.display_target("stone_server::console"), Some("console"));
        assert_eq!(formatter.display_target("stone_server"), None);
        assert_eq!(formatter.display_target("stone_script::events"), Some("stone_script::events"));
    }
}
