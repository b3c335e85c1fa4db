/// Script console API
///
/// Bridges script log calls to tracing. Every line carries the `system_id`
/// field, which the log formatter renders as `system::<id>: message`.
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleApi;

impl ConsoleApi {
    /// Log an info message (`server.log`)
    pub fn log(system_id: &str, message: &str) {
        info!(system_id = system_id, "{}", message);
    }

    pub fn error(system_id: &str, message: &str) {
        error!(system_id = system_id, "{}", message);
    }

    pub fn warn(system_id: &str, message: &str) {
        warn!(system_id = system_id, "{}", message);
    }

    pub fn debug(system_id: &str, message: &str) {
        debug!(system_id = system_id, "{}", message);
    }
}
