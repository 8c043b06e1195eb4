mod config;
mod index;
mod search;
mod status;

pub use config::ConfigCommand;
pub use index::IndexCommand;
pub use search::SearchArgs;

pub use config::handle_config;
pub use index::handle_index;
pub use search::handle_search;
pub use status::handle_status;

use crate::models::Config;
use crate::services::MetricsStore;

/// Best-effort operation log entry. Metrics never fail a command.
pub(crate) fn record_operation(
    config: &Config,
    operation: &str,
    detail: &str,
    duration_ms: u64,
    success: bool,
) {
    if !config.metrics.enabled {
        return;
    }
    if let Some(store) = MetricsStore::open_default() {
        store.record(operation, detail, duration_ms, success);
        store.cleanup(config.metrics.retention_days);
    }
}
