// src/monitor/mod.rs
pub mod detector;
pub mod error;
pub mod filters;
pub mod manager;
pub mod target;
pub mod types;

pub use error::MonitorError;
pub use manager::{Group, Manager};
pub use target::Monitor;
pub use types::{ChangeEvent, CheckMethod, CheckStatus, CompareFn, StatusSnapshot, TargetConfig};

use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on an exporter).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("webwatch_checks_total", "Check cycles started across all monitors.");
        describe_counter!(
            "webwatch_fetch_retries_total",
            "Fetch attempts beyond the first within a check cycle."
        );
        describe_counter!(
            "webwatch_fetch_errors_total",
            "Check cycles that exhausted every fetch attempt."
        );
        describe_counter!("webwatch_changes_total", "Change events emitted.");
        describe_gauge!(
            "webwatch_last_check_ts",
            "Unix ts of the most recent completed check."
        );
    });
}
