// src/monitor/error.rs
use thiserror::Error;

/// Configuration and construction failures.
///
/// These are the only synchronous failures in the crate; everything that can
/// go wrong at runtime (fetching, comparing) is delivered as a
/// [`ChangeEvent`](crate::monitor::ChangeEvent) on the event stream instead.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("URL cannot be empty")]
    EmptyUrl,

    #[error("check interval must be greater than zero")]
    InvalidInterval,

    #[error("monitor for URL '{0}' already exists")]
    DuplicateUrl(String),

    #[error("no monitor found for URL '{0}'")]
    UnknownUrl(String),

    #[error("group '{0}' already exists")]
    DuplicateGroup(String),

    #[error("group '{0}' does not exist")]
    UnknownGroup(String),

    #[error("invalid filter pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
