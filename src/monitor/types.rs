// src/monitor/types.rs
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http::default_user_agent;
use crate::monitor::filters::FilterPipeline;

/// How two observations of the same URL are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckMethod {
    /// SHA-256 digest comparison of the (filtered) content.
    #[default]
    Hash,
    /// Byte-length comparison only.
    Length,
    /// Caller-supplied comparison function.
    Custom,
}

/// Caller-supplied comparator for [`CheckMethod::Custom`].
///
/// Takes `(old, new)` content and returns `(changed, details)`.
#[derive(Clone)]
pub struct CompareFn(Arc<dyn Fn(&[u8], &[u8]) -> (bool, String) + Send + Sync>);

impl CompareFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[u8], &[u8]) -> (bool, String) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, old: &[u8], new: &[u8]) -> (bool, String) {
        (self.0)(old, new)
    }
}

impl fmt::Debug for CompareFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompareFn(..)")
    }
}

/// Immutable configuration for one watch target.
///
/// Changing behavior means building a new monitor from a fresh config.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub url: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub headers: HashMap<String, String>,
    pub method: CheckMethod,
    pub compare_fn: Option<CompareFn>,
    pub retry_count: u32,
    pub retry_interval: Duration,
    pub follow_redirects: bool,
    pub normalize_whitespace: bool,
    pub ignore_timestamps: bool,
    pub filters: FilterPipeline,
    /// Identification string sent as the default User-Agent header.
    pub user_agent: String,
}

impl TargetConfig {
    /// Defaults: check every 5 minutes, 30s timeout, hash comparison,
    /// 3 retries 10s apart, redirects followed.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            interval: Duration::from_secs(5 * 60),
            timeout: Duration::from_secs(30),
            headers: HashMap::new(),
            method: CheckMethod::Hash,
            compare_fn: None,
            retry_count: 3,
            retry_interval: Duration::from_secs(10),
            follow_redirects: true,
            normalize_whitespace: false,
            ignore_timestamps: false,
            filters: FilterPipeline::new(),
            user_agent: default_user_agent(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_method(mut self, method: CheckMethod) -> Self {
        self.method = method;
        self
    }
}

/// One observation outcome for a watched URL.
///
/// Emitted on a detected change or after all fetch attempts failed,
/// never both: `error` and `has_changed` are mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub has_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ChangeEvent {
    pub(crate) fn changed(
        url: &str,
        status_code: u16,
        content_type: Option<String>,
        details: Option<String>,
    ) -> Self {
        Self {
            url: url.to_owned(),
            timestamp: Utc::now(),
            has_changed: true,
            status_code: Some(status_code),
            content_type,
            error: None,
            details,
        }
    }

    pub(crate) fn failed(url: &str, error: String) -> Self {
        Self {
            url: url.to_owned(),
            timestamp: Utc::now(),
            has_changed: false,
            status_code: None,
            content_type: None,
            error: Some(error),
            details: None,
        }
    }
}

/// Monitor activity tag, readable from other tasks while checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckStatus {
    #[default]
    Idle,
    Checking,
}

/// Point-in-time view of a monitor's internal counters.
#[derive(Debug, Clone, Copy)]
pub struct StatusSnapshot {
    pub last_check: Option<DateTime<Utc>>,
    pub status: CheckStatus,
    pub check_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let cfg = TargetConfig::new("https://example.com");
        assert_eq!(cfg.interval, Duration::from_secs(300));
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.method, CheckMethod::Hash);
        assert_eq!(cfg.retry_count, 3);
        assert_eq!(cfg.retry_interval, Duration::from_secs(10));
        assert!(cfg.follow_redirects);
        assert!(!cfg.normalize_whitespace);
        assert!(!cfg.ignore_timestamps);
    }

    #[test]
    fn error_event_serializes_without_empty_fields() {
        let ev = ChangeEvent::failed("https://example.com", "boom".into());
        let json = serde_json::to_string(&ev).expect("serialize event");
        assert!(json.contains("\"error\":\"boom\""));
        assert!(!json.contains("status_code"));
        assert!(!json.contains("details"));
    }

    #[test]
    fn change_event_carries_response_metadata() {
        let ev = ChangeEvent::changed(
            "https://example.com",
            200,
            Some("text/html".into()),
            Some("content differs at position 3".into()),
        );
        let json = serde_json::to_string(&ev).expect("serialize event");
        assert!(json.contains("\"has_changed\":true"));
        assert!(json.contains("\"status_code\":200"));
        assert!(json.contains("text/html"));
        assert!(ev.error.is_none());
    }
}
