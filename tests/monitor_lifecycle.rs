// tests/monitor_lifecycle.rs
// Full check cycles against scripted fetchers: baseline adoption, change
// detection, noise filtering, retries, and cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;

use webwatch::{
    ChangeEvent, CheckMethod, CompareFn, FetchError, FetchResponse, Fetcher, Monitor,
    MonitorError, TargetConfig,
};

/// Serves a fixed sequence of bodies, repeating the last one forever.
struct ScriptedFetcher {
    bodies: Vec<&'static [u8]>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    fn new(bodies: Vec<&'static [u8]>) -> Arc<Self> {
        Arc::new(Self {
            bodies,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        _url: &str,
        _headers: &HashMap<String, String>,
    ) -> Result<FetchResponse, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let body = self.bodies[n.min(self.bodies.len() - 1)].to_vec();
        Ok(FetchResponse {
            status: 200,
            content_type: Some("text/plain".to_owned()),
            body,
        })
    }
}

/// Always answers with the given status code.
struct FixedStatusFetcher {
    status: u16,
    calls: AtomicUsize,
}

#[async_trait]
impl Fetcher for FixedStatusFetcher {
    async fn fetch(
        &self,
        _url: &str,
        _headers: &HashMap<String, String>,
    ) -> Result<FetchResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FetchResponse {
            status: self.status,
            content_type: None,
            body: Vec::new(),
        })
    }
}

fn fast_config(url: &str) -> TargetConfig {
    let mut config = TargetConfig::new(url);
    config.interval = Duration::from_millis(20);
    config.retry_count = 0;
    config.retry_interval = Duration::from_millis(5);
    config
}

async fn expect_event(events: &mut mpsc::Receiver<ChangeEvent>) -> ChangeEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event stream closed early")
}

async fn expect_quiet(events: &mut mpsc::Receiver<ChangeEvent>) {
    let outcome = timeout(Duration::from_millis(200), events.recv()).await;
    assert!(outcome.is_err(), "expected no event, got {:?}", outcome);
}

#[tokio::test]
async fn construction_rejects_bad_configs() {
    let err = Monitor::new(fast_config("")).unwrap_err();
    assert!(matches!(err, MonitorError::EmptyUrl));

    let mut config = fast_config("https://example.com");
    config.interval = Duration::ZERO;
    let err = Monitor::new(config).unwrap_err();
    assert!(matches!(err, MonitorError::InvalidInterval));
}

#[tokio::test]
async fn first_observation_only_adopts_the_baseline() {
    let fetcher = ScriptedFetcher::new(vec![b"stable content"]);
    let monitor =
        Monitor::with_fetcher(fast_config("https://example.com"), fetcher.clone()).unwrap();
    let mut events = monitor.start().expect("first start");

    expect_quiet(&mut events).await;
    assert!(fetcher.calls() >= 2, "monitor should keep ticking");

    let status = monitor.status();
    assert!(status.check_count >= 2);
    assert!(status.last_check.is_some());
    monitor.stop();
}

#[tokio::test]
async fn changed_content_emits_one_event_with_metadata() {
    let fetcher = ScriptedFetcher::new(vec![b"hello", b"hello world"]);
    let monitor = Monitor::with_fetcher(fast_config("https://example.com"), fetcher).unwrap();
    let mut events = monitor.start().expect("first start");

    let event = expect_event(&mut events).await;
    assert!(event.has_changed);
    assert!(event.error.is_none());
    assert_eq!(event.url, "https://example.com");
    assert_eq!(event.status_code, Some(200));
    assert_eq!(event.content_type.as_deref(), Some("text/plain"));
    assert!(event
        .details
        .as_deref()
        .expect("diff details")
        .contains("differs at position 5"));

    // Baseline moved to the new content; stream stays quiet afterwards.
    expect_quiet(&mut events).await;
    monitor.stop();
}

#[tokio::test]
async fn length_method_flags_size_changes() {
    let fetcher = ScriptedFetcher::new(vec![b"hello", b"hello world"]);
    let mut config = fast_config("https://example.com");
    config.method = CheckMethod::Length;
    let monitor = Monitor::with_fetcher(config, fetcher).unwrap();
    let mut events = monitor.start().expect("first start");

    let event = expect_event(&mut events).await;
    assert!(event.has_changed);
    assert_eq!(
        event.details.as_deref(),
        Some("content length changed from 5 to 11 bytes")
    );
    monitor.stop();
}

#[tokio::test]
async fn timestamp_only_changes_are_masked_when_configured() {
    let bodies: Vec<&'static [u8]> = vec![
        b"Updated: 2023-04-15T14:32:17Z",
        b"Updated: 2023-04-15T15:00:00Z",
    ];

    let mut config = fast_config("https://example.com");
    config.ignore_timestamps = true;
    let monitor = Monitor::with_fetcher(config, ScriptedFetcher::new(bodies.clone())).unwrap();
    let mut events = monitor.start().expect("first start");
    expect_quiet(&mut events).await;
    monitor.stop();

    // Same inputs without masking: the rewritten timestamp is a change.
    let monitor = Monitor::with_fetcher(
        fast_config("https://example.com"),
        ScriptedFetcher::new(bodies),
    )
    .unwrap();
    let mut events = monitor.start().expect("first start");
    let event = expect_event(&mut events).await;
    assert!(event.has_changed);
    monitor.stop();
}

#[tokio::test]
async fn whitespace_normalization_masks_formatting_churn() {
    let bodies: Vec<&'static [u8]> = vec![b"hello world", b"hello \r\n  world"];

    let mut config = fast_config("https://example.com");
    config.normalize_whitespace = true;
    let monitor = Monitor::with_fetcher(config, ScriptedFetcher::new(bodies.clone())).unwrap();
    let mut events = monitor.start().expect("first start");
    expect_quiet(&mut events).await;
    monitor.stop();

    let monitor = Monitor::with_fetcher(
        fast_config("https://example.com"),
        ScriptedFetcher::new(bodies),
    )
    .unwrap();
    let mut events = monitor.start().expect("first start");
    assert!(expect_event(&mut events).await.has_changed);
    monitor.stop();
}

#[tokio::test]
async fn custom_comparator_drives_the_verdict() {
    let fetcher = ScriptedFetcher::new(vec![b"alpha", b"beta"]);
    let mut config = fast_config("https://example.com");
    config.method = CheckMethod::Custom;
    config.compare_fn = Some(CompareFn::new(|old: &[u8], new: &[u8]| {
        if old.first() != new.first() {
            (true, "first byte changed".to_owned())
        } else {
            (false, String::new())
        }
    }));
    let monitor = Monitor::with_fetcher(config, fetcher).unwrap();
    let mut events = monitor.start().expect("first start");

    let event = expect_event(&mut events).await;
    assert!(event.has_changed);
    assert_eq!(event.details.as_deref(), Some("first byte changed"));
    monitor.stop();
}

#[tokio::test]
async fn exhausted_retries_surface_one_error_event_per_cycle() {
    let fetcher = Arc::new(FixedStatusFetcher {
        status: 500,
        calls: AtomicUsize::new(0),
    });
    let mut config = fast_config("https://example.com");
    config.interval = Duration::from_secs(60); // one cycle in this test
    config.retry_count = 2;
    config.retry_interval = Duration::from_millis(10);
    let monitor = Monitor::with_fetcher(config, fetcher.clone()).unwrap();
    let mut events = monitor.start().expect("first start");

    let event = expect_event(&mut events).await;
    assert!(!event.has_changed);
    assert_eq!(
        event.error.as_deref(),
        Some("unexpected status code: 500")
    );
    assert_eq!(event.status_code, None);

    // retry_count=2 means exactly three attempts in the cycle
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    expect_quiet(&mut events).await;
    monitor.stop();
}

#[tokio::test]
async fn failed_cycles_do_not_consume_the_first_check() {
    struct FailThenServe {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for FailThenServe {
        async fn fetch(
            &self,
            _url: &str,
            _headers: &HashMap<String, String>,
        ) -> Result<FetchResponse, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match n {
                0 => Err(FetchError::Transport("connection refused".to_owned())),
                1 => Ok(FetchResponse {
                    status: 200,
                    content_type: None,
                    body: b"first body".to_vec(),
                }),
                _ => Ok(FetchResponse {
                    status: 200,
                    content_type: None,
                    body: b"second body".to_vec(),
                }),
            }
        }
    }

    let monitor = Monitor::with_fetcher(
        fast_config("https://example.com"),
        Arc::new(FailThenServe {
            calls: AtomicUsize::new(0),
        }),
    )
    .unwrap();
    let mut events = monitor.start().expect("first start");

    // Cycle 1 fails (error event); cycle 2 succeeds and must still count as
    // the baseline-adopting first observation; cycle 3 sees a real change.
    let event = expect_event(&mut events).await;
    assert!(event.error.is_some());
    assert!(!event.has_changed);

    let event = expect_event(&mut events).await;
    assert!(event.has_changed);
    assert!(event
        .details
        .as_deref()
        .expect("diff details")
        .contains("differs at position"));
    monitor.stop();
}

#[tokio::test]
async fn stopping_ends_the_event_stream() {
    let fetcher = ScriptedFetcher::new(vec![b"stable"]);
    let monitor = Monitor::with_fetcher(fast_config("https://example.com"), fetcher).unwrap();
    let mut events = monitor.start().expect("first start");

    assert!(monitor.start().is_none(), "second start is a no-op");
    assert!(monitor.is_running());

    monitor.stop();
    let closed = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("stream should close promptly after stop");
    assert!(closed.is_none());
    assert!(!monitor.is_running());
}
