//! # Target Monitor
//! One URL under observation: a ticking schedule, a retrying fetch, and a
//! changed-vs-unchanged decision against the stored baseline. Each monitor
//! runs its cycle on its own task and emits [`ChangeEvent`]s on a private
//! channel until stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::http::{ClientOptions, FetchError, FetchResponse, Fetcher, HttpFetcher};
use crate::monitor::detector;
use crate::monitor::error::MonitorError;
use crate::monitor::filters::{timestamp_filter, FilterPipeline};
use crate::monitor::types::{ChangeEvent, CheckStatus, StatusSnapshot, TargetConfig};

/// Buffer of the per-monitor event channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Default)]
struct CheckState {
    baseline: Option<Vec<u8>>,
    last_check: Option<chrono::DateTime<Utc>>,
    check_count: u64,
    status: CheckStatus,
    first_check: bool,
}

/// Watches a single URL for changes.
pub struct Monitor {
    config: TargetConfig,
    fetcher: Arc<dyn Fetcher>,
    filters: FilterPipeline,
    cancel: CancellationToken,
    started: AtomicBool,
    state: RwLock<CheckState>,
}

impl Monitor {
    /// Build a monitor with a reqwest-backed fetcher configured from the
    /// target's timeout/redirect settings.
    pub fn new(config: TargetConfig) -> Result<Arc<Self>, MonitorError> {
        Self::validate(&config)?;
        let fetcher = HttpFetcher::new(&ClientOptions {
            timeout: config.timeout,
            follow_redirects: config.follow_redirects,
            user_agent: config.user_agent.clone(),
        })?;
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    /// Build a monitor around any [`Fetcher`] implementation.
    pub fn with_fetcher(
        config: TargetConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Arc<Self>, MonitorError> {
        Self::validate(&config)?;
        super::ensure_metrics_described();

        let mut filters = config.filters.clone();
        if config.ignore_timestamps {
            filters.push(timestamp_filter());
        }

        Ok(Arc::new(Self {
            config,
            fetcher,
            filters,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            state: RwLock::new(CheckState {
                first_check: true,
                ..CheckState::default()
            }),
        }))
    }

    fn validate(config: &TargetConfig) -> Result<(), MonitorError> {
        if config.url.is_empty() {
            return Err(MonitorError::EmptyUrl);
        }
        if config.interval.is_zero() {
            return Err(MonitorError::InvalidInterval);
        }
        Ok(())
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    /// Begin checking: the first check fires immediately, then once per
    /// configured interval. Returns the monitor's event stream, or `None`
    /// if it was already started.
    pub fn start(self: &Arc<Self>) -> Option<mpsc::Receiver<ChangeEvent>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return None;
        }
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let monitor = Arc::clone(self);
        tokio::spawn(monitor.run(tx));
        Some(rx)
    }

    /// Signal the check loop to stop. Idempotent; an in-flight fetch is
    /// allowed to finish or time out naturally.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    /// Snapshot of last-check time, activity tag, and cycle counter.
    pub fn status(&self) -> StatusSnapshot {
        let state = self.state.read().expect("monitor state lock poisoned");
        StatusSnapshot {
            last_check: state.last_check,
            status: state.status,
            check_count: state.check_count,
        }
    }

    async fn run(self: Arc<Self>, tx: mpsc::Sender<ChangeEvent>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(url = %self.config.url, interval = ?self.config.interval, "monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.perform_check(&tx).await {
                        break;
                    }
                }
                _ = self.cancel.cancelled() => break,
            }
        }
        info!(url = %self.config.url, "monitor stopped");
    }

    /// One full check cycle. Returns `false` when the loop should end
    /// (cancellation, or the event stream consumer went away).
    async fn perform_check(&self, tx: &mpsc::Sender<ChangeEvent>) -> bool {
        {
            let mut state = self.state.write().expect("monitor state lock poisoned");
            state.check_count += 1;
            state.status = CheckStatus::Checking;
        }
        counter!("webwatch_checks_total").increment(1);

        let attempts = self.config.retry_count + 1;
        let mut response: Option<FetchResponse> = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                counter!("webwatch_fetch_retries_total").increment(1);
                tokio::select! {
                    _ = tokio::time::sleep(self.config.retry_interval) => {}
                    _ = self.cancel.cancelled() => return false,
                }
            }

            match self.fetch_once().await {
                Ok(resp) => {
                    response = Some(resp);
                    break;
                }
                Err(err) => {
                    debug!(url = %self.config.url, attempt, error = %err, "fetch attempt failed");
                    if attempt == attempts {
                        warn!(url = %self.config.url, attempts, error = %err, "all fetch attempts failed");
                        counter!("webwatch_fetch_errors_total").increment(1);
                        self.set_idle();
                        let event = ChangeEvent::failed(&self.config.url, err.to_string());
                        return self.emit(tx, event).await;
                    }
                }
            }
        }

        let Some(response) = response else {
            return true;
        };

        let (changed, details) = self.detect_change(&response.body);
        let is_first = {
            let mut state = self.state.write().expect("monitor state lock poisoned");
            state.status = CheckStatus::Idle;
            state.last_check = Some(Utc::now());
            std::mem::take(&mut state.first_check)
        };
        gauge!("webwatch_last_check_ts").set(Utc::now().timestamp() as f64);

        if is_first {
            debug!(url = %self.config.url, "baseline adopted");
            return true;
        }

        if changed {
            counter!("webwatch_changes_total").increment(1);
            info!(url = %self.config.url, status = response.status, "change detected");
            let event = ChangeEvent::changed(
                &self.config.url,
                response.status,
                response.content_type.clone(),
                details,
            );
            return self.emit(tx, event).await;
        }

        true
    }

    /// Return to idle without recording a completed check.
    fn set_idle(&self) {
        let mut state = self.state.write().expect("monitor state lock poisoned");
        state.status = CheckStatus::Idle;
    }

    /// Single fetch attempt; a non-2xx status counts as a failure.
    async fn fetch_once(&self) -> Result<FetchResponse, FetchError> {
        let response = self
            .fetcher
            .fetch(&self.config.url, &self.config.headers)
            .await?;
        if !response.is_success() {
            return Err(FetchError::Status(response.status));
        }
        Ok(response)
    }

    /// Compare new content against the baseline.
    ///
    /// Filters and optional whitespace normalization apply identically to
    /// both sides for the comparison only; on a change the original,
    /// unfiltered bytes become the new baseline. The very first observation
    /// adopts the content as baseline and reports no change.
    fn detect_change(&self, content: &[u8]) -> (bool, Option<String>) {
        let mut state = self.state.write().expect("monitor state lock poisoned");

        let Some(baseline) = state.baseline.as_ref() else {
            state.baseline = Some(content.to_vec());
            return (false, None);
        };

        let mut previous = self.filters.apply(baseline);
        let mut current = self.filters.apply(content);
        if self.config.normalize_whitespace {
            previous = detector::normalize_whitespace(&previous);
            current = detector::normalize_whitespace(&current);
        }

        let (changed, details) = detector::compare(
            self.config.method,
            self.config.compare_fn.as_ref(),
            &previous,
            &current,
        );
        if changed {
            state.baseline = Some(content.to_vec());
        }
        (changed, details)
    }

    /// Hand an event to the stream without blocking past shutdown.
    async fn emit(&self, tx: &mpsc::Sender<ChangeEvent>, event: ChangeEvent) -> bool {
        tokio::select! {
            sent = tx.send(event) => sent.is_ok(),
            _ = self.cancel.cancelled() => false,
        }
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("url", &self.config.url)
            .field("interval", &self.config.interval)
            .field("method", &self.config.method)
            .finish_non_exhaustive()
    }
}
