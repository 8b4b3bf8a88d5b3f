//! # Manager
//! Owns the url → monitor registry and named groups, starts and stops
//! monitors individually, by group, or all at once, and fans every started
//! monitor's private event stream into one shared output stream.
//!
//! Locking is two-level: the manager's own lock covers registry and group
//! mutations, each monitor's lock covers its check state. Neither is ever
//! held across an await.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::monitor::error::MonitorError;
use crate::monitor::target::Monitor;
use crate::monitor::types::{ChangeEvent, TargetConfig};

/// Buffer of the shared fan-in channel.
const FANIN_CHANNEL_CAPACITY: usize = 64;

/// A named, non-owning set of monitors.
///
/// Members are tracked by URL; the monitors themselves live in the
/// manager's registry. Removing a monitor from the manager purges it from
/// every group.
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub description: String,
    members: HashSet<String>,
}

impl Group {
    pub fn contains(&self, url: &str) -> bool {
        self.members.contains(url)
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Default)]
struct Registry {
    monitors: HashMap<String, Arc<Monitor>>,
    groups: HashMap<String, Group>,
}

/// Coordinates many monitors and multiplexes their events.
pub struct Manager {
    registry: RwLock<Registry>,
    event_tx: Mutex<Option<mpsc::Sender<ChangeEvent>>>,
    event_rx: Mutex<Option<mpsc::Receiver<ChangeEvent>>>,
    cancel: CancellationToken,
}

impl Manager {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::channel(FANIN_CHANNEL_CAPACITY);
        Self {
            registry: RwLock::new(Registry::default()),
            event_tx: Mutex::new(Some(event_tx)),
            event_rx: Mutex::new(Some(event_rx)),
            cancel: CancellationToken::new(),
        }
    }

    /// Take the shared output stream. Yields `Some` exactly once; every
    /// started monitor's events arrive here, interleaved across URLs.
    pub fn events(&self) -> Option<mpsc::Receiver<ChangeEvent>> {
        self.event_rx
            .lock()
            .expect("event receiver lock poisoned")
            .take()
    }

    /// Register an already-built monitor. Fails on an empty URL or a URL
    /// that is already registered; the registry is left untouched on error.
    pub fn add_monitor(&self, monitor: Arc<Monitor>) -> Result<(), MonitorError> {
        let url = monitor.url().to_owned();
        if url.is_empty() {
            return Err(MonitorError::EmptyUrl);
        }

        let mut registry = self.registry.write().expect("registry lock poisoned");
        if registry.monitors.contains_key(&url) {
            return Err(MonitorError::DuplicateUrl(url));
        }
        registry.monitors.insert(url, monitor);
        Ok(())
    }

    /// Build a monitor from a config and register it.
    pub fn add_with_config(&self, config: TargetConfig) -> Result<Arc<Monitor>, MonitorError> {
        let monitor = Monitor::new(config)?;
        self.add_monitor(Arc::clone(&monitor))?;
        Ok(monitor)
    }

    /// Stop a monitor, purge it from every group, and drop it from the
    /// registry.
    pub fn remove_monitor(&self, url: &str) -> Result<(), MonitorError> {
        let mut registry = self.registry.write().expect("registry lock poisoned");
        let monitor = registry
            .monitors
            .remove(url)
            .ok_or_else(|| MonitorError::UnknownUrl(url.to_owned()))?;
        monitor.stop();
        for group in registry.groups.values_mut() {
            group.members.remove(url);
        }
        Ok(())
    }

    pub fn create_group(&self, name: &str, description: &str) -> Result<Group, MonitorError> {
        let mut registry = self.registry.write().expect("registry lock poisoned");
        if registry.groups.contains_key(name) {
            return Err(MonitorError::DuplicateGroup(name.to_owned()));
        }
        let group = Group {
            name: name.to_owned(),
            description: description.to_owned(),
            members: HashSet::new(),
        };
        registry.groups.insert(name.to_owned(), group.clone());
        Ok(group)
    }

    pub fn add_to_group(&self, url: &str, group_name: &str) -> Result<(), MonitorError> {
        let mut registry = self.registry.write().expect("registry lock poisoned");
        if !registry.monitors.contains_key(url) {
            return Err(MonitorError::UnknownUrl(url.to_owned()));
        }
        let group = registry
            .groups
            .get_mut(group_name)
            .ok_or_else(|| MonitorError::UnknownGroup(group_name.to_owned()))?;
        group.members.insert(url.to_owned());
        Ok(())
    }

    pub fn get_monitor(&self, url: &str) -> Result<Arc<Monitor>, MonitorError> {
        let registry = self.registry.read().expect("registry lock poisoned");
        registry
            .monitors
            .get(url)
            .cloned()
            .ok_or_else(|| MonitorError::UnknownUrl(url.to_owned()))
    }

    pub fn get_group(&self, name: &str) -> Result<Group, MonitorError> {
        let registry = self.registry.read().expect("registry lock poisoned");
        registry
            .groups
            .get(name)
            .cloned()
            .ok_or_else(|| MonitorError::UnknownGroup(name.to_owned()))
    }

    pub fn list_monitors(&self) -> Vec<String> {
        let registry = self.registry.read().expect("registry lock poisoned");
        registry.monitors.keys().cloned().collect()
    }

    pub fn list_groups(&self) -> Vec<String> {
        let registry = self.registry.read().expect("registry lock poisoned");
        registry.groups.keys().cloned().collect()
    }

    /// Start every registered monitor. Monitors already running are left
    /// alone.
    pub fn start(&self) {
        for monitor in self.snapshot_monitors() {
            self.start_one(&monitor);
        }
    }

    /// Start a single monitor by URL.
    pub fn start_monitor(&self, url: &str) -> Result<(), MonitorError> {
        let monitor = self.get_monitor(url)?;
        self.start_one(&monitor);
        Ok(())
    }

    /// Start every monitor belonging to a group.
    pub fn start_group(&self, group_name: &str) -> Result<(), MonitorError> {
        for monitor in self.snapshot_group(group_name)? {
            self.start_one(&monitor);
        }
        Ok(())
    }

    /// Stop everything: cancels all forwarding tasks, then each monitor.
    ///
    /// The shared stream ends once the last forwarder has exited and
    /// dropped its sender; a consumer blocked on `recv` then sees `None`
    /// after draining.
    pub fn stop(&self) {
        self.cancel.cancel();
        for monitor in self.snapshot_monitors() {
            monitor.stop();
        }
        self.event_tx
            .lock()
            .expect("event sender lock poisoned")
            .take();
    }

    pub fn stop_monitor(&self, url: &str) -> Result<(), MonitorError> {
        self.get_monitor(url)?.stop();
        Ok(())
    }

    pub fn stop_group(&self, group_name: &str) -> Result<(), MonitorError> {
        for monitor in self.snapshot_group(group_name)? {
            monitor.stop();
        }
        Ok(())
    }

    fn snapshot_monitors(&self) -> Vec<Arc<Monitor>> {
        let registry = self.registry.read().expect("registry lock poisoned");
        registry.monitors.values().cloned().collect()
    }

    fn snapshot_group(&self, group_name: &str) -> Result<Vec<Arc<Monitor>>, MonitorError> {
        let registry = self.registry.read().expect("registry lock poisoned");
        let group = registry
            .groups
            .get(group_name)
            .ok_or_else(|| MonitorError::UnknownGroup(group_name.to_owned()))?;
        Ok(group
            .members
            .iter()
            .filter_map(|url| registry.monitors.get(url).cloned())
            .collect())
    }

    fn start_one(&self, monitor: &Arc<Monitor>) {
        let Some(tx) = self
            .event_tx
            .lock()
            .expect("event sender lock poisoned")
            .clone()
        else {
            // Manager already stopped; nothing to forward into.
            return;
        };
        if let Some(events) = monitor.start() {
            let url = monitor.url().to_owned();
            let cancel = self.cancel.child_token();
            tokio::spawn(forward(url, events, tx, cancel));
        }
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

/// Relay one monitor's events into the shared stream.
///
/// Exits when the monitor's channel closes, the shared stream's consumer
/// goes away, or the manager cancels — so a send can never outlive stream
/// teardown, and events for one URL keep their per-URL order.
async fn forward(
    url: String,
    mut events: mpsc::Receiver<ChangeEvent>,
    tx: mpsc::Sender<ChangeEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            received = events.recv() => match received {
                Some(event) => event,
                None => break,
            },
            _ = cancel.cancelled() => break,
        };
        tokio::select! {
            sent = tx.send(event) => {
                if sent.is_err() {
                    break;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
    debug!(url = %url, "event forwarding ended");
}
