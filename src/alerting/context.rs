//! Live state of one alert kind.

use super::kind::AlertKind;
use super::store::AlertConfigRecord;
use crate::config::AlertingConfig;
use crate::error::{CairnError, Result};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

/// Settings of one alert kind, as loaded from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSettings {
    pub enabled: bool,
    pub interval: Duration,
    pub trigger_times: u32,
    pub rule: String,
}

impl AlertSettings {
    /// Settings for a kind with nothing stored.
    pub fn defaults(kind: AlertKind, config: &AlertingConfig) -> Self {
        let rule = match kind {
            AlertKind::ClusterCapacity => config.capacity_rule.clone(),
            _ => String::new(),
        };
        Self {
            enabled: true,
            interval: Duration::from_secs(config.default_interval_secs),
            trigger_times: config.default_trigger_times,
            rule,
        }
    }

    pub fn from_record(record: &AlertConfigRecord) -> Result<Self> {
        if record.interval_secs == 0 {
            return Err(CairnError::InvalidConfig {
                field: format!("{}.interval_secs", record.kind),
                reason: "Alert interval must be non-zero".to_string(),
            });
        }
        if record.trigger_times == 0 {
            return Err(CairnError::InvalidConfig {
                field: format!("{}.trigger_times", record.kind),
                reason: "Trigger times must be non-zero".to_string(),
            });
        }
        Ok(Self {
            enabled: record.enabled,
            interval: Duration::from_secs(record.interval_secs),
            trigger_times: record.trigger_times,
            rule: record.rule.clone(),
        })
    }
}

/// Lifecycle of an alert loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

#[derive(Debug)]
struct ContextInner {
    settings: AlertSettings,
    counter: u32,
    state: LoopState,
    stop: Option<oneshot::Sender<()>>,
}

/// Settings, trigger counter and stop handle of one alert kind.
///
/// Shared between the kind's loop and the reloader. Every accessor takes the
/// lock for a single field, so a reload never waits on an evaluation.
#[derive(Debug)]
pub struct AlertContext {
    cluster: String,
    kind: AlertKind,
    inner: Mutex<ContextInner>,
}

impl AlertContext {
    pub fn new(cluster: impl Into<String>, kind: AlertKind, settings: AlertSettings) -> Self {
        Self {
            cluster: cluster.into(),
            kind,
            inner: Mutex::new(ContextInner {
                settings,
                counter: 0,
                state: LoopState::Stopped,
                stop: None,
            }),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn kind(&self) -> AlertKind {
        self.kind
    }

    pub fn enabled(&self) -> bool {
        self.inner.lock().settings.enabled
    }

    pub fn interval(&self) -> Duration {
        self.inner.lock().settings.interval
    }

    pub fn trigger_times(&self) -> u32 {
        self.inner.lock().settings.trigger_times
    }

    pub fn rule(&self) -> String {
        self.inner.lock().settings.rule.clone()
    }

    pub fn settings(&self) -> AlertSettings {
        self.inner.lock().settings.clone()
    }

    /// Replace the settings; the counter is kept.
    pub fn apply(&self, settings: AlertSettings) {
        self.inner.lock().settings = settings;
    }

    pub fn counter(&self) -> u32 {
        self.inner.lock().counter
    }

    /// Count one problematic tick, returning the new count.
    pub fn increment(&self) -> u32 {
        let mut inner = self.inner.lock();
        inner.counter = inner.counter.saturating_add(1);
        inner.counter
    }

    pub fn reset(&self) {
        self.inner.lock().counter = 0;
    }

    pub fn state(&self) -> LoopState {
        self.inner.lock().state
    }

    /// Enter `Running`, returning the stop signal for this running period.
    ///
    /// Returns `None` when the loop is already running.
    pub(crate) fn begin_running(&self) -> Option<oneshot::Receiver<()>> {
        let mut inner = self.inner.lock();
        if inner.state == LoopState::Running {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        inner.state = LoopState::Running;
        inner.stop = Some(tx);
        Some(rx)
    }

    /// Send the stop signal. Only the first call in a running period sends it.
    pub fn stop(&self) -> bool {
        match self.inner.lock().stop.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub(crate) fn mark_stopped(&self) {
        let mut inner = self.inner.lock();
        inner.state = LoopState::Stopped;
        inner.stop = None;
    }
}
