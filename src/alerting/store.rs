//! Alert configuration storage and alert emission.

use super::kind::{AlertKind, AlertSeverity};
use crate::error::{CairnError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// One fired alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub cluster: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub fired_at: DateTime<Utc>,
}

impl AlertRecord {
    pub fn new(cluster: impl Into<String>, kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            kind,
            severity: kind.severity(),
            message: message.into(),
            fired_at: Utc::now(),
        }
    }
}

/// Stored settings of one alert kind for one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfigRecord {
    /// Alert kind name, see [`AlertKind::name`].
    pub kind: String,
    pub enabled: bool,
    pub interval_secs: u64,
    pub trigger_times: u32,
    #[serde(default)]
    pub rule: String,
}

impl AlertConfigRecord {
    pub fn new(kind: AlertKind, interval_secs: u64, trigger_times: u32) -> Self {
        Self {
            kind: kind.name().to_string(),
            enabled: true,
            interval_secs,
            trigger_times,
            rule: String::new(),
        }
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = rule.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Source of per-cluster alert settings.
#[async_trait]
pub trait AlertConfigStore: Send + Sync {
    async fn load(&self, cluster: &str) -> Result<Vec<AlertConfigRecord>>;
}

/// Persists a fired alert and notifies whoever is on call.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn emit(&self, record: &AlertRecord) -> Result<()>;
}

#[derive(Debug, Default)]
struct StoreState {
    configs: HashMap<String, Vec<AlertConfigRecord>>,
    records: Vec<AlertRecord>,
    fail_loads: bool,
    fail_emissions: bool,
}

/// Alert settings and fired alerts kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    state: RwLock<StoreState>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the settings of one kind.
    pub fn put_config(&self, cluster: &str, record: AlertConfigRecord) {
        let mut state = self.state.write();
        let configs = state.configs.entry(cluster.to_string()).or_default();
        configs.retain(|c| c.kind != record.kind);
        configs.push(record);
    }

    pub fn remove_config(&self, cluster: &str, kind: AlertKind) {
        if let Some(configs) = self.state.write().configs.get_mut(cluster) {
            configs.retain(|c| c.kind != kind.name());
        }
    }

    /// Every alert emitted so far.
    pub fn records(&self) -> Vec<AlertRecord> {
        self.state.read().records.clone()
    }

    pub fn records_of(&self, kind: AlertKind) -> Vec<AlertRecord> {
        self.state
            .read()
            .records
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    pub fn fail_loads(&self, fail: bool) {
        self.state.write().fail_loads = fail;
    }

    pub fn fail_emissions(&self, fail: bool) {
        self.state.write().fail_emissions = fail;
    }
}

#[async_trait]
impl AlertConfigStore for InMemoryAlertStore {
    async fn load(&self, cluster: &str) -> Result<Vec<AlertConfigRecord>> {
        let state = self.state.read();
        if state.fail_loads {
            return Err(CairnError::AlertStore("alert config unavailable".to_string()));
        }
        Ok(state.configs.get(cluster).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl AlertSink for InMemoryAlertStore {
    async fn emit(&self, record: &AlertRecord) -> Result<()> {
        let mut state = self.state.write();
        if state.fail_emissions {
            return Err(CairnError::Notification(format!(
                "could not deliver {} alert",
                record.kind
            )));
        }
        warn!(
            cluster = %record.cluster,
            kind = %record.kind,
            severity = %record.severity.as_str(),
            message = %record.message,
            "ALERT FIRING"
        );
        state.records.push(record.clone());
        Ok(())
    }
}
