//! Alert kinds and severities.

use crate::error::CairnError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Alert severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Degraded, should be investigated.
    Warning,
    /// Data availability at risk, requires immediate attention.
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

/// Cluster services watched for leadership and liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Etcd,
    Mds,
    SnapshotClone,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 3] = [ServiceKind::Etcd, ServiceKind::Mds, ServiceKind::SnapshotClone];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Etcd => "etcd",
            ServiceKind::Mds => "mds",
            ServiceKind::SnapshotClone => "snapshot_clone",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the scheduler can alert on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlertKind {
    /// Copyset health of the whole cluster.
    ClusterHealth,
    /// Used capacity above the configured percentage.
    ClusterCapacity,
    /// A service without exactly one leader.
    ServiceLeader(ServiceKind),
    /// A service with unreachable endpoints.
    ServiceOffline(ServiceKind),
}

impl AlertKind {
    pub const ALL: [AlertKind; 8] = [
        AlertKind::ClusterHealth,
        AlertKind::ClusterCapacity,
        AlertKind::ServiceLeader(ServiceKind::Etcd),
        AlertKind::ServiceOffline(ServiceKind::Etcd),
        AlertKind::ServiceLeader(ServiceKind::Mds),
        AlertKind::ServiceOffline(ServiceKind::Mds),
        AlertKind::ServiceLeader(ServiceKind::SnapshotClone),
        AlertKind::ServiceOffline(ServiceKind::SnapshotClone),
    ];

    /// Stable name, used as the key in the configuration store.
    pub fn name(&self) -> &'static str {
        match self {
            AlertKind::ClusterHealth => "cluster_health",
            AlertKind::ClusterCapacity => "cluster_capacity",
            AlertKind::ServiceLeader(ServiceKind::Etcd) => "etcd_leader",
            AlertKind::ServiceOffline(ServiceKind::Etcd) => "etcd_offline",
            AlertKind::ServiceLeader(ServiceKind::Mds) => "mds_leader",
            AlertKind::ServiceOffline(ServiceKind::Mds) => "mds_offline",
            AlertKind::ServiceLeader(ServiceKind::SnapshotClone) => "snapshot_clone_leader",
            AlertKind::ServiceOffline(ServiceKind::SnapshotClone) => "snapshot_clone_offline",
        }
    }

    pub fn severity(&self) -> AlertSeverity {
        match self {
            AlertKind::ClusterHealth | AlertKind::ServiceLeader(_) => AlertSeverity::Critical,
            AlertKind::ClusterCapacity | AlertKind::ServiceOffline(_) => AlertSeverity::Warning,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AlertKind {
    type Err = CairnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlertKind::ALL
            .iter()
            .find(|kind| kind.name() == s)
            .copied()
            .ok_or_else(|| CairnError::UnknownAlertKind(s.to_string()))
    }
}

impl Serialize for AlertKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for AlertKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
