//! Alert predicates and the collaborators they query.

use super::kind::{AlertKind, ServiceKind};
use crate::copyset::ClusterStatusReporter;
use crate::error::{CairnError, Result};
use crate::scatter::scatter_gather;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Raw capacity of the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClusterCapacity {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

impl ClusterCapacity {
    /// Used capacity in whole percent, `None` when the cluster has no capacity.
    pub fn used_percent(&self) -> Option<u64> {
        if self.total_bytes == 0 {
            return None;
        }
        Some((self.used_bytes as u128 * 100 / self.total_bytes as u128) as u64)
    }
}

/// What a service endpoint says about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointStatus {
    pub is_leader: bool,
}

/// Service discovery and status probing.
///
/// An `Err` from [`ServiceProbe::endpoint_status`] means the endpoint is offline.
#[async_trait]
pub trait ServiceProbe: Send + Sync {
    async fn capacity(&self) -> Result<ClusterCapacity>;

    async fn endpoints(&self, service: ServiceKind) -> Result<Vec<String>>;

    async fn endpoint_status(&self, service: ServiceKind, endpoint: &str) -> Result<EndpointStatus>;
}

#[derive(Debug, Default)]
struct ProbeState {
    capacity: Option<ClusterCapacity>,
    endpoints: HashMap<ServiceKind, Vec<String>>,
    /// `None` marks an unreachable endpoint.
    status: HashMap<(ServiceKind, String), Option<EndpointStatus>>,
}

/// A [`ServiceProbe`] answering from memory.
#[derive(Debug, Default)]
pub struct InMemoryServiceProbe {
    state: RwLock<ProbeState>,
}

impl InMemoryServiceProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_capacity(&self, total_bytes: u64, used_bytes: u64) {
        self.state.write().capacity = Some(ClusterCapacity {
            total_bytes,
            used_bytes,
        });
    }

    /// Register an endpoint, reachable and following by default.
    pub fn add_endpoint(&self, service: ServiceKind, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        let mut state = self.state.write();
        state
            .endpoints
            .entry(service)
            .or_default()
            .push(endpoint.clone());
        state
            .status
            .insert((service, endpoint), Some(EndpointStatus { is_leader: false }));
    }

    pub fn set_leader(&self, service: ServiceKind, endpoint: &str, is_leader: bool) {
        self.state
            .write()
            .status
            .insert((service, endpoint.to_string()), Some(EndpointStatus { is_leader }));
    }

    pub fn set_offline(&self, service: ServiceKind, endpoint: &str) {
        self.state
            .write()
            .status
            .insert((service, endpoint.to_string()), None);
    }
}

#[async_trait]
impl ServiceProbe for InMemoryServiceProbe {
    async fn capacity(&self) -> Result<ClusterCapacity> {
        self.state
            .read()
            .capacity
            .ok_or_else(|| CairnError::Gateway("cluster capacity unavailable".to_string()))
    }

    async fn endpoints(&self, service: ServiceKind) -> Result<Vec<String>> {
        Ok(self
            .state
            .read()
            .endpoints
            .get(&service)
            .cloned()
            .unwrap_or_default())
    }

    async fn endpoint_status(&self, service: ServiceKind, endpoint: &str) -> Result<EndpointStatus> {
        match self.state.read().status.get(&(service, endpoint.to_string())) {
            Some(Some(status)) => Ok(*status),
            _ => Err(CairnError::Gateway(format!(
                "{} endpoint {} unreachable",
                service, endpoint
            ))),
        }
    }
}

/// Collaborators the alert predicates read from.
pub struct AlertEnv {
    reporter: ClusterStatusReporter,
    probe: Arc<dyn ServiceProbe>,
    probe_timeout: Duration,
}

impl AlertEnv {
    pub fn new(
        reporter: ClusterStatusReporter,
        probe: Arc<dyn ServiceProbe>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            reporter,
            probe,
            probe_timeout,
        }
    }

    pub fn reporter(&self) -> &ClusterStatusReporter {
        &self.reporter
    }

    async fn probe_endpoints(
        &self,
        service: ServiceKind,
    ) -> Result<Vec<(String, Result<EndpointStatus>)>> {
        let endpoints = self.probe.endpoints(service).await?;
        let probe = Arc::clone(&self.probe);
        let gathered = scatter_gather(endpoints, self.probe_timeout, move |endpoint: String| {
            let probe = Arc::clone(&probe);
            async move { probe.endpoint_status(service, &endpoint).await }
        })
        .await;

        let mut statuses: Vec<_> = gathered.into_iter().map(|g| (g.target, g.result)).collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(statuses)
    }
}

impl AlertKind {
    /// Evaluate this kind's predicate.
    ///
    /// `Ok(Some(message))` is a problem, `Ok(None)` is healthy, and an error
    /// means the tick could not decide.
    pub async fn evaluate(&self, env: &AlertEnv, rule: &str) -> Result<Option<String>> {
        match *self {
            AlertKind::ClusterHealth => {
                let snapshot = env.reporter.snapshot().await?;
                if snapshot.healthy {
                    return Ok(None);
                }
                Ok(Some(format!(
                    "{} of {} copysets unhealthy",
                    snapshot.copyset_unhealthy, snapshot.copyset_total
                )))
            }
            AlertKind::ClusterCapacity => {
                let threshold: u64 = rule.trim().parse().map_err(|_| CairnError::InvalidRule {
                    kind: self.name().to_string(),
                    rule: rule.to_string(),
                })?;
                let capacity = env.probe.capacity().await?;
                match capacity.used_percent() {
                    Some(used) if used >= threshold => Ok(Some(format!(
                        "cluster capacity {}% used, threshold {}%",
                        used, threshold
                    ))),
                    _ => Ok(None),
                }
            }
            AlertKind::ServiceLeader(service) => {
                let statuses = env.probe_endpoints(service).await?;
                let leaders: Vec<&str> = statuses
                    .iter()
                    .filter(|(_, status)| matches!(status, Ok(s) if s.is_leader))
                    .map(|(endpoint, _)| endpoint.as_str())
                    .collect();
                debug!(%service, endpoints = statuses.len(), leaders = leaders.len(), "Probed service leadership");
                match leaders.len() {
                    1 => Ok(None),
                    0 => Ok(Some(format!("{} has no leader", service))),
                    n => Ok(Some(format!(
                        "{} has {} leaders: {}",
                        service,
                        n,
                        leaders.join(", ")
                    ))),
                }
            }
            AlertKind::ServiceOffline(service) => {
                let statuses = env.probe_endpoints(service).await?;
                let offline: Vec<&str> = statuses
                    .iter()
                    .filter(|(_, status)| status.is_err())
                    .map(|(endpoint, _)| endpoint.as_str())
                    .collect();
                if offline.is_empty() {
                    return Ok(None);
                }
                Ok(Some(format!(
                    "{} endpoints offline: {}",
                    service,
                    offline.join(", ")
                )))
            }
        }
    }
}
