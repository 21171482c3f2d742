//! Cluster health summary for status consumers.

use super::checker::{CopysetCheckReport, CopysetChecker};
use crate::error::Result;
use crate::observability;
use crate::types::ClusterHealthSnapshot;
use tracing::warn;

/// Runs copyset checks for one cluster and publishes their outcome as metrics.
pub struct ClusterStatusReporter {
    cluster: String,
    checker: CopysetChecker,
}

impl ClusterStatusReporter {
    pub fn new(cluster: impl Into<String>, checker: CopysetChecker) -> Self {
        Self {
            cluster: cluster.into(),
            checker,
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Run a full check, recording its counts or its failure.
    pub async fn check(&self) -> Result<CopysetCheckReport> {
        match self.checker.check_copysets_in_cluster().await {
            Ok(report) => {
                observability::record_copyset_check(
                    &self.cluster,
                    report.healthy,
                    report.total(),
                    report.unhealthy(),
                );
                observability::record_chunkserver_exceptions(
                    &self.cluster,
                    report.registry.service_exception_servers().len(),
                    report.registry.load_exception_servers().len(),
                );
                Ok(report)
            }
            Err(err) => {
                warn!(cluster = %self.cluster, error = %err, "Copyset check failed");
                observability::record_copyset_check_failed(&self.cluster);
                Err(err)
            }
        }
    }

    /// Health flag and copyset counts of the cluster.
    pub async fn snapshot(&self) -> Result<ClusterHealthSnapshot> {
        Ok(self.check().await?.snapshot())
    }
}
