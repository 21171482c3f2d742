//! Common test utilities for integration tests.

pub mod cluster_sim;

use cairn::alerting::{AlertConfigRecord, AlertEnv, AlertKind, InMemoryAlertStore, ServiceProbe};
use cairn::copyset::{ClusterStatusReporter, CopysetClassification, CopysetRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// Re-export common types
pub use cluster_sim::*;

/// Alert store where only `active` kinds are enabled.
pub fn alert_store_with(cluster: &str, active: Vec<AlertConfigRecord>) -> Arc<InMemoryAlertStore> {
    let store = Arc::new(InMemoryAlertStore::new());
    for kind in AlertKind::ALL {
        store.put_config(cluster, AlertConfigRecord::new(kind, 60, 1).disabled());
    }
    for record in active {
        store.put_config(cluster, record);
    }
    store
}

/// Alert environment reading from a simulated cluster.
pub fn alert_env(cluster: &SimulatedCluster, probe: Arc<dyn ServiceProbe>) -> Arc<AlertEnv> {
    let reporter = ClusterStatusReporter::new(cluster.name(), cluster.checker());
    Arc::new(AlertEnv::new(reporter, probe, Duration::from_secs(1)))
}

/// Check the registry invariants that hold after every completed pass.
pub fn assert_registry_invariants(registry: &CopysetRegistry) {
    let mut seen: HashMap<_, &CopysetClassification> = HashMap::new();
    for (class, ids) in registry.problem_buckets() {
        assert!(class.is_problem(), "{} is not a problem bucket", class);
        for id in ids {
            assert!(
                registry.total().contains(id),
                "{} in {} but not in total",
                id,
                class
            );
            if let Some(previous) = seen.insert(*id, class) {
                panic!("{} in both {} and {}", id, previous, class);
            }
        }
    }
    assert_eq!(registry.unhealthy_count(), seen.len());
    assert_eq!(
        registry.bucket(&CopysetClassification::Healthy).len(),
        registry.total_count() - seen.len()
    );
}
