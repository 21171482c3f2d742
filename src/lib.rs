//! Cairn - copyset health checking and alert scheduling for block-storage clusters.
//!
//! Cairn watches a cluster whose data is split into copysets, small Raft
//! groups of chunk servers. It decides whether every copyset is healthy from
//! the chunk servers' own raft status and the metadata service's view, and
//! runs periodic alert loops over that and other cluster predicates.
//!
//! # Features
//!
//! - **Copyset Health Check**: classifies every copyset into exactly one health bucket.
//! - **Cross-Validation**: detects copysets the metadata service and the chunk servers disagree on.
//! - **Scatter-Gather**: concurrent per-target queries with per-call timeouts.
//! - **Alert Scheduling**: per-kind loops with trigger counts and hot-reloaded settings.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Cairn                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Alerting: Supervisor | Alert Loops | Config Reload         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Copysets: Checker | Registry | Raft Status Parsing         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scatter-Gather Executor                                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Cluster Gateway: Metadata Service | Chunk Servers          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use cairn::config::CairnConfig;
//! use cairn::gateway::InMemoryGateway;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> cairn::Result<()> {
//!     let config = CairnConfig::development();
//!     let checker = cairn::copyset::CopysetChecker::new(
//!         Arc::new(InMemoryGateway::new()),
//!         config.checker.clone(),
//!     );
//!
//!     let report = checker.check_copysets_in_cluster().await?;
//!     println!("healthy: {}", report.healthy);
//!     Ok(())
//! }
//! ```

pub mod alerting;
pub mod config;
pub mod copyset;
pub mod error;
pub mod gateway;
pub mod observability;
pub mod scatter;
pub mod types;

// Re-exports
pub use error::{CairnError, Result};
pub use types::*;

use alerting::{AlertConfigStore, AlertEnv, AlertSink, AlertSupervisor, ServiceProbe};
use config::CairnConfig;
use copyset::{ClusterStatusReporter, CopysetChecker};
use gateway::ClusterGateway;
use std::sync::Arc;
use tracing::info;

/// Start monitoring the configured cluster.
///
/// Builds the copyset checker over `gateway` and starts the alert supervisor.
/// The returned supervisor owns every loop; call
/// [`AlertSupervisor::shutdown`] to stop them.
pub async fn start(
    config: CairnConfig,
    gateway: Arc<dyn ClusterGateway>,
    probe: Arc<dyn ServiceProbe>,
    store: Arc<dyn AlertConfigStore>,
    sink: Arc<dyn AlertSink>,
) -> Result<AlertSupervisor> {
    config.validate()?;
    info!(cluster = %config.cluster.name, "Starting Cairn monitor");

    let probe_timeout = config.checker.gateway_timeout;
    let checker = CopysetChecker::new(gateway, config.checker);
    let reporter = ClusterStatusReporter::new(config.cluster.name.clone(), checker);
    let env = Arc::new(AlertEnv::new(reporter, probe, probe_timeout));

    AlertSupervisor::start(config.cluster.name, env, store, sink, config.alerting).await
}
