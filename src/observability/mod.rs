//! Observability module for Cairn.
//!
//! Provides logging initialization and the metrics recorded by the copyset
//! checker and the alert scheduler. Metrics go through the `metrics` facade;
//! installing an exporter is up to the embedding service.

use crate::config::ObservabilityConfig;
use crate::error::{CairnError, Result};
use metrics::{counter, gauge};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| CairnError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| CairnError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    info!("Observability initialized");
    Ok(())
}

/// Update copyset gauges after a completed check.
pub fn record_copyset_check(cluster: &str, healthy: bool, total: usize, unhealthy: usize) {
    let cluster = cluster.to_string();
    gauge!("cairn_copysets_total", "cluster" => cluster.clone()).set(total as f64);
    gauge!("cairn_copysets_unhealthy", "cluster" => cluster.clone()).set(unhealthy as f64);
    gauge!("cairn_copyset_check_healthy", "cluster" => cluster)
        .set(if healthy { 1.0 } else { 0.0 });
}

/// Update chunk server exception gauges after a completed check.
pub fn record_chunkserver_exceptions(cluster: &str, service: usize, load: usize) {
    let cluster = cluster.to_string();
    gauge!("cairn_chunkservers_service_exception", "cluster" => cluster.clone()).set(service as f64);
    gauge!("cairn_chunkservers_load_exception", "cluster" => cluster).set(load as f64);
}

/// Record a check that aborted before producing counts.
pub fn record_copyset_check_failed(cluster: &str) {
    counter!("cairn_copyset_check_failed_total", "cluster" => cluster.to_string()).increment(1);
}

/// Record an emitted alert.
pub fn record_alert_emitted(cluster: &str, kind: &str) {
    counter!(
        "cairn_alerts_emitted_total",
        "cluster" => cluster.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record an alert evaluation that could not decide.
pub fn record_alert_evaluation_failed(cluster: &str, kind: &str) {
    counter!(
        "cairn_alert_evaluations_failed_total",
        "cluster" => cluster.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}
