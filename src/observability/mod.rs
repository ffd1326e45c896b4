//! Observability module for the chaos engine.
//!
//! Provides logging and metrics. Metrics are rendered by the admin server at
//! `/metrics` once [`install_metrics_recorder`] has run.

use crate::config::ObservabilityConfig;
use crate::error::{ChaosError, Result};
use tracing::info;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
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
            .map_err(|e| ChaosError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| ChaosError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    info!("Observability initialized");
    Ok(())
}

/// Install the global Prometheus recorder.
pub fn install_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ChaosError::Internal(format!("Failed to install metrics recorder: {}", e)))?;

    register_metrics();
    Ok(handle)
}

fn register_metrics() {
    gauge!("chaos_experiments_active").set(0.0);
    gauge!("chaos_experiments_pending").set(0.0);
    gauge!("chaos_registry_containers").set(0.0);
    counter!("chaos_cycles_total").absolute(0);
}

/// Record an experiment lifecycle transition.
pub fn record_experiment(stage: &'static str, platform: &str) {
    counter!(
        "chaos_experiments_total",
        "stage" => stage,
        "platform" => platform.to_string()
    )
    .increment(1);
}

/// Record a failed roster fetch.
pub fn record_roster_failure(platform: &str) {
    counter!("chaos_roster_failures_total", "platform" => platform.to_string()).increment(1);
}

/// Record a completed scheduling cycle.
pub fn record_cycle() {
    counter!("chaos_cycles_total").increment(1);
}

/// Update experiment gauges.
pub fn update_experiment_gauges(active: usize, pending: usize) {
    gauge!("chaos_experiments_active").set(active as f64);
    gauge!("chaos_experiments_pending").set(pending as f64);
}

/// Update registry gauges.
pub fn update_registry_size(containers: usize) {
    gauge!("chaos_registry_containers").set(containers as f64);
}
