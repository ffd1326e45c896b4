//! chaosengine - a fault-injection orchestrator.
//!
//! The engine discovers disruptable resources ("containers") across pluggable
//! backends ("platforms"), subjects a probabilistic subset of them to
//! disruptive experiments, and drives every experiment through health
//! checks, self-healing and finalization.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Admin API: run state | health | experiments | metrics      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ExperimentManager: admission | queueing | sweep            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Experiment state machine | async operation waiter          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Container registry | capability tables | fingerprints      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Platforms: roster | health | destruction probability       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use chaosengine::config::EngineConfig;
//!
//! #[tokio::main]
//! async fn main() -> chaosengine::Result<()> {
//!     // One simulated platform, short cycles, no suppression windows
//!     let config = EngineConfig::development();
//!     chaosengine::run(config).await
//! }
//! ```

pub mod admin;
pub mod api;
pub mod calendar;
pub mod cli;
pub mod config;
pub mod container;
pub mod error;
pub mod experiment;
pub mod health;
pub mod notification;
pub mod observability;
pub mod operation;
pub mod platform;
pub mod shutdown;
pub mod types;

// Re-exports
pub use error::{ChaosError, Result};
pub use types::*;

use api::AdminApi;
use calendar::HolidayCalendar;
use config::EngineConfig;
use experiment::ExperimentManager;
use notification::NotificationManager;
use operation::WaitOptions;
use platform::{Platform, SimulatedPlatform};
use shutdown::{ShutdownCoordinator, SignalHandler};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Build the platforms described by the configuration.
pub fn build_platforms(config: &EngineConfig) -> Vec<Arc<dyn Platform>> {
    let wait = WaitOptions {
        poll_interval: config.experiments.operation_poll_interval,
        timeout: config.experiments.experiment_duration,
    };
    config
        .platforms
        .iter()
        .map(|p| SimulatedPlatform::new(p, wait) as Arc<dyn Platform>)
        .collect()
}

/// Build a manager wired to the configured platforms and calendar.
pub fn build_manager(config: &EngineConfig) -> Result<ExperimentManager> {
    let calendar = HolidayCalendar::new(config.calendar.clone())?;
    Ok(ExperimentManager::new(
        build_platforms(config),
        &config.experiments,
        NotificationManager::with_log(),
    )
    .with_suppression(Arc::new(calendar)))
}

/// One scheduling cycle: admission, then evaluation.
pub async fn run_cycle(manager: &ExperimentManager) {
    manager.start_experiments().await;
    manager.update_experiment_status().await;
    observability::record_cycle();
}

/// Run cycles with a fixed delay between them until shutdown.
///
/// A cycle in progress always completes; shutdown is only observed while
/// waiting for the next one.
pub async fn run_scheduler(
    manager: Arc<ExperimentManager>,
    cycle_interval: Duration,
    shutdown: ShutdownCoordinator,
) {
    info!(interval = ?cycle_interval, "Scheduler started");
    loop {
        run_cycle(&manager).await;

        tokio::select! {
            _ = shutdown.wait_for_shutdown() => break,
            _ = tokio::time::sleep(cycle_interval) => {}
        }
    }
    info!("Scheduler stopped");
}

/// Run the engine with the given configuration.
pub async fn run(config: EngineConfig) -> Result<()> {
    config.validate()?;
    info!(platforms = config.platforms.len(), "Starting chaos engine");

    let metrics = if config.observability.metrics_enabled {
        Some(observability::install_metrics_recorder()?)
    } else {
        None
    };

    let manager = Arc::new(build_manager(&config)?);
    let coordinator = ShutdownCoordinator::new();

    let mut handles = Vec::new();
    if config.admin.enabled {
        let listener = TcpListener::bind(config.admin.bind_addr).await?;
        let mut admin = AdminApi::new(Arc::clone(&manager));
        if let Some(handle) = metrics {
            admin = admin.with_metrics(handle);
        }
        let shutdown = coordinator.clone();
        handles.push((
            "admin",
            tokio::spawn(async move {
                if let Err(e) = api::serve(listener, admin, shutdown).await {
                    error!("Admin server error: {}", e);
                }
            }),
        ));
    }

    let signal_coordinator = coordinator.clone();
    tokio::spawn(async move {
        SignalHandler::new(signal_coordinator).run().await;
    });

    run_scheduler(
        Arc::clone(&manager),
        config.experiments.cycle_interval,
        coordinator.clone(),
    )
    .await;

    info!("Shutting down chaos engine gracefully...");
    for (name, handle) in handles {
        match tokio::time::timeout(coordinator.timeout(), handle).await {
            Ok(Ok(())) => info!(service = name, "Service stopped"),
            Ok(Err(e)) => error!(service = name, "Service task failed: {}", e),
            Err(_) => warn!(service = name, "Service did not stop in time"),
        }
    }

    let active = manager.active_experiments().len();
    if active > 0 {
        warn!(active, "Exiting with experiments still active");
    }
    info!("Chaos engine stopped");
    Ok(())
}
