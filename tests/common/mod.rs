//! Common test utilities for integration tests.

pub mod fixtures;

pub use fixtures::*;

use chaosengine::calendar::TemporalSuppression;
use chaosengine::config::ExperimentSettings;
use chaosengine::experiment::ExperimentManager;
use chaosengine::notification::NotificationManager;
use chaosengine::platform::Platform;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Settings with short, round timings that tests can advance past.
pub fn test_settings() -> ExperimentSettings {
    ExperimentSettings {
        cycle_interval: Duration::from_secs(1),
        experiment_duration: Duration::from_secs(60),
        time_before_finalization: Duration::from_secs(30),
        minimum_self_healing_interval: Duration::from_secs(120),
        operation_poll_interval: Duration::from_millis(100),
        single_platform_per_cycle: false,
    }
}

/// Manager over the given platforms with seeded admission draws.
pub fn manager_for(platforms: Vec<Arc<dyn Platform>>) -> ExperimentManager {
    ExperimentManager::new(platforms, &test_settings(), NotificationManager::new())
        .with_rng_seed(7)
}

/// Suppression window toggled by the test.
#[derive(Default)]
pub struct SwitchableSuppression {
    pub holiday: AtomicBool,
    pub after_hours: AtomicBool,
}

impl SwitchableSuppression {
    pub fn set_holiday(&self, holiday: bool) {
        self.holiday.store(holiday, Ordering::SeqCst);
    }

    pub fn set_after_hours(&self, after_hours: bool) {
        self.after_hours.store(after_hours, Ordering::SeqCst);
    }
}

impl TemporalSuppression for SwitchableSuppression {
    fn is_holiday(&self) -> bool {
        self.holiday.load(Ordering::SeqCst)
    }

    fn is_outside_working_hours(&self) -> bool {
        self.after_hours.load(Ordering::SeqCst)
    }
}

/// Wait for a server to be ready by polling its health endpoint.
pub async fn wait_for_server(addr: &str, timeout_secs: u64) -> bool {
    let client = reqwest::Client::new();
    let start = std::time::Instant::now();
    let timeout = Duration::from_secs(timeout_secs);

    while start.elapsed() < timeout {
        if client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
