//! System health for the admin surface.
//!
//! The scheduler records one [`ComponentHealth`] per platform as it talks to
//! the backends. [`HealthManager::system_health`] folds them into a single
//! [`SystemHealth`] that `/health` maps onto an HTTP status.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::time::Instant;

/// Status of one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is healthy.
    Healthy,
    /// Component had a transient failure but is expected to recover.
    Degraded,
    /// Component is unhealthy.
    Unhealthy,
}

impl HealthStatus {
    /// Combine two statuses (worst wins).
    pub fn combine(&self, other: &HealthStatus) -> HealthStatus {
        match (self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

/// Overall engine health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SystemHealth {
    Ok,
    Error,
    Unknown,
}

impl SystemHealth {
    /// Convert to HTTP status code.
    pub fn to_status_code(&self) -> u16 {
        match self {
            SystemHealth::Ok => 200,
            SystemHealth::Error => 500,
            SystemHealth::Unknown => 503,
        }
    }
}

/// Individual component health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name.
    pub name: String,
    /// Health status.
    pub status: HealthStatus,
    /// Optional message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Additional details.
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub details: HashMap<String, String>,
}

impl ComponentHealth {
    /// Create a healthy component.
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
            details: HashMap::new(),
        }
    }

    /// Create a degraded component.
    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            details: HashMap::new(),
        }
    }

    /// Create an unhealthy component.
    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            details: HashMap::new(),
        }
    }

    /// Add detail.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Full health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: SystemHealth,
    /// Service version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// Per-platform checks.
    pub components: Vec<ComponentHealth>,
    /// Timestamp.
    pub timestamp: String,
}

/// Tracks component health reported by the scheduler.
pub struct HealthManager {
    version: String,
    start_time: Instant,
    components: RwLock<BTreeMap<String, ComponentHealth>>,
}

impl Default for HealthManager {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}

impl HealthManager {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            start_time: Instant::now(),
            components: RwLock::new(BTreeMap::new()),
        }
    }

    /// Record the latest health of one component, replacing the previous one.
    pub fn record(&self, component: ComponentHealth) {
        self.components
            .write()
            .insert(component.name.clone(), component);
    }

    pub fn component(&self, name: &str) -> Option<ComponentHealth> {
        self.components.read().get(name).cloned()
    }

    /// Fold component health into the system health.
    pub fn system_health(&self) -> SystemHealth {
        let components = self.components.read();
        if components.is_empty() {
            return SystemHealth::Unknown;
        }
        let worst = components
            .values()
            .fold(HealthStatus::Healthy, |acc, c| acc.combine(&c.status));
        match worst {
            HealthStatus::Unhealthy => SystemHealth::Error,
            HealthStatus::Healthy | HealthStatus::Degraded => SystemHealth::Ok,
        }
    }

    pub fn response(&self) -> HealthResponse {
        HealthResponse {
            status: self.system_health(),
            version: self.version.clone(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            components: self.components.read().values().cloned().collect(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_without_reports() {
        let health = HealthManager::default();
        assert_eq!(health.system_health(), SystemHealth::Unknown);
        assert_eq!(health.system_health().to_status_code(), 503);
    }

    #[test]
    fn test_degraded_is_still_ok() {
        let health = HealthManager::default();
        health.record(ComponentHealth::healthy("a"));
        health.record(ComponentHealth::degraded("b", "roster fetch timed out"));
        assert_eq!(health.system_health(), SystemHealth::Ok);
        assert_eq!(health.system_health().to_status_code(), 200);
    }

    #[test]
    fn test_unhealthy_is_error() {
        let health = HealthManager::default();
        health.record(ComponentHealth::healthy("a"));
        health.record(ComponentHealth::unhealthy("b", "API unreachable"));
        assert_eq!(health.system_health(), SystemHealth::Error);
        assert_eq!(health.system_health().to_status_code(), 500);

        health.record(ComponentHealth::healthy("b"));
        assert_eq!(health.system_health(), SystemHealth::Ok);
    }

    #[test]
    fn test_response_lists_components() {
        let health = HealthManager::new("1.2.3");
        health.record(ComponentHealth::healthy("lab").with_detail("containers", "3"));
        let response = health.response();
        assert_eq!(response.version, "1.2.3");
        assert_eq!(response.components.len(), 1);
        assert_eq!(response.components[0].details["containers"], "3");
    }

    #[test]
    fn test_status_combine() {
        assert_eq!(
            HealthStatus::Healthy.combine(&HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Degraded.combine(&HealthStatus::Unhealthy),
            HealthStatus::Unhealthy
        );
    }
}
