//! Platform abstraction.
//!
//! A platform is one backend integration. It enumerates the resources it
//! manages as [`Container`]s, reports the health of its API and fleet, and
//! carries the destruction probability used for admission control.

pub mod simulated;

pub use simulated::{SimulatedInstance, SimulatedPlatform};

use crate::container::Container;
use crate::error::Result;
use crate::types::{ApiStatus, PlatformHealth, PlatformLevel};
use std::sync::Arc;
use std::time::Duration;

/// Backend integration able to enumerate and disrupt resources.
///
/// Roster generation only reads from the backend. Disruptive writes happen
/// through the capability tables of the containers it returns.
#[async_trait::async_trait]
pub trait Platform: Send + Sync {
    /// Unique name of this platform instance.
    fn name(&self) -> &str;

    /// Name of the backend integration.
    fn platform_type(&self) -> &'static str;

    fn level(&self) -> PlatformLevel;

    /// Admission weight in [0, 1].
    fn destruction_probability(&self) -> f64;

    /// Override of the engine-wide self-healing interval.
    fn minimum_self_healing_interval(&self) -> Option<Duration> {
        None
    }

    /// Reachability of the backend API.
    async fn api_status(&self) -> ApiStatus;

    /// Health of the managed fleet.
    async fn platform_health(&self) -> PlatformHealth;

    /// Query the backend and build fresh containers for every resource.
    async fn generate_roster(&self) -> Result<Vec<Arc<Container>>>;

    /// Whether the platform currently accepts new experiments.
    async fn can_experiment(&self) -> bool {
        self.api_status().await == ApiStatus::Ok
            && self.platform_health().await != PlatformHealth::Failed
    }
}
