//! In-memory platform with a fleet of simulated instances.
//!
//! Useful for local runs and tests. Every disruptive action mutates the
//! in-memory fleet only. Recreating an instance is asynchronous: the backend
//! hands out an operation id that completes a few seconds later with a new
//! instance id, which is picked up through [`await_completion`].

use super::Platform;
use crate::config::SimulatedPlatformConfig;
use crate::container::{ActionFuture, Capability, Container, Identity, Resource};
use crate::error::{ChaosError, Result};
use crate::experiment::ExperimentHooks;
use crate::operation::{await_completion, OperationHandle, OperationTracker, WaitOptions};
use crate::types::{ApiStatus, ContainerHealth, ExperimentType, PlatformHealth, PlatformLevel};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Time the simulated backend takes to recreate an instance.
pub const RECREATE_DURATION: Duration = Duration::from_secs(3);

/// Backend-side state of one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceState {
    pub zone: String,
    pub group: String,
    pub instance_id: String,
    pub running: bool,
    pub isolated: bool,
    pub stressed: bool,
}

impl InstanceState {
    fn is_normal(&self) -> bool {
        self.running && !self.isolated && !self.stressed
    }
}

struct PendingOperation {
    instance: String,
    completes_at: Instant,
}

/// The simulated backend shared by the platform and its instances.
struct Fleet {
    instances: RwLock<BTreeMap<String, InstanceState>>,
    operations: Mutex<HashMap<String, PendingOperation>>,
    api_available: AtomicBool,
}

impl Fleet {
    fn ensure_available(&self) -> Result<()> {
        if self.api_available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ChaosError::Backend("simulated API unavailable".to_string()))
        }
    }

    fn update<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut InstanceState),
    {
        self.ensure_available()?;
        let mut instances = self.instances.write();
        let state = instances
            .get_mut(name)
            .ok_or_else(|| ChaosError::NotFound(format!("instance {}", name)))?;
        f(state);
        Ok(())
    }

    fn begin_recreate(&self, name: &str) -> Result<OperationHandle> {
        self.update(name, |state| state.running = false)?;
        let id = format!("operation-{}", uuid::Uuid::new_v4());
        self.operations.lock().insert(
            id.clone(),
            PendingOperation {
                instance: name.to_string(),
                completes_at: Instant::now() + RECREATE_DURATION,
            },
        );
        Ok(OperationHandle(id))
    }
}

#[async_trait::async_trait]
impl OperationTracker for Fleet {
    async fn is_operation_complete(&self, handle: &OperationHandle) -> Result<bool> {
        self.ensure_available()?;
        let mut operations = self.operations.lock();
        let done = match operations.get(&handle.0) {
            Some(op) => Instant::now() >= op.completes_at,
            None => return Err(ChaosError::NotFound(format!("operation {}", handle))),
        };
        if !done {
            return Ok(false);
        }
        if let Some(op) = operations.remove(&handle.0) {
            if let Some(state) = self.instances.write().get_mut(&op.instance) {
                state.running = true;
                state.instance_id = uuid::Uuid::new_v4().to_string();
            }
        }
        Ok(true)
    }
}

// ============================================================================
// Instance
// ============================================================================

/// One simulated compute instance.
pub struct SimulatedInstance {
    name: String,
    zone: String,
    group: String,
    /// Changes on every recreate, so it is not part of the identity.
    instance_id: Mutex<String>,
    fleet: Arc<Fleet>,
    wait: WaitOptions,
}

impl SimulatedInstance {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Instance id as last recorded by this container.
    pub fn instance_id(&self) -> String {
        self.instance_id.lock().clone()
    }

    fn state(&self) -> Option<InstanceState> {
        self.fleet.instances.read().get(&self.name).cloned()
    }

    fn restore_hook(self: &Arc<Self>, f: fn(&mut InstanceState)) -> ExperimentHooks {
        let heal = Arc::clone(self);
        let finalize = Arc::clone(self);
        ExperimentHooks::new()
            .with_self_healing(move || {
                let instance = Arc::clone(&heal);
                async move { instance.fleet.update(&instance.name, f) }
            })
            .with_finalize(move || {
                let instance = Arc::clone(&finalize);
                async move { instance.fleet.update(&instance.name, f) }
            })
    }
}

fn stop_instance(instance: Arc<SimulatedInstance>) -> ActionFuture {
    Box::pin(async move {
        instance.fleet.update(&instance.name, |s| s.running = false)?;
        info!(instance = %instance.name, "Stopped simulated instance");
        Ok(instance.restore_hook(|s| s.running = true))
    })
}

fn recreate_instance(instance: Arc<SimulatedInstance>) -> ActionFuture {
    Box::pin(async move {
        let handle = instance.fleet.begin_recreate(&instance.name)?;
        info!(instance = %instance.name, operation = %handle, "Recreating simulated instance");

        let tracker: Arc<dyn OperationTracker> = instance.fleet.clone();
        let target = Arc::clone(&instance);
        await_completion(tracker, handle, instance.wait, move |outcome| async move {
            match outcome {
                Ok(()) => {
                    if let Some(state) = target.state() {
                        debug!(
                            instance = %target.name,
                            instance_id = %state.instance_id,
                            "Recorded new instance id"
                        );
                        *target.instance_id.lock() = state.instance_id;
                    }
                }
                Err(e) => warn!(instance = %target.name, error = %e, "Recreate did not finish"),
            }
        });

        let heal = Arc::clone(&instance);
        Ok(ExperimentHooks::new().with_self_healing(move || {
            let instance = Arc::clone(&heal);
            async move { instance.fleet.update(&instance.name, |s| s.running = true) }
        }))
    })
}

fn isolate_instance(instance: Arc<SimulatedInstance>) -> ActionFuture {
    Box::pin(async move {
        instance.fleet.update(&instance.name, |s| s.isolated = true)?;
        info!(instance = %instance.name, "Isolated simulated instance");
        Ok(instance.restore_hook(|s| s.isolated = false))
    })
}

fn burn_cpu(instance: Arc<SimulatedInstance>) -> ActionFuture {
    Box::pin(async move {
        instance.fleet.update(&instance.name, |s| s.stressed = true)?;
        info!(instance = %instance.name, "Started CPU burn on simulated instance");
        Ok(instance.restore_hook(|s| s.stressed = false))
    })
}

#[async_trait::async_trait]
impl Resource for SimulatedInstance {
    fn container_type(&self) -> &'static str {
        "SimulatedInstance"
    }

    fn simple_name(&self) -> String {
        self.name.clone()
    }

    fn aggregation_identifier(&self) -> String {
        self.group.clone()
    }

    fn identity(&self) -> Identity {
        Identity::new()
            .field("name", &self.name)
            .field("zone", &self.zone)
            .field("group", &self.group)
    }

    async fn check_health(&self, _kind: ExperimentType) -> Result<ContainerHealth> {
        self.fleet.ensure_available()?;
        Ok(match self.state() {
            None => ContainerHealth::DoesNotExist,
            Some(state) if state.is_normal() => ContainerHealth::Normal,
            Some(_) => ContainerHealth::RunningExperiment,
        })
    }

    fn capabilities() -> &'static [Capability<Self>] {
        const CAPABILITIES: &[Capability<SimulatedInstance>] = &[
            Capability {
                kind: ExperimentType::State,
                name: "stop_instance",
                action: stop_instance,
            },
            Capability {
                kind: ExperimentType::State,
                name: "recreate_instance",
                action: recreate_instance,
            },
            Capability {
                kind: ExperimentType::Network,
                name: "isolate_instance",
                action: isolate_instance,
            },
            Capability {
                kind: ExperimentType::Resource,
                name: "burn_cpu",
                action: burn_cpu,
            },
        ];
        CAPABILITIES
    }
}

// ============================================================================
// Platform
// ============================================================================

/// Platform backed by an in-memory fleet.
pub struct SimulatedPlatform {
    me: Weak<SimulatedPlatform>,
    name: String,
    destruction_probability: f64,
    minimum_self_healing_interval: Option<Duration>,
    wait: WaitOptions,
    fleet: Arc<Fleet>,
}

impl SimulatedPlatform {
    /// Build a platform seeded with `config.instances` running instances.
    pub fn new(config: &SimulatedPlatformConfig, wait: WaitOptions) -> Arc<Self> {
        let instances = (0..config.instances)
            .map(|i| {
                (
                    format!("{}-{}", config.name, i),
                    InstanceState {
                        zone: config.zone.clone(),
                        group: format!("{}-group-{}", config.name, i % 2),
                        instance_id: uuid::Uuid::new_v4().to_string(),
                        running: true,
                        isolated: false,
                        stressed: false,
                    },
                )
            })
            .collect();

        Arc::new_cyclic(|me| SimulatedPlatform {
            me: me.clone(),
            name: config.name.clone(),
            destruction_probability: config.destruction_probability,
            minimum_self_healing_interval: config.minimum_self_healing_interval,
            wait,
            fleet: Arc::new(Fleet {
                instances: RwLock::new(instances),
                operations: Mutex::new(HashMap::new()),
                api_available: AtomicBool::new(true),
            }),
        })
    }

    /// Simulate a backend outage or recovery.
    pub fn set_api_available(&self, available: bool) {
        self.fleet.api_available.store(available, Ordering::SeqCst);
    }

    /// Add a running instance.
    pub fn add_instance(&self, name: impl Into<String>, zone: impl Into<String>, group: impl Into<String>) {
        self.fleet.instances.write().insert(
            name.into(),
            InstanceState {
                zone: zone.into(),
                group: group.into(),
                instance_id: uuid::Uuid::new_v4().to_string(),
                running: true,
                isolated: false,
                stressed: false,
            },
        );
    }

    /// Remove an instance from the backend. Returns whether it existed.
    pub fn decommission(&self, name: &str) -> bool {
        self.fleet.instances.write().remove(name).is_some()
    }

    /// Backend-side state of one instance.
    pub fn instance(&self, name: &str) -> Option<InstanceState> {
        self.fleet.instances.read().get(name).cloned()
    }

    pub fn instance_names(&self) -> Vec<String> {
        self.fleet.instances.read().keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl Platform for SimulatedPlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform_type(&self) -> &'static str {
        "SimulatedPlatform"
    }

    fn level(&self) -> PlatformLevel {
        PlatformLevel::Iaas
    }

    fn destruction_probability(&self) -> f64 {
        self.destruction_probability
    }

    fn minimum_self_healing_interval(&self) -> Option<Duration> {
        self.minimum_self_healing_interval
    }

    async fn api_status(&self) -> ApiStatus {
        if self.fleet.api_available.load(Ordering::SeqCst) {
            ApiStatus::Ok
        } else {
            ApiStatus::Error
        }
    }

    async fn platform_health(&self) -> PlatformHealth {
        if !self.fleet.api_available.load(Ordering::SeqCst) {
            return PlatformHealth::Failed;
        }
        let instances = self.fleet.instances.read();
        if instances.values().all(InstanceState::is_normal) {
            PlatformHealth::Ok
        } else {
            PlatformHealth::Degraded
        }
    }

    async fn generate_roster(&self) -> Result<Vec<Arc<Container>>> {
        self.fleet
            .ensure_available()
            .map_err(|e| ChaosError::RosterUnavailable {
                platform: self.name.clone(),
                reason: e.to_string(),
            })?;
        let me: Arc<dyn Platform> = self
            .me
            .upgrade()
            .ok_or_else(|| ChaosError::Internal(format!("platform {} dropped", self.name)))?;

        let instances = self.fleet.instances.read().clone();
        Ok(instances
            .into_iter()
            .map(|(name, state)| {
                Container::new(
                    &me,
                    SimulatedInstance {
                        name,
                        zone: state.zone,
                        group: state.group,
                        instance_id: Mutex::new(state.instance_id),
                        fleet: Arc::clone(&self.fleet),
                        wait: self.wait,
                    },
                )
            })
            .collect())
    }
}
