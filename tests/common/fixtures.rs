// Scripted platform and resources for integration tests

use chaosengine::container::{ActionFuture, Capability, Container, Identity, Resource};
use chaosengine::experiment::ExperimentHooks;
use chaosengine::platform::Platform;
use chaosengine::{
    ApiStatus, ChaosError, ContainerHealth, ExperimentType, PlatformHealth, PlatformLevel, Result,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Backend-side state of one scripted resource.
///
/// Shared by every container built for the resource, so it survives roster
/// refreshes the same way a real backend object would.
#[derive(Debug)]
pub struct TargetState {
    pub healthy: AtomicBool,
    pub missing: AtomicBool,
    pub stay_broken: AtomicBool,
    pub reject_actions: AtomicBool,
    pub disruptions: AtomicUsize,
    pub self_heals: AtomicUsize,
    pub finalizes: AtomicUsize,
}

impl TargetState {
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            missing: AtomicBool::new(false),
            stay_broken: AtomicBool::new(false),
            reject_actions: AtomicBool::new(false),
            disruptions: AtomicUsize::new(0),
            self_heals: AtomicUsize::new(0),
            finalizes: AtomicUsize::new(0),
        }
    }

    /// Report normal health from now on.
    pub fn recover(&self) {
        self.healthy.store(true, Ordering::SeqCst);
    }

    pub fn disruptions(&self) -> usize {
        self.disruptions.load(Ordering::SeqCst)
    }

    pub fn self_heals(&self) -> usize {
        self.self_heals.load(Ordering::SeqCst)
    }

    pub fn finalizes(&self) -> usize {
        self.finalizes.load(Ordering::SeqCst)
    }
}

impl Default for TargetState {
    fn default() -> Self {
        Self::new()
    }
}

/// A resource with one `State` capability whose health is scripted.
pub struct ScriptedResource {
    pub platform: String,
    pub name: String,
    pub target: Arc<TargetState>,
}

fn disrupt(resource: Arc<ScriptedResource>) -> ActionFuture {
    Box::pin(async move {
        let target = Arc::clone(&resource.target);
        if target.reject_actions.load(Ordering::SeqCst) {
            return Err(ChaosError::Backend(format!(
                "{} rejected the action",
                resource.name
            )));
        }
        target.disruptions.fetch_add(1, Ordering::SeqCst);
        target.healthy.store(false, Ordering::SeqCst);

        let heal = Arc::clone(&target);
        let finish = Arc::clone(&target);
        Ok(ExperimentHooks::new()
            .with_self_healing(move || {
                let target = Arc::clone(&heal);
                async move {
                    target.self_heals.fetch_add(1, Ordering::SeqCst);
                    if !target.stay_broken.load(Ordering::SeqCst) {
                        target.healthy.store(true, Ordering::SeqCst);
                    }
                    Ok(())
                }
            })
            .with_finalize(move || {
                let target = Arc::clone(&finish);
                async move {
                    target.finalizes.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }))
    })
}

#[async_trait::async_trait]
impl Resource for ScriptedResource {
    fn container_type(&self) -> &'static str {
        "ScriptedResource"
    }

    fn simple_name(&self) -> String {
        self.name.clone()
    }

    fn aggregation_identifier(&self) -> String {
        self.platform.clone()
    }

    fn identity(&self) -> Identity {
        Identity::new()
            .field("platform", &self.platform)
            .field("name", &self.name)
    }

    async fn check_health(&self, _kind: ExperimentType) -> Result<ContainerHealth> {
        if self.target.missing.load(Ordering::SeqCst) {
            return Ok(ContainerHealth::DoesNotExist);
        }
        if self.target.healthy.load(Ordering::SeqCst) {
            Ok(ContainerHealth::Normal)
        } else {
            Ok(ContainerHealth::RunningExperiment)
        }
    }

    fn capabilities() -> &'static [Capability<Self>] {
        const CAPABILITIES: &[Capability<ScriptedResource>] = &[Capability {
            kind: ExperimentType::State,
            name: "disrupt",
            action: disrupt,
        }];
        CAPABILITIES
    }
}

/// A resource that supports no experiment kinds.
pub struct InertResource {
    pub platform: String,
    pub name: String,
}

#[async_trait::async_trait]
impl Resource for InertResource {
    fn container_type(&self) -> &'static str {
        "InertResource"
    }

    fn simple_name(&self) -> String {
        self.name.clone()
    }

    fn aggregation_identifier(&self) -> String {
        self.platform.clone()
    }

    fn identity(&self) -> Identity {
        Identity::new()
            .field("platform", &self.platform)
            .field("name", &self.name)
    }

    async fn check_health(&self, _kind: ExperimentType) -> Result<ContainerHealth> {
        Ok(ContainerHealth::Normal)
    }

    fn capabilities() -> &'static [Capability<Self>] {
        &[]
    }
}

enum Entry {
    Scripted(Arc<TargetState>),
    Inert,
}

/// In-memory platform whose roster and availability are driven by the test.
pub struct ScriptedPlatform {
    me: Weak<ScriptedPlatform>,
    name: String,
    probability: f64,
    self_healing_interval: Option<Duration>,
    api_available: AtomicBool,
    roster_failing: AtomicBool,
    entries: Mutex<BTreeMap<String, Entry>>,
    roster_calls: AtomicUsize,
}

impl ScriptedPlatform {
    pub fn new(name: &str, probability: f64) -> Arc<Self> {
        Self::build(name, probability, None)
    }

    /// Platform that overrides the engine-wide self-healing interval.
    pub fn with_self_healing_interval(name: &str, probability: f64, interval: Duration) -> Arc<Self> {
        Self::build(name, probability, Some(interval))
    }

    fn build(name: &str, probability: f64, self_healing_interval: Option<Duration>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            name: name.to_string(),
            probability,
            self_healing_interval,
            api_available: AtomicBool::new(true),
            roster_failing: AtomicBool::new(false),
            entries: Mutex::new(BTreeMap::new()),
            roster_calls: AtomicUsize::new(0),
        })
    }

    /// Add a disruptable resource and return its backend state.
    pub fn add_target(&self, name: &str) -> Arc<TargetState> {
        let target = Arc::new(TargetState::new());
        self.entries
            .lock()
            .insert(name.to_string(), Entry::Scripted(Arc::clone(&target)));
        target
    }

    /// Add a resource with an empty capability table.
    pub fn add_inert(&self, name: &str) {
        self.entries.lock().insert(name.to_string(), Entry::Inert);
    }

    /// Drop a resource from the backend. Its health check reports that it no
    /// longer exists.
    pub fn remove(&self, name: &str) -> bool {
        match self.entries.lock().remove(name) {
            Some(Entry::Scripted(target)) => {
                target.missing.store(true, Ordering::SeqCst);
                true
            }
            Some(Entry::Inert) => true,
            None => false,
        }
    }

    pub fn set_api_available(&self, available: bool) {
        self.api_available.store(available, Ordering::SeqCst);
    }

    pub fn set_roster_failing(&self, failing: bool) {
        self.roster_failing.store(failing, Ordering::SeqCst);
    }

    pub fn roster_calls(&self) -> usize {
        self.roster_calls.load(Ordering::SeqCst)
    }

    pub fn as_platform(self: &Arc<Self>) -> Arc<dyn Platform> {
        Arc::clone(self) as Arc<dyn Platform>
    }
}

#[async_trait::async_trait]
impl Platform for ScriptedPlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform_type(&self) -> &'static str {
        "ScriptedPlatform"
    }

    fn level(&self) -> PlatformLevel {
        PlatformLevel::Iaas
    }

    fn destruction_probability(&self) -> f64 {
        self.probability
    }

    fn minimum_self_healing_interval(&self) -> Option<Duration> {
        self.self_healing_interval
    }

    async fn api_status(&self) -> ApiStatus {
        if self.api_available.load(Ordering::SeqCst) {
            ApiStatus::Ok
        } else {
            ApiStatus::Error
        }
    }

    async fn platform_health(&self) -> PlatformHealth {
        PlatformHealth::Ok
    }

    async fn generate_roster(&self) -> Result<Vec<Arc<Container>>> {
        self.roster_calls.fetch_add(1, Ordering::SeqCst);
        if self.roster_failing.load(Ordering::SeqCst) {
            return Err(ChaosError::RosterUnavailable {
                platform: self.name.clone(),
                reason: "scripted outage".to_string(),
            });
        }

        let me: Arc<dyn Platform> = match self.me.upgrade() {
            Some(me) => me,
            None => return Err(ChaosError::Internal("platform dropped".to_string())),
        };

        let entries = self.entries.lock();
        let roster = entries
            .iter()
            .map(|(name, entry)| match entry {
                Entry::Scripted(target) => Container::new(
                    &me,
                    ScriptedResource {
                        platform: self.name.clone(),
                        name: name.clone(),
                        target: Arc::clone(target),
                    },
                ),
                Entry::Inert => Container::new(
                    &me,
                    InertResource {
                        platform: self.name.clone(),
                        name: name.clone(),
                    },
                ),
            })
            .collect();
        Ok(roster)
    }
}
