//! Containers: persistent handles to disruptable backend resources.
//!
//! A backend describes one resource type by implementing [`Resource`] and
//! listing its disruptive actions in a static capability table. Wrapping a
//! resource in a [`Container`] binds that table once, fixes the set of
//! supported [`ExperimentType`]s, and computes the fingerprint the
//! [`ContainerRegistry`] deduplicates on.

mod identity;
mod registry;

pub use identity::Identity;
pub use registry::ContainerRegistry;

use crate::error::{ChaosError, Result};
use crate::experiment::{Experiment, ExperimentHooks};
use crate::platform::Platform;
use crate::types::{ContainerHealth, ExperimentType, Fingerprint};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

/// Future returned by a disruptive action. Resolves once the action has been
/// submitted, carrying the hooks that drive the rest of the experiment.
pub type ActionFuture = BoxFuture<'static, Result<ExperimentHooks>>;

/// One disruptive action a resource type can perform.
pub struct Capability<R> {
    pub kind: ExperimentType,
    pub name: &'static str,
    pub action: fn(Arc<R>) -> ActionFuture,
}

/// A concrete backend resource type.
#[async_trait::async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Name of the concrete resource type.
    fn container_type(&self) -> &'static str;

    /// Short human readable name of this instance.
    fn simple_name(&self) -> String;

    /// Grouping key used by downstream channels to aggregate events.
    fn aggregation_identifier(&self) -> String;

    /// Stable identifying fields.
    fn identity(&self) -> Identity;

    /// Query the backend for the current health of this resource.
    async fn check_health(&self, kind: ExperimentType) -> Result<ContainerHealth>;

    /// Static capability table of the concrete type.
    fn capabilities() -> &'static [Capability<Self>]
    where
        Self: Sized;
}

/// A capability bound to one resource instance.
#[derive(Clone)]
pub struct BoundAction {
    pub kind: ExperimentType,
    pub name: &'static str,
    invoke: Arc<dyn Fn() -> ActionFuture + Send + Sync>,
}

impl BoundAction {
    pub fn invoke(&self) -> ActionFuture {
        (self.invoke)()
    }
}

impl fmt::Debug for BoundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundAction")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish()
    }
}

/// Persistent handle to one disruptable resource.
pub struct Container {
    resource: Arc<dyn Resource>,
    concrete: Arc<dyn Any + Send + Sync>,
    resource_type: TypeId,
    platform: Weak<dyn Platform>,
    platform_name: String,
    platform_type: &'static str,
    fingerprint: Fingerprint,
    actions: Vec<BoundAction>,
    supported: Vec<ExperimentType>,
    health: Mutex<ContainerHealth>,
    last_action: Mutex<Option<BoundAction>>,
}

impl Container {
    /// Wrap a freshly discovered resource.
    pub fn new<R: Resource>(platform: &Arc<dyn Platform>, resource: R) -> Arc<Self> {
        let resource = Arc::new(resource);

        let actions: Vec<BoundAction> = R::capabilities()
            .iter()
            .map(|capability| {
                let target = Arc::clone(&resource);
                let action = capability.action;
                BoundAction {
                    kind: capability.kind,
                    name: capability.name,
                    invoke: Arc::new(move || action(Arc::clone(&target))),
                }
            })
            .collect();

        let supported = ExperimentType::ALL
            .into_iter()
            .filter(|kind| actions.iter().any(|a| a.kind == *kind))
            .collect();

        let fingerprint = resource.identity().fingerprint();

        Arc::new(Self {
            concrete: Arc::clone(&resource) as Arc<dyn Any + Send + Sync>,
            resource,
            resource_type: TypeId::of::<R>(),
            platform: Arc::downgrade(platform),
            platform_name: platform.name().to_string(),
            platform_type: platform.platform_type(),
            fingerprint,
            actions,
            supported,
            health: Mutex::new(ContainerHealth::Normal),
            last_action: Mutex::new(None),
        })
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// The wrapped resource, if it is an `R`.
    pub fn resource_as<R: Resource>(&self) -> Option<Arc<R>> {
        Arc::clone(&self.concrete).downcast::<R>().ok()
    }

    pub(crate) fn resource_type(&self) -> TypeId {
        self.resource_type
    }

    pub fn container_type(&self) -> &'static str {
        self.resource.container_type()
    }

    pub fn simple_name(&self) -> String {
        self.resource.simple_name()
    }

    pub fn aggregation_identifier(&self) -> String {
        self.resource.aggregation_identifier()
    }

    pub fn platform_name(&self) -> &str {
        &self.platform_name
    }

    pub fn platform_type(&self) -> &'static str {
        self.platform_type
    }

    /// Owning platform, if it is still alive.
    pub fn platform(&self) -> Option<Arc<dyn Platform>> {
        self.platform.upgrade()
    }

    /// Experiment kinds this container supports. Fixed at construction.
    pub fn supported_experiment_types(&self) -> &[ExperimentType] {
        &self.supported
    }

    pub fn supports(&self, kind: ExperimentType) -> bool {
        self.supported.contains(&kind)
    }

    /// Last observed health.
    pub fn health(&self) -> ContainerHealth {
        *self.health.lock()
    }

    pub fn set_health(&self, health: ContainerHealth) {
        *self.health.lock() = health;
    }

    /// Self-healing interval of the owning platform, if it overrides the
    /// engine default.
    pub fn minimum_self_healing_interval(&self) -> Option<Duration> {
        self.platform()
            .and_then(|p| p.minimum_self_healing_interval())
    }

    /// Admission check using the thread-local generator.
    pub fn can_experiment(&self) -> bool {
        self.can_experiment_with(&mut rand::thread_rng())
    }

    /// Admission check: the container supports at least one kind and a
    /// uniform draw in [0, 1) falls below the platform's probability.
    pub fn can_experiment_with<G: Rng>(&self, rng: &mut G) -> bool {
        if self.supported.is_empty() {
            return false;
        }
        let probability = match self.platform() {
            Some(platform) => platform.destruction_probability(),
            None => return false,
        };
        rng.gen::<f64>() < probability
    }

    /// Create an experiment of a random supported kind.
    pub fn create_experiment(self: &Arc<Self>) -> Result<Experiment> {
        self.create_experiment_with(&mut rand::thread_rng())
    }

    pub fn create_experiment_with<G: Rng>(self: &Arc<Self>, rng: &mut G) -> Result<Experiment> {
        let kind = *self
            .supported
            .choose(rng)
            .ok_or_else(|| ChaosError::NoExperimentKinds(self.simple_name()))?;
        self.build_experiment(kind, rng)
    }

    /// Create an experiment of the given kind, bypassing admission.
    pub fn create_experiment_of(self: &Arc<Self>, kind: ExperimentType) -> Result<Experiment> {
        self.build_experiment(kind, &mut rand::thread_rng())
    }

    fn build_experiment<G: Rng>(
        self: &Arc<Self>,
        kind: ExperimentType,
        rng: &mut G,
    ) -> Result<Experiment> {
        if self.supported.is_empty() {
            return Err(ChaosError::NoExperimentKinds(self.simple_name()));
        }
        let candidates: Vec<&BoundAction> =
            self.actions.iter().filter(|a| a.kind == kind).collect();
        let action = candidates
            .choose(rng)
            .ok_or_else(|| ChaosError::UnsupportedExperiment {
                container_type: self.container_type().to_string(),
                kind,
            })?;

        debug!(
            container = %self.simple_name(),
            fingerprint = %self.fingerprint,
            kind = %kind,
            action = action.name,
            "Created experiment"
        );
        Ok(Experiment::new(Arc::clone(self), kind, (*action).clone()))
    }

    /// Run a disruptive action against this container, remembering it for
    /// [`Container::repeat_experiment`] once it has been submitted.
    pub(crate) async fn run_action(&self, action: &BoundAction) -> Result<ExperimentHooks> {
        self.set_health(ContainerHealth::RunningExperiment);
        info!(
            container = %self.simple_name(),
            platform = %self.platform_name,
            action = action.name,
            "Starting disruptive action"
        );
        let hooks = action.invoke().await?;
        *self.last_action.lock() = Some(action.clone());
        Ok(hooks)
    }

    /// Re-run the last successfully started action.
    pub async fn repeat_experiment(&self) -> Result<ExperimentHooks> {
        let action = self
            .last_action
            .lock()
            .clone()
            .ok_or_else(|| ChaosError::NoPriorExperiment(self.simple_name()))?;
        self.run_action(&action).await
    }

    /// Name of the last successfully started action.
    pub fn last_action(&self) -> Option<&'static str> {
        self.last_action.lock().as_ref().map(|a| a.name)
    }

    pub(crate) async fn check_resource_health(&self, kind: ExperimentType) -> Result<ContainerHealth> {
        self.resource.check_health(kind).await
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("type", &self.container_type())
            .field("name", &self.simple_name())
            .field("platform", &self.platform_name)
            .field("fingerprint", &self.fingerprint)
            .field("supported", &self.supported)
            .finish()
    }
}
