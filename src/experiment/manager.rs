//! The scheduling loop.
//!
//! One cycle is [`ExperimentManager::start_experiments`] followed by
//! [`ExperimentManager::update_experiment_status`]. Both take the same
//! queue lock, so they never overlap for one manager. Backend failures are
//! handled per platform or per container and never abort a cycle.

use super::{Experiment, ExperimentContext, ExperimentSummary};
use crate::admin::AdminManager;
use crate::calendar::{AlwaysOn, TemporalSuppression};
use crate::config::ExperimentSettings;
use crate::container::{Container, ContainerRegistry};
use crate::error::{ChaosError, Result};
use crate::health::{ComponentHealth, HealthManager};
use crate::notification::NotificationManager;
use crate::observability;
use crate::platform::Platform;
use crate::types::{ApiStatus, ExperimentId, ExperimentType, Fingerprint};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Default)]
struct Queues {
    pending: VecDeque<Experiment>,
    active: Vec<Experiment>,
}

impl Queues {
    /// A resource that left a roster and came back is a new `Container`, so
    /// match on identity rather than on the handle.
    fn is_busy(&self, container: &Container) -> bool {
        self.active.iter().chain(self.pending.iter()).any(|e| {
            let held = e.container();
            held.resource_type() == container.resource_type()
                && held.fingerprint() == container.fingerprint()
        })
    }
}

#[derive(Default)]
struct Snapshot {
    pending: Vec<ExperimentSummary>,
    active: Vec<ExperimentSummary>,
}

/// Drives experiments across every configured platform.
pub struct ExperimentManager {
    platforms: Vec<Arc<dyn Platform>>,
    registry: Arc<ContainerRegistry>,
    suppression: Arc<dyn TemporalSuppression>,
    admin: Arc<AdminManager>,
    health: Arc<HealthManager>,
    ctx: ExperimentContext,
    single_platform_per_cycle: bool,
    queues: tokio::sync::Mutex<Queues>,
    snapshot: RwLock<Snapshot>,
    rng: Mutex<StdRng>,
}

impl ExperimentManager {
    pub fn new(
        platforms: Vec<Arc<dyn Platform>>,
        settings: &ExperimentSettings,
        notifications: NotificationManager,
    ) -> Self {
        Self {
            platforms,
            registry: Arc::new(ContainerRegistry::new()),
            suppression: Arc::new(AlwaysOn),
            admin: Arc::new(AdminManager::default()),
            health: Arc::new(HealthManager::default()),
            ctx: ExperimentContext::new(settings, notifications),
            single_platform_per_cycle: settings.single_platform_per_cycle,
            queues: tokio::sync::Mutex::new(Queues::default()),
            snapshot: RwLock::new(Snapshot::default()),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_registry(mut self, registry: Arc<ContainerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_suppression(mut self, suppression: Arc<dyn TemporalSuppression>) -> Self {
        self.suppression = suppression;
        self
    }

    pub fn with_admin(mut self, admin: Arc<AdminManager>) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_health(mut self, health: Arc<HealthManager>) -> Self {
        self.health = health;
        self
    }

    /// Seed the admission draws, for reproducible runs.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn registry(&self) -> &Arc<ContainerRegistry> {
        &self.registry
    }

    pub fn admin(&self) -> &Arc<AdminManager> {
        &self.admin
    }

    pub fn health(&self) -> &Arc<HealthManager> {
        &self.health
    }

    pub fn notifications(&self) -> &NotificationManager {
        &self.ctx.notifications
    }

    pub fn platforms(&self) -> &[Arc<dyn Platform>] {
        &self.platforms
    }

    // ========================================================================
    // Admission
    // ========================================================================

    /// Admission pass. Returns the number of experiments queued.
    ///
    /// Nothing is queued while earlier experiments are still pending, while
    /// the admin state forbids new experiments, or inside a suppression
    /// window.
    pub async fn start_experiments(&self) -> usize {
        let state = self.admin.state();
        if !state.allows_new_experiments() {
            debug!(state = %state, "New experiments disabled");
            return 0;
        }

        let mut queues = self.queues.lock().await;
        if !queues.pending.is_empty() {
            debug!(
                pending = queues.pending.len(),
                "Previous batch not yet started, skipping admission"
            );
            return 0;
        }

        if self.suppression.is_holiday() {
            info!("Holiday, no new experiments this cycle");
            return 0;
        }
        if self.suppression.is_outside_working_hours() {
            info!("Outside working hours, no new experiments this cycle");
            return 0;
        }

        let mut eligible = Vec::with_capacity(self.platforms.len());
        for platform in &self.platforms {
            if platform.can_experiment().await {
                eligible.push(Arc::clone(platform));
                continue;
            }
            let component = if platform.api_status().await == ApiStatus::Error {
                ComponentHealth::unhealthy(platform.name(), "Backend API unreachable")
            } else {
                ComponentHealth::degraded(platform.name(), "Platform not accepting experiments")
            };
            debug!(platform = platform.name(), "Platform cannot experiment");
            self.health.record(component);
        }

        if self.single_platform_per_cycle && eligible.len() > 1 {
            let chosen = {
                let mut rng = self.rng.lock();
                eligible.choose(&mut *rng).cloned()
            };
            eligible = chosen.into_iter().collect();
        }

        let mut queued = 0;
        for platform in eligible {
            let roster = match platform.generate_roster().await {
                Ok(roster) => roster,
                Err(e) => {
                    warn!(
                        platform = platform.name(),
                        retryable = e.is_retryable(),
                        error = %e,
                        "Roster fetch failed, skipping platform this cycle"
                    );
                    observability::record_roster_failure(platform.name());
                    self.health
                        .record(ComponentHealth::degraded(platform.name(), e.to_string()));
                    continue;
                }
            };
            self.health.record(
                ComponentHealth::healthy(platform.name())
                    .with_detail("containers", roster.len().to_string()),
            );

            for container in self.registry.reconcile(platform.name(), roster) {
                if queues.is_busy(&container) {
                    continue;
                }
                let admitted = {
                    let mut rng = self.rng.lock();
                    container.can_experiment_with(&mut *rng)
                };
                if !admitted {
                    continue;
                }
                let created = {
                    let mut rng = self.rng.lock();
                    container.create_experiment_with(&mut *rng)
                };
                match created {
                    Ok(experiment) => {
                        observability::record_experiment("created", platform.name());
                        queues.pending.push_back(experiment);
                        queued += 1;
                    }
                    Err(e) => warn!(
                        container = %container.simple_name(),
                        fingerprint = %container.fingerprint(),
                        error = %e,
                        "Could not create experiment"
                    ),
                }
            }
        }

        if queued > 0 {
            info!(queued, "Queued new experiments");
        }
        observability::update_registry_size(self.registry.len());
        self.publish_snapshot(&queues);
        queued
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Start pending experiments, evaluate every active one and sweep the
    /// finished ones.
    pub async fn update_experiment_status(&self) {
        let state = self.admin.state();
        if !state.allows_evaluation() {
            debug!(state = %state, "Evaluation paused");
            return;
        }

        let mut queues = self.queues.lock().await;

        if !state.allows_new_experiments() && !queues.pending.is_empty() {
            info!(
                discarded = queues.pending.len(),
                "Draining, discarding experiments that never started"
            );
            queues.pending.clear();
        }

        while let Some(mut experiment) = queues.pending.pop_front() {
            if let Err(e) = experiment.start(&self.ctx).await {
                warn!(experiment_id = %experiment.id(), error = %e, "Experiment did not start");
            }
            queues.active.push(experiment);
        }

        for experiment in queues.active.iter_mut() {
            experiment.evaluate(&self.ctx).await;
        }

        let before = queues.active.len();
        queues.active.retain(|e| !e.state().is_terminal());
        let swept = before - queues.active.len();
        if swept > 0 {
            debug!(swept, remaining = queues.active.len(), "Removed finished experiments");
        }

        self.publish_snapshot(&queues);
    }

    // ========================================================================
    // Operator actions
    // ========================================================================

    /// Force an experiment against the container with `fingerprint`,
    /// bypassing probability-based admission.
    ///
    /// Rosters are refreshed so only containers that currently exist match.
    /// The experiment is queued and starts on the next status update.
    /// Returns an empty list if no platform reports the container.
    pub async fn experiment_container_id(
        &self,
        fingerprint: Fingerprint,
        kind: Option<ExperimentType>,
    ) -> Result<Vec<ExperimentSummary>> {
        let mut queues = self.queues.lock().await;

        let mut matching = Vec::new();
        for platform in &self.platforms {
            let roster = match platform.generate_roster().await {
                Ok(roster) => roster,
                Err(e) => {
                    warn!(platform = platform.name(), error = %e, "Roster fetch failed");
                    observability::record_roster_failure(platform.name());
                    continue;
                }
            };
            matching.extend(
                self.registry
                    .reconcile(platform.name(), roster)
                    .into_iter()
                    .filter(|c| c.fingerprint() == fingerprint),
            );
        }

        // Build every experiment before queuing any of them
        let mut experiments = Vec::with_capacity(matching.len());
        for container in &matching {
            let experiment = match kind {
                Some(kind) => container.create_experiment_of(kind)?,
                None => {
                    let mut rng = self.rng.lock();
                    container.create_experiment_with(&mut *rng)?
                }
            };
            experiments.push(experiment);
        }

        let mut created = Vec::with_capacity(experiments.len());
        for experiment in experiments {
            let container = experiment.container();
            info!(
                experiment_id = %experiment.id(),
                container = %container.simple_name(),
                fingerprint = %fingerprint,
                "Manually queued experiment"
            );
            observability::record_experiment("created", container.platform_name());
            created.push(experiment.summary());
            queues.pending.push_back(experiment);
        }

        if created.is_empty() {
            debug!(fingerprint = %fingerprint, "No container with that fingerprint");
        }
        self.publish_snapshot(&queues);
        Ok(created)
    }

    /// Abort an active or pending experiment. It is removed on the next sweep.
    pub async fn abort_experiment(&self, id: ExperimentId) -> Result<ExperimentSummary> {
        let mut queues = self.queues.lock().await;

        if let Some(position) = queues.pending.iter().position(|e| e.id() == id) {
            if let Some(mut experiment) = queues.pending.remove(position) {
                experiment.abort(&self.ctx, "Aborted before start");
                let summary = experiment.summary();
                self.publish_snapshot(&queues);
                return Ok(summary);
            }
        }

        let summary = match queues.active.iter_mut().find(|e| e.id() == id) {
            Some(experiment) => {
                experiment.abort(&self.ctx, "Aborted by operator");
                experiment.summary()
            }
            None => return Err(ChaosError::NotFound(format!("experiment {}", id))),
        };
        self.publish_snapshot(&queues);
        Ok(summary)
    }

    /// Snapshot of active experiments as of the last cycle.
    pub fn active_experiments(&self) -> Vec<ExperimentSummary> {
        self.snapshot.read().active.clone()
    }

    /// Snapshot of pending experiments as of the last cycle.
    pub fn pending_experiments(&self) -> Vec<ExperimentSummary> {
        self.snapshot.read().pending.clone()
    }

    fn publish_snapshot(&self, queues: &Queues) {
        let pending: Vec<_> = queues.pending.iter().map(Experiment::summary).collect();
        let active: Vec<_> = queues.active.iter().map(Experiment::summary).collect();
        observability::update_experiment_gauges(active.len(), pending.len());
        *self.snapshot.write() = Snapshot { pending, active };
    }
}
