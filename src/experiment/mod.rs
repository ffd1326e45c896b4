//! Experiment state machine.
//!
//! An [`Experiment`] is one disruptive action against one container. It is
//! created by [`Container::create_experiment`], started once by the
//! scheduler and then re-evaluated on every sweep until it finishes:
//!
//! ```text
//! NotYetStarted -> Started <-> SelfHealing -> Finalizing -> Finished
//!        \             \            \              \
//!         `-------------`------------`--------------`--> Finished (failed)
//! ```
//!
//! Nothing here schedules itself. Every transition happens inside a call from
//! the [`ExperimentManager`] cycle that owns the experiment.

mod manager;

pub use manager::ExperimentManager;

use crate::config::ExperimentSettings;
use crate::container::{BoundAction, Container};
use crate::error::{ChaosError, Result};
use crate::notification::{ChaosEvent, NotificationLevel, NotificationManager};
use crate::observability;
use crate::types::{ContainerHealth, ExperimentId, ExperimentType, Fingerprint};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// ============================================================================
// Hooks
// ============================================================================

/// Future returned by an experiment hook.
pub type HookFuture<T> = BoxFuture<'static, Result<T>>;

type HealthHook = Arc<dyn Fn() -> HookFuture<ContainerHealth> + Send + Sync>;
type ActionHook = Arc<dyn Fn() -> HookFuture<()> + Send + Sync>;

/// Callables captured from a disruptive action.
///
/// A missing health check falls back to the resource's own
/// [`Resource::check_health`](crate::container::Resource::check_health).
/// Missing self-healing or finalize hooks are no-ops.
#[derive(Clone, Default)]
pub struct ExperimentHooks {
    health_check: Option<HealthHook>,
    self_healing: Option<ActionHook>,
    finalize: Option<ActionHook>,
}

impl ExperimentHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_health_check<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ContainerHealth>> + Send + 'static,
    {
        self.health_check = Some(Arc::new(move || -> HookFuture<ContainerHealth> {
            Box::pin(f())
        }));
        self
    }

    pub fn with_self_healing<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.self_healing = Some(Arc::new(move || -> HookFuture<()> { Box::pin(f()) }));
        self
    }

    pub fn with_finalize<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.finalize = Some(Arc::new(move || -> HookFuture<()> { Box::pin(f()) }));
        self
    }
}

impl fmt::Debug for ExperimentHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperimentHooks")
            .field("health_check", &self.health_check.is_some())
            .field("self_healing", &self.self_healing.is_some())
            .field("finalize", &self.finalize.is_some())
            .finish()
    }
}

// ============================================================================
// State
// ============================================================================

/// Lifecycle state of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentState {
    NotYetStarted,
    Started,
    SelfHealing,
    Finalizing,
    Finished,
}

impl ExperimentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExperimentState::Finished)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ExperimentState::Started | ExperimentState::SelfHealing)
    }
}

impl fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExperimentState::NotYetStarted => "not_yet_started",
            ExperimentState::Started => "started",
            ExperimentState::SelfHealing => "self_healing",
            ExperimentState::Finalizing => "finalizing",
            ExperimentState::Finished => "finished",
        })
    }
}

/// Timings and channels an experiment needs while it is evaluated.
#[derive(Clone)]
pub struct ExperimentContext {
    pub time_before_finalization: Duration,
    pub minimum_self_healing_interval: Duration,
    pub notifications: NotificationManager,
}

impl ExperimentContext {
    pub fn new(settings: &ExperimentSettings, notifications: NotificationManager) -> Self {
        Self {
            time_before_finalization: settings.time_before_finalization,
            minimum_self_healing_interval: settings.minimum_self_healing_interval,
            notifications,
        }
    }
}

/// Serializable view of an experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub id: ExperimentId,
    pub container: String,
    pub fingerprint: Fingerprint,
    pub container_type: String,
    pub platform: String,
    pub experiment_type: ExperimentType,
    pub action: String,
    pub state: ExperimentState,
    pub failed: bool,
    pub self_healing_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Experiment
// ============================================================================

/// One disruptive action against one container.
pub struct Experiment {
    id: ExperimentId,
    container: Arc<Container>,
    kind: ExperimentType,
    action: BoundAction,
    hooks: ExperimentHooks,
    state: ExperimentState,
    failed: bool,
    created_at: DateTime<Utc>,
    started_wall: Option<DateTime<Utc>>,
    started_at: Option<Instant>,
    finalizable_at: Option<Instant>,
    last_self_healing: Option<Instant>,
    self_healing_attempts: u32,
}

impl Experiment {
    pub(crate) fn new(container: Arc<Container>, kind: ExperimentType, action: BoundAction) -> Self {
        Self {
            id: ExperimentId::new(),
            container,
            kind,
            action,
            hooks: ExperimentHooks::default(),
            state: ExperimentState::NotYetStarted,
            failed: false,
            created_at: Utc::now(),
            started_wall: None,
            started_at: None,
            finalizable_at: None,
            last_self_healing: None,
            self_healing_attempts: 0,
        }
    }

    pub fn id(&self) -> ExperimentId {
        self.id
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn kind(&self) -> ExperimentType {
        self.kind
    }

    pub fn action_name(&self) -> &'static str {
        self.action.name
    }

    pub fn state(&self) -> ExperimentState {
        self.state
    }

    /// Whether the experiment ended through an error or an abort.
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn self_healing_attempts(&self) -> u32 {
        self.self_healing_attempts
    }

    /// Invoke the disruptive action.
    ///
    /// A failing action finishes the experiment with the failure flag set.
    pub async fn start(&mut self, ctx: &ExperimentContext) -> Result<()> {
        if self.state != ExperimentState::NotYetStarted {
            return Err(ChaosError::InvalidState(self.id, self.state.to_string()));
        }

        match self.container.run_action(&self.action).await {
            Ok(hooks) => {
                let now = Instant::now();
                self.hooks = hooks;
                self.state = ExperimentState::Started;
                self.started_at = Some(now);
                self.started_wall = Some(Utc::now());
                self.finalizable_at = Some(now + ctx.time_before_finalization);

                info!(
                    experiment_id = %self.id,
                    container = %self.container.simple_name(),
                    platform = self.container.platform_name(),
                    kind = %self.kind,
                    action = self.action.name,
                    "Experiment started"
                );
                observability::record_experiment("started", self.container.platform_name());
                self.notify(
                    ctx,
                    NotificationLevel::Warn,
                    "Experiment started",
                    format!("Started {} against {}", self.action.name, self.container.simple_name()),
                );
                Ok(())
            }
            Err(e) => {
                self.fail(ctx, "Experiment failed to start", e.to_string());
                Err(ChaosError::ExperimentFailed(e.to_string()))
            }
        }
    }

    /// Re-run the disruptive action in place, keeping this experiment's
    /// identity and restarting its timers.
    pub async fn repeat(&mut self, ctx: &ExperimentContext) -> Result<()> {
        if !self.state.is_running() {
            return Err(ChaosError::InvalidState(self.id, self.state.to_string()));
        }

        let hooks = self.container.repeat_experiment().await?;
        let now = Instant::now();
        self.hooks = hooks;
        self.state = ExperimentState::Started;
        self.started_at = Some(now);
        self.finalizable_at = Some(now + ctx.time_before_finalization);
        self.last_self_healing = None;

        self.notify(
            ctx,
            NotificationLevel::Warn,
            "Experiment repeated",
            format!("Repeated {} against {}", self.action.name, self.container.simple_name()),
        );
        Ok(())
    }

    /// Evaluate the experiment once and return the resulting state.
    ///
    /// Abnormal health triggers self-healing at most once per minimum
    /// interval. Normal health finalizes the experiment once the
    /// finalization delay since start has passed. A failing health check
    /// leaves the state untouched until the next evaluation.
    pub async fn evaluate(&mut self, ctx: &ExperimentContext) -> ExperimentState {
        if !self.state.is_running() {
            return self.state;
        }

        let health = match self.check_health().await {
            Ok(health) => health,
            Err(e) => {
                warn!(
                    experiment_id = %self.id,
                    container = %self.container.simple_name(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Health check failed, skipping evaluation"
                );
                return self.state;
            }
        };

        let now = Instant::now();
        if !health.is_normal() {
            if health == ContainerHealth::DoesNotExist {
                self.container.set_health(ContainerHealth::DoesNotExist);
            }
            self.state = ExperimentState::SelfHealing;

            let interval = self
                .container
                .minimum_self_healing_interval()
                .unwrap_or(ctx.minimum_self_healing_interval);
            let reference = self.last_self_healing.or(self.started_at).unwrap_or(now);
            if now.duration_since(reference) >= interval {
                self.self_heal(ctx, now).await;
            } else {
                debug!(
                    experiment_id = %self.id,
                    remaining = ?interval.saturating_sub(now.duration_since(reference)),
                    "Self-healing not yet allowed"
                );
            }
            return self.state;
        }

        self.state = ExperimentState::Started;
        if self.finalizable_at.map_or(false, |at| now >= at) {
            self.finalize(ctx).await;
        }
        self.state
    }

    async fn check_health(&self) -> Result<ContainerHealth> {
        match &self.hooks.health_check {
            Some(check) => check().await,
            None => self.container.check_resource_health(self.kind).await,
        }
    }

    async fn self_heal(&mut self, ctx: &ExperimentContext, now: Instant) {
        self.last_self_healing = Some(now);
        self.self_healing_attempts += 1;

        let Some(heal) = self.hooks.self_healing.clone() else {
            debug!(experiment_id = %self.id, "No self-healing hook");
            return;
        };

        match heal().await {
            Ok(()) => {
                info!(
                    experiment_id = %self.id,
                    container = %self.container.simple_name(),
                    attempt = self.self_healing_attempts,
                    "Self-healing invoked"
                );
                observability::record_experiment("self_healed", self.container.platform_name());
                self.notify(
                    ctx,
                    NotificationLevel::Warn,
                    "Experiment self-healed",
                    format!(
                        "Self-healing attempt {} on {}",
                        self.self_healing_attempts,
                        self.container.simple_name()
                    ),
                );
            }
            Err(e) => {
                warn!(experiment_id = %self.id, error = %e, "Self-healing failed");
                self.notify(
                    ctx,
                    NotificationLevel::Error,
                    "Self-healing failed",
                    e.to_string(),
                );
            }
        }
    }

    async fn finalize(&mut self, ctx: &ExperimentContext) {
        self.state = ExperimentState::Finalizing;

        let outcome = match self.hooks.finalize.clone() {
            Some(finalize) => finalize().await,
            None => Ok(()),
        };

        match outcome {
            Ok(()) => {
                self.state = ExperimentState::Finished;
                self.container.set_health(ContainerHealth::Normal);
                info!(
                    experiment_id = %self.id,
                    container = %self.container.simple_name(),
                    "Experiment finalized"
                );
                observability::record_experiment("finalized", self.container.platform_name());
                self.notify(
                    ctx,
                    NotificationLevel::Good,
                    "Experiment finished",
                    format!("{} recovered from {}", self.container.simple_name(), self.action.name),
                );
            }
            Err(e) => self.fail(ctx, "Experiment finalization failed", e.to_string()),
        }
    }

    /// Operator abort: finish with the failure flag so the next sweep drops it.
    pub fn abort(&mut self, ctx: &ExperimentContext, reason: &str) {
        if self.state.is_terminal() {
            return;
        }
        self.state = ExperimentState::Finished;
        self.failed = true;
        self.release_container();
        info!(experiment_id = %self.id, reason, "Experiment aborted");
        observability::record_experiment("aborted", self.container.platform_name());
        self.notify(ctx, NotificationLevel::Warn, "Experiment aborted", reason.to_string());
    }

    fn fail(&mut self, ctx: &ExperimentContext, title: &str, message: String) {
        self.state = ExperimentState::Finished;
        self.failed = true;
        self.release_container();
        warn!(
            experiment_id = %self.id,
            container = %self.container.simple_name(),
            error = %message,
            "{}", title
        );
        observability::record_experiment("failed", self.container.platform_name());
        self.notify(ctx, NotificationLevel::Error, title, message);
    }

    /// Clear the running marker left by the action. A container last seen as
    /// missing keeps that health.
    fn release_container(&self) {
        if self.container.health() == ContainerHealth::RunningExperiment {
            self.container.set_health(ContainerHealth::Normal);
        }
    }

    fn notify(&self, ctx: &ExperimentContext, level: NotificationLevel, title: &str, message: String) {
        ctx.notifications.publish(ChaosEvent {
            experiment_id: self.id,
            title: title.to_string(),
            message,
            level,
            target: self.container.simple_name(),
            aggregation_identifier: self.container.aggregation_identifier(),
            platform: self.container.platform_name().to_string(),
            platform_type: self.container.platform_type().to_string(),
            container_type: self.container.container_type().to_string(),
            experiment_type: self.kind,
            timestamp: Utc::now(),
        });
    }

    pub fn summary(&self) -> ExperimentSummary {
        ExperimentSummary {
            id: self.id,
            container: self.container.simple_name(),
            fingerprint: self.container.fingerprint(),
            container_type: self.container.container_type().to_string(),
            platform: self.container.platform_name().to_string(),
            experiment_type: self.kind,
            action: self.action.name.to_string(),
            state: self.state,
            failed: self.failed,
            self_healing_attempts: self.self_healing_attempts,
            created_at: self.created_at,
            started_at: self.started_wall,
        }
    }
}

impl fmt::Debug for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("id", &self.id)
            .field("container", &self.container.simple_name())
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("failed", &self.failed)
            .finish()
    }
}
