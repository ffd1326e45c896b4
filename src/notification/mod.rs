//! Experiment notifications.
//!
//! Every experiment transition produces a [`ChaosEvent`]. The
//! [`NotificationManager`] keeps a short history, broadcasts the event to
//! in-process subscribers and hands it to each registered [`Notifier`] on a
//! spawned task. Delivery is fire-and-forget: a failing channel is logged
//! and counted, never surfaced to the scheduler.

use crate::error::Result;
use crate::types::{ExperimentId, ExperimentType};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const HISTORY_SIZE: usize = 256;
const BROADCAST_CAPACITY: usize = 1024;

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Good,
    Warn,
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotificationLevel::Good => "good",
            NotificationLevel::Warn => "warn",
            NotificationLevel::Error => "error",
        })
    }
}

/// Structured record of one experiment transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaosEvent {
    pub experiment_id: ExperimentId,
    pub title: String,
    pub message: String,
    pub level: NotificationLevel,
    /// Simple name of the target container.
    pub target: String,
    pub aggregation_identifier: String,
    pub platform: String,
    pub platform_type: String,
    pub container_type: String,
    pub experiment_type: ExperimentType,
    pub timestamp: DateTime<Utc>,
}

impl ChaosEvent {
    /// `key:value` tags for channels that index on them.
    pub fn tags(&self) -> Vec<String> {
        vec![
            format!("target:{}", self.target),
            format!("aggregationidentifier:{}", self.aggregation_identifier),
            format!("platform:{}", self.platform),
            format!("containertype:{}", self.container_type),
            format!("experimenttype:{}", self.experiment_type),
        ]
    }
}

/// A delivery channel.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, event: &ChaosEvent) -> Result<()>;
}

/// Writes events to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, event: &ChaosEvent) -> Result<()> {
        let tags = event.tags().join(",");
        match event.level {
            NotificationLevel::Good => info!(
                experiment_id = %event.experiment_id,
                tags = %tags,
                "{}: {}", event.title, event.message
            ),
            NotificationLevel::Warn => warn!(
                experiment_id = %event.experiment_id,
                tags = %tags,
                "{}: {}", event.title, event.message
            ),
            NotificationLevel::Error => error!(
                experiment_id = %event.experiment_id,
                tags = %tags,
                "{}: {}", event.title, event.message
            ),
        }
        Ok(())
    }
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NotificationStats {
    pub events_published: u64,
    pub deliveries_failed: u64,
}

#[derive(Default)]
struct StatsInner {
    events_published: AtomicU64,
    deliveries_failed: AtomicU64,
}

struct Inner {
    notifiers: RwLock<Vec<Arc<dyn Notifier>>>,
    history: RwLock<VecDeque<ChaosEvent>>,
    broadcast: broadcast::Sender<ChaosEvent>,
    stats: StatsInner,
}

/// Fans events out to subscribers and notifiers.
#[derive(Clone)]
pub struct NotificationManager {
    inner: Arc<Inner>,
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationManager {
    pub fn new() -> Self {
        let (broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                notifiers: RwLock::new(Vec::new()),
                history: RwLock::new(VecDeque::with_capacity(HISTORY_SIZE)),
                broadcast,
                stats: StatsInner::default(),
            }),
        }
    }

    /// Manager with the log channel registered.
    pub fn with_log() -> Self {
        let manager = Self::new();
        manager.register(Arc::new(LogNotifier));
        manager
    }

    pub fn register(&self, notifier: Arc<dyn Notifier>) {
        self.inner.notifiers.write().push(notifier);
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChaosEvent> {
        self.inner.broadcast.subscribe()
    }

    /// Publish an event. Returns without waiting for any channel.
    pub fn publish(&self, event: ChaosEvent) {
        self.inner
            .stats
            .events_published
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("chaos_notifications_total", "level" => event.level.to_string())
            .increment(1);

        {
            let mut history = self.inner.history.write();
            if history.len() >= HISTORY_SIZE {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        let _ = self.inner.broadcast.send(event.clone());

        let notifiers = self.inner.notifiers.read().clone();
        if notifiers.is_empty() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            for notifier in notifiers {
                if let Err(e) = notifier.send(&event).await {
                    inner.stats.deliveries_failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        notifier = notifier.name(),
                        experiment_id = %event.experiment_id,
                        error = %e,
                        "Notification delivery failed"
                    );
                }
            }
        });
    }

    /// Most recent events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ChaosEvent> {
        let history = self.inner.history.read();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn stats(&self) -> NotificationStats {
        NotificationStats {
            events_published: self.inner.stats.events_published.load(Ordering::Relaxed),
            deliveries_failed: self.inner.stats.deliveries_failed.load(Ordering::Relaxed),
        }
    }
}
