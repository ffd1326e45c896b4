//! Waiting on long-running backend operations.
//!
//! Many backends answer a disruptive call with an in-progress operation
//! handle. [`await_completion`] polls the backend for that handle on one task
//! and waits on a second task for either the completion signal or the
//! timeout, whichever comes first. The continuation runs exactly once, on the
//! waiting task, so the scheduling loop never blocks on a slow backend.

use crate::config::{DEFAULT_EXPERIMENT_DURATION, DEFAULT_OPERATION_POLL_INTERVAL};
use crate::error::{ChaosError, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Opaque identifier of an in-progress backend operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationHandle(pub String);

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Completion predicate supplied by a platform.
#[async_trait::async_trait]
pub trait OperationTracker: Send + Sync {
    async fn is_operation_complete(&self, handle: &OperationHandle) -> Result<bool>;
}

/// Polling period and upper bound of one wait.
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_OPERATION_POLL_INTERVAL,
            timeout: DEFAULT_EXPERIMENT_DURATION,
        }
    }
}

/// Wait in the background for `handle` to complete, then run `on_complete`.
///
/// `on_complete` receives `Ok(())` on completion,
/// [`ChaosError::OperationTimeout`] once `options.timeout` elapses, or
/// [`ChaosError::OperationInterrupted`] if the poller dies without
/// answering. Polling stops before the continuation runs.
pub fn await_completion<F, Fut>(
    tracker: Arc<dyn OperationTracker>,
    handle: OperationHandle,
    options: WaitOptions,
    on_complete: F,
) -> JoinHandle<()>
where
    F: FnOnce(Result<()>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (done_tx, done_rx) = oneshot::channel();
    let poller = tokio::spawn(poll_until_complete(
        tracker,
        handle.clone(),
        options.poll_interval,
        done_tx,
    ));

    tokio::spawn(async move {
        let outcome = tokio::select! {
            signal = done_rx => match signal {
                Ok(()) => Ok(()),
                Err(_) => Err(ChaosError::OperationInterrupted(handle.to_string())),
            },
            _ = tokio::time::sleep(options.timeout) => Err(ChaosError::OperationTimeout {
                operation: handle.to_string(),
                timeout: options.timeout,
            }),
        };
        poller.abort();

        match &outcome {
            Ok(()) => debug!(operation = %handle, "Operation completed"),
            Err(e) => {
                metrics::counter!("chaos_operation_wait_failures_total").increment(1);
                warn!(operation = %handle, error = %e, "Operation did not complete");
            }
        }
        on_complete(outcome).await;
    })
}

async fn poll_until_complete(
    tracker: Arc<dyn OperationTracker>,
    handle: OperationHandle,
    poll_interval: Duration,
    done: oneshot::Sender<()>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match tracker.is_operation_complete(&handle).await {
            Ok(true) => {
                let _ = done.send(());
                return;
            }
            Ok(false) => {}
            Err(e) => {
                debug!(operation = %handle, error = %e, "Operation status check failed");
            }
        }
    }
}
