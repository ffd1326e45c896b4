//! Error types for the chaos engine.
//!
//! This module provides a unified error type [`ChaosError`] for all engine
//! operations, along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Transient backend errors**: network, rate-limit or auth failures while
//!   fetching a roster or checking health. The scheduler skips the affected
//!   platform or container for the current cycle and retries next cycle.
//! - **Terminal action errors**: a disruptive action failed. The experiment is
//!   finished with its failure flag set and a notification is sent.
//! - **Contract violations**: asking a container for a kind it does not
//!   support, repeating an experiment that never ran. These fail fast.
//! - **Timeouts**: an asynchronous backend operation did not complete in time.
//!
//! # Example
//!
//! ```rust
//! use chaosengine::error::{ChaosError, Result};
//!
//! fn fetch(platform: &str) -> Result<Vec<String>> {
//!     Err(ChaosError::RosterUnavailable {
//!         platform: platform.to_string(),
//!         reason: "connection reset".to_string(),
//!     })
//! }
//!
//! let err = fetch("gcp-compute").unwrap_err();
//! assert!(err.is_retryable());
//! ```

use crate::types::{ExperimentId, ExperimentType};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for engine operations.
#[derive(Error, Debug)]
pub enum ChaosError {
    // Transient backend errors
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Roster unavailable for platform {platform}: {reason}")]
    RosterUnavailable { platform: String, reason: String },

    // Terminal action errors
    #[error("Experiment failed: {0}")]
    ExperimentFailed(String),

    // Contract violations
    #[error("Container type {container_type} does not support {kind} experiments")]
    UnsupportedExperiment {
        container_type: String,
        kind: ExperimentType,
    },

    #[error("Container {0} exposes no experiment kinds")]
    NoExperimentKinds(String),

    #[error("Cannot repeat an experiment on {0} without a prior one")]
    NoPriorExperiment(String),

    #[error("Experiment {0} is in state {1} and cannot do that")]
    InvalidState(ExperimentId, String),

    // Timeouts
    #[error("Operation {operation} did not complete within {timeout:?}")]
    OperationTimeout { operation: String, timeout: Duration },

    #[error("Wait for operation {0} was interrupted")]
    OperationInterrupted(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChaosError {
    /// Check if error is transient and the work should simply be retried on
    /// the next scheduling cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChaosError::Backend(_) | ChaosError::RosterUnavailable { .. }
        )
    }

    /// Check if error is an operation timeout or interruption.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ChaosError::OperationTimeout { .. } | ChaosError::OperationInterrupted(_)
        )
    }
}

impl From<serde_json::Error> for ChaosError {
    fn from(e: serde_json::Error) -> Self {
        ChaosError::Serialization(e.to_string())
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, ChaosError>;
