//! Run-state toggle for the scheduler.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Administrative run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminState {
    /// Scheduling runs normally.
    #[default]
    Started,
    /// No new experiments; running ones are still evaluated to completion.
    Drain,
    /// Every cycle is a no-op.
    Paused,
}

impl AdminState {
    /// Whether new experiments may be created.
    pub fn allows_new_experiments(&self) -> bool {
        matches!(self, AdminState::Started)
    }

    /// Whether running experiments are evaluated.
    pub fn allows_evaluation(&self) -> bool {
        !matches!(self, AdminState::Paused)
    }
}

impl fmt::Display for AdminState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdminState::Started => "started",
            AdminState::Drain => "drain",
            AdminState::Paused => "paused",
        })
    }
}

impl FromStr for AdminState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "started" | "start" => Ok(AdminState::Started),
            "drain" => Ok(AdminState::Drain),
            "paused" | "pause" => Ok(AdminState::Paused),
            other => Err(format!("unknown admin state: {}", other)),
        }
    }
}

/// Current state with the time it was last changed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdminStatus {
    pub state: AdminState,
    pub changed_at: DateTime<Utc>,
}

/// Holds the run state shared by the scheduler and the admin API.
pub struct AdminManager {
    status: RwLock<AdminStatus>,
}

impl Default for AdminManager {
    fn default() -> Self {
        Self::new(AdminState::Started)
    }
}

impl AdminManager {
    pub fn new(state: AdminState) -> Self {
        Self {
            status: RwLock::new(AdminStatus {
                state,
                changed_at: Utc::now(),
            }),
        }
    }

    pub fn state(&self) -> AdminState {
        self.status.read().state
    }

    pub fn status(&self) -> AdminStatus {
        *self.status.read()
    }

    /// Change the run state. Setting the current state again is a no-op.
    pub fn set_state(&self, state: AdminState) -> AdminStatus {
        let mut status = self.status.write();
        if status.state != state {
            info!(from = %status.state, to = %state, "Admin state changed");
            status.state = state;
            status.changed_at = Utc::now();
        }
        *status
    }
}
