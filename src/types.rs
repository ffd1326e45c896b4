//! Core identifiers and small enums shared across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier of one experiment instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(pub uuid::Uuid);

impl ExperimentId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExperimentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ExperimentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

/// Deterministic identity checksum of a container.
///
/// Two containers of the same concrete type describe the same backend
/// resource if and only if their fingerprints are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

/// Category of disruptive action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentType {
    /// Changes the running state of a resource (stop, restart, recreate).
    State,
    /// Degrades connectivity of a resource.
    Network,
    /// Exhausts a resource's CPU, memory or disk.
    Resource,
}

impl ExperimentType {
    /// Every kind, in a stable order.
    pub const ALL: [ExperimentType; 3] = [
        ExperimentType::State,
        ExperimentType::Network,
        ExperimentType::Resource,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentType::State => "state",
            ExperimentType::Network => "network",
            ExperimentType::Resource => "resource",
        }
    }
}

impl fmt::Display for ExperimentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "state" => Ok(ExperimentType::State),
            "network" => Ok(ExperimentType::Network),
            "resource" => Ok(ExperimentType::Resource),
            other => Err(format!("unknown experiment type: {}", other)),
        }
    }
}

/// Health of a container as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerHealth {
    /// Resource is behaving normally.
    Normal,
    /// Resource is still affected by an experiment.
    RunningExperiment,
    /// Backend no longer reports the resource.
    DoesNotExist,
}

impl ContainerHealth {
    pub fn is_normal(&self) -> bool {
        matches!(self, ContainerHealth::Normal)
    }
}

/// Reachability of a platform's backend API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Ok,
    Error,
}

/// Health of the resources managed by a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformHealth {
    Ok,
    Degraded,
    Failed,
}

/// Coarse capability level of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformLevel {
    /// Infrastructure as a service (virtual machines, managed databases).
    Iaas,
    /// Platform as a service (application runtimes).
    Paas,
    /// Software as a service.
    Saas,
    /// Container orchestrators.
    Orchestrator,
}
