//! Configuration module for the chaos engine.

use crate::error::{ChaosError, Result};
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Default length of an experiment, also the default bound on every
/// asynchronous backend operation wait.
pub const DEFAULT_EXPERIMENT_DURATION: Duration = Duration::from_secs(5 * 60);
/// Default time an experiment must have been running before it may finalize.
pub const DEFAULT_TIME_BEFORE_FINALIZATION: Duration = Duration::from_secs(30);
/// Default minimum spacing between two self-healing attempts on a container.
pub const DEFAULT_SELF_HEALING_INTERVAL: Duration = Duration::from_secs(2 * 60);
/// Default polling period for asynchronous backend operations.
pub const DEFAULT_OPERATION_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default fixed delay between two scheduling cycles.
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_secs(15);

/// Main configuration for an engine instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Experiment lifecycle timings.
    #[serde(default)]
    pub experiments: ExperimentSettings,
    /// Holiday and working-hours suppression.
    #[serde(default)]
    pub calendar: CalendarConfig,
    /// Administrative HTTP surface.
    #[serde(default)]
    pub admin: AdminConfig,
    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Simulated backends.
    #[serde(default)]
    pub platforms: Vec<SimulatedPlatformConfig>,
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ChaosError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ChaosError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        self.experiments.validate()?;
        self.calendar.validate()?;

        let mut names = HashSet::new();
        for (i, platform) in self.platforms.iter().enumerate() {
            if platform.name.trim().is_empty() {
                return Err(ChaosError::InvalidConfig {
                    field: format!("platforms[{}].name", i),
                    reason: "Platform name must not be empty".to_string(),
                });
            }
            if !names.insert(platform.name.as_str()) {
                return Err(ChaosError::InvalidConfig {
                    field: format!("platforms[{}].name", i),
                    reason: format!("Duplicate platform name '{}'", platform.name),
                });
            }
            if !(0.0..=1.0).contains(&platform.destruction_probability) {
                return Err(ChaosError::InvalidConfig {
                    field: format!("platforms[{}].destruction_probability", i),
                    reason: "Probability must be within [0, 1]".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Fast-cycling configuration with one simulated platform.
    pub fn development() -> Self {
        Self {
            experiments: ExperimentSettings {
                cycle_interval: Duration::from_secs(5),
                experiment_duration: Duration::from_secs(60),
                time_before_finalization: Duration::from_secs(10),
                minimum_self_healing_interval: Duration::from_secs(20),
                operation_poll_interval: Duration::from_millis(500),
                single_platform_per_cycle: false,
            },
            calendar: CalendarConfig::always_on(),
            admin: AdminConfig {
                enabled: true,
                bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            },
            observability: ObservabilityConfig {
                log_level: "debug".to_string(),
                ..ObservabilityConfig::default()
            },
            platforms: vec![SimulatedPlatformConfig::default()],
        }
    }
}

/// Timings that drive the experiment lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSettings {
    /// Fixed delay between two scheduling cycles.
    #[serde(with = "humantime_serde")]
    pub cycle_interval: Duration,
    /// Nominal experiment length; bounds asynchronous operation waits.
    #[serde(with = "humantime_serde")]
    pub experiment_duration: Duration,
    /// Time since start before a healthy experiment may finalize.
    #[serde(with = "humantime_serde")]
    pub time_before_finalization: Duration,
    /// Minimum spacing between self-healing attempts, unless the platform
    /// overrides it.
    #[serde(with = "humantime_serde")]
    pub minimum_self_healing_interval: Duration,
    /// Poll period for asynchronous backend operations.
    #[serde(with = "humantime_serde")]
    pub operation_poll_interval: Duration,
    /// Restrict each admission pass to a single randomly chosen platform.
    #[serde(default)]
    pub single_platform_per_cycle: bool,
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
            experiment_duration: DEFAULT_EXPERIMENT_DURATION,
            time_before_finalization: DEFAULT_TIME_BEFORE_FINALIZATION,
            minimum_self_healing_interval: DEFAULT_SELF_HEALING_INTERVAL,
            operation_poll_interval: DEFAULT_OPERATION_POLL_INTERVAL,
            single_platform_per_cycle: false,
        }
    }
}

impl ExperimentSettings {
    fn validate(&self) -> Result<()> {
        let checks = [
            ("experiments.cycle_interval", self.cycle_interval),
            ("experiments.experiment_duration", self.experiment_duration),
            ("experiments.operation_poll_interval", self.operation_poll_interval),
        ];
        for (field, value) in checks {
            if value.is_zero() {
                return Err(ChaosError::InvalidConfig {
                    field: field.to_string(),
                    reason: "Duration must be non-zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Holiday calendar and working hours used to suppress new experiments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Whether suppression is applied at all.
    pub enabled: bool,
    /// Offset of the local time zone from UTC, in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Working days.
    pub working_days: Vec<Weekday>,
    /// First working hour (inclusive, 24-hour clock).
    pub start_hour: u32,
    /// Last working hour (exclusive, 24-hour clock).
    pub end_hour: u32,
    /// One-off holidays.
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
    /// Holidays recurring every year, as (month, day).
    #[serde(default)]
    pub recurring_holidays: Vec<(u32, u32)>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            utc_offset_minutes: 0,
            working_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            start_hour: 9,
            end_hour: 17,
            holidays: Vec::new(),
            recurring_holidays: vec![(1, 1), (12, 25)],
        }
    }
}

impl CalendarConfig {
    /// Calendar that never suppresses anything.
    pub fn always_on() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.start_hour >= self.end_hour || self.end_hour > 24 {
            return Err(ChaosError::InvalidConfig {
                field: "calendar.start_hour".to_string(),
                reason: format!(
                    "Working hours {}..{} are not a valid range",
                    self.start_hour, self.end_hour
                ),
            });
        }
        // FixedOffset accepts strictly less than one day either way
        if self.utc_offset_minutes.unsigned_abs() >= 24 * 60 {
            return Err(ChaosError::InvalidConfig {
                field: "calendar.utc_offset_minutes".to_string(),
                reason: format!("{} is outside +/-24h", self.utc_offset_minutes),
            });
        }
        for (month, day) in &self.recurring_holidays {
            if !(1..=12).contains(month) || !(1..=31).contains(day) {
                return Err(ChaosError::InvalidConfig {
                    field: "calendar.recurring_holidays".to_string(),
                    reason: format!("{}-{} is not a calendar day", month, day),
                });
            }
        }
        Ok(())
    }
}

/// Administrative HTTP surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Serve the admin API.
    pub enabled: bool,
    /// Bind address.
    pub bind_addr: SocketAddr,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Install the Prometheus recorder and expose `/metrics`.
    pub metrics_enabled: bool,
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Configuration of one simulated platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedPlatformConfig {
    /// Platform name, unique per engine.
    pub name: String,
    /// Admission weight in [0, 1].
    pub destruction_probability: f64,
    /// Override of the engine-wide self-healing interval.
    #[serde(default, with = "humantime_serde::option")]
    pub minimum_self_healing_interval: Option<Duration>,
    /// Number of instances to seed the fleet with.
    pub instances: usize,
    /// Zone assigned to seeded instances.
    pub zone: String,
}

impl Default for SimulatedPlatformConfig {
    fn default() -> Self {
        Self {
            name: "simulated".to_string(),
            destruction_probability: 0.2,
            minimum_self_healing_interval: None,
            instances: 3,
            zone: "local-a".to_string(),
        }
    }
}

/// Serde helper for Duration using humantime format.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        } else if let Some(s_val) = s.strip_suffix('s') {
            s_val
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| e.to_string())
        } else if let Some(m) = s.strip_suffix('m') {
            m.parse::<u64>()
                .map(|v| Duration::from_secs(v * 60))
                .map_err(|e| e.to_string())
        } else if let Some(h) = s.strip_suffix('h') {
            h.parse::<u64>()
                .map(|v| Duration::from_secs(v * 3600))
                .map_err(|e| e.to_string())
        } else {
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        }
    }

    /// Same format for `Option<Duration>`.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| super::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
