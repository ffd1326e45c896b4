//! Temporal suppression of new experiments.
//!
//! Consulted only when admitting new experiments. Experiments that are
//! already running are carried to completion when a suppression window
//! opens.

use crate::config::CalendarConfig;
use crate::error::{ChaosError, Result};
use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};

/// Decides whether the current moment is a bad time to disrupt anything.
pub trait TemporalSuppression: Send + Sync {
    fn is_holiday(&self) -> bool;

    fn is_outside_working_hours(&self) -> bool;

    fn is_suppressed(&self) -> bool {
        self.is_holiday() || self.is_outside_working_hours()
    }
}

/// Never suppresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOn;

impl TemporalSuppression for AlwaysOn {
    fn is_holiday(&self) -> bool {
        false
    }

    fn is_outside_working_hours(&self) -> bool {
        false
    }
}

/// Holiday list plus working days and hours in a fixed UTC offset.
#[derive(Debug, Clone)]
pub struct HolidayCalendar {
    config: CalendarConfig,
    offset: FixedOffset,
}

impl HolidayCalendar {
    pub fn new(config: CalendarConfig) -> Result<Self> {
        let offset = config
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ChaosError::InvalidConfig {
                field: "calendar.utc_offset_minutes".to_string(),
                reason: format!("{} is not a valid offset", config.utc_offset_minutes),
            })?;
        Ok(Self { config, offset })
    }

    pub fn is_holiday_at(&self, now: DateTime<Utc>) -> bool {
        if !self.config.enabled {
            return false;
        }
        let date = now.with_timezone(&self.offset).date_naive();
        self.config.holidays.contains(&date)
            || self
                .config
                .recurring_holidays
                .contains(&(date.month(), date.day()))
    }

    pub fn is_outside_working_hours_at(&self, now: DateTime<Utc>) -> bool {
        if !self.config.enabled {
            return false;
        }
        let local = now.with_timezone(&self.offset);
        let hour = local.hour();
        !self.config.working_days.contains(&local.weekday())
            || hour < self.config.start_hour
            || hour >= self.config.end_hour
    }
}

impl TemporalSuppression for HolidayCalendar {
    fn is_holiday(&self) -> bool {
        self.is_holiday_at(Utc::now())
    }

    fn is_outside_working_hours(&self) -> bool {
        self.is_outside_working_hours_at(Utc::now())
    }
}
