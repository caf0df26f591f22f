// Refresh schedule.
// A cron expression evaluated in one fixed timezone.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::error::ConfigError;

/// Every six hours on the hour.
pub const DEFAULT_SCHEDULE: &str = "0 0 */6 * * *";
pub const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    expression: String,
    schedule: Schedule,
    timezone: Tz,
}

impl RefreshSchedule {
    /// Parse a six or seven field cron expression (seconds first) and an IANA timezone name.
    pub fn parse(expression: &str, timezone: &str) -> Result<Self, ConfigError> {
        let schedule = Schedule::from_str(expression).map_err(|err| ConfigError::Schedule {
            expression: expression.to_string(),
            reason: err.to_string(),
        })?;
        let timezone = timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(timezone.to_string()))?;

        Ok(Self {
            expression: expression.to_string(),
            schedule,
            timezone,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// First fire time strictly after `after`, in the schedule's timezone.
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Tz>> {
        self.schedule
            .after(&after.with_timezone(&self.timezone))
            .next()
    }

    /// How long to wait from `now` until the next fire.
    pub fn until_next(&self, now: DateTime<Utc>) -> Option<(DateTime<Tz>, Duration)> {
        let next = self.next_fire(now)?;
        let wait = next
            .with_timezone(&Utc)
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        Some((next, wait))
    }
}
