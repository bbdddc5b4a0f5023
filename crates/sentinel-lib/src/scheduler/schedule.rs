//! Wall-clock schedules for the reconciliation job

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::anomaly::floor_to_hour;

/// Default grace period after which a late tick is dropped
pub const DEFAULT_MISFIRE_GRACE: Duration = Duration::from_secs(180);

/// When the job fires, in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Minute 0 of every hour
    Hourly,
    /// Minutes divisible by `n` within each hour, like cron `*/n`
    EveryMinutes(u32),
}

impl Schedule {
    /// Hourly unless a development cadence is configured
    pub fn from_dev_minutes(dev_minutes: Option<u32>) -> Self {
        match dev_minutes {
            Some(n) if n > 0 => Schedule::EveryMinutes(n.min(60)),
            _ => Schedule::Hourly,
        }
    }

    /// First fire time strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let step = match self {
            Schedule::Hourly => 60,
            Schedule::EveryMinutes(n) => i64::from((*n).clamp(1, 60)),
        };

        let hour = floor_to_hour(after);
        let elapsed = (after - hour).num_minutes();
        let slot = (elapsed / step + 1) * step;

        if slot < 60 {
            hour + TimeDelta::minutes(slot)
        } else {
            hour + TimeDelta::hours(1)
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Hourly => f.write_str("minute=0"),
            Schedule::EveryMinutes(n) => write!(f, "minute=*/{n}"),
        }
    }
}

/// Whether a tick that should have fired at `scheduled` is too late at `fired`
pub fn is_misfire(scheduled: DateTime<Utc>, fired: DateTime<Utc>, grace: Duration) -> bool {
    match (fired - scheduled).to_std() {
        Ok(lateness) => lateness > grace,
        Err(_) => false,
    }
}
