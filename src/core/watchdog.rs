//! Inactivity watchdog that ends a recording run after sustained idleness.

use crate::config::ConfigError;
use chrono::{DateTime, Duration, Utc};

/// Default idle period before a run auto-stops.
pub const DEFAULT_INACTIVITY_MINUTES: u64 = 45;

#[derive(Debug, Clone)]
pub struct InactivityWatchdog {
    timeout: Duration,
    last_activity: DateTime<Utc>,
    fired: bool,
}

impl InactivityWatchdog {
    /// Arm a watchdog at `now`. The timeout must be strictly positive.
    pub fn new(timeout: std::time::Duration, now: DateTime<Utc>) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "inactivity timeout must be greater than zero".to_string(),
            ));
        }
        let timeout = Duration::from_std(timeout)
            .map_err(|e| ConfigError::Invalid(format!("inactivity timeout out of range: {e}")))?;

        Ok(Self {
            timeout,
            last_activity: now,
            fired: false,
        })
    }

    /// Record activity. Stale timestamps never move the deadline backwards.
    pub fn reset(&mut self, at: DateTime<Utc>) {
        if at > self.last_activity {
            self.last_activity = at;
        }
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.last_activity + self.timeout
    }

    /// Returns true exactly once, on the first check at or past the deadline.
    pub fn check(&mut self, now: DateTime<Utc>) -> bool {
        if self.fired || now < self.deadline() {
            return false;
        }
        self.fired = true;
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_activity
    }
}
