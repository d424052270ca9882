// ABOUTME: Health gate policy configuration.
// ABOUTME: Defaults mirror a load balancer target group: /health, 2xx, 2 passes.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HealthPolicyError {
    #[error("status range is inverted: {min} > {max}")]
    InvertedStatusRange { min: u16, max: u16 },

    #[error("consecutive_successes must be at least 1")]
    ZeroSuccesses,

    #[error("min_new_fraction must be within (0, 1], got {0}")]
    BadFraction(f64),
}

/// HTTP status codes counted as a probe success.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct StatusRange {
    pub min: u16,
    pub max: u16,
}

impl StatusRange {
    pub fn contains(&self, status: u16) -> bool {
        (self.min..=self.max).contains(&status)
    }
}

impl Default for StatusRange {
    fn default() -> Self {
        Self { min: 200, max: 299 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthPolicy {
    /// Probe path on each instance.
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default)]
    pub status: StatusRange,

    /// Probe rounds that must succeed back-to-back before Pass.
    /// A single failed round resets the count.
    #[serde(default = "default_consecutive_successes")]
    pub consecutive_successes: u32,

    /// Probe rounds that must fail back-to-back before Fail.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Per-probe deadline; a probe exceeding it counts as a failed round.
    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Overall gate deadline.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Fraction of the instance group that must be running the new tag
    /// before any verdict is reached. Guards against reading a
    /// partially-failed rollout as healthy because old instances answer.
    #[serde(default = "default_min_new_fraction")]
    pub min_new_fraction: f64,
}

fn default_path() -> String {
    "/health".to_string()
}

fn default_consecutive_successes() -> u32 {
    2
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_min_new_fraction() -> f64 {
    0.5
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            path: default_path(),
            status: StatusRange::default(),
            consecutive_successes: default_consecutive_successes(),
            failure_threshold: default_failure_threshold(),
            interval: default_interval(),
            probe_timeout: default_probe_timeout(),
            timeout: default_timeout(),
            min_new_fraction: default_min_new_fraction(),
        }
    }
}

impl HealthPolicy {
    pub fn validate(&self) -> Result<(), HealthPolicyError> {
        if self.status.min > self.status.max {
            return Err(HealthPolicyError::InvertedStatusRange {
                min: self.status.min,
                max: self.status.max,
            });
        }
        if self.consecutive_successes == 0 {
            return Err(HealthPolicyError::ZeroSuccesses);
        }
        if !(self.min_new_fraction > 0.0 && self.min_new_fraction <= 1.0) {
            return Err(HealthPolicyError::BadFraction(self.min_new_fraction));
        }
        Ok(())
    }

    /// The reduced policy used to verify a rollback: a single verdict,
    /// no retries, bounded by one probe window.
    pub fn reduced(&self) -> HealthPolicy {
        HealthPolicy {
            consecutive_successes: 1,
            failure_threshold: 1,
            timeout: self.probe_timeout + self.interval,
            ..self.clone()
        }
    }
}
