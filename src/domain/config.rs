use crate::error::{PollError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default delay between checks for payment and verification flows.
pub const DEFAULT_INTERVAL_MS: u64 = 3_000;
/// 100 attempts at 3s is roughly a five minute wait budget.
pub const PAYMENT_MAX_ATTEMPTS: u32 = 100;
pub const VERIFICATION_MAX_ATTEMPTS: u32 = 40;

/// How a session reacts when the status check itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Record the error, count the attempt and keep polling.
    #[default]
    Retry,
    /// Count the attempt without recording or reporting the error.
    Ignore,
    /// End the session as `Failed` on the first error.
    Stop,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorPolicy::Retry => "retry",
            ErrorPolicy::Ignore => "ignore",
            ErrorPolicy::Stop => "stop",
        };
        f.write_str(name)
    }
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retry" => Ok(ErrorPolicy::Retry),
            "ignore" => Ok(ErrorPolicy::Ignore),
            "stop" => Ok(ErrorPolicy::Stop),
            other => Err(format!(
                "unknown error policy '{other}' (expected retry, ignore or stop)"
            )),
        }
    }
}

/// Timing and termination settings for one poll session.
///
/// Deserializes from JSON; missing fields fall back to the payment preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay between the end of one check and the start of the next.
    /// Zero means back-to-back checks.
    pub interval_ms: u64,
    /// Ceiling on the number of checks; must be positive.
    pub max_attempts: u32,
    pub error_policy: ErrorPolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::payment()
    }
}

impl PollConfig {
    pub fn new(interval_ms: u64, max_attempts: u32) -> Self {
        Self {
            interval_ms,
            max_attempts,
            error_policy: ErrorPolicy::default(),
        }
    }

    /// Payment confirmation: 3s interval, 100 attempts.
    pub fn payment() -> Self {
        Self::new(DEFAULT_INTERVAL_MS, PAYMENT_MAX_ATTEMPTS)
    }

    /// Bank account and identity verification: 3s interval, 40 attempts.
    pub fn verification() -> Self {
        Self::new(DEFAULT_INTERVAL_MS, VERIFICATION_MAX_ATTEMPTS)
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(PollError::InvalidConfig(
                "max_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Reads a config from a JSON document, on top of the payment preset.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::default().merge_json(json)
    }

    /// Overlays the fields present in a JSON document on top of `self`.
    pub fn merge_json(self, json: &str) -> Result<Self> {
        let overlay: PollConfigOverlay = serde_json::from_str(json)?;
        let config = Self {
            interval_ms: overlay.interval_ms.unwrap_or(self.interval_ms),
            max_attempts: overlay.max_attempts.unwrap_or(self.max_attempts),
            error_policy: overlay.error_policy.unwrap_or(self.error_policy),
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PollConfigOverlay {
    interval_ms: Option<u64>,
    max_attempts: Option<u32>,
    error_policy: Option<ErrorPolicy>,
}
