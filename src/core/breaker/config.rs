use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;
pub const DEFAULT_RESET_TIMEOUT_MS: u64 = 30_000;

/// `BreakerConfig` encompasses the tunables of one circuit breaker.
/// Immutable after the breaker is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Number of consecutive failures in `Closed` that trips the breaker
    /// to `Open`.
    pub failure_threshold: u32,
    /// Number of consecutive probe successes in `HalfOpen` required before
    /// the breaker closes again. One success is not enough evidence of
    /// recovery, so this is typically >= 2.
    pub success_threshold: u32,
    /// `reset_timeout_ms` represents recovery timeout (in milliseconds)
    /// after the circuit breaker opens. During the open period no requests
    /// are permitted; once it has elapsed the breaker transforms to
    /// half-open on the next gate check and lets a probe through.
    pub reset_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            reset_timeout_ms: DEFAULT_RESET_TIMEOUT_MS,
        }
    }
}

impl BreakerConfig {
    pub fn is_valid(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(Error::msg("invalid failure_threshold (must be >= 1)"));
        }
        if self.success_threshold == 0 {
            return Err(Error::msg("invalid success_threshold (must be >= 1)"));
        }
        if self.reset_timeout_ms == 0 {
            return Err(Error::msg("invalid reset_timeout_ms"));
        }
        Ok(())
    }
}

impl fmt::Display for BreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap();
        write!(f, "{}", fmtted)
    }
}
