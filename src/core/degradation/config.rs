use crate::breaker::BreakerConfig;
use crate::{Result, Error};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 30_000;

/// A no-argument probe invoked by the health-check sweep, independent of
/// `execute` traffic. Success marks the service healthy, failure marks it
/// unavailable.
#[derive(Clone)]
pub struct HealthCheck {
    f: Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>,
}

impl HealthCheck {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        HealthCheck {
            f: Arc::new(move || -> BoxFuture<'static, Result<()>> { Box::pin(f()) }),
        }
    }

    pub(crate) fn check(&self) -> BoxFuture<'static, Result<()>> {
        (self.f)()
    }
}

impl fmt::Debug for HealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HealthCheck(..)")
    }
}

/// `ServiceConfig` encompasses the per-dependency tunables consumed at
/// `register_service` time. Every field is optional over serde with the
/// documented default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Consecutive failures that trip the breaker open.
    pub failure_threshold: u32,
    /// Consecutive probe successes required to close a half-open breaker.
    pub success_threshold: u32,
    /// How long a tripped breaker refuses calls before probing (in ms).
    pub reset_timeout_ms: u64,
    /// Per-call budget for the guarded operation and for health probes (in
    /// ms). A call that overruns it is a failure for breaker purposes even
    /// though the underlying operation may keep running in the background.
    pub timeout_ms: u64,
    /// Suggested cadence for the `run_health_checks` sweep. Scheduling the
    /// sweep is the caller's responsibility; this crate never owns timers.
    pub health_check_interval_ms: u64,
    /// Passed through untouched for callers that wrap their own retry
    /// loop around `execute`; the manager itself never retries.
    pub retries: u32,
    #[serde(skip)]
    pub health_check: Option<HealthCheck>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            failure_threshold: crate::breaker::DEFAULT_FAILURE_THRESHOLD,
            success_threshold: crate::breaker::DEFAULT_SUCCESS_THRESHOLD,
            reset_timeout_ms: crate::breaker::DEFAULT_RESET_TIMEOUT_MS,
            timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            health_check_interval_ms: DEFAULT_HEALTH_CHECK_INTERVAL_MS,
            retries: 0,
            health_check: None,
        }
    }
}

impl ServiceConfig {
    pub fn with_health_check(mut self, check: HealthCheck) -> Self {
        self.health_check = Some(check);
        self
    }

    pub fn is_valid(&self) -> Result<()> {
        self.breaker_config().is_valid()?;
        if self.timeout_ms == 0 {
            return Err(Error::msg("invalid timeout_ms"));
        }
        Ok(())
    }

    pub(crate) fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            reset_timeout_ms: self.reset_timeout_ms,
        }
    }
}

impl fmt::Display for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap();
        write!(f, "{}", fmtted)
    }
}
