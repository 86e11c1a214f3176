use super::config::ServiceConfig;
use crate::base::{ServiceStatus, StatusChangeEvent};
use crate::breaker::{BreakerStats, CircuitBreaker};
use crate::fallback::ChainControl;
use crate::utils;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Call statistics for one registered dependency.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceStats {
    pub total_calls: u64,
    pub success_calls: u64,
    pub failure_calls: u64,
    pub last_error: Option<String>,
    /// Wall-clock ms of the most recent call or health probe.
    pub last_checked_ms: u64,
}

/// Read-only view combining a service's record with its breaker stats.
/// Two snapshots taken without an intervening call or health check are
/// identical.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSnapshot {
    pub name: String,
    pub status: ServiceStatus,
    pub stats: ServiceStats,
    pub breaker: BreakerStats,
    /// Number of fallback strategies attached, 0 when no chain exists.
    pub fallback_strategies: usize,
}

/// Per-dependency state owned exclusively by the `DegradationManager`.
/// All mutation happens through the manager's public operations; records
/// are never handed out.
pub(crate) struct ServiceRecord {
    name: String,
    config: ServiceConfig,
    breaker: Arc<CircuitBreaker>,
    chain: RwLock<Option<Arc<dyn ChainControl>>>,
    status: Mutex<ServiceStatus>,
    total_calls: AtomicU64,
    success_calls: AtomicU64,
    failure_calls: AtomicU64,
    last_error: Mutex<Option<String>>,
    last_checked_ms: AtomicU64,
}

impl ServiceRecord {
    pub(crate) fn new(name: String, config: ServiceConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(name.clone(), config.breaker_config()));
        ServiceRecord {
            name,
            config,
            breaker,
            chain: RwLock::new(None),
            status: Mutex::new(ServiceStatus::default()),
            total_calls: AtomicU64::new(0),
            success_calls: AtomicU64::new(0),
            failure_calls: AtomicU64::new(0),
            last_error: Mutex::new(None),
            last_checked_ms: AtomicU64::new(0),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub(crate) fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub(crate) fn chain(&self) -> Option<Arc<dyn ChainControl>> {
        self.chain.read().unwrap().clone()
    }

    pub(crate) fn set_chain(&self, chain: Arc<dyn ChainControl>) {
        *self.chain.write().unwrap() = Some(chain);
    }

    pub(crate) fn status(&self) -> ServiceStatus {
        *self.status.lock().unwrap()
    }

    /// Commits a status transition and returns the event to publish, or
    /// `None` when the status did not actually change.
    pub(crate) fn set_status(&self, new_status: ServiceStatus) -> Option<StatusChangeEvent> {
        let mut status = self.status.lock().unwrap();
        let old_status = *status;
        if old_status == new_status {
            return None;
        }
        *status = new_status;
        drop(status);
        Some(StatusChangeEvent::new(
            self.name.clone(),
            old_status,
            new_status,
        ))
    }

    pub(crate) fn on_call(&self) {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        self.touch();
    }

    pub(crate) fn touch(&self) {
        self.last_checked_ms
            .store(utils::curr_time_millis(), Ordering::SeqCst);
    }

    pub(crate) fn mark_success(&self) {
        self.success_calls.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn mark_failure(&self, message: String) {
        self.failure_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_error.lock().unwrap() = Some(message);
    }

    /// Records an error observed outside the call path (health probes).
    pub(crate) fn note_error(&self, message: String) {
        *self.last_error.lock().unwrap() = Some(message);
    }

    pub(crate) fn reset_stats(&self) {
        self.total_calls.store(0, Ordering::SeqCst);
        self.success_calls.store(0, Ordering::SeqCst);
        self.failure_calls.store(0, Ordering::SeqCst);
        *self.last_error.lock().unwrap() = None;
        self.last_checked_ms.store(0, Ordering::SeqCst);
    }

    pub(crate) fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            name: self.name.clone(),
            status: self.status(),
            stats: ServiceStats {
                total_calls: self.total_calls.load(Ordering::SeqCst),
                success_calls: self.success_calls.load(Ordering::SeqCst),
                failure_calls: self.failure_calls.load(Ordering::SeqCst),
                last_error: self.last_error.lock().unwrap().clone(),
                last_checked_ms: self.last_checked_ms.load(Ordering::SeqCst),
            },
            breaker: self.breaker.stats(),
            fallback_strategies: self.chain().map(|chain| chain.strategy_count()).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_transition_yields_one_event() {
        let record = ServiceRecord::new("search".into(), ServiceConfig::default());
        assert_eq!(record.status(), ServiceStatus::Healthy);
        let event = record.set_status(ServiceStatus::Degraded).unwrap();
        assert_eq!(event.old_status, ServiceStatus::Healthy);
        assert_eq!(event.new_status, ServiceStatus::Degraded);
        // same status again is not a transition
        assert!(record.set_status(ServiceStatus::Degraded).is_none());
    }

    #[test]
    fn reset_zeroes_statistics() {
        let record = ServiceRecord::new("search".into(), ServiceConfig::default());
        record.on_call();
        record.mark_failure("boom".into());
        assert_eq!(record.snapshot().stats.failure_calls, 1);
        record.reset_stats();
        let stats = record.snapshot().stats;
        assert_eq!(stats.total_calls, 0);
        assert_eq!(stats.failure_calls, 0);
        assert!(stats.last_error.is_none());
    }
}
