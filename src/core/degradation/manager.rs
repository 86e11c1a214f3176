use super::config::ServiceConfig;
use super::record::{ServiceRecord, ServiceSnapshot};
use crate::base::{GuardError, ServiceStatus, StatusChangeEvent, StatusChangeListener};
use crate::breaker::StateChangeListener;
use crate::fallback::{FallbackChain, FallbackStrategy};
use crate::logging;
use crate::utils::AsAny;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Outcome of a guarded call, distinguishing a degraded-but-functioning
/// response from a primary one so collaborators can decide whether to warn
/// the end user.
#[derive(Debug, Clone, PartialEq)]
pub enum Served<T> {
    /// The primary path answered within its budget.
    Primary(T),
    /// A fallback strategy answered; the service is running degraded.
    Fallback(T),
}

impl<T> Served<T> {
    pub fn into_inner(self) -> T {
        match self {
            Served::Primary(value) | Served::Fallback(value) => value,
        }
    }

    pub fn get(&self) -> &T {
        match self {
            Served::Primary(value) | Served::Fallback(value) => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Served::Fallback(_))
    }
}

/// Result of one service's active health probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub error: Option<String>,
}

// A call admitted through the gate must resolve to some verdict: if the
// caller drops the in-flight future mid-await, the abandoned call counts
// as a failure so a half-open probe can never stay unresolved.
struct VerdictGuard {
    breaker: Arc<crate::breaker::CircuitBreaker>,
    armed: bool,
}

impl VerdictGuard {
    fn new(breaker: Arc<crate::breaker::CircuitBreaker>) -> Self {
        VerdictGuard {
            breaker,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for VerdictGuard {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.record_failure();
        }
    }
}

/// Orchestrates, per registered dependency, a circuit breaker plus an
/// optional fallback chain, and derives the caller-facing service status
/// from their outcomes.
///
/// The manager is an explicitly constructed object: build one, share it
/// (`Arc` or a reference) with the collaborators that perform guarded
/// calls. It exclusively owns its service records; all mutation goes
/// through the public operations below. State is per process and never
/// persisted.
pub struct DegradationManager {
    services: RwLock<HashMap<String, Arc<ServiceRecord>>>,
    listeners: Mutex<Vec<Arc<dyn StatusChangeListener>>>,
}

impl Default for DegradationManager {
    fn default() -> Self {
        DegradationManager::new()
    }
}

impl DegradationManager {
    pub fn new() -> Self {
        DegradationManager {
            services: RwLock::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Registers a dependency under `name` with a fresh breaker built from
    /// `config`. Rejects invalid configs and duplicate names.
    pub fn register_service(&self, name: &str, config: ServiceConfig) -> Result<()> {
        config.is_valid()?;
        let mut services = self.services.write().unwrap();
        if services.contains_key(name) {
            return Err(Error::msg(format!(
                "service {:?} is already registered",
                name
            )));
        }
        logging::info!("[DegradationManager] registered service {:?}", name);
        services.insert(
            name.to_string(),
            Arc::new(ServiceRecord::new(name.to_string(), config)),
        );
        Ok(())
    }

    /// Removes a service and its breaker/chain. Returns whether anything
    /// was removed.
    pub fn unregister_service(&self, name: &str) -> bool {
        let removed = self.services.write().unwrap().remove(name).is_some();
        if removed {
            logging::info!("[DegradationManager] unregistered service {:?}", name);
        }
        removed
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.read().unwrap().keys().cloned().collect()
    }

    /// Builds and attaches a fallback chain for `name`. `strategies` is an
    /// ordered list of `(strategy, priority)`; when the priority is
    /// omitted, a descending priority is derived from list position so
    /// earlier-declared strategies win ties. Replaces any previous chain.
    pub fn register_fallback<T: Send + 'static>(
        &self,
        name: &str,
        strategies: Vec<(Arc<dyn FallbackStrategy<T>>, Option<i32>)>,
    ) -> Result<()> {
        let record = self.lookup(name).ok_or(GuardError::ServiceNotRegistered {
            service: name.to_string(),
        })?;
        let chain = FallbackChain::new(name.to_string());
        let declared = strategies.len();
        for (position, (strategy, priority)) in strategies.into_iter().enumerate() {
            let priority = priority.unwrap_or((declared - position) as i32);
            chain.add_strategy(strategy, priority);
        }
        logging::info!(
            "[DegradationManager] attached {} fallback strategies to {:?}",
            declared,
            name
        );
        record.set_chain(Arc::new(chain));
        Ok(())
    }

    /// Subscribes to service status transitions. Listeners run
    /// synchronously, in registration order, after a transition commits.
    pub fn register_status_listener(&self, listener: Arc<dyn StatusChangeListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// Attaches a breaker state listener to one service's breaker.
    pub fn register_breaker_listener(
        &self,
        name: &str,
        listener: Arc<dyn StateChangeListener>,
    ) -> Result<()> {
        let record = self.lookup(name).ok_or(GuardError::ServiceNotRegistered {
            service: name.to_string(),
        })?;
        record.breaker().register_listener(listener);
        Ok(())
    }

    /// The single entry point for guarded calls.
    ///
    /// Runs `operation` under the service's breaker gate and per-call
    /// timeout. On a primary success the service is healthy and the value
    /// comes back as `Served::Primary`. On any failure (operation error,
    /// timeout, or an open breaker refusing the call) the failure is
    /// recorded first, then the registered fallback chain is walked;
    /// a chain success yields `Served::Fallback` and a degraded status.
    /// Only when every path is exhausted does the caller see an error, and
    /// the service is marked unavailable.
    pub async fn execute<T, F, Fut>(
        &self,
        name: &str,
        operation: F,
    ) -> std::result::Result<Served<T>, GuardError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send,
    {
        let record = match self.lookup(name) {
            Some(record) => record,
            None => {
                return Err(GuardError::ServiceNotRegistered {
                    service: name.to_string(),
                })
            }
        };
        record.on_call();

        let failure = if record.breaker().try_pass() {
            let guard = VerdictGuard::new(Arc::clone(record.breaker()));
            let timeout_ms = record.config().timeout_ms;
            let outcome =
                tokio::time::timeout(Duration::from_millis(timeout_ms), operation()).await;
            // the verdict is recorded below, in call-completion order
            guard.disarm();
            match outcome {
                Ok(Ok(value)) => {
                    record.breaker().record_success();
                    record.mark_success();
                    self.publish(record.set_status(ServiceStatus::Healthy));
                    return Ok(Served::Primary(value));
                }
                Ok(Err(source)) => GuardError::OperationFailed {
                    service: name.to_string(),
                    source,
                },
                Err(_) => GuardError::Timeout {
                    service: name.to_string(),
                    timeout_ms,
                },
            }
        } else {
            // fail fast; the operation is never attempted
            GuardError::CircuitOpen {
                service: name.to_string(),
            }
        };

        // failure recording strictly precedes any fallback attempt
        record.breaker().record_failure();
        record.mark_failure(failure.to_string());

        if let Some(chain) = self.typed_chain::<T>(&record) {
            match chain.execute().await {
                Ok((value, index)) => {
                    logging::info!(
                        "[DegradationManager] {:?} served by fallback strategy {} after: {}",
                        name,
                        index,
                        failure
                    );
                    self.publish(record.set_status(ServiceStatus::Degraded));
                    return Ok(Served::Fallback(value));
                }
                // an empty chain is a misconfiguration, not a recovery
                // path; treat it like an absent chain
                Err(GuardError::NoStrategies { .. }) => {}
                Err(GuardError::FallbackExhausted {
                    capability,
                    attempts,
                    ..
                }) => {
                    self.publish(record.set_status(ServiceStatus::Unavailable));
                    return Err(GuardError::FallbackExhausted {
                        capability,
                        cause: Some(Box::new(failure)),
                        attempts,
                    });
                }
                Err(other) => {
                    self.publish(record.set_status(ServiceStatus::Unavailable));
                    return Err(other);
                }
            }
        }

        self.publish(record.set_status(ServiceStatus::Unavailable));
        Err(failure)
    }

    /// Read-only snapshot of one service, `None` for unknown names.
    pub fn get_service_status(&self, name: &str) -> Option<ServiceSnapshot> {
        self.lookup(name).map(|record| record.snapshot())
    }

    /// Read-only snapshots of every registered service.
    pub fn get_all_status(&self) -> HashMap<String, ServiceSnapshot> {
        self.services
            .read()
            .unwrap()
            .iter()
            .map(|(name, record)| (name.clone(), record.snapshot()))
            .collect()
    }

    /// Whether the service still answers at all (possibly degraded).
    /// Unknown names are unavailable.
    pub fn is_available(&self, name: &str) -> bool {
        self.lookup(name)
            .map(|record| record.status() != ServiceStatus::Unavailable)
            .unwrap_or(false)
    }

    /// Whether the primary path answered most recently.
    pub fn is_healthy(&self, name: &str) -> bool {
        self.lookup(name)
            .map(|record| record.status() == ServiceStatus::Healthy)
            .unwrap_or(false)
    }

    /// Administrative recovery: zeroes statistics and returns the breaker
    /// and fallback chain to their initial state.
    pub fn reset_service(&self, name: &str) -> Result<()> {
        let record = self.lookup(name).ok_or(GuardError::ServiceNotRegistered {
            service: name.to_string(),
        })?;
        record.reset_stats();
        record.breaker().reset();
        if let Some(chain) = record.chain() {
            chain.reset();
        }
        self.publish(record.set_status(ServiceStatus::Healthy));
        logging::info!("[DegradationManager] service {:?} reset", name);
        Ok(())
    }

    /// Actively probes every service with a configured health check,
    /// independent of `execute` traffic. A probe success marks the service
    /// healthy, a failure or probe timeout marks it unavailable. Intended
    /// to be scheduled on a fixed interval by the caller.
    pub async fn run_health_checks(&self) -> HashMap<String, HealthReport> {
        let records: Vec<Arc<ServiceRecord>> =
            self.services.read().unwrap().values().cloned().collect();
        let mut reports = HashMap::with_capacity(records.len());
        for record in records {
            let check = match record.config().health_check.clone() {
                Some(check) => check,
                None => continue,
            };
            let timeout_ms = record.config().timeout_ms;
            let outcome =
                tokio::time::timeout(Duration::from_millis(timeout_ms), check.check()).await;
            record.touch();
            let report = match outcome {
                Ok(Ok(())) => {
                    self.publish(record.set_status(ServiceStatus::Healthy));
                    HealthReport {
                        healthy: true,
                        error: None,
                    }
                }
                Ok(Err(err)) => self.probe_failed(&record, err.to_string()),
                Err(_) => self.probe_failed(
                    &record,
                    format!("health check timed out after {}ms", timeout_ms),
                ),
            };
            reports.insert(record.name().to_string(), report);
        }
        reports
    }

    fn probe_failed(&self, record: &Arc<ServiceRecord>, message: String) -> HealthReport {
        logging::warn!(
            "[DegradationManager] health check failed for {:?}: {}",
            record.name(),
            message
        );
        record.note_error(message.clone());
        self.publish(record.set_status(ServiceStatus::Unavailable));
        HealthReport {
            healthy: false,
            error: Some(message),
        }
    }

    fn lookup(&self, name: &str) -> Option<Arc<ServiceRecord>> {
        self.services.read().unwrap().get(name).cloned()
    }

    fn typed_chain<T: Send + 'static>(
        &self,
        record: &Arc<ServiceRecord>,
    ) -> Option<Arc<FallbackChain<T>>> {
        let chain = record.chain()?;
        match chain.as_any_arc().downcast::<FallbackChain<T>>() {
            Ok(typed) => Some(typed),
            Err(_) => {
                logging::FREQUENT_ERROR_ONCE.call_once(|| {
                    logging::error!(
                        "[DegradationManager] fallback chain for {:?} holds a different value type than the caller requested; treating the chain as unregistered",
                        record.name()
                    );
                });
                None
            }
        }
    }

    fn publish(&self, event: Option<StatusChangeEvent>) {
        let event = match event {
            Some(event) => event,
            None => return,
        };
        logging::info!(
            "[DegradationManager] {:?} status {} -> {}",
            event.service,
            event.old_status,
            event.new_status
        );
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener.on_status_change(&event);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::breaker::{MockStateListener, State};
    use crate::fallback::FnStrategy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick_config(failure_threshold: u32) -> ServiceConfig {
        ServiceConfig {
            failure_threshold,
            success_threshold: 2,
            reset_timeout_ms: 40,
            timeout_ms: 50,
            ..Default::default()
        }
    }

    fn string_strategy(
        value: &'static str,
        succeed: bool,
    ) -> Arc<dyn FallbackStrategy<String>> {
        Arc::new(FnStrategy::new(move || async move {
            let result: Result<String> = if succeed {
                Ok(value.to_string())
            } else {
                Err(Error::msg(value))
            };
            result
        }))
    }

    #[tokio::test]
    async fn unknown_service_is_rejected() {
        let manager = DegradationManager::new();
        let err = manager
            .execute::<u32, _, _>("nope", || async { Ok(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::ServiceNotRegistered { .. }));
        assert!(!manager.is_available("nope"));
        assert!(manager.get_service_status("nope").is_none());
    }

    #[tokio::test]
    async fn primary_success_is_healthy() {
        let manager = DegradationManager::new();
        manager.register_service("search", quick_config(3)).unwrap();
        let served = manager
            .execute("search", || async { Ok::<_, Error>(42u32) })
            .await
            .unwrap();
        assert_eq!(served, Served::Primary(42));
        assert!(!served.is_degraded());
        assert!(manager.is_healthy("search"));
        let snapshot = manager.get_service_status("search").unwrap();
        assert_eq!(snapshot.stats.total_calls, 1);
        assert_eq!(snapshot.stats.success_calls, 1);
    }

    // Scenario: threshold 3, three failed calls trip the breaker; the
    // fourth is refused without invoking the operation.
    #[tokio::test]
    async fn breaker_refuses_after_threshold() {
        let manager = DegradationManager::new();
        manager.register_service("db", quick_config(3)).unwrap();
        let invocations = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let invocations = Arc::clone(&invocations);
            let err = manager
                .execute::<u32, _, _>("db", move || async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    Err(Error::msg("down"))
                })
                .await
                .unwrap_err();
            assert!(matches!(err, GuardError::OperationFailed { .. }));
        }
        let snapshot = manager.get_service_status("db").unwrap();
        assert_eq!(snapshot.breaker.state, State::Open);
        assert_eq!(snapshot.status, ServiceStatus::Unavailable);

        let fourth = Arc::clone(&invocations);
        let err = manager
            .execute::<u32, _, _>("db", move || async move {
                fourth.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .await
            .unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
    }

    // Scenario: after the reset timeout the next call probes in HalfOpen;
    // with success_threshold 2 it takes two consecutive successes to close.
    #[tokio::test]
    async fn probe_recovers_after_reset_timeout() {
        let manager = DegradationManager::new();
        manager.register_service("db", quick_config(1)).unwrap();
        let _ = manager
            .execute::<u32, _, _>("db", || async { Err(Error::msg("down")) })
            .await;
        assert_eq!(
            manager.get_service_status("db").unwrap().breaker.state,
            State::Open
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        manager
            .execute("db", || async { Ok::<_, Error>(1u32) })
            .await
            .unwrap();
        assert_eq!(
            manager.get_service_status("db").unwrap().breaker.state,
            State::HalfOpen
        );
        manager
            .execute("db", || async { Ok::<_, Error>(2u32) })
            .await
            .unwrap();
        assert_eq!(
            manager.get_service_status("db").unwrap().breaker.state,
            State::Closed
        );
        assert!(manager.is_healthy("db"));
    }

    // Scenario: primary fails, the cache strategy returns "X"; the caller
    // gets the cached value and the service is degraded, not unavailable.
    #[tokio::test]
    async fn fallback_absorbs_primary_failure() {
        let manager = DegradationManager::new();
        manager.register_service("search", quick_config(5)).unwrap();
        manager
            .register_fallback(
                "search",
                vec![
                    (string_strategy("replica down", false), None),
                    (string_strategy("X", true), None),
                ],
            )
            .unwrap();

        let served = manager
            .execute::<String, _, _>("search", || async { Err(Error::msg("primary down")) })
            .await
            .unwrap();
        assert_eq!(served, Served::Fallback("X".to_string()));
        assert!(served.is_degraded());
        let snapshot = manager.get_service_status("search").unwrap();
        assert_eq!(snapshot.status, ServiceStatus::Degraded);
        assert_eq!(snapshot.fallback_strategies, 2);
        assert!(manager.is_available("search"));
        assert!(!manager.is_healthy("search"));
    }

    // Scenario: no chain registered; a timeout surfaces unchanged and the
    // service becomes unavailable.
    #[tokio::test]
    async fn timeout_without_fallback_surfaces() {
        let manager = DegradationManager::new();
        manager.register_service("search", quick_config(5)).unwrap();
        let err = manager
            .execute::<u32, _, _>("search", || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(1)
            })
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        let snapshot = manager.get_service_status("search").unwrap();
        assert_eq!(snapshot.status, ServiceStatus::Unavailable);
        assert!(snapshot.stats.last_error.is_some());
        assert!(!manager.is_available("search"));
    }

    #[tokio::test]
    async fn exhausted_chain_carries_primary_failure() {
        let manager = DegradationManager::new();
        manager.register_service("audio", quick_config(5)).unwrap();
        manager
            .register_fallback(
                "audio",
                vec![
                    (string_strategy("first", false), Some(2)),
                    (string_strategy("second", false), Some(1)),
                ],
            )
            .unwrap();
        let err = manager
            .execute::<String, _, _>("audio", || async { Err(Error::msg("primary down")) })
            .await
            .unwrap_err();
        match &err {
            GuardError::FallbackExhausted { attempts, cause, .. } => {
                assert_eq!(attempts.len(), 2);
                assert!(cause.is_some());
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(matches!(
            err.root_failure(),
            GuardError::OperationFailed { .. }
        ));
        assert_eq!(
            manager.get_service_status("audio").unwrap().status,
            ServiceStatus::Unavailable
        );
    }

    #[tokio::test]
    async fn mismatched_chain_type_is_ignored() {
        let manager = DegradationManager::new();
        manager.register_service("search", quick_config(5)).unwrap();
        manager
            .register_fallback("search", vec![(string_strategy("X", true), None)])
            .unwrap();
        // the chain serves String; a u32 call cannot use it
        let err = manager
            .execute::<u32, _, _>("search", || async { Err(Error::msg("primary down")) })
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::OperationFailed { .. }));
    }

    // Scenario: a failing health check marks the service unavailable even
    // though no call was ever executed.
    #[tokio::test]
    async fn health_check_failure_marks_unavailable() {
        let manager = DegradationManager::new();
        let config = ServiceConfig {
            failure_threshold: 3,
            ..Default::default()
        }
        .with_health_check(crate::degradation::HealthCheck::new(|| async {
            Err(Error::msg("probe refused"))
        }));
        manager.register_service("db", config).unwrap();
        manager
            .register_service("no_probe", ServiceConfig::default())
            .unwrap();

        let reports = manager.run_health_checks().await;
        assert_eq!(reports.len(), 1);
        let report = &reports["db"];
        assert!(!report.healthy);
        assert_eq!(report.error.as_deref(), Some("probe refused"));
        assert_eq!(
            manager.get_service_status("db").unwrap().status,
            ServiceStatus::Unavailable
        );
        // services without a probe are left untouched
        assert!(manager.is_healthy("no_probe"));
    }

    #[tokio::test]
    async fn health_check_success_recovers_status() {
        let manager = DegradationManager::new();
        let config = quick_config(1).with_health_check(crate::degradation::HealthCheck::new(
            || async { Ok(()) },
        ));
        manager.register_service("db", config).unwrap();
        let _ = manager
            .execute::<u32, _, _>("db", || async { Err(Error::msg("down")) })
            .await;
        assert!(!manager.is_available("db"));
        let reports = manager.run_health_checks().await;
        assert!(reports["db"].healthy);
        assert!(manager.is_healthy("db"));
    }

    #[tokio::test]
    async fn snapshots_are_idempotent() {
        let manager = DegradationManager::new();
        manager.register_service("search", quick_config(3)).unwrap();
        let _ = manager
            .execute::<u32, _, _>("search", || async { Err(Error::msg("down")) })
            .await;
        let a = manager.get_service_status("search").unwrap();
        let b = manager.get_service_status("search").unwrap();
        assert_eq!(a.stats.total_calls, b.stats.total_calls);
        assert_eq!(a.stats.last_error, b.stats.last_error);
        assert_eq!(a.breaker.failure_count, b.breaker.failure_count);
        assert_eq!(a.status, b.status);
    }

    #[tokio::test]
    async fn reset_restores_initial_state() {
        let manager = DegradationManager::new();
        manager.register_service("db", quick_config(1)).unwrap();
        let _ = manager
            .execute::<u32, _, _>("db", || async { Err(Error::msg("down")) })
            .await;
        let snapshot = manager.get_service_status("db").unwrap();
        assert_eq!(snapshot.breaker.state, State::Open);
        assert_eq!(snapshot.stats.failure_calls, 1);

        manager.reset_service("db").unwrap();
        let snapshot = manager.get_service_status("db").unwrap();
        assert_eq!(snapshot.breaker.state, State::Closed);
        assert_eq!(snapshot.stats.total_calls, 0);
        assert!(snapshot.stats.last_error.is_none());
        assert!(manager.is_healthy("db"));

        // the breaker accepts traffic again
        manager
            .execute("db", || async { Ok::<_, Error>(1u32) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn abandoned_call_counts_as_failure() {
        let manager = DegradationManager::new();
        manager.register_service("db", quick_config(1)).unwrap();
        let call = manager.execute::<u32, _, _>("db", || futures::future::pending());
        // poll the guarded call briefly, then drop it mid-flight
        let _ = tokio::time::timeout(Duration::from_millis(10), call).await;
        assert_eq!(
            manager.get_service_status("db").unwrap().breaker.state,
            State::Open
        );
    }

    #[tokio::test]
    async fn status_listener_observes_transitions() {
        struct Recorder {
            events: Mutex<Vec<(ServiceStatus, ServiceStatus)>>,
        }
        impl StatusChangeListener for Recorder {
            fn on_status_change(&self, event: &StatusChangeEvent) {
                self.events
                    .lock()
                    .unwrap()
                    .push((event.old_status, event.new_status));
            }
        }

        let manager = DegradationManager::new();
        let recorder = Arc::new(Recorder {
            events: Mutex::new(Vec::new()),
        });
        manager.register_status_listener(Arc::clone(&recorder) as Arc<dyn StatusChangeListener>);
        manager.register_service("search", quick_config(5)).unwrap();

        let _ = manager
            .execute::<u32, _, _>("search", || async { Err(Error::msg("down")) })
            .await;
        manager
            .execute("search", || async { Ok::<_, Error>(1u32) })
            .await
            .unwrap();
        // repeat success: no duplicate event for an unchanged status
        manager
            .execute("search", || async { Ok::<_, Error>(2u32) })
            .await
            .unwrap();

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                (ServiceStatus::Healthy, ServiceStatus::Unavailable),
                (ServiceStatus::Unavailable, ServiceStatus::Healthy),
            ]
        );
    }

    #[tokio::test]
    async fn breaker_listener_fires_through_manager() {
        let mut listener = MockStateListener::new();
        listener
            .expect_on_transform_to_open()
            .withf(|prev, resource, failures| {
                *prev == State::Closed && resource == "db" && *failures == 2
            })
            .times(1)
            .returning(|_, _, _| ());

        let manager = DegradationManager::new();
        manager.register_service("db", quick_config(2)).unwrap();
        manager
            .register_breaker_listener("db", Arc::new(listener))
            .unwrap();
        for _ in 0..2 {
            let _ = manager
                .execute::<u32, _, _>("db", || async { Err(Error::msg("down")) })
                .await;
        }
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let manager = DegradationManager::new();
        manager.register_service("db", quick_config(3)).unwrap();
        assert!(manager.register_service("db", quick_config(3)).is_err());
        assert!(manager
            .register_fallback::<String>("missing", vec![])
            .is_err());
        assert!(manager.unregister_service("db"));
        assert!(!manager.unregister_service("db"));
    }
}
