use crate::utils;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-facing classification of a registered dependency, derived from
/// breaker and fallback outcomes rather than reported by the dependency
/// itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceStatus {
    /// The primary path answered the most recent call or health check.
    Healthy,
    /// The service keeps responding, but via a lower-quality fallback path.
    Degraded,
    /// Every available path is exhausted; calls surface errors.
    Unavailable,
}

impl Default for ServiceStatus {
    fn default() -> ServiceStatus {
        ServiceStatus::Healthy
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Payload delivered to `StatusChangeListener`s whenever a service moves
/// between `Healthy`, `Degraded` and `Unavailable`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusChangeEvent {
    pub service: String,
    pub old_status: ServiceStatus,
    pub new_status: ServiceStatus,
    /// Wall-clock milliseconds at the moment of the transition.
    pub timestamp_ms: u64,
}

impl StatusChangeEvent {
    pub fn new(service: String, old_status: ServiceStatus, new_status: ServiceStatus) -> Self {
        StatusChangeEvent {
            service,
            old_status,
            new_status,
            timestamp_ms: utils::curr_time_millis(),
        }
    }
}

/// `StatusChangeListener` listens on service status transitions.
///
/// Listeners are registered on a `DegradationManager` instance and invoked
/// synchronously, in registration order, after the transition has been
/// recorded. Logging, alerting and UI surfaces subscribe here; the core
/// never needs to know about them.
pub trait StatusChangeListener: Send + Sync {
    fn on_status_change(&self, event: &StatusChangeEvent);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn event_carries_transition() {
        let event = StatusChangeEvent::new(
            "search".into(),
            ServiceStatus::Healthy,
            ServiceStatus::Degraded,
        );
        assert_eq!(event.old_status, ServiceStatus::Healthy);
        assert_eq!(event.new_status, ServiceStatus::Degraded);
        assert!(event.timestamp_ms > 0);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"Degraded\""));
    }

    #[test]
    fn status_default_is_healthy() {
        assert_eq!(ServiceStatus::default(), ServiceStatus::Healthy);
        assert_eq!(ServiceStatus::Unavailable.to_string(), "Unavailable");
    }
}
