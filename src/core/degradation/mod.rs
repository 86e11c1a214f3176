//! Graceful degradation orchestration.
//!
//! The `DegradationManager` is the single entry point callers route their
//! dependency calls through. Per registered service it owns a circuit
//! breaker and an optional fallback chain, classifies the service as
//! healthy, degraded or unavailable, and publishes status transitions to
//! subscribed listeners. Active health probing is exposed as a sweep
//! (`run_health_checks`) whose scheduling belongs to the caller.

pub mod config;
pub mod manager;
pub mod record;

pub use config::*;
pub use manager::*;
pub use record::*;
