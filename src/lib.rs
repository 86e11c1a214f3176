#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # Fuseguard
//!
//! Fuseguard shields an application from cascading failures when it talks to
//! unreliable external dependencies (a remote audio backend, a search
//! provider, a persistence layer). Each dependency gets its own circuit
//! breaker, an optional priority-ordered fallback chain, and a caller-facing
//! health classification, all orchestrated behind a single `execute` entry
//! point.
//!
//! Generally, there are several steps when using Fuseguard:
//! 1. Construct a `DegradationManager` and hand it to the components that
//!    perform guarded calls.
//! 2. Register every dependency with `DegradationManager::register_service`.
//! 3. Optionally attach fallback strategies with
//!    `DegradationManager::register_fallback`.
//! 4. Route every call to the dependency through
//!    `DegradationManager::execute`.
//!
//! ## Add Dependency
//!
//! Add the dependency in `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! fuseguard = { version = "0.1.0" }
//! ```
//!
//! Optional features lists:
//! - logger_env: Use `env_logger` to initialize logging.
//! - logger_log4rs: Use `log4rs` to initialize logging.
//!
//! ## Guarded Calls
//!
//! ```rust
//! use fuseguard::degradation::{DegradationManager, ServiceConfig};
//!
//! let manager = DegradationManager::new();
//! manager
//!     .register_service("search", ServiceConfig::default())
//!     .unwrap();
//!
//! // inside an async context:
//! // let served = manager.execute("search", || backend.query(&q)).await?;
//! ```
//!
//! On success the call returns `Served::Primary`. When the primary path
//! fails (an error, a timeout, or an open breaker) the registered fallback
//! chain is walked in priority order and a `Served::Fallback` result marks
//! the service as degraded. Only when every path is exhausted does the
//! caller see an error, and the service is classified unavailable until a
//! probe or health check recovers it.
//!
//! ## Status Notifications
//!
//! Collaborators that log, alert or render service health subscribe with
//! `DegradationManager::register_status_listener` and receive a
//! `StatusChangeEvent` for every `Healthy`/`Degraded`/`Unavailable`
//! transition. Scheduling of the periodic
//! `DegradationManager::run_health_checks` sweep is owned by the caller;
//! this crate never spawns timers of its own.

/// Core implementations of Fuseguard: the circuit breaker state machine,
/// the fallback chain, the degradation manager and the shared vocabulary
/// (error taxonomy, service status, event listeners).
pub mod core;
/// Adapters for different logging crates.
pub mod logging;
// Utility functions for Fuseguard.
pub mod utils;

// re-export precludes
pub use crate::core::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
