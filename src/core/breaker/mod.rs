//!  Circuit Breaker State Machine:
//!
//!                                trip after failure_threshold failures
//!
//!             +-----------------------------------------------------------------------+
//!             |                                                                       |
//!             |                                                                       v
//!     +----------------+                   +----------------+      Probe      +----------------+
//!     |                |                   |                |<----------------|                |
//!     |                |  Probes succeed   |                |                 |                |
//!     |     Closed     |<------------------|    HalfOpen    |                 |      Open      |
//!     |                |                   |                |   Probe failed  |                |
//!     |                |                   |                +---------------->|                |
//!     +----------------+                   +----------------+                 +----------------+
//!
//! One breaker guards one named dependency. The gate check (`try_pass`)
//! decides whether a call may proceed; the completion callbacks
//! (`record_success`, `record_failure`) drive the transitions. Counters are
//! zeroed on every transition, and updates are applied in call-completion
//! order, so a probe failure always wins over a concurrent probe success.

pub mod config;

pub use config::*;

use crate::logging;
use crate::utils;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Arc, Mutex,
};

/// States of Circuit Breaker State Machine
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Closed,
    HalfOpen,
    Open,
}

impl Default for State {
    fn default() -> State {
        State::Closed
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// `StateChangeListener` listens on the circuit breaker state change event.
/// Listeners are registered per breaker; each transition notifies every
/// listener exactly once, after the transition has been committed.
pub trait StateChangeListener: Send + Sync {
    /// Triggered when the breaker state transformed to Closed.
    fn on_transform_to_closed(&self, prev: State, resource: &str);

    /// Triggered when the breaker state transformed to Open. `failures` is
    /// the counter value that tripped the breaker (1 for a failed probe).
    fn on_transform_to_open(&self, prev: State, resource: &str, failures: u32);

    /// Triggered when the breaker state transformed to HalfOpen.
    fn on_transform_to_half_open(&self, prev: State, resource: &str);
}

/// Read-only snapshot of a breaker, safe to serialize for operator
/// surfaces. Obtained via `CircuitBreaker::stats`; never mutates.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub resource: String,
    pub state: State,
    /// Consecutive failures observed while `Closed`.
    pub failure_count: u32,
    /// Consecutive probe successes; meaningful only in `HalfOpen`.
    pub success_count: u32,
    pub total_passes: u64,
    pub total_blocks: u64,
    pub last_transition_ms: u64,
    /// Earliest wall-clock instant an `Open` breaker will admit a probe.
    pub next_retry_timestamp_ms: u64,
}

/// Per-dependency circuit breaker.
///
/// All mutation goes through `try_pass`, `record_success`, `record_failure`
/// and `reset`; no call bypasses the gate check. The state machine runs
/// indefinitely; there is no terminal state.
pub struct CircuitBreaker {
    resource: String,
    config: BreakerConfig,
    /// state is the state machine of circuit breaker
    state: Mutex<State>,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    last_transition_ms: AtomicU64,
    /// next_retry_timestamp_ms is the time circuit breaker could probe
    next_retry_timestamp_ms: AtomicU64,
    total_passes: AtomicU64,
    total_blocks: AtomicU64,
    listeners: Mutex<Vec<Arc<dyn StateChangeListener>>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("resource", &self.resource)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("failure_count", &self.failure_count)
            .field("success_count", &self.success_count)
            .field("last_transition_ms", &self.last_transition_ms)
            .field("next_retry_timestamp_ms", &self.next_retry_timestamp_ms)
            .field("total_passes", &self.total_passes)
            .field("total_blocks", &self.total_blocks)
            .field("listeners_count", &self.listeners.lock().unwrap().len())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(resource: String, config: BreakerConfig) -> Self {
        CircuitBreaker {
            resource,
            config,
            state: Mutex::new(State::default()),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            last_transition_ms: AtomicU64::new(utils::curr_time_millis()),
            next_retry_timestamp_ms: AtomicU64::new(0),
            total_passes: AtomicU64::new(0),
            total_blocks: AtomicU64::new(0),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub fn register_listener(&self, listener: Arc<dyn StateChangeListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// `try_pass` acquires permission for an invocation only if it is
    /// available at the time of invocation, based on the state machine.
    /// In `Open` it side-effects the `Open -> HalfOpen` transition once the
    /// recovery timeout has arrived, so the winning caller becomes a probe.
    pub fn try_pass(&self) -> bool {
        let passed = match self.current_state() {
            State::Closed => true,
            State::Open => self.retry_timeout_arrived() && self.from_open_to_half_open(),
            // concurrent probes are admitted; a failure verdict always wins
            State::HalfOpen => true,
        };
        if passed {
            self.total_passes.fetch_add(1, Ordering::SeqCst);
        } else {
            self.total_blocks.fetch_add(1, Ordering::SeqCst);
        }
        passed
    }

    /// `record_success` records a completed call that answered normally.
    /// Called only for invocations that passed the gate check.
    pub fn record_success(&self) {
        match self.current_state() {
            State::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            State::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.success_threshold {
                    self.from_half_open_to_closed();
                }
            }
            // a late completion from before the trip carries no evidence
            State::Open => {}
        }
    }

    /// `record_failure` records a completed call that failed or timed out.
    /// In `HalfOpen` a single failure sends the breaker straight back to
    /// `Open`; there is no partial credit for earlier probe successes.
    pub fn record_failure(&self) {
        match self.current_state() {
            State::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold {
                    self.from_closed_to_open(failures);
                }
            }
            State::HalfOpen => {
                self.from_half_open_to_open(1);
            }
            State::Open => {}
        }
    }

    /// `current_state` returns current state of the circuit breaker.
    pub fn current_state(&self) -> State {
        *self.state.lock().unwrap()
    }

    /// Read-only snapshot; never mutates the breaker.
    pub fn stats(&self) -> BreakerStats {
        BreakerStats {
            resource: self.resource.clone(),
            state: self.current_state(),
            failure_count: self.failure_count.load(Ordering::SeqCst),
            success_count: self.success_count.load(Ordering::SeqCst),
            total_passes: self.total_passes.load(Ordering::SeqCst),
            total_blocks: self.total_blocks.load(Ordering::SeqCst),
            last_transition_ms: self.last_transition_ms.load(Ordering::SeqCst),
            next_retry_timestamp_ms: self.next_retry_timestamp_ms.load(Ordering::SeqCst),
        }
    }

    /// `reset` forces `Closed` with zeroed counters, for administrative
    /// recovery. Fires the listener set when the state actually changed.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        let prev = *state;
        *state = State::Closed;
        self.on_transition();
        self.next_retry_timestamp_ms.store(0, Ordering::SeqCst);
        drop(state);
        if prev != State::Closed {
            for listener in self.transition_listeners() {
                listener.on_transform_to_closed(prev, &self.resource);
            }
        }
    }

    pub fn retry_timeout_arrived(&self) -> bool {
        utils::curr_time_millis() >= self.next_retry_timestamp_ms.load(Ordering::SeqCst)
    }

    fn update_next_retry_timestamp(&self) {
        self.next_retry_timestamp_ms.store(
            utils::curr_time_millis() + self.config.reset_timeout_ms,
            Ordering::SeqCst,
        );
    }

    // counters are zeroed on every state transition
    fn on_transition(&self) {
        self.failure_count.store(0, Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
        self.last_transition_ms
            .store(utils::curr_time_millis(), Ordering::SeqCst);
    }

    fn transition_listeners(&self) -> Vec<Arc<dyn StateChangeListener>> {
        self.listeners.lock().unwrap().clone()
    }

    /// Updates the state machine from closed to open. Returns true only if
    /// the current caller successfully accomplished the transformation.
    fn from_closed_to_open(&self, failures: u32) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == State::Closed {
            *state = State::Open;
            self.on_transition();
            self.update_next_retry_timestamp();
            drop(state);
            logging::warn!(
                "[CircuitBreaker] {:?} tripped open after {} consecutive failures",
                self.resource,
                failures
            );
            for listener in self.transition_listeners() {
                listener.on_transform_to_open(State::Closed, &self.resource, failures);
            }
            true
        } else {
            false
        }
    }

    /// Updates the state machine from open to half-open. Returns true only
    /// if the current caller successfully accomplished the transformation.
    fn from_open_to_half_open(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == State::Open {
            *state = State::HalfOpen;
            self.on_transition();
            drop(state);
            logging::info!("[CircuitBreaker] {:?} probing after recovery timeout", self.resource);
            for listener in self.transition_listeners() {
                listener.on_transform_to_half_open(State::Open, &self.resource);
            }
            true
        } else {
            false
        }
    }

    /// Updates the state machine from half-open to open. Returns true only
    /// if the current caller successfully accomplished the transformation.
    fn from_half_open_to_open(&self, failures: u32) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == State::HalfOpen {
            *state = State::Open;
            self.on_transition();
            self.update_next_retry_timestamp();
            drop(state);
            logging::warn!("[CircuitBreaker] {:?} probe failed, reopening", self.resource);
            for listener in self.transition_listeners() {
                listener.on_transform_to_open(State::HalfOpen, &self.resource, failures);
            }
            true
        } else {
            false
        }
    }

    /// Updates the state machine from half-open to closed. Returns true
    /// only if the current caller successfully accomplished the
    /// transformation.
    fn from_half_open_to_closed(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == State::HalfOpen {
            *state = State::Closed;
            self.on_transition();
            drop(state);
            logging::info!("[CircuitBreaker] {:?} recovered, closing", self.resource);
            for listener in self.transition_listeners() {
                listener.on_transform_to_closed(State::HalfOpen, &self.resource);
            }
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
pub(crate) use test::MockStateListener;
