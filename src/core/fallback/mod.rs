//! Priority-ordered fallback execution.
//!
//! A `FallbackChain` holds the alternative ways to satisfy one capability
//! (say, "search" backed by a replica and a local cache). Strategies are
//! attempted strictly in descending priority order until one answers; only
//! when every strategy has failed does the chain surface an aggregate
//! error. The stored order never changes at runtime: a success on a
//! lower-priority strategy is recorded, but the primary is retried first
//! on the next invocation.

use crate::base::GuardError;
use crate::logging;
use crate::utils::AsAny;
use crate::Result;
use futures::future::BoxFuture;
use std::cmp::Reverse;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};

/// A single fallback path for a capability.
///
/// Implementors capture whatever context they need (a cache handle, an
/// alternative client); `attempt` is invoked with no arguments and yields
/// the capability's value type, so argument and result shapes are checked
/// per chain at compile time.
pub trait FallbackStrategy<T>: Send + Sync {
    fn attempt(&self) -> BoxFuture<'_, Result<T>>;
}

/// Adapter turning a plain async closure into a `FallbackStrategy`.
pub struct FnStrategy<F> {
    f: F,
}

impl<F> FnStrategy<F> {
    pub fn new(f: F) -> Self {
        FnStrategy { f }
    }
}

impl<T, F, Fut> FallbackStrategy<T> for FnStrategy<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    fn attempt(&self) -> BoxFuture<'_, Result<T>> {
        Box::pin((self.f)())
    }
}

struct RankedStrategy<T> {
    strategy: Arc<dyn FallbackStrategy<T>>,
    priority: i32,
}

impl<T> Clone for RankedStrategy<T> {
    fn clone(&self) -> Self {
        RankedStrategy {
            strategy: Arc::clone(&self.strategy),
            priority: self.priority,
        }
    }
}

/// Ordered list of alternative operations for one named capability.
///
/// The capability name may differ from any breaker's dependency name, since
/// a chain can span several physical dependencies.
pub struct FallbackChain<T> {
    capability: String,
    /// kept sorted by descending priority; equal priorities keep insertion
    /// order
    strategies: RwLock<Vec<RankedStrategy<T>>>,
    /// index of the strategy that served the most recent successful call
    last_served: Mutex<Option<usize>>,
}

impl<T: Send + 'static> FallbackChain<T> {
    pub fn new(capability: String) -> Self {
        FallbackChain {
            capability,
            strategies: RwLock::new(Vec::new()),
            last_served: Mutex::new(None),
        }
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.read().unwrap().len()
    }

    /// Registered priorities in attempt order, highest first.
    pub fn priorities(&self) -> Vec<i32> {
        self.strategies
            .read()
            .unwrap()
            .iter()
            .map(|ranked| ranked.priority)
            .collect()
    }

    /// Inserts a strategy and re-sorts descending by priority. The sort is
    /// stable, so strategies sharing a priority are attempted in the order
    /// they were added.
    pub fn add_strategy(&self, strategy: Arc<dyn FallbackStrategy<T>>, priority: i32) {
        let mut strategies = self.strategies.write().unwrap();
        strategies.push(RankedStrategy { strategy, priority });
        strategies.sort_by_key(|ranked| Reverse(ranked.priority));
    }

    /// Attempts the strategies strictly in priority order, starting from
    /// the primary on every invocation: a non-primary success is recorded
    /// in `last_served` but never sticks as a new starting point, so the
    /// primary gets retried on the next call. No other strategy is retried
    /// within the same call.
    ///
    /// Returns the first successful value together with the index of the
    /// strategy that produced it. Fails with `NoStrategies` when the chain
    /// is empty and with `FallbackExhausted` (one sub-error per strategy,
    /// in attempt order) once every strategy has been tried.
    pub async fn execute(&self) -> std::result::Result<(T, usize), GuardError> {
        let strategies: Vec<RankedStrategy<T>> = self.strategies.read().unwrap().clone();
        if strategies.is_empty() {
            return Err(GuardError::NoStrategies {
                capability: self.capability.clone(),
            });
        }
        let mut attempts = Vec::with_capacity(strategies.len());
        for (index, ranked) in strategies.iter().enumerate() {
            match ranked.strategy.attempt().await {
                Ok(value) => {
                    *self.last_served.lock().unwrap() = Some(index);
                    if index > 0 {
                        logging::debug!(
                            "[FallbackChain] {:?} served by strategy {} (priority {})",
                            self.capability,
                            index,
                            ranked.priority
                        );
                    }
                    return Ok((value, index));
                }
                Err(err) => {
                    logging::debug!(
                        "[FallbackChain] {:?} strategy {} failed: {}",
                        self.capability,
                        index,
                        err
                    );
                    attempts.push(err);
                }
            }
        }
        Err(GuardError::FallbackExhausted {
            capability: self.capability.clone(),
            cause: None,
            attempts,
        })
    }

    /// Clears the record of which strategy served last; the next call
    /// starts from the primary as if the chain were freshly built.
    pub fn reset(&self) {
        *self.last_served.lock().unwrap() = None;
    }

    /// Index of the strategy that satisfied the most recent call, `None`
    /// before any success or after `reset`.
    pub fn last_served(&self) -> Option<usize> {
        *self.last_served.lock().unwrap()
    }

    /// Whether the most recent success came from the primary strategy.
    pub fn used_primary_last(&self) -> Option<bool> {
        self.last_served().map(|index| index == 0)
    }
}

/// Type-erased handle the degradation manager keeps per service, so one
/// registry can hold chains of different value types. The typed chain is
/// recovered through `AsAny` at the `execute` call site.
pub(crate) trait ChainControl: AsAny {
    fn strategy_count(&self) -> usize;
    fn reset(&self);
}

impl<T: Send + 'static> ChainControl for FallbackChain<T> {
    fn strategy_count(&self) -> usize {
        FallbackChain::strategy_count(self)
    }

    fn reset(&self) {
        FallbackChain::reset(self)
    }
}
