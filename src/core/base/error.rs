use crate::Error;
use std::fmt;

/// `GuardError` indicates why a guarded call could not be served.
///
/// The taxonomy distinguishes a misconfigured caller
/// (`ServiceNotRegistered`, `NoStrategies`) from a refused call
/// (`CircuitOpen`), a failed primary path (`Timeout`, `OperationFailed`)
/// and an exhausted recovery path (`FallbackExhausted`). Only the last
/// three ever reach callers of `DegradationManager::execute` when a
/// fallback chain is attached; the rest are absorbed into statistics and
/// the service status.
#[derive(Debug)]
pub enum GuardError {
    /// The caller used a dependency name that was never registered.
    /// Always a programming or configuration error, never recovered
    /// automatically.
    ServiceNotRegistered { service: String },
    /// The circuit breaker refused the call; the operation was never
    /// attempted.
    CircuitOpen { service: String },
    /// The guarded operation did not complete within the configured
    /// per-call timeout. The operation itself may still be running in the
    /// background; the caller only observes this verdict.
    Timeout { service: String, timeout_ms: u64 },
    /// The guarded operation completed and raised its own failure.
    OperationFailed { service: String, source: Error },
    /// A fallback chain was consulted but holds no strategies. Kept
    /// distinct from `FallbackExhausted` so callers can tell
    /// "misconfigured" from "all paths genuinely failed".
    NoStrategies { capability: String },
    /// Every registered fallback strategy failed. `attempts` holds each
    /// strategy's error in attempt order; `cause` carries the primary
    /// failure that triggered the chain when executed through the manager.
    FallbackExhausted {
        capability: String,
        cause: Option<Box<GuardError>>,
        attempts: Vec<Error>,
    },
}

impl GuardError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, GuardError::CircuitOpen { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GuardError::Timeout { .. })
    }

    /// The dependency failure that started the failure path, unwrapping a
    /// `FallbackExhausted` down to the error the primary call produced.
    pub fn root_failure(&self) -> &GuardError {
        match self {
            GuardError::FallbackExhausted {
                cause: Some(cause), ..
            } => cause.root_failure(),
            other => other,
        }
    }
}

impl fmt::Display for GuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardError::ServiceNotRegistered { service } => {
                write!(f, "service {:?} is not registered", service)
            }
            GuardError::CircuitOpen { service } => {
                write!(f, "circuit breaker is open for service {:?}", service)
            }
            GuardError::Timeout {
                service,
                timeout_ms,
            } => write!(
                f,
                "service {:?} did not answer within {}ms",
                service, timeout_ms
            ),
            GuardError::OperationFailed { service, source } => {
                write!(f, "service {:?} failed: {}", service, source)
            }
            GuardError::NoStrategies { capability } => {
                write!(f, "no fallback strategies registered for {:?}", capability)
            }
            GuardError::FallbackExhausted {
                capability,
                cause,
                attempts,
            } => {
                write!(
                    f,
                    "all {} fallback strategies failed for {:?}",
                    attempts.len(),
                    capability
                )?;
                if let Some(cause) = cause {
                    write!(f, " (primary failure: {})", cause)?;
                }
                for (idx, err) in attempts.iter().enumerate() {
                    write!(f, "; [{}] {}", idx, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for GuardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GuardError::OperationFailed { source, .. } => Some(&**source),
            GuardError::FallbackExhausted {
                cause: Some(cause), ..
            } => Some(&**cause),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Error;

    #[test]
    fn display_enumerates_every_attempt() {
        let err = GuardError::FallbackExhausted {
            capability: "search".into(),
            cause: Some(Box::new(GuardError::Timeout {
                service: "search".into(),
                timeout_ms: 10,
            })),
            attempts: vec![Error::msg("replica down"), Error::msg("cache cold")],
        };
        let text = err.to_string();
        assert!(text.contains("all 2 fallback strategies failed"));
        assert!(text.contains("[0] replica down"));
        assert!(text.contains("[1] cache cold"));
        assert!(text.contains("within 10ms"));
    }

    #[test]
    fn root_failure_unwraps_the_aggregate() {
        let err = GuardError::FallbackExhausted {
            capability: "search".into(),
            cause: Some(Box::new(GuardError::CircuitOpen {
                service: "search".into(),
            })),
            attempts: vec![],
        };
        assert!(err.root_failure().is_circuit_open());
        assert!(!err.root_failure().is_timeout());
    }

    #[test]
    fn converts_into_anyhow() {
        fn blows_up() -> crate::Result<()> {
            Err(GuardError::ServiceNotRegistered {
                service: "db".into(),
            }
            .into())
        }
        let err = blows_up().unwrap_err();
        assert!(err.downcast_ref::<GuardError>().is_some());
    }
}
