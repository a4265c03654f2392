//! Error types for circuit breaker operations

use std::error::Error;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Configuration rejected while building a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The service id was empty or all whitespace.
    #[error("service_id is required")]
    MissingServiceId,
    /// The open-circuit sleep window must fit inside the sample window,
    /// otherwise the open flag would outlive the half-open flag and the
    /// circuit could never walk back to closed.
    #[error("open_circuit_sleep_window ({sleep_window:?}) exceeds sample_window ({sample_window:?})")]
    SleepWindowExceedsSampleWindow {
        sleep_window: Duration,
        sample_window: Duration,
    },
}

/// Routine signal that the named service's circuit is open and the call was
/// not attempted (or was force-rejected by a maintenance announcement).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit open for service: {service_id}")]
pub struct CircuitOpenError {
    /// Service whose circuit rejected the call.
    pub service_id: String,
}

impl CircuitOpenError {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
        }
    }
}

/// Errors surfaced by [`CircuitBreaker::execute`](crate::CircuitBreaker::execute).
#[derive(Debug)]
pub enum CircuitError<E> {
    /// The circuit is open and the configured handler declined to substitute
    /// a response.
    Open(CircuitOpenError),
    /// The protected work itself failed; its error is re-raised unchanged.
    Execution(E),
}

impl<E: fmt::Display> fmt::Display for CircuitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitError::Open(e) => write!(f, "{}", e),
            CircuitError::Execution(e) => write!(f, "circuit execution failed: {}", e),
        }
    }
}

impl<E: Error + 'static> Error for CircuitError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CircuitError::Open(e) => Some(e),
            CircuitError::Execution(e) => Some(e),
        }
    }
}

impl<E> From<CircuitOpenError> for CircuitError<E> {
    fn from(error: CircuitOpenError) -> Self {
        CircuitError::Open(error)
    }
}
