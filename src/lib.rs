//! Per-service circuit breakers for outbound HTTP calls.
//!
//! Each [`CircuitBreaker`] guards one downstream service. Counters and state
//! flags live in a [`TimedStore`] whose entries expire on a rolling sample
//! window, so statistics age out on their own and an opened circuit recovers
//! by plain passage of time: the open flag expires into a half-open
//! probation, and a successful probe closes the circuit again.
//!
//! Servers can also announce planned downtime through a maintenance header;
//! the breaker force-opens for the announced window (capped at the sample
//! window) without waiting for failures to accumulate.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use tripswitch::{CircuitBreaker, FailedRequestError, ServiceResponse};
//!
//! let breaker = CircuitBreaker::builder("payments.api")
//!     .max_failures_count(8)
//!     .min_failures_count(3)
//!     .failure_rate_threshold(0.5)
//!     .sample_window(Duration::from_secs(60))
//!     .open_circuit_sleep_window(Duration::from_secs(30))
//!     .on_open(|_state, config| eprintln!("circuit opened for {}", config.service_id()))
//!     .build()?;
//!
//! let result = breaker.execute(Some("req-1"), || {
//!     // Perform the HTTP call here, translating failed exchanges through
//!     // `CircuitMiddleware` so the breaker can classify them.
//!     Ok::<_, FailedRequestError>(ServiceResponse::new(200))
//! });
//! assert!(result.is_ok());
//! # Ok::<(), tripswitch::ConfigError>(())
//! ```

use serde::Serialize;
use std::fmt;

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod config;
pub mod errors;
pub mod events;
pub mod middleware;
pub mod response;
pub mod store;

pub use builder::CircuitBuilder;
pub use callbacks::{Callbacks, FallbackContext, OpenCircuitHandler, TransitionHook};
pub use circuit::CircuitBreaker;
pub use config::{CircuitConfig, CircuitDefaults, DEFAULT_MAINTENANCE_MODE_HEADER};
pub use errors::{CircuitError, CircuitOpenError, ConfigError};
pub use events::{CircuitEvent, EventKind, EventSink};
pub use middleware::{CircuitMiddleware, Exchange, FailedRequestError, RequestSnapshot};
pub use response::{ResponseStatus, ServiceResponse};
pub use store::{MAX_SAMPLE_WINDOW, TimedStore};

/// State of a circuit, derived from its live flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow through and are counted.
    Closed,
    /// Probation: calls still flow through, the next success closes the
    /// circuit, and continued failures can trip it again.
    HalfOpen,
    /// Calls are skipped and substituted until the sleep window lapses.
    Open,
}

impl CircuitState {
    /// Snake-case name, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::HalfOpen => "half_open",
            CircuitState::Open => "open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared helpers for the crate's tests.

    use crate::events::{CircuitEvent, EventSink};
    use crate::response::ResponseStatus;
    use parking_lot::Mutex;
    use std::fmt;
    use std::sync::Arc;

    /// Transport-style error with a controllable status.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct StatusError {
        status: Option<u16>,
    }

    impl StatusError {
        pub fn new(status: Option<u16>) -> Self {
            Self { status }
        }
    }

    impl fmt::Display for StatusError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self.status {
                Some(status) => write!(f, "request failed with status {status}"),
                None => f.write_str("request failed without a response"),
            }
        }
    }

    impl std::error::Error for StatusError {}

    impl ResponseStatus for StatusError {
        fn status(&self) -> Option<u16> {
            self.status
        }
    }

    /// Event sink that keeps everything it receives.
    pub struct CollectingSink {
        events: Mutex<Vec<CircuitEvent>>,
    }

    impl CollectingSink {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        pub fn events(&self) -> Vec<CircuitEvent> {
            self.events.lock().clone()
        }

        pub fn event_types(&self) -> Vec<&'static str> {
            self.events
                .lock()
                .iter()
                .map(|event| event.event_type)
                .collect()
        }
    }

    impl EventSink for CollectingSink {
        fn emit(&self, event: &CircuitEvent) {
            self.events.lock().push(event.clone());
        }
    }
}
