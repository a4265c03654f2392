//! Builder API for ergonomic circuit breaker configuration

use crate::CircuitState;
use crate::callbacks::{FallbackContext, OpenCircuitHandler, TransitionHook};
use crate::circuit::CircuitBreaker;
use crate::config::{CircuitConfig, CircuitDefaults};
use crate::errors::{CircuitOpenError, ConfigError};
use crate::events::EventSink;
use crate::response::ServiceResponse;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Fluent builder for [`CircuitBreaker`].
///
/// Only the service id is mandatory. Everything left unset resolves from
/// [`CircuitDefaults`] when the breaker is built.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use tripswitch::CircuitBreaker;
///
/// let breaker = CircuitBreaker::builder("payments.api")
///     .max_failures_count(8)
///     .min_failures_count(3)
///     .sample_window(Duration::from_secs(60))
///     .open_circuit_sleep_window(Duration::from_secs(15))
///     .error_codes_watchlist([429])
///     .build()?;
///
/// assert_eq!(breaker.service_id(), "payments.api");
/// # Ok::<(), tripswitch::ConfigError>(())
/// ```
pub struct CircuitBuilder {
    pub(crate) service_id: String,
    pub(crate) max_failures_count: Option<u64>,
    pub(crate) min_failures_count: Option<u64>,
    pub(crate) failure_rate_threshold: Option<f64>,
    pub(crate) sample_window: Option<Duration>,
    pub(crate) open_circuit_sleep_window: Option<Duration>,
    pub(crate) error_codes_watchlist: BTreeSet<u16>,
    pub(crate) maintenance_mode_header: Option<String>,
    pub(crate) log_circuit_events: Option<bool>,
    pub(crate) on_open: Option<TransitionHook>,
    pub(crate) on_close: Option<TransitionHook>,
    pub(crate) open_circuit_handler: Option<OpenCircuitHandler>,
    pub(crate) event_sink: Option<Arc<dyn EventSink>>,
}

impl CircuitBuilder {
    /// Start a builder for the circuit protecting `service_id`.
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            max_failures_count: None,
            min_failures_count: None,
            failure_rate_threshold: None,
            sample_window: None,
            open_circuit_sleep_window: None,
            error_codes_watchlist: BTreeSet::new(),
            maintenance_mode_header: None,
            log_circuit_events: None,
            on_open: None,
            on_close: None,
            open_circuit_handler: None,
            event_sink: None,
        }
    }

    /// Failure count at which the circuit always opens.
    pub fn max_failures_count(mut self, count: u64) -> Self {
        self.max_failures_count = Some(count);
        self
    }

    /// Failure count below which the circuit never opens.
    pub fn min_failures_count(mut self, count: u64) -> Self {
        self.min_failures_count = Some(count);
        self
    }

    /// Failure rate (0.0 to 1.0) that opens the circuit once the minimum
    /// count is reached. Values outside the range are clamped at build time.
    pub fn failure_rate_threshold(mut self, rate: f64) -> Self {
        self.failure_rate_threshold = Some(rate);
        self
    }

    /// Rolling window over which counters accumulate.
    pub fn sample_window(mut self, window: Duration) -> Self {
        self.sample_window = Some(window);
        self
    }

    /// How long an opened circuit rejects calls before probing.
    pub fn open_circuit_sleep_window(mut self, window: Duration) -> Self {
        self.open_circuit_sleep_window = Some(window);
        self
    }

    /// Status codes below 500 that should still count as failures. Codes
    /// accumulate across calls and combine with the defaults' watchlist.
    pub fn error_codes_watchlist(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.error_codes_watchlist.extend(codes);
        self
    }

    /// Header consulted for a server-announced maintenance window.
    pub fn maintenance_mode_header(mut self, name: impl Into<String>) -> Self {
        self.maintenance_mode_header = Some(name.into());
        self
    }

    /// Enable or disable event reporting for this breaker.
    pub fn log_circuit_events(mut self, enabled: bool) -> Self {
        self.log_circuit_events = Some(enabled);
        self
    }

    /// Hook fired after the circuit opens.
    pub fn on_open<F>(mut self, hook: F) -> Self
    where
        F: Fn(CircuitState, &CircuitConfig) + Send + Sync + 'static,
    {
        self.on_open = Some(Arc::new(hook));
        self
    }

    /// Hook fired after the circuit closes.
    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: Fn(CircuitState, &CircuitConfig) + Send + Sync + 'static,
    {
        self.on_close = Some(Arc::new(hook));
        self
    }

    /// Handler producing the substitute result while the circuit is open.
    /// Without one, rejected calls yield a synthetic 503.
    pub fn open_circuit_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&FallbackContext<'_>) -> Result<ServiceResponse, CircuitOpenError>
            + Send
            + Sync
            + 'static,
    {
        self.open_circuit_handler = Some(Arc::new(handler));
        self
    }

    /// Destination for circuit events. Without one, events go to `tracing`.
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Build against the stock defaults.
    pub fn build(self) -> Result<CircuitBreaker, ConfigError> {
        self.build_with(&CircuitDefaults::default())
    }

    /// Build against the given process-wide defaults.
    pub fn build_with(self, defaults: &CircuitDefaults) -> Result<CircuitBreaker, ConfigError> {
        let config = CircuitConfig::resolve(self, defaults)?;
        Ok(CircuitBreaker::new(config))
    }
}
