//! Circuit breaker state machine
//!
//! A breaker's state is not stored directly. It is derived from two expiring
//! flags in the owned [`TimedStore`]: tripping open writes the open flag for
//! the sleep window and the half-open flag for the sample window. The open
//! flag expires first, leaving the circuit half-open to probe the service; a
//! successful probe consumes the half-open flag and closes the circuit, while
//! total silence lets both flags lapse back to closed on their own.

use crate::CircuitState;
use crate::builder::CircuitBuilder;
use crate::callbacks::FallbackContext;
use crate::config::CircuitConfig;
use crate::errors::{CircuitError, CircuitOpenError};
use crate::events::{CircuitEvent, EventKind};
use crate::response::{ResponseStatus, ServiceResponse};
use crate::store::TimedStore;
use parking_lot::Mutex;
use std::fmt;
use std::time::Duration;

/// Per-service circuit breaker.
///
/// Shareable across threads behind an `Arc`; every method takes `&self`.
pub struct CircuitBreaker {
    service_id: String,
    config: CircuitConfig,
    store: TimedStore<u64>,
    open_key: String,
    half_open_key: String,
    success_key: String,
    failure_key: String,
    tripped_key: String,
    transition_lock: Mutex<()>,
}

impl CircuitBreaker {
    /// Create a breaker from an already-resolved configuration.
    pub fn new(config: CircuitConfig) -> Self {
        let service_id = config.service_id().to_owned();
        let store = TimedStore::new(config.sample_window());

        Self {
            open_key: format!("circuit:{service_id}:open"),
            half_open_key: format!("circuit:{service_id}:half_open"),
            success_key: format!("run_stat:{service_id}:success"),
            failure_key: format!("run_stat:{service_id}:failure"),
            tripped_key: format!("run_stat:{service_id}:tripped"),
            service_id,
            config,
            store,
            transition_lock: Mutex::new(()),
        }
    }

    /// Start building a breaker for the circuit protecting `service_id`.
    pub fn builder(service_id: impl Into<String>) -> CircuitBuilder {
        CircuitBuilder::new(service_id)
    }

    /// Service this breaker protects.
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// The breaker's resolved configuration.
    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// Run `work` under circuit protection.
    ///
    /// While the circuit is open the work is never invoked: a tripped stat is
    /// recorded and the open-circuit handler produces the result instead
    /// (a synthetic 503 by default). When the work succeeds, its response is
    /// returned unchanged, unless it announces a maintenance window through
    /// the configured header, in which case the circuit force-opens and the
    /// handler substitutes the result. When the work fails, the error is
    /// re-raised as [`CircuitError::Execution`] after counting it as a
    /// failure if its status is a server error or sits on the watchlist.
    ///
    /// `request_id` is a caller-supplied correlation id carried into the
    /// events this call may produce.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tripswitch::{CircuitBreaker, FailedRequestError, ServiceResponse};
    ///
    /// let breaker = CircuitBreaker::builder("inventory.api").build()?;
    /// let response = breaker.execute(Some("req-1"), || {
    ///     Ok::<_, FailedRequestError>(ServiceResponse::new(200))
    /// })?;
    /// assert_eq!(response.status, 200);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn execute<F, E>(
        &self,
        request_id: Option<&str>,
        work: F,
    ) -> Result<ServiceResponse, CircuitError<E>>
    where
        F: FnOnce() -> Result<ServiceResponse, E>,
        E: ResponseStatus,
    {
        if self.is_open() {
            self.record_tripped(request_id);
            return self.short_circuit(None);
        }

        match work() {
            Ok(response) => {
                if let Some(announced) = self.maintenance_timeout(&response) {
                    self.record_failure(request_id);
                    self.open_circuit(
                        request_id,
                        Some(Duration::from_secs(announced)),
                        Some(announced),
                    );
                    return self.short_circuit(Some(&response));
                }

                self.record_success(request_id);
                Ok(response)
            }
            Err(error) => {
                if self.counts_as_failure(&error) {
                    self.record_failure(request_id);
                }
                Err(CircuitError::Execution(error))
            }
        }
    }

    /// Whether the open flag is live.
    pub fn is_open(&self) -> bool {
        self.store.exists(&self.open_key)
    }

    /// Whether the half-open flag is live. Also true while fully open, since
    /// tripping sets both flags.
    pub fn is_half_open(&self) -> bool {
        self.store.exists(&self.half_open_key)
    }

    /// Whether neither flag is live.
    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// The state derived from the live flags.
    pub fn state(&self) -> CircuitState {
        if self.is_open() {
            CircuitState::Open
        } else if self.is_half_open() {
            CircuitState::HalfOpen
        } else {
            CircuitState::Closed
        }
    }

    /// Successes recorded in the current sample window.
    pub fn success_count(&self) -> u64 {
        self.store.get(&self.success_key).unwrap_or(0)
    }

    /// Failures recorded in the current sample window.
    pub fn failure_count(&self) -> u64 {
        self.store.get(&self.failure_key).unwrap_or(0)
    }

    /// Calls skipped while open in the current sample window.
    pub fn tripped_count(&self) -> u64 {
        self.store.get(&self.tripped_key).unwrap_or(0)
    }

    /// Share of non-successful outcomes over the current sample window.
    /// Skipped calls count against the service; an idle window reads 0.0.
    pub fn failure_rate(&self) -> f64 {
        let successes = self.success_count();
        let total = successes + self.failure_count() + self.tripped_count();
        if total == 0 {
            return 0.0;
        }
        (total - successes) as f64 / total as f64
    }

    /// Drop all flags and counters, returning the circuit to closed.
    /// Intended for operational tooling and tests.
    pub fn reset(&self) {
        let _guard = self.transition_lock.lock();
        self.store.reset();
    }

    fn maintenance_timeout(&self, response: &ServiceResponse) -> Option<u64> {
        response
            .header(self.config.maintenance_mode_header())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|&seconds| seconds > 0)
    }

    fn counts_as_failure<E: ResponseStatus>(&self, error: &E) -> bool {
        match error.status() {
            Some(status) => {
                status >= 500 || self.config.error_codes_watchlist().contains(&status)
            }
            None => false,
        }
    }

    fn short_circuit<E>(
        &self,
        response: Option<&ServiceResponse>,
    ) -> Result<ServiceResponse, CircuitError<E>> {
        let error = CircuitOpenError::new(&self.service_id);
        let ctx = FallbackContext {
            service_id: &self.service_id,
            response,
            error: &error,
        };
        self.config
            .callbacks()
            .handle_open_circuit(&ctx)
            .map_err(CircuitError::Open)
    }

    fn record_stat(&self, key: &str) -> u64 {
        self.store.increment(key, 1, self.config.sample_window())
    }

    fn record_success(&self, request_id: Option<&str>) {
        self.record_stat(&self.success_key);
        if self.is_half_open() {
            self.close_circuit(request_id);
        }
    }

    fn record_failure(&self, request_id: Option<&str>) {
        self.record_stat(&self.failure_key);

        if self.should_open() {
            self.open_circuit(request_id, None, None);
        }
        // A service that keeps failing past the minimum enters probation even
        // while the full-open thresholds are still out of reach.
        if !self.is_half_open() && self.failure_count() >= self.config.min_failures_count() {
            self.half_open_circuit(request_id);
        }
    }

    fn record_tripped(&self, request_id: Option<&str>) {
        self.record_stat(&self.tripped_key);
        self.emit_event(EventKind::ExecutionSkipped, request_id, None);
    }

    fn should_open(&self) -> bool {
        let failures = self.failure_count();
        failures >= self.config.min_failures_count()
            && (failures >= self.config.max_failures_count()
                || self.failure_rate() >= self.config.failure_rate_threshold())
    }

    /// Trip the circuit. `expires_in` overrides both flag lifetimes on a
    /// forced open; `announced` is the maintenance duration for the event.
    fn open_circuit(
        &self,
        request_id: Option<&str>,
        expires_in: Option<Duration>,
        announced: Option<u64>,
    ) {
        {
            let _guard = self.transition_lock.lock();
            if self.is_open() {
                return;
            }

            let open_ttl = expires_in.unwrap_or_else(|| self.config.open_circuit_sleep_window());
            let half_open_ttl = expires_in.unwrap_or_else(|| self.config.sample_window());
            self.store.set(&self.open_key, 1, open_ttl);
            self.store.set(&self.half_open_key, 1, half_open_ttl);
            // Probation starts from a clean slate: failures must reach the
            // minimum again before they can re-trip the circuit.
            self.store.delete(&self.failure_key);
        }

        self.config
            .callbacks()
            .trigger_open(CircuitState::Open, &self.config);
        self.emit_event(EventKind::Opened, request_id, announced);
    }

    fn half_open_circuit(&self, request_id: Option<&str>) {
        {
            let _guard = self.transition_lock.lock();
            if self.is_open() || self.is_half_open() {
                return;
            }
            self.store
                .set(&self.half_open_key, 1, self.config.sample_window());
        }

        self.emit_event(EventKind::HalfOpened, request_id, None);
    }

    fn close_circuit(&self, request_id: Option<&str>) {
        {
            let _guard = self.transition_lock.lock();
            if self.success_count() == 0 {
                return;
            }
            // Deleting the half-open flag doubles as the guard: whichever
            // caller consumes it performs the close, everyone else backs off.
            if self.is_open() || self.store.delete(&self.half_open_key).is_none() {
                return;
            }
            self.store.delete(&self.failure_key);
        }

        self.config
            .callbacks()
            .trigger_close(CircuitState::Closed, &self.config);
        self.emit_event(EventKind::Closed, request_id, None);
    }

    fn emit_event(&self, kind: EventKind, request_id: Option<&str>, announced: Option<u64>) {
        if !self.config.log_circuit_events() {
            return;
        }

        let mut event = CircuitEvent::record(
            kind,
            &self.service_id,
            request_id,
            self.state(),
            self.success_count(),
            self.failure_count(),
            self.failure_rate(),
        );
        if let Some(seconds) = announced {
            event = event.with_maintenance_timeout(seconds);
        }
        self.config.emit_event(&event);
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("service_id", &self.service_id)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}
