//! Breaker configuration
//!
//! [`CircuitDefaults`] holds process-wide settings, built once at startup and
//! shared behind an `Arc`. [`CircuitConfig`] is the per-service result of
//! merging builder overrides onto those defaults; it validates on
//! construction and never changes afterwards.

use crate::callbacks::{Callbacks, OpenCircuitHandler, TransitionHook};
use crate::errors::ConfigError;
use crate::events::{CircuitEvent, EventSink};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Header consulted for a server-announced maintenance window, unless the
/// configuration names a different one.
pub const DEFAULT_MAINTENANCE_MODE_HEADER: &str = "X-Maintenance-Mode-Timeout";

/// Process-wide defaults for circuit breakers.
///
/// Construct one with struct-update syntax and hand it to
/// [`CircuitBuilder::build_with`](crate::CircuitBuilder::build_with); any
/// setting the builder leaves untouched falls back to the value here.
#[derive(Clone)]
pub struct CircuitDefaults {
    /// Failure count at which the circuit always opens.
    pub max_failures_count: u64,
    /// Failure count below which the circuit never opens.
    pub min_failures_count: u64,
    /// Failure rate (0.0 to 1.0) that opens the circuit once the minimum
    /// count is reached.
    pub failure_rate_threshold: f64,
    /// Rolling window over which counters accumulate.
    pub sample_window: Duration,
    /// How long an opened circuit rejects calls before probing.
    pub open_circuit_sleep_window: Duration,
    /// Status codes below 500 that still count as failures.
    pub error_codes_watchlist: BTreeSet<u16>,
    /// Header announcing a server maintenance window.
    pub maintenance_mode_header: String,
    /// Whether transitions and skipped executions are reported at all.
    pub log_circuit_events: bool,
    /// Hook fired when any circuit opens.
    pub on_open: Option<TransitionHook>,
    /// Hook fired when any circuit closes.
    pub on_close: Option<TransitionHook>,
    /// Producer of substitute responses while a circuit is open.
    pub open_circuit_handler: Option<OpenCircuitHandler>,
    /// Destination for circuit events.
    pub event_sink: Option<Arc<dyn EventSink>>,
}

impl Default for CircuitDefaults {
    fn default() -> Self {
        Self {
            max_failures_count: 10,
            min_failures_count: 5,
            failure_rate_threshold: 0.5,
            sample_window: Duration::from_secs(60),
            open_circuit_sleep_window: Duration::from_secs(30),
            error_codes_watchlist: BTreeSet::new(),
            maintenance_mode_header: DEFAULT_MAINTENANCE_MODE_HEADER.to_owned(),
            log_circuit_events: true,
            on_open: None,
            on_close: None,
            open_circuit_handler: None,
            event_sink: None,
        }
    }
}

impl std::fmt::Debug for CircuitDefaults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitDefaults")
            .field("max_failures_count", &self.max_failures_count)
            .field("min_failures_count", &self.min_failures_count)
            .field("failure_rate_threshold", &self.failure_rate_threshold)
            .field("sample_window", &self.sample_window)
            .field(
                "open_circuit_sleep_window",
                &self.open_circuit_sleep_window,
            )
            .field("error_codes_watchlist", &self.error_codes_watchlist)
            .field("maintenance_mode_header", &self.maintenance_mode_header)
            .field("log_circuit_events", &self.log_circuit_events)
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("open_circuit_handler", &self.open_circuit_handler.is_some())
            .field("event_sink", &self.event_sink.is_some())
            .finish()
    }
}

/// Validated, immutable configuration of a single breaker.
#[derive(Clone)]
pub struct CircuitConfig {
    service_id: String,
    max_failures_count: u64,
    min_failures_count: u64,
    failure_rate_threshold: f64,
    sample_window: Duration,
    open_circuit_sleep_window: Duration,
    error_codes_watchlist: BTreeSet<u16>,
    maintenance_mode_header: String,
    log_circuit_events: bool,
    callbacks: Callbacks,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl CircuitConfig {
    /// Merge builder overrides onto `defaults` and validate the result.
    pub(crate) fn resolve(
        overrides: crate::builder::CircuitBuilder,
        defaults: &CircuitDefaults,
    ) -> Result<Self, ConfigError> {
        if overrides.service_id.trim().is_empty() {
            return Err(ConfigError::MissingServiceId);
        }

        let sample_window = overrides.sample_window.unwrap_or(defaults.sample_window);
        let open_circuit_sleep_window = overrides
            .open_circuit_sleep_window
            .unwrap_or(defaults.open_circuit_sleep_window);
        if open_circuit_sleep_window > sample_window {
            return Err(ConfigError::SleepWindowExceedsSampleWindow {
                sleep_window: open_circuit_sleep_window,
                sample_window,
            });
        }

        // Watchlists combine rather than replace, so a per-service breaker
        // can add codes without losing the process-wide ones.
        let mut error_codes_watchlist = defaults.error_codes_watchlist.clone();
        error_codes_watchlist.extend(overrides.error_codes_watchlist);

        let callbacks = Callbacks {
            on_open: overrides.on_open.or_else(|| defaults.on_open.clone()),
            on_close: overrides.on_close.or_else(|| defaults.on_close.clone()),
            open_circuit_handler: overrides
                .open_circuit_handler
                .or_else(|| defaults.open_circuit_handler.clone()),
        };

        Ok(Self {
            service_id: overrides.service_id,
            max_failures_count: overrides
                .max_failures_count
                .unwrap_or(defaults.max_failures_count),
            min_failures_count: overrides
                .min_failures_count
                .unwrap_or(defaults.min_failures_count),
            failure_rate_threshold: overrides
                .failure_rate_threshold
                .unwrap_or(defaults.failure_rate_threshold)
                .clamp(0.0, 1.0),
            sample_window,
            open_circuit_sleep_window,
            error_codes_watchlist,
            maintenance_mode_header: overrides
                .maintenance_mode_header
                .unwrap_or_else(|| defaults.maintenance_mode_header.clone()),
            log_circuit_events: overrides
                .log_circuit_events
                .unwrap_or(defaults.log_circuit_events),
            callbacks,
            event_sink: overrides.event_sink.or_else(|| defaults.event_sink.clone()),
        })
    }

    /// Service this configuration belongs to.
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Failure count at which the circuit always opens.
    pub fn max_failures_count(&self) -> u64 {
        self.max_failures_count
    }

    /// Failure count below which the circuit never opens.
    pub fn min_failures_count(&self) -> u64 {
        self.min_failures_count
    }

    /// Failure rate (0.0 to 1.0) that opens the circuit once the minimum
    /// count is reached.
    pub fn failure_rate_threshold(&self) -> f64 {
        self.failure_rate_threshold
    }

    /// Rolling window over which counters accumulate.
    pub fn sample_window(&self) -> Duration {
        self.sample_window
    }

    /// How long an opened circuit rejects calls before probing.
    pub fn open_circuit_sleep_window(&self) -> Duration {
        self.open_circuit_sleep_window
    }

    /// Status codes below 500 that still count as failures.
    pub fn error_codes_watchlist(&self) -> &BTreeSet<u16> {
        &self.error_codes_watchlist
    }

    /// Header announcing a server maintenance window.
    pub fn maintenance_mode_header(&self) -> &str {
        &self.maintenance_mode_header
    }

    /// Whether transitions and skipped executions are reported at all.
    pub fn log_circuit_events(&self) -> bool {
        self.log_circuit_events
    }

    pub(crate) fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    /// Deliver `event` to the configured sink, or to `tracing` without one.
    pub(crate) fn emit_event(&self, event: &CircuitEvent) {
        match &self.event_sink {
            Some(sink) => sink.emit(event),
            None => crate::events::log_event(event),
        }
    }
}

impl std::fmt::Debug for CircuitConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitConfig")
            .field("service_id", &self.service_id)
            .field("max_failures_count", &self.max_failures_count)
            .field("min_failures_count", &self.min_failures_count)
            .field("failure_rate_threshold", &self.failure_rate_threshold)
            .field("sample_window", &self.sample_window)
            .field(
                "open_circuit_sleep_window",
                &self.open_circuit_sleep_window,
            )
            .field("error_codes_watchlist", &self.error_codes_watchlist)
            .field("maintenance_mode_header", &self.maintenance_mode_header)
            .field("log_circuit_events", &self.log_circuit_events)
            .field("callbacks", &self.callbacks)
            .field("event_sink", &self.event_sink.is_some())
            .finish()
    }
}
