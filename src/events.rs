//! Structured circuit events
//!
//! Every state transition and every skipped execution produces a
//! [`CircuitEvent`] snapshot. Events go to the configured [`EventSink`] when
//! one is installed, otherwise they are logged through `tracing`.

use crate::CircuitState;
use chrono::Utc;
use serde::Serialize;

/// The kinds of events a breaker reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The circuit tripped fully open.
    Opened,
    /// The circuit recovered to closed.
    Closed,
    /// The circuit entered the probation window.
    HalfOpened,
    /// A call was skipped because the circuit was open.
    ExecutionSkipped,
}

impl EventKind {
    /// Namespaced event type carried in the payload.
    pub fn event_type(self) -> &'static str {
        match self {
            EventKind::Opened => "tripswitch.circuit_opened",
            EventKind::Closed => "tripswitch.circuit_closed",
            EventKind::HalfOpened => "tripswitch.circuit_half_opened",
            EventKind::ExecutionSkipped => "tripswitch.execution_skipped",
        }
    }
}

/// Snapshot of a circuit at the moment something happened to it.
///
/// Optional fields are omitted from the serialized form when absent, so
/// sinks that ship events as JSON emit compact payloads.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitEvent {
    /// Namespaced event type, e.g. `tripswitch.circuit_opened`.
    pub event_type: &'static str,
    /// Service the circuit protects.
    pub service_id: String,
    /// Correlation id of the request that caused the event, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Circuit state after the event took effect.
    pub circuit_state: CircuitState,
    /// Successes recorded in the current sample window.
    pub success_count: u64,
    /// Failures recorded in the current sample window.
    pub failure_count: u64,
    /// Failure rate over the current sample window, 0.0 when idle.
    pub failure_rate: f64,
    /// Unix timestamp of the event.
    pub recorded_at: i64,
    /// Seconds of maintenance the server announced, present only when a
    /// maintenance header forced the circuit open. The stored flag lifetime
    /// may be shorter; this field keeps the announced value for operators.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_maintenance_timeout: Option<u64>,
}

impl CircuitEvent {
    pub(crate) fn record(
        kind: EventKind,
        service_id: &str,
        request_id: Option<&str>,
        circuit_state: CircuitState,
        success_count: u64,
        failure_count: u64,
        failure_rate: f64,
    ) -> Self {
        Self {
            event_type: kind.event_type(),
            service_id: service_id.to_owned(),
            request_id: request_id.map(str::to_owned),
            circuit_state,
            success_count,
            failure_count,
            failure_rate,
            recorded_at: Utc::now().timestamp(),
            server_maintenance_timeout: None,
        }
    }

    pub(crate) fn with_maintenance_timeout(mut self, seconds: u64) -> Self {
        self.server_maintenance_timeout = Some(seconds);
        self
    }
}

/// Receives circuit events.
///
/// Install one through the builder (or process-wide defaults) to ship events
/// to your own telemetry. Without a sink, events land on the `tripswitch`
/// tracing target at info level.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &CircuitEvent);
}

/// Log an event through `tracing`. Used when no sink is configured.
pub(crate) fn log_event(event: &CircuitEvent) {
    tracing::info!(
        target: "tripswitch",
        event_type = event.event_type,
        service_id = %event.service_id,
        request_id = event.request_id.as_deref(),
        circuit_state = %event.circuit_state,
        success_count = event.success_count,
        failure_count = event.failure_count,
        failure_rate = event.failure_rate,
        recorded_at = event.recorded_at,
        server_maintenance_timeout = event.server_maintenance_timeout,
        "circuit event"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_types_are_namespaced() {
        assert_eq!(EventKind::Opened.event_type(), "tripswitch.circuit_opened");
        assert_eq!(EventKind::Closed.event_type(), "tripswitch.circuit_closed");
        assert_eq!(
            EventKind::HalfOpened.event_type(),
            "tripswitch.circuit_half_opened"
        );
        assert_eq!(
            EventKind::ExecutionSkipped.event_type(),
            "tripswitch.execution_skipped"
        );
    }

    #[test]
    fn test_serialized_event_omits_absent_fields() {
        let event = CircuitEvent::record(
            EventKind::Opened,
            "payments.api",
            None,
            CircuitState::Open,
            2,
            8,
            0.8,
        );

        let json = serde_json::to_value(&event).expect("event serializes");
        assert_eq!(json["event_type"], "tripswitch.circuit_opened");
        assert_eq!(json["service_id"], "payments.api");
        assert_eq!(json["circuit_state"], "open");
        assert_eq!(json["failure_count"], 8);
        assert!(json.get("request_id").is_none());
        assert!(json.get("server_maintenance_timeout").is_none());
    }

    #[test]
    fn test_serialized_event_keeps_present_fields() {
        let event = CircuitEvent::record(
            EventKind::Opened,
            "payments.api",
            Some("req-42"),
            CircuitState::Open,
            0,
            5,
            1.0,
        )
        .with_maintenance_timeout(300);

        let json = serde_json::to_value(&event).expect("event serializes");
        assert_eq!(json["request_id"], "req-42");
        assert_eq!(json["server_maintenance_timeout"], 300);
        assert!(json["recorded_at"].as_i64().is_some());
    }
}
