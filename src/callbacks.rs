//! Transition hooks and the open-circuit fallback handler

use crate::CircuitState;
use crate::config::CircuitConfig;
use crate::errors::CircuitOpenError;
use crate::response::ServiceResponse;
use std::sync::Arc;

/// Context handed to the open-circuit handler when a call is rejected.
#[derive(Debug)]
pub struct FallbackContext<'a> {
    /// Service whose circuit rejected the call.
    pub service_id: &'a str,
    /// The live response that forced the rejection, present only when a
    /// maintenance announcement tripped the circuit mid-call. `None` when
    /// the call was skipped without being attempted.
    pub response: Option<&'a ServiceResponse>,
    /// The open-circuit condition being reported.
    pub error: &'a CircuitOpenError,
}

/// Produces the substitute result returned while the circuit is open.
pub type OpenCircuitHandler =
    Arc<dyn Fn(&FallbackContext<'_>) -> Result<ServiceResponse, CircuitOpenError> + Send + Sync>;

/// Hook fired after an open or close transition commits.
pub type TransitionHook = Arc<dyn Fn(CircuitState, &CircuitConfig) + Send + Sync>;

/// Callbacks wired into a breaker at configuration time.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_open: Option<TransitionHook>,
    pub on_close: Option<TransitionHook>,
    pub open_circuit_handler: Option<OpenCircuitHandler>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn trigger_open(&self, state: CircuitState, config: &CircuitConfig) {
        if let Some(ref hook) = self.on_open {
            hook(state, config);
        }
    }

    pub(crate) fn trigger_close(&self, state: CircuitState, config: &CircuitConfig) {
        if let Some(ref hook) = self.on_close {
            hook(state, config);
        }
    }

    /// Run the configured handler, or fall back to a synthetic 503 that
    /// mirrors the rejected response's headers.
    pub(crate) fn handle_open_circuit(
        &self,
        ctx: &FallbackContext<'_>,
    ) -> Result<ServiceResponse, CircuitOpenError> {
        match &self.open_circuit_handler {
            Some(handler) => handler(ctx),
            None => Ok(ServiceResponse::null_response(ctx.response)),
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("open_circuit_handler", &self.open_circuit_handler.is_some())
            .finish()
    }
}
