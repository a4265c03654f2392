//! Response vocabulary shared by the breaker and its adapters

use serde::Serialize;
use std::collections::HashMap;

/// Minimal view of a completed downstream response.
///
/// This is what protected work hands back on success and what the
/// open-circuit handler substitutes when a call is skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers as received.
    pub headers: HashMap<String, String>,
    /// Raw response body, if any.
    pub body: Option<String>,
}

impl ServiceResponse {
    /// Create a response with the given status and no headers or body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Attach a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Attach a body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Synthetic `503 Service Unavailable` returned in place of a skipped
    /// call. Mirrors the headers of `source` when one is available, so a
    /// maintenance announcement survives into the substitute response.
    pub fn null_response(source: Option<&ServiceResponse>) -> Self {
        Self {
            status: 503,
            headers: source.map(|res| res.headers.clone()).unwrap_or_default(),
            body: None,
        }
    }
}

/// Failure vocabulary the breaker understands.
///
/// Error types returned by protected work expose the HTTP status of the
/// failed exchange through this trait; the breaker counts an error as a
/// failure only when that status is a server error (>= 500) or sits on the
/// configured watchlist. Errors without a status never move the counters.
pub trait ResponseStatus {
    /// Status code of the failed exchange, when one was received.
    fn status(&self) -> Option<u16>;
}
