//! Transport middleware adapter
//!
//! Sits between an HTTP client and the breaker. The client hands every
//! completed exchange to [`CircuitMiddleware::on_complete`]; exchanges whose
//! status marks them as failed come back as a [`FailedRequestError`] carrying
//! the full exchange, which the breaker then classifies through its
//! [`ResponseStatus`] implementation.

use crate::config::CircuitConfig;
use crate::response::{ResponseStatus, ServiceResponse};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt;

/// Request half of a completed exchange, mirrored for inspection and logging.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestSnapshot {
    /// HTTP method, e.g. `GET`.
    pub method: String,
    /// Full request URL.
    pub url: String,
    /// Path component of the URL.
    pub url_path: String,
    /// Query parameters.
    pub params: HashMap<String, String>,
    /// Request headers as sent.
    pub headers: HashMap<String, String>,
    /// Request body, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// A completed transport exchange as seen by the middleware.
///
/// `status` is `None` when the request never produced a response, e.g. a
/// connection refusal or timeout surfaced by the client.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    /// Response status, when one was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// The request that produced this exchange.
    pub request: RequestSnapshot,
}

impl Exchange {
    /// Convert a status-bearing exchange into the breaker's response
    /// vocabulary. Exchanges without a status have nothing to convert.
    pub fn into_response(self) -> Option<ServiceResponse> {
        Some(ServiceResponse {
            status: self.status?,
            headers: self.headers,
            body: self.body,
        })
    }
}

/// Raised by the middleware for exchanges whose status marks them as failed.
#[derive(Debug, Clone)]
pub struct FailedRequestError {
    /// The full exchange, kept for the caller's error handling and logging.
    pub exchange: Exchange,
}

impl FailedRequestError {
    pub fn new(exchange: Exchange) -> Self {
        Self { exchange }
    }
}

impl fmt::Display for FailedRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exchange.status {
            Some(status) => write!(
                f,
                "request to {} failed with status {}",
                self.exchange.request.url, status
            ),
            None => write!(
                f,
                "request to {} failed without a response",
                self.exchange.request.url
            ),
        }
    }
}

impl Error for FailedRequestError {}

impl ResponseStatus for FailedRequestError {
    fn status(&self) -> Option<u16> {
        self.exchange.status
    }
}

/// Failure-translation shim mounted by the HTTP client layer.
///
/// The middleware shares the breaker's watchlist so both layers agree on
/// which sub-500 statuses count as failures.
#[derive(Debug, Clone)]
pub struct CircuitMiddleware {
    error_codes_watchlist: BTreeSet<u16>,
}

impl CircuitMiddleware {
    /// Build a middleware from the breaker's configuration.
    pub fn new(config: &CircuitConfig) -> Self {
        Self {
            error_codes_watchlist: config.error_codes_watchlist().clone(),
        }
    }

    /// Build a middleware with an explicit watchlist.
    pub fn with_watchlist(codes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            error_codes_watchlist: codes.into_iter().collect(),
        }
    }

    /// Inspect a completed exchange. Failed exchanges become a typed error
    /// carrying the full exchange; passing ones flow through unchanged.
    pub fn on_complete(&self, exchange: Exchange) -> Result<Exchange, FailedRequestError> {
        if self.failed_request(exchange.status) {
            Err(FailedRequestError::new(exchange))
        } else {
            Ok(exchange)
        }
    }

    fn failed_request(&self, status: Option<u16>) -> bool {
        match status {
            // No status at all means the request never completed.
            None => true,
            Some(status) => status >= 500 || self.error_codes_watchlist.contains(&status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(status: Option<u16>) -> Exchange {
        Exchange {
            status,
            headers: HashMap::from([("Content-Type".to_owned(), "application/json".to_owned())]),
            body: Some("{}".to_owned()),
            request: RequestSnapshot {
                method: "GET".to_owned(),
                url: "https://api.example.com/v1/things".to_owned(),
                url_path: "/v1/things".to_owned(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_successful_exchange_passes_through() {
        let middleware = CircuitMiddleware::with_watchlist([]);

        let passed = middleware
            .on_complete(exchange(Some(200)))
            .expect("2xx passes through");
        assert_eq!(passed.status, Some(200));
    }

    #[test]
    fn test_server_errors_are_raised() {
        let middleware = CircuitMiddleware::with_watchlist([]);

        let error = middleware
            .on_complete(exchange(Some(502)))
            .expect_err("5xx raises");
        assert_eq!(error.status(), Some(502));
        assert_eq!(error.exchange.body.as_deref(), Some("{}"));
        assert_eq!(
            error.to_string(),
            "request to https://api.example.com/v1/things failed with status 502"
        );
    }

    #[test]
    fn test_watchlisted_codes_are_raised() {
        let middleware = CircuitMiddleware::with_watchlist([404, 429]);

        assert!(middleware.on_complete(exchange(Some(404))).is_err());
        assert!(middleware.on_complete(exchange(Some(429))).is_err());
        assert!(middleware.on_complete(exchange(Some(422))).is_ok());
    }

    #[test]
    fn test_missing_status_is_raised() {
        let middleware = CircuitMiddleware::with_watchlist([]);

        let error = middleware
            .on_complete(exchange(None))
            .expect_err("no status raises");
        assert_eq!(error.status(), None);
        assert_eq!(
            error.to_string(),
            "request to https://api.example.com/v1/things failed without a response"
        );
    }

    #[test]
    fn test_middleware_shares_breaker_watchlist() {
        let breaker = crate::CircuitBreaker::builder("test.service")
            .error_codes_watchlist([404])
            .build()
            .expect("breaker builds");
        let middleware = CircuitMiddleware::new(breaker.config());

        assert!(middleware.on_complete(exchange(Some(404))).is_err());
        assert!(middleware.on_complete(exchange(Some(200))).is_ok());
    }

    #[test]
    fn test_exchange_converts_to_service_response() {
        let response = exchange(Some(503))
            .into_response()
            .expect("status-bearing exchange converts");
        assert_eq!(response.status, 503);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.body.as_deref(), Some("{}"));

        assert!(exchange(None).into_response().is_none());
    }

    #[test]
    fn test_raised_error_drives_a_breaker() {
        use crate::errors::CircuitError;

        let breaker = crate::CircuitBreaker::builder("test.service")
            .min_failures_count(1)
            .max_failures_count(1)
            .build()
            .expect("breaker builds");
        let middleware = CircuitMiddleware::with_watchlist([]);

        let result = breaker.execute(None, || -> Result<ServiceResponse, FailedRequestError> {
            let passed = middleware.on_complete(exchange(Some(500)))?;
            Ok(passed
                .into_response()
                .unwrap_or_else(|| ServiceResponse::new(200)))
        });

        assert!(matches!(result, Err(CircuitError::Execution(_))));
        assert_eq!(breaker.state(), crate::CircuitState::Open);
    }
}
