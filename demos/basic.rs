//! Basic circuit breaker walkthrough

use std::collections::HashMap;
use std::time::Duration;
use tripswitch::{
    CircuitBreaker, CircuitEvent, CircuitMiddleware, EventSink, Exchange, FailedRequestError,
    RequestSnapshot, ServiceResponse,
};

/// Prints every circuit event as one line of JSON.
struct StdoutSink;

impl EventSink for StdoutSink {
    fn emit(&self, event: &CircuitEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            println!("  event: {json}");
        }
    }
}

/// Simulate an HTTP call that completed with `status`, passing the exchange
/// through the middleware so failures surface as typed errors.
fn call_service(
    middleware: &CircuitMiddleware,
    status: u16,
) -> Result<ServiceResponse, FailedRequestError> {
    let exchange = Exchange {
        status: Some(status),
        headers: HashMap::new(),
        body: Some(format!("status {status}")),
        request: RequestSnapshot {
            method: "POST".to_owned(),
            url: "https://payments.example.com/charge".to_owned(),
            url_path: "/charge".to_owned(),
            ..Default::default()
        },
    };

    let passed = middleware.on_complete(exchange)?;
    Ok(passed
        .into_response()
        .unwrap_or_else(|| ServiceResponse::new(204)))
}

fn main() -> Result<(), tripswitch::ConfigError> {
    println!("=== Circuit Breaker Basic Example ===\n");

    let breaker = CircuitBreaker::builder("payments.api")
        .min_failures_count(2)
        .max_failures_count(3)
        .failure_rate_threshold(1.0)
        .sample_window(Duration::from_secs(30))
        .open_circuit_sleep_window(Duration::from_secs(10))
        .event_sink(std::sync::Arc::new(StdoutSink))
        .on_open(|_state, config| println!("🔴 circuit opened for {}", config.service_id()))
        .on_close(|_state, config| println!("🟢 circuit closed for {}", config.service_id()))
        .build()?;

    let middleware = CircuitMiddleware::new(breaker.config());
    println!("Initial state: {}\n", breaker.state());

    println!("--- Successful calls ---");
    for i in 1..=2 {
        match breaker.execute(None, || call_service(&middleware, 200)) {
            Ok(response) => println!("✓ call {} returned {}", i, response.status),
            Err(e) => println!("✗ call {} failed: {}", i, e),
        }
    }
    println!("State: {}\n", breaker.state());

    println!("--- Triggering failures ---");
    for i in 1..=3 {
        match breaker.execute(None, || call_service(&middleware, 503)) {
            Ok(response) => println!("✓ call {} returned {}", i, response.status),
            Err(e) => println!("✗ call {} failed: {}", i, e),
        }
        println!("  state: {}", breaker.state());
    }
    println!();

    println!("--- Attempting call while open ---");
    match breaker.execute(None, || call_service(&middleware, 200)) {
        Ok(response) => println!("✓ substituted response with status {}", response.status),
        Err(e) => println!("✗ rejected: {}", e),
    }
    println!("State: {}\n", breaker.state());

    println!("--- Resetting circuit ---");
    breaker.reset();
    println!("State after reset: {}\n", breaker.state());

    println!("--- Server announces maintenance ---");
    let result = breaker.execute(Some("req-42"), || {
        Ok::<_, FailedRequestError>(
            ServiceResponse::new(200).with_header("X-Maintenance-Mode-Timeout", "15"),
        )
    });
    match result {
        Ok(response) => println!("✓ substituted response with status {}", response.status),
        Err(e) => println!("✗ rejected: {}", e),
    }
    println!("State: {}\n", breaker.state());

    println!("--- Recovery after reset ---");
    breaker.reset();
    match breaker.execute(None, || call_service(&middleware, 200)) {
        Ok(response) => println!("✓ call returned {}", response.status),
        Err(e) => println!("✗ call failed: {}", e),
    }
    println!("State: {}", breaker.state());

    Ok(())
}
