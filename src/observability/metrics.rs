//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ai_guard_provider_calls_total` (counter): calls by provider, outcome
//! - `ai_guard_provider_call_duration_seconds` (histogram): call latency
//! - `ai_guard_breaker_transitions_total` (counter): by service, new state
//! - `ai_guard_rate_limited_total` (counter): rejections by reason
//! - `ai_guard_decrypt_passthrough_total` (counter): undecryptable values returned as-is

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_provider_call(provider: &str, outcome: &'static str, start: Instant) {
    counter!(
        "ai_guard_provider_calls_total",
        "provider" => provider.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "ai_guard_provider_call_duration_seconds",
        "provider" => provider.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_breaker_transition(service: &str, state: &'static str) {
    counter!(
        "ai_guard_breaker_transitions_total",
        "service" => service.to_string(),
        "state" => state
    )
    .increment(1);
}

pub fn record_rate_limited(reason: &'static str) {
    counter!("ai_guard_rate_limited_total", "reason" => reason).increment(1);
}

pub fn record_decrypt_passthrough() {
    counter!("ai_guard_decrypt_passthrough_total").increment(1);
}
