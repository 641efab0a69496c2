use crate::aggregate::AggregateResult;
use axum::{http::StatusCode, response::IntoResponse};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::warn;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder. Calling it again is a no-op.
pub fn init_metrics() {
    if PROMETHEUS_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle);

            // Initialize metrics with zero values
            counter!("myip_requests_total", "format" => "json").absolute(0);
            counter!("myip_requests_total", "format" => "text").absolute(0);
            counter!("myip_lookup_errors_total", "lookup" => "reverse_dns").absolute(0);
            counter!("myip_lookup_errors_total", "lookup" => "whois").absolute(0);
            counter!("myip_lookup_errors_total", "lookup" => "user_agent").absolute(0);
            counter!("myip_lookup_errors_total", "lookup" => "location").absolute(0);
        }
        Err(e) => {
            warn!("Failed to install metrics recorder: {}", e);
        }
    }
}

pub fn increment_requests(format: &'static str) {
    counter!("myip_requests_total", "format" => format).increment(1);
}

pub fn increment_lookup_errors(lookup: &'static str) {
    counter!("myip_lookup_errors_total", "lookup" => lookup).increment(1);
}

/// Counts every sub-result of `result` that carries an error.
pub fn record_result(result: &AggregateResult) {
    if result.reverse_dns.as_ref().is_some_and(|r| r.error.is_some()) {
        increment_lookup_errors("reverse_dns");
    }
    if result.whois.as_ref().is_some_and(|r| r.error.is_some()) {
        increment_lookup_errors("whois");
    }
    if result.user_agent.as_ref().is_some_and(|r| r.error.is_some()) {
        increment_lookup_errors("user_agent");
    }
    if result.location.error.is_some() {
        increment_lookup_errors("location");
    }
}

pub fn record_request_time(duration_ms: u64) {
    let duration_seconds = duration_ms as f64 / 1000.0;
    histogram!("myip_request_duration_seconds").record(duration_seconds);
}

pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Metrics not initialized".to_string()),
    }
}
