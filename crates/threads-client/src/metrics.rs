//! Client-side metrics
//!
//! - `threads_api_requests_total` (counter): label `status`
//! - `threads_api_request_duration_seconds` (histogram)
//! - `threads_token_refresh_total` (counter): label `outcome`
//!
//! Without an installed recorder these are no-ops.

/// Histogram buckets for `threads_api_request_duration_seconds`, 5ms to 60s.
pub const REQUEST_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Record one Graph API round trip. `status` is the HTTP status or `error`
/// when no response arrived.
pub fn record_api_request(status: &str, duration_secs: f64) {
    metrics::counter!("threads_api_requests_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("threads_api_request_duration_seconds").record(duration_secs);
}

/// `outcome` is `success`, `reused` (another task refreshed first) or `failure`.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("threads_token_refresh_total", "outcome" => outcome).increment(1);
}
