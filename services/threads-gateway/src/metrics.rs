//! Prometheus metrics exposition
//!
//! Renders the client metrics from `threads_client::metrics` plus the
//! gateway's own:
//!
//! - `threads_gateway_logins_total` (counter): label `outcome`
//! - `threads_gateway_session_refresh_total` (counter): label `outcome`

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use threads_client::metrics::REQUEST_DURATION_BUCKETS;

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("threads_api_request_duration_seconds".to_string()),
            REQUEST_DURATION_BUCKETS,
        )
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `threads_api_request_duration_seconds` gets explicit buckets so it renders
/// as a histogram rather than a summary.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// `outcome` is `success`, `invalid_state`, `denied` or `failure`.
pub fn record_login(outcome: &'static str) {
    metrics::counter!("threads_gateway_logins_total", "outcome" => outcome).increment(1);
}

/// `outcome` is `refreshed`, `current` or `failure`.
pub fn record_session_refresh(outcome: &'static str) {
    metrics::counter!("threads_gateway_session_refresh_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_login("success");
        record_session_refresh("current");
    }

    #[test]
    fn gateway_counters_render_with_labels() {
        let recorder = builder().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_login("success");
        record_login("invalid_state");
        record_session_refresh("refreshed");
        threads_client::metrics::record_api_request("200", 0.02);

        let output = handle.render();
        assert!(output.contains("threads_gateway_logins_total"));
        assert!(output.contains("outcome=\"invalid_state\""));
        assert!(output.contains("threads_gateway_session_refresh_total"));
        assert!(output.contains("threads_api_request_duration_seconds_bucket"));
    }
}
