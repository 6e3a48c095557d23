//! Prometheus metrics for callcenter-service.
//!
//! Recording goes through the `metrics` facade; the Prometheus exporter is
//! installed once by [`init_metrics`] and rendered by [`get_metrics`].

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

const AGENT_LATENCY_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0];
const HTTP_DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Install the Prometheus recorder. Later calls are no-ops.
pub fn init_metrics() {
    PROMETHEUS.get_or_init(|| {
        let installed = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full("callcenter_agent_latency_seconds".to_string()),
                AGENT_LATENCY_BUCKETS,
            )
            .and_then(|b| {
                b.set_buckets_for_metric(
                    Matcher::Full("http_request_duration_seconds".to_string()),
                    HTTP_DURATION_BUCKETS,
                )
            })
            .and_then(|b| b.install_recorder());

        match installed {
            Ok(handle) => {
                describe();
                tracing::info!("Prometheus metrics initialized");
                Some(handle)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install Prometheus recorder");
                None
            }
        }
    });
}

fn describe() {
    describe_counter!(
        "callcenter_sessions_created_total",
        "Sessions created, by tier"
    );
    describe_counter!(
        "callcenter_sessions_closed_total",
        "Sessions ended, by reason (deleted, expired)"
    );
    describe_gauge!("callcenter_active_sessions", "Live sessions in the registry");
    describe_counter!(
        "callcenter_chat_exchanges_total",
        "Chat turns, by tier and outcome"
    );
    describe_histogram!(
        "callcenter_agent_latency_seconds",
        "Conversational agent latency in seconds"
    );
    describe_counter!(
        "callcenter_speech_failures_total",
        "Speech synthesis failures"
    );
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    match PROMETHEUS.get() {
        Some(Some(handle)) => handle.render(),
        _ => {
            tracing::error!("Metrics recorder not initialized");
            "# Metrics recorder not initialized\n".to_string()
        }
    }
}

// Helper functions for recording metrics

pub fn record_session_created(tier: &'static str) {
    counter!("callcenter_sessions_created_total", "tier" => tier).increment(1);
}

pub fn record_sessions_closed(reason: &'static str, count: usize) {
    counter!("callcenter_sessions_closed_total", "reason" => reason).increment(count as u64);
}

pub fn set_active_sessions(count: usize) {
    gauge!("callcenter_active_sessions").set(count as f64);
}

/// Record one chat turn; `outcome` is `ok` or a provider error kind.
pub fn record_chat_exchange(tier: &'static str, outcome: &'static str) {
    counter!("callcenter_chat_exchanges_total", "tier" => tier, "outcome" => outcome)
        .increment(1);
}

pub fn record_agent_latency(provider: &'static str, duration_secs: f64) {
    histogram!("callcenter_agent_latency_seconds", "provider" => provider).record(duration_secs);
}

pub fn record_speech_failure(error_type: &'static str) {
    counter!("callcenter_speech_failures_total", "error_type" => error_type).increment(1);
}
