// ironic-exporter/src/prometheus.rs - Prometheus exposition of notification metrics

use anyhow::{Context, Result};
use ironic_exporter_core::MetricSink;
use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

pub const EVENT_DURATION: &str = "ironic_event_duration_seconds";
pub const EVENT_ERRORS: &str = "ironic_event_errors_total";
pub const PROVISION_STATE: &str = "ironic_provision_state";
pub const EXPORTER_INFO: &str = "ironic_exporter_info";
pub const DECODE_FAILURES: &str = "ironic_notification_decode_failures_total";
pub const SESSION_RESTARTS: &str = "ironic_notification_session_restarts_total";

/// Install the global recorder and serve `/metrics` on `addr`.
/// Must be called from inside the tokio runtime.
pub fn install_exporter(addr: SocketAddr, version: &str) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("failed to start Prometheus exporter on {addr}"))?;

    describe_gauge!(EVENT_DURATION, Unit::Seconds, "Elapsed time between a node's start and end notification");
    describe_counter!(EVENT_ERRORS, "Error notifications per node");
    describe_gauge!(PROVISION_STATE, "Numeric provisioning state of a node");
    describe_gauge!(EXPORTER_INFO, "Exporter build information");
    describe_counter!(DECODE_FAILURES, "Notifications that could not be decoded");
    describe_counter!(SESSION_RESTARTS, "Reconnects of a notification subscription");

    gauge!(EXPORTER_INFO, "version" => version.to_string()).set(1.0);

    tracing::info!("📊 Prometheus metrics exporter listening on {}", addr);
    Ok(())
}

/// [`MetricSink`] writing through the global `metrics` recorder.
/// The recorder is safe to update from every session concurrently.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusSink;

impl MetricSink for PrometheusSink {
    fn set_event_duration(&self, node_id: &str, node_name: &str, event: &str, seconds: i64) {
        gauge!(
            EVENT_DURATION,
            "node_id" => node_id.to_string(),
            "node_name" => node_name.to_string(),
            "event" => event.to_string()
        )
        .set(seconds as f64);
    }

    fn increment_event_errors(&self, node_id: &str, node_name: &str) {
        counter!(
            EVENT_ERRORS,
            "node_id" => node_id.to_string(),
            "node_name" => node_name.to_string()
        )
        .increment(1);
    }

    fn set_provision_state(&self, node_id: &str, node_name: &str, code: u32) {
        gauge!(
            PROVISION_STATE,
            "node_id" => node_id.to_string(),
            "node_name" => node_name.to_string()
        )
        .set(f64::from(code));
    }

    fn increment_decode_failures(&self, routing_key: &str) {
        counter!(DECODE_FAILURES, "routing_key" => routing_key.to_string()).increment(1);
    }
}
