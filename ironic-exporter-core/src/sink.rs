// ironic-exporter-core/src/sink.rs - Contract with the metrics backend

/// Label-keyed metric updates emitted by the correlator.
///
/// Implementations are shared by every subscription session, so they must tolerate
/// concurrent calls. Gauges are last-write-wins and counters are monotonic.
pub trait MetricSink: Send + Sync {
    /// Whole-second elapsed time of a completed start/end pair
    fn set_event_duration(&self, node_id: &str, node_name: &str, event: &str, seconds: i64);

    /// One error-phase notification for a node
    fn increment_event_errors(&self, node_id: &str, node_name: &str);

    /// Numeric provisioning state code, see [`crate::ProvisionState`]
    fn set_provision_state(&self, node_id: &str, node_name: &str, code: u32);

    /// A message on `routing_key` that could not be decoded
    fn increment_decode_failures(&self, routing_key: &str);
}
