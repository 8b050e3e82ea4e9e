// ironic-exporter-core/src/testing.rs - In-memory metric sink for tests

use std::sync::Mutex;

use crate::sink::MetricSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedMetric {
    Duration {
        node_id: String,
        node_name: String,
        event: String,
        seconds: i64,
    },
    Error {
        node_id: String,
        node_name: String,
    },
    ProvisionState {
        node_id: String,
        node_name: String,
        code: u32,
    },
    DecodeFailure {
        routing_key: String,
    },
}

/// Records every call in order
#[derive(Debug, Default)]
pub struct RecordingSink {
    metrics: Mutex<Vec<RecordedMetric>>,
}

impl RecordingSink {
    pub fn metrics(&self) -> Vec<RecordedMetric> {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn durations_for(&self, node_id: &str) -> Vec<i64> {
        self.metrics()
            .into_iter()
            .filter_map(|metric| match metric {
                RecordedMetric::Duration { node_id: id, seconds, .. } if id == node_id => Some(seconds),
                _ => None,
            })
            .collect()
    }

    pub fn error_count(&self, node_id: &str) -> usize {
        self.metrics()
            .iter()
            .filter(|metric| matches!(metric, RecordedMetric::Error { node_id: id, .. } if id == node_id))
            .count()
    }

    pub fn decode_failures(&self) -> usize {
        self.metrics()
            .iter()
            .filter(|metric| matches!(metric, RecordedMetric::DecodeFailure { .. }))
            .count()
    }

    fn push(&self, metric: RecordedMetric) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.push(metric);
        }
    }
}

impl MetricSink for RecordingSink {
    fn set_event_duration(&self, node_id: &str, node_name: &str, event: &str, seconds: i64) {
        self.push(RecordedMetric::Duration {
            node_id: node_id.to_string(),
            node_name: node_name.to_string(),
            event: event.to_string(),
            seconds,
        });
    }

    fn increment_event_errors(&self, node_id: &str, node_name: &str) {
        self.push(RecordedMetric::Error {
            node_id: node_id.to_string(),
            node_name: node_name.to_string(),
        });
    }

    fn set_provision_state(&self, node_id: &str, node_name: &str, code: u32) {
        self.push(RecordedMetric::ProvisionState {
            node_id: node_id.to_string(),
            node_name: node_name.to_string(),
            code,
        });
    }

    fn increment_decode_failures(&self, routing_key: &str) {
        self.push(RecordedMetric::DecodeFailure {
            routing_key: routing_key.to_string(),
        });
    }
}
