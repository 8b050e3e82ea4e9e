// ironic-exporter-core/src/correlation.rs - Start/end correlation per node and subcategory

use chrono::NaiveDateTime;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::event::{LifecycleEvent, Phase};
use crate::sink::MetricSink;

// ============ CORRELATION STORE ============

/// In-flight start timestamps, `node_id -> (subcategory -> start)`.
///
/// Owned by exactly one subscription session and rebuilt on every reconnect.
/// Entries for nodes that never complete are never collected, so the size is
/// bounded by node cardinality times the number of subcategories.
#[derive(Debug, Default, Clone)]
pub struct CorrelationStore {
    nodes: HashMap<String, HashMap<String, NaiveDateTime>>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a start, returning the unmatched start it supersedes (last start wins)
    pub fn record_start(
        &mut self,
        node_id: &str,
        subcategory: &str,
        started_at: NaiveDateTime,
    ) -> Option<NaiveDateTime> {
        self.nodes
            .entry(node_id.to_string())
            .or_default()
            .insert(subcategory.to_string(), started_at)
    }

    pub fn start_for(&self, node_id: &str, subcategory: &str) -> Option<NaiveDateTime> {
        self.nodes
            .get(node_id)
            .and_then(|subcategories| subcategories.get(subcategory))
            .copied()
    }

    /// Remove and return a start. Empty per-node maps are dropped as well.
    pub fn take(&mut self, node_id: &str, subcategory: &str) -> Option<NaiveDateTime> {
        let subcategories = self.nodes.get_mut(node_id)?;
        let started_at = subcategories.remove(subcategory);
        if subcategories.is_empty() {
            self.nodes.remove(node_id);
        }
        started_at
    }

    /// Number of open `(node, subcategory)` pairs
    pub fn len(&self) -> usize {
        self.nodes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

}

// ============ STATE MACHINE ============

/// What happens to a correlation entry once an `end`/`success` consumed it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionPolicy {
    /// Remove the entry, so a repeated `end` without a new `start` emits nothing
    #[default]
    Consume,
    /// Keep the entry, so a repeated `end` is measured against the same start
    Retain,
}

/// Result of feeding one event through the [`Correlator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No node name, nothing to label metrics with
    Unnamed,
    StartRecorded { superseded: bool },
    DurationEmitted { event: String, seconds: i64 },
    /// Completion without a known start (late subscription, reconnect)
    Unmatched,
    /// Completion timestamped before its start
    NegativeElapsed { seconds: i64 },
    ErrorCounted,
    /// Phase that carries no metric
    Ignored,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Correlator {
    policy: CompletionPolicy,
}

impl Correlator {
    pub fn new(policy: CompletionPolicy) -> Self {
        Self { policy }
    }

    /// Advance the state machine for one decoded event and emit its metrics
    pub fn apply(
        &self,
        event: &LifecycleEvent,
        store: &mut CorrelationStore,
        sink: &dyn MetricSink,
    ) -> Outcome {
        let Some(node_name) = event.node_name.as_deref() else {
            debug!(node.id = %event.node_id, event.type = %event.event_type, "Skipping event without node name");
            return Outcome::Unnamed;
        };
        let event_type = &event.event_type;

        if event_type.phase == Phase::Error {
            error!(
                node.id = %event.node_id,
                node.name = %node_name,
                event.category = %event_type.category,
                event.subcategory = %event_type.subcategory,
                provision_state = ?event.provision_state,
                target_provision_state = ?event.target_provision_state,
                "ironic_notification_error"
            );
            sink.increment_event_errors(&event.node_id, node_name);
            return Outcome::ErrorCounted;
        }

        info!(
            node.id = %event.node_id,
            node.name = %node_name,
            event.category = %event_type.category,
            event.subcategory = %event_type.subcategory,
            event.phase = %event_type.phase,
            provision_state = ?event.provision_state,
            "ironic_notification_info"
        );

        match &event_type.phase {
            Phase::Start => {
                let superseded = store
                    .record_start(&event.node_id, &event_type.subcategory, event.timestamp)
                    .is_some();
                if superseded {
                    debug!(
                        node.id = %event.node_id,
                        event.subcategory = %event_type.subcategory,
                        "Unmatched start superseded by a newer start"
                    );
                }
                Outcome::StartRecorded { superseded }
            }
            phase if phase.is_completion() => self.complete(event, node_name, store, sink),
            _ => Outcome::Ignored,
        }
    }

    fn complete(
        &self,
        event: &LifecycleEvent,
        node_name: &str,
        store: &mut CorrelationStore,
        sink: &dyn MetricSink,
    ) -> Outcome {
        let subcategory = &event.event_type.subcategory;
        let Some(started_at) = store.start_for(&event.node_id, subcategory) else {
            debug!(
                node.id = %event.node_id,
                event.subcategory = %subcategory,
                "No start recorded for completion, skipping duration"
            );
            return Outcome::Unmatched;
        };

        let elapsed = event.timestamp - started_at;
        // floor to whole seconds, so any completion before its start is negative
        let seconds = elapsed.num_seconds() - i64::from(elapsed.subsec_nanos() < 0);
        if event.timestamp < started_at {
            warn!(
                node.id = %event.node_id,
                event.subcategory = %subcategory,
                elapsed_seconds = seconds,
                "Completion is older than its start, skipping duration"
            );
            return Outcome::NegativeElapsed { seconds };
        }

        if self.policy == CompletionPolicy::Consume {
            store.take(&event.node_id, subcategory);
        }

        let label = event.event_type.duration_label();
        sink.set_event_duration(&event.node_id, node_name, &label, seconds);
        Outcome::DurationEmitted {
            event: label,
            seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use crate::testing::{RecordedMetric, RecordingSink};
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_micro_opt(10, 0, 0, 250_000)
            .unwrap()
    }

    fn event(node_id: &str, name: Option<&str>, event_type: &str, at: NaiveDateTime) -> LifecycleEvent {
        LifecycleEvent {
            node_id: node_id.to_string(),
            node_name: name.map(String::from),
            event_type: EventType::parse(event_type).unwrap(),
            timestamp: at,
            provision_state: Some("deploying".to_string()),
            target_provision_state: Some("active".to_string()),
        }
    }

    #[test]
    fn test_start_then_end_emits_duration() {
        let correlator = Correlator::default();
        let mut store = CorrelationStore::new();
        let sink = RecordingSink::default();

        correlator.apply(
            &event("X", Some("n1"), "baremetal.deploy.wait_build_ramdisk.start", t0()),
            &mut store,
            &sink,
        );
        let outcome = correlator.apply(
            &event("X", Some("n1"), "baremetal.deploy.wait_build_ramdisk.end", t0() + Duration::seconds(47)),
            &mut store,
            &sink,
        );

        assert_eq!(
            outcome,
            Outcome::DurationEmitted {
                event: "deploy_wait_build_ramdisk".to_string(),
                seconds: 47
            }
        );
        assert_eq!(
            sink.metrics(),
            vec![RecordedMetric::Duration {
                node_id: "X".to_string(),
                node_name: "n1".to_string(),
                event: "deploy_wait_build_ramdisk".to_string(),
                seconds: 47,
            }]
        );
    }

    #[test]
    fn test_duration_is_floored_to_whole_seconds() {
        let correlator = Correlator::default();
        let mut store = CorrelationStore::new();
        let sink = RecordingSink::default();

        correlator.apply(&event("X", Some("n1"), "b.deploy.deploying.start", t0()), &mut store, &sink);
        let outcome = correlator.apply(
            &event("X", Some("n1"), "b.deploy.deploying.success", t0() + Duration::milliseconds(12_999)),
            &mut store,
            &sink,
        );

        assert!(matches!(outcome, Outcome::DurationEmitted { seconds: 12, .. }));
    }

    #[test]
    fn test_end_without_start_emits_nothing() {
        let correlator = Correlator::default();
        let mut store = CorrelationStore::new();
        let sink = RecordingSink::default();

        let outcome = correlator.apply(&event("X", Some("n1"), "b.deploy.deploying.end", t0()), &mut store, &sink);

        assert_eq!(outcome, Outcome::Unmatched);
        assert!(sink.metrics().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_second_start_overwrites_first() {
        let correlator = Correlator::default();
        let mut store = CorrelationStore::new();
        let sink = RecordingSink::default();

        correlator.apply(&event("X", Some("n1"), "b.clean.wait.start", t0()), &mut store, &sink);
        let outcome = correlator.apply(
            &event("X", Some("n1"), "b.clean.wait.start", t0() + Duration::seconds(100)),
            &mut store,
            &sink,
        );
        assert_eq!(outcome, Outcome::StartRecorded { superseded: true });

        let outcome = correlator.apply(
            &event("X", Some("n1"), "b.clean.wait.end", t0() + Duration::seconds(130)),
            &mut store,
            &sink,
        );
        assert!(matches!(outcome, Outcome::DurationEmitted { seconds: 30, .. }));
    }

    #[test]
    fn test_nodes_are_correlated_independently() {
        let correlator = Correlator::default();
        let mut store = CorrelationStore::new();
        let sink = RecordingSink::default();

        correlator.apply(&event("X", Some("n1"), "b.deploy.deploying.start", t0()), &mut store, &sink);
        correlator.apply(
            &event("Y", Some("n2"), "b.deploy.deploying.start", t0() + Duration::seconds(5)),
            &mut store,
            &sink,
        );
        correlator.apply(
            &event("Y", Some("n2"), "b.deploy.deploying.end", t0() + Duration::seconds(8)),
            &mut store,
            &sink,
        );
        let outcome = correlator.apply(
            &event("X", Some("n1"), "b.deploy.deploying.end", t0() + Duration::seconds(60)),
            &mut store,
            &sink,
        );

        assert!(matches!(outcome, Outcome::DurationEmitted { seconds: 60, .. }));
        assert_eq!(sink.durations_for("Y"), vec![3]);
    }

    #[test]
    fn test_error_counts_without_touching_store() {
        let correlator = Correlator::default();
        let mut store = CorrelationStore::new();
        let sink = RecordingSink::default();

        correlator.apply(&event("X", Some("n1"), "b.deploy.wait_build_ramdisk.start", t0()), &mut store, &sink);
        let outcome = correlator.apply(
            &event("X", Some("n1"), "b.deploy.wait_build_ramdisk.error", t0() + Duration::seconds(3)),
            &mut store,
            &sink,
        );
        correlator.apply(
            &event("X", Some("n1"), "b.power.set.error", t0() + Duration::seconds(4)),
            &mut store,
            &sink,
        );

        assert_eq!(outcome, Outcome::ErrorCounted);
        assert_eq!(sink.error_count("X"), 2);
        assert_eq!(store.start_for("X", "wait_build_ramdisk"), Some(t0()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unnamed_node_is_noop() {
        let correlator = Correlator::default();
        let mut store = CorrelationStore::new();
        let sink = RecordingSink::default();

        let outcome = correlator.apply(&event("X", None, "b.deploy.deploying.start", t0()), &mut store, &sink);

        assert_eq!(outcome, Outcome::Unnamed);
        assert!(store.is_empty());
        assert!(sink.metrics().is_empty());
    }

    #[test]
    fn test_unknown_phase_is_ignored() {
        let correlator = Correlator::default();
        let mut store = CorrelationStore::new();
        let sink = RecordingSink::default();

        let outcome = correlator.apply(&event("X", Some("n1"), "b.node.power_set.begin", t0()), &mut store, &sink);

        assert_eq!(outcome, Outcome::Ignored);
        assert!(sink.metrics().is_empty());
    }

    #[test]
    fn test_consume_policy_clears_entry() {
        let correlator = Correlator::new(CompletionPolicy::Consume);
        let mut store = CorrelationStore::new();
        let sink = RecordingSink::default();

        correlator.apply(&event("X", Some("n1"), "b.deploy.deploying.start", t0()), &mut store, &sink);
        correlator.apply(
            &event("X", Some("n1"), "b.deploy.deploying.end", t0() + Duration::seconds(10)),
            &mut store,
            &sink,
        );
        let repeated = correlator.apply(
            &event("X", Some("n1"), "b.deploy.deploying.end", t0() + Duration::seconds(20)),
            &mut store,
            &sink,
        );

        assert_eq!(repeated, Outcome::Unmatched);
        assert!(store.is_empty());
    }

    #[test]
    fn test_retain_policy_keeps_entry() {
        let correlator = Correlator::new(CompletionPolicy::Retain);
        let mut store = CorrelationStore::new();
        let sink = RecordingSink::default();

        correlator.apply(&event("X", Some("n1"), "b.deploy.deploying.start", t0()), &mut store, &sink);
        correlator.apply(
            &event("X", Some("n1"), "b.deploy.deploying.end", t0() + Duration::seconds(10)),
            &mut store,
            &sink,
        );
        let repeated = correlator.apply(
            &event("X", Some("n1"), "b.deploy.deploying.end", t0() + Duration::seconds(20)),
            &mut store,
            &sink,
        );

        assert!(matches!(repeated, Outcome::DurationEmitted { seconds: 20, .. }));
        assert_eq!(sink.durations_for("X"), vec![10, 20]);
    }

    #[test]
    fn test_negative_elapsed_is_skipped() {
        let correlator = Correlator::default();
        let mut store = CorrelationStore::new();
        let sink = RecordingSink::default();

        correlator.apply(&event("X", Some("n1"), "b.deploy.deploying.start", t0()), &mut store, &sink);
        let outcome = correlator.apply(
            &event("X", Some("n1"), "b.deploy.deploying.end", t0() - Duration::seconds(5)),
            &mut store,
            &sink,
        );

        assert_eq!(outcome, Outcome::NegativeElapsed { seconds: -5 });
        assert!(sink.metrics().is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sub_second_negative_elapsed_is_skipped() {
        let correlator = Correlator::default();
        let mut store = CorrelationStore::new();
        let sink = RecordingSink::default();

        correlator.apply(
            &event("X", Some("n1"), "b.deploy.deploying.start", t0() + Duration::milliseconds(900)),
            &mut store,
            &sink,
        );
        let outcome = correlator.apply(
            &event("X", Some("n1"), "b.deploy.deploying.end", t0() + Duration::milliseconds(200)),
            &mut store,
            &sink,
        );

        assert_eq!(outcome, Outcome::NegativeElapsed { seconds: -1 });
        assert!(sink.durations_for("X").is_empty());
        assert_eq!(store.len(), 1);
    }
}
