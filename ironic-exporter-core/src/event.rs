// ironic-exporter-core/src/event.rs - Lifecycle event model

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============ PHASE ============

/// Last segment of an event type, e.g. `start` in `baremetal.deploy.wait_build_ramdisk.start`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Start,
    End,
    Success,
    Error,
    Other(String),
}

impl Phase {
    /// `end` and `success` both close a correlation opened by `start`
    pub fn is_completion(&self) -> bool {
        matches!(self, Phase::End | Phase::Success)
    }
}

impl From<&str> for Phase {
    fn from(source: &str) -> Self {
        match source {
            "start" => Phase::Start,
            "end" => Phase::End,
            "success" => Phase::Success,
            "error" => Phase::Error,
            other => Phase::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Start => write!(f, "start"),
            Phase::End => write!(f, "end"),
            Phase::Success => write!(f, "success"),
            Phase::Error => write!(f, "error"),
            Phase::Other(other) => write!(f, "{other}"),
        }
    }
}

// ============ EVENT TYPE ============

/// A dot-separated event type decomposed into `[namespace, category, subcategory, phase]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventType {
    pub namespace: String,
    pub category: String,
    pub subcategory: String,
    pub phase: Phase,
}

impl EventType {
    /// Split a raw event type. Returns `None` when there are fewer than four segments.
    /// Segments past the fourth are ignored.
    pub fn parse(raw: &str) -> Option<EventType> {
        let mut segments = raw.split('.');
        let namespace = segments.next()?;
        let category = segments.next()?;
        let subcategory = segments.next()?;
        let phase = segments.next()?;

        Some(EventType {
            namespace: namespace.to_string(),
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            phase: Phase::from(phase),
        })
    }

    /// Label used on the duration gauge: `<category>_<subcategory>`
    pub fn duration_label(&self) -> String {
        format!("{}_{}", self.category, self.subcategory)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.namespace, self.category, self.subcategory, self.phase
        )
    }
}

// ============ LIFECYCLE EVENT ============

/// One decoded bare-metal node notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub node_id: String,
    /// Events without a name carry no metric identity and are skipped by the correlator
    pub node_name: Option<String>,
    pub event_type: EventType,
    pub timestamp: NaiveDateTime,
    pub provision_state: Option<String>,
    /// Only guaranteed to be looked up for `error` phase events
    pub target_provision_state: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_four_segments() {
        let event_type = EventType::parse("baremetal.deploy.wait_build_ramdisk.start").unwrap();
        assert_eq!(event_type.namespace, "baremetal");
        assert_eq!(event_type.category, "deploy");
        assert_eq!(event_type.subcategory, "wait_build_ramdisk");
        assert_eq!(event_type.phase, Phase::Start);
        assert_eq!(event_type.duration_label(), "deploy_wait_build_ramdisk");
    }

    #[test]
    fn test_parse_rejects_short_event_types() {
        assert!(EventType::parse("baremetal.node.power_set").is_none());
        assert!(EventType::parse("").is_none());
    }

    #[test]
    fn test_parse_ignores_extra_segments() {
        let event_type = EventType::parse("baremetal.node.provision_set.end.extra").unwrap();
        assert_eq!(event_type.phase, Phase::End);
        assert_eq!(event_type.to_string(), "baremetal.node.provision_set.end");
    }

    #[test]
    fn test_unknown_phase_is_kept() {
        let event_type = EventType::parse("baremetal.node.maintenance_set.begin").unwrap();
        assert_eq!(event_type.phase, Phase::Other("begin".to_string()));
        assert!(!event_type.phase.is_completion());
        assert!(Phase::Success.is_completion());
    }
}
