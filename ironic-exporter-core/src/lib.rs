// Core types and logic for the Ironic notification exporter.
// Everything here is synchronous and free of broker or HTTP concerns.

// ============ MODULES ============
pub mod correlation;
pub mod decode;
pub mod event;
pub mod pipeline;
pub mod provision;
pub mod sink;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ============ RE-EXPORTS ============
pub use correlation::{CompletionPolicy, CorrelationStore, Correlator, Outcome};
pub use decode::{decode, decode_message, DecodeError};
pub use event::{EventType, LifecycleEvent, Phase};
pub use pipeline::NotificationPipeline;
pub use provision::ProvisionState;
pub use sink::MetricSink;
