// ironic-exporter-core/src/pipeline.rs - decode -> correlate -> emit for one message

use tracing::{error, trace};

use crate::correlation::{CorrelationStore, Correlator, Outcome};
use crate::decode::decode;
use crate::provision::ProvisionState;
use crate::sink::MetricSink;

/// Synchronous message handler run by a subscription session for every delivery
#[derive(Debug, Clone)]
pub struct NotificationPipeline {
    routing_key: String,
    correlator: Correlator,
}

impl NotificationPipeline {
    pub fn new(routing_key: impl Into<String>, correlator: Correlator) -> Self {
        Self {
            routing_key: routing_key.into(),
            correlator,
        }
    }

    /// Process one raw message body.
    ///
    /// Returns `None` when the message could not be decoded. The failure is logged and
    /// counted, and `store` is left untouched.
    pub fn handle(
        &self,
        body: &[u8],
        store: &mut CorrelationStore,
        sink: &dyn MetricSink,
    ) -> Option<Outcome> {
        let event = match decode(body) {
            Ok(event) => event,
            Err(e) => {
                error!(
                    session.routing_key = %self.routing_key,
                    error = %e,
                    "Cannot read ironic event json payload"
                );
                sink.increment_decode_failures(&self.routing_key);
                return None;
            }
        };

        trace!(event.type = %event.event_type, node.id = %event.node_id, "Decoded notification");
        let outcome = self.correlator.apply(&event, store, sink);

        if let (Some(node_name), Some(state)) = (&event.node_name, &event.provision_state) {
            if let Some(code) = ProvisionState::code(state) {
                sink.set_provision_state(&event.node_id, node_name, code);
            }
        }

        Some(outcome)
    }
}
