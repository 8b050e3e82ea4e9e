// ironic-exporter/src/broker/mod.rs - Broker abstraction used by subscription sessions

mod amqp;
#[cfg(test)]
pub(crate) mod scripted;

pub use amqp::AmqpBroker;

use std::fmt;
use thiserror::Error;

/// Topic exchange the conductors publish versioned notifications to
pub const EXCHANGE: &str = "ironic";
/// Prefix of both the routing pattern and the shared queue names
pub const NOTIFICATION_PREFIX: &str = "ironic_versioned_notifications";
/// Prefix of process-private, auto-deleting queues
pub const EXCLUSIVE_QUEUE_PREFIX: &str = "ironic_exporter_notification";

// ============ QUEUE BINDING ============

/// Exchange, queue and routing pattern a session consumes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueBinding {
    pub routing_key: String,
    pub exchange: String,
    pub queue: String,
    pub routing_pattern: String,
    /// Exclusive queues are declared by the exporter and deleted when it goes away
    pub exclusive: bool,
}

impl QueueBinding {
    pub fn for_routing_key(routing_key: &str, exclusive: bool) -> Self {
        let routing_pattern = format!("{NOTIFICATION_PREFIX}.{routing_key}");
        let queue = if exclusive {
            format!("{EXCLUSIVE_QUEUE_PREFIX}.{routing_key}")
        } else {
            routing_pattern.clone()
        };

        Self {
            routing_key: routing_key.to_string(),
            exchange: EXCHANGE.to_string(),
            queue,
            routing_pattern,
            exclusive,
        }
    }
}

impl fmt::Display for QueueBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.exchange, self.queue, self.routing_pattern)
    }
}

// ============ ERRORS ============

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker could not be reached or refused the connection handshake
    #[error("failed to connect to broker: {0}")]
    Connect(String),
    /// The broker closed the connection or channel, or the delivery stream ended
    #[error("connection closed by broker: {0}")]
    ClosedByBroker(String),
    /// The exchange or queue to bind does not exist
    #[error("not found: {0}")]
    NotFound(String),
    #[error("broker protocol error: {0}")]
    Protocol(String),
}

// ============ TRAITS ============

/// Opens consuming subscriptions on a message broker
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    /// Connect, apply a prefetch of one, declare (exclusive only), bind and start an
    /// auto-acknowledged consumer for `binding`
    async fn subscribe(&self, binding: &QueueBinding) -> Result<Box<dyn Subscription>, BrokerError>;
}

/// A live consumer. Deliveries are already acknowledged when they are handed out.
#[async_trait::async_trait]
pub trait Subscription: Send {
    /// Wait for the next message body. `None` means the stream ended.
    async fn next_delivery(&mut self) -> Option<Result<Vec<u8>, BrokerError>>;

    /// Stop consuming and close the underlying connection
    async fn close(&mut self) -> Result<(), BrokerError>;
}
