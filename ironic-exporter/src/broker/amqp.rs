// ironic-exporter/src/broker/amqp.rs - RabbitMQ implementation of the broker traits

use futures::StreamExt;
use lapin::{
    options::{BasicConsumeOptions, BasicQosOptions, QueueBindOptions, QueueDeclareOptions},
    protocol::{AMQPErrorKind, AMQPSoftError},
    types::FieldTable,
    uri::{AMQPAuthority, AMQPUri, AMQPUserInfo},
    Channel, Connection, ConnectionProperties, Consumer,
};
use tracing::{debug, info};

use super::{Broker, BrokerError, QueueBinding, Subscription};
use crate::config::ExporterConfig;
use crate::credentials::BrokerCredentials;

const PREFETCH_COUNT: u16 = 1;
const REPLY_SUCCESS: u16 = 200;

#[derive(Clone, Debug)]
pub struct AmqpBroker {
    host: String,
    port: u16,
    credentials: BrokerCredentials,
}

impl AmqpBroker {
    pub fn new(config: &ExporterConfig, credentials: BrokerCredentials) -> Self {
        Self {
            host: config.broker_host.clone(),
            port: config.broker_port,
            credentials,
        }
    }

    fn uri(&self) -> AMQPUri {
        AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.credentials.user.clone(),
                    password: self.credentials.password.clone(),
                },
                host: self.host.clone(),
                port: self.port,
            },
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl Broker for AmqpBroker {
    async fn subscribe(&self, binding: &QueueBinding) -> Result<Box<dyn Subscription>, BrokerError> {
        info!(session.routing_key = %binding.routing_key, "🔌 Connecting to broker at {}:{}", self.host, self.port);

        let connection = Connection::connect_uri(self.uri(), ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connect(format!("{}:{}: {}", self.host, self.port, e)))?;

        let channel = connection.create_channel().await.map_err(classify)?;
        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
            .map_err(classify)?;

        if binding.exclusive {
            channel
                .queue_declare(
                    &binding.queue,
                    QueueDeclareOptions {
                        auto_delete: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(classify)?;
            debug!(queue = %binding.queue, "Declared auto-delete queue");
        }

        channel
            .queue_bind(
                &binding.queue,
                &binding.exchange,
                &binding.routing_pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(classify)?;

        let consumer_tag = format!("ironic-exporter-{}", uuid::Uuid::new_v4());
        let consumer = channel
            .basic_consume(
                &binding.queue,
                &consumer_tag,
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(classify)?;

        info!(consumer.tag = %consumer_tag, "✅ Consuming from {}", binding);
        Ok(Box::new(AmqpSubscription {
            connection,
            channel,
            consumer,
        }))
    }
}

struct AmqpSubscription {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
}

#[async_trait::async_trait]
impl Subscription for AmqpSubscription {
    async fn next_delivery(&mut self) -> Option<Result<Vec<u8>, BrokerError>> {
        let delivery = self.consumer.next().await?;
        Some(delivery.map(|delivery| delivery.data).map_err(classify))
    }

    /// Closes the connection even when closing the channel failed. The first error wins.
    async fn close(&mut self) -> Result<(), BrokerError> {
        let channel = self.channel.close(REPLY_SUCCESS, "exporter shutting down").await;
        let connection = self.connection.close(REPLY_SUCCESS, "exporter shutting down").await;
        first_error(channel, connection).map_err(classify)
    }
}

/// Map a lapin error onto the categories the supervisor decides on
fn classify(error: lapin::Error) -> BrokerError {
    match &error {
        lapin::Error::ProtocolError(amqp_error) => match amqp_error.kind() {
            AMQPErrorKind::Soft(AMQPSoftError::NOTFOUND) => BrokerError::NotFound(error.to_string()),
            // hard errors close the whole connection from the server side
            AMQPErrorKind::Hard(_) => BrokerError::ClosedByBroker(error.to_string()),
            _ => BrokerError::Protocol(error.to_string()),
        },
        lapin::Error::InvalidConnectionState(_)
        | lapin::Error::InvalidChannelState(_)
        | lapin::Error::IOError(_)
        | lapin::Error::MissingHeartbeatError => BrokerError::ClosedByBroker(error.to_string()),
        _ => BrokerError::Protocol(error.to_string()),
    }
}

fn first_error(first: lapin::Result<()>, second: lapin::Result<()>) -> lapin::Result<()> {
    first.and(second)
}
