// ironic-exporter/src/session.rs - One broker subscription driving the notification pipeline

use ironic_exporter_core::{CompletionPolicy, CorrelationStore, Correlator, MetricSink, NotificationPipeline};
use tokio::sync::watch;
use tracing::{error, info, Instrument};

use crate::broker::{Broker, BrokerError, QueueBinding};
use crate::observability::{SessionContext, SessionLogger};

/// How a session ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// Operator interrupt, the subscription was closed cleanly
    Shutdown,
    /// The queue or exchange does not exist; retrying cannot help
    TopicNotFound,
}

/// Consumes one routing key. Every call to [`run`](Self::run) starts with an empty
/// [`CorrelationStore`], so correlation state never survives a reconnect.
#[derive(Debug, Clone)]
pub struct SubscriptionSession {
    binding: QueueBinding,
    pipeline: NotificationPipeline,
}

impl SubscriptionSession {
    pub fn new(routing_key: &str, exclusive: bool, policy: CompletionPolicy) -> Self {
        Self {
            binding: QueueBinding::for_routing_key(routing_key, exclusive),
            pipeline: NotificationPipeline::new(routing_key, Correlator::new(policy)),
        }
    }

    pub fn binding(&self) -> &QueueBinding {
        &self.binding
    }

    /// Subscribe and process deliveries one at a time, in order, until shutdown or failure.
    ///
    /// A missing queue/exchange is reported as `Ok(SessionExit::TopicNotFound)`.
    /// Every other broker failure is returned for the supervisor to classify.
    pub async fn run(
        &self,
        broker: &dyn Broker,
        sink: &dyn MetricSink,
        shutdown: &mut watch::Receiver<bool>,
        attempt: u64,
    ) -> Result<SessionExit, BrokerError> {
        let ctx = SessionContext::new(&self.binding, attempt);
        let span = ctx.span();

        async move {
            if *shutdown.borrow() {
                return Ok(SessionExit::Shutdown);
            }

            let mut subscription = match broker.subscribe(&self.binding).await {
                Ok(subscription) => subscription,
                Err(BrokerError::NotFound(reason)) => {
                    info!(reason = %reason, "channel: {} NOT FOUND", self.binding.queue);
                    return Ok(SessionExit::TopicNotFound);
                }
                Err(e) => {
                    SessionLogger::failed(&ctx, &e.to_string(), 0);
                    return Err(e);
                }
            };
            SessionLogger::started(&ctx);

            let mut store = CorrelationStore::new();
            let mut messages: u64 = 0;

            loop {
                tokio::select! {
                    _ = wait_for_shutdown(shutdown) => {
                        if let Err(e) = subscription.close().await {
                            error!(error = %e, "Failed to close subscription cleanly");
                        }
                        SessionLogger::ended(&ctx, "shutdown requested", messages);
                        return Ok(SessionExit::Shutdown);
                    }
                    delivery = subscription.next_delivery() => match delivery {
                        Some(Ok(body)) => {
                            messages += 1;
                            self.pipeline.handle(&body, &mut store, sink);
                        }
                        Some(Err(e)) => {
                            if matches!(e, BrokerError::ClosedByBroker(_)) {
                                error!("ConnectionClosedByBroker: Channel: {}", self.binding.queue);
                            }
                            SessionLogger::failed(&ctx, &e.to_string(), messages);
                            return Err(e);
                        }
                        None => {
                            error!("ConnectionClosedByBroker: Channel: {}", self.binding.queue);
                            SessionLogger::failed(&ctx, "delivery stream ended", messages);
                            return Err(BrokerError::ClosedByBroker("delivery stream ended".to_string()));
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Resolves once shutdown is requested or the sender is gone
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
