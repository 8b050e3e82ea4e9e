// ironic-exporter/src/lib.rs - Notification consumers feeding Prometheus metrics

// ============ MODULES ============
pub mod broker;
pub mod config;
pub mod credentials;
pub mod prometheus;
pub mod observability;
pub mod session;
pub mod supervisor;

// ============ RE-EXPORTS ============

pub use ironic_exporter_core;
pub use ironic_exporter_core::{CompletionPolicy, MetricSink};

pub use broker::{AmqpBroker, Broker, BrokerError, QueueBinding, Subscription};
pub use config::ExporterConfig;
pub use credentials::BrokerCredentials;
pub use prometheus::PrometheusSink;
pub use session::{SessionExit, SubscriptionSession};
pub use supervisor::{classify, Decision, RetryPolicy, Supervisor};

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

// ============ NOTIFICATION SERVICE ============

/// One supervised subscription task per routing key. Tasks share nothing but the sink.
pub struct NotificationService {
    supervisor: Supervisor,
    routing_keys: Vec<String>,
    exclusive: bool,
    policy: CompletionPolicy,
    shutdown_tx: watch::Sender<bool>,
}

impl NotificationService {
    pub fn new(config: &ExporterConfig, broker: Arc<dyn Broker>, sink: Arc<dyn MetricSink>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            supervisor: Supervisor::new(broker, sink, config.retry_policy()),
            routing_keys: config.routing_keys.clone(),
            exclusive: config.exclusive_queue,
            policy: config.completion_policy(),
            shutdown_tx,
        }
    }

    /// Spawn a supervised session for every configured routing key
    pub fn start(&self) -> Vec<JoinHandle<Result<SessionExit, BrokerError>>> {
        tracing::info!(
            "🎯 Starting notification sessions for routing keys: [{}]",
            self.routing_keys.join(", ")
        );

        self.routing_keys
            .iter()
            .map(|routing_key| self.start_session(routing_key))
            .collect()
    }

    fn start_session(&self, routing_key: &str) -> JoinHandle<Result<SessionExit, BrokerError>> {
        let session = SubscriptionSession::new(routing_key, self.exclusive, self.policy);
        let supervisor = self.supervisor.clone();
        let shutdown = self.shutdown_tx.subscribe();
        let key = routing_key.to_string();

        tokio::spawn(async move {
            tracing::info!("🔧 Starting notification session for routing key: {}", key);

            let result = supervisor.supervise(&session, shutdown).await;
            if let Err(e) = &result {
                tracing::error!("❌ Notification session for {} failed: {}", key, e);
            }
            result
        })
    }

    /// Ask every session to stop consuming and close its connection
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::scripted::{Attempt, ScriptedBroker};
    use ironic_exporter_core::testing::RecordingSink;

    #[tokio::test]
    async fn test_one_session_per_routing_key() {
        let broker = Arc::new(ScriptedBroker::new(vec![
            Attempt::Fail(BrokerError::NotFound("q".into())),
            Attempt::Fail(BrokerError::NotFound("q".into())),
        ]));
        let config = ExporterConfig {
            exclusive_queue: true,
            ..ExporterConfig::default()
        };
        let service = NotificationService::new(&config, broker.clone(), Arc::new(RecordingSink::default()));

        let results = futures::future::join_all(service.start()).await;

        assert_eq!(results.len(), 2);
        for result in results {
            assert_eq!(result.unwrap(), Ok(SessionExit::TopicNotFound));
        }
        let mut queues: Vec<String> = broker.bindings().into_iter().map(|b| b.queue).collect();
        queues.sort();
        assert_eq!(
            queues,
            vec!["ironic_exporter_notification.error", "ironic_exporter_notification.info"]
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_all_sessions() {
        let broker = Arc::new(ScriptedBroker::new(vec![]));
        let service = NotificationService::new(
            &ExporterConfig::default(),
            broker.clone(),
            Arc::new(RecordingSink::default()),
        );

        let handles = service.start();
        while broker.subscribe_count() < 2 {
            tokio::task::yield_now().await;
        }
        service.shutdown();

        for result in futures::future::join_all(handles).await {
            assert_eq!(result.unwrap(), Ok(SessionExit::Shutdown));
        }
        assert_eq!(broker.close_count(), 2);
    }
}
