// ironic-exporter/src/supervisor.rs - Retry-with-jitter around subscription sessions

use ironic_exporter_core::MetricSink;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::broker::{Broker, BrokerError};
use crate::prometheus::SESSION_RESTARTS;
use crate::session::{wait_for_shutdown, SessionExit, SubscriptionSession};

// ============ CLASSIFICATION ============

/// What the supervisor does after a session attempt returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Transient transport failure, sleep and run the session again
    Retry,
    /// Terminal but expected: shutdown or a missing topic
    Stop,
    /// Unclassified failure, give up and surface the error
    Fatal,
}

pub fn classify(result: &Result<SessionExit, BrokerError>) -> Decision {
    match result {
        Ok(SessionExit::Shutdown) | Ok(SessionExit::TopicNotFound) => Decision::Stop,
        Err(BrokerError::Connect(_)) | Err(BrokerError::ClosedByBroker(_)) => Decision::Retry,
        Err(BrokerError::NotFound(_)) => Decision::Stop,
        Err(BrokerError::Protocol(_)) => Decision::Fatal,
    }
}

// ============ RETRY POLICY ============

/// Fixed base delay plus a uniformly random jitter in `[jitter_min, jitter_max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            jitter_min: Duration::from_secs(1),
            jitter_max: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    pub fn next_delay(&self) -> Duration {
        let min = self.jitter_min.as_millis() as u64;
        let max = (self.jitter_max.as_millis() as u64).max(min);
        let jitter = rand::thread_rng().gen_range(min..=max);
        self.base_delay + Duration::from_millis(jitter)
    }
}

// ============ SUPERVISOR ============

/// Runs a [`SubscriptionSession`] until it stops or fails fatally, reconnecting
/// indefinitely on recoverable broker failures
#[derive(Clone)]
pub struct Supervisor {
    broker: Arc<dyn Broker>,
    sink: Arc<dyn MetricSink>,
    policy: RetryPolicy,
}

impl Supervisor {
    pub fn new(broker: Arc<dyn Broker>, sink: Arc<dyn MetricSink>, policy: RetryPolicy) -> Self {
        Self { broker, sink, policy }
    }

    pub async fn supervise(
        &self,
        session: &SubscriptionSession,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<SessionExit, BrokerError> {
        let routing_key = session.binding().routing_key.clone();
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            let result = session
                .run(self.broker.as_ref(), self.sink.as_ref(), &mut shutdown, attempt)
                .await;

            match classify(&result) {
                Decision::Stop => {
                    info!(session.routing_key = %routing_key, outcome = ?result, "Notification session stopped");
                    return match result {
                        Err(BrokerError::NotFound(_)) => Ok(SessionExit::TopicNotFound),
                        other => other,
                    };
                }
                Decision::Fatal => {
                    error!(
                        session.routing_key = %routing_key,
                        error = ?result.as_ref().err(),
                        "❌ Notification session failed with an unrecoverable error"
                    );
                    return result;
                }
                Decision::Retry => {
                    let delay = self.policy.next_delay();
                    warn!(
                        session.routing_key = %routing_key,
                        session.attempt = attempt,
                        retry.delay_ms = delay.as_millis() as u64,
                        error = ?result.as_ref().err(),
                        "Notification session lost its broker, will reconnect"
                    );
                    metrics::counter!(SESSION_RESTARTS, "routing_key" => routing_key.clone()).increment(1);

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = wait_for_shutdown(&mut shutdown) => {
                            info!(session.routing_key = %routing_key, "Shutdown requested while waiting to reconnect");
                            return Ok(SessionExit::Shutdown);
                        }
                    }
                }
            }
        }
    }
}
