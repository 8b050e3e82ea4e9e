// ironic-exporter/src/broker/scripted.rs - In-memory broker replaying scripted attempts

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{Broker, BrokerError, QueueBinding, Subscription};

/// What a single `subscribe` call does
pub(crate) enum Attempt {
    Fail(BrokerError),
    Deliver(Vec<Step>),
}

/// What a single `next_delivery` call does. An exhausted script waits forever.
pub(crate) enum Step {
    Message(Vec<u8>),
    Error(BrokerError),
    End,
}

#[derive(Default)]
pub(crate) struct ScriptedBroker {
    attempts: Mutex<VecDeque<Attempt>>,
    bindings: Mutex<Vec<QueueBinding>>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedBroker {
    pub(crate) fn new(attempts: Vec<Attempt>) -> Self {
        Self {
            attempts: Mutex::new(attempts.into()),
            ..Default::default()
        }
    }

    pub(crate) fn subscribe_count(&self) -> usize {
        self.bindings.lock().map(|b| b.len()).unwrap_or_default()
    }

    pub(crate) fn bindings(&self) -> Vec<QueueBinding> {
        self.bindings.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Broker for ScriptedBroker {
    async fn subscribe(&self, binding: &QueueBinding) -> Result<Box<dyn Subscription>, BrokerError> {
        if let Ok(mut bindings) = self.bindings.lock() {
            bindings.push(binding.clone());
        }
        let attempt = self.attempts.lock().ok().and_then(|mut a| a.pop_front());

        match attempt {
            Some(Attempt::Fail(error)) => Err(error),
            Some(Attempt::Deliver(steps)) => Ok(Box::new(ScriptedSubscription {
                steps: steps.into(),
                closes: self.closes.clone(),
            })),
            None => Ok(Box::new(ScriptedSubscription {
                steps: VecDeque::new(),
                closes: self.closes.clone(),
            })),
        }
    }
}

struct ScriptedSubscription {
    steps: VecDeque<Step>,
    closes: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Subscription for ScriptedSubscription {
    async fn next_delivery(&mut self) -> Option<Result<Vec<u8>, BrokerError>> {
        match self.steps.pop_front() {
            Some(Step::Message(body)) => Some(Ok(body)),
            Some(Step::Error(error)) => Some(Err(error)),
            Some(Step::End) => None,
            None => futures::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Double-encoded notification body for node `X` named `n1`
pub(crate) fn notification_body(event_type: &str, timestamp: &str) -> Vec<u8> {
    let message = serde_json::json!({
        "event_type": event_type,
        "timestamp": timestamp,
        "payload": {
            "ironic_object.data": {
                "uuid": "X",
                "name": "n1",
                "provision_state": "deploying",
                "target_provision_state": "active",
            }
        }
    });
    serde_json::to_vec(&serde_json::json!({"oslo.message": message.to_string()})).unwrap_or_default()
}
