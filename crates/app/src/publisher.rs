//! Publish capability handed to plugins.
//!
//! A [`Publisher`] is the only shared object every plugin sees. It forwards
//! straight to the bus producer: no buffering, no batching, no ordering
//! guarantee across plugins beyond what the bus itself provides.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mhub_domain::error::PublishError;
use mhub_domain::message::Message;

use crate::ports::BusProducer;

/// Cloneable, publish-only handle onto the bus.
#[derive(Clone)]
pub struct Publisher {
    producer: Arc<dyn BusProducer>,
    armed: Arc<AtomicBool>,
}

/// Opens a gated [`Publisher`] once registration is complete.
#[derive(Debug)]
pub struct PublishGate {
    armed: Arc<AtomicBool>,
}

impl Publisher {
    /// A publisher that forwards immediately.
    #[must_use]
    pub fn new(producer: Arc<dyn BusProducer>) -> Self {
        Self {
            producer,
            armed: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A publisher that refuses to forward until its gate is opened.
    #[must_use]
    pub fn gated(producer: Arc<dyn BusProducer>) -> (Self, PublishGate) {
        let armed = Arc::new(AtomicBool::new(false));
        let gate = PublishGate {
            armed: Arc::clone(&armed),
        };
        (Self { producer, armed }, gate)
    }

    /// Whether publishing is currently allowed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Forward `message` to the bus producer.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::NotReady`] while the gate is closed, or the
    /// producer's error otherwise.
    pub async fn publish(&self, message: Message) -> Result<(), PublishError> {
        if !self.is_armed() {
            return Err(PublishError::NotReady);
        }
        tracing::trace!(%message, "publishing message");
        self.producer.publish(&message).await
    }
}

impl PublishGate {
    /// Allow every publisher sharing this gate to forward.
    pub fn open(&self) {
        self.armed.store(true, Ordering::Release);
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("armed", &self.is_armed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct RecordingProducer {
        sent: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl BusProducer for RecordingProducer {
        async fn publish(&self, message: &Message) -> Result<(), PublishError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn should_forward_when_ungated() {
        let producer = Arc::new(RecordingProducer::default());
        let publisher = Publisher::new(producer.clone());

        publisher
            .publish(Message::action("ping", serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(producer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_refuse_until_gate_opens() {
        let producer = Arc::new(RecordingProducer::default());
        let (publisher, gate) = Publisher::gated(producer.clone());

        let early = publisher
            .publish(Message::action("early", serde_json::json!({})))
            .await;
        assert!(matches!(early, Err(PublishError::NotReady)));

        gate.open();
        publisher
            .publish(Message::action("late", serde_json::json!({})))
            .await
            .unwrap();

        let sent = producer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].action_name(), Some("late"));
    }

    #[tokio::test]
    async fn should_share_gate_across_clones() {
        let producer = Arc::new(RecordingProducer::default());
        let (publisher, gate) = Publisher::gated(producer);
        let clone = publisher.clone();

        assert!(!clone.is_armed());
        gate.open();
        assert!(clone.is_armed());
    }
}
