//! Message router — bridges bus deliveries to plugins and plugins to the bus.
//!
//! Inbound, every delivery goes through one dispatch pass: each enabled
//! message-handling plugin is invoked in discovery order, one after the
//! other, and the delivery is acknowledged once the pass is over whatever
//! the handlers returned. Each handler call takes its turn on the router's
//! [`CallbackLock`], which the controller shares with the task scheduler.
//! Outbound, plugins hold a [`Publisher`] that forwards straight to the bus
//! producer once the router is armed.

use std::fmt;
use std::sync::Arc;

use mhub_domain::error::PublishError;
use mhub_domain::message::Message;

use crate::guard::CallbackLock;
use crate::ports::{BusProducer, Delivery};
use crate::publisher::{PublishGate, Publisher};
use crate::registry::PluginRegistry;

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Plugins whose `on_message` was invoked, in order.
    pub invoked: Vec<String>,
    /// How many of those returned an error or panicked.
    pub failed: usize,
    /// Whether the bus accepted the acknowledgement.
    pub acknowledged: bool,
}

/// Bridge between one bus producer and the plugin registry.
pub struct MessageRouter {
    producer: Arc<dyn BusProducer>,
    publisher: Publisher,
    gate: PublishGate,
    lock: CallbackLock,
}

impl MessageRouter {
    /// Create a router over `producer`. Plugin publishing starts disarmed.
    #[must_use]
    pub fn new(producer: Arc<dyn BusProducer>) -> Self {
        Self::with_lock(producer, CallbackLock::default())
    }

    /// Like [`new`](Self::new), taking turns on `lock` with other plugin callbacks.
    #[must_use]
    pub fn with_lock(producer: Arc<dyn BusProducer>, lock: CallbackLock) -> Self {
        let (publisher, gate) = Publisher::gated(Arc::clone(&producer));
        Self {
            producer,
            publisher,
            gate,
            lock,
        }
    }

    /// The capability handed to plugins.
    #[must_use]
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Let plugins publish. Called once every plugin is registered.
    pub fn arm(&self) {
        self.gate.open();
        tracing::debug!("plugin publishing armed");
    }

    /// Whether plugins may publish.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.publisher.is_armed()
    }

    /// Publish on behalf of the hub itself, regardless of the gate.
    ///
    /// # Errors
    ///
    /// Returns the producer's error.
    pub async fn send(&self, message: &Message) -> Result<(), PublishError> {
        tracing::debug!(%message, "sending message");
        self.producer.publish(message).await
    }

    /// Run one dispatch pass for `delivery` and acknowledge it.
    pub async fn dispatch(&self, registry: &mut PluginRegistry, delivery: Delivery) -> DispatchReport {
        let Delivery { message, ack } = delivery;
        tracing::debug!(%message, "dispatching message");

        let mut invoked = Vec::new();
        let mut failed = 0;

        for descriptor in registry
            .enabled_plugins_mut()
            .filter(|descriptor| descriptor.accepts_messages())
        {
            invoked.push(descriptor.name().to_string());
            let outcome = self
                .lock
                .run(descriptor.plugin_mut().on_message(&message))
                .await;
            if let Err(err) = outcome {
                failed += 1;
                tracing::warn!(plugin = %descriptor.name(), %err, "message handler failed");
            }
        }

        let acknowledged = match ack.ack().await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%err, "cannot acknowledge message");
                false
            }
        };

        DispatchReport {
            invoked,
            failed,
            acknowledged,
        }
    }
}

impl fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRouter")
            .field("armed", &self.is_armed())
            .finish_non_exhaustive()
    }
}
