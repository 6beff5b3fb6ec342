//! In-process fanout bus backed by a tokio broadcast channel.
//!
//! Used for local runs (`[bus] kind = "memory"`) and tests. Every session
//! that declared its topology receives every message published after the
//! declaration, including its own.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use mhub_domain::error::{AckError, ConnectionError, PollError, PublishError};
use mhub_domain::message::Message;

use crate::ports::{AckHandle, Bus, BusProducer, BusSession, ConnectionSettings, Delivery, Topology};

/// In-process bus using a tokio [`broadcast`] channel.
///
/// Publishing succeeds even when no session is subscribed
/// (the message is simply dropped).
#[derive(Clone)]
pub struct InProcessBus {
    sender: broadcast::Sender<Message>,
    acknowledged: Arc<AtomicUsize>,
}

impl InProcessBus {
    /// Create a new bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            acknowledged: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Subscribe to messages on this bus.
    ///
    /// Returns a receiver that will get all messages published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.sender.subscribe()
    }

    /// Publish a message as an external peer would.
    pub fn inject(&self, message: Message) {
        // send fails only when there are zero receivers, which is fine.
        let _ = self.sender.send(message);
    }

    /// Number of deliveries acknowledged so far, across every session.
    #[must_use]
    pub fn acknowledged(&self) -> usize {
        self.acknowledged.load(Ordering::SeqCst)
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Bus for InProcessBus {
    type Session = InProcessSession;

    fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> impl Future<Output = Result<Self::Session, ConnectionError>> + Send {
        tracing::debug!(host = %settings.host, port = settings.port, "opening in-process bus session");
        let session = InProcessSession {
            bus: self.clone(),
            receiver: None,
        };
        async { Ok(session) }
    }
}

/// Session on an [`InProcessBus`].
pub struct InProcessSession {
    bus: InProcessBus,
    receiver: Option<broadcast::Receiver<Message>>,
}

impl InProcessSession {
    fn delivery(&self, message: Message) -> Delivery {
        Delivery::new(
            message,
            InProcessAck {
                acknowledged: Arc::clone(&self.bus.acknowledged),
            },
        )
    }
}

impl BusSession for InProcessSession {
    fn declare_topology(
        &mut self,
        topology: &Topology,
    ) -> impl Future<Output = Result<Arc<dyn BusProducer>, ConnectionError>> + Send {
        tracing::debug!(exchange = %topology.exchange, queue = %topology.queue, "binding in-process queue");
        self.receiver = Some(self.bus.subscribe());
        let producer: Arc<dyn BusProducer> = Arc::new(InProcessProducer {
            sender: self.bus.sender.clone(),
        });
        async { Ok(producer) }
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Vec<Delivery>, PollError> {
        let Some(receiver) = self.receiver.as_mut() else {
            tokio::time::sleep(timeout).await;
            return Ok(Vec::new());
        };

        let first = match tokio::time::timeout(timeout, receiver.recv()).await {
            Err(_elapsed) => return Ok(Vec::new()),
            Ok(Ok(message)) => message,
            Ok(Err(RecvError::Closed)) => return Err(PollError::Closed),
            Ok(Err(RecvError::Lagged(skipped))) => return Err(PollError::Lagged(skipped)),
        };

        let mut messages = vec![first];
        loop {
            match receiver.try_recv() {
                Ok(message) => messages.push(message),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "in-process consumer lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        Ok(messages
            .into_iter()
            .map(|message| self.delivery(message))
            .collect())
    }

    async fn close(self) {
        tracing::debug!("closing in-process bus session");
    }
}

struct InProcessProducer {
    sender: broadcast::Sender<Message>,
}

#[async_trait]
impl BusProducer for InProcessProducer {
    async fn publish(&self, message: &Message) -> Result<(), PublishError> {
        let _ = self.sender.send(message.clone());
        Ok(())
    }
}

struct InProcessAck {
    acknowledged: Arc<AtomicUsize>,
}

#[async_trait]
impl AckHandle for InProcessAck {
    async fn ack(self: Box<Self>) -> Result<(), AckError> {
        self.acknowledged.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
