//! Bus port — the publish/subscribe transport the hub is bridged to.
//!
//! The lifecycle is expressed in types:
//!
//! 1. [`Bus::connect`] opens a [`BusSession`] (fatal on failure)
//! 2. [`BusSession::declare_topology`] binds the node's queue to the fanout
//!    exchange and hands back the [`BusProducer`] for that exchange
//! 3. [`BusSession::poll`] drains pending [`Delivery`]s, each carrying an
//!    [`AckHandle`] that must be consumed exactly once
//! 4. [`BusSession::close`] releases the connection

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use mhub_domain::error::{AckError, ConnectionError, PollError, PublishError};
use mhub_domain::message::Message;

/// Name of the fanout exchange every hub node publishes to.
pub const EXCHANGE_NAME: &str = "mhub";

/// Broker connection parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Broker hostname or IP address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Login, if the broker requires one.
    pub username: Option<String>,
    /// Password for `username`.
    pub password: Option<String>,
    /// Virtual host / namespace on the broker.
    pub vhost: Option<String>,
}

impl ConnectionSettings {
    /// Anonymous settings for `host:port` on the default vhost.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            vhost: None,
        }
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("vhost", &self.vhost)
            .finish()
    }
}

/// Delivery semantics of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Every bound queue receives every message.
    Fanout,
}

/// Exchange/queue layout declared by one hub node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Exchange name.
    pub exchange: String,
    /// Exchange kind.
    pub kind: ExchangeKind,
    /// Queue bound to the exchange for this node.
    pub queue: String,
}

impl Topology {
    /// Standard layout for a node: fanout exchange `mhub`, queue `queue-<node>`.
    #[must_use]
    pub fn for_node(node_name: &str) -> Self {
        Self {
            exchange: EXCHANGE_NAME.to_string(),
            kind: ExchangeKind::Fanout,
            queue: format!("queue-{node_name}"),
        }
    }
}

/// Publish side of the bus. Fire-and-forget, no delivery confirmation.
#[async_trait]
pub trait BusProducer: Send + Sync {
    /// Publish a message to the exchange this producer is bound to.
    async fn publish(&self, message: &Message) -> Result<(), PublishError>;
}

/// Acknowledgement token of one inbound message.
///
/// Consuming `self` makes double acknowledgement impossible.
#[async_trait]
pub trait AckHandle: Send {
    /// Acknowledge the message to the broker.
    async fn ack(self: Box<Self>) -> Result<(), AckError>;
}

/// One inbound message and its acknowledgement token.
pub struct Delivery {
    /// Message body.
    pub message: Message,
    /// Token to acknowledge the message once dispatch is done.
    pub ack: Box<dyn AckHandle>,
}

impl Delivery {
    /// Pair a message with its acknowledgement token.
    pub fn new(message: Message, ack: impl AckHandle + 'static) -> Self {
        Self {
            message,
            ack: Box::new(ack),
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Entry point of a bus transport.
pub trait Bus {
    /// Session type produced by [`connect`](Self::connect).
    type Session: BusSession;

    /// Open a session with the broker.
    fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> impl Future<Output = Result<Self::Session, ConnectionError>> + Send;
}

/// An open connection to the broker.
pub trait BusSession: Send {
    /// Declare the exchange and the node queue, start consuming from the
    /// queue, and return a producer bound to the exchange.
    fn declare_topology(
        &mut self,
        topology: &Topology,
    ) -> impl Future<Output = Result<Arc<dyn BusProducer>, ConnectionError>> + Send;

    /// Drain at most one pass of pending deliveries, waiting up to `timeout`.
    ///
    /// An empty result is not an error.
    fn poll(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<Delivery>, PollError>> + Send;

    /// Close the connection.
    fn close(self) -> impl Future<Output = ()> + Send;
}
