//! # mhub-adapter-mqtt
//!
//! MQTT adapter — carries the `mhub` fanout exchange over an MQTT broker.
//!
//! ## Mapping
//!
//! | Bus concept | MQTT |
//! |-------------|------|
//! | exchange `mhub` (fanout) | topic `mhub`; every subscriber gets every message |
//! | queue `queue-<node>` | client id, persistent session (`clean_session = false`) |
//! | vhost | `vhost:username` login (RabbitMQ MQTT plugin convention) |
//! | ack | QoS 1 `PubAck`, sent manually after dispatch |
//!
//! Payloads are JSON documents.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `mhub-app` and `mhub-domain`.

mod config;
mod error;

pub use config::MqttConfig;
pub use error::MqttError;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, Publish, QoS,
    SubscribeReasonCode,
};

use mhub_app::ports::{AckHandle, Bus, BusProducer, BusSession, ConnectionSettings, Delivery, Topology};
use mhub_domain::error::{AckError, ConnectionError, PollError, PublishError};
use mhub_domain::message::Message;

/// [`Bus`] implementation over an MQTT broker.
#[derive(Debug, Clone)]
pub struct MqttBus {
    client_id: String,
    config: MqttConfig,
}

impl MqttBus {
    /// Bus for hub node `node_name`; the client id is the node's queue name.
    #[must_use]
    pub fn for_node(node_name: &str, config: MqttConfig) -> Self {
        Self {
            client_id: Topology::for_node(node_name).queue,
            config,
        }
    }

    /// MQTT client id used for the session.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

/// Broker login for `username`, prefixed with the vhost when one is set.
#[must_use]
pub fn login_name(username: &str, vhost: Option<&str>) -> String {
    match vhost {
        Some(vhost) if !vhost.is_empty() && vhost != "/" => format!("{vhost}:{username}"),
        _ => username.to_string(),
    }
}

fn mqtt_options(client_id: &str, settings: &ConnectionSettings, config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, settings.host.clone(), settings.port);
    options
        .set_keep_alive(config.keep_alive())
        .set_clean_session(false)
        .set_manual_acks(true);

    match settings.username.as_deref() {
        Some(username) => {
            let login = login_name(username, settings.vhost.as_deref());
            options.set_credentials(login, settings.password.clone().unwrap_or_default());
        }
        None if settings.vhost.is_some() => {
            tracing::warn!("bus vhost is ignored without a username");
        }
        None => {}
    }

    options
}

fn decode(payload: &[u8]) -> Result<Message, MqttError> {
    serde_json::from_slice(payload).map_err(MqttError::PayloadParse)
}

async fn await_connack(eventloop: &mut EventLoop) -> Result<(), MqttError> {
    loop {
        let event = eventloop.poll().await.map_err(MqttError::Connection)?;
        if let Event::Incoming(Packet::ConnAck(ack)) = event {
            if ack.code == ConnectReturnCode::Success {
                return Ok(());
            }
            return Err(MqttError::Refused(format!("{:?}", ack.code)));
        }
    }
}

async fn await_suback(
    eventloop: &mut EventLoop,
    pending: &mut Vec<Publish>,
    topic: &str,
) -> Result<(), MqttError> {
    loop {
        match eventloop.poll().await.map_err(MqttError::Connection)? {
            Event::Incoming(Packet::SubAck(ack)) => {
                if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    return Err(MqttError::SubscriptionRefused(topic.to_string()));
                }
                return Ok(());
            }
            // A persistent session may replay queued messages right away.
            Event::Incoming(Packet::Publish(publish)) => pending.push(publish),
            _ => {}
        }
    }
}

impl Bus for MqttBus {
    type Session = MqttSession;

    fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> impl Future<Output = Result<Self::Session, ConnectionError>> + Send {
        let options = mqtt_options(&self.client_id, settings, &self.config);
        let capacity = self.config.request_capacity;
        let connect_timeout = self.config.connect_timeout();
        let host = settings.host.clone();
        let port = settings.port;
        let client_id = self.client_id.clone();

        async move {
            tracing::debug!(%host, port, %client_id, "connecting to MQTT broker");
            let (client, mut eventloop) = AsyncClient::new(options, capacity);

            match tokio::time::timeout(connect_timeout, await_connack(&mut eventloop)).await {
                Err(_elapsed) => Err(ConnectionError::Timeout { host, port }),
                Ok(Err(err)) => Err(ConnectionError::Unreachable {
                    host,
                    port,
                    source: Box::new(err),
                }),
                Ok(Ok(())) => {
                    tracing::info!(%host, port, %client_id, "connected to MQTT broker");
                    Ok(MqttSession {
                        client,
                        eventloop,
                        host,
                        port,
                        connect_timeout,
                        topic: None,
                        pending: Vec::new(),
                    })
                }
            }
        }
    }
}

/// An open MQTT connection and its event loop.
pub struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
    host: String,
    port: u16,
    connect_timeout: Duration,
    topic: Option<String>,
    pending: Vec<Publish>,
}

async fn accept(
    client: &AsyncClient,
    topic: Option<&str>,
    publish: Publish,
    deliveries: &mut Vec<Delivery>,
) {
    let ours = topic == Some(publish.topic.as_str());
    match decode(&publish.payload) {
        Ok(message) if ours => {
            deliveries.push(Delivery::new(
                message,
                MqttAck {
                    client: client.clone(),
                    publish,
                },
            ));
            return;
        }
        Ok(_) => tracing::debug!(topic = %publish.topic, "ignoring message on foreign topic"),
        Err(err) => tracing::warn!(topic = %publish.topic, %err, "dropping undecodable message"),
    }
    // Unusable messages are acknowledged so the broker does not redeliver them.
    if let Err(err) = client.ack(&publish).await {
        tracing::warn!(%err, "cannot acknowledge dropped message");
    }
}

impl BusSession for MqttSession {
    async fn declare_topology(
        &mut self,
        topology: &Topology,
    ) -> Result<Arc<dyn BusProducer>, ConnectionError> {
        let topic = topology.exchange.clone();
        let topology_error = |source: MqttError| ConnectionError::Topology {
            queue: topology.queue.clone(),
            source: Box::new(source),
        };

        self.client
            .subscribe(topic.clone(), QoS::AtLeastOnce)
            .await
            .map_err(|err| topology_error(MqttError::Client(err)))?;

        let subscribed = tokio::time::timeout(
            self.connect_timeout,
            await_suback(&mut self.eventloop, &mut self.pending, &topic),
        )
        .await;
        match subscribed {
            Err(_elapsed) => {
                return Err(ConnectionError::Timeout {
                    host: self.host.clone(),
                    port: self.port,
                });
            }
            Ok(result) => result.map_err(topology_error)?,
        }

        tracing::debug!(%topic, queue = %topology.queue, "subscribed to exchange topic");
        self.topic = Some(topic.clone());
        Ok(Arc::new(MqttProducer {
            client: self.client.clone(),
            topic,
        }))
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Vec<Delivery>, PollError> {
        let topic = self.topic.clone();
        let mut deliveries = Vec::new();
        for publish in std::mem::take(&mut self.pending) {
            accept(&self.client, topic.as_deref(), publish, &mut deliveries).await;
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let next = tokio::time::timeout_at(deadline, self.eventloop.poll()).await;
            match next {
                Err(_elapsed) => break,
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    accept(&self.client, topic.as_deref(), publish, &mut deliveries).await;
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    let err = MqttError::Connection(err);
                    if deliveries.is_empty() {
                        return Err(err.into());
                    }
                    // Hand out what arrived; the error resurfaces on the next poll.
                    tracing::warn!(%err, "MQTT event loop failed mid-poll");
                    break;
                }
            }
        }

        Ok(deliveries)
    }

    async fn close(mut self) {
        if let Err(err) = self.client.disconnect().await {
            tracing::warn!(%err, "cannot request MQTT disconnect");
            return;
        }
        let flush = async {
            while let Ok(event) = self.eventloop.poll().await {
                if matches!(event, Event::Outgoing(Outgoing::Disconnect)) {
                    break;
                }
            }
        };
        if tokio::time::timeout(self.connect_timeout, flush).await.is_err() {
            tracing::warn!("MQTT disconnect did not complete in time");
        }
        tracing::debug!("MQTT session closed");
    }
}

struct MqttProducer {
    client: AsyncClient,
    topic: String,
}

#[async_trait]
impl BusProducer for MqttProducer {
    async fn publish(&self, message: &Message) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(message)?;
        self.client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|err| MqttError::Client(err).into())
    }
}

struct MqttAck {
    client: AsyncClient,
    publish: Publish,
}

#[async_trait]
impl AckHandle for MqttAck {
    async fn ack(self: Box<Self>) -> Result<(), AckError> {
        self.client
            .ack(&self.publish)
            .await
            .map_err(|err| MqttError::Client(err).into())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn should_use_queue_name_as_client_id() {
        let bus = MqttBus::for_node("kitchen", MqttConfig::default());
        assert_eq!(bus.client_id(), "queue-kitchen");
    }

    #[test]
    fn should_prefix_login_with_vhost() {
        assert_eq!(login_name("guest", Some("home")), "home:guest");
        assert_eq!(login_name("guest", None), "guest");
        assert_eq!(login_name("guest", Some("/")), "guest");
        assert_eq!(login_name("guest", Some("")), "guest");
    }

    #[test]
    fn should_build_persistent_session_options() {
        let settings = ConnectionSettings::new("broker.local", 1884);
        let options = mqtt_options("queue-kitchen", &settings, &MqttConfig::default());

        assert_eq!(options.client_id(), "queue-kitchen");
        assert!(!options.clean_session());
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 1884));
    }

    #[test]
    fn should_decode_json_payload() {
        let message = decode(br#"{"action":"lirc.input","params":{"command":"KEY_UP"}}"#).unwrap();
        assert_eq!(message.action_name(), Some("lirc.input"));
        assert_eq!(message.param("command"), Some(&json!("KEY_UP")));
    }

    #[test]
    fn should_reject_non_json_payload() {
        let result = decode(b"not json");
        assert!(matches!(result, Err(MqttError::PayloadParse(_))));
    }
}
