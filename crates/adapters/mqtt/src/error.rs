//! MQTT adapter error types.

use mhub_domain::error::{AckError, PollError, PublishError};

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The rumqttc client rejected a request.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// The event loop lost or could not open the connection.
    #[error("MQTT connection error")]
    Connection(#[source] rumqttc::ConnectionError),

    /// The broker answered `ConnAck` with a failure code.
    #[error("MQTT broker refused the connection: {0}")]
    Refused(String),

    /// The broker refused the subscription.
    #[error("MQTT broker refused subscription to '{0}'")]
    SubscriptionRefused(String),

    /// An incoming payload is not a JSON document.
    #[error("failed to parse MQTT payload")]
    PayloadParse(#[source] serde_json::Error),
}

impl From<MqttError> for PublishError {
    fn from(err: MqttError) -> Self {
        match err {
            MqttError::PayloadParse(err) => Self::Serialize(err),
            other => Self::Transport(Box::new(other)),
        }
    }
}

impl From<MqttError> for PollError {
    fn from(err: MqttError) -> Self {
        Self::Transport(Box::new(err))
    }
}

impl From<MqttError> for AckError {
    fn from(err: MqttError) -> Self {
        Self(Box::new(err))
    }
}
