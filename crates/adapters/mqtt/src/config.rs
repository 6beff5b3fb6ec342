//! MQTT transport configuration.

use std::time::Duration;

use serde::Deserialize;

/// Transport tuning for the MQTT bus. Broker address and credentials come
/// from the hub's connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// How long to wait for the broker's `ConnAck` / `SubAck`, in seconds.
    pub connect_timeout_secs: u16,
    /// Capacity of the outgoing request queue.
    pub request_capacity: usize,
}

impl MqttConfig {
    /// Keep-alive as a [`Duration`].
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(u64::from(self.keep_alive_secs))
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.connect_timeout_secs))
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            keep_alive_secs: 30,
            connect_timeout_secs: 5,
            request_capacity: 1024,
        }
    }
}
