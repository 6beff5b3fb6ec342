//! `byebyestandby` — bridge to a ByeByeStandby RF socket controller over UDP.
//!
//! The controller speaks a line protocol of `D:<state><house><unit>:E`
//! frames on `port_send` and reports activity on `port_receive`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::net::UdpSocket;

use mhub_app::ports::{Plugin, PluginContext, Task};
use mhub_domain::error::HandlerError;
use mhub_domain::message::Message;
use mhub_domain::plugin_config::PluginConfig;

use crate::BuiltinError;

const DEFAULT_HOST: &str = "192.168.0.100";
const DEFAULT_PORT_RECEIVE: u16 = 53007;
const DEFAULT_PORT_SEND: u16 = 53008;
const DEFAULT_FREQUENCY: u64 = 3;
const POLL_INTERVAL_SECS: f64 = 0.1;

/// Datagrams the controller sends on its own that carry no user input.
const NOISE: [&str; 2] = ["Sent heartbeat", "Z:OK:E"];

/// Whether an inbound datagram is controller chatter rather than input.
#[must_use]
pub fn is_noise(data: &str) -> bool {
    NOISE.iter().any(|noise| data.contains(noise))
}

/// Encode a switch frame for `device` (`"A1"`: house `A`, unit `1`).
///
/// # Errors
///
/// Returns [`BuiltinError::InvalidDevice`] when `device` is not a house
/// letter followed by a unit number.
pub fn switch_command(device: &str, state: bool) -> Result<String, BuiltinError> {
    let invalid = || BuiltinError::InvalidDevice(device.to_string());
    let mut chars = device.chars();
    let house = chars
        .next()
        .filter(char::is_ascii_alphabetic)
        .ok_or_else(invalid)?;
    let unit: u8 = chars.as_str().parse().map_err(|_| invalid())?;
    Ok(format!(
        "D:{}{}{unit:02}:E",
        u8::from(state),
        house.to_ascii_uppercase()
    ))
}

struct Link {
    receive: Arc<UdpSocket>,
    send: UdpSocket,
    host: String,
    port_send: u16,
}

/// Publishes controller input and drives RF sockets on `switch` messages.
#[derive(Default)]
pub struct ByeByeStandby {
    link: Option<Link>,
}

impl ByeByeStandby {
    /// Address the input socket is bound to, once initialised.
    #[must_use]
    pub fn receive_addr(&self) -> Option<SocketAddr> {
        self.link.as_ref().and_then(|link| link.receive.local_addr().ok())
    }

    async fn switch(&self, message: &Message) -> Result<(), HandlerError> {
        let Some(link) = self.link.as_ref() else {
            tracing::debug!("switch ignored, sockets not bound");
            return Ok(());
        };
        let device = message
            .param("device")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| BuiltinError::InvalidDevice(String::new()))?;
        let state = message
            .param("state")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        let frequency = message
            .param("frequency")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(DEFAULT_FREQUENCY);

        let command = switch_command(device, state)?;
        tracing::debug!(%device, state, frequency, %command, "switching");
        for _ in 0..frequency {
            link.send
                .send_to(command.as_bytes(), (link.host.as_str(), link.port_send))
                .await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ByeByeStandby {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByeByeStandby")
            .field("bound", &self.link.is_some())
            .finish()
    }
}

fn drain(socket: &UdpSocket) -> Vec<String> {
    let mut buf = [0_u8; 1500];
    let mut received = Vec::new();
    loop {
        match socket.try_recv_from(&mut buf) {
            Ok((len, from)) => {
                let data = String::from_utf8_lossy(&buf[..len]).trim().to_string();
                tracing::trace!(%from, %data, "datagram");
                if !is_noise(&data) {
                    received.push(data);
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
            Err(err) => {
                tracing::warn!(%err, "byebyestandby receive failed");
                break;
            }
        }
    }
    received
}

#[async_trait]
impl Plugin for ByeByeStandby {
    fn name(&self) -> &str {
        "byebyestandby"
    }

    fn description(&self) -> &str {
        "ByeByeStandby home automation integration"
    }

    fn default_config(&self) -> PluginConfig {
        PluginConfig::new()
            .with("host", DEFAULT_HOST)
            .with("port_receive", DEFAULT_PORT_RECEIVE)
            .with("port_send", DEFAULT_PORT_SEND)
    }

    async fn on_init(&mut self, ctx: PluginContext) -> Result<Vec<Task>, HandlerError> {
        let config = ctx.config();
        let host = crate::str_or(config, "host", DEFAULT_HOST)?.to_string();
        let port_receive = crate::port_or(config, "port_receive", DEFAULT_PORT_RECEIVE)?;
        let port_send = crate::port_or(config, "port_send", DEFAULT_PORT_SEND)?;

        let receive = Arc::new(UdpSocket::bind(("0.0.0.0", port_receive)).await?);
        let send = UdpSocket::bind(("0.0.0.0", 0)).await?;
        tracing::info!(port_receive, %host, port_send, "byebyestandby sockets bound");

        let publisher = ctx.publisher().clone();
        let socket = Arc::clone(&receive);
        let task = Task::from_secs("process_input", POLL_INTERVAL_SECS, move || {
            let publisher = publisher.clone();
            let received = drain(&socket);
            async move {
                for data in received {
                    publisher
                        .publish(Message::action("byebyestandby.input", json!({ "data": data })))
                        .await?;
                }
                Ok::<_, HandlerError>(())
            }
        })?;

        self.link = Some(Link {
            receive,
            send,
            host,
            port_send,
        });
        Ok(vec![task])
    }

    fn handles_messages(&self) -> bool {
        true
    }

    async fn on_message(&mut self, message: &Message) -> Result<(), HandlerError> {
        match message.action_name() {
            Some("switch") => self.switch(message).await,
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing;

    fn local_config(port_send: u16) -> PluginConfig {
        PluginConfig::new()
            .with("host", "127.0.0.1")
            .with("port_receive", 0)
            .with("port_send", port_send)
    }

    #[test]
    fn should_encode_switch_frames() {
        assert_eq!(switch_command("A1", true).unwrap(), "D:1A01:E");
        assert_eq!(switch_command("b12", false).unwrap(), "D:0B12:E");
    }

    #[test]
    fn should_reject_malformed_devices() {
        for device in ["", "A", "1A", "Ax", "A-1"] {
            assert!(
                matches!(switch_command(device, true), Err(BuiltinError::InvalidDevice(_))),
                "{device} should be rejected"
            );
        }
    }

    #[test]
    fn should_recognise_controller_noise() {
        assert!(is_noise("Sent heartbeat"));
        assert!(is_noise("Z:OK:E"));
        assert!(!is_noise("D:1A01:E"));
    }

    #[tokio::test]
    async fn should_send_switch_frame_frequency_times() {
        let controller = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = controller.local_addr().unwrap().port();
        let mut plugin = ByeByeStandby::default();
        let (ctx, _producer) = testing::context("byebyestandby", local_config(port));
        plugin.on_init(ctx).await.unwrap();

        let message = Message::action(
            "switch",
            json!({"device": "C3", "state": true, "frequency": 2}),
        );
        plugin.on_message(&message).await.unwrap();

        let mut buf = [0_u8; 64];
        for _ in 0..2 {
            let (len, _) = tokio::time::timeout(Duration::from_secs(1), controller.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&buf[..len], b"D:1C03:E");
        }
    }

    #[tokio::test]
    async fn should_ignore_other_actions() {
        let mut plugin = ByeByeStandby::default();
        let (ctx, _producer) = testing::context("byebyestandby", local_config(9));
        plugin.on_init(ctx).await.unwrap();

        plugin
            .on_message(&Message::action("lirc.input", json!({"device": "nope"})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn should_fail_switch_without_device() {
        let mut plugin = ByeByeStandby::default();
        let (ctx, _producer) = testing::context("byebyestandby", local_config(9));
        plugin.on_init(ctx).await.unwrap();

        let result = plugin.on_message(&Message::action("switch", json!({"state": true}))).await;
        assert!(matches!(result, Err(HandlerError::Failed(_))));
    }

    #[tokio::test]
    async fn should_publish_input_and_skip_noise() {
        let mut plugin = ByeByeStandby::default();
        let (ctx, producer) = testing::context("byebyestandby", local_config(9));
        let mut tasks = plugin.on_init(ctx).await.unwrap();
        let port = plugin.receive_addr().unwrap().port();

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for data in ["Sent heartbeat", "B:1A01:E", "Z:OK:E"] {
            peer.send_to(data.as_bytes(), ("127.0.0.1", port)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        tasks[0].fire().await.unwrap();

        let sent = producer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].action_name(), Some("byebyestandby.input"));
        assert_eq!(sent[0].param("data"), Some(&json!("B:1A01:E")));
    }
}
