//! `lirc` — publishes infrared remote key presses read from lircd.
//!
//! lircd broadcasts one line per decoded key press on its UNIX socket:
//!
//! ```text
//! <raw code> <repeat count> <command> <remote>
//! 0000000000f40bf0 00 KEY_UP livingroom
//! ```
//!
//! The socket path is read from `socket` (default `/var/run/lirc/lircd`).
//! Older records name it `lircd_socket`, which is honoured when `socket` is
//! absent. A missing daemon never fails initialisation; the plugin retries
//! the connection from its polling task.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tokio::time::Instant;

use mhub_app::ports::{Plugin, PluginContext, Task};
use mhub_domain::error::HandlerError;
use mhub_domain::message::Message;
use mhub_domain::plugin_config::PluginConfig;

const SOCKET_KEY: &str = "socket";
const LEGACY_SOCKET_KEY: &str = "lircd_socket";
const DEFAULT_SOCKET: &str = "/var/run/lirc/lircd";
const POLL_INTERVAL_SECS: f64 = 0.1;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// One decoded key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LircEvent {
    /// Raw scan code.
    pub raw: String,
    /// Repeat counter, as sent by lircd.
    pub count: String,
    /// Key name.
    pub command: String,
    /// Remote name.
    pub remote: String,
}

impl LircEvent {
    /// Parse a lircd broadcast line. Anything but four fields is ignored.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let event = Self {
            raw: fields.next()?.to_string(),
            count: fields.next()?.to_string(),
            command: fields.next()?.to_string(),
            remote: fields.next()?.to_string(),
        };
        fields.next().is_none().then_some(event)
    }

    /// The `lirc.input` message for this key press.
    #[must_use]
    pub fn to_message(&self) -> Message {
        Message::action(
            "lirc.input",
            json!({
                "raw": self.raw,
                "count": self.count,
                "command": self.command,
                "remote": self.remote,
            }),
        )
    }
}

/// Split complete lines off the front of `buffer`, keeping any partial tail.
pub(crate) fn take_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let Some(last_newline) = buffer.iter().rposition(|&byte| byte == b'\n') else {
        return Vec::new();
    };
    let tail = buffer.split_off(last_newline + 1);
    let complete = std::mem::replace(buffer, tail);
    String::from_utf8_lossy(&complete)
        .lines()
        .map(str::to_string)
        .collect()
}

struct Connection {
    path: PathBuf,
    stream: Option<UnixStream>,
    buffer: Vec<u8>,
    next_attempt: Option<Instant>,
}

impl Connection {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            stream: None,
            buffer: Vec::new(),
            next_attempt: None,
        }
    }

    async fn ensure_connected(&mut self) {
        if self.stream.is_some() {
            return;
        }
        if self.next_attempt.is_some_and(|at| Instant::now() < at) {
            return;
        }
        match UnixStream::connect(&self.path).await {
            Ok(stream) => {
                tracing::info!(socket = %self.path.display(), "connected to lircd");
                self.stream = Some(stream);
                self.next_attempt = None;
            }
            Err(err) => {
                tracing::debug!(socket = %self.path.display(), %err, "lircd not reachable");
                self.next_attempt = Some(Instant::now() + RECONNECT_DELAY);
            }
        }
    }

    /// Read whatever lircd sent since the last call, without waiting.
    fn drain(&mut self) -> Vec<LircEvent> {
        let mut chunk = [0_u8; 1024];
        loop {
            let Some(stream) = self.stream.as_ref() else {
                break;
            };
            match stream.try_read(&mut chunk) {
                Ok(0) => {
                    tracing::warn!(socket = %self.path.display(), "lircd closed the connection");
                    self.disconnect();
                }
                Ok(read) => self.buffer.extend_from_slice(&chunk[..read]),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    tracing::warn!(socket = %self.path.display(), %err, "lircd read failed");
                    self.disconnect();
                }
            }
        }

        take_lines(&mut self.buffer)
            .iter()
            .filter_map(|line| LircEvent::parse(line))
            .collect()
    }

    fn disconnect(&mut self) {
        self.stream = None;
        self.buffer.clear();
        self.next_attempt = Some(Instant::now() + RECONNECT_DELAY);
    }
}

/// Bridges lircd key presses onto the bus as `lirc.input` messages.
#[derive(Debug, Default)]
pub struct Lirc;

#[async_trait]
impl Plugin for Lirc {
    fn name(&self) -> &str {
        "lirc"
    }

    fn description(&self) -> &str {
        "Linux infrared remote control daemon integration"
    }

    fn default_config(&self) -> PluginConfig {
        PluginConfig::new().with(SOCKET_KEY, DEFAULT_SOCKET)
    }

    async fn on_init(&mut self, ctx: PluginContext) -> Result<Vec<Task>, HandlerError> {
        let path = socket_path(ctx.config())?;
        let mut connection = Connection::new(path);
        connection.ensure_connected().await;
        if connection.stream.is_none() {
            tracing::warn!(socket = %connection.path.display(), "lircd unavailable, will keep retrying");
        }

        let connection = Arc::new(Mutex::new(connection));
        let publisher = ctx.publisher().clone();
        let task = Task::from_secs("process_events", POLL_INTERVAL_SECS, move || {
            let connection = Arc::clone(&connection);
            let publisher = publisher.clone();
            async move {
                let events = {
                    let mut connection = connection.lock().await;
                    connection.ensure_connected().await;
                    connection.drain()
                };
                for event in events {
                    tracing::debug!(command = %event.command, remote = %event.remote, "remote key press");
                    publisher.publish(event.to_message()).await?;
                }
                Ok::<_, HandlerError>(())
            }
        })?;

        Ok(vec![task])
    }
}

fn socket_path(config: &PluginConfig) -> Result<PathBuf, HandlerError> {
    let key = if config.get(SOCKET_KEY).is_none() && config.get(LEGACY_SOCKET_KEY).is_some() {
        LEGACY_SOCKET_KEY
    } else {
        SOCKET_KEY
    };
    crate::str_or(config, key, DEFAULT_SOCKET).map(PathBuf::from)
}
