//! `heartbeat` — a periodic liveness signal.

use async_trait::async_trait;
use serde_json::json;

use mhub_app::ports::{Plugin, PluginContext, Task};
use mhub_domain::error::HandlerError;
use mhub_domain::message::Message;
use mhub_domain::plugin_config::PluginConfig;
use mhub_domain::time::{self, Timestamp};

const DEFAULT_INTERVAL_SECS: f64 = 60.0;

/// Logs a heartbeat every `interval` seconds and, when `publish` is set,
/// puts a `heartbeat` message on the bus.
#[derive(Debug, Default)]
pub struct Heartbeat;

/// Message published on every beat.
#[must_use]
pub fn heartbeat_message(at: Timestamp) -> Message {
    Message::action("heartbeat", json!({ "timestamp": time::to_wire(at) }))
}

#[async_trait]
impl Plugin for Heartbeat {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn description(&self) -> &str {
        "Heartbeat plugin"
    }

    fn default_config(&self) -> PluginConfig {
        PluginConfig::new()
            .with("interval", DEFAULT_INTERVAL_SECS)
            .with("publish", false)
    }

    async fn on_init(&mut self, ctx: PluginContext) -> Result<Vec<Task>, HandlerError> {
        let config = ctx.config();
        let interval = crate::f64_or(config, "interval", DEFAULT_INTERVAL_SECS)?;
        let publish = config.get_bool("publish").unwrap_or(false);
        let publisher = ctx.publisher().clone();

        let task = Task::from_secs("beat", interval, move || {
            let publisher = publisher.clone();
            async move {
                tracing::info!(interval_secs = interval, "heartbeat");
                if publish {
                    publisher.publish(heartbeat_message(time::now())).await?;
                }
                Ok::<_, HandlerError>(())
            }
        })?;

        Ok(vec![task])
    }
}
