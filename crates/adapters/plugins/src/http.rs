//! `http` — polls a list of pages and publishes what they return.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use mhub_app::ports::{Plugin, PluginContext, Task};
use mhub_domain::error::HandlerError;
use mhub_domain::message::Message;
use mhub_domain::plugin_config::PluginConfig;

use crate::BuiltinError;

const DEFAULT_POLL_INTERVAL_SECS: f64 = 60.0;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The `http.input` message for one fetched page.
#[must_use]
pub fn page_message(url: &str, status: u16, body: &str) -> Message {
    Message::action(
        "http.input",
        json!({ "url": url, "status": status, "body": body }),
    )
}

/// Fetches every URL in `pages` once per `poll_interval`.
#[derive(Debug, Clone)]
pub struct Http {
    client: reqwest::Client,
}

impl Http {
    /// Build the plugin and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`BuiltinError::Http`] if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, BuiltinError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("mhub/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<(u16, String), BuiltinError> {
    let response = client.get(url).send().await?;
    let status = response.status().as_u16();
    let body = response.text().await?;
    Ok((status, body))
}

#[async_trait]
impl Plugin for Http {
    fn name(&self) -> &str {
        "http"
    }

    fn description(&self) -> &str {
        "HTTP integration"
    }

    fn default_config(&self) -> PluginConfig {
        PluginConfig::new()
            .with("poll_interval", DEFAULT_POLL_INTERVAL_SECS)
            .with("pages", json!([]))
    }

    async fn on_init(&mut self, ctx: PluginContext) -> Result<Vec<Task>, HandlerError> {
        let config = ctx.config();
        let interval = crate::f64_or(config, "poll_interval", DEFAULT_POLL_INTERVAL_SECS)?;
        let pages = crate::list_or(config, "pages", &[])?;
        if pages.is_empty() {
            tracing::info!("no pages configured, nothing to poll");
            return Ok(Vec::new());
        }

        let client = self.client.clone();
        let publisher = ctx.publisher().clone();
        let task = Task::from_secs("get_pages", interval, move || {
            let client = client.clone();
            let publisher = publisher.clone();
            let pages = pages.clone();
            async move {
                for url in &pages {
                    match fetch(&client, url).await {
                        Ok((status, body)) => {
                            tracing::debug!(%url, status, bytes = body.len(), "page fetched");
                            publisher.publish(page_message(url, status, &body)).await?;
                        }
                        Err(err) => tracing::warn!(%url, %err, "page fetch failed"),
                    }
                }
                Ok::<_, HandlerError>(())
            }
        })?;

        Ok(vec![task])
    }
}
