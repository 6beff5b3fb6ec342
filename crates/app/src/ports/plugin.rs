//! Plugin port — the capability set every hosted plugin exposes.
//!
//! A plugin bridges something outside the hub (a socket, a feed, a desktop
//! notifier, …) to the bus. The controller drives the lifecycle in order:
//!
//! 1. construction by the plugin's factory (see [`crate::registry`])
//! 2. [`Plugin::on_init`] — exactly once, after the publish capability is
//!    attached; returns the periodic [`Task`]s to schedule
//! 3. [`Plugin::on_message`] — once per inbound message, for plugins that
//!    declare it via [`Plugin::handles_messages`]
//!
//! Only the identity is mandatory; every other member has a no-op default.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mhub_domain::error::HandlerError;
use mhub_domain::message::Message;
use mhub_domain::plugin_config::PluginConfig;

use crate::publisher::Publisher;

/// A hosted integration plugin.
#[async_trait]
pub trait Plugin: Send {
    /// Stable identity used in logs (e.g. `"lirc"`).
    fn name(&self) -> &str;

    /// Human-readable one-liner.
    fn description(&self) -> &str {
        ""
    }

    /// Configuration written on first run. `enabled` is always forced off.
    fn default_config(&self) -> PluginConfig {
        PluginConfig::new()
    }

    /// One-time initialisation; returns the periodic tasks to register.
    ///
    /// Publishing from here fails with `PublishError::NotReady` because the
    /// registry has not finished registering every plugin yet.
    async fn on_init(&mut self, _ctx: PluginContext) -> Result<Vec<Task>, HandlerError> {
        Ok(Vec::new())
    }

    /// Whether this plugin wants [`on_message`](Self::on_message) calls.
    fn handles_messages(&self) -> bool {
        false
    }

    /// Handle one inbound message.
    async fn on_message(&mut self, _message: &Message) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Everything a plugin receives at initialisation.
#[derive(Debug, Clone)]
pub struct PluginContext {
    name: String,
    config: PluginConfig,
    cache_dir: Option<PathBuf>,
    publisher: Publisher,
    shutdown: CancellationToken,
}

impl PluginContext {
    /// Assemble a context for plugin `name`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        config: PluginConfig,
        cache_dir: Option<PathBuf>,
        publisher: Publisher,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            cache_dir,
            publisher,
            shutdown,
        }
    }

    /// Registered name of the plugin.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved configuration record.
    #[must_use]
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Private scratch directory, when the registry prepared one.
    #[must_use]
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// The publish-only bus capability.
    #[must_use]
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Token cancelled when the hub starts shutting down.
    #[must_use]
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}

/// The zero-argument action behind a periodic task.
///
/// Implemented for every `FnMut() -> impl Future<Output = Result<(), HandlerError>>`,
/// so plugins usually pass a closure. The scheduler holds each callback
/// exclusively, which is what serializes firings of the same task.
#[async_trait]
pub trait TaskCallback: Send {
    /// Run one firing.
    async fn run(&mut self) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> TaskCallback for F
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn run(&mut self) -> Result<(), HandlerError> {
        (self)().await
    }
}

/// A periodic unit of work declared by a plugin.
pub struct Task {
    name: String,
    interval: Duration,
    callback: Box<dyn TaskCallback>,
}

impl Task {
    /// Declare a task firing every `interval`.
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        callback: impl TaskCallback + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            interval,
            callback: Box::new(callback),
        }
    }

    /// Declare a task from an interval in (fractional) seconds.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::InvalidInterval`] unless `secs` is positive
    /// and finite.
    pub fn from_secs(
        name: impl Into<String>,
        secs: f64,
        callback: impl TaskCallback + 'static,
    ) -> Result<Self, HandlerError> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(HandlerError::InvalidInterval(secs));
        }
        let interval =
            Duration::try_from_secs_f64(secs).map_err(|_| HandlerError::InvalidInterval(secs))?;
        if interval.is_zero() {
            return Err(HandlerError::InvalidInterval(secs));
        }
        Ok(Self::new(name, interval, callback))
    }

    /// Task name, unique within its plugin by convention.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Firing period.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one firing of the callback.
    ///
    /// # Errors
    ///
    /// Propagates whatever the callback returns.
    pub async fn fire(&mut self) -> Result<(), HandlerError> {
        self.callback.run().await
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
