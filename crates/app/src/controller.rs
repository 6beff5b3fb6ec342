//! Controller — owns the bus session, the registry, and the process lifecycle.
//!
//! ```text
//! constructed → messaging-configured → plugins-configured → initialized → running → stopped
//! ```
//!
//! A client-mode controller stops after `messaging-configured` and only
//! publishes. Connection failures during setup are fatal; everything after
//! that is logged and survived.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use mhub_domain::error::{HubError, PollError};
use mhub_domain::message::Message;

use crate::guard::CallbackLock;
use crate::ports::{Bus, BusSession, ConfigStore, ConnectionSettings, Topology};
use crate::registry::{PluginCatalog, PluginRegistry, discover};
use crate::router::{DispatchReport, MessageRouter};
use crate::scheduler::TaskScheduler;

/// Runtime parameters of one hub node.
#[derive(Debug, Clone)]
pub struct HubSettings {
    /// Node name; the bound queue is `queue-<node_name>`.
    pub node_name: String,
    /// Broker connection parameters.
    pub connection: ConnectionSettings,
    /// Period between bus polls.
    pub poll_interval: Duration,
    /// Upper bound on a single poll.
    pub poll_timeout: Duration,
    /// How long in-flight task firings may take to finish at shutdown.
    pub shutdown_grace: Duration,
    /// Root of the per-plugin cache directories, if any.
    pub cache_dir: Option<PathBuf>,
}

impl HubSettings {
    /// Settings with the default timings.
    #[must_use]
    pub fn new(node_name: impl Into<String>, connection: ConnectionSettings) -> Self {
        Self {
            node_name: node_name.into(),
            connection,
            poll_interval: Duration::from_millis(100),
            poll_timeout: Duration::from_millis(100),
            shutdown_grace: Duration::from_secs(5),
            cache_dir: None,
        }
    }
}

/// Lifecycle position of the [`Controller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Nothing done yet.
    Constructed,
    /// Connected, topology declared.
    MessagingConfigured,
    /// Registry built.
    PluginsConfigured,
    /// `on_init` ran, tasks registered, publishing armed.
    Initialized,
    /// Scheduler armed, bus polled.
    Running,
    /// Session closed; terminal.
    Stopped,
}

impl ControllerState {
    /// Lower-case name, as used in logs and errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Constructed => "constructed",
            Self::MessagingConfigured => "messaging-configured",
            Self::PluginsConfigured => "plugins-configured",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hub lifecycle driver over a bus `B` and a plugin configuration store `S`.
pub struct Controller<B: Bus, S> {
    bus: B,
    store: S,
    settings: HubSettings,
    state: ControllerState,
    session: Option<B::Session>,
    router: Option<MessageRouter>,
    registry: PluginRegistry,
    scheduler: TaskScheduler,
    lock: CallbackLock,
    shutdown: CancellationToken,
}

impl<B, S> Controller<B, S>
where
    B: Bus,
    S: ConfigStore,
{
    /// Create a controller; nothing is connected yet.
    pub fn new(bus: B, store: S, settings: HubSettings) -> Self {
        let shutdown = CancellationToken::new();
        let lock = CallbackLock::default();
        Self {
            bus,
            store,
            settings,
            state: ControllerState::Constructed,
            session: None,
            router: None,
            registry: PluginRegistry::new(),
            scheduler: TaskScheduler::with_lock(shutdown.child_token(), lock.clone()),
            lock,
            shutdown,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// The plugin registry (empty before `setup_plugins`).
    #[must_use]
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Runtime parameters.
    #[must_use]
    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    ///
    /// Plugins receive a child of it through their context.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn expect_state(&self, expected: ControllerState) -> Result<(), HubError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(HubError::InvalidState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            })
        }
    }

    /// Connect to the bus and declare this node's topology.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Connection`] when the bus is unreachable or refuses
    /// the topology, and [`HubError::InvalidState`] unless freshly constructed.
    pub async fn setup_messaging(&mut self) -> Result<(), HubError> {
        self.expect_state(ControllerState::Constructed)?;

        let connection = &self.settings.connection;
        tracing::info!(host = %connection.host, port = connection.port, "connecting to bus");
        let mut session = self.bus.connect(connection).await?;

        let topology = Topology::for_node(&self.settings.node_name);
        let producer = match session.declare_topology(&topology).await {
            Ok(producer) => producer,
            Err(err) => {
                session.close().await;
                return Err(err.into());
            }
        };
        tracing::info!(exchange = %topology.exchange, queue = %topology.queue, "bus topology declared");

        self.session = Some(session);
        self.router = Some(MessageRouter::with_lock(producer, self.lock.clone()));
        self.state = ControllerState::MessagingConfigured;
        Ok(())
    }

    /// Discover, construct, and configure plugins from both catalogs.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidState`] unless messaging is configured.
    /// Individual plugin failures are logged and skipped.
    pub fn setup_plugins(
        &mut self,
        builtin: PluginCatalog,
        user: PluginCatalog,
    ) -> Result<(), HubError> {
        self.expect_state(ControllerState::MessagingConfigured)?;

        let sources = discover(builtin, user);
        self.registry =
            PluginRegistry::load_all(sources, &self.store, self.settings.cache_dir.as_deref());
        tracing::info!(
            loaded = self.registry.len(),
            enabled = self.registry.enabled_plugins().count(),
            failed = self.registry.load_failures().len(),
            "plugins configured"
        );

        self.state = ControllerState::PluginsConfigured;
        Ok(())
    }

    /// Run `on_init` of every enabled plugin, register their tasks, and arm
    /// plugin publishing. A second call is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidState`] unless plugins are configured.
    pub async fn initialise(&mut self) -> Result<(), HubError> {
        if matches!(
            self.state,
            ControllerState::Initialized | ControllerState::Running
        ) {
            tracing::debug!("plugins already initialised");
            return Ok(());
        }
        self.expect_state(ControllerState::PluginsConfigured)?;
        let Some(router) = self.router.as_ref() else {
            return Err(HubError::InvalidState {
                expected: ControllerState::MessagingConfigured.as_str(),
                actual: self.state.as_str(),
            });
        };

        let tasks = self
            .registry
            .initialise(router.publisher(), &self.shutdown.child_token())
            .await;
        for (plugin, task) in tasks {
            if let Err(err) = self.scheduler.register(plugin, task) {
                tracing::warn!(%err, "task not scheduled");
            }
        }

        router.arm();
        self.state = ControllerState::Initialized;
        tracing::info!(tasks = self.scheduler.len(), "plugins initialised");
        Ok(())
    }

    /// Publish one message as the hub itself (client mode included).
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidState`] before messaging is configured or
    /// after stop, and [`HubError::Publish`] when the bus refuses.
    pub async fn publish(&self, message: &Message) -> Result<(), HubError> {
        match (&self.router, self.state) {
            (Some(router), state) if state != ControllerState::Stopped => {
                router.send(message).await?;
                Ok(())
            }
            _ => Err(HubError::InvalidState {
                expected: ControllerState::MessagingConfigured.as_str(),
                actual: self.state.as_str(),
            }),
        }
    }

    /// Poll the bus once and dispatch every delivery in order.
    ///
    /// # Errors
    ///
    /// Returns the [`PollError`] of the session; [`PollError::Closed`] when
    /// there is no session.
    pub async fn poll_once(&mut self) -> Result<Vec<DispatchReport>, PollError> {
        let (Some(session), Some(router)) = (self.session.as_mut(), self.router.as_ref()) else {
            return Err(PollError::Closed);
        };

        let deliveries = session.poll(self.settings.poll_timeout).await?;
        let mut reports = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            reports.push(router.dispatch(&mut self.registry, delivery).await);
        }
        Ok(reports)
    }

    /// Arm the scheduler and poll the bus until the shutdown token fires,
    /// then drain the scheduler and close the session.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidState`] unless initialised.
    pub async fn run(&mut self) -> Result<(), HubError> {
        self.expect_state(ControllerState::Initialized)?;
        self.state = ControllerState::Running;
        self.scheduler.arm();
        tracing::info!(node = %self.settings.node_name, "hub running");

        let shutdown = self.shutdown.clone();
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.poll_once().await {
                Ok(reports) => {
                    if !reports.is_empty() {
                        tracing::trace!(count = reports.len(), "dispatched deliveries");
                    }
                }
                Err(err) => tracing::warn!(%err, "bus poll failed"),
            }
        }

        tracing::info!("shutting down");
        self.close().await;
        Ok(())
    }

    /// Stop the scheduler and close the bus session. Idempotent.
    pub async fn close(&mut self) {
        if self.state == ControllerState::Stopped {
            return;
        }
        self.shutdown.cancel();
        self.scheduler.shutdown(self.settings.shutdown_grace).await;
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        self.state = ControllerState::Stopped;
        tracing::debug!("controller stopped");
    }
}

impl<B: Bus, S> fmt::Debug for Controller<B, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state)
            .field("settings", &self.settings)
            .field("plugins", &self.registry.len())
            .finish_non_exhaustive()
    }
}
