//! Task scheduler — fires every registered (plugin, interval, callback) tuple.
//!
//! Each tuple gets its own tokio task and its own [`tokio::time::interval`],
//! so a slow or failing callback only ever delays itself. Ticks are measured
//! from the scheduled fire time; when a firing overruns, the missed ticks are
//! replayed back-to-back ([`MissedTickBehavior::Burst`]). Since one loop owns
//! the callback, firings of the same tuple never overlap. Firings of different
//! tuples take turns on the scheduler's [`CallbackLock`], so two callbacks
//! never run at once even on a multi-threaded runtime.

use std::fmt;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::guard::CallbackLock;
use crate::ports::Task;

/// Lifecycle of the [`TaskScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Accepting registrations, nothing fires yet.
    Idle,
    /// Every registered tuple is firing.
    Armed,
    /// Shut down; terminal.
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Armed => f.write_str("armed"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Registration was refused.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The task would fire in a busy loop.
    #[error("task '{task}' of plugin '{plugin}' has a zero interval")]
    ZeroInterval {
        /// Owning plugin.
        plugin: String,
        /// Task name.
        task: String,
    },

    /// Tasks can only be registered before arming.
    #[error("scheduler is {0}, tasks can only be registered while idle")]
    NotIdle(SchedulerState),
}

struct Tuple {
    plugin: String,
    task: Task,
}

/// Owner of every periodic task of the hub.
pub struct TaskScheduler {
    state: SchedulerState,
    pending: Vec<Tuple>,
    running: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
    lock: CallbackLock,
}

impl TaskScheduler {
    /// Create an idle scheduler whose loops stop when `shutdown` is cancelled.
    #[must_use]
    pub fn new(shutdown: CancellationToken) -> Self {
        Self::with_lock(shutdown, CallbackLock::default())
    }

    /// Like [`new`](Self::new), taking turns on `lock` with other plugin callbacks.
    #[must_use]
    pub fn with_lock(shutdown: CancellationToken, lock: CallbackLock) -> Self {
        Self {
            state: SchedulerState::Idle,
            pending: Vec::new(),
            running: Vec::new(),
            shutdown,
            lock,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Number of registered tuples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len() + self.running.len()
    }

    /// Whether no tuple is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a task owned by `plugin`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotIdle`] once armed, and
    /// [`SchedulerError::ZeroInterval`] for a zero-length period.
    pub fn register(&mut self, plugin: impl Into<String>, task: Task) -> Result<(), SchedulerError> {
        let plugin = plugin.into();
        if self.state != SchedulerState::Idle {
            return Err(SchedulerError::NotIdle(self.state));
        }
        if task.interval().is_zero() {
            return Err(SchedulerError::ZeroInterval {
                plugin,
                task: task.name().to_string(),
            });
        }

        tracing::debug!(
            plugin = %plugin,
            task = %task.name(),
            interval_ms = task.interval().as_millis(),
            "registering task"
        );
        self.pending.push(Tuple { plugin, task });
        Ok(())
    }

    /// Start every registered tuple. The first firing of each is immediate.
    ///
    /// Must be called from within a tokio runtime. Arming twice is a no-op.
    pub fn arm(&mut self) {
        if self.state != SchedulerState::Idle {
            return;
        }
        self.state = SchedulerState::Armed;

        tracing::info!(tasks = self.pending.len(), "arming task scheduler");
        for Tuple { plugin, task } in self.pending.drain(..) {
            let shutdown = self.shutdown.clone();
            let lock = self.lock.clone();
            self.running
                .push(tokio::spawn(run_tuple(plugin, task, shutdown, lock)));
        }
    }

    /// Stop every tuple, letting in-flight firings finish.
    ///
    /// Loops still busy after `grace` are aborted.
    pub async fn shutdown(&mut self, grace: Duration) {
        if self.state == SchedulerState::Stopped {
            return;
        }
        self.state = SchedulerState::Stopped;
        self.shutdown.cancel();
        self.pending.clear();

        let deadline = tokio::time::Instant::now() + grace;
        for mut handle in self.running.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::error!(%err, "task loop terminated abnormally"),
                Err(_elapsed) => {
                    tracing::warn!("task still running after shutdown grace period, aborting");
                    handle.abort();
                }
            }
        }
        tracing::debug!("task scheduler stopped");
    }
}

impl fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("state", &self.state)
            .field("tasks", &self.len())
            .finish_non_exhaustive()
    }
}

async fn run_tuple(
    plugin: String,
    mut task: Task,
    shutdown: CancellationToken,
    lock: CallbackLock,
) {
    let mut ticker = tokio::time::interval(task.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tracing::trace!(plugin = %plugin, task = %task.name(), "firing task");
        if let Err(err) = lock.run(task.fire()).await {
            tracing::warn!(plugin = %plugin, task = %task.name(), %err, "task failed");
        }
    }
}
