//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `mhub.toml` in the working directory unless told otherwise.
//! Every field has a sensible default so the file is optional. Precedence,
//! lowest first: defaults, file, environment, command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use mhub_adapter_mqtt::MqttConfig;
use mhub_app::controller::HubSettings;
use mhub_app::ports::ConnectionSettings;

/// Default log filter when nothing else is configured.
pub const DEFAULT_FILTER: &str = "mhubd=info,mhub=info";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node identity and loop timings.
    pub general: GeneralConfig,
    /// Broker settings.
    pub bus: BusConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// `[general]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Node name; the bound queue is `queue-<name>`.
    pub name: String,
    /// Seconds between bus polls.
    pub poll_interval: f64,
    /// Upper bound on a single poll, in seconds.
    pub poll_timeout: f64,
    /// Seconds in-flight tasks get to finish at shutdown.
    pub shutdown_grace: f64,
    /// Root of the per-plugin configuration records.
    pub config_dir: PathBuf,
    /// Root of the per-plugin cache directories.
    pub cache_dir: PathBuf,
}

/// Which transport backs the bus.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// An MQTT broker.
    #[default]
    Mqtt,
    /// In-process fanout; only this process's plugins see the traffic.
    Memory,
}

/// `[bus]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Transport.
    pub kind: BusKind,
    /// Broker host.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Login, if the broker requires one.
    pub username: Option<String>,
    /// Password for `username`.
    pub password: Option<String>,
    /// Virtual host on the broker.
    pub vhost: Option<String>,
    /// MQTT keep-alive, in seconds.
    pub keep_alive_secs: u16,
    /// How long to wait for the broker to accept the session, in seconds.
    pub connect_timeout_secs: u16,
}

/// `[logging]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: Option<String>,
}

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    /// `--host`.
    pub host: Option<String>,
    /// `--port`.
    pub port: Option<u16>,
}

impl Config {
    /// Load `path` (if present), then apply environment and command-line
    /// overrides and validate the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable or malformed,
    /// or if the merged configuration is invalid.
    pub fn load(path: &Path, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("MHUB_HOST") {
            self.bus.host = val;
        }
        if let Some(port) = var("MHUB_PORT").and_then(|val| val.parse().ok()) {
            self.bus.port = port;
        }
        if let Some(val) = var("MHUB_NODE") {
            self.general.name = val;
        }
        if let Some(val) = var("MHUB_LOG") {
            self.logging.filter = Some(val);
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = Some(val);
        }
    }

    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(host) = &overrides.host {
            self.bus.host.clone_from(host);
        }
        if let Some(port) = overrides.port {
            self.bus.port = port;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.general.name.trim().is_empty() {
            return Err(ConfigError::Validation("node name must not be empty".to_string()));
        }
        seconds("poll_interval", self.general.poll_interval)?;
        seconds("poll_timeout", self.general.poll_timeout)?;
        if Duration::try_from_secs_f64(self.general.shutdown_grace).is_err() {
            return Err(ConfigError::Validation(
                "shutdown_grace must be a non-negative number of seconds".to_string(),
            ));
        }
        Ok(())
    }

    /// Log filter: configured value, else one derived from `-v` count.
    #[must_use]
    pub fn log_filter(&self, verbose: u8) -> String {
        if let Some(filter) = &self.logging.filter {
            return filter.clone();
        }
        match verbose {
            0 => DEFAULT_FILTER.to_string(),
            1 => "mhubd=debug,mhub=debug".to_string(),
            _ => "mhubd=trace,mhub=trace".to_string(),
        }
    }

    /// Broker connection parameters.
    #[must_use]
    pub fn connection(&self) -> ConnectionSettings {
        ConnectionSettings {
            host: self.bus.host.clone(),
            port: self.bus.port,
            username: self.bus.username.clone(),
            password: self.bus.password.clone(),
            vhost: self.bus.vhost.clone(),
        }
    }

    /// MQTT transport tuning.
    #[must_use]
    pub fn mqtt(&self) -> MqttConfig {
        MqttConfig {
            keep_alive_secs: self.bus.keep_alive_secs,
            connect_timeout_secs: self.bus.connect_timeout_secs,
            ..MqttConfig::default()
        }
    }

    /// Controller settings. Only meaningful on a validated config.
    #[must_use]
    pub fn hub_settings(&self) -> HubSettings {
        let general = &self.general;
        let mut settings = HubSettings::new(&general.name, self.connection());
        settings.poll_interval = Duration::from_secs_f64(general.poll_interval);
        settings.poll_timeout = Duration::from_secs_f64(general.poll_timeout);
        settings.shutdown_grace = Duration::from_secs_f64(general.shutdown_grace);
        settings.cache_dir = Some(general.cache_dir.clone());
        settings
    }
}

fn seconds(key: &str, value: f64) -> Result<(), ConfigError> {
    let positive = Duration::try_from_secs_f64(value).is_ok_and(|duration| !duration.is_zero());
    if value.is_finite() && positive {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{key} must be a positive number of seconds"
        )))
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: "mhub".to_string(),
            poll_interval: 0.1,
            poll_timeout: 0.1,
            shutdown_grace: 5.0,
            config_dir: PathBuf::from("./config"),
            cache_dir: PathBuf::from("./cache"),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        let mqtt = MqttConfig::default();
        Self {
            kind: BusKind::default(),
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            vhost: None,
            keep_alive_secs: mqtt.keep_alive_secs,
            connect_timeout_secs: mqtt.connect_timeout_secs,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
