//! # mhub-adapter-plugins
//!
//! Plugins shipped with the hub. Each one is a thin bridge between one
//! outside signal source and the `mhub` exchange.
//!
//! | Plugin | Inbound (bus → world) | Outbound (world → bus) |
//! |--------|-----------------------|------------------------|
//! | `heartbeat` | — | periodic `heartbeat` |
//! | `notify` | matching actions become notifications | — |
//! | `lirc` | — | `lirc.input` per remote key press |
//! | `byebyestandby` | `switch` drives RF sockets | `byebyestandby.input` |
//! | `http` | — | `http.input` per polled page |
//!
//! Every plugin starts disabled; the operator opts in by editing the
//! generated configuration record.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `mhub-app` and `mhub-domain`.

pub mod byebyestandby;
mod error;
pub mod heartbeat;
pub mod http;
#[cfg(unix)]
pub mod lirc;
pub mod notify;

pub use error::BuiltinError;

use mhub_app::ports::Plugin;
use mhub_app::registry::PluginCatalog;
use mhub_domain::error::HandlerError;
use mhub_domain::plugin_config::PluginConfig;

/// Catalog of every built-in plugin, in dispatch order.
#[must_use]
pub fn builtin_catalog() -> PluginCatalog {
    let catalog = PluginCatalog::builtin()
        .with_default::<heartbeat::Heartbeat>("heartbeat")
        .with_default::<notify::Notify>("notify");
    #[cfg(unix)]
    let catalog = catalog.with_default::<lirc::Lirc>("lirc");
    catalog
        .with_default::<byebyestandby::ByeByeStandby>("byebyestandby")
        .with("http", || {
            let plugin = http::Http::new()?;
            Ok(Box::new(plugin) as Box<dyn Plugin>)
        })
}

/// Number at `key`, `default` when absent.
pub(crate) fn f64_or(config: &PluginConfig, key: &str, default: f64) -> Result<f64, HandlerError> {
    typed_or(config, key, default, PluginConfig::get_f64)
}

/// String at `key`, `default` when absent.
pub(crate) fn str_or<'a>(
    config: &'a PluginConfig,
    key: &str,
    default: &'a str,
) -> Result<&'a str, HandlerError> {
    typed_or(config, key, default, PluginConfig::get_str)
}

/// Port number at `key`, `default` when absent.
pub(crate) fn port_or(config: &PluginConfig, key: &str, default: u16) -> Result<u16, HandlerError> {
    let port = typed_or(config, key, u64::from(default), PluginConfig::get_u64)?;
    u16::try_from(port).map_err(|_| invalid(key))
}

/// List of strings at `key`, `default` when absent.
pub(crate) fn list_or(
    config: &PluginConfig,
    key: &str,
    default: &[&str],
) -> Result<Vec<String>, HandlerError> {
    let default = default.iter().map(ToString::to_string).collect();
    typed_or(config, key, default, PluginConfig::get_str_list)
}

/// `default` when `key` is absent, the typed value when it reads, an error otherwise.
fn typed_or<'a, T>(
    config: &'a PluginConfig,
    key: &str,
    default: T,
    read: impl FnOnce(&'a PluginConfig, &str) -> Option<T>,
) -> Result<T, HandlerError> {
    if config.get(key).is_none() {
        return Ok(default);
    }
    read(config, key).ok_or_else(|| invalid(key))
}

fn invalid(key: &str) -> HandlerError {
    HandlerError::InvalidConfig {
        key: key.to_string(),
    }
}
