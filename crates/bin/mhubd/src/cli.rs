//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Overrides;

/// mhub: home-automation message hub.
#[derive(Parser, Debug)]
#[command(name = "mhubd", version, about, long_about = None)]
pub struct Cli {
    /// Hub configuration file.
    #[arg(long, short, env = "MHUB_CONFIG", default_value = "mhub.toml", global = true)]
    pub config: PathBuf,

    /// Broker host, overriding the configuration file.
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Broker port, overriding the configuration file.
    #[arg(long, short, global = true)]
    pub port: Option<u16>,

    /// Increase log verbosity (`-v` debug, `-vv` trace).
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the hub until SIGINT/SIGTERM (default).
    Serve,
    /// Publish one JSON event on the bus and exit.
    Send {
        /// Event body, e.g. `{"action": "switch", "params": {"device": "A1", "state": true}}`.
        message: String,
    },
    /// List discovered plugins and whether they are enabled.
    Plugins,
}

impl Cli {
    /// Subcommand to run.
    #[must_use]
    pub fn subcommand(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Command-line configuration overrides.
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn should_have_consistent_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn should_default_to_serve() {
        let cli = Cli::try_parse_from(["mhubd"]).unwrap();
        assert_eq!(cli.subcommand(), Command::Serve);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn should_parse_send_with_overrides() {
        let cli = Cli::try_parse_from([
            "mhubd",
            "send",
            r#"{"action":"ping"}"#,
            "--host",
            "broker.lan",
            "-p",
            "1884",
            "-vv",
        ])
        .unwrap();

        assert_eq!(
            cli.subcommand(),
            Command::Send {
                message: r#"{"action":"ping"}"#.to_string()
            }
        );
        assert_eq!(cli.overrides().host.as_deref(), Some("broker.lan"));
        assert_eq!(cli.overrides().port, Some(1884));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn should_parse_plugins_with_config_path() {
        let cli = Cli::try_parse_from(["mhubd", "--config", "/etc/mhub.toml", "plugins"]).unwrap();
        assert_eq!(cli.subcommand(), Command::Plugins);
        assert_eq!(cli.config, PathBuf::from("/etc/mhub.toml"));
    }

    #[test]
    fn should_reject_invalid_port() {
        assert!(Cli::try_parse_from(["mhubd", "--port", "70000"]).is_err());
    }
}
