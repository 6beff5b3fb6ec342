//! # mhubd — mhub daemon
//!
//! Composition root that wires the bus, the plugin configuration store, and
//! the built-in plugins into a [`Controller`].
//!
//! ## Responsibilities
//! - Parse the command line and the `mhub.toml` configuration
//! - Install the `tracing` subscriber
//! - Pick the bus transport (`mqtt` or in-process `memory`)
//! - Drive the controller lifecycle for `serve`, `send`, and `plugins`
//! - Translate SIGINT/SIGTERM into a graceful shutdown
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no hub logic belongs here.

mod cli;
mod config;
mod shutdown;

use clap::Parser as _;
use tracing_subscriber::EnvFilter;

use mhub_adapter_config_toml::FileConfigStore;
use mhub_adapter_mqtt::MqttBus;
use mhub_adapter_plugins::builtin_catalog;
use mhub_app::bus::InProcessBus;
use mhub_app::controller::Controller;
use mhub_app::ports::Bus;
use mhub_app::registry::{PluginCatalog, PluginRegistry, discover};
use mhub_domain::message::Message;

use crate::cli::{Cli, Command};
use crate::config::{BusKind, Config};

type BoxError = Box<dyn std::error::Error>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config, &cli.overrides())?;
    init_tracing(&config.log_filter(cli.verbose));
    tracing::debug!(path = %cli.config.display(), "configuration loaded");

    let command = cli.subcommand();
    match config.bus.kind {
        BusKind::Mqtt => {
            let bus = MqttBus::for_node(&config.general.name, config.mqtt());
            execute(bus, command, &config).await
        }
        BusKind::Memory => execute(InProcessBus::default(), command, &config).await,
    }
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("mhubd: invalid log filter '{filter}' ({err}), using defaults");
        EnvFilter::new(config::DEFAULT_FILTER)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn execute<B: Bus>(bus: B, command: Command, config: &Config) -> Result<(), BoxError> {
    let store = FileConfigStore::new(&config.general.config_dir);
    match command {
        Command::Serve => serve(Controller::new(bus, store, config.hub_settings())).await,
        Command::Send { message } => {
            let message: Message = serde_json::from_str(&message)?;
            send(Controller::new(bus, store, config.hub_settings()), &message).await
        }
        Command::Plugins => {
            list_plugins(&store);
            Ok(())
        }
    }
}

async fn serve<B: Bus>(mut controller: Controller<B, FileConfigStore>) -> Result<(), BoxError> {
    shutdown::install_signal_handler(controller.shutdown_token())?;

    controller.setup_messaging().await?;
    controller.setup_plugins(builtin_catalog(), PluginCatalog::user())?;
    controller.initialise().await?;
    controller.run().await?;
    Ok(())
}

async fn send<B: Bus>(
    mut controller: Controller<B, FileConfigStore>,
    message: &Message,
) -> Result<(), BoxError> {
    controller.setup_messaging().await?;
    let result = controller.publish(message).await;
    controller.close().await;
    result?;
    tracing::info!(%message, "event sent");
    Ok(())
}

fn list_plugins(store: &FileConfigStore) {
    let registry = PluginRegistry::load_all(
        discover(builtin_catalog(), PluginCatalog::user()),
        store,
        None,
    );

    println!("{:<16} {:<8} {:<8} DESCRIPTION", "NAME", "ORIGIN", "ENABLED");
    for descriptor in registry.iter() {
        println!(
            "{:<16} {:<8} {:<8} {}",
            descriptor.name(),
            descriptor.origin().to_string(),
            if descriptor.is_enabled() { "yes" } else { "no" },
            descriptor.plugin().description(),
        );
    }
    for failure in registry.load_failures() {
        println!("! {failure}");
    }
}
