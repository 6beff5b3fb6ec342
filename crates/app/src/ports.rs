//! Port definitions — traits that adapters and plugins implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the hub core and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod bus;
pub mod config_store;
pub mod plugin;

pub use bus::{
    AckHandle, Bus, BusProducer, BusSession, ConnectionSettings, Delivery, EXCHANGE_NAME,
    ExchangeKind, Topology,
};
pub use config_store::ConfigStore;
pub use plugin::{Plugin, PluginContext, Task, TaskCallback};
