//! # mhub-app
//!
//! Application layer — the hub core and its **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `Bus` / `BusSession` / `BusProducer` / `AckHandle` — fanout transport
//!   - `ConfigStore` — persisted per-plugin configuration
//!   - `Plugin` — the capability set every hosted plugin exposes
//! - Host plugins: `PluginRegistry` (discovery, config, enablement),
//!   `TaskScheduler` (periodic tasks), `MessageRouter` (bus ↔ plugins)
//! - Drive the lifecycle through the `Controller`
//! - Provide **in-process infrastructure** (bus, config store) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `mhub-domain` only (plus tokio for timers and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod bus;
pub mod controller;
pub mod guard;
pub mod memory_store;
pub mod ports;
pub mod publisher;
pub mod registry;
pub mod router;
pub mod scheduler;
