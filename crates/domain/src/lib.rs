//! # mhub-domain
//!
//! Pure domain model for the mhub home automation message hub.
//!
//! ## Responsibilities
//! - Define **Messages** (the schema-less documents carried by the bus)
//! - Define **Plugin configuration** (the persisted per-plugin settings map)
//! - Define the **error taxonomy** shared by every layer
//! - Foundational helpers such as timestamps
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod time;

pub mod message;
pub mod plugin_config;
