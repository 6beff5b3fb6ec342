//! Message — the schema-less document carried by the bus.
//!
//! The hub never validates message shape. By convention, peers publish
//! documents of the form `{"action": "<name>", "params": {...}}`, and the
//! accessors below read that convention when it is present.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An event body as published by any bus peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(serde_json::Value);

impl Message {
    /// Wrap an arbitrary JSON document.
    #[must_use]
    pub fn new(payload: serde_json::Value) -> Self {
        Self(payload)
    }

    /// Build a conventional `{"action", "params"}` message.
    #[must_use]
    pub fn action(action: impl Into<String>, params: serde_json::Value) -> Self {
        Self(serde_json::json!({
            "action": action.into(),
            "params": params,
        }))
    }

    /// The `action` field, if the payload is an object carrying a string one.
    #[must_use]
    pub fn action_name(&self) -> Option<&str> {
        self.0.get("action").and_then(serde_json::Value::as_str)
    }

    /// The `params` field, if present.
    #[must_use]
    pub fn params(&self) -> Option<&serde_json::Value> {
        self.0.get("params")
    }

    /// Look up a single parameter by key.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.params().and_then(|params| params.get(key))
    }

    /// Borrow the raw payload.
    #[must_use]
    pub fn payload(&self) -> &serde_json::Value {
        &self.0
    }

    /// Consume the message and return the raw payload.
    #[must_use]
    pub fn into_payload(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for Message {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
