//! Plugin configuration — the persisted settings map of one plugin.
//!
//! A configuration is an open mapping of string keys to typed values. The
//! only key the hub itself interprets is [`ENABLED_KEY`]; everything else
//! belongs to the plugin that owns the record.

use serde::{Deserialize, Serialize};

/// Key holding the opt-in flag of a plugin.
pub const ENABLED_KEY: &str = "enabled";

/// Settings map of a single plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginConfig(serde_json::Map<String, serde_json::Value>);

impl PluginConfig {
    /// An empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used by plugins to declare their defaults.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Whether the plugin is opted in.
    ///
    /// A missing or non-boolean `enabled` key reads as `false`.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.0
            .get(ENABLED_KEY)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether an `enabled` key is present at all.
    #[must_use]
    pub fn has_enabled(&self) -> bool {
        self.0.contains_key(ENABLED_KEY)
    }

    /// Set the opt-in flag.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.0
            .insert(ENABLED_KEY.to_string(), serde_json::Value::Bool(enabled));
    }

    /// Raw lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// String value for `key`, if present and a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(serde_json::Value::as_str)
    }

    /// Numeric value for `key` (integers are widened).
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(serde_json::Value::as_f64)
    }

    /// Unsigned integer value for `key`.
    #[must_use]
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(serde_json::Value::as_u64)
    }

    /// Boolean value for `key`.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(serde_json::Value::as_bool)
    }

    /// List of strings for `key`; `None` if any item is not a string.
    #[must_use]
    pub fn get_str_list(&self, key: &str) -> Option<Vec<String>> {
        self.0
            .get(key)
            .and_then(serde_json::Value::as_array)
            .and_then(|items| {
                items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
    }

    /// Iterate over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for PluginConfig {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_read_missing_enabled_as_false() {
        let config = PluginConfig::new().with("socket", "/dev/lircd");
        assert!(!config.enabled());
        assert!(!config.has_enabled());
    }

    #[test]
    fn should_read_non_boolean_enabled_as_false() {
        let config = PluginConfig::new().with(ENABLED_KEY, "yes");
        assert!(!config.enabled());
        assert!(config.has_enabled());
    }

    #[test]
    fn should_toggle_enabled() {
        let mut config = PluginConfig::new();
        config.set_enabled(true);
        assert!(config.enabled());
        config.set_enabled(false);
        assert!(!config.enabled());
    }

    #[test]
    fn should_widen_integers_for_f64_lookup() {
        let config = PluginConfig::new().with("poll_interval", 60);
        assert_eq!(config.get_f64("poll_interval"), Some(60.0));
        assert_eq!(config.get_u64("poll_interval"), Some(60));
    }

    #[test]
    fn should_collect_string_list() {
        let config = PluginConfig::new().with("patterns", serde_json::json!(["rss*", "lirc.*"]));
        assert_eq!(
            config.get_str_list("patterns"),
            Some(vec!["rss*".to_string(), "lirc.*".to_string()])
        );
    }

    #[test]
    fn should_reject_string_list_with_other_items() {
        let config = PluginConfig::new().with("patterns", serde_json::json!(["rss*", 3]));
        assert_eq!(config.get_str_list("patterns"), None);
    }

    #[test]
    fn should_roundtrip_through_serde_json() {
        let config = PluginConfig::new().with("host", "192.168.0.100").with("port", 53008);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PluginConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
