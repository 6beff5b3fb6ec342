//! Config store port — persistence for per-plugin configuration records.
//!
//! Records are read once at registry startup and written only when a
//! first-seen plugin gets its default record synthesized.

use mhub_domain::error::StoreError;
use mhub_domain::plugin_config::PluginConfig;

/// Storage for one [`PluginConfig`] record per plugin name.
pub trait ConfigStore {
    /// Load the record for `name`, or `None` if none has been persisted yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record exists but cannot be read.
    fn load(&self, name: &str) -> Result<Option<PluginConfig>, StoreError>;

    /// Persist the record for `name`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record cannot be written.
    fn save(&self, name: &str, config: &PluginConfig) -> Result<(), StoreError>;
}

impl<T: ConfigStore + ?Sized> ConfigStore for &T {
    fn load(&self, name: &str) -> Result<Option<PluginConfig>, StoreError> {
        (**self).load(name)
    }

    fn save(&self, name: &str, config: &PluginConfig) -> Result<(), StoreError> {
        (**self).save(name, config)
    }
}
