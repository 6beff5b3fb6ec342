//! In-memory [`ConfigStore`], for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use mhub_domain::error::StoreError;
use mhub_domain::plugin_config::PluginConfig;

use crate::ports::ConfigStore;

/// Plugin configuration records kept in a [`HashMap`].
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    records: Mutex<HashMap<String, PluginConfig>>,
    writes: AtomicUsize,
}

impl InMemoryConfigStore {
    /// Seed a record, as if it had been persisted by an earlier run.
    #[must_use]
    pub fn with_record(self, name: &str, config: PluginConfig) -> Self {
        self.lock().insert(name.to_string(), config);
        self
    }

    /// Current record for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<PluginConfig> {
        self.lock().get(name).cloned()
    }

    /// Number of successful [`save`](ConfigStore::save) calls.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PluginConfig>> {
        // A poisoned map still holds consistent records; inserts are atomic.
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load(&self, name: &str) -> Result<Option<PluginConfig>, StoreError> {
        Ok(self.get(name))
    }

    fn save(&self, name: &str, config: &PluginConfig) -> Result<(), StoreError> {
        self.lock().insert(name.to_string(), config.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_return_none_for_unknown_plugin() {
        let store = InMemoryConfigStore::default();
        assert!(store.load("missing").unwrap().is_none());
    }

    #[test]
    fn should_round_trip_saved_record() {
        let store = InMemoryConfigStore::default();
        let config = PluginConfig::new().with("enabled", true).with("interval", 5);

        store.save("heartbeat", &config).unwrap();

        assert_eq!(store.load("heartbeat").unwrap(), Some(config));
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn should_not_count_seeded_records_as_writes() {
        let store = InMemoryConfigStore::default().with_record("lirc", PluginConfig::new());
        assert!(store.get("lirc").is_some());
        assert_eq!(store.writes(), 0);
    }
}
