//! # mhub-adapter-config-toml
//!
//! [`ConfigStore`] backed by one TOML file per plugin:
//!
//! ```text
//! <config_dir>/plugins/<name>/plugin.toml
//! ```
//!
//! A missing file means "no persisted record". Directories are created on the
//! first write, and records are written to a temporary file first and then
//! renamed into place.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `mhub-app` and `mhub-domain`.

mod error;

pub use error::TomlStoreError;

use std::path::{Path, PathBuf};

use mhub_app::ports::ConfigStore;
use mhub_domain::error::StoreError;
use mhub_domain::plugin_config::PluginConfig;

const RECORD_FILE: &str = "plugin.toml";

/// Plugin configuration records stored under a directory.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    root: PathBuf,
}

impl FileConfigStore {
    /// Store rooted at `config_dir`; records live in `config_dir/plugins`.
    #[must_use]
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: config_dir.into().join("plugins"),
        }
    }

    /// File holding the record of plugin `name`.
    #[must_use]
    pub fn record_path(&self, name: &str) -> PathBuf {
        self.root.join(name).join(RECORD_FILE)
    }

    fn read(path: &Path) -> Result<Option<PluginConfig>, TomlStoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(TomlStoreError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&content)
            .map(Some)
            .map_err(|source| TomlStoreError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    fn write(&self, name: &str, config: &PluginConfig) -> Result<(), TomlStoreError> {
        let content = toml::to_string_pretty(config).map_err(|source| TomlStoreError::Serialize {
            name: name.to_string(),
            source,
        })?;

        let path = self.record_path(name);
        let write_error = |source| TomlStoreError::Write {
            path: path.clone(),
            source,
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(write_error)?;
        }
        let staging = path.with_extension("toml.tmp");
        std::fs::write(&staging, content).map_err(write_error)?;
        std::fs::rename(&staging, &path).map_err(write_error)?;

        tracing::debug!(plugin = %name, path = %path.display(), "plugin configuration saved");
        Ok(())
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self, name: &str) -> Result<Option<PluginConfig>, StoreError> {
        Ok(Self::read(&self.record_path(name))?)
    }

    fn save(&self, name: &str, config: &PluginConfig) -> Result<(), StoreError> {
        Ok(self.write(name, config)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn should_lay_out_one_file_per_plugin() {
        let store = FileConfigStore::new("/etc/mhub");
        assert_eq!(
            store.record_path("lirc"),
            PathBuf::from("/etc/mhub/plugins/lirc/plugin.toml")
        );
    }

    #[test]
    fn should_return_none_when_record_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path());
        assert!(store.load("lirc").unwrap().is_none());
    }

    #[test]
    fn should_create_directories_and_round_trip_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path());
        let config = PluginConfig::new()
            .with("enabled", false)
            .with("socket", "/var/run/lirc/lircd")
            .with("patterns", json!(["lirc.*", "notify"]))
            .with("interval", 0.5);

        store.save("lirc", &config).unwrap();

        assert!(dir.path().join("plugins/lirc/plugin.toml").is_file());
        assert!(!dir.path().join("plugins/lirc/plugin.toml.tmp").exists());
        assert_eq!(store.load("lirc").unwrap(), Some(config));
    }

    #[test]
    fn should_read_operator_edited_file() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("plugins/byebyestandby");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(
            plugin_dir.join("plugin.toml"),
            "enabled = true\nhost = '192.168.1.20'\nport_send = 53008\n",
        )
        .unwrap();

        let config = FileConfigStore::new(dir.path())
            .load("byebyestandby")
            .unwrap()
            .unwrap();

        assert!(config.enabled());
        assert_eq!(config.get_str("host"), Some("192.168.1.20"));
        assert_eq!(config.get_u64("port_send"), Some(53008));
    }

    #[test]
    fn should_report_malformed_record_as_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("plugins/broken");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join("plugin.toml"), "enabled = = true").unwrap();

        let result = FileConfigStore::new(dir.path()).load("broken");

        assert!(matches!(result, Err(StoreError::Decode(_))));
    }

    #[test]
    fn should_reject_values_toml_cannot_hold() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path());
        let config = PluginConfig::new().with("nothing", serde_json::Value::Null);

        let result = store.save("odd", &config);

        assert!(matches!(result, Err(StoreError::Encode(_))));
        assert!(!store.record_path("odd").exists());
    }

    #[test]
    fn should_overwrite_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path());
        store
            .save("notify", &PluginConfig::new().with("enabled", false))
            .unwrap();

        store
            .save("notify", &PluginConfig::new().with("enabled", true))
            .unwrap();

        assert!(store.load("notify").unwrap().unwrap().enabled());
    }
}
