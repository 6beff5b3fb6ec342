//! TOML store error types.

use std::path::PathBuf;

use mhub_domain::error::StoreError;

/// Errors specific to the TOML configuration store.
#[derive(Debug, thiserror::Error)]
pub enum TomlStoreError {
    /// Reading a record failed.
    #[error("failed to read {}", path.display())]
    Read {
        /// Record file.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// Writing a record failed.
    #[error("failed to write {}", path.display())]
    Write {
        /// Record file.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// A record is not valid TOML.
    #[error("failed to parse {}", path.display())]
    Parse {
        /// Record file.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: toml::de::Error,
    },

    /// A record holds a value TOML cannot represent (e.g. `null`).
    #[error("failed to serialize record for plugin '{name}'")]
    Serialize {
        /// Plugin name.
        name: String,
        /// Underlying failure.
        #[source]
        source: toml::ser::Error,
    },
}

impl From<TomlStoreError> for StoreError {
    fn from(err: TomlStoreError) -> Self {
        match err {
            TomlStoreError::Read { ref source, .. } | TomlStoreError::Write { ref source, .. } => {
                let kind = source.kind();
                Self::Io(std::io::Error::new(kind, err))
            }
            TomlStoreError::Parse { .. } => Self::Decode(Box::new(err)),
            TomlStoreError::Serialize { .. } => Self::Encode(Box::new(err)),
        }
    }
}
