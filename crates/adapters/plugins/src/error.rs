//! Built-in plugin error types.

use mhub_domain::error::HandlerError;

/// Errors raised by the built-in plugins.
#[derive(Debug, thiserror::Error)]
pub enum BuiltinError {
    /// A notification pattern is not a valid glob.
    #[error("invalid notification pattern '{pattern}'")]
    InvalidPattern {
        /// Offending pattern.
        pattern: String,
        /// Underlying failure.
        #[source]
        source: glob::PatternError,
    },

    /// A switch message names a device that is not `<house letter><unit>`.
    #[error("invalid device '{0}', expected a house letter followed by a unit number")]
    InvalidDevice(String),

    /// Building the HTTP client or fetching a page failed.
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),
}

impl From<BuiltinError> for HandlerError {
    fn from(err: BuiltinError) -> Self {
        Self::failed(err)
    }
}
