//! Common error types used across the workspace.
//!
//! Each failure kind the hub distinguishes has its own typed enum. Adapters
//! keep their protocol-specific errors and box them into the `Transport` /
//! source variants below when crossing a port boundary.
//!
//! Only [`ConnectionError`] is allowed to abort the process; every other kind
//! is logged at the boundary that catches it and the hub keeps running.

/// Boxed source error carried across port boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A plugin could not be constructed or configured.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The plugin factory failed.
    #[error("plugin '{name}' cannot be constructed")]
    Construction {
        /// Derived plugin name.
        name: String,
        /// Underlying failure.
        #[source]
        source: BoxError,
    },

    /// The constructed instance reports an empty identity.
    #[error("plugin '{name}' has no identity")]
    MissingIdentity {
        /// Derived plugin name.
        name: String,
    },

    /// Reading or synthesizing the persisted configuration failed.
    #[error("configuration for plugin '{name}' cannot be resolved")]
    Config {
        /// Derived plugin name.
        name: String,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },

    /// The per-plugin cache directory could not be prepared.
    #[error("cache directory for plugin '{name}' cannot be created")]
    CacheDir {
        /// Derived plugin name.
        name: String,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
}

/// The bus is unreachable or refused the topology. Fatal during startup.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Could not establish a session with the broker.
    #[error("cannot connect to bus at {host}:{port}")]
    Unreachable {
        /// Broker host.
        host: String,
        /// Broker port.
        port: u16,
        /// Underlying failure.
        #[source]
        source: BoxError,
    },

    /// The broker did not answer within the connect timeout.
    #[error("timed out connecting to bus at {host}:{port}")]
    Timeout {
        /// Broker host.
        host: String,
        /// Broker port.
        port: u16,
    },

    /// Declaring the exchange/queue topology failed.
    #[error("cannot declare bus topology for queue '{queue}'")]
    Topology {
        /// Queue that was being declared.
        queue: String,
        /// Underlying failure.
        #[source]
        source: BoxError,
    },
}

/// A transient failure while polling the bus. Retried on the next tick.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The transport reported an error.
    #[error("bus poll failed")]
    Transport(#[source] BoxError),

    /// The session was closed by the peer.
    #[error("bus session closed")]
    Closed,

    /// The consumer fell behind and the transport dropped messages.
    #[error("bus consumer lagged, {0} messages skipped")]
    Lagged(u64),
}

/// Publishing a message failed.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The hub has not finished registering plugins yet.
    #[error("publish capability is not armed yet")]
    NotReady,

    /// The message could not be encoded for the wire.
    #[error("cannot serialize message")]
    Serialize(#[from] serde_json::Error),

    /// The transport refused the message.
    #[error("bus publish failed")]
    Transport(#[source] BoxError),
}

/// Acknowledging an inbound message failed.
#[derive(Debug, thiserror::Error)]
#[error("bus acknowledgement failed")]
pub struct AckError(#[source] pub BoxError);

/// A plugin handler or task callback failed.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The plugin reported a failure.
    #[error("plugin failure")]
    Failed(#[source] BoxError),

    /// The plugin tried to publish and the bus refused.
    #[error("plugin publish failed")]
    Publish(#[from] PublishError),

    /// IO failure inside the plugin.
    #[error("plugin io failure")]
    Io(#[from] std::io::Error),

    /// A configuration value is missing or has the wrong type.
    #[error("invalid configuration value for '{key}'")]
    InvalidConfig {
        /// Offending key.
        key: String,
    },

    /// A task interval is not a positive, finite number of seconds.
    #[error("invalid task interval {0}s")]
    InvalidInterval(f64),

    /// `on_init` was requested a second time.
    #[error("plugin is already initialised")]
    AlreadyInitialised,

    /// The callback panicked; the payload message is preserved.
    #[error("plugin panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Wrap any error as a plugin failure.
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed(err.into())
    }
}

/// The plugin configuration store failed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing medium failed.
    #[error("config store io failure")]
    Io(#[from] std::io::Error),

    /// The stored record could not be decoded.
    #[error("config record cannot be decoded")]
    Decode(#[source] BoxError),

    /// The record could not be encoded.
    #[error("config record cannot be encoded")]
    Encode(#[source] BoxError),
}

/// Top-level errors surfaced by the controller.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The bus connection failed during setup.
    #[error("bus connection error")]
    Connection(#[from] ConnectionError),

    /// Publishing on behalf of the caller failed.
    #[error("publish error")]
    Publish(#[from] PublishError),

    /// A lifecycle step was requested out of order.
    #[error("controller is {actual}, expected {expected}")]
    InvalidState {
        /// State the operation requires.
        expected: &'static str,
        /// State the controller is in.
        actual: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_load_error_with_plugin_name() {
        let err = LoadError::MissingIdentity {
            name: "lirc".to_string(),
        };
        assert_eq!(err.to_string(), "plugin 'lirc' has no identity");
    }

    #[test]
    fn should_display_connection_timeout() {
        let err = ConnectionError::Timeout {
            host: "localhost".to_string(),
            port: 1883,
        };
        assert_eq!(err.to_string(), "timed out connecting to bus at localhost:1883");
    }

    #[test]
    fn should_convert_publish_error_into_handler_error() {
        let err: HandlerError = PublishError::NotReady.into();
        assert!(matches!(err, HandlerError::Publish(PublishError::NotReady)));
    }

    #[test]
    fn should_wrap_arbitrary_error_as_failed() {
        let err = HandlerError::failed("socket gone");
        assert!(matches!(err, HandlerError::Failed(_)));
        assert_eq!(err.to_string(), "plugin failure");
    }

    #[test]
    fn should_convert_connection_error_into_hub_error() {
        let err: HubError = ConnectionError::Timeout {
            host: "h".to_string(),
            port: 1,
        }
        .into();
        assert!(matches!(err, HubError::Connection(_)));
    }

    #[test]
    fn should_display_invalid_state() {
        let err = HubError::InvalidState {
            expected: "initialized",
            actual: "constructed",
        };
        assert_eq!(err.to_string(), "controller is constructed, expected initialized");
    }
}
