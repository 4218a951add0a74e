//! Domain errors raised by plugin registration and supervision.
//!
//! All errors use a `thiserror`-derived enum with structured context so
//! callers can inspect the failure programmatically. I/O errors are wrapped
//! in `Arc` so the error stays cheap to clone; supervisors keep a copy of
//! their last failure and hand clones to observers.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors arising from plugin operations.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    /// A registration request was malformed.
    #[error("invalid plugin configuration: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// The plugin executable does not exist or is a directory.
    #[error("plugin file '{}' does not exist", path.display())]
    FileNotFound {
        /// Path that was checked.
        path: PathBuf,
    },

    /// No capability set has been registered for the category.
    #[error("unknown plugin category '{category}'")]
    UnknownCategory {
        /// Category that was looked up.
        category: String,
    },

    /// The category does not provide the declared capability.
    #[error("capability '{name}' is not registered for category '{category}'")]
    UnknownCapability {
        /// Category that was searched.
        category: String,
        /// Capability name declared by the plugin.
        name: String,
    },

    /// A plugin with the same instance id and name is already supervised.
    #[error("plugin '{name}' with id '{id}' already exists in category '{category}'")]
    DuplicatePlugin {
        /// Category holding the existing plugin.
        category: String,
        /// Instance id of the plugin.
        id: String,
        /// Name of the plugin.
        name: String,
    },

    /// The executable digest differs from the expected checksum.
    #[error("plugin file '{}' does not match the expected {algorithm} checksum", path.display())]
    IntegrityMismatch {
        /// Executable that was hashed.
        path: PathBuf,
        /// Name of the hash algorithm.
        algorithm: &'static str,
        /// Hex encoding of the expected digest.
        expected: String,
        /// Hex encoding of the computed digest.
        actual: String,
    },

    /// The plugin executable could not be read.
    #[error("I/O error reading '{}': {source}", path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The plugin process could not be launched or connected to.
    #[error("plugin '{name}' failed to connect: {message}")]
    Connect {
        /// Plugin name.
        name: String,
        /// Human-readable failure description.
        message: String,
        /// Optional underlying I/O error.
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// The plugin wrote a handshake line the host cannot accept.
    #[error("plugin '{name}' sent an invalid handshake: {message}")]
    Handshake {
        /// Plugin name.
        name: String,
        /// Description of the protocol violation.
        message: String,
    },

    /// A liveness probe failed.
    #[error("plugin '{name}' did not answer ping: {message}")]
    Ping {
        /// Plugin name.
        name: String,
        /// Description of the probe failure.
        message: String,
    },

    /// The health-check thread of a connected plugin could not be spawned.
    #[error("plugin '{name}' could not spawn its health-check thread: {source}")]
    HealthCheckSpawn {
        /// Plugin name.
        name: String,
        /// Error reported by the thread builder.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// An automatic restart triggered by the health-check loop failed.
    #[error("plugin '{name}' failed to restart: {source}")]
    RestartFailed {
        /// Plugin name.
        name: String,
        /// Failure of the restart attempt.
        #[source]
        source: Box<PluginError>,
    },
}

impl PluginError {
    /// Builds a [`PluginError::Validation`] from a message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Builds a [`PluginError::Connect`] without an underlying source.
    #[must_use]
    pub fn connect(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            name: name.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Wraps the failure of an automatic restart.
    #[must_use]
    pub fn restart_failed(name: impl Into<String>, cause: Self) -> Self {
        Self::RestartFailed {
            name: name.into(),
            source: Box::new(cause),
        }
    }
}
