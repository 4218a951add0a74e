//! Contracts between supervisors and the RPC layer that launches plugins.
//!
//! A [`PluginConnector`] turns a [`PluginConfig`] into a live
//! [`ClientHandle`]: one running plugin process plus its RPC channel. The
//! supervisor only ever probes, closes, and kills handles; everything about
//! the wire protocol stays behind these traits. The production connector is
//! [`ProcessConnector`](crate::process::ProcessConnector); tests inject
//! doubles that script liveness.

use std::sync::Arc;

use crate::config::PluginConfig;
use crate::error::PluginError;

/// Live connection to one running plugin process.
pub trait ClientHandle: Send + Sync {
    /// Probes the plugin over its RPC channel.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Ping`] when the plugin does not answer.
    fn ping(&self) -> Result<(), PluginError>;

    /// Returns `true` once the underlying process has terminated.
    fn has_exited(&self) -> bool;

    /// Closes the RPC side of the connection.
    ///
    /// # Errors
    ///
    /// Returns an error when the channel could not be shut down cleanly.
    /// Supervisors treat this as best-effort.
    fn close_rpc(&self) -> Result<(), PluginError>;

    /// Kills the underlying process. Calling it more than once is harmless.
    fn terminate(&self);
}

/// Launches plugins and establishes their RPC channel.
pub trait PluginConnector: Send + Sync {
    /// Starts the plugin described by `config` and completes the handshake.
    ///
    /// Blocks for at most [`PluginConfig::start_timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Connect`] when the process cannot be launched
    /// or does not complete the handshake in time, and
    /// [`PluginError::Handshake`] when the plugin advertises terms the host
    /// does not accept.
    fn connect(&self, config: &PluginConfig) -> Result<Arc<dyn ClientHandle>, PluginError>;
}

impl<T> PluginConnector for Arc<T>
where
    T: PluginConnector + ?Sized,
{
    fn connect(&self, config: &PluginConfig) -> Result<Arc<dyn ClientHandle>, PluginError> {
        (**self).connect(config)
    }
}
