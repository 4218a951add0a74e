//! Caller-supplied description of one supervised plugin instance.
//!
//! A [`PluginConfig`] carries everything a supervisor needs to launch and
//! reconnect to a plugin: identity, handshake parameters, optional integrity
//! and TLS settings, the executable with its launcher prefix, the protocols
//! the host accepts, and the capability set resolved for the plugin's
//! category. It is immutable once handed to the registry.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tether_config::default_start_timeout;

use crate::capability::CapabilitySet;
use crate::error::PluginError;
use crate::integrity::SecureConfig;

/// Timeout used by the liveness probe when none is configured.
const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// RPC protocols a plugin may speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    /// Native request/response RPC over a stream socket.
    NetRpc,
    /// gRPC over HTTP/2.
    Grpc,
}

impl Protocol {
    /// Returns the name used on the handshake line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NetRpc => "netrpc",
            Self::Grpc => "grpc",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = PluginError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "netrpc" => Ok(Self::NetRpc),
            "grpc" => Ok(Self::Grpc),
            other => Err(PluginError::validation(format!(
                "unsupported plugin protocol '{other}'"
            ))),
        }
    }
}

/// Parameters both sides must agree on before the host trusts a plugin.
///
/// The magic cookie is exported to the plugin's environment; a plugin that
/// does not find it refuses to serve, which stops users from running plugin
/// binaries directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    protocol_version: u32,
    magic_cookie_key: String,
    magic_cookie_value: String,
}

impl HandshakeConfig {
    /// Creates a handshake description.
    #[must_use]
    pub fn new(
        protocol_version: u32,
        magic_cookie_key: impl Into<String>,
        magic_cookie_value: impl Into<String>,
    ) -> Self {
        Self {
            protocol_version,
            magic_cookie_key: magic_cookie_key.into(),
            magic_cookie_value: magic_cookie_value.into(),
        }
    }

    /// Application protocol version expected from the plugin.
    #[must_use]
    pub const fn protocol_version(&self) -> u32 {
        self.protocol_version
    }

    /// Environment variable carrying the magic cookie.
    #[must_use]
    pub fn magic_cookie_key(&self) -> &str {
        self.magic_cookie_key.as_str()
    }

    /// Value of the magic cookie.
    #[must_use]
    pub fn magic_cookie_value(&self) -> &str {
        self.magic_cookie_value.as_str()
    }
}

/// PEM material used to secure the RPC channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Certificate authority the plugin's server certificate must chain to.
    pub ca_cert: PathBuf,
    /// Client certificate presented by the host.
    pub client_cert: PathBuf,
    /// Private key of the client certificate.
    pub client_key: PathBuf,
}

/// Options applied when the host dials the plugin's RPC endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialOptions {
    connect_timeout: Duration,
}

impl DialOptions {
    /// Creates options with the given connect timeout.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Timeout applied to each connection attempt.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for DialOptions {
    fn default() -> Self {
        Self::new(DEFAULT_DIAL_TIMEOUT)
    }
}

/// Builds the name of a helper thread serving `plugin`.
///
/// NUL bytes are replaced because `std::thread::Builder` panics on them.
pub(crate) fn thread_name(role: &str, plugin: &str) -> String {
    format!("tether-{role}-{}", plugin.replace('\0', "?"))
}

/// Declarative description of one plugin instance.
///
/// # Example
///
/// ```
/// use tether_plugins::{HandshakeConfig, PluginConfig};
/// use std::path::PathBuf;
///
/// let config = PluginConfig::new("01", "kv", PathBuf::from("/opt/plugins/kv"))
///     .with_handshake(HandshakeConfig::new(1, "TETHER_PLUGIN", "kv"))
///     .with_prefix_command(vec!["python3".into()]);
///
/// assert_eq!(config.name(), "kv");
/// assert_eq!(config.command_line().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct PluginConfig {
    id: String,
    name: String,
    handshake: HandshakeConfig,
    versioned_capabilities: BTreeMap<u32, CapabilitySet>,
    secure: Option<SecureConfig>,
    tls: Option<TlsConfig>,
    start_timeout: Option<Duration>,
    prefix_command: Vec<String>,
    executable: PathBuf,
    allowed_protocols: Vec<Protocol>,
    dial: DialOptions,
    capabilities: CapabilitySet,
}

impl PluginConfig {
    /// Creates a configuration with default handshake, timeouts, and
    /// protocols.
    ///
    /// `name` is also the capability the plugin declares within its
    /// category.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, executable: PathBuf) -> Self {
        let display_name: String = name.into();
        Self {
            id: id.into(),
            handshake: HandshakeConfig::new(1, "TETHER_PLUGIN", display_name.clone()),
            name: display_name,
            versioned_capabilities: BTreeMap::new(),
            secure: None,
            tls: None,
            start_timeout: None,
            prefix_command: Vec::new(),
            executable,
            allowed_protocols: vec![Protocol::NetRpc],
            dial: DialOptions::default(),
            capabilities: CapabilitySet::new(),
        }
    }

    /// Overrides the handshake parameters.
    #[must_use]
    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Requires the executable to match `secure` before every launch.
    #[must_use]
    pub fn with_secure_config(mut self, secure: SecureConfig) -> Self {
        self.secure = Some(secure);
        self
    }

    /// Enables TLS on the RPC channel.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Overrides the handshake timeout.
    #[must_use]
    pub const fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = Some(timeout);
        self
    }

    /// Applies `timeout` unless the caller already chose one.
    pub(crate) const fn with_default_start_timeout(mut self, timeout: Duration) -> Self {
        if self.start_timeout.is_none() {
            self.start_timeout = Some(timeout);
        }
        self
    }

    /// Sets the launcher placed before the executable, e.g. `["java", "-jar"]`.
    #[must_use]
    pub fn with_prefix_command(mut self, prefix: Vec<String>) -> Self {
        self.prefix_command = prefix;
        self
    }

    /// Restricts the protocols the host accepts.
    #[must_use]
    pub fn with_allowed_protocols(mut self, protocols: Vec<Protocol>) -> Self {
        self.allowed_protocols = protocols;
        self
    }

    /// Overrides the RPC dial options.
    #[must_use]
    pub const fn with_dial_options(mut self, dial: DialOptions) -> Self {
        self.dial = dial;
        self
    }

    /// Offers an alternative capability set for a specific protocol version.
    #[must_use]
    pub fn with_versioned_capabilities(mut self, version: u32, set: CapabilitySet) -> Self {
        self.versioned_capabilities.insert(version, set);
        self
    }

    pub(crate) fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Instance id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Display name and declared capability.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Handshake parameters.
    #[must_use]
    pub const fn handshake(&self) -> &HandshakeConfig {
        &self.handshake
    }

    /// Capability sets keyed by protocol version.
    #[must_use]
    pub const fn versioned_capabilities(&self) -> &BTreeMap<u32, CapabilitySet> {
        &self.versioned_capabilities
    }

    /// Returns `true` when the host can serve `version`.
    #[must_use]
    pub fn supports_protocol_version(&self, version: u32) -> bool {
        version == self.handshake.protocol_version()
            || self.versioned_capabilities.contains_key(&version)
    }

    /// Optional integrity requirement.
    #[must_use]
    pub const fn secure_config(&self) -> Option<&SecureConfig> {
        self.secure.as_ref()
    }

    /// Optional TLS material.
    #[must_use]
    pub const fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }

    /// Time allowed for the handshake.
    ///
    /// Falls back to [`tether_config::DEFAULT_START_TIMEOUT_SECS`] until a
    /// supervisor applies the host's configured default.
    #[must_use]
    pub fn start_timeout(&self) -> Duration {
        self.start_timeout.unwrap_or_else(default_start_timeout)
    }

    /// Launcher placed before the executable.
    #[must_use]
    pub fn prefix_command(&self) -> &[String] {
        &self.prefix_command
    }

    /// Path of the plugin executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Protocols the host accepts.
    #[must_use]
    pub fn allowed_protocols(&self) -> &[Protocol] {
        &self.allowed_protocols
    }

    /// RPC dial options.
    #[must_use]
    pub const fn dial_options(&self) -> DialOptions {
        self.dial
    }

    /// Capability set resolved for the plugin's category.
    #[must_use]
    pub const fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Program and arguments used to launch the plugin.
    #[must_use]
    pub fn command_line(&self) -> Vec<String> {
        let mut line = self.prefix_command.clone();
        line.push(self.executable.display().to_string());
        line
    }
}

#[cfg(test)]
mod tests;
