//! Out-of-process plugin supervision for Tether hosts.
//!
//! The `tether-plugins` crate launches plugins as child processes, keeps
//! them alive, and tears them down on request. Plugins are grouped into
//! **categories**; each category publishes a set of named **capabilities**
//! and a plugin may only join a category that offers the capability it
//! declares.
//!
//! # Architecture
//!
//! - [`PluginRegistry`] validates new plugins against the registered
//!   capability sets and owns one [`PluginSupervisor`] per plugin instance.
//! - [`PluginSupervisor`] verifies the executable's checksum when a
//!   [`SecureConfig`] is present, connects through a
//!   [`client::PluginConnector`], and runs a background health-check loop
//!   that restarts the plugin whenever a probe fails.
//! - [`process::ProcessConnector`] is the production connector: it spawns
//!   the plugin, exports the handshake parameters to its environment, and
//!   reads the handshake line the plugin prints once it serves.
//!
//! Lifecycle transitions are reported through [`health::LifecycleReporter`]
//! and logged with `tracing`; [`telemetry::initialise`] installs a
//! subscriber configured from [`tether_config::Config`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! use tether_plugins::capability::StaticCapability;
//! use tether_plugins::process::ProcessConnector;
//! use tether_plugins::supervisor::SupervisorContext;
//! use tether_plugins::{HashAlgorithm, PluginConfig, PluginRegistry, SecureConfig};
//!
//! let host = tether_config::Config::resolve().expect("configuration loads");
//! tether_plugins::telemetry::initialise(&host).expect("telemetry installs");
//!
//! let registry = PluginRegistry::new(SupervisorContext::from_config(&host, ProcessConnector::new()));
//! registry.register_capability("storage", "kv", Arc::new(StaticCapability::new("kv/v1")));
//!
//! let secure = SecureConfig::from_hex(HashAlgorithm::Sha256, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
//!     .expect("valid digest");
//! let config = PluginConfig::new("01", "kv", PathBuf::from("/opt/plugins/kv"))
//!     .with_prefix_command(vec!["python3".into()])
//!     .with_secure_config(secure);
//!
//! let supervisor = registry.add_plugin("storage", config).expect("plugin accepted");
//! if let Some(error) = supervisor.last_error() {
//!     eprintln!("plugin failed to start: {error}");
//! }
//! registry.shutdown();
//! ```

pub mod capability;
pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod integrity;
pub mod process;
pub mod registry;
pub mod supervisor;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use self::capability::{Capability, CapabilitySet};
pub use self::config::{DialOptions, HandshakeConfig, PluginConfig, Protocol, TlsConfig};
pub use self::error::PluginError;
pub use self::integrity::{HashAlgorithm, IntegrityVerifier, SecureConfig};
pub use self::registry::PluginRegistry;
pub use self::supervisor::{PluginStatus, PluginSupervisor, SupervisorContext};
