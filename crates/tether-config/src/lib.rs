//! Shared configuration for hosts that supervise Tether plugins.
//!
//! Configuration is layered by `ortho_config`. Built-in defaults come first,
//! a TOML file overrides them, `TETHER_*` environment variables win over the
//! file, and command-line flags win over everything. The resolved [`Config`]
//! carries the health-check cadence used by plugin supervisors, the default
//! plugin start timeout, and the logging settings consumed by the telemetry
//! bootstrap.

mod defaults;
mod logging;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_HEALTH_CHECK_INTERVAL_SECS, DEFAULT_LOG_FILTER, DEFAULT_START_TIMEOUT_SECS,
    default_health_check_interval, default_log_filter, default_log_filter_string,
    default_log_format, default_start_timeout,
};
pub use logging::{
    LIFECYCLE_LEVEL, LIFECYCLE_TARGET, LogFormat, LogFormatParseError, effective_log_filter,
};

/// Environment variable naming an explicit configuration file.
pub const ENV_CONFIG_PATH: &str = "TETHER_CONFIG_PATH";
/// Environment variable overriding [`Config::health_check_interval`].
pub const ENV_HEALTH_CHECK_INTERVAL_SECS: &str = "TETHER_HEALTH_CHECK_INTERVAL_SECS";
/// Environment variable overriding [`Config::default_start_timeout`].
pub const ENV_DEFAULT_START_TIMEOUT_SECS: &str = "TETHER_DEFAULT_START_TIMEOUT_SECS";
/// Environment variable overriding [`Config::log_filter`].
pub const ENV_LOG_FILTER: &str = "TETHER_LOG_FILTER";
/// Environment variable overriding [`Config::log_format`].
pub const ENV_LOG_FORMAT: &str = "TETHER_LOG_FORMAT";

/// Resolved host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(prefix = "TETHER")]
pub struct Config {
    /// Seconds between two liveness probes of a running plugin.
    #[ortho_config(default = DEFAULT_HEALTH_CHECK_INTERVAL_SECS)]
    pub health_check_interval_secs: u64,
    /// Seconds a plugin may take to complete its handshake.
    #[ortho_config(default = DEFAULT_START_TIMEOUT_SECS)]
    pub default_start_timeout_secs: u64,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format of the log subscriber.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            health_check_interval_secs: DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
            default_start_timeout_secs: DEFAULT_START_TIMEOUT_SECS,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Resolves configuration from the process arguments, the discovered
    /// configuration file and the `TETHER_*` environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when a layer fails to load and
    /// [`ConfigError::Invalid`] when a resolved value is out of range.
    pub fn resolve() -> Result<Self, ConfigError> {
        Self::resolve_from_iter(std::env::args_os())
    }

    /// Resolves configuration using `args` in place of the process arguments.
    ///
    /// The first item is the program name. `--config-path <file>` or
    /// [`ENV_CONFIG_PATH`] select an explicit file; command-line flags win
    /// over the environment, which wins over the file.
    ///
    /// # Errors
    ///
    /// See [`Config::resolve`].
    pub fn resolve_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = <Self as OrthoConfig>::load_from_iter(args).map_err(ConfigError::Load)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.health_check_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "health_check_interval_secs",
                message: String::from("must be greater than zero"),
            });
        }
        if self.default_start_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "default_start_timeout_secs",
                message: String::from("must be greater than zero"),
            });
        }
        Ok(())
    }

    /// Interval between two liveness probes.
    #[must_use]
    pub const fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    /// Start timeout applied to plugins that do not set their own.
    #[must_use]
    pub const fn default_start_timeout(&self) -> Duration {
        Duration::from_secs(self.default_start_timeout_secs)
    }

    /// Returns the configured log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Returns the log filter with the lifecycle directive applied.
    ///
    /// See [`effective_log_filter`].
    #[must_use]
    pub fn effective_log_filter(&self) -> String {
        effective_log_filter(&self.log_filter)
    }

    /// Returns the configured log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration layer failed to load or merge.
    #[error("failed to load configuration: {0}")]
    Load(#[source] Arc<OrthoError>),
    /// A resolved value is out of range.
    #[error("configuration field '{field}' {message}")]
    Invalid {
        /// Field that failed validation.
        field: &'static str,
        /// Description of the constraint.
        message: String,
    },
}
