use std::time::Duration;

/// Interval between two liveness probes of a supervised plugin.
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

/// Time a plugin is given to complete its handshake after launch.
pub const DEFAULT_START_TIMEOUT_SECS: u64 = 60;

/// Default log filter expression used by the host.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default health-check interval as a [`Duration`].
#[must_use]
pub const fn default_health_check_interval() -> Duration {
    Duration::from_secs(DEFAULT_HEALTH_CHECK_INTERVAL_SECS)
}

/// Default plugin start timeout as a [`Duration`].
#[must_use]
pub const fn default_start_timeout() -> Duration {
    Duration::from_secs(DEFAULT_START_TIMEOUT_SECS)
}

/// Default log filter expression used by the host.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the host.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}
