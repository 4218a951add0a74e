//! Structured reporting of plugin lifecycle events.

use std::sync::Arc;

use tether_config::LIFECYCLE_TARGET;

use crate::config::PluginConfig;
use crate::error::PluginError;
use crate::supervisor::ProbeFailure;

/// Observer notified as supervisors move plugins through their lifecycle.
///
/// Reporters are invoked while the supervisor holds its instance lock, so
/// implementations must not call back into the supervisor.
pub trait LifecycleReporter: Send + Sync {
    /// Invoked before integrity verification and connection begin.
    fn starting(&self, config: &PluginConfig);

    /// Invoked once the plugin is connected and probed periodically.
    fn running(&self, config: &PluginConfig);

    /// Invoked when a start or restart attempt fails.
    fn start_failed(&self, config: &PluginConfig, error: &PluginError);

    /// Invoked when a liveness probe fails.
    fn probe_failed(&self, config: &PluginConfig, failure: &ProbeFailure);

    /// Invoked before the health-check loop relaunches the plugin.
    fn restarting(&self, config: &PluginConfig);

    /// Invoked after the plugin has been torn down.
    fn stopped(&self, config: &PluginConfig);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn starting(&self, config: &PluginConfig) {
        (**self).starting(config);
    }

    fn running(&self, config: &PluginConfig) {
        (**self).running(config);
    }

    fn start_failed(&self, config: &PluginConfig, error: &PluginError) {
        (**self).start_failed(config, error);
    }

    fn probe_failed(&self, config: &PluginConfig, failure: &ProbeFailure) {
        (**self).probe_failed(config, failure);
    }

    fn restarting(&self, config: &PluginConfig) {
        (**self).restarting(config);
    }

    fn stopped(&self, config: &PluginConfig) {
        (**self).stopped(config);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl StructuredLifecycleReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredLifecycleReporter {
    fn starting(&self, config: &PluginConfig) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "plugin_starting",
            plugin = config.name(),
            instance = config.id(),
            executable = %config.executable().display(),
            "starting plugin"
        );
    }

    fn running(&self, config: &PluginConfig) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "plugin_running",
            plugin = config.name(),
            instance = config.id(),
            "plugin running"
        );
    }

    fn start_failed(&self, config: &PluginConfig, error: &PluginError) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "plugin_start_failed",
            plugin = config.name(),
            instance = config.id(),
            error = %error,
            "plugin failed to start"
        );
    }

    fn probe_failed(&self, config: &PluginConfig, failure: &ProbeFailure) {
        tracing::warn!(
            target: LIFECYCLE_TARGET,
            event = "plugin_probe_failed",
            plugin = config.name(),
            instance = config.id(),
            reason = %failure,
            "plugin liveness probe failed"
        );
    }

    fn restarting(&self, config: &PluginConfig) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "plugin_restarting",
            plugin = config.name(),
            instance = config.id(),
            "restarting plugin"
        );
    }

    fn stopped(&self, config: &PluginConfig) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "plugin_stopped",
            plugin = config.name(),
            instance = config.id(),
            "plugin stopped"
        );
    }
}
