//! Registry of capability sets and supervised plugin instances.
//!
//! The [`PluginRegistry`] groups plugins by category. A category becomes
//! usable once at least one capability has been registered for it, and a
//! plugin may only join a category whose capability set contains the name
//! the plugin declares. Within a category the pair of instance id and name
//! is unique.
//!
//! Both maps live behind one mutex. The lock is never held while a
//! supervisor runs, so a slow plugin start cannot stall other registrations.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::capability::{Capability, CapabilitySet};
use crate::config::PluginConfig;
use crate::error::PluginError;
use crate::supervisor::{PluginSupervisor, SupervisorContext};

const REGISTRY_TARGET: &str = "tether_plugins::registry";

/// Host-wide registry of plugin categories and their supervisors.
///
/// # Example
///
/// ```no_run
/// use std::path::PathBuf;
/// use std::sync::Arc;
/// use tether_plugins::capability::StaticCapability;
/// use tether_plugins::process::ProcessConnector;
/// use tether_plugins::supervisor::SupervisorContext;
/// use tether_plugins::{PluginConfig, PluginRegistry};
///
/// let registry = PluginRegistry::new(SupervisorContext::new(ProcessConnector::new()));
/// registry.register_capability("storage", "kv", Arc::new(StaticCapability::new("kv/v1")));
///
/// let config = PluginConfig::new("01", "kv", PathBuf::from("/opt/plugins/kv"));
/// let supervisor = registry.add_plugin("storage", config).expect("plugin accepted");
/// println!("{:?}", supervisor.status());
/// ```
pub struct PluginRegistry {
    context: SupervisorContext,
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    capabilities: HashMap<String, CapabilitySet>,
    plugins: HashMap<String, Vec<PluginSupervisor>>,
}

impl PluginRegistry {
    /// Creates an empty registry whose supervisors share `context`.
    #[must_use]
    pub fn new(context: SupervisorContext) -> Self {
        Self {
            context,
            state: Mutex::new(RegistryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `capability` under `name` for `category`.
    ///
    /// The category is created on first use. Registering the same name twice
    /// replaces the earlier implementation.
    pub fn register_capability(
        &self,
        category: &str,
        name: &str,
        capability: Arc<dyn Capability>,
    ) {
        let replaced = self
            .lock()
            .capabilities
            .entry(category.to_owned())
            .or_default()
            .insert(name, capability)
            .is_some();
        debug!(
            target: REGISTRY_TARGET,
            category,
            capability = name,
            replaced,
            "capability registered"
        );
    }

    /// Validates `config`, stores a supervisor for it, and starts it.
    ///
    /// The supervisor is started after the registry lock is released. A
    /// failed start does not fail the call; inspect the returned
    /// supervisor's [`PluginSupervisor::last_error`] instead.
    ///
    /// # Errors
    ///
    /// Checks run in this order and the first failure is returned:
    ///
    /// - [`PluginError::Validation`] when the name is empty or contains a NUL
    ///   byte, or when the executable path is empty;
    /// - [`PluginError::UnknownCategory`] when no capability was registered
    ///   for `category`;
    /// - [`PluginError::FileNotFound`] when the executable is missing or is
    ///   a directory;
    /// - [`PluginError::UnknownCapability`] when the category does not
    ///   provide the capability named by the plugin;
    /// - [`PluginError::DuplicatePlugin`] when the id and name are already
    ///   present in the category.
    pub fn add_plugin(
        &self,
        category: &str,
        config: PluginConfig,
    ) -> Result<PluginSupervisor, PluginError> {
        if config.name().is_empty() {
            return Err(PluginError::validation("plugin name must not be empty"));
        }
        if config.name().contains('\0') {
            return Err(PluginError::validation(
                "plugin name must not contain NUL bytes",
            ));
        }
        if config.executable().as_os_str().is_empty() {
            return Err(PluginError::validation(
                "plugin executable path must not be empty",
            ));
        }

        let supervisor = {
            let mut state = self.lock();
            let known = state.capabilities.get(category).ok_or_else(|| {
                PluginError::UnknownCategory {
                    category: category.to_owned(),
                }
            })?;
            if !is_plugin_file(&config) {
                return Err(PluginError::FileNotFound {
                    path: config.executable().to_path_buf(),
                });
            }
            if !known.contains(config.name()) {
                return Err(PluginError::UnknownCapability {
                    category: category.to_owned(),
                    name: config.name().to_owned(),
                });
            }
            let capabilities = known.clone();

            let duplicate = state.plugins.get(category).is_some_and(|existing| {
                existing.iter().any(|plugin| {
                    plugin.config().id() == config.id() && plugin.config().name() == config.name()
                })
            });
            if duplicate {
                return Err(PluginError::DuplicatePlugin {
                    category: category.to_owned(),
                    id: config.id().to_owned(),
                    name: config.name().to_owned(),
                });
            }

            let supervisor = PluginSupervisor::new(
                config.with_capabilities(capabilities),
                self.context.clone(),
            );
            state
                .plugins
                .entry(category.to_owned())
                .or_default()
                .push(supervisor.clone());
            supervisor
        };

        info!(
            target: REGISTRY_TARGET,
            category,
            plugin = supervisor.config().name(),
            id = supervisor.config().id(),
            "plugin added"
        );
        supervisor.start();
        Ok(supervisor)
    }

    /// Returns the capability set registered for `category`.
    #[must_use]
    pub fn capabilities(&self, category: &str) -> Option<CapabilitySet> {
        self.lock().capabilities.get(category).cloned()
    }

    /// Returns every category with a registered capability set, sorted.
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self.lock().capabilities.keys().cloned().collect();
        categories.sort_unstable();
        categories
    }

    /// Returns the supervisors of `category` in insertion order.
    #[must_use]
    pub fn plugins(&self, category: &str) -> Vec<PluginSupervisor> {
        self.lock()
            .plugins
            .get(category)
            .cloned()
            .unwrap_or_default()
    }

    /// Looks up a supervisor by category, instance id, and name.
    #[must_use]
    pub fn find(&self, category: &str, id: &str, name: &str) -> Option<PluginSupervisor> {
        self.lock().plugins.get(category).and_then(|plugins| {
            plugins
                .iter()
                .find(|plugin| plugin.config().id() == id && plugin.config().name() == name)
                .cloned()
        })
    }

    /// Closes every supervised plugin.
    ///
    /// Supervisors stay registered; they can be restarted with
    /// [`PluginSupervisor::start`].
    pub fn shutdown(&self) {
        let supervisors: Vec<PluginSupervisor> =
            self.lock().plugins.values().flatten().cloned().collect();
        for supervisor in &supervisors {
            supervisor.close();
        }
        info!(
            target: REGISTRY_TARGET,
            plugins = supervisors.len(),
            "registry shut down"
        );
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("PluginRegistry")
            .field("capabilities", &state.capabilities)
            .field("plugins", &state.plugins)
            .finish()
    }
}

fn is_plugin_file(config: &PluginConfig) -> bool {
    fs::metadata(config.executable()).is_ok_and(|metadata| !metadata.is_dir())
}
