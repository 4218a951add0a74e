//! Capabilities exposed by plugins and grouped per category.
//!
//! A capability is the host-side half of an interface a plugin serves. All
//! plugins of one category share a [`CapabilitySet`]; a plugin declares which
//! entry it provides through its name. Sets are shared read-only once the
//! registry hands them to supervisors.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Host-side description of an interface served by a plugin.
///
/// # Example
///
/// ```
/// use tether_plugins::capability::{Capability, StaticCapability};
///
/// let kv = StaticCapability::new("kv.v1");
/// assert_eq!(kv.interface(), "kv.v1");
/// ```
pub trait Capability: Send + Sync {
    /// Identifier of the interface negotiated with the plugin process.
    fn interface(&self) -> &str;
}

/// Capability identified only by its interface name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticCapability {
    interface: String,
}

impl StaticCapability {
    /// Creates a capability for `interface`.
    #[must_use]
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }
}

impl Capability for StaticCapability {
    fn interface(&self) -> &str {
        self.interface.as_str()
    }
}

/// Named capability implementations available to one category.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    entries: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilitySet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `capability` under `name`, returning the entry it replaced.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        capability: Arc<dyn Capability>,
    ) -> Option<Arc<dyn Capability>> {
        self.entries.insert(name.into(), capability)
    }

    /// Looks up a capability by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.entries.get(name)
    }

    /// Returns `true` when `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Returns the number of capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(name, capability)| (name, capability.interface())),
            )
            .finish()
    }
}

impl<N> FromIterator<(N, Arc<dyn Capability>)> for CapabilitySet
where
    N: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, Arc<dyn Capability>)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, capability) in iter {
            set.insert(name, capability);
        }
        set
    }
}
