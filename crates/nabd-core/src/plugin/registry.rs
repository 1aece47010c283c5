// ── Plugin registry ──
//
// Static table of plugin declarations. Plugins are compiled in; the registry
// maps a name to its capabilities, parameter names and constructor.

use std::collections::BTreeMap;
use std::fmt;

use super::{Capability, Plugin, PluginHandle, builtin};
use crate::error::CoreError;

/// Everything needed to list and instantiate a plugin.
#[derive(Clone, Copy)]
pub struct PluginDescriptor {
    pub name: &'static str,
    pub summary: &'static str,
    pub capabilities: &'static [Capability],
    pub parameters: &'static [&'static str],
    pub factory: fn() -> Box<dyn Plugin>,
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Name-keyed set of [`PluginDescriptor`]s.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    descriptors: BTreeMap<&'static str, PluginDescriptor>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The plugins shipped with nabd.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for descriptor in builtin::descriptors() {
            registry.register(descriptor);
        }
        registry
    }

    /// Add a descriptor, returning the one it replaced.
    pub fn register(&mut self, descriptor: PluginDescriptor) -> Option<PluginDescriptor> {
        self.descriptors.insert(descriptor.name, descriptor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    pub fn describe(&self, name: &str) -> Option<&PluginDescriptor> {
        self.descriptors.get(name)
    }

    /// Names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors.keys().copied()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.descriptors.values()
    }

    /// Instantiate a fresh, unattached handle.
    pub fn create(&self, name: &str) -> Result<PluginHandle, CoreError> {
        self.descriptors
            .get(name)
            .map(|descriptor| PluginHandle::new(*descriptor))
            .ok_or_else(|| CoreError::UnknownPlugin {
                name: name.to_owned(),
            })
    }
}
