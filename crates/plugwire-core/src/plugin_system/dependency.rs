//! Static preflight over the registry.
//!
//! [`DependencyGraph::build`] resolves every consumed component of every
//! registered plugin the same way a load would, without building any module.
//! The result tells a host up front which requirements cannot be met and in
//! which order the plugins would load.
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::manifest::PluginKey;
use crate::plugin_system::registry::Registry;
use crate::plugin_system::requirement::{ComponentRequirement, Requirements};
use crate::plugin_system::resolver::Resolver;

/// A consumed component that no registered provider satisfies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedRequirement {
    pub plugin: PluginKey,
    pub component: String,
    pub requirement: ComponentRequirement,
    pub reason: String,
}

/// Plugin → plugins providing the components it consumes.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<PluginKey, BTreeSet<PluginKey>>,
    unresolved: Vec<UnresolvedRequirement>,
}

impl DependencyGraph {
    /// Resolves each plugin's `consumes` against the registry. Entries in
    /// `overrides` replace the declared requirement, as they do for a load.
    pub fn build(registry: &Registry, overrides: &Requirements) -> Self {
        let resolver = Resolver::new(registry);
        let mut graph = DependencyGraph::default();

        for descriptor in registry.plugins() {
            let key = descriptor.key();
            let mut dependencies = BTreeSet::new();

            for (component, requirement) in descriptor.consumes().iter() {
                let requirement = overrides.get(component).unwrap_or(requirement);
                let provider = resolver.resolve(component, requirement).and_then(|resolution| {
                    registry
                        .provider(component, &resolution.plugin, &resolution.version)
                        .map(|record| record.plugin_key())
                        .ok_or_else(|| PluginSystemError::ComponentNotProvided {
                            component: component.to_string(),
                            plugin: Some(resolution.plugin.clone()),
                        })
                });
                match provider {
                    Ok(provider) => {
                        dependencies.insert(provider);
                    }
                    Err(err) => graph.unresolved.push(UnresolvedRequirement {
                        plugin: key.clone(),
                        component: component.to_string(),
                        requirement: requirement.clone(),
                        reason: err.to_string(),
                    }),
                }
            }
            graph.edges.insert(key, dependencies);
        }
        graph
    }

    pub fn dependencies_of(&self, plugin: &PluginKey) -> Option<&BTreeSet<PluginKey>> {
        self.edges.get(plugin)
    }

    pub fn unresolved(&self) -> &[UnresolvedRequirement] {
        &self.unresolved
    }

    pub fn is_satisfied(&self) -> bool {
        self.unresolved.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Topological order with dependencies before their consumers (Kahn's
    /// algorithm). Plugins left over form at least one cycle.
    pub fn load_order(&self) -> Result<Vec<PluginKey>, PluginSystemError> {
        let mut remaining: BTreeMap<&PluginKey, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&PluginKey, Vec<&PluginKey>> = BTreeMap::new();
        for (plugin, dependencies) in &self.edges {
            remaining.insert(plugin, dependencies.len());
            for dependency in dependencies {
                dependents.entry(dependency).or_default().push(plugin);
            }
        }

        let mut queue: VecDeque<&PluginKey> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(plugin, _)| *plugin)
            .collect();
        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(plugin) = queue.pop_front() {
            order.push(plugin.clone());
            for dependent in dependents.get(plugin).into_iter().flatten() {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }

        if order.len() == self.edges.len() {
            Ok(order)
        } else {
            let chain = remaining
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(plugin, _)| plugin.to_string())
                .collect();
            Err(PluginSystemError::CyclicDependency { chain })
        }
    }
}
