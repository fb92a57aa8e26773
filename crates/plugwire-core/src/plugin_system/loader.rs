//! Memoized, cycle-checked loading of plugins and their components.
//!
//! Each plugin version moves through `Resolving → Loaded` (or `Failed` when its
//! module could not be built). Loading a plugin first loads every component it
//! consumes, injects them as [`Imports`], and only then asks the
//! [`ModuleLoader`] for its module. A plugin found in `Resolving` while its own
//! dependencies are being loaded means the consumption graph has a cycle.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::event::{EventDispatcher, PluginEvent};
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::manifest::{PluginDescriptor, PluginKey};
use crate::plugin_system::module::{Imports, Module, ModuleLoader, Object};
use crate::plugin_system::registry::Registry;
use crate::plugin_system::requirement::{ComponentRequirement, Requirements};
use crate::plugin_system::resolver::{Resolution, Resolver};
use crate::plugin_system::version::Version;

/// Collaborators a load needs besides the loader's own caches.
pub struct LoadContext<'a> {
    pub registry: &'a Registry,
    pub modules: &'a dyn ModuleLoader,
    pub events: &'a EventDispatcher,
    /// System-wide default requirements (empty when bypassed).
    pub defaults: &'a Requirements,
}

#[derive(Debug, Clone)]
enum PluginState {
    Resolving,
    Loaded(Arc<Module>),
    Failed,
}

/// Cache key of a loaded component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey {
    pub component: String,
    pub plugin: String,
    pub version: Version,
}

#[derive(Debug, Default)]
pub struct Loader {
    plugins: HashMap<PluginKey, PluginState>,
    components: BTreeMap<ComponentKey, Object>,
    resolving: Vec<PluginKey>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `component`.
    ///
    /// The requirement used is the first of: `overrides`, the requesting
    /// plugin's `declared` consumes, the context defaults. Without any the
    /// alphabetically first provider at its highest version is used.
    pub fn load(
        &mut self,
        ctx: &LoadContext<'_>,
        component: &str,
        overrides: &Requirements,
        declared: Option<&Requirements>,
        requested_by: Option<&str>,
    ) -> Result<Object, PluginSystemError> {
        if !ctx.registry.provides_component(component) {
            return Err(PluginSystemError::ComponentNotProvided {
                component: component.to_string(),
                plugin: None,
            });
        }

        let requirement = Self::requirement_for(ctx, component, overrides, declared);
        let resolution = Resolver::new(ctx.registry).resolve(component, &requirement)?;
        self.load_resolved(ctx, component, &resolution, overrides, requested_by)
    }

    fn requirement_for(
        ctx: &LoadContext<'_>,
        component: &str,
        overrides: &Requirements,
        declared: Option<&Requirements>,
    ) -> ComponentRequirement {
        let chosen = overrides
            .get(component)
            .or_else(|| declared.and_then(|declared| declared.get(component)))
            .or_else(|| ctx.defaults.get(component));
        match chosen {
            Some(requirement) => requirement.clone(),
            None => {
                log::warn!(
                    "No requirement for component '{}'; using its first provider alphabetically",
                    component
                );
                ComponentRequirement::any()
            }
        }
    }

    /// Load an already resolved `(plugin, version)` provider of `component`.
    pub fn load_resolved(
        &mut self,
        ctx: &LoadContext<'_>,
        component: &str,
        resolution: &Resolution,
        overrides: &Requirements,
        requested_by: Option<&str>,
    ) -> Result<Object, PluginSystemError> {
        let key = ComponentKey {
            component: component.to_string(),
            plugin: resolution.plugin.clone(),
            version: resolution.version.clone(),
        };
        if let Some(object) = self.components.get(&key) {
            log::debug!("Component '{}' from {} already loaded", component, resolution);
            return Ok(Arc::clone(object));
        }

        let record = ctx
            .registry
            .provider(component, &resolution.plugin, &resolution.version)
            .ok_or_else(|| PluginSystemError::ComponentNotProvided {
                component: component.to_string(),
                plugin: Some(resolution.plugin.clone()),
            })?;
        let plugin_key = record.plugin_key();
        let module = self.load_plugin(ctx, &plugin_key, overrides, requested_by, Some(component))?;

        let object = module
            .get(&record.access_path)
            .map_err(|e| PluginSystemError::MissingExport {
                plugin: plugin_key.name.clone(),
                version: plugin_key.version.clone(),
                path: record.access_path.clone(),
                segment: e.segment,
            })?;

        self.components.insert(key, Arc::clone(&object));
        log::info!("Loaded component '{}' from {}", component, resolution);
        ctx.events.dispatch(&PluginEvent::ComponentLoaded {
            component: component.to_string(),
            requested_by: requested_by.map(str::to_string),
            plugin: resolution.to_string(),
        });
        Ok(object)
    }

    /// Load the module of plugin `key`, loading everything it consumes first.
    /// A plugin is loaded at most once; later calls return the cached module.
    pub fn load_plugin(
        &mut self,
        ctx: &LoadContext<'_>,
        key: &PluginKey,
        overrides: &Requirements,
        requested_by: Option<&str>,
        component: Option<&str>,
    ) -> Result<Arc<Module>, PluginSystemError> {
        match self.plugins.get(key) {
            Some(PluginState::Loaded(module)) => return Ok(Arc::clone(module)),
            Some(PluginState::Resolving) => {
                let mut chain: Vec<String> = self.resolving.iter().map(PluginKey::to_string).collect();
                chain.push(key.to_string());
                return Err(PluginSystemError::CyclicDependency { chain });
            }
            Some(PluginState::Failed) => {
                return Err(PluginSystemError::PluginPreviouslyFailed {
                    plugin: key.name.clone(),
                    version: key.version.clone(),
                });
            }
            None => {}
        }

        let descriptor = ctx
            .registry
            .descriptor(key)
            .cloned()
            .ok_or_else(|| PluginSystemError::UnknownPlugin {
                plugin: key.name.clone(),
                version: Some(key.version.clone()),
            })?;

        self.plugins.insert(key.clone(), PluginState::Resolving);
        self.resolving.push(key.clone());
        let linked = self.link(ctx, &descriptor, overrides);
        self.resolving.pop();

        match linked {
            Ok(module) => {
                let module = Arc::new(module);
                self.plugins.insert(key.clone(), PluginState::Loaded(Arc::clone(&module)));
                log::info!("Loaded plugin {}", key);
                ctx.events.dispatch(&PluginEvent::PluginLoaded {
                    plugin: key.to_string(),
                    requested_by: requested_by.map(str::to_string),
                    component: component.map(str::to_string),
                });
                Ok(module)
            }
            Err(err @ PluginSystemError::ModuleLoadError { .. }) => {
                self.plugins.insert(key.clone(), PluginState::Failed);
                Err(err)
            }
            Err(err) => {
                self.plugins.remove(key);
                Err(err)
            }
        }
    }

    fn link(
        &mut self,
        ctx: &LoadContext<'_>,
        descriptor: &PluginDescriptor,
        overrides: &Requirements,
    ) -> Result<Module, PluginSystemError> {
        let key = descriptor.key();
        let requester = key.to_string();
        let mut imports = Imports::new();
        for component in descriptor.consumes().components() {
            let object = self
                .load(ctx, component, overrides, Some(descriptor.consumes()), Some(&requester))
                .map_err(|source| PluginSystemError::DependencyLoadError {
                    component: component.to_string(),
                    plugin: key.name.clone(),
                    version: key.version.clone(),
                    source: Box::new(source),
                })?;
            imports.insert(component, object);
        }

        log::debug!("Building module '{}' for {}", descriptor.entry_point(), key);
        let module = ctx
            .modules
            .load_module(descriptor, &imports)
            .map_err(|source| PluginSystemError::ModuleLoadError {
                plugin: key.name.clone(),
                version: key.version.clone(),
                entry_point: descriptor.entry_point().to_string(),
                source,
            });
        drop(imports);
        module
    }

    pub fn loaded_module(&self, key: &PluginKey) -> Option<Arc<Module>> {
        match self.plugins.get(key) {
            Some(PluginState::Loaded(module)) => Some(Arc::clone(module)),
            _ => None,
        }
    }

    pub fn is_loaded(&self, key: &PluginKey) -> bool {
        matches!(self.plugins.get(key), Some(PluginState::Loaded(_)))
    }

    pub fn has_failed(&self, key: &PluginKey) -> bool {
        matches!(self.plugins.get(key), Some(PluginState::Failed))
    }

    /// Loaded versions of plugin `name`, in ascending order.
    pub fn loaded_versions(&self, name: &str) -> Vec<&Version> {
        let mut versions: Vec<&Version> = self
            .plugins
            .iter()
            .filter(|(key, state)| key.name == name && matches!(state, PluginState::Loaded(_)))
            .map(|(key, _)| &key.version)
            .collect();
        versions.sort();
        versions
    }

    /// Every component loaded so far.
    pub fn loaded_components(&self) -> impl Iterator<Item = &ComponentKey> {
        self.components.keys()
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins
            .values()
            .filter(|state| matches!(state, PluginState::Loaded(_)))
            .count()
    }
}
