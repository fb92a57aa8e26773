use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::event::{Event, EventDispatcher, EventId, EventResult};
use crate::kernel::constants::{APP_NAME, APP_VERSION, ENABLE_HOOK_REQUEST_SUFFIX};
use crate::kernel::error::Result;
use crate::plugin_system::dependency::DependencyGraph;
use crate::plugin_system::discovery::{PluginScanner, ScanOptions};
use crate::plugin_system::error::{BoxError, PluginSystemError};
use crate::plugin_system::loader::{ComponentKey, LoadContext, Loader};
use crate::plugin_system::manifest::{PluginDescriptor, PluginKey};
use crate::plugin_system::module::{EnableHook, Module, ModuleLoader, NotAnEnableHook, Object};
use crate::plugin_system::registry::Registry;
use crate::plugin_system::requirement::{ComponentRequirement, RequirementValue, Requirements};
use crate::plugin_system::resolver::{ProviderMatch, Resolution, Resolver};
use crate::plugin_system::version::{Version, VersionSpec};
use crate::storage::config::RequirementConfig;

/// The engine: owns the registry, the loader caches, the event dispatcher, the
/// host's [`ModuleLoader`] and the system-wide default requirements.
pub struct System {
    registry: Registry,
    loader: Loader,
    events: EventDispatcher,
    modules: Box<dyn ModuleLoader>,
    defaults: Requirements,
    found: BTreeMap<PluginKey, PluginDescriptor>,
    scan_options: ScanOptions,
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("registry", &self.registry)
            .field("loader", &self.loader)
            .field("events", &self.events)
            .field("defaults", &self.defaults)
            .field("found", &self.found.keys().collect::<Vec<_>>())
            .field("scan_options", &self.scan_options)
            .finish_non_exhaustive()
    }
}

impl System {
    pub fn new<M: ModuleLoader + 'static>(modules: M) -> Self {
        log::info!("Initializing {} v{}", APP_NAME, APP_VERSION);
        Self {
            registry: Registry::new(),
            loader: Loader::new(),
            events: EventDispatcher::new(),
            modules: Box::new(modules),
            defaults: Requirements::new(),
            found: BTreeMap::new(),
            scan_options: ScanOptions::default(),
        }
    }

    /// Replace the default requirements
    pub fn with_defaults(mut self, defaults: Requirements) -> Self {
        self.defaults = defaults;
        self
    }

    /// Use a [`RequirementConfig`] as the default requirements
    pub fn with_config(self, config: &RequirementConfig) -> Result<Self> {
        let defaults = config.to_requirements()?;
        Ok(self.with_defaults(defaults))
    }

    /// Recognise `.yml`/`.yaml` descriptors during [`search`](Self::search)
    pub fn enable_yaml(mut self, enable: bool) -> Self {
        self.scan_options.enable_yaml = enable;
        self
    }

    pub fn defaults(&self) -> &Requirements {
        &self.defaults
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Call `handler` for every event named `event` (see
    /// [`constants`](crate::kernel::constants) for the names)
    pub fn bind_event<F>(&mut self, event: &'static str, handler: F) -> EventId
    where
        F: Fn(&dyn Event) -> EventResult + Send + Sync + 'static,
    {
        self.events.register_handler(event, handler)
    }

    /// Call `handler` for every event of type `E`
    pub fn bind_type_event<E, F>(&mut self, handler: F) -> EventId
    where
        E: Event + 'static,
        F: Fn(&E) -> EventResult + Send + Sync + 'static,
    {
        self.events.register_type_handler(handler)
    }

    pub fn unbind_event(&mut self, id: EventId) -> bool {
        self.events.unregister_handler(id)
    }

    /// Search `path` for plugin folders and record what was found. Returns how
    /// many descriptors the search added.
    pub fn search(&mut self, path: &Path) -> Result<usize> {
        let scanned = PluginScanner::new(self.scan_options, &self.events).search(path)?;
        if let Some(key) = scanned.keys().find(|key| self.found.contains_key(*key)) {
            return Err(PluginSystemError::DuplicatePlugin {
                plugin: key.name.clone(),
                version: key.version.clone(),
            }
            .into());
        }
        let added = scanned.len();
        self.found.extend(scanned);
        Ok(added)
    }

    /// Descriptors found by [`search`](Self::search), enabled or not
    pub fn found_plugins(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.found.values()
    }

    /// Enable every found plugin accepted by `filter` that is not enabled yet
    pub fn enable_found<F>(&mut self, mut filter: F) -> Result<Vec<PluginKey>>
    where
        F: FnMut(&PluginDescriptor) -> bool,
    {
        let batch: Vec<PluginDescriptor> = self
            .found
            .values()
            .filter(|descriptor| !self.registry.is_registered(descriptor.name(), descriptor.version()))
            .filter(|descriptor| filter(descriptor))
            .cloned()
            .collect();
        self.enable_plugins(batch)
    }

    /// Register a batch of plugins and their components, then run the enable
    /// hook of each plugin that declares one, in the order given.
    pub fn enable_plugins<I>(&mut self, descriptors: I) -> Result<Vec<PluginKey>>
    where
        I: IntoIterator<Item = PluginDescriptor>,
    {
        let enabled = self.register_plugins(descriptors)?;
        for key in &enabled {
            let hook = self
                .registry
                .descriptor(key)
                .and_then(|descriptor| descriptor.enable_hook().map(str::to_string));
            if let Some(hook) = hook {
                self.run_enable_hook(key, &hook)?;
            }
        }
        Ok(enabled)
    }

    /// Register a batch of plugins and their components without running any
    /// enable hook. Plugins registered before a failing one stay registered.
    pub fn register_plugins<I>(&mut self, descriptors: I) -> Result<Vec<PluginKey>>
    where
        I: IntoIterator<Item = PluginDescriptor>,
    {
        let mut registered = Vec::new();
        for descriptor in descriptors {
            let descriptor = self.registry.enable(descriptor)?;
            registered.push(descriptor.key());
        }
        Ok(registered)
    }

    fn run_enable_hook(&mut self, key: &PluginKey, hook: &str) -> Result<()> {
        let requester = format!("{}:{}", key, ENABLE_HOOK_REQUEST_SUFFIX);
        let module = self.load_plugin_as(key, &Requirements::new(), false, Some(&requester))?;
        let descriptor = self
            .registry
            .descriptor(key)
            .cloned()
            .ok_or_else(|| PluginSystemError::UnknownPlugin {
                plugin: key.name.clone(),
                version: Some(key.version.clone()),
            })?;

        let export = module.get(hook).map_err(|e| PluginSystemError::MissingExport {
            plugin: key.name.clone(),
            version: key.version.clone(),
            path: hook.to_string(),
            segment: e.segment,
        })?;
        let enable_hook_error = |source: BoxError| PluginSystemError::EnableHookError {
            plugin: key.name.clone(),
            version: key.version.clone(),
            hook: hook.to_string(),
            source,
        };
        let callable = export
            .downcast_ref::<EnableHook>()
            .cloned()
            .ok_or_else(|| enable_hook_error(Box::new(NotAnEnableHook(hook.to_string()))))?;

        log::info!("Running enable hook '{}' of {}", hook, key);
        callable(&descriptor).map_err(enable_hook_error)?;
        Ok(())
    }

    /// Load `component` under the default requirements
    pub fn load(&mut self, component: &str) -> Result<Object> {
        self.load_with(component, &Requirements::new(), false)
    }

    /// Load `component` with `overrides` taking precedence over every declared
    /// and default requirement along the dependency chain. With `bypass` the
    /// default requirements are ignored.
    pub fn load_with(&mut self, component: &str, overrides: &Requirements, bypass: bool) -> Result<Object> {
        let empty = Requirements::new();
        let ctx = LoadContext {
            registry: &self.registry,
            modules: self.modules.as_ref(),
            events: &self.events,
            defaults: if bypass { &empty } else { &self.defaults },
        };
        Ok(self.loader.load(&ctx, component, overrides, None, None)?)
    }

    /// Load `component` and downcast it to `T`
    pub fn load_as<T: Any + Send + Sync>(&mut self, component: &str) -> Result<Arc<T>> {
        let object = self.load(component)?;
        object.downcast::<T>().map_err(|_| {
            PluginSystemError::ComponentTypeMismatch {
                component: component.to_string(),
                expected: std::any::type_name::<T>(),
            }
            .into()
        })
    }

    /// Load plugin `name` at `version`, or at its highest registered version
    pub fn load_plugin(&mut self, name: &str, version: Option<&Version>) -> Result<Arc<Module>> {
        let version = match version {
            Some(version) => version.clone(),
            None => self
                .registry
                .plugin_versions(name)
                .max()
                .cloned()
                .ok_or_else(|| PluginSystemError::UnknownPlugin {
                    plugin: name.to_string(),
                    version: None,
                })?,
        };
        self.load_plugin_as(&PluginKey::new(name, version), &Requirements::new(), false, None)
    }

    fn load_plugin_as(
        &mut self,
        key: &PluginKey,
        overrides: &Requirements,
        bypass: bool,
        requested_by: Option<&str>,
    ) -> Result<Arc<Module>> {
        let empty = Requirements::new();
        let ctx = LoadContext {
            registry: &self.registry,
            modules: self.modules.as_ref(),
            events: &self.events,
            defaults: if bypass { &empty } else { &self.defaults },
        };
        Ok(self.loader.load_plugin(&ctx, key, overrides, requested_by, None)?)
    }

    /// Resolve `component` without loading anything
    pub fn resolve(&self, component: &str, requirement: &ComponentRequirement) -> Result<Resolution> {
        Ok(Resolver::new(&self.registry).resolve(component, requirement)?)
    }

    /// Resolve `component` under the default requirement for it
    pub fn resolve_default(&self, component: &str) -> Result<Resolution> {
        let requirement = self.defaults.get(component).cloned().unwrap_or_default();
        self.resolve(component, &requirement)
    }

    /// Registered component names that are strict subtypes of `component`
    pub fn iter_component_subtypes(&self, component: &str) -> Vec<String> {
        self.registry
            .subtypes_of(component)
            .map(str::to_string)
            .collect()
    }

    /// Providers of `component`: every registered version when `all_versions`
    /// is set, otherwise the best version of each provider under `spec`
    pub fn iter_component_providers(
        &self,
        component: &str,
        include_subtypes: bool,
        all_versions: bool,
        spec: &VersionSpec,
    ) -> Vec<ProviderMatch> {
        let resolver = Resolver::new(&self.registry);
        if all_versions {
            resolver.iter_every_version(component, include_subtypes)
        } else {
            resolver.best_providers(component, spec, include_subtypes)
        }
    }

    /// Best version per provider under `specs` plus every postfix variant
    pub fn iter_all_providers(
        &self,
        component: &str,
        specs: &BTreeMap<String, VersionSpec>,
        include_subtypes: bool,
    ) -> Vec<ProviderMatch> {
        Resolver::new(&self.registry).iter_all_providers(component, specs, include_subtypes)
    }

    /// Module of plugin `name` if loaded: the given version, or the highest
    /// loaded version
    pub fn get_plugin_module(&self, name: &str, version: Option<&Version>) -> Option<Arc<Module>> {
        let version = match version {
            Some(version) => version.clone(),
            None => self.loader.loaded_versions(name).last().map(|v| (*v).clone())?,
        };
        self.loader.loaded_module(&PluginKey::new(name, version))
    }

    /// Every `(component, plugin, version)` loaded so far
    pub fn usage(&self) -> Vec<ComponentKey> {
        self.loader.loaded_components().cloned().collect()
    }

    /// Pin each loaded component to the highest version of its provider that
    /// was loaded, as `plugin:==version`
    pub fn pinned_requirements(&self) -> RequirementConfig {
        let mut pinned: BTreeMap<&str, &ComponentKey> = BTreeMap::new();
        for key in self.loader.loaded_components() {
            let entry = pinned.entry(key.component.as_str()).or_insert(key);
            if (&key.version, &key.plugin) > (&entry.version, &entry.plugin) {
                *entry = key;
            }
        }

        let mut config = RequirementConfig::new();
        for (component, key) in pinned {
            let requirement = ComponentRequirement::new(&key.plugin, VersionSpec::exact(key.version.clone()));
            config.insert(component, RequirementValue::Text(requirement.to_string()));
        }
        config
    }

    /// Preflight check of every enabled plugin's consumed components
    pub fn dependency_graph(&self, overrides: &Requirements) -> DependencyGraph {
        DependencyGraph::build(&self.registry, overrides)
    }
}
