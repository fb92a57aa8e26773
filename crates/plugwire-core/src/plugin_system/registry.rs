use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use semver::Prerelease;

use crate::plugin_system::component::is_strict_subtype;
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::manifest::{PluginDescriptor, PluginKey};
use crate::plugin_system::version::Version;

/// Binding of (component, plugin, version) to an access path inside the
/// plugin's loaded module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRecord {
    pub component: String,
    pub plugin: String,
    pub author: String,
    /// Effective version, postfix-qualified for variants.
    pub version: Version,
    /// Version of the descriptor that provides this record.
    pub plugin_version: Version,
    pub postfix: Option<String>,
    /// Dotted path of the component object inside the loaded module.
    pub access_path: String,
}

impl ProviderRecord {
    pub fn plugin_key(&self) -> PluginKey {
        PluginKey::new(&self.plugin, self.plugin_version.clone())
    }

    pub fn is_postfix_variant(&self) -> bool {
        self.postfix.is_some()
    }
}

type VersionTable = BTreeMap<Version, ProviderRecord>;

/// In-memory provider registry.
///
/// Maps component name → provider plugin name → version → [`ProviderRecord`],
/// and plugin name + version → descriptor.
#[derive(Debug, Default)]
pub struct Registry {
    plugins: BTreeMap<PluginKey, Arc<PluginDescriptor>>,
    enabled_order: Vec<PluginKey>,
    components: BTreeMap<String, BTreeMap<String, VersionTable>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin descriptor. Fails if `(name, version)` is already known.
    pub fn register_plugin(&mut self, descriptor: PluginDescriptor) -> Result<Arc<PluginDescriptor>, PluginSystemError> {
        self.check_plugin(&descriptor)?;
        Ok(self.insert_plugin(descriptor))
    }

    /// Register every component the descriptor provides. Nothing is inserted
    /// when any (component, plugin, version) triple collides.
    pub fn register_provided_components(&mut self, descriptor: &PluginDescriptor) -> Result<(), PluginSystemError> {
        let records = self.prepare_records(descriptor)?;
        self.insert_records(records);
        Ok(())
    }

    /// [`register_plugin`](Self::register_plugin) and
    /// [`register_provided_components`](Self::register_provided_components)
    /// as one step; the registry is unchanged if either would fail.
    pub fn enable(&mut self, descriptor: PluginDescriptor) -> Result<Arc<PluginDescriptor>, PluginSystemError> {
        self.check_plugin(&descriptor)?;
        let records = self.prepare_records(&descriptor)?;
        self.insert_records(records);
        let descriptor = self.insert_plugin(descriptor);
        log::debug!("Enabled plugin {}", descriptor.version_string());
        Ok(descriptor)
    }

    fn check_plugin(&self, descriptor: &PluginDescriptor) -> Result<(), PluginSystemError> {
        if self.plugins.contains_key(&descriptor.key()) {
            return Err(PluginSystemError::DuplicatePlugin {
                plugin: descriptor.name().to_string(),
                version: descriptor.version().clone(),
            });
        }
        Ok(())
    }

    fn insert_plugin(&mut self, descriptor: PluginDescriptor) -> Arc<PluginDescriptor> {
        let key = descriptor.key();
        let descriptor = Arc::new(descriptor);
        self.plugins.insert(key.clone(), Arc::clone(&descriptor));
        self.enabled_order.push(key);
        descriptor
    }

    fn prepare_records(&self, descriptor: &PluginDescriptor) -> Result<Vec<ProviderRecord>, PluginSystemError> {
        let mut records = Vec::new();
        let mut claimed: HashSet<(String, Version)> = HashSet::new();

        for (component, mapping) in descriptor.provides() {
            for (postfix, access_path) in parse_provider_mapping(component, mapping.as_deref()) {
                let version = match postfix {
                    Some(postfix) => postfix_version(descriptor.version(), postfix)?,
                    None => descriptor.version().clone(),
                };
                let collides = self.provider(component, descriptor.name(), &version).is_some()
                    || !claimed.insert((component.clone(), version.clone()));
                if collides {
                    return Err(PluginSystemError::DuplicateComponentProvider {
                        component: component.clone(),
                        plugin: descriptor.name().to_string(),
                        version,
                    });
                }
                records.push(ProviderRecord {
                    component: component.clone(),
                    plugin: descriptor.name().to_string(),
                    author: descriptor.author().to_string(),
                    version,
                    plugin_version: descriptor.version().clone(),
                    postfix: postfix.map(str::to_string),
                    access_path: access_path.to_string(),
                });
            }
        }
        Ok(records)
    }

    fn insert_records(&mut self, records: Vec<ProviderRecord>) {
        for record in records {
            self.components
                .entry(record.component.clone())
                .or_default()
                .entry(record.plugin.clone())
                .or_default()
                .insert(record.version.clone(), record);
        }
    }

    /// Direct providers of `component`, plus providers of its strict subtypes
    /// when `include_subtypes` is set.
    pub fn providers_of<'a>(&'a self, component: &'a str, include_subtypes: bool) -> impl Iterator<Item = &'a ProviderRecord> + 'a {
        self.provider_tables(component, include_subtypes)
            .flat_map(|(_, _, versions)| versions.values())
    }

    /// `(component, plugin, versions)` for every provider table matching
    /// `component` (and its strict subtypes when `include_subtypes` is set).
    pub fn provider_tables<'a>(
        &'a self,
        component: &'a str,
        include_subtypes: bool,
    ) -> impl Iterator<Item = (&'a str, &'a str, &'a BTreeMap<Version, ProviderRecord>)> + 'a {
        self.components
            .iter()
            .filter(move |(name, _)| {
                name.as_str() == component || (include_subtypes && is_strict_subtype(name, component))
            })
            .flat_map(|(name, by_plugin)| {
                by_plugin
                    .iter()
                    .map(move |(plugin, versions)| (name.as_str(), plugin.as_str(), versions))
            })
    }

    /// Lexicographically first plugin providing `component`.
    pub fn default_provider_name(&self, component: &str) -> Option<&str> {
        self.components
            .get(component)
            .and_then(|by_plugin| by_plugin.keys().next())
            .map(String::as_str)
    }

    pub fn versions_of(&self, component: &str, plugin: &str) -> Option<&BTreeMap<Version, ProviderRecord>> {
        self.components.get(component)?.get(plugin)
    }

    pub fn provider(&self, component: &str, plugin: &str, version: &Version) -> Option<&ProviderRecord> {
        self.versions_of(component, plugin)?.get(version)
    }

    pub fn provides_component(&self, component: &str) -> bool {
        self.components.contains_key(component)
    }

    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    /// Registered component names that are strict subtypes of `component`.
    pub fn subtypes_of<'a>(&'a self, component: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.component_names()
            .filter(move |name| is_strict_subtype(name, component))
    }

    pub fn descriptor(&self, key: &PluginKey) -> Option<&Arc<PluginDescriptor>> {
        self.plugins.get(key)
    }

    /// Registered versions of plugin `name`, ascending.
    pub fn plugin_versions<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Version> + 'a {
        self.plugins
            .keys()
            .filter(move |key| key.name == name)
            .map(|key| &key.version)
    }

    pub fn is_registered(&self, name: &str, version: &Version) -> bool {
        self.plugins.contains_key(&PluginKey::new(name, version.clone()))
    }

    /// Registered descriptors in the order they were enabled.
    pub fn plugins(&self) -> impl Iterator<Item = &Arc<PluginDescriptor>> {
        self.enabled_order.iter().filter_map(|key| self.plugins.get(key))
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }
}

/// Splits a provides-entry into `(postfix, access_path)` pairs.
///
/// No mapping means the component name is the access path. `"a|b=c"` yields a
/// base-version record at path `a` and a `b` variant at path `c`; an empty path
/// after `=` falls back to the component name.
fn parse_provider_mapping<'a>(component: &'a str, mapping: Option<&'a str>) -> Vec<(Option<&'a str>, &'a str)> {
    let mapping = mapping.map(str::trim).unwrap_or_default();
    if mapping.is_empty() {
        return vec![(None, component)];
    }

    mapping
        .split('|')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((postfix, path)) => {
                let postfix = Some(postfix.trim()).filter(|p| !p.is_empty());
                let path = path.trim();
                (postfix, if path.is_empty() { component } else { path })
            }
            None => (None, entry),
        })
        .collect()
}

/// `base + "-" + postfix`: the postfix extends the prerelease tag.
fn postfix_version(base: &Version, postfix: &str) -> Result<Version, PluginSystemError> {
    let tag = if base.pre.is_empty() {
        postfix.to_string()
    } else {
        format!("{}-{}", base.pre, postfix)
    };
    let pre = Prerelease::new(&tag).map_err(|e| PluginSystemError::InvalidVersion {
        version: format!("{}-{}", base, postfix),
        reason: e.to_string(),
    })?;
    let mut version = base.clone();
    version.pre = pre;
    Ok(version)
}
