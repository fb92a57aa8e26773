use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::registry::Registry;
use crate::plugin_system::requirement::ComponentRequirement;
use crate::plugin_system::version::{Version, VersionSpec};

/// Outcome of resolving a requirement: which plugin and which provider version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Resolution {
    pub plugin: String,
    pub version: Version,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.plugin, self.version)
    }
}

/// One `(component, plugin, version)` triple yielded by provider enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderMatch {
    pub component: String,
    pub plugin: String,
    pub version: Version,
}

/// Read-only queries over a [`Registry`]. Never loads anything.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    registry: &'a Registry,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Picks the highest version of the requested (or default) provider of
    /// `component` that satisfies the requirement's spec.
    pub fn resolve(&self, component: &str, requirement: &ComponentRequirement) -> Result<Resolution, PluginSystemError> {
        let plugin = if requirement.is_any_plugin() {
            self.registry
                .default_provider_name(component)
                .ok_or_else(|| PluginSystemError::ComponentNotProvided {
                    component: component.to_string(),
                    plugin: None,
                })?
        } else {
            requirement.plugin.as_str()
        };

        let versions = self
            .registry
            .versions_of(component, plugin)
            .ok_or_else(|| PluginSystemError::ComponentNotProvided {
                component: component.to_string(),
                plugin: Some(plugin.to_string()),
            })?;

        let version = requirement
            .spec
            .select(versions.keys())
            .ok_or_else(|| PluginSystemError::RequirementNotMet {
                component: component.to_string(),
                plugin: plugin.to_string(),
                spec: requirement.spec.to_string(),
            })?;

        log::debug!("Resolved '{}' under '{}' to {}:{}", component, requirement, plugin, version);
        Ok(Resolution {
            plugin: plugin.to_string(),
            version: version.clone(),
        })
    }

    /// Every distinct provider of `component` (and its strict subtypes when
    /// `include_subtypes` is set) at its best version under the plugin's entry
    /// in `specs`, plus every postfix variant the plugin registers.
    ///
    /// Plugins whose versions all fail their spec contribute only their
    /// postfix variants. The result is sorted and free of duplicates.
    pub fn iter_all_providers(
        &self,
        component: &str,
        specs: &BTreeMap<String, VersionSpec>,
        include_subtypes: bool,
    ) -> Vec<ProviderMatch> {
        let mut found = BTreeSet::new();
        for (name, plugin, versions) in self.registry.provider_tables(component, include_subtypes) {
            let best = match specs.get(plugin) {
                Some(spec) => spec.select(versions.keys()),
                None => versions.keys().next_back(),
            };
            let variants = versions
                .values()
                .filter(|record| record.is_postfix_variant())
                .map(|record| &record.version);

            for version in best.into_iter().chain(variants) {
                found.insert(ProviderMatch {
                    component: name.to_string(),
                    plugin: plugin.to_string(),
                    version: version.clone(),
                });
            }
        }
        found.into_iter().collect()
    }

    /// The highest version of each provider of `component` satisfying `spec`.
    pub fn best_providers(&self, component: &str, spec: &VersionSpec, include_subtypes: bool) -> Vec<ProviderMatch> {
        self.registry
            .provider_tables(component, include_subtypes)
            .filter_map(|(name, plugin, versions)| {
                spec.select(versions.keys()).map(|version| ProviderMatch {
                    component: name.to_string(),
                    plugin: plugin.to_string(),
                    version: version.clone(),
                })
            })
            .collect()
    }

    /// Every registered `(component, plugin, version)` for `component`.
    pub fn iter_every_version(&self, component: &str, include_subtypes: bool) -> Vec<ProviderMatch> {
        self.registry
            .providers_of(component, include_subtypes)
            .map(|record| ProviderMatch {
                component: record.component.clone(),
                plugin: record.plugin.clone(),
                version: record.version.clone(),
            })
            .collect()
    }
}
