use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::version::VersionSpec;

/// Which provider(s) of a component are acceptable: a plugin name (empty for
/// "any provider") and a version spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRequirement {
    pub plugin: String,
    pub spec: VersionSpec,
}

impl ComponentRequirement {
    /// Any provider, any version.
    pub fn any() -> Self {
        Self {
            plugin: String::new(),
            spec: VersionSpec::Any,
        }
    }

    pub fn new(plugin: &str, spec: VersionSpec) -> Self {
        Self {
            plugin: plugin.trim().to_string(),
            spec,
        }
    }

    /// Parses `""`, `"*"`, `"plugin"` or `"plugin:spec"`.
    pub fn parse(requirement: &str) -> Result<Self, PluginSystemError> {
        let trimmed = requirement.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }
        if !trimmed.contains(':') {
            return Ok(Self::new(trimmed, VersionSpec::Any));
        }

        let parts: Vec<&str> = trimmed.split(':').collect();
        let [plugin, spec] = parts.as_slice() else {
            return Err(PluginSystemError::InvalidRequirement {
                requirement: requirement.to_string(),
                reason: "expected at most one ':' between plugin name and version spec".to_string(),
            });
        };
        Ok(Self::new(plugin, VersionSpec::parse(spec)?))
    }

    /// True when no plugin name is given and the default provider is used.
    pub fn is_any_plugin(&self) -> bool {
        self.plugin.is_empty()
    }
}

impl Default for ComponentRequirement {
    fn default() -> Self {
        Self::any()
    }
}

impl FromStr for ComponentRequirement {
    type Err = PluginSystemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComponentRequirement::parse(s)
    }
}

impl fmt::Display for ComponentRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.plugin.is_empty(), self.spec.is_any()) {
            (true, true) => f.write_str("*"),
            (true, false) => write!(f, ":{}", self.spec),
            (false, true) => f.write_str(&self.plugin),
            (false, false) => write!(f, "{}:{}", self.plugin, self.spec),
        }
    }
}

/// Requirement as written in descriptor files and configuration: either the
/// string form or a `{ plugin, spec }` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequirementValue {
    Text(String),
    Mapping {
        plugin: String,
        #[serde(default)]
        spec: String,
    },
}

impl RequirementValue {
    pub fn to_requirement(&self) -> Result<ComponentRequirement, PluginSystemError> {
        match self {
            RequirementValue::Text(text) => ComponentRequirement::parse(text),
            RequirementValue::Mapping { plugin, spec } => {
                Ok(ComponentRequirement::new(plugin, VersionSpec::parse(spec)?))
            }
        }
    }
}

impl From<&str> for RequirementValue {
    fn from(value: &str) -> Self {
        RequirementValue::Text(value.to_string())
    }
}

/// Component name → requirement map that keeps the order entries were first
/// inserted in. Dependencies are loaded in this order.
#[derive(Debug, Clone, Default)]
pub struct Requirements {
    entries: Vec<(String, ComponentRequirement)>,
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `(component, requirement string)` pairs.
    pub fn parse<'a, I>(pairs: I) -> Result<Self, PluginSystemError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        pairs
            .into_iter()
            .map(|(component, requirement)| -> Result<_, PluginSystemError> {
                Ok((component.to_string(), ComponentRequirement::parse(requirement)?))
            })
            .collect()
    }

    /// Replaces an existing entry in place, or appends a new one.
    pub fn insert(&mut self, component: &str, requirement: ComponentRequirement) -> Option<ComponentRequirement> {
        match self.entries.iter_mut().find(|(name, _)| name == component) {
            Some((_, existing)) => Some(std::mem::replace(existing, requirement)),
            None => {
                self.entries.push((component.to_string(), requirement));
                None
            }
        }
    }

    pub fn get(&self, component: &str) -> Option<&ComponentRequirement> {
        self.entries
            .iter()
            .find(|(name, _)| name == component)
            .map(|(_, requirement)| requirement)
    }

    pub fn contains(&self, component: &str) -> bool {
        self.get(component).is_some()
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ComponentRequirement)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A copy of `self` with every entry of `over` replacing or extending it.
    pub fn layered(&self, over: &Requirements) -> Requirements {
        let mut merged = self.clone();
        for (component, requirement) in &over.entries {
            merged.insert(component, requirement.clone());
        }
        merged
    }
}

/// Equal when both hold the same entries, in any order.
impl PartialEq for Requirements {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(component, requirement)| other.get(component) == Some(requirement))
    }
}

impl Eq for Requirements {}

impl FromIterator<(String, ComponentRequirement)> for Requirements {
    fn from_iter<T: IntoIterator<Item = (String, ComponentRequirement)>>(iter: T) -> Self {
        let mut requirements = Requirements::new();
        for (component, requirement) in iter {
            requirements.insert(&component, requirement);
        }
        requirements
    }
}
