use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::requirement::{RequirementValue, Requirements};
use crate::plugin_system::version::{parse_version, Version};

/// Descriptor as written in a plugin's `<folder>.json` / `.yaml` file.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDescriptor {
    pub name: String,
    pub author: String,
    pub version: String,
    /// Entry point handed to the module loader.
    #[serde(alias = "entry_point")]
    pub file: String,
    /// Consumed component name → requirement, in declaration order.
    #[serde(deserialize_with = "ordered_entries")]
    pub consumes: Vec<(String, RequirementValue)>,
    /// Provided component name → optional provider mapping
    /// (`"path"` or `"postfix=path|postfix2=path2"`).
    pub provides: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub on_enable: Option<String>,
}

/// Reads a mapping as `(key, value)` pairs in document order.
fn ordered_entries<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct EntriesVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for EntriesVisitor<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a map of component names to requirements")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry()? {
                entries.push((key, value));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(EntriesVisitor(PhantomData))
}

/// Identity of one plugin version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginKey {
    pub name: String,
    pub version: Version,
}

impl PluginKey {
    pub fn new(name: &str, version: Version) -> Self {
        Self {
            name: name.to_string(),
            version,
        }
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// Validated, immutable plugin descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDescriptor {
    name: String,
    author: String,
    version: Version,
    entry_point: String,
    consumes: Requirements,
    provides: BTreeMap<String, Option<String>>,
    enable_hook: Option<String>,
    path: Option<PathBuf>,
}

impl PluginDescriptor {
    /// Validates a raw descriptor. `path` is the plugin folder, when known.
    pub fn from_raw(raw: RawDescriptor, path: Option<PathBuf>) -> Result<Self, PluginSystemError> {
        let manifest_error = |message: String| PluginSystemError::ManifestError {
            path: path.clone().unwrap_or_default(),
            message,
            source: None,
        };

        let name = raw.name.trim().to_string();
        if name.is_empty() {
            return Err(manifest_error("plugin has an empty name".to_string()));
        }
        let entry_point = raw.file.trim().to_string();
        if entry_point.is_empty() {
            return Err(manifest_error(format!("plugin '{}' has no entry point file", name)));
        }
        let version = parse_version(&raw.version)?;

        let mut consumes = Requirements::new();
        for (component, value) in &raw.consumes {
            consumes.insert(component, value.to_requirement()?);
        }

        let enable_hook = raw
            .on_enable
            .map(|hook| hook.trim().to_string())
            .filter(|hook| !hook.is_empty());

        Ok(Self {
            name,
            author: raw.author.trim().to_string(),
            version,
            entry_point,
            consumes,
            provides: raw.provides,
            enable_hook,
            path,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn consumes(&self) -> &Requirements {
        &self.consumes
    }

    pub fn provides(&self) -> &BTreeMap<String, Option<String>> {
        &self.provides
    }

    pub fn enable_hook(&self) -> Option<&str> {
        self.enable_hook.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn key(&self) -> PluginKey {
        PluginKey::new(&self.name, self.version.clone())
    }

    /// `"name:version"`, the form used in events and error messages.
    pub fn version_string(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

/// Builder for creating a plugin descriptor in code
pub struct DescriptorBuilder {
    raw: RawDescriptor,
    path: Option<PathBuf>,
}

impl DescriptorBuilder {
    /// Create a new builder; the entry point defaults to the plugin name
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            raw: RawDescriptor {
                name: name.to_string(),
                author: String::new(),
                version: version.to_string(),
                file: name.to_string(),
                consumes: Vec::new(),
                provides: BTreeMap::new(),
                on_enable: None,
            },
            path: None,
        }
    }

    pub fn author(mut self, author: &str) -> Self {
        self.raw.author = author.to_string();
        self
    }

    pub fn entry_point(mut self, entry_point: &str) -> Self {
        self.raw.file = entry_point.to_string();
        self
    }

    /// Consume `component` under a requirement string such as `"P1:>=1.0.0"`
    pub fn consumes(mut self, component: &str, requirement: &str) -> Self {
        let value = RequirementValue::from(requirement);
        match self.raw.consumes.iter_mut().find(|(name, _)| name == component) {
            Some((_, existing)) => *existing = value,
            None => self.raw.consumes.push((component.to_string(), value)),
        }
        self
    }

    /// Provide `component` at the export of the same name
    pub fn provides(mut self, component: &str) -> Self {
        self.raw.provides.insert(component.to_string(), None);
        self
    }

    /// Provide `component` with an explicit provider mapping
    pub fn provides_at(mut self, component: &str, mapping: &str) -> Self {
        self.raw
            .provides
            .insert(component.to_string(), Some(mapping.to_string()));
        self
    }

    pub fn on_enable(mut self, hook: &str) -> Self {
        self.raw.on_enable = Some(hook.to_string());
        self
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<PluginDescriptor, PluginSystemError> {
        PluginDescriptor::from_raw(self.raw, self.path)
    }
}
