use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::requirement::{RequirementValue, Requirements};
use crate::storage::error::StorageSystemError;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }

    /// Serialize `value` to a string in this format
    pub fn serialize<T: Serialize>(&self, value: &T) -> Result<String, StorageSystemError> {
        let serialization_error = |source: Box<dyn std::error::Error + Send + Sync>| {
            StorageSystemError::Encode {
                format: self.extension(),
                source,
            }
        };
        match self {
            ConfigFormat::Json => serde_json::to_string_pretty(value).map_err(|e| serialization_error(e.into())),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::to_string(value).map_err(|e| serialization_error(e.into())),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::to_string_pretty(value).map_err(|e| serialization_error(e.into())),
        }
    }

    /// Deserialize a value of type `T` from a string in this format
    pub fn deserialize<T: DeserializeOwned>(&self, data: &str) -> Result<T, StorageSystemError> {
        let deserialization_error = |source: Box<dyn std::error::Error + Send + Sync>| {
            StorageSystemError::Decode {
                format: self.extension(),
                source,
            }
        };
        match self {
            ConfigFormat::Json => serde_json::from_str(data).map_err(|e| deserialization_error(e.into())),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(data).map_err(|e| deserialization_error(e.into())),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(data).map_err(|e| deserialization_error(e.into())),
        }
    }

    /// Read and deserialize the file at `path`, picking the format from its extension
    pub fn read_file<T: DeserializeOwned>(path: &Path) -> Result<T, StorageSystemError> {
        let format = ConfigFormat::from_path(path)
            .ok_or_else(|| StorageSystemError::UnknownExtension(path.to_path_buf()))?;
        if !path.exists() {
            return Err(StorageSystemError::MissingFile(path.to_path_buf()));
        }
        let data = fs::read_to_string(path).map_err(|source| StorageSystemError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        format.deserialize(&data)
    }
}

/// System-wide default requirements: component name → requirement, in either
/// the string form (`"plugin:spec"`) or the `{ plugin, spec }` mapping form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementConfig {
    entries: BTreeMap<String, RequirementValue>,
}

impl RequirementConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration text in the given format
    pub fn parse(data: &str, format: ConfigFormat) -> Result<Self, StorageSystemError> {
        format.deserialize(data)
    }

    /// Load configuration from a `.json`, `.yaml`/`.yml` or `.toml` file
    pub fn load(path: &Path) -> Result<Self, StorageSystemError> {
        let config: Self = ConfigFormat::read_file(path)?;
        log::debug!("Loaded {} default requirements from {}", config.len(), path.display());
        Ok(config)
    }

    /// Write configuration to `path` in the format implied by its extension
    pub fn save(&self, path: &Path) -> Result<(), StorageSystemError> {
        let format = ConfigFormat::from_path(path)
            .ok_or_else(|| StorageSystemError::UnknownExtension(path.to_path_buf()))?;
        let data = format.serialize(self)?;
        fs::write(path, data).map_err(|source| StorageSystemError::WriteFile {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn serialize(&self, format: ConfigFormat) -> Result<String, StorageSystemError> {
        format.serialize(self)
    }

    pub fn insert(&mut self, component: &str, value: RequirementValue) -> Option<RequirementValue> {
        self.entries.insert(component.to_string(), value)
    }

    pub fn get(&self, component: &str) -> Option<&RequirementValue> {
        self.entries.get(component)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse every entry into a [`Requirements`] map
    pub fn to_requirements(&self) -> Result<Requirements, PluginSystemError> {
        let mut requirements = Requirements::new();
        for (component, value) in &self.entries {
            requirements.insert(component, value.to_requirement()?);
        }
        Ok(requirements)
    }
}
