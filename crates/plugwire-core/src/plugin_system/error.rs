//! # Plugwire Plugin System Errors
//!
//! Defines [`PluginSystemError`], the error taxonomy of the resolution and
//! linking engine. Registration integrity violations, resolution failures,
//! cycles and wrapped collaborator failures are all distinct variants so a host
//! can match on the kind instead of parsing messages.
//!
//! Failures raised while loading a transitive dependency are wrapped in
//! [`PluginSystemError::DependencyLoadError`], which keeps the original error as
//! its `source`. Use [`PluginSystemError::root_cause`] to reach it.
use std::path::PathBuf;

use semver::Version;
use thiserror::Error;

/// Boxed failure reported by a host collaborator (module loader, enable hook).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum PluginSystemError {
    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("Invalid version spec '{spec}': {reason}")]
    InvalidSpecSyntax { spec: String, reason: String },

    #[error("Invalid requirement '{requirement}': {reason}")]
    InvalidRequirement { requirement: String, reason: String },

    #[error("Plugin manifest error for '{}': {message}", .path.display())]
    ManifestError {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Duplicate plugin {plugin}@{version}")]
    DuplicatePlugin { plugin: String, version: Version },

    #[error("Duplicate component '{component}' provided by plugin {plugin}@{version}")]
    DuplicateComponentProvider {
        component: String,
        plugin: String,
        version: Version,
    },

    #[error("Component '{component}' is not provided by {}", .plugin.as_deref().map(|p| format!("plugin '{}'", p)).unwrap_or_else(|| "any plugin".into()))]
    ComponentNotProvided {
        component: String,
        plugin: Option<String>,
    },

    #[error("Component '{component}' has no version from plugin '{plugin}' matching '{spec}'")]
    RequirementNotMet {
        component: String,
        plugin: String,
        spec: String,
    },

    #[error("System has no plugin '{plugin}'{}", .version.as_ref().map(|v| format!(" at version '{}'", v)).unwrap_or_default())]
    UnknownPlugin {
        plugin: String,
        version: Option<Version>,
    },

    #[error("Circular dependency detected: {}", .chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },

    #[error("Plugin {plugin}:{version} failed to load module '{entry_point}': {source}")]
    ModuleLoadError {
        plugin: String,
        version: Version,
        entry_point: String,
        #[source]
        source: BoxError,
    },

    #[error("Plugin {plugin}:{version} failed to load earlier and is not retried")]
    PluginPreviouslyFailed { plugin: String, version: Version },

    #[error("Plugin {plugin}:{version} does not export '{path}' (missing segment '{segment}')")]
    MissingExport {
        plugin: String,
        version: Version,
        path: String,
        segment: String,
    },

    #[error("Enable hook '{hook}' of plugin {plugin}:{version} failed: {source}")]
    EnableHookError {
        plugin: String,
        version: Version,
        hook: String,
        #[source]
        source: BoxError,
    },

    #[error("Could not load required component '{component}' for plugin {plugin}:{version}: {source}")]
    DependencyLoadError {
        component: String,
        plugin: String,
        version: Version,
        #[source]
        source: Box<PluginSystemError>,
    },

    #[error("Component '{component}' is not of type {expected}")]
    ComponentTypeMismatch {
        component: String,
        expected: &'static str,
    },
}

impl PluginSystemError {
    /// Follows nested [`PluginSystemError::DependencyLoadError`]s down to the
    /// error that started the unwinding.
    pub fn root_cause(&self) -> &PluginSystemError {
        let mut current = self;
        while let PluginSystemError::DependencyLoadError { source, .. } = current {
            current = &**source;
        }
        current
    }

    pub(crate) fn invalid_spec(spec: &str, reason: impl Into<String>) -> Self {
        PluginSystemError::InvalidSpecSyntax {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}
