//! # Plugwire Plugin System
//!
//! The resolution and linking engine.
//!
//! ## Key Submodules and Responsibilities:
//!
//! - **[`version`]**: Version parsing and the constraint language
//!   ([`VersionSpec`]) used to choose among provider versions.
//! - **[`requirement`]**: Which plugin and which versions are acceptable for a
//!   consumed component ([`ComponentRequirement`]).
//! - **[`component`]**: Hierarchical dotted component names and subtyping.
//! - **[`manifest`]**: Plugin descriptors ([`PluginDescriptor`]) and their
//!   builder.
//! - **[`registry`]**: The component → plugin → version provider table
//!   ([`Registry`]).
//! - **[`resolver`]**: Read-only selection of a provider for a requirement.
//! - **[`module`]**: Loaded modules, injected imports and the host's
//!   [`ModuleLoader`].
//! - **[`loader`]**: Memoized, cycle-checked loading of plugins and components.
//! - **[`dependency`]**: Preflight dependency graph and load order.
//! - **[`discovery`]**: Finding plugin folders on disk.
//! - **[`error`]**: [`PluginSystemError`].
pub mod component;
pub mod dependency;
pub mod discovery;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod module;
pub mod registry;
pub mod requirement;
pub mod resolver;
pub mod version;

pub use dependency::DependencyGraph;
pub use error::PluginSystemError;
pub use loader::{ComponentKey, Loader};
pub use manifest::{DescriptorBuilder, PluginDescriptor, PluginKey};
pub use module::{EnableHook, Imports, Module, ModuleLoader, Object, StaticModuleLoader};
pub use registry::{ProviderRecord, Registry};
pub use requirement::{ComponentRequirement, Requirements};
pub use resolver::{ProviderMatch, Resolution, Resolver};
pub use version::{Version, VersionSpec};

// Test module declaration
#[cfg(test)]
mod tests;
