//! # plugwire-core
//!
//! Component resolution and dependency injection for plugin systems. Plugins
//! are named, versioned units that provide and consume named components; the
//! engine picks a provider for every consumed component under a version
//! constraint, loads plugins in dependency order at most once each, and hands
//! each plugin the components it asked for.
pub mod event;
pub mod kernel;
pub mod plugin_system;
pub mod storage;

// Re-export key public types for the binary and host applications
pub use event::{Event, EventDispatcher, EventResult, PluginEvent};
pub use kernel::error::Error as KernelError;
pub use kernel::{Result, System};
pub use plugin_system::{
    ComponentRequirement, DescriptorBuilder, Imports, Module, ModuleLoader, Object, PluginDescriptor,
    PluginKey, PluginSystemError, Registry, Requirements, StaticModuleLoader, Version, VersionSpec,
};
pub use storage::{ConfigFormat, RequirementConfig};

#[cfg(test)]
mod tests;
