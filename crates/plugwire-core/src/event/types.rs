use std::any::Any;
use std::path::PathBuf;

use crate::event::Event;
use crate::kernel::constants::{COMPONENT_LOADED_EVENT, PLUGIN_FOUND_EVENT, PLUGIN_LOADED_EVENT};

/// Notifications emitted while discovering and loading plugins.
///
/// Plugins are identified by their `"name:version"` string; `requested_by` is
/// the requesting plugin's version string, or `None` for a host request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    /// A descriptor was found on disk
    PluginFound { path: PathBuf, plugin: String },
    /// A plugin module finished loading
    PluginLoaded {
        plugin: String,
        requested_by: Option<String>,
        component: Option<String>,
    },
    /// A component object was extracted from a loaded module
    ComponentLoaded {
        component: String,
        requested_by: Option<String>,
        plugin: String,
    },
}

impl Event for PluginEvent {
    fn name(&self) -> &'static str {
        match self {
            PluginEvent::PluginFound { .. } => PLUGIN_FOUND_EVENT,
            PluginEvent::PluginLoaded { .. } => PLUGIN_LOADED_EVENT,
            PluginEvent::ComponentLoaded { .. } => COMPONENT_LOADED_EVENT,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
