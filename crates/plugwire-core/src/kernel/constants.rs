/// Library name
pub const APP_NAME: &str = "plugwire";

/// Library version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Emitted by discovery for every descriptor found
pub const PLUGIN_FOUND_EVENT: &str = "plugin_found";

/// Emitted after a plugin module has been built
pub const PLUGIN_LOADED_EVENT: &str = "plugin_loaded";

/// Emitted after a component has been extracted from its module
pub const COMPONENT_LOADED_EVENT: &str = "component_loaded";

/// Descriptor file extension, always recognised
pub const JSON_DESCRIPTOR_EXTENSION: &str = "json";

/// Descriptor file extensions recognised when YAML descriptors are enabled
pub const YAML_DESCRIPTOR_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// Suffix of the requester string used when an enable hook forces a load
pub const ENABLE_HOOK_REQUEST_SUFFIX: &str = "on_enable";
