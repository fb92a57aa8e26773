#![cfg(test)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;

use crate::event::{EventResult, PluginEvent};
use crate::kernel::system::System;
use crate::plugin_system::module::{Module, StaticModuleLoader};

/// Writes `<root>/<name>/<name>.json` from a JSON descriptor body.
pub fn write_plugin(root: &Path, name: &str, descriptor: serde_json::Value) {
    let folder = root.join(name);
    fs::create_dir_all(&folder).expect("Failed to create plugin folder");
    let body = serde_json::to_string_pretty(&descriptor).expect("Failed to encode descriptor");
    fs::write(folder.join(format!("{}.json", name)), body).expect("Failed to write descriptor");
}

/// Descriptor body with the usual fields filled in.
pub fn descriptor(name: &str, version: &str, consumes: serde_json::Value, provides: serde_json::Value) -> serde_json::Value {
    json!({
        "name": name,
        "author": "integration",
        "version": version,
        "file": name,
        "consumes": consumes,
        "provides": provides,
    })
}

/// Module loader whose modules export, for each provided component, a string
/// built from the plugin's version string and the components it was handed.
/// The counter tracks how many modules were built.
pub fn counting_loader(entry_points: &[&str]) -> (StaticModuleLoader, Arc<AtomicUsize>) {
    let builds = Arc::new(AtomicUsize::new(0));
    let mut modules = StaticModuleLoader::new();
    for entry_point in entry_points {
        let builds = builds.clone();
        modules.register(entry_point, move |descriptor, imports| {
            builds.fetch_add(1, Ordering::SeqCst);
            let received: Vec<String> = imports
                .names()
                .map(|name| format!("{}<{}>", name, imports.get_as::<String>(name).cloned().unwrap_or_default()))
                .collect();
            let mut module = Module::new();
            for component in descriptor.provides().keys() {
                let value = if received.is_empty() {
                    descriptor.version_string()
                } else {
                    format!("{} using {}", descriptor.version_string(), received.join(" "))
                };
                module = module.with_value(component, value);
            }
            Ok(module)
        });
    }
    (modules, builds)
}

/// Records every [`PluginEvent`] dispatched by `system`.
pub fn record_events(system: &mut System) -> Arc<Mutex<Vec<PluginEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let log_clone = log.clone();
    system.bind_type_event(move |event: &PluginEvent| {
        log_clone.lock().unwrap().push(event.clone());
        EventResult::Continue
    });
    log
}
