#![cfg(test)]

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use super::common::{counting_loader, descriptor, record_events, write_plugin};
use crate::event::PluginEvent;
use crate::kernel::system::System;
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::requirement::Requirements;

#[test]
fn test_greet_hello_from_disk() {
    let dir = tempdir().unwrap();
    write_plugin(dir.path(), "P1", descriptor("P1", "1.0.0", json!({}), json!({ "greet": null })));
    write_plugin(
        dir.path(),
        "P2",
        descriptor("P2", "1.0.0", json!({ "greet": "P1:>=1.0.0" }), json!({ "hello": null })),
    );

    let (modules, builds) = counting_loader(&["P1", "P2"]);
    let mut system = System::new(modules);
    let events = record_events(&mut system);

    assert_eq!(system.search(dir.path()).unwrap(), 2);
    system.enable_found(|_| true).unwrap();

    let hello = system.load_as::<String>("hello").unwrap();
    assert_eq!(hello.as_str(), "P2:1.0.0 using greet<P1:1.0.0>");
    assert_eq!(builds.load(Ordering::SeqCst), 2);

    let events = events.lock().unwrap();
    let found = events.iter().filter(|e| matches!(e, PluginEvent::PluginFound { .. })).count();
    assert_eq!(found, 2);
    for plugin in ["P1:1.0.0", "P2:1.0.0"] {
        let loaded = events
            .iter()
            .filter(|e| matches!(e, PluginEvent::PluginLoaded { plugin: p, .. } if p == plugin))
            .count();
        assert_eq!(loaded, 1, "{} loaded once", plugin);
    }
    let hello_loaded = events
        .iter()
        .filter(|e| matches!(e, PluginEvent::ComponentLoaded { component, .. } if component == "hello"))
        .count();
    assert_eq!(hello_loaded, 1);
}

#[test]
fn test_repeated_loads_reuse_everything() {
    let dir = tempdir().unwrap();
    write_plugin(dir.path(), "base", descriptor("base", "1.0.0", json!({}), json!({ "core": null })));
    write_plugin(
        dir.path(),
        "left",
        descriptor("left", "1.0.0", json!({ "core": "base" }), json!({ "left": null })),
    );
    write_plugin(
        dir.path(),
        "right",
        descriptor("right", "1.0.0", json!({ "core": "base" }), json!({ "right": null })),
    );
    write_plugin(
        dir.path(),
        "top",
        descriptor("top", "1.0.0", json!({ "left": "left", "right": "right" }), json!({ "top": null })),
    );

    let (modules, builds) = counting_loader(&["base", "left", "right", "top"]);
    let mut system = System::new(modules);
    system.search(dir.path()).unwrap();
    system.enable_found(|_| true).unwrap();

    let order = system.dependency_graph(&Requirements::new()).load_order().unwrap();
    assert_eq!(order.first().map(|key| key.name.as_str()), Some("base"));
    assert_eq!(order.last().map(|key| key.name.as_str()), Some("top"));

    let first = system.load("top").unwrap();
    assert_eq!(builds.load(Ordering::SeqCst), 4, "The shared dependency is built once");
    let second = system.load("top").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    system.load("core").unwrap();
    assert_eq!(builds.load(Ordering::SeqCst), 4);
    assert_eq!(system.loader().plugin_count(), 4);
}

#[test]
fn test_cycle_unwinds_without_caching() {
    let dir = tempdir().unwrap();
    write_plugin(dir.path(), "A", descriptor("A", "1.0.0", json!({ "b": "B" }), json!({ "a": null })));
    write_plugin(dir.path(), "B", descriptor("B", "1.0.0", json!({ "a": "A" }), json!({ "b": null })));

    let (modules, builds) = counting_loader(&["A", "B"]);
    let mut system = System::new(modules);
    system.search(dir.path()).unwrap();
    system.enable_found(|_| true).unwrap();

    assert!(system.dependency_graph(&Requirements::new()).load_order().is_err());
    let err = system.load("a").unwrap_err();
    let root = err.plugin_error().map(PluginSystemError::root_cause);
    assert!(matches!(root, Some(PluginSystemError::CyclicDependency { .. })));
    assert_eq!(builds.load(Ordering::SeqCst), 0);
    assert!(system.usage().is_empty());

    // the cycle is reported again, not remembered as a failure
    let err = system.load("b").unwrap_err();
    let root = err.plugin_error().map(PluginSystemError::root_cause);
    assert!(matches!(root, Some(PluginSystemError::CyclicDependency { .. })));
}

#[test]
fn test_partial_success_is_retained() {
    let dir = tempdir().unwrap();
    write_plugin(dir.path(), "ok", descriptor("ok", "1.0.0", json!({}), json!({ "fine": null })));
    write_plugin(
        dir.path(),
        "needy",
        descriptor(
            "needy",
            "1.0.0",
            json!({ "fine": "ok", "absent": "nobody" }),
            json!({ "needy": null }),
        ),
    );

    let (modules, _builds) = counting_loader(&["ok", "needy"]);
    let mut system = System::new(modules);
    system.search(dir.path()).unwrap();
    system.enable_found(|_| true).unwrap();

    let graph = system.dependency_graph(&Requirements::new());
    assert_eq!(graph.unresolved().len(), 1);
    assert_eq!(graph.unresolved()[0].component, "absent");

    let err = system.load("needy").unwrap_err();
    assert!(matches!(
        err.plugin_error(),
        Some(PluginSystemError::DependencyLoadError { component, .. }) if component == "absent"
    ));
    let usage: Vec<String> = system.usage().into_iter().map(|key| key.component).collect();
    assert_eq!(usage, vec!["fine".to_string()]);
    assert!(system.get_plugin_module("ok", None).is_some());
    assert!(system.get_plugin_module("needy", None).is_none());
}

#[test]
fn test_pinned_requirements_reproduce_a_run() {
    let dir = tempdir().unwrap();
    for version in ["1.0.0", "1.5.0"] {
        let folder = format!("greeter-{}", version);
        write_plugin(dir.path(), &folder, descriptor("greeter", version, json!({}), json!({ "greet": null })));
    }

    let (modules, _) = counting_loader(&["greeter"]);
    let mut system = System::new(modules);
    system.search(dir.path()).unwrap();
    system.enable_found(|_| true).unwrap();
    let older = Requirements::parse([("greet", "greeter:<1.5.0")]).unwrap();
    system.load_with("greet", &older, false).unwrap();

    let pinned = system.pinned_requirements();
    let config_path = dir.path().join("pinned.json");
    pinned.save(&config_path).unwrap();

    let (modules, _) = counting_loader(&["greeter"]);
    let config = crate::storage::config::RequirementConfig::load(&config_path).unwrap();
    let mut replay = System::new(modules).with_config(&config).unwrap();
    replay.search(dir.path()).unwrap();
    replay.enable_found(|_| true).unwrap();
    assert_eq!(replay.load_as::<String>("greet").unwrap().as_str(), "greeter:1.0.0");
}
