#![cfg(test)]

use std::cmp::Ordering;

use crate::kernel::system::System;
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::manifest::DescriptorBuilder;
use crate::plugin_system::module::StaticModuleLoader;
use crate::plugin_system::requirement::ComponentRequirement;
use crate::plugin_system::version::{compare, evaluate, parse_version, Version, VersionSpec};

use super::common::counting_loader;

fn widget_system() -> System {
    let (modules, _) = counting_loader(&["Q"]);
    let mut system = System::new(modules);
    system
        .enable_plugins([
            DescriptorBuilder::new("Q", "1.0.0").provides("widget").build().unwrap(),
            DescriptorBuilder::new("Q", "2.0.0").provides("widget").build().unwrap(),
        ])
        .unwrap();
    system
}

#[test]
fn test_widget_versions() {
    let system = widget_system();
    let below_two = system
        .resolve("widget", &ComponentRequirement::parse("Q:<2.0.0").unwrap())
        .unwrap();
    assert_eq!(below_two.to_string(), "Q:1.0.0");
    let any = system.resolve("widget", &ComponentRequirement::parse("Q").unwrap()).unwrap();
    assert_eq!(any.to_string(), "Q:2.0.0");
}

#[test]
fn test_missing_component() {
    let mut system = widget_system();
    let err = system.load("missing").unwrap_err();
    assert!(matches!(
        err.plugin_error(),
        Some(PluginSystemError::ComponentNotProvided { plugin: None, .. })
    ));
    assert!(system.usage().is_empty());
    assert_eq!(system.loader().plugin_count(), 0);
}

#[test]
fn test_duplicate_registration_leaves_providers_unchanged() {
    let mut system = widget_system();
    let before = system.iter_component_providers("widget", true, true, &VersionSpec::Any);

    let err = system
        .enable_plugins([DescriptorBuilder::new("Q", "2.0.0").provides("gadget").build().unwrap()])
        .unwrap_err();
    assert!(matches!(err.plugin_error(), Some(PluginSystemError::DuplicatePlugin { .. })));
    assert_eq!(system.iter_component_providers("widget", true, true, &VersionSpec::Any), before);
    assert!(!system.registry().provides_component("gadget"));
}

#[test]
fn test_resolution_is_stable() {
    let (modules, builds) = counting_loader(&["Q"]);
    let mut system = System::new(modules);
    system
        .enable_plugins([DescriptorBuilder::new("Q", "1.0.0").provides("widget").build().unwrap()])
        .unwrap();
    let requirement = ComponentRequirement::parse("Q:>=1.0.0").unwrap();

    let first = system.resolve("widget", &requirement).unwrap();
    system.load("widget").unwrap();
    let second = system.resolve("widget", &requirement).unwrap();
    system.load("widget").unwrap();
    assert_eq!(first, second);
    assert_eq!(builds.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn test_compare_is_a_total_order() {
    let versions: Vec<Version> = ["0.9.0", "1.0.0-alpha", "1.0.0-alpha.1", "1.0.0-beta", "1.0.0", "1.2", "2"]
        .iter()
        .map(|v| parse_version(v).unwrap())
        .collect();
    for a in &versions {
        for b in &versions {
            assert_eq!(compare(a, b), compare(b, a).reverse());
            for c in &versions {
                if compare(a, b) == Ordering::Less && compare(b, c) == Ordering::Less {
                    assert_eq!(compare(a, c), Ordering::Less);
                }
            }
        }
    }
}

#[test]
fn test_spec_semantics() {
    let star = VersionSpec::parse("*").unwrap();
    let wildcard = VersionSpec::parse("1.2.x").unwrap();
    let bounded = VersionSpec::parse(">=1.0.0 <2.0.0").unwrap();
    for (version, in_wildcard, in_bounded) in [
        ("0.9.9", false, false),
        ("1.0.0", false, true),
        ("1.2.0", true, true),
        ("1.2.9", true, true),
        ("1.3.0", false, true),
        ("2.0.0", false, false),
    ] {
        let version = parse_version(version).unwrap();
        assert!(evaluate(&star, &version));
        assert_eq!(evaluate(&wildcard, &version), in_wildcard, "1.2.x vs {}", version);
        assert_eq!(evaluate(&bounded, &version), in_bounded, "bounded vs {}", version);
    }

    assert!(matches!(
        VersionSpec::parse(">=1.0.0 - <2.0.0"),
        Err(PluginSystemError::InvalidSpecSyntax { .. })
    ));
}

#[test]
fn test_empty_system() {
    let mut system = System::new(StaticModuleLoader::new());
    assert!(system.iter_component_subtypes("anything").is_empty());
    assert!(system.load("anything").is_err());
    assert!(system.dependency_graph(&Default::default()).is_empty());
}
