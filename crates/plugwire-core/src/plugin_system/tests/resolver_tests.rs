#![cfg(test)]

use std::collections::BTreeMap;

use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::manifest::DescriptorBuilder;
use crate::plugin_system::registry::Registry;
use crate::plugin_system::requirement::ComponentRequirement;
use crate::plugin_system::resolver::{ProviderMatch, Resolver};
use crate::plugin_system::version::{Version, VersionSpec};

fn registry_with(plugins: &[(&str, &str, &str, Option<&str>)]) -> Registry {
    let mut registry = Registry::new();
    for (name, version, component, mapping) in plugins {
        let builder = DescriptorBuilder::new(name, version);
        let builder = match mapping {
            Some(mapping) => builder.provides_at(component, mapping),
            None => builder.provides(component),
        };
        registry.enable(builder.build().unwrap()).unwrap();
    }
    registry
}

fn requirement(text: &str) -> ComponentRequirement {
    ComponentRequirement::parse(text).unwrap()
}

#[test]
fn test_resolve_picks_highest_matching_version() {
    let registry = registry_with(&[
        ("Q", "1.0.0", "widget", None),
        ("Q", "2.0.0", "widget", None),
    ]);
    let resolver = Resolver::new(&registry);

    let below_two = resolver.resolve("widget", &requirement("Q:<2.0.0")).unwrap();
    assert_eq!(below_two.plugin, "Q");
    assert_eq!(below_two.version, Version::new(1, 0, 0));

    let any = resolver.resolve("widget", &requirement("Q")).unwrap();
    assert_eq!(any.version, Version::new(2, 0, 0));
    assert_eq!(any.to_string(), "Q:2.0.0");
}

#[test]
fn test_resolve_is_deterministic() {
    let registry = registry_with(&[
        ("b", "1.0.0", "greet", None),
        ("a", "1.0.0", "greet", None),
        ("a", "1.1.0", "greet", None),
    ]);
    let resolver = Resolver::new(&registry);
    let first = resolver.resolve("greet", &ComponentRequirement::any()).unwrap();
    let second = resolver.resolve("greet", &ComponentRequirement::any()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.plugin, "a", "Empty plugin name falls back to the default provider");
    assert_eq!(first.version, Version::new(1, 1, 0));
}

#[test]
fn test_resolve_failures() {
    let registry = registry_with(&[("Q", "1.0.0", "widget", None)]);
    let resolver = Resolver::new(&registry);

    let err = resolver.resolve("missing", &ComponentRequirement::any()).unwrap_err();
    assert!(matches!(err, PluginSystemError::ComponentNotProvided { plugin: None, .. }));

    let err = resolver.resolve("widget", &requirement("R")).unwrap_err();
    assert!(matches!(
        err,
        PluginSystemError::ComponentNotProvided { plugin: Some(ref p), .. } if p == "R"
    ));

    let err = resolver.resolve("widget", &requirement("Q:>=2.0.0")).unwrap_err();
    match err {
        PluginSystemError::RequirementNotMet { component, plugin, spec } => {
            assert_eq!(component, "widget");
            assert_eq!(plugin, "Q");
            assert_eq!(spec, ">=2.0.0");
        }
        other => panic!("Expected RequirementNotMet, got {:?}", other),
    }
}

#[test]
fn test_iter_all_providers_includes_postfix_variants() {
    let registry = registry_with(&[
        ("W", "1.0.0", "widget", Some("widget|round=round")),
        ("W", "2.0.0", "widget", None),
        ("V", "0.5.0", "widget.fancy", None),
    ]);
    let resolver = Resolver::new(&registry);

    let found = resolver.iter_all_providers("widget", &BTreeMap::new(), false);
    let pairs: Vec<String> = found.iter().map(|m| format!("{}:{}", m.plugin, m.version)).collect();
    assert_eq!(pairs, vec!["W:1.0.0-round", "W:2.0.0"]);

    let mut specs = BTreeMap::new();
    specs.insert("W".to_string(), VersionSpec::parse("<2.0.0").unwrap());
    let limited = resolver.iter_all_providers("widget", &specs, true);
    assert_eq!(
        limited,
        vec![
            ProviderMatch {
                component: "widget".to_string(),
                plugin: "W".to_string(),
                version: Version::parse("1.0.0-round").unwrap(),
            },
            ProviderMatch {
                component: "widget".to_string(),
                plugin: "W".to_string(),
                version: Version::new(1, 0, 0),
            },
            ProviderMatch {
                component: "widget.fancy".to_string(),
                plugin: "V".to_string(),
                version: Version::new(0, 5, 0),
            },
        ]
    );
}

#[test]
fn test_iter_all_providers_never_repeats_a_pair() {
    let registry = registry_with(&[("W", "1.0.0", "widget", Some("alt=alt"))]);
    let resolver = Resolver::new(&registry);
    // The best version is itself the postfix variant; it must appear once.
    let found = resolver.iter_all_providers("widget", &BTreeMap::new(), false);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].version, Version::parse("1.0.0-alt").unwrap());
}

#[test]
fn test_best_providers_and_every_version() {
    let registry = registry_with(&[
        ("A", "1.0.0", "greet", None),
        ("A", "1.5.0", "greet", None),
        ("B", "3.0.0", "greet", None),
    ]);
    let resolver = Resolver::new(&registry);

    let best = resolver.best_providers("greet", &VersionSpec::parse("<2.0.0").unwrap(), false);
    assert_eq!(best.len(), 1);
    assert_eq!(best[0].plugin, "A");
    assert_eq!(best[0].version, Version::new(1, 5, 0));

    assert_eq!(resolver.iter_every_version("greet", false).len(), 3);
}
