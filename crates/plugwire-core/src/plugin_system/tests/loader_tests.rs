#![cfg(test)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::event::{EventDispatcher, EventResult, PluginEvent};
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::loader::{LoadContext, Loader};
use crate::plugin_system::manifest::{DescriptorBuilder, PluginDescriptor, PluginKey};
use crate::plugin_system::module::{Module, StaticModuleLoader};
use crate::plugin_system::registry::Registry;
use crate::plugin_system::requirement::Requirements;
use crate::plugin_system::version::Version;

/// Registry, module factories and an event log wired together for one test.
struct Harness {
    registry: Registry,
    modules: StaticModuleLoader,
    events: EventDispatcher,
    defaults: Requirements,
    log: Arc<Mutex<Vec<PluginEvent>>>,
    builds: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut events = EventDispatcher::new();
        let log_clone = log.clone();
        events.register_type_handler(move |event: &PluginEvent| {
            log_clone.lock().unwrap().push(event.clone());
            EventResult::Continue
        });
        Self {
            registry: Registry::new(),
            modules: StaticModuleLoader::new(),
            events,
            defaults: Requirements::new(),
            log,
            builds: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Enable `descriptor` with a factory exporting, for every provided
    /// component, a string naming the plugin and the components it received.
    fn add(&mut self, descriptor: PluginDescriptor) {
        let builds = self.builds.clone();
        self.modules.register(descriptor.entry_point(), move |descriptor, imports| {
            builds.fetch_add(1, Ordering::SeqCst);
            let injected: Vec<String> = imports
                .names()
                .map(|name| format!("{}={}", name, imports.get_as::<String>(name).cloned().unwrap_or_default()))
                .collect();
            let mut module = Module::new();
            for component in descriptor.provides().keys() {
                let value = format!("{}[{}]", descriptor.version_string(), injected.join(","));
                module = module.with_value(component, value);
            }
            Ok(module)
        });
        self.registry.enable(descriptor).unwrap();
    }

    fn ctx(&self) -> LoadContext<'_> {
        LoadContext {
            registry: &self.registry,
            modules: &self.modules,
            events: &self.events,
            defaults: &self.defaults,
        }
    }

    fn load(&self, loader: &mut Loader, component: &str) -> Result<String, PluginSystemError> {
        self.load_with(loader, component, &Requirements::new())
    }

    fn load_with(&self, loader: &mut Loader, component: &str, overrides: &Requirements) -> Result<String, PluginSystemError> {
        let object = loader.load(&self.ctx(), component, overrides, None, None)?;
        Ok(object.downcast_ref::<String>().cloned().unwrap_or_default())
    }

    fn events(&self) -> Vec<PluginEvent> {
        self.log.lock().unwrap().clone()
    }
}

fn greet_and_hello() -> Harness {
    let mut harness = Harness::new();
    harness.add(DescriptorBuilder::new("P1", "1.0.0").provides("greet").build().unwrap());
    harness.add(
        DescriptorBuilder::new("P2", "1.0.0")
            .consumes("greet", "P1:>=1.0.0")
            .provides("hello")
            .build()
            .unwrap(),
    );
    harness
}

#[test]
fn test_load_injects_dependencies_and_emits_events() {
    let harness = greet_and_hello();
    let mut loader = Loader::new();

    let hello = harness.load(&mut loader, "hello").unwrap();
    assert_eq!(hello, "P2:1.0.0[greet=P1:1.0.0[]]");

    let events = harness.events();
    let plugin_loaded: Vec<&PluginEvent> = events
        .iter()
        .filter(|e| matches!(e, PluginEvent::PluginLoaded { .. }))
        .collect();
    assert_eq!(
        plugin_loaded,
        vec![
            &PluginEvent::PluginLoaded {
                plugin: "P1:1.0.0".to_string(),
                requested_by: Some("P2:1.0.0".to_string()),
                component: Some("greet".to_string()),
            },
            &PluginEvent::PluginLoaded {
                plugin: "P2:1.0.0".to_string(),
                requested_by: None,
                component: Some("hello".to_string()),
            },
        ]
    );
    let hello_loaded = events
        .iter()
        .filter(|e| matches!(e, PluginEvent::ComponentLoaded { component, .. } if component == "hello"))
        .count();
    assert_eq!(hello_loaded, 1);
    assert!(events.contains(&PluginEvent::ComponentLoaded {
        component: "greet".to_string(),
        requested_by: Some("P2:1.0.0".to_string()),
        plugin: "P1:1.0.0".to_string(),
    }));
}

#[test]
fn test_load_is_at_most_once() {
    let harness = greet_and_hello();
    let mut loader = Loader::new();

    let first = loader
        .load(&harness.ctx(), "hello", &Requirements::new(), None, None)
        .unwrap();
    let builds = harness.builds.load(Ordering::SeqCst);
    let event_count = harness.events().len();

    let second = loader
        .load(&harness.ctx(), "hello", &Requirements::new(), None, None)
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(harness.builds.load(Ordering::SeqCst), builds);
    assert_eq!(harness.events().len(), event_count, "Cache hits emit nothing");

    // Loading the dependency directly reuses the plugin loaded for P2.
    harness.load(&mut loader, "greet").unwrap();
    assert_eq!(harness.builds.load(Ordering::SeqCst), 2);
    assert_eq!(loader.plugin_count(), 2);
}

#[test]
fn test_cyclic_dependency_is_detected() {
    let mut harness = Harness::new();
    harness.add(DescriptorBuilder::new("A", "1.0.0").consumes("b", "B").provides("a").build().unwrap());
    harness.add(DescriptorBuilder::new("B", "1.0.0").consumes("a", "A").provides("b").build().unwrap());
    let mut loader = Loader::new();

    let err = harness.load(&mut loader, "a").unwrap_err();
    assert!(matches!(err, PluginSystemError::DependencyLoadError { .. }));
    match err.root_cause() {
        PluginSystemError::CyclicDependency { chain } => {
            assert_eq!(chain, &vec!["A:1.0.0".to_string(), "B:1.0.0".to_string(), "A:1.0.0".to_string()]);
        }
        other => panic!("Expected CyclicDependency, got {:?}", other),
    }
    assert_eq!(harness.builds.load(Ordering::SeqCst), 0);
    assert!(!loader.is_loaded(&PluginKey::new("A", Version::new(1, 0, 0))));
    assert!(!loader.has_failed(&PluginKey::new("A", Version::new(1, 0, 0))));
}

#[test]
fn test_self_consumption_is_a_cycle() {
    let mut harness = Harness::new();
    harness.add(DescriptorBuilder::new("A", "1.0.0").consumes("a", "A").provides("a").build().unwrap());
    let mut loader = Loader::new();

    let err = harness.load(&mut loader, "a").unwrap_err();
    assert!(matches!(err.root_cause(), PluginSystemError::CyclicDependency { .. }));
}

#[test]
fn test_missing_component_leaves_caches_unmodified() {
    let harness = greet_and_hello();
    let mut loader = Loader::new();

    let err = harness.load(&mut loader, "missing").unwrap_err();
    assert!(matches!(err, PluginSystemError::ComponentNotProvided { .. }));
    assert_eq!(loader.loaded_components().count(), 0);
    assert_eq!(loader.plugin_count(), 0);
    assert!(harness.events().is_empty());
}

#[test]
fn test_failed_dependency_keeps_partial_success() {
    let mut harness = Harness::new();
    harness.add(DescriptorBuilder::new("A", "1.0.0").provides("a").build().unwrap());
    harness.add(DescriptorBuilder::new("B", "1.0.0").provides("b").build().unwrap());
    harness.add(
        DescriptorBuilder::new("C", "1.0.0")
            .consumes("a", "A")
            .consumes("b", "B:>=2.0.0")
            .provides("c")
            .build()
            .unwrap(),
    );
    let mut loader = Loader::new();

    let err = harness.load(&mut loader, "c").unwrap_err();
    match &err {
        PluginSystemError::DependencyLoadError { component, plugin, source, .. } => {
            assert_eq!(component, "b");
            assert_eq!(plugin, "C");
            assert!(matches!(**source, PluginSystemError::RequirementNotMet { .. }));
        }
        other => panic!("Expected DependencyLoadError, got {:?}", other),
    }
    assert!(std::error::Error::source(&err).is_some());

    assert!(loader.is_loaded(&PluginKey::new("A", Version::new(1, 0, 0))));
    assert!(!loader.is_loaded(&PluginKey::new("C", Version::new(1, 0, 0))));
    assert!(!loader.has_failed(&PluginKey::new("C", Version::new(1, 0, 0))));
}

#[test]
fn test_dependencies_load_in_declaration_order() {
    let mut harness = Harness::new();
    harness.add(DescriptorBuilder::new("Z", "1.0.0").provides("zeta").build().unwrap());
    harness.add(DescriptorBuilder::new("A", "1.0.0").provides("alpha").build().unwrap());
    harness.add(
        DescriptorBuilder::new("C", "1.0.0")
            .consumes("zeta", "Z")
            .consumes("alpha", "A")
            .provides("c")
            .build()
            .unwrap(),
    );
    let mut loader = Loader::new();
    harness.load(&mut loader, "c").unwrap();

    let loaded: Vec<String> = harness
        .events()
        .into_iter()
        .filter_map(|event| match event {
            PluginEvent::PluginLoaded { plugin, .. } => Some(plugin),
            _ => None,
        })
        .collect();
    assert_eq!(loaded, vec!["Z:1.0.0", "A:1.0.0", "C:1.0.0"]);
}

#[test]
fn test_module_load_failure_is_permanent() {
    let mut harness = Harness::new();
    harness.registry.enable(DescriptorBuilder::new("broken", "1.0.0").provides("thing").build().unwrap()).unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = attempts.clone();
    harness.modules.register("broken", move |_, _| {
        attempts_clone.fetch_add(1, Ordering::SeqCst);
        Err("boom".into())
    });
    let mut loader = Loader::new();

    let err = harness.load(&mut loader, "thing").unwrap_err();
    match &err {
        PluginSystemError::ModuleLoadError { plugin, entry_point, source, .. } => {
            assert_eq!(plugin, "broken");
            assert_eq!(entry_point, "broken");
            assert_eq!(source.to_string(), "boom");
        }
        other => panic!("Expected ModuleLoadError, got {:?}", other),
    }
    assert!(loader.has_failed(&PluginKey::new("broken", Version::new(1, 0, 0))));

    let err = harness.load(&mut loader, "thing").unwrap_err();
    assert!(matches!(err, PluginSystemError::PluginPreviouslyFailed { .. }));
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "A failed module is never rebuilt");
}

#[test]
fn test_missing_export() {
    let mut harness = Harness::new();
    harness.add(DescriptorBuilder::new("A", "1.0.0").provides_at("a", "nested.a").build().unwrap());
    let mut loader = Loader::new();

    let err = harness.load(&mut loader, "a").unwrap_err();
    match err {
        PluginSystemError::MissingExport { path, segment, .. } => {
            assert_eq!(path, "nested.a");
            assert_eq!(segment, "nested");
        }
        other => panic!("Expected MissingExport, got {:?}", other),
    }
    assert_eq!(loader.loaded_components().count(), 0);
}

#[test]
fn test_requirement_precedence() {
    let mut harness = Harness::new();
    harness.add(DescriptorBuilder::new("alpha", "1.0.0").provides("greet").build().unwrap());
    harness.add(DescriptorBuilder::new("beta", "1.0.0").provides("greet").build().unwrap());
    harness.add(
        DescriptorBuilder::new("P2", "1.0.0")
            .consumes("greet", "beta")
            .provides("hello")
            .build()
            .unwrap(),
    );
    harness.defaults = Requirements::parse([("greet", "alpha")]).unwrap();

    // defaults apply to a host request
    let mut loader = Loader::new();
    assert_eq!(harness.load(&mut loader, "greet").unwrap(), "alpha:1.0.0[]");
    // declared consumes beat defaults
    assert_eq!(harness.load(&mut loader, "hello").unwrap(), "P2:1.0.0[greet=beta:1.0.0[]]");

    // overrides beat declared consumes, all the way down the chain
    let mut loader = Loader::new();
    let overrides = Requirements::parse([("greet", "alpha")]).unwrap();
    assert_eq!(
        harness.load_with(&mut loader, "hello", &overrides).unwrap(),
        "P2:1.0.0[greet=alpha:1.0.0[]]"
    );
}

#[test]
fn test_without_requirement_uses_first_provider() {
    let mut harness = Harness::new();
    harness.add(DescriptorBuilder::new("zeta", "1.0.0").provides("greet").build().unwrap());
    harness.add(DescriptorBuilder::new("alpha", "1.0.0").provides("greet").build().unwrap());
    harness.add(DescriptorBuilder::new("alpha", "2.0.0").provides("greet").build().unwrap());
    let mut loader = Loader::new();

    assert_eq!(harness.load(&mut loader, "greet").unwrap(), "alpha:2.0.0[]");
}

#[test]
fn test_load_plugin_unknown() {
    let harness = Harness::new();
    let mut loader = Loader::new();
    let err = loader
        .load_plugin(
            &harness.ctx(),
            &PluginKey::new("ghost", Version::new(1, 0, 0)),
            &Requirements::new(),
            None,
            None,
        )
        .unwrap_err();
    assert!(matches!(err, PluginSystemError::UnknownPlugin { .. }));
}
