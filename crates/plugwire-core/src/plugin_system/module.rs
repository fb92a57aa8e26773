//! Loaded plugin modules and the host collaborator that produces them.
//!
//! A [`Module`] is a name → export tree built by the host. Components are read
//! from it by dotted access path, so `"widgets.button"` walks the `widgets`
//! namespace and returns its `button` value. The engine never inspects the
//! exported values; they travel as type-erased [`Object`]s.
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::plugin_system::error::BoxError;
use crate::plugin_system::manifest::PluginDescriptor;

/// A component value as seen by the engine.
pub type Object = Arc<dyn Any + Send + Sync>;

/// Function stored in a module and invoked when its plugin is enabled.
pub type EnableHook = Arc<dyn Fn(&PluginDescriptor) -> Result<(), BoxError> + Send + Sync>;

/// Builds a plugin's module from its descriptor and injected components.
pub type ModuleFactory = Box<dyn Fn(&PluginDescriptor, &Imports) -> Result<Module, BoxError> + Send + Sync>;

pub enum Export {
    Value(Object),
    Namespace(Module),
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Export::Value(_) => f.write_str("Value(..)"),
            Export::Namespace(module) => f.debug_tuple("Namespace").field(module).finish(),
        }
    }
}

/// A segment of a dotted path that does not name an export.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no export named '{segment}'")]
pub struct ExportLookupError {
    pub segment: String,
}

#[derive(Debug, Default)]
pub struct Module {
    exports: BTreeMap<String, Export>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value<T: Any + Send + Sync>(self, name: &str, value: T) -> Self {
        self.with_object(name, Arc::new(value))
    }

    pub fn with_object(mut self, name: &str, object: Object) -> Self {
        self.insert(name, Export::Value(object));
        self
    }

    /// Export an enable hook under `name`.
    pub fn with_hook<F>(self, name: &str, hook: F) -> Self
    where
        F: Fn(&PluginDescriptor) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let hook: EnableHook = Arc::new(hook);
        self.with_value(name, hook)
    }

    pub fn with_namespace(mut self, name: &str, namespace: Module) -> Self {
        self.insert(name, Export::Namespace(namespace));
        self
    }

    pub fn insert(&mut self, name: &str, export: Export) -> Option<Export> {
        self.exports.insert(name.to_string(), export)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(String::as_str)
    }

    /// Walks `path` segment by segment. Every segment but the last must name a
    /// namespace; the last must name a value.
    pub fn get(&self, path: &str) -> Result<Object, ExportLookupError> {
        let mut current = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let missing = || ExportLookupError {
                segment: segment.to_string(),
            };
            match (current.exports.get(segment), segments.peek().is_some()) {
                (Some(Export::Namespace(inner)), true) => current = inner,
                (Some(Export::Value(object)), false) => return Ok(Arc::clone(object)),
                _ => return Err(missing()),
            }
        }
        Err(ExportLookupError { segment: path.to_string() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("export '{0}' is not an enable hook")]
pub struct NotAnEnableHook(pub String);

/// Components injected into a plugin while its module is built.
#[derive(Default)]
pub struct Imports {
    components: BTreeMap<String, Object>,
}

impl Imports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, component: &str, object: Object) {
        self.components.insert(component.to_string(), object);
    }

    pub fn get(&self, component: &str) -> Option<&Object> {
        self.components.get(component)
    }

    /// The injected component downcast to `T`.
    pub fn get_as<T: Any + Send + Sync>(&self, component: &str) -> Option<&T> {
        self.components.get(component)?.downcast_ref::<T>()
    }

    pub fn contains(&self, component: &str) -> bool {
        self.components.contains_key(component)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Debug for Imports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.components.keys()).finish()
    }
}

/// Host collaborator that turns a descriptor plus its injected components into
/// a [`Module`].
pub trait ModuleLoader: Send + Sync {
    fn load_module(&self, descriptor: &PluginDescriptor, imports: &Imports) -> Result<Module, BoxError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no module factory registered for entry point '{0}'")]
pub struct UnknownEntryPoint(pub String);

/// [`ModuleLoader`] backed by a map of entry point → factory closure.
#[derive(Default)]
pub struct StaticModuleLoader {
    factories: BTreeMap<String, ModuleFactory>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory for `entry_point`, replacing any previous one.
    pub fn register<F>(&mut self, entry_point: &str, factory: F)
    where
        F: Fn(&PluginDescriptor, &Imports) -> Result<Module, BoxError> + Send + Sync + 'static,
    {
        self.factories.insert(entry_point.to_string(), Box::new(factory));
    }

    pub fn with<F>(mut self, entry_point: &str, factory: F) -> Self
    where
        F: Fn(&PluginDescriptor, &Imports) -> Result<Module, BoxError> + Send + Sync + 'static,
    {
        self.register(entry_point, factory);
        self
    }

    pub fn contains(&self, entry_point: &str) -> bool {
        self.factories.contains_key(entry_point)
    }
}

impl fmt::Debug for StaticModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticModuleLoader")
            .field("entry_points", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn load_module(&self, descriptor: &PluginDescriptor, imports: &Imports) -> Result<Module, BoxError> {
        let factory = self
            .factories
            .get(descriptor.entry_point())
            .ok_or_else(|| UnknownEntryPoint(descriptor.entry_point().to_string()))?;
        factory(descriptor, imports)
    }
}
