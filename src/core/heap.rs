//! Lazy object-graph container.
//!
//! A [`Heap`] holds named *declarations* (a [`Heaplet`] plus its raw JSON
//! configuration) and materializes each one on first [`Heap::get`]. Built
//! objects are cached so every later lookup returns the same instance. Lookups
//! for names that are not declared locally are delegated to the parent heap,
//! which lets route heaps see the infrastructure objects seeded into the root.
//!
//! Each heap is guarded by a re-entrant lock: a heaplet building one object
//! may resolve its own dependencies through the same heap on the same thread,
//! while other threads wait. Names currently being built are tagged so that a
//! dependency cycle fails fast with [`HeapError::CyclicDependency`].
use std::{
    any::Any,
    cell::RefCell,
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::name::Name;

/// Errors raised while declaring, building or resolving heap objects.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HeapError {
    #[error("object '{name}' is already declared in heap '{heap}'")]
    DuplicateName { heap: Name, name: String },

    #[error("object '{0}' not found")]
    NotFound(String),

    #[error("object '{name}' is not of the expected type {expected}")]
    WrongType {
        name: String,
        expected: &'static str,
    },

    #[error("heaplet for '{0}' produced no object")]
    NoObject(String),

    #[error("cyclic dependency detected while building '{0}'")]
    CyclicDependency(String),

    #[error("heap '{0}' has been destroyed")]
    Destroyed(Name),

    #[error("unknown object type '{0}'")]
    UnknownType(String),

    #[error("invalid configuration for '{name}': {message}")]
    Config { name: String, message: String },

    #[error("failed to acquire resource for '{name}': {source}")]
    Resource {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl HeapError {
    /// Shorthand for a configuration error attributed to `name`.
    pub fn config(name: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Config {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for heap operations
pub type HeapResult<T> = Result<T, HeapError>;

/// A type-erased, shareable object living in a heap.
///
/// Heaplets usually store an `Arc<dyn Trait>` so consumers can downcast to the
/// trait object they need (`Arc<dyn Handler>`, `Arc<dyn Filter>` ...).
#[derive(Clone)]
pub struct HeapObject(Arc<dyn Any + Send + Sync>);

impl HeapObject {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Clone the stored value out if it has type `T`.
    pub fn downcast<T: Any + Clone>(&self) -> Option<T> {
        self.0.downcast_ref::<T>().cloned()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    /// Whether both handles refer to the same materialized instance.
    pub fn ptr_eq(&self, other: &HeapObject) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl fmt::Debug for HeapObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HeapObject").finish_non_exhaustive()
    }
}

/// Per-declaration object builder.
///
/// A fresh heaplet is created for every declaration, so a heaplet can keep
/// whatever it built and release it in [`Heaplet::destroy`]. `destroy` is called
/// exactly once when the owning heap is destroyed, even if `create` never ran.
pub trait Heaplet: Send {
    fn create(&mut self, name: &Name, config: &Value, heap: &Heap) -> HeapResult<Option<HeapObject>>;

    fn destroy(&mut self) {}
}

type HeapletConstructor = Arc<dyn Fn() -> Box<dyn Heaplet> + Send + Sync>;

/// Maps object type names (`"StaticResponseHandler"`) to heaplet constructors.
#[derive(Clone, Default)]
pub struct HeapletRegistry {
    constructors: HashMap<String, HeapletConstructor>,
}

impl HeapletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, type_name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Heaplet> + Send + Sync + 'static,
    {
        self.constructors
            .insert(type_name.into(), Arc::new(constructor));
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    pub fn new_heaplet(&self, type_name: &str) -> Option<Box<dyn Heaplet>> {
        self.constructors.get(type_name).map(|ctor| ctor())
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for HeapletRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapletRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

/// One `{name, type, config}` entry of a `heap` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectDeclaration {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub config: Value,
}

struct Declaration {
    heaplet: Box<dyn Heaplet>,
    config: Value,
}

#[derive(Default)]
struct HeapState {
    declarations: HashMap<String, Declaration>,
    // Declaration order; destroy hooks run in reverse.
    order: Vec<String>,
    instances: HashMap<String, HeapObject>,
    in_progress: HashSet<String>,
    anonymous: u64,
    destroyed: bool,
}

struct HeapInner {
    name: Name,
    parent: Option<Heap>,
    registry: Arc<HeapletRegistry>,
    state: ReentrantMutex<RefCell<HeapState>>,
}

enum Lookup {
    Cached(HeapObject),
    Build(Declaration),
    Delegate,
}

/// Lazy dependency-injection container with parent delegation.
///
/// Cloning a `Heap` yields another handle to the same container.
#[derive(Clone)]
pub struct Heap {
    inner: Arc<HeapInner>,
}

impl Heap {
    /// Create the root heap of a process.
    pub fn root(name: Name, registry: HeapletRegistry) -> Self {
        Self::with_parent(name, None, Arc::new(registry))
    }

    /// Create a child heap delegating unknown names to `self`.
    pub fn new_child(&self, name: Name) -> Self {
        Self::with_parent(name, Some(self.clone()), self.inner.registry.clone())
    }

    fn with_parent(name: Name, parent: Option<Heap>, registry: Arc<HeapletRegistry>) -> Self {
        Self {
            inner: Arc::new(HeapInner {
                name,
                parent,
                registry,
                state: ReentrantMutex::new(RefCell::new(HeapState::default())),
            }),
        }
    }

    pub fn name(&self) -> &Name {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<&Heap> {
        self.inner.parent.as_ref()
    }

    pub fn registry(&self) -> &HeapletRegistry {
        &self.inner.registry
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().borrow().destroyed
    }

    /// Names declared in this heap (not its parents), in declaration order.
    pub fn declared_names(&self) -> Vec<String> {
        self.inner.state.lock().borrow().order.clone()
    }

    /// Register a pending object built by `heaplet` on first lookup.
    pub fn declare(
        &self,
        name: impl Into<String>,
        heaplet: Box<dyn Heaplet>,
        config: Value,
    ) -> HeapResult<()> {
        let name = name.into();
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        if state.destroyed {
            return Err(HeapError::Destroyed(self.inner.name.clone()));
        }
        if Self::is_taken(&state, &name) {
            return Err(HeapError::DuplicateName {
                heap: self.inner.name.clone(),
                name,
            });
        }
        state.order.push(name.clone());
        state
            .declarations
            .insert(name, Declaration { heaplet, config });
        Ok(())
    }

    /// Declare an object of a registered type.
    pub fn declare_type(
        &self,
        name: impl Into<String>,
        type_name: &str,
        config: Value,
    ) -> HeapResult<()> {
        let heaplet = self
            .inner
            .registry
            .new_heaplet(type_name)
            .ok_or_else(|| HeapError::UnknownType(type_name.to_string()))?;
        self.declare(name, heaplet, config)
    }

    /// Declare a whole `heap` section. Either every entry is declared or none.
    pub fn init(&self, objects: &[ObjectDeclaration]) -> HeapResult<()> {
        let guard = self.inner.state.lock();
        {
            let state = guard.borrow();
            if state.destroyed {
                return Err(HeapError::Destroyed(self.inner.name.clone()));
            }
            let mut seen = HashSet::new();
            for object in objects {
                if !seen.insert(object.name.as_str()) || Self::is_taken(&state, &object.name) {
                    return Err(HeapError::DuplicateName {
                        heap: self.inner.name.clone(),
                        name: object.name.clone(),
                    });
                }
                if !self.inner.registry.contains(&object.type_name) {
                    return Err(HeapError::UnknownType(object.type_name.clone()));
                }
            }
        }
        for object in objects {
            self.declare_type(object.name.clone(), &object.type_name, object.config.clone())?;
        }
        tracing::debug!(heap = %self.inner.name, count = objects.len(), "Declared heap objects");
        Ok(())
    }

    /// Force-install an already built object, replacing any cached instance.
    pub fn put(&self, name: impl Into<String>, object: HeapObject) -> HeapResult<()> {
        let name = name.into();
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        if state.destroyed {
            return Err(HeapError::Destroyed(self.inner.name.clone()));
        }
        if !state.order.contains(&name) {
            state.order.push(name.clone());
        }
        state.instances.insert(name, object);
        Ok(())
    }

    /// Look up `name`, building it on first use. `Ok(None)` means no heap in
    /// the parent chain knows the name.
    pub fn get(&self, name: &str) -> HeapResult<Option<HeapObject>> {
        let guard = self.inner.state.lock();
        let lookup = {
            let mut state = guard.borrow_mut();
            if state.destroyed {
                return Err(HeapError::Destroyed(self.inner.name.clone()));
            }
            if let Some(object) = state.instances.get(name) {
                Lookup::Cached(object.clone())
            } else if state.in_progress.contains(name) {
                return Err(HeapError::CyclicDependency(
                    self.inner.name.child(name).to_string(),
                ));
            } else if let Some(declaration) = state.declarations.remove(name) {
                state.in_progress.insert(name.to_string());
                Lookup::Build(declaration)
            } else {
                Lookup::Delegate
            }
        };

        let mut declaration = match lookup {
            Lookup::Cached(object) => return Ok(Some(object)),
            Lookup::Delegate => {
                drop(guard);
                return match &self.inner.parent {
                    Some(parent) => parent.get(name),
                    None => Ok(None),
                };
            }
            Lookup::Build(declaration) => declaration,
        };

        let object_name = self.inner.name.child(name);
        tracing::debug!(object = %object_name, "Materializing heap object");
        let result = declaration
            .heaplet
            .create(&object_name, &declaration.config, self);

        let mut state = guard.borrow_mut();
        state.in_progress.remove(name);
        if state.destroyed {
            // The heap was destroyed from inside the heaplet; its hook still runs once.
            drop(state);
            declaration.heaplet.destroy();
            return Err(HeapError::Destroyed(self.inner.name.clone()));
        }
        state.declarations.insert(name.to_string(), declaration);
        match result {
            Ok(Some(object)) => {
                state.instances.insert(name.to_string(), object.clone());
                Ok(Some(object))
            }
            Ok(None) => Err(HeapError::NoObject(object_name.to_string())),
            Err(error) => {
                tracing::warn!(object = %object_name, %error, "Failed to build heap object");
                Err(error)
            }
        }
    }

    /// Look up `name` and downcast it to `T`; absence is an error.
    pub fn get_as<T: Any + Clone>(&self, name: &str) -> HeapResult<T> {
        let object = self
            .get(name)?
            .ok_or_else(|| HeapError::NotFound(name.to_string()))?;
        object.downcast::<T>().ok_or(HeapError::WrongType {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Resolve a configuration reference: either the name of an object
    /// reachable from this heap, or an inline `{type, config[, name]}`
    /// declaration which is declared (anonymously unless named) and built now.
    pub fn resolve(&self, reference: &Value, optional: bool) -> HeapResult<Option<HeapObject>> {
        let resolved = match reference {
            Value::Null if optional => return Ok(None),
            Value::Null => {
                return Err(HeapError::config(
                    &self.inner.name,
                    "missing required object reference",
                ));
            }
            Value::String(name) => self.get(name)?,
            Value::Object(_) => {
                let key = self.declare_inline(reference)?;
                self.get(&key)?
            }
            other => {
                return Err(HeapError::config(
                    &self.inner.name,
                    format!("expected an object name or inline declaration, got {other}"),
                ));
            }
        };
        match resolved {
            Some(object) => Ok(Some(object)),
            None if optional => Ok(None),
            None => Err(HeapError::NotFound(reference.to_string())),
        }
    }

    /// Typed [`Heap::resolve`]; a present object of another type is an error.
    pub fn resolve_as<T: Any + Clone>(&self, reference: &Value, optional: bool) -> HeapResult<Option<T>> {
        match self.resolve(reference, optional)? {
            Some(object) => object.downcast::<T>().map(Some).ok_or(HeapError::WrongType {
                name: reference.to_string(),
                expected: std::any::type_name::<T>(),
            }),
            None => Ok(None),
        }
    }

    /// Resolve a mandatory reference to a `T`.
    pub fn require_as<T: Any + Clone>(&self, reference: &Value) -> HeapResult<T> {
        self.resolve_as::<T>(reference, false)?
            .ok_or_else(|| HeapError::NotFound(reference.to_string()))
    }

    fn declare_inline(&self, reference: &Value) -> HeapResult<String> {
        let type_name = reference
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                HeapError::config(&self.inner.name, "inline declaration requires a 'type'")
            })?;
        let config = reference.get("config").cloned().unwrap_or(Value::Null);
        let key = match reference.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => {
                let guard = self.inner.state.lock();
                let mut state = guard.borrow_mut();
                let key = format!("{type_name}#anonymous-{}", state.anonymous);
                state.anonymous += 1;
                key
            }
        };
        self.declare_type(key.clone(), type_name, config)?;
        Ok(key)
    }

    /// Drop every declaration and cached instance and run each heaplet's
    /// destroy hook once. Further materialization is rejected.
    pub fn destroy(&self) {
        let guard = self.inner.state.lock();
        let (mut declarations, order) = {
            let mut state = guard.borrow_mut();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.instances.clear();
            (
                std::mem::take(&mut state.declarations),
                std::mem::take(&mut state.order),
            )
        };
        for name in order.iter().rev() {
            if let Some(mut declaration) = declarations.remove(name) {
                declaration.heaplet.destroy();
            }
        }
        tracing::debug!(heap = %self.inner.name, "Heap destroyed");
    }

    fn is_taken(state: &HeapState, name: &str) -> bool {
        state.declarations.contains_key(name)
            || state.instances.contains_key(name)
            || state.in_progress.contains(name)
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("name", &self.inner.name)
            .field("parent", &self.inner.parent.as_ref().map(Heap::name))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    #[derive(Default, Clone)]
    struct Counters {
        created: Arc<AtomicUsize>,
        destroyed: Arc<AtomicUsize>,
    }

    /// Builds the `value` string from its config, optionally after resolving `dependsOn`.
    struct TextHeaplet {
        counters: Counters,
    }

    impl Heaplet for TextHeaplet {
        fn create(&mut self, name: &Name, config: &Value, heap: &Heap) -> HeapResult<Option<HeapObject>> {
            if let Some(dependency) = config.get("dependsOn") {
                heap.resolve(dependency, false)?;
            }
            if config.get("empty").is_some() {
                return Ok(None);
            }
            let value = config
                .get("value")
                .and_then(Value::as_str)
                .ok_or_else(|| HeapError::config(name, "missing 'value'"))?;
            self.counters.created.fetch_add(1, Ordering::SeqCst);
            Ok(Some(HeapObject::new(value.to_string())))
        }

        fn destroy(&mut self) {
            self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn registry(counters: &Counters) -> HeapletRegistry {
        let mut registry = HeapletRegistry::new();
        let counters = counters.clone();
        registry.register("Text", move || {
            Box::new(TextHeaplet {
                counters: counters.clone(),
            })
        });
        registry
    }

    fn text(name: &str, value: &str) -> ObjectDeclaration {
        ObjectDeclaration {
            name: name.to_string(),
            type_name: "Text".to_string(),
            config: json!({ "value": value }),
        }
    }

    #[test]
    fn test_get_returns_same_instance() {
        let counters = Counters::default();
        let heap = Heap::root(Name::of("root"), registry(&counters));
        heap.init(&[text("greeting", "hello")]).unwrap();

        let first = heap.get("greeting").unwrap().unwrap();
        let second = heap.get("greeting").unwrap().unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(first.downcast::<String>().unwrap(), "hello");
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_child_delegates_to_parent() {
        let counters = Counters::default();
        let parent = Heap::root(Name::of("root"), registry(&counters));
        parent.init(&[text("shared", "from-parent")]).unwrap();
        let child = parent.new_child(Name::of("root").child("route"));

        let from_child = child.get("shared").unwrap().unwrap();
        let from_parent = parent.get("shared").unwrap().unwrap();
        assert!(from_child.ptr_eq(&from_parent));
        assert!(child.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_child_declaration_shadows_parent() {
        let counters = Counters::default();
        let parent = Heap::root(Name::of("root"), registry(&counters));
        parent.init(&[text("x", "parent")]).unwrap();
        let child = parent.new_child(Name::of("child"));
        child.init(&[text("x", "child")]).unwrap();

        assert_eq!(child.get_as::<String>("x").unwrap(), "child");
        assert_eq!(parent.get_as::<String>("x").unwrap(), "parent");
    }

    #[test]
    fn test_init_rejects_duplicates_atomically() {
        let counters = Counters::default();
        let heap = Heap::root(Name::of("root"), registry(&counters));
        let err = heap
            .init(&[text("a", "1"), text("b", "2"), text("a", "3")])
            .unwrap_err();
        assert!(matches!(err, HeapError::DuplicateName { ref name, .. } if name == "a"));
        assert!(heap.declared_names().is_empty());

        heap.init(&[text("a", "1")]).unwrap();
        let err = heap.init(&[text("a", "again")]).unwrap_err();
        assert!(matches!(err, HeapError::DuplicateName { .. }));
        assert_eq!(heap.get_as::<String>("a").unwrap(), "1");
    }

    #[test]
    fn test_init_rejects_unknown_type() {
        let heap = Heap::root(Name::of("root"), HeapletRegistry::new());
        let err = heap.init(&[text("a", "1")]).unwrap_err();
        assert!(matches!(err, HeapError::UnknownType(ref t) if t == "Text"));
    }

    #[test]
    fn test_put_seeds_instances() {
        let heap = Heap::root(Name::of("root"), HeapletRegistry::new());
        heap.put("answer", HeapObject::new(42_u32)).unwrap();
        let child = heap.new_child(Name::of("child"));
        assert_eq!(child.get_as::<u32>("answer").unwrap(), 42);

        let err = child.get_as::<String>("answer").unwrap_err();
        assert!(matches!(err, HeapError::WrongType { .. }));
    }

    #[test]
    fn test_failed_build_does_not_affect_siblings() {
        let counters = Counters::default();
        let heap = Heap::root(Name::of("root"), registry(&counters));
        heap.init(&[
            ObjectDeclaration {
                name: "broken".to_string(),
                type_name: "Text".to_string(),
                config: json!({}),
            },
            text("fine", "ok"),
        ])
        .unwrap();

        assert!(matches!(
            heap.get("broken").unwrap_err(),
            HeapError::Config { .. }
        ));
        assert_eq!(heap.get_as::<String>("fine").unwrap(), "ok");
        // Still declared, still failing on retry.
        assert!(heap.get("broken").is_err());
    }

    #[test]
    fn test_heaplet_returning_nothing_is_an_error() {
        let counters = Counters::default();
        let heap = Heap::root(Name::of("root"), registry(&counters));
        heap.declare_type("nothing", "Text", json!({ "empty": true }))
            .unwrap();
        assert!(matches!(
            heap.get("nothing").unwrap_err(),
            HeapError::NoObject(_)
        ));
    }

    #[test]
    fn test_cycle_is_detected() {
        let counters = Counters::default();
        let heap = Heap::root(Name::of("root"), registry(&counters));
        heap.declare_type("a", "Text", json!({ "value": "a", "dependsOn": "b" }))
            .unwrap();
        heap.declare_type("b", "Text", json!({ "value": "b", "dependsOn": "a" }))
            .unwrap();

        let err = heap.get("a").unwrap_err();
        assert!(matches!(err, HeapError::CyclicDependency(ref n) if n == "root/a"));
        // The failed attempt leaves both declarations usable for inspection.
        assert_eq!(heap.declared_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_resolve_inline_and_named() {
        let counters = Counters::default();
        let heap = Heap::root(Name::of("root"), registry(&counters));
        heap.init(&[text("named", "by-name")]).unwrap();

        let named = heap.resolve_as::<String>(&json!("named"), false).unwrap();
        assert_eq!(named.as_deref(), Some("by-name"));

        let inline = heap
            .require_as::<String>(&json!({ "type": "Text", "config": { "value": "inline" } }))
            .unwrap();
        assert_eq!(inline, "inline");
        assert!(
            heap.declared_names()
                .iter()
                .any(|n| n.starts_with("Text#anonymous-"))
        );

        let dependent = heap
            .require_as::<String>(&json!({
                "type": "Text",
                "name": "dependent",
                "config": { "value": "dep", "dependsOn": "named" }
            }))
            .unwrap();
        assert_eq!(dependent, "dep");
        assert_eq!(heap.get_as::<String>("dependent").unwrap(), "dep");
    }

    #[test]
    fn test_resolve_missing_references() {
        let heap = Heap::root(Name::of("root"), HeapletRegistry::new());
        assert!(heap.resolve(&json!("absent"), true).unwrap().is_none());
        assert!(matches!(
            heap.resolve(&json!("absent"), false).unwrap_err(),
            HeapError::NotFound(_)
        ));
        assert!(heap.resolve(&Value::Null, true).unwrap().is_none());
        assert!(heap.resolve(&Value::Null, false).is_err());
        assert!(heap.resolve(&json!(12), true).is_err());
        assert!(matches!(
            heap.resolve(&json!({ "type": "Nope" }), false).unwrap_err(),
            HeapError::UnknownType(_)
        ));
    }

    #[test]
    fn test_destroy_notifies_every_heaplet_once() {
        let counters = Counters::default();
        let heap = Heap::root(Name::of("root"), registry(&counters));
        heap.init(&[text("built", "1"), text("never-built", "2")])
            .unwrap();
        let held = heap.get("built").unwrap().unwrap();

        heap.destroy();
        heap.destroy();

        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 2);
        // References handed out before destruction remain usable.
        assert_eq!(held.downcast::<String>().unwrap(), "1");
    }

    #[test]
    fn test_destroyed_heap_rejects_materialization() {
        let counters = Counters::default();
        let heap = Heap::root(Name::of("root"), registry(&counters));
        heap.init(&[text("a", "1")]).unwrap();
        heap.destroy();

        assert!(heap.is_destroyed());
        assert!(matches!(heap.get("a").unwrap_err(), HeapError::Destroyed(_)));
        assert!(heap.init(&[text("b", "2")]).is_err());
        assert!(heap.put("c", HeapObject::new(1_u8)).is_err());
        assert!(heap.declared_names().is_empty());
    }

    #[test]
    fn test_concurrent_get_builds_once() {
        let counters = Counters::default();
        let heap = Heap::root(Name::of("root"), registry(&counters));
        heap.init(&[text("shared", "v")]).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let heap = heap.clone();
                std::thread::spawn(move || heap.get("shared").unwrap().unwrap())
            })
            .collect();
        let objects: Vec<HeapObject> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
        assert!(objects.windows(2).all(|w| w[0].ptr_eq(&w[1])));
    }
}
