//! Name-keyed service provider for test code.
//!
//! A [`ServiceProvider`] holds named service instances and an explicit dependency metadata table. Constructing a
//! type through the provider looks up the type's declared dependency names, resolves each one against the
//! registered services, merges any caller-supplied extra options on top, and always injects the provider itself
//! under [`SELF_KEY`].
//!
//! ## Notes
//!
//! - Dependencies are declared up front with [`ServiceProvider::declare_dependencies`]; a type may instead borrow
//!   another type's list with [`ServiceProvider::inherit_dependencies`]. A type with neither has no dependencies.
//! - Only the declared dependencies are injected; other registered services are not visible to the constructor.
//! - The provider is a cheap clonable handle. Clones share the same registry.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use fixtree_core::{ErrorKind, Failure};
use indexmap::IndexMap;
use miette::Diagnostic;
use thiserror::Error;

/// A registered service instance.
pub type Service = Rc<dyn Any>;

/// Reserved options key under which the provider injects itself.
pub const SELF_KEY: &str = "serviceProvider";

/// Errors raised while resolving services.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum DiError {
    #[error("No service registered for \"{0}\"")]
    #[diagnostic(code(fixtree_di::unknown_service))]
    UnknownService(String),

    #[error("Service \"{name}\" is not a {expected}")]
    #[diagnostic(code(fixtree_di::wrong_type))]
    WrongType { name: String, expected: &'static str },

    #[error("Unsatisfied dependencies {names} when constructing {constructor}")]
    #[diagnostic(
        code(fixtree_di::unsatisfied),
        help("register the missing services before constructing")
    )]
    Unsatisfied { names: String, constructor: String },

    #[error("Passed bad class type \"{0}\" to ServiceProvider.new()")]
    #[diagnostic(code(fixtree_di::bad_class_type))]
    BadClassType(String),
}

impl DiError {
    /// All provider errors are reference errors.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ReferenceError
    }
}

impl From<DiError> for Failure {
    fn from(err: DiError) -> Self {
        Failure::new(err.kind(), err.to_string())
    }
}

/// Options handed to a constructor: resolved dependencies, extras and the provider itself.
#[derive(Clone, Default)]
pub struct Options {
    values: IndexMap<String, Service>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Options::insert`].
    pub fn with<T: Any>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, Rc::new(value));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Service) {
        self.values.insert(name.into(), value);
    }

    pub fn get_service(&self, name: &str) -> Option<Service> {
        self.values.get(name).cloned()
    }

    /// Fetch and downcast an option. `None` when absent or of another type.
    pub fn get<T: Any>(&self, name: &str) -> Option<Rc<T>> {
        self.get_service(name).and_then(|value| value.downcast::<T>().ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// The provider that built these options.
    pub fn service_provider(&self) -> Option<ServiceProvider> {
        self.get::<ServiceProvider>(SELF_KEY).map(|sp| (*sp).clone())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values.keys()).finish()
    }
}

/// A type the provider can build.
///
/// `Args` are the positional arguments that precede the options (`()` for most types).
pub trait Construct: Sized + 'static {
    type Args;

    fn construct(args: Self::Args, options: Options) -> Self;
}

enum DependencySpec {
    Own(Vec<String>),
    Inherited(TypeId),
}

type NamedConstructor = Rc<dyn Fn(&ServiceProvider, Options) -> Result<Service, DiError>>;

#[derive(Default)]
struct Registry {
    services: IndexMap<String, Service>,
    dependencies: HashMap<TypeId, DependencySpec>,
    constructors: IndexMap<String, NamedConstructor>,
}

/// Shared handle to a service registry.
#[derive(Clone, Default)]
pub struct ServiceProvider {
    inner: Rc<RefCell<Registry>>,
}

impl ServiceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a service instance.
    pub fn register<T: Any>(&self, name: impl Into<String>, service: T) {
        self.register_service(name, Rc::new(service));
    }

    /// Register an already shared instance; `get` hands back the same `Rc`.
    pub fn register_service(&self, name: impl Into<String>, service: Service) {
        self.inner.borrow_mut().services.insert(name.into(), service);
    }

    /// Look up a service by name.
    pub fn get_service(&self, name: &str) -> Result<Service, DiError> {
        self.inner
            .borrow()
            .services
            .get(name)
            .cloned()
            .ok_or_else(|| DiError::UnknownService(name.to_string()))
    }

    /// Look up a service by name and downcast it.
    pub fn get<T: Any>(&self, name: &str) -> Result<Rc<T>, DiError> {
        self.get_service(name)?.downcast::<T>().map_err(|_| DiError::WrongType {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Declare the ordered dependency names of `T`, replacing any earlier declaration.
    pub fn declare_dependencies<T: 'static>(&self, names: &[&str]) {
        let names = names.iter().map(|n| n.to_string()).collect();
        self.inner
            .borrow_mut()
            .dependencies
            .insert(TypeId::of::<T>(), DependencySpec::Own(names));
    }

    /// Make `Child` use whatever dependencies `Parent` declares (now or later).
    pub fn inherit_dependencies<Child: 'static, Parent: 'static>(&self) {
        self.inner
            .borrow_mut()
            .dependencies
            .insert(TypeId::of::<Child>(), DependencySpec::Inherited(TypeId::of::<Parent>()));
    }

    /// Resolve the dependency list of `T`, following inheritance links.
    pub fn dependencies_of<T: 'static>(&self) -> Vec<String> {
        self.dependencies_for(TypeId::of::<T>())
    }

    fn dependencies_for(&self, mut id: TypeId) -> Vec<String> {
        let registry = self.inner.borrow();
        let mut hops = 0;
        loop {
            match registry.dependencies.get(&id) {
                Some(DependencySpec::Own(names)) => return names.clone(),
                Some(DependencySpec::Inherited(parent)) if hops < registry.dependencies.len() => {
                    id = *parent;
                    hops += 1;
                }
                // No declaration, or an inheritance cycle.
                _ => return Vec::new(),
            }
        }
    }

    /// Construct a `T` that takes no positional arguments and no extras.
    pub fn create<T: Construct<Args = ()>>(&self) -> Result<T, DiError> {
        self.create_with::<T>((), Options::new())
    }

    /// Construct a `T` from positional `args`, its declared dependencies and `extra` options.
    ///
    /// Extras override same-named services; the provider itself is always present under [`SELF_KEY`].
    ///
    /// # Errors
    ///
    /// [`DiError::Unsatisfied`] naming every unregistered dependency and the type being constructed.
    pub fn create_with<T: Construct>(&self, args: T::Args, extra: Options) -> Result<T, DiError> {
        let options = self.resolve_options(TypeId::of::<T>(), short_type_name::<T>(), extra)?;
        tracing::debug!(constructor = short_type_name::<T>(), options = ?options, "constructing");
        Ok(T::construct(args, options))
    }

    fn resolve_options(&self, id: TypeId, constructor: &str, extra: Options) -> Result<Options, DiError> {
        let dependencies = self.dependencies_for(id);
        let mut options = Options::new();
        let mut missing = Vec::new();
        {
            let registry = self.inner.borrow();
            for name in &dependencies {
                match registry.services.get(name) {
                    Some(service) => options.insert(name.clone(), service.clone()),
                    None => missing.push(format!("\"{name}\"")),
                }
            }
        }
        if !missing.is_empty() {
            return Err(DiError::Unsatisfied {
                names: missing.join(", "),
                constructor: constructor.to_string(),
            });
        }
        for (name, value) in extra.values {
            options.insert(name, value);
        }
        options.insert(SELF_KEY, Rc::new(self.clone()));
        Ok(options)
    }

    /// Make `T` constructible by name through [`ServiceProvider::create_named`].
    pub fn register_constructor<T: Construct<Args = ()>>(&self, name: impl Into<String>) {
        let ctor: NamedConstructor = Rc::new(|sp: &ServiceProvider, extra: Options| {
            let value = sp.create_with::<T>((), extra)?;
            Ok(Rc::new(value) as Service)
        });
        self.inner.borrow_mut().constructors.insert(name.into(), ctor);
    }

    /// Construct a type registered with [`ServiceProvider::register_constructor`].
    ///
    /// # Errors
    ///
    /// [`DiError::BadClassType`] when `name` is not a registered constructor.
    pub fn create_named(&self, name: &str, extra: Options) -> Result<Service, DiError> {
        let ctor = self
            .inner
            .borrow()
            .constructors
            .get(name)
            .cloned()
            .ok_or_else(|| DiError::BadClassType(name.to_string()))?;
        ctor(self, extra)
    }

    /// Whether two handles share a registry.
    pub fn ptr_eq(&self, other: &ServiceProvider) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.borrow();
        f.debug_struct("ServiceProvider")
            .field("services", &registry.services.keys().collect::<Vec<_>>())
            .field("constructors", &registry.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
