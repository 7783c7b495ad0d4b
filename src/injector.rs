//! Dependency Injection
//!
//! Associates capability types with the values handlers receive.
//!
//! The global [`Injector`] is populated at startup and shared read-only by
//! every connection. Each connection calls [`Injector::instantiate`] with an
//! [`Overlay`] of per-connection values (for example the authenticated user
//! derived from the handshake) and gets back a [`Dependencies`] snapshot.
//!
//! Resolution order: per-connection value, then global provider, then
//! [`DispatchError::UnresolvedDependency`].
//!
//! ```rust,ignore
//! let mut injector = Injector::new();
//! injector.register::<User>();                  // supplied per connection
//! injector.provide(Clock::system());            // shared by everyone
//!
//! let deps = injector.instantiate(Overlay::new().bind(User { id: 8001 }));
//! let user: Arc<User> = deps.resolve::<User>()?;
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use crate::error::{DispatchError, DispatchResult};

type Shared = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn() -> Shared + Send + Sync>;

enum Provider {
    /// Registered without a value; must come from the overlay
    Deferred,
    /// One value shared by every connection
    Value(Shared),
    /// Invoked once per connection
    Factory(Factory),
}

struct Registration {
    name: &'static str,
    provider: Provider,
}

/// Global registry of injectable capabilities
#[derive(Default)]
pub struct Injector {
    registrations: HashMap<TypeId, Registration>,
}

impl Injector {
    /// Create an empty injector
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a capability whose value is bound per connection
    pub fn register<T: Send + Sync + 'static>(&mut self) -> &mut Self {
        self.insert::<T>(Provider::Deferred)
    }

    /// Bind a global value shared by every connection
    pub fn provide<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        self.insert::<T>(Provider::Value(Arc::new(value) as Shared))
    }

    /// Bind a factory that produces a fresh value for each connection
    pub fn provide_with<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || Arc::new(factory()) as Shared);
        self.insert::<T>(Provider::Factory(factory))
    }

    fn insert<T: 'static>(&mut self, provider: Provider) -> &mut Self {
        let registration = Registration {
            name: type_name::<T>(),
            provider,
        };
        if let Some(previous) = self.registrations.insert(TypeId::of::<T>(), registration) {
            tracing::debug!(capability = previous.name, "Replaced dependency registration");
        }
        self
    }

    /// Whether the capability has been declared
    pub fn is_registered<T: 'static>(&self) -> bool {
        self.registrations.contains_key(&TypeId::of::<T>())
    }

    /// Names of all declared capabilities (sorted)
    pub fn capabilities(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.registrations.values().map(|r| r.name).collect();
        names.sort_unstable();
        names
    }

    /// Build the dependency snapshot for one connection
    pub fn instantiate(&self, overlay: Overlay) -> Dependencies {
        let mut values: HashMap<TypeId, Shared> = HashMap::with_capacity(self.registrations.len());

        for (type_id, registration) in &self.registrations {
            match &registration.provider {
                Provider::Deferred => {}
                Provider::Value(value) => {
                    values.insert(*type_id, Arc::clone(value));
                }
                Provider::Factory(factory) => {
                    values.insert(*type_id, factory());
                }
            }
        }

        for (type_id, (name, value)) in overlay.values {
            if !self.registrations.contains_key(&type_id) {
                tracing::debug!(capability = name, "Binding undeclared per-connection dependency");
            }
            values.insert(type_id, value);
        }

        Dependencies {
            values: Arc::new(values),
        }
    }
}

/// Per-connection values layered over the global registrations
#[derive(Default)]
pub struct Overlay {
    values: HashMap<TypeId, (&'static str, Shared)>,
}

impl Overlay {
    /// Create an empty overlay
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value for this connection only
    pub fn bind<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.values
            .insert(TypeId::of::<T>(), (type_name::<T>(), Arc::new(value) as Shared));
        self
    }

    /// Number of bound values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is bound
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolved dependencies for one connection
#[derive(Clone, Default)]
pub struct Dependencies {
    values: Arc<HashMap<TypeId, Shared>>,
}

impl Dependencies {
    /// Look up a capability by type
    pub fn resolve<T: Send + Sync + 'static>(&self) -> DispatchResult<Arc<T>> {
        self.values
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
            .ok_or(DispatchError::UnresolvedDependency(type_name::<T>()))
    }
}

/// Something a handler can ask to have resolved before it runs
pub trait Resolve: Sized {
    fn resolve(deps: &Dependencies) -> DispatchResult<Self>;
}

impl Resolve for () {
    fn resolve(_deps: &Dependencies) -> DispatchResult<Self> {
        Ok(())
    }
}

/// A single injected capability
#[derive(Debug)]
pub struct Dep<T>(pub Arc<T>);

impl<T> Deref for Dep<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> Clone for Dep<T> {
    fn clone(&self) -> Self {
        Dep(Arc::clone(&self.0))
    }
}

impl<T: Send + Sync + 'static> Resolve for Dep<T> {
    fn resolve(deps: &Dependencies) -> DispatchResult<Self> {
        deps.resolve::<T>().map(Dep)
    }
}

impl<T: Send + Sync + 'static> Resolve for Option<Dep<T>> {
    fn resolve(deps: &Dependencies) -> DispatchResult<Self> {
        Ok(deps.resolve::<T>().ok().map(Dep))
    }
}

macro_rules! impl_resolve_tuple {
    ($($T:ident),+) => {
        impl<$($T: Resolve,)+> Resolve for ($($T,)+) {
            #[allow(non_snake_case)]
            fn resolve(deps: &Dependencies) -> DispatchResult<Self> {
                $(
                    let $T = $T::resolve(deps)?;
                )+
                Ok(($($T,)+))
            }
        }
    };
}

impl_resolve_tuple!(T1);
impl_resolve_tuple!(T1, T2);
impl_resolve_tuple!(T1, T2, T3);
impl_resolve_tuple!(T1, T2, T3, T4);
