//! Handler instance resolution.
//!
//! `Components` is the composition root: the application registers handler
//! instances, or factories that build them from other components, once at
//! startup. Pump construction then resolves each handler type exactly once.
//! A `Components` value is owned by whoever builds the pumps; there is no
//! process-wide container.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use super::error::ResolutionError;

type Component = Arc<dyn Any + Send + Sync>;
type Factory = Box<dyn Fn(&Components) -> Result<Component, ResolutionError> + Send + Sync>;

/// Produces shared component instances by type.
pub trait Resolver: Send + Sync {
    /// Resolve the component registered for `type_id`.
    fn resolve_any(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Result<Component, ResolutionError>;
}

impl dyn Resolver + '_ {
    /// Resolve a component of type `T`.
    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<Arc<T>, ResolutionError> {
        downcast(self.resolve_any(TypeId::of::<T>(), type_name::<T>())?)
    }
}

/// Explicit composition root.
///
/// Registration consumes and returns `self` (builder pattern), so the set of
/// registrations is fixed before the first `resolve`. Factory results are
/// cached: every type resolves to the same instance for the lifetime of the
/// `Components` value.
///
/// ## Example
///
/// ```
/// use competing_pumps::Components;
///
/// struct Mailer { from: String }
/// struct SendReceipt { mailer: std::sync::Arc<Mailer> }
///
/// let components = Components::new()
///     .with_instance(Mailer { from: "shop@example.com".into() })
///     .with_factory(|c: &Components| Ok(SendReceipt { mailer: c.resolve::<Mailer>()? }));
///
/// let handler = components.resolve::<SendReceipt>().unwrap();
/// assert_eq!(handler.mailer.from, "shop@example.com");
/// ```
#[derive(Default)]
pub struct Components {
    instances: RwLock<HashMap<TypeId, Component>>,
    factories: HashMap<TypeId, Factory>,
    /// Types currently being built by a factory, per thread.
    resolving: Mutex<Vec<(ThreadId, TypeId, &'static str)>>,
}

impl Components {
    /// Create an empty composition root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ready-made instance.
    pub fn with_instance<T: Any + Send + Sync>(self, instance: T) -> Self {
        self.with_shared(Arc::new(instance))
    }

    /// Register an instance that is already shared elsewhere.
    pub fn with_shared<T: Any + Send + Sync>(mut self, instance: Arc<T>) -> Self {
        self.factories.remove(&TypeId::of::<T>());
        self.instances
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<T>(), instance);
        self
    }

    /// Register a factory building `T`, possibly from other components.
    ///
    /// The factory runs at most once, on the first `resolve::<T>()`.
    pub fn with_factory<T, F>(mut self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Components) -> Result<T, ResolutionError> + Send + Sync + 'static,
    {
        self.instances
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&TypeId::of::<T>());
        self.factories.insert(
            TypeId::of::<T>(),
            Box::new(move |components| factory(components).map(|t| Arc::new(t) as Component)),
        );
        self
    }

    /// Whether anything is registered for `T`.
    pub fn is_registered<T: Any>(&self) -> bool {
        let type_id = TypeId::of::<T>();
        self.factories.contains_key(&type_id)
            || self
                .instances
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(&type_id)
    }

    /// Resolve the shared instance of `T`.
    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<Arc<T>, ResolutionError> {
        downcast(self.resolve_any(TypeId::of::<T>(), type_name::<T>())?)
    }

    fn cached(&self, type_id: &TypeId) -> Option<Component> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_id)
            .cloned()
    }

    fn enter(&self, type_id: TypeId, type_name: &'static str) -> Result<(), ResolutionError> {
        let current = thread::current().id();
        let mut resolving = self.resolving.lock().unwrap_or_else(PoisonError::into_inner);

        if resolving
            .iter()
            .any(|(thread, id, _)| *thread == current && *id == type_id)
        {
            let mut path: Vec<&'static str> = resolving
                .iter()
                .filter(|(thread, _, _)| *thread == current)
                .map(|(_, _, name)| *name)
                .collect();
            path.push(type_name);
            return Err(ResolutionError::Cycle { type_name, path });
        }

        resolving.push((current, type_id, type_name));
        Ok(())
    }

    fn leave(&self, type_id: TypeId) {
        let current = thread::current().id();
        let mut resolving = self.resolving.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = resolving
            .iter()
            .rposition(|(thread, id, _)| *thread == current && *id == type_id)
        {
            resolving.remove(pos);
        }
    }
}

impl Resolver for Components {
    fn resolve_any(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Result<Component, ResolutionError> {
        if let Some(instance) = self.cached(&type_id) {
            return Ok(instance);
        }

        let factory = self
            .factories
            .get(&type_id)
            .ok_or(ResolutionError::NotRegistered { type_name })?;

        self.enter(type_id, type_name)?;
        let built = {
            let _resolving = Resolving {
                components: self,
                type_id,
            };
            factory(self)
        };

        let instance = built?;
        Ok(self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(type_id)
            .or_insert(instance)
            .clone())
    }
}

/// Pops the resolving entry when the factory returns or unwinds.
struct Resolving<'a> {
    components: &'a Components,
    type_id: TypeId,
}

impl Drop for Resolving<'_> {
    fn drop(&mut self) {
        self.components.leave(self.type_id);
    }
}

fn downcast<T: Any + Send + Sync>(component: Component) -> Result<Arc<T>, ResolutionError> {
    component
        .downcast::<T>()
        .map_err(|_| ResolutionError::TypeMismatch {
            type_name: type_name::<T>(),
        })
}
