//! Capability registry with explicit lifetimes.
//!
//! An explicit struct owning the registrations replaces any ambient
//! framework container: capabilities are keyed by type identity, carry a
//! `Singleton` or `Transient` lifetime, and singletons are constructed
//! lazily exactly once even under concurrent first resolution.
//!
//! # Thread Safety
//!
//! The registration table is guarded by an `RwLock`; each singleton slot
//! is a `tokio::sync::OnceCell`, so concurrent first-time resolvers block
//! on the same cell and all observe the one constructed instance.

use crate::error::{CadenceError, Result};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::OnceCell;

/// Type-erased service instance as stored by the container.
type ErasedService = Arc<dyn Any + Send + Sync>;

/// Whether a resolved instance is shared process-wide or freshly
/// constructed per resolution call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// One instance for the process lifetime, constructed on first resolve.
    Singleton,
    /// A new instance for every resolve call, owned by the caller.
    Transient,
}

/// Factory for a registered capability.
pub trait ServiceFactory: Send + Sync {
    /// Construct the service instance.
    fn create(&self, container: &ServiceContainer) -> Result<ErasedService>;

    /// Capability name, for error reporting.
    fn capability_name(&self) -> &'static str;
}

/// Factory backed by a plain function or closure.
pub struct FnServiceFactory<F, T> {
    factory_fn: F,
    name: &'static str,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<F, T> FnServiceFactory<F, T> {
    pub fn new(factory_fn: F, name: &'static str) -> Self {
        Self {
            factory_fn,
            name,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<F, T> ServiceFactory for FnServiceFactory<F, T>
where
    F: Fn(&ServiceContainer) -> std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>
        + Send
        + Sync,
    T: Send + Sync + 'static,
{
    fn create(&self, container: &ServiceContainer) -> Result<ErasedService> {
        let service =
            (self.factory_fn)(container).map_err(|e| CadenceError::ConstructionFailed {
                capability: self.name,
                message: e.to_string(),
            })?;
        Ok(Arc::new(service))
    }

    fn capability_name(&self) -> &'static str {
        self.name
    }
}

struct Registration {
    factory: Arc<dyn ServiceFactory>,
    lifetime: Lifetime,
    /// Singleton slot; unused for transient registrations.
    cell: Arc<OnceCell<ErasedService>>,
}

/// Registry of capabilities, their factories, and their lifetimes.
#[derive(Default)]
pub struct ServiceContainer {
    entries: RwLock<HashMap<TypeId, Registration>>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under its type identity.
    ///
    /// Fails with `DuplicateRegistration` if the capability is already
    /// registered; re-registration is never silent.
    pub fn register<T, F>(&self, lifetime: Lifetime, factory: F) -> Result<()>
    where
        F: Fn(&ServiceContainer) -> std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>
            + Send
            + Sync
            + 'static,
        T: Send + Sync + 'static,
    {
        let factory = Arc::new(FnServiceFactory::<F, T>::new(
            factory,
            std::any::type_name::<T>(),
        ));
        self.register_erased(TypeId::of::<T>(), lifetime, factory)
    }

    /// Register a capability under an explicit erased key.
    ///
    /// The typed [`register`](Self::register) path keeps key and factory in
    /// agreement; this one does not, and a resolver asking for a shape the
    /// factory does not produce gets `CapabilityMismatch`.
    pub fn register_erased(
        &self,
        key: TypeId,
        lifetime: Lifetime,
        factory: Arc<dyn ServiceFactory>,
    ) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| {
            CadenceError::Other("capability table lock poisoned".to_string())
        })?;

        if entries.contains_key(&key) {
            return Err(CadenceError::DuplicateRegistration {
                capability: factory.capability_name(),
            });
        }

        entries.insert(
            key,
            Registration {
                factory,
                lifetime,
                cell: Arc::new(OnceCell::new()),
            },
        );

        Ok(())
    }

    /// Resolve a capability by its type identity.
    ///
    /// `Singleton` registrations return the one shared instance, running the
    /// factory at most once per process; a concurrent first resolver waits
    /// for the in-flight construction rather than running the factory again.
    /// `Transient` registrations run the factory on every call.
    pub async fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let (factory, lifetime, cell) = {
            let entries = self.entries.read().map_err(|_| {
                CadenceError::Other("capability table lock poisoned".to_string())
            })?;
            let registration = entries.get(&TypeId::of::<T>()).ok_or_else(|| {
                CadenceError::UnregisteredCapability {
                    capability: std::any::type_name::<T>().to_string(),
                }
            })?;
            (
                registration.factory.clone(),
                registration.lifetime,
                registration.cell.clone(),
            )
        };

        let erased = match lifetime {
            Lifetime::Transient => factory.create(self)?,
            Lifetime::Singleton => cell
                .get_or_try_init(|| async { factory.create(self) })
                .await?
                .clone(),
        };

        erased
            .downcast::<T>()
            .map_err(|_| CadenceError::CapabilityMismatch {
                expected: std::any::type_name::<T>(),
            })
    }

    /// Check if a capability is registered.
    pub fn is_registered<T: 'static>(&self) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(&TypeId::of::<T>()))
            .unwrap_or(false)
    }
}
