//! Create a kernel with the builder pattern.

use crate::container::Kernel;
use crate::error::BoxError;
use crate::instance::{Instance, ServiceKey};
use crate::internal_helpers::{AnyArc, ComponentModel};
use crate::resolver::Resolver;
use crate::service_traits::{IDisposable, Lifestyle};
use fnv::FnvHashMap;
use std::any::TypeId;
use std::sync::Arc;

/// Create a kernel with the builder pattern.
///
/// Everything about a component, including what happens when an instance of
/// it is torn down, is decided here. The kernel cannot be changed after it is
/// built.
pub struct KernelBuilder {
    /// The components in the kernel.
    components: FnvHashMap<TypeId, ComponentModel>,
}

impl Default for KernelBuilder {
    fn default() -> Self {
        KernelBuilder::new()
    }
}

impl KernelBuilder {
    /// Creates a new KernelBuilder.
    pub fn new() -> Self {
        Self {
            components: FnvHashMap::default(),
        }
    }

    /// Creates a new KernelBuilder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        KernelBuilder {
            components: FnvHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Returns the inner hashmap for testing purposes.
    #[cfg(test)]
    #[allow(unused)]
    fn inner(&self) -> &FnvHashMap<TypeId, ComponentModel> {
        &self.components
    }

    /// Returns the entry of a component.
    fn entry<T: 'static>(&mut self) -> &mut ComponentModel {
        let key = ServiceKey::of::<T>();
        self.components
            .entry(key.type_id())
            .or_insert_with(|| ComponentModel::new(key))
    }

    /// Registers a component with a custom constructor.
    ///
    /// Registering the same type again replaces the constructor and the
    /// lifestyle, but keeps the destruction hooks.
    pub fn register<T, F>(mut self, lifestyle: Lifestyle, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&mut Resolver<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let entry = self.entry::<T>();
        entry.lifestyle = lifestyle;
        entry.factory = Some(Box::new(move |resolver: &mut Resolver<'_>| {
            factory(resolver).map(|value| Arc::new(value) as AnyArc)
        }));
        self
    }

    /// Registers a component with a transient lifestyle.
    pub fn transient<T, F>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&mut Resolver<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.register(Lifestyle::Transient, factory)
    }

    /// Registers a component with a scoped lifestyle.
    pub fn scoped<T, F>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&mut Resolver<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.register(Lifestyle::Scoped, factory)
    }

    /// Registers a component with a singleton lifestyle.
    pub fn singleton<T, F>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&mut Resolver<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.register(Lifestyle::Singleton, factory)
    }

    /// Inserts an existing instance as a singleton.
    ///
    /// The kernel hands it out but never tears it down.
    pub fn with_instance<T: Send + Sync + 'static>(mut self, instance: Arc<T>) -> Self {
        let entry = self.entry::<T>();
        entry.lifestyle = Lifestyle::Singleton;
        entry.instance = Some(instance);
        self
    }

    /// Adds a hook that runs when an instance of `T` is torn down.
    pub fn on_destroy<T, F>(mut self, hook: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.entry::<T>().concerns.push(Box::new(move |instance: &Instance| {
            if let Some(value) = instance.downcast_ref::<T>() {
                hook(value);
            }
            Ok(())
        }));
        self
    }

    /// Declares that instances of `T` must be disposed when they are torn
    /// down.
    pub fn disposable<T: IDisposable>(mut self) -> Self {
        self.entry::<T>().concerns.push(Box::new(|instance: &Instance| {
            match instance.downcast_ref::<T>() {
                Some(value) => value.dispose(),
                None => Ok(()),
            }
        }));
        self
    }

    /// Builds the kernel.
    pub fn build(mut self) -> Kernel {
        let mut supplied = FnvHashMap::default();
        for (type_id, model) in self.components.iter_mut() {
            if let Some(value) = model.instance.take() {
                supplied.insert(*type_id, Instance::new(model.key, Lifestyle::Singleton, value));
            }
        }
        Kernel::new_built(self.components, supplied)
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////
