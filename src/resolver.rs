//! Resolver for the kernel.

use crate::container::KernelInner;
use crate::error::KernelError;
use crate::instance::{Instance, ServiceKey};
use crate::internal_helpers::{Burden, ComponentModel, Owner, ScopeId};
use crate::service_traits::Lifestyle;
use log::{trace, warn};
use std::any::Any;
use std::sync::Arc;

/// Used to resolve components from the kernel.
///
/// Factories receive a resolver to get their dependencies. The resolver keeps
/// the chain of components under construction, to detect cycles, and collects
/// the transient dependencies of each component, so they are released
/// together with it.
///
/// A resolver cannot be created outside of this crate.
#[derive(Debug)]
pub struct Resolver<'k> {
    kernel: &'k KernelInner,
    scope: ScopeChoice,
    path: Vec<ServiceKey>,
    dependencies: Vec<Instance>,
}

/// Where scoped components are resolved from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScopeChoice {
    /// The innermost scope open on the calling thread.
    Ambient,
    /// The given scope, while it is open.
    Fixed(ScopeId),
    /// No scope at all.
    Detached,
}

impl<'k> Resolver<'k> {
    pub(crate) fn new(kernel: &'k KernelInner, scope: ScopeChoice) -> Self {
        Self {
            kernel,
            scope,
            path: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Returns the scope to cache a scoped component in.
    fn scope(&self) -> Option<ScopeId> {
        match self.scope {
            ScopeChoice::Ambient => self.kernel.current_scope(),
            ScopeChoice::Fixed(scope) if self.kernel.is_open(scope) => Some(scope),
            ScopeChoice::Fixed(_) | ScopeChoice::Detached => None,
        }
    }

    /// Resolves a component by type.
    pub fn resolve<T: Any + Send + Sync>(&mut self) -> Result<Arc<T>, KernelError> {
        let key = ServiceKey::of::<T>();
        self.resolve_key(&key)?
            .downcast::<T>()
            .ok_or(KernelError::TypeMismatch { service: key.name() })
    }

    /// Resolves a component by key.
    pub fn resolve_key(&mut self, key: &ServiceKey) -> Result<Instance, KernelError> {
        trace!("Resolving {}", key);
        let kernel = self.kernel;

        if let Some(instance) = kernel.supplied_instance(key) {
            return Ok(instance);
        }

        let model = kernel
            .component(key)
            .ok_or(KernelError::NotRegistered { service: key.name() })?;

        let instance = match model.lifestyle {
            Lifestyle::Singleton => match kernel.cached_singleton(key) {
                Some(instance) => instance,
                None => {
                    let instance = self.construct(model, Owner::Kernel)?;
                    kernel.store_singleton(instance)
                }
            },
            Lifestyle::Scoped => {
                let scope = self
                    .scope()
                    .ok_or(KernelError::NoActiveScope { service: key.name() })?;
                match kernel.cached_scoped(scope, key) {
                    Some(instance) => instance,
                    None => {
                        let instance = self.construct(model, Owner::Scope(scope))?;
                        kernel.store_scoped(scope, instance)
                    }
                }
            }
            Lifestyle::Transient => self.construct(model, Owner::Caller)?,
        };

        // Transient dependencies go down together with their consumer.
        if !self.path.is_empty() && instance.lifestyle() == Lifestyle::Transient {
            self.dependencies.push(instance.clone());
        }

        Ok(instance)
    }

    /// Runs the factory of a component and tracks the result if needed.
    fn construct(&mut self, model: &ComponentModel, owner: Owner) -> Result<Instance, KernelError> {
        let key = model.key;

        if self.path.contains(&key) {
            let mut path: Vec<_> = self.path.iter().map(ServiceKey::name).collect();
            path.push(key.name());
            return Err(KernelError::Circular { path });
        }

        let factory = model
            .factory
            .as_ref()
            .ok_or(KernelError::NotRegistered { service: key.name() })?;

        let outer = std::mem::take(&mut self.dependencies);
        self.path.push(key);
        let produced = factory(&mut *self);
        self.path.pop();
        let dependencies = std::mem::replace(&mut self.dependencies, outer);

        let value = match produced {
            Ok(value) => value,
            Err(source) => {
                // The consumer will never be released, so neither would these.
                for dependency in &dependencies {
                    if let Err(err) = self.kernel.release(dependency) {
                        warn!("Releasing {} after a failed construction: {}", dependency.key(), err);
                    }
                }
                return Err(KernelError::from_factory(key.name(), source));
            }
        };

        let instance = Instance::new(key, model.lifestyle, value);
        let dependencies: Vec<_> = dependencies
            .into_iter()
            .filter(|dependency| self.kernel.has_track(dependency))
            .collect();

        if model.requires_decommission() || !dependencies.is_empty() {
            self.kernel.track(Burden {
                instance: instance.clone(),
                owner,
                dependencies,
            });
        }

        Ok(instance)
    }
}
