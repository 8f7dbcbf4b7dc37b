//! Internal storage helpers.

use crate::error::{BoxError, KernelError};
use crate::instance::{Instance, ServiceKey};
use crate::resolver::Resolver;
use crate::service_traits::Lifestyle;
use fnv::FnvHashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A type erased pointer to an instance.
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

/// Constructs an instance of a component.
pub(crate) type Factory = Box<dyn Fn(&mut Resolver<'_>) -> Result<AnyArc, BoxError> + Send + Sync>;

/// Runs when an instance of a component is torn down.
///
/// Concerns are attached when the component is registered, so the kernel
/// never has to inspect an instance to know what to do with it.
pub(crate) type Concern = Box<dyn Fn(&Instance) -> Result<(), BoxError> + Send + Sync>;

/// Number of a scope opened by the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ScopeId(pub u64);

///////////////////////////////////////////////////////////////////////////////
// Component Model
///////////////////////////////////////////////////////////////////////////////

/// A registered component.
pub(crate) struct ComponentModel {
    pub key: ServiceKey,
    pub lifestyle: Lifestyle,
    /// Custom constructor.
    pub factory: Option<Factory>,
    /// An instance supplied by the user, moved into the kernel on build.
    pub instance: Option<AnyArc>,
    /// Decommission concerns, in registration order.
    pub concerns: Vec<Concern>,
}

impl ComponentModel {
    pub fn new(key: ServiceKey) -> Self {
        Self {
            key,
            lifestyle: Lifestyle::Transient,
            factory: None,
            instance: None,
            concerns: Vec::new(),
        }
    }

    /// Returns true if instances must be tracked until they are torn down.
    pub fn requires_decommission(&self) -> bool {
        !self.concerns.is_empty()
    }

    /// Runs every concern, even if one of them fails.
    pub fn decommission(&self, instance: &Instance) -> Result<(), KernelError> {
        let errors = self
            .concerns
            .iter()
            .filter_map(|concern| concern(instance).err())
            .map(|source| KernelError::Teardown {
                service: self.key.name(),
                source,
            })
            .collect();
        KernelError::collect(errors)
    }
}

impl fmt::Debug for ComponentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentModel")
            .field("key", &self.key)
            .field("lifestyle", &self.lifestyle)
            .field("factory", &self.factory.is_some())
            .field("instance", &self.instance.is_some())
            .field("concerns", &self.concerns.len())
            .finish()
    }
}

///////////////////////////////////////////////////////////////////////////////
// Release Policy
///////////////////////////////////////////////////////////////////////////////

/// Who decides when a tracked instance is torn down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Owner {
    /// Whoever resolved it, through `release`.
    Caller,
    /// The scope it was cached in.
    Scope(ScopeId),
    /// The kernel itself, when it is dropped.
    Kernel,
}

/// A tracked instance and the tracked transient dependencies that were
/// created for it.
#[derive(Debug)]
pub(crate) struct Burden {
    pub instance: Instance,
    pub owner: Owner,
    pub dependencies: Vec<Instance>,
}

/// Instances cached for one lifetime (a scope or the kernel itself).
#[derive(Debug, Default)]
pub(crate) struct InstanceCache {
    pub by_type: FnvHashMap<TypeId, Instance>,
    /// Instances the cache constructed, in creation order.
    pub created: Vec<Instance>,
}

impl InstanceCache {
    pub fn get(&self, key: &ServiceKey) -> Option<Instance> {
        self.by_type.get(&key.type_id()).cloned()
    }

    /// Caches `instance` unless another instance won the race.
    ///
    /// Returns the cached instance and whether it is `instance`.
    pub fn insert(&mut self, instance: Instance) -> (Instance, bool) {
        let type_id = instance.key().type_id();
        if let Some(existing) = self.by_type.get(&type_id) {
            return (existing.clone(), false);
        }
        self.by_type.insert(type_id, instance.clone());
        self.created.push(instance.clone());
        (instance, true)
    }
}
