//! The kernel: a small dependency container with scoped lifestyles and
//! release tracking.

use crate::builder::KernelBuilder;
use crate::error::KernelError;
use crate::instance::{Instance, InstanceId, ServiceKey};
use crate::internal_helpers::{Burden, ComponentModel, InstanceCache, Owner, ScopeId};
use crate::kernel_traits::{IContainerScope, IKernel};
use crate::resolver::{Resolver, ScopeChoice};
use fnv::FnvHashMap;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

///////////////////////////////////////////////////////////////////////////////
// Ambient Scopes
///////////////////////////////////////////////////////////////////////////////

thread_local! {
    /// Open scopes of this thread, innermost last, tagged with their kernel.
    static AMBIENT_SCOPES: RefCell<Vec<(u64, ScopeId)>> = RefCell::new(Vec::new());
}

fn enter_scope(kernel: u64, scope: ScopeId) {
    AMBIENT_SCOPES.with(|scopes| scopes.borrow_mut().push((kernel, scope)));
}

fn leave_scope(kernel: u64, scope: ScopeId) {
    // The thread may already be tearing down its locals.
    let _ = AMBIENT_SCOPES.try_with(|scopes| {
        scopes.borrow_mut().retain(|entry| *entry != (kernel, scope));
    });
}

fn innermost_scope(kernel: u64) -> Option<ScopeId> {
    AMBIENT_SCOPES
        .try_with(|scopes| {
            scopes
                .borrow()
                .iter()
                .rev()
                .find(|(owner, _)| *owner == kernel)
                .map(|(_, scope)| *scope)
        })
        .ok()
        .flatten()
}

///////////////////////////////////////////////////////////////////////////////
// Kernel
///////////////////////////////////////////////////////////////////////////////

/// State shared by every handle to a kernel and by its scopes.
#[derive(Debug)]
pub(crate) struct KernelInner {
    id: u64,
    components: FnvHashMap<TypeId, ComponentModel>,
    /// Instances supplied by the user. Never torn down by the kernel.
    supplied: FnvHashMap<TypeId, Instance>,
    singletons: Mutex<InstanceCache>,
    scopes: Mutex<FnvHashMap<ScopeId, InstanceCache>>,
    /// The release policy: every instance that must be torn down.
    burdens: Mutex<FnvHashMap<InstanceId, Burden>>,
    next_scope: AtomicU64,
}

impl KernelInner {
    pub(crate) fn component(&self, key: &ServiceKey) -> Option<&ComponentModel> {
        self.components.get(&key.type_id())
    }

    pub(crate) fn supplied_instance(&self, key: &ServiceKey) -> Option<Instance> {
        self.supplied.get(&key.type_id()).cloned()
    }

    pub(crate) fn current_scope(&self) -> Option<ScopeId> {
        innermost_scope(self.id)
    }

    /// Returns true if `scope` was opened and not yet disposed.
    pub(crate) fn is_open(&self, scope: ScopeId) -> bool {
        self.scopes.lock().contains_key(&scope)
    }

    pub(crate) fn cached_singleton(&self, key: &ServiceKey) -> Option<Instance> {
        self.singletons.lock().get(key)
    }

    pub(crate) fn store_singleton(&self, instance: Instance) -> Instance {
        let (cached, stored) = self.singletons.lock().insert(instance.clone());
        if !stored {
            self.discard(&instance);
        }
        cached
    }

    pub(crate) fn cached_scoped(&self, scope: ScopeId, key: &ServiceKey) -> Option<Instance> {
        self.scopes.lock().get(&scope).and_then(|cache| cache.get(key))
    }

    pub(crate) fn store_scoped(&self, scope: ScopeId, instance: Instance) -> Instance {
        let inserted = self
            .scopes
            .lock()
            .get_mut(&scope)
            .map(|cache| cache.insert(instance.clone()));

        match inserted {
            Some((cached, true)) => cached,
            Some((cached, false)) => {
                self.discard(&instance);
                cached
            }
            None => {
                // The scope was disposed by the factory itself; nothing
                // will own the instance, so it goes back to the caller.
                if let Some(burden) = self.burdens.lock().get_mut(&instance.id()) {
                    burden.owner = Owner::Caller;
                }
                instance
            }
        }
    }

    pub(crate) fn track(&self, burden: Burden) {
        trace!("Tracking {:?}", burden.instance);
        self.burdens.lock().insert(burden.instance.id(), burden);
    }

    pub(crate) fn has_track(&self, instance: &Instance) -> bool {
        self.burdens.lock().contains_key(&instance.id())
    }

    /// Releases an instance that was handed out to a caller.
    ///
    /// Instances that are not tracked, or that belong to a scope or to the
    /// kernel, are left alone.
    pub(crate) fn release(&self, instance: &Instance) -> Result<(), KernelError> {
        let burden = {
            let mut burdens = self.burdens.lock();
            match burdens.get(&instance.id()).map(|burden| burden.owner) {
                Some(Owner::Caller) => burdens.remove(&instance.id()),
                Some(_) => None,
                None => {
                    trace!("{:?} is not tracked, nothing to release", instance);
                    None
                }
            }
        };

        match burden {
            Some(burden) => self.teardown(burden),
            None => Ok(()),
        }
    }

    /// Tears down an instance regardless of its owner.
    fn destroy(&self, instance: &Instance) -> Result<(), KernelError> {
        let burden = self.burdens.lock().remove(&instance.id());
        match burden {
            Some(burden) => self.teardown(burden),
            None => Ok(()),
        }
    }

    /// Tears down an instance that lost a race to be cached.
    fn discard(&self, instance: &Instance) {
        if let Err(err) = self.destroy(instance) {
            warn!("Discarding {:?} failed: {}", instance, err);
        }
    }

    /// Decommissions the instance, then releases its dependencies.
    fn teardown(&self, burden: Burden) -> Result<(), KernelError> {
        debug!("Tearing down {:?}", burden.instance);
        let mut errors = Vec::new();

        if let Some(model) = self.component(&burden.instance.key()) {
            if let Err(err) = model.decommission(&burden.instance) {
                errors.push(err);
            }
        }

        for dependency in &burden.dependencies {
            if let Err(err) = self.release(dependency) {
                errors.push(err);
            }
        }

        KernelError::collect(errors)
    }
}

impl Drop for KernelInner {
    fn drop(&mut self) {
        let created = std::mem::take(&mut self.singletons.get_mut().created);
        for singleton in created.iter().rev() {
            if let Err(err) = self.destroy(singleton) {
                warn!("Tearing down singleton {:?} failed: {}", singleton, err);
            }
        }
    }
}

/// A dependency container.
///
/// Handles are cheap to clone and all refer to the same kernel. Singletons
/// are torn down when the last handle, and the last scope, is dropped.
///
/// Scoped components are resolved from the innermost scope that is open on
/// the calling thread.
#[derive(Clone, Debug)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::new()
    }
}

impl Kernel {
    /// Creates a kernel without any components.
    pub fn new() -> Self {
        KernelBuilder::new().build()
    }

    /// Creates a kernel that is already built by the KernelBuilder.
    pub(crate) fn new_built(
        components: FnvHashMap<TypeId, ComponentModel>,
        supplied: FnvHashMap<TypeId, Instance>,
    ) -> Self {
        static NEXT_KERNEL: AtomicU64 = AtomicU64::new(1);

        Self {
            inner: Arc::new(KernelInner {
                id: NEXT_KERNEL.fetch_add(1, Ordering::Relaxed),
                components,
                supplied,
                singletons: Mutex::new(InstanceCache::default()),
                scopes: Mutex::new(FnvHashMap::default()),
                burdens: Mutex::new(FnvHashMap::default()),
                next_scope: AtomicU64::new(1),
            }),
        }
    }

    /// Creates a KernelBuilder.
    pub fn builder() -> KernelBuilder {
        KernelBuilder::new()
    }

    /// Resolves a component by type.
    ///
    /// Scoped components come from the innermost scope that is open on the
    /// calling thread.
    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<Arc<T>, KernelError> {
        Resolver::new(&self.inner, ScopeChoice::Ambient).resolve::<T>()
    }

    /// Resolves a component by key.
    pub fn resolve_key(&self, key: &ServiceKey) -> Result<Instance, KernelError> {
        Resolver::new(&self.inner, ScopeChoice::Ambient).resolve_key(key)
    }

    /// Resolves a component by key, taking scoped components from `scope`.
    ///
    /// Fails with [`KernelError::NoActiveScope`] for scoped components if
    /// `scope` is disposed or belongs to another kernel.
    pub fn resolve_in(&self, scope: &ScopeHandle, key: &ServiceKey) -> Result<Instance, KernelError> {
        let choice = if Arc::ptr_eq(&scope.kernel, &self.inner) {
            ScopeChoice::Fixed(scope.id)
        } else {
            ScopeChoice::Detached
        };
        Resolver::new(&self.inner, choice).resolve_key(key)
    }

    /// Tears down a transient instance and its transient dependencies.
    ///
    /// Scoped instances are torn down when their scope is disposed and
    /// singletons when the kernel is dropped, so releasing them, or any
    /// instance the kernel doesn't track, does nothing.
    pub fn release(&self, instance: &Instance) -> Result<(), KernelError> {
        self.inner.release(instance)
    }

    /// Opens a scope and makes it the current scope of this thread.
    pub fn begin_scope(&self) -> ScopeHandle {
        let id = ScopeId(self.inner.next_scope.fetch_add(1, Ordering::Relaxed));
        self.inner.scopes.lock().insert(id, InstanceCache::default());
        enter_scope(self.inner.id, id);
        debug!("Began scope {}", id.0);

        ScopeHandle {
            kernel: Arc::clone(&self.inner),
            id,
            disposed: false,
            _not_send: PhantomData,
        }
    }

    /// Returns true if the kernel will tear down `instance` later on.
    pub fn has_track(&self, instance: &Instance) -> bool {
        self.inner.has_track(instance)
    }

    /// Returns true if `T` can be resolved.
    pub fn is_registered<T: ?Sized + 'static>(&self) -> bool {
        let key = ServiceKey::of::<T>();
        self.inner.supplied.contains_key(&key.type_id())
            || self
                .inner
                .component(&key)
                .map_or(false, |model| model.factory.is_some())
    }

    /// Returns the number of registered components.
    pub fn num_components(&self) -> usize {
        self.inner.components.len()
    }

    /// Returns the number of instances that are waiting to be torn down.
    pub fn num_tracked(&self) -> usize {
        self.inner.burdens.lock().len()
    }

    /// Returns the inner state for testing purposes.
    #[cfg(test)]
    #[allow(unused)]
    pub(crate) fn inner(&self) -> &KernelInner {
        &self.inner
    }
}

impl IKernel for Kernel {
    type Key = ServiceKey;
    type Instance = Instance;
    type Scope = ScopeHandle;
    type Error = KernelError;

    fn resolve(&self, key: &ServiceKey) -> Result<Instance, KernelError> {
        self.resolve_key(key)
    }

    fn resolve_in(&self, scope: &ScopeHandle, key: &ServiceKey) -> Result<Instance, KernelError> {
        Kernel::resolve_in(self, scope, key)
    }

    fn release(&self, instance: &Instance) -> Result<(), KernelError> {
        Kernel::release(self, instance)
    }

    fn begin_scope(&self) -> ScopeHandle {
        Kernel::begin_scope(self)
    }
}

///////////////////////////////////////////////////////////////////////////////
// Scope Handle
///////////////////////////////////////////////////////////////////////////////

/// A scope opened with [`Kernel::begin_scope`].
///
/// Disposing the handle tears down every scoped instance that was created in
/// the scope, newest first. Dropping an undisposed handle disposes it.
///
/// The handle must stay on the thread that opened it.
#[derive(Debug)]
pub struct ScopeHandle {
    kernel: Arc<KernelInner>,
    id: ScopeId,
    disposed: bool,
    _not_send: PhantomData<*const ()>,
}

impl ScopeHandle {
    pub fn id(&self) -> u64 {
        self.id.0
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Returns the number of scoped instances cached in this scope.
    pub fn num_instances(&self) -> usize {
        self.kernel
            .scopes
            .lock()
            .get(&self.id)
            .map_or(0, |cache| cache.created.len())
    }
}

impl IContainerScope for ScopeHandle {
    type Error = KernelError;

    fn dispose(&mut self) -> Result<(), KernelError> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        leave_scope(self.kernel.id, self.id);

        let cache = match self.kernel.scopes.lock().remove(&self.id) {
            Some(cache) => cache,
            None => return Ok(()),
        };
        debug!("Disposing scope {} with {} instance(s)", self.id.0, cache.created.len());

        let errors = cache
            .created
            .iter()
            .rev()
            .filter_map(|instance| self.kernel.destroy(instance).err())
            .collect();
        KernelError::collect(errors)
    }
}

impl Drop for ScopeHandle {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!("Disposing scope {} on drop failed: {}", self.id.0, err);
        }
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////
