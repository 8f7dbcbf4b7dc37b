//! Keys and handles to resolved components.

use crate::service_traits::Lifestyle;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

///////////////////////////////////////////////////////////////////////////////
// Service Key
///////////////////////////////////////////////////////////////////////////////

/// Identifies a component in the kernel.
///
/// Two keys are equal when they were created for the same type. The type name
/// is only kept for diagnostics.
#[derive(Clone, Copy)]
pub struct ServiceKey {
    id: TypeId,
    name: &'static str,
}

impl ServiceKey {
    /// Returns the key of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The `TypeId` of the component.
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// The type name of the component.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceKey").field(&self.name).finish()
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

///////////////////////////////////////////////////////////////////////////////
// Instance
///////////////////////////////////////////////////////////////////////////////

/// Unique number of a constructed instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        InstanceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// A handle to an instance that was produced by the kernel.
///
/// Cloning the handle only clones the pointer; every clone refers to the same
/// instance and carries the same [`InstanceId`]. The kernel uses the id to
/// find out what to tear down when the instance is released.
#[derive(Clone)]
pub struct Instance {
    id: InstanceId,
    key: ServiceKey,
    lifestyle: Lifestyle,
    value: Arc<dyn Any + Send + Sync>,
}

impl Instance {
    pub(crate) fn new(key: ServiceKey, lifestyle: Lifestyle, value: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            id: InstanceId::next(),
            key,
            lifestyle,
            value,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn key(&self) -> ServiceKey {
        self.key
    }

    pub fn lifestyle(&self) -> Lifestyle {
        self.lifestyle
    }

    /// Returns a typed pointer to the instance.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    /// Returns a typed reference to the instance.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Returns true if both handles point to the same instance.
    ///
    /// Only compares the pointers, not the contents of the instances.
    pub fn is(&self, other: &Self) -> bool {
        Arc::as_ptr(&self.value) as *const () == Arc::as_ptr(&other.value) as *const ()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id.0)
            .field("service", &self.key.name)
            .field("lifestyle", &self.lifestyle)
            .finish()
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    struct Job(u32);

    #[test]
    fn keys_compare_by_type() {
        assert_eq!(ServiceKey::of::<Job>(), ServiceKey::of::<Job>());
        assert_ne!(ServiceKey::of::<Job>(), ServiceKey::of::<u32>());
        assert!(ServiceKey::of::<Job>().name().ends_with("Job"));
    }

    #[test]
    fn downcast() {
        let instance = Instance::new(ServiceKey::of::<Job>(), Lifestyle::Transient, Arc::new(Job(7)));

        assert_eq!(instance.downcast::<Job>().unwrap().0, 7);
        assert_eq!(instance.downcast_ref::<Job>().unwrap().0, 7);
        assert!(instance.downcast::<u32>().is_none());
    }

    #[test]
    fn clones_are_the_same_instance() {
        let a = Instance::new(ServiceKey::of::<Job>(), Lifestyle::Transient, Arc::new(Job(1)));
        let b = a.clone();
        let c = Instance::new(ServiceKey::of::<Job>(), Lifestyle::Transient, Arc::new(Job(1)));

        assert!(a.is(&b));
        assert_eq!(a.id(), b.id());
        assert!(!a.is(&c));
        assert_ne!(a.id(), c.id());
    }
}
