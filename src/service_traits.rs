//! Traits and settings for components.

use crate::error::BoxError;
use std::fmt;

/// How long an instance of a component lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifestyle {
    /// A new instance every time the component is resolved. The instance is
    /// torn down when it is released.
    Transient,
    /// One instance per open scope, torn down when the scope is disposed.
    Scoped,
    /// One instance per kernel, torn down when the last handle to the kernel
    /// is dropped.
    Singleton,
}

impl fmt::Display for Lifestyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifestyle::Transient => f.write_str("transient"),
            Lifestyle::Scoped => f.write_str("scoped"),
            Lifestyle::Singleton => f.write_str("singleton"),
        }
    }
}

/// A component that holds resources which must be released explicitly.
///
/// Implementing this trait is not enough: the component must also be
/// registered with [`KernelBuilder::disposable`], so the kernel knows about
/// the capability before it constructs the first instance.
///
/// [`KernelBuilder::disposable`]: crate::KernelBuilder::disposable
pub trait IDisposable: Send + Sync + 'static {
    /// Releases the resources of the instance.
    ///
    /// Called at most once per instance.
    fn dispose(&self) -> Result<(), BoxError>;
}
