//! The contracts between the activation layer, the kernel it resolves
//! instances from and the job runtime that drives it.

use crate::activator::JobActivatorContext;
use crate::error::ActivationError;
use std::error::Error as StdError;

///////////////////////////////////////////////////////////////////////////////
// Kernel Side
///////////////////////////////////////////////////////////////////////////////

/// The kernel's own notion of the resources that are active during a scope.
pub trait IContainerScope {
    type Error: StdError + 'static;

    /// Ends the scope and tears down what belongs to it.
    ///
    /// Calling this more than once must be harmless.
    fn dispose(&mut self) -> Result<(), Self::Error>;
}

/// A dependency container that the [`Activator`] can resolve instances from.
///
/// [`Activator`]: crate::Activator
pub trait IKernel {
    /// Identifies what to resolve.
    type Key: ?Sized;

    /// A resolved instance. Clones must refer to the same instance.
    type Instance: Clone;

    /// The handle returned by [`begin_scope`](IKernel::begin_scope).
    type Scope: IContainerScope<Error = Self::Error>;

    type Error: StdError + 'static;

    /// Produces an instance for `key`.
    fn resolve(&self, key: &Self::Key) -> Result<Self::Instance, Self::Error>;

    /// Produces an instance for `key`, resolving scoped components from
    /// `scope` only.
    ///
    /// The default ignores `scope` and calls [`resolve`](IKernel::resolve);
    /// kernels with scoped lifestyles should override it.
    fn resolve_in(&self, scope: &Self::Scope, key: &Self::Key) -> Result<Self::Instance, Self::Error> {
        let _ = scope;
        self.resolve(key)
    }

    /// Runs the destruction hooks of `instance`.
    ///
    /// Must accept instances that are unknown or already released.
    fn release(&self, instance: &Self::Instance) -> Result<(), Self::Error>;

    /// Opens a new scope. Never returns a handle that was returned before.
    fn begin_scope(&self) -> Self::Scope;
}

///////////////////////////////////////////////////////////////////////////////
// Job Runtime Side
///////////////////////////////////////////////////////////////////////////////

/// Creates job instances for a job runtime.
pub trait JobActivator {
    type Key: ?Sized;
    type Instance;
    type Error: StdError + 'static;

    /// The scope type, borrowing the activator.
    type Scope<'a>: JobActivatorScope<Key = Self::Key, Instance = Self::Instance, Error = Self::Error>
    where
        Self: 'a;

    /// Activates a job without a scope.
    fn activate_job(&self, key: &Self::Key) -> Result<Self::Instance, ActivationError<Self::Error>>;

    /// Opens the scope for a single job execution.
    fn begin_scope<'a>(&'a self, context: &JobActivatorContext) -> Self::Scope<'a>;
}

/// The resolution window of a single job execution.
pub trait JobActivatorScope {
    type Key: ?Sized;
    type Instance;
    type Error: StdError + 'static;

    /// Resolves an instance that is released when the scope is disposed.
    fn resolve(&mut self, key: &Self::Key) -> Result<Self::Instance, ActivationError<Self::Error>>;

    /// Releases everything resolved through the scope.
    fn dispose_scope(&mut self) -> Result<(), ActivationError<Self::Error>>;
}
