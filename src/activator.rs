//! Activation of jobs through a kernel.

use crate::error::ActivationError;
use crate::kernel_traits::{IKernel, JobActivator};
use crate::scope::ActivationScope;
use log::{debug, trace, warn};
use std::fmt;

///////////////////////////////////////////////////////////////////////////////
// Context
///////////////////////////////////////////////////////////////////////////////

/// Information about the job execution a scope is opened for.
///
/// The activator does not act on it, every scope is opened the same way.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobActivatorContext {
    job_id: Option<String>,
}

impl JobActivatorContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the context of a job execution.
    pub fn for_job<S: Into<String>>(job_id: S) -> Self {
        Self {
            job_id: Some(job_id.into()),
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }
}

///////////////////////////////////////////////////////////////////////////////
// Activator
///////////////////////////////////////////////////////////////////////////////

/// Creates job instances, and the scopes they live in, from a kernel.
///
/// The activator only borrows the kernel; create one when the runtime starts
/// and share it with every worker.
pub struct Activator<'k, K: IKernel> {
    kernel: &'k K,
}

impl<'k, K: IKernel> Clone for Activator<'k, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'k, K: IKernel> Copy for Activator<'k, K> {}

impl<'k, K: IKernel> fmt::Debug for Activator<'k, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activator").finish()
    }
}

impl<'k, K: IKernel> Activator<'k, K> {
    /// Creates an activator that resolves from `kernel`.
    pub fn new(kernel: &'k K) -> Self {
        Self { kernel }
    }

    /// Creates an activator, failing if no kernel is supplied.
    pub fn try_new(kernel: Option<&'k K>) -> Result<Self, ActivationError<K::Error>> {
        kernel
            .map(Self::new)
            .ok_or(ActivationError::InvalidArgument("kernel"))
    }

    /// The kernel the activator resolves from.
    pub fn kernel(&self) -> &'k K {
        self.kernel
    }

    /// Resolves an instance directly from the kernel.
    ///
    /// Errors of the kernel are returned as they are, there are no retries.
    pub fn activate(&self, key: &K::Key) -> Result<K::Instance, ActivationError<K::Error>> {
        trace!("Activating a job");
        self.kernel.resolve(key).map_err(ActivationError::Resolution)
    }

    /// Resolves an instance within a container scope of the kernel.
    pub fn activate_in(
        &self,
        scope: &K::Scope,
        key: &K::Key,
    ) -> Result<K::Instance, ActivationError<K::Error>> {
        trace!("Activating a job in a scope");
        self.kernel
            .resolve_in(scope, key)
            .map_err(ActivationError::Resolution)
    }

    /// Opens a fresh scope for a single job execution.
    pub fn begin_scope<'a>(&'a self, context: &JobActivatorContext) -> ActivationScope<'a, K> {
        match context.job_id() {
            Some(job_id) => debug!("Beginning activation scope for job {}", job_id),
            None => debug!("Beginning activation scope"),
        }
        ActivationScope::new(self, self.kernel.begin_scope())
    }

    /// Hands an instance back to the kernel so it can be torn down.
    pub fn release(&self, instance: &K::Instance) -> Result<(), K::Error> {
        self.kernel.release(instance)
    }

    /// Runs `job` in a fresh scope and closes the scope afterwards.
    ///
    /// The scope is closed on every exit path, also when `job` panics. If both
    /// the job and the close fail, [`ActivationError::Aborted`] carries both
    /// errors. A job may close the scope itself.
    pub fn within_scope<'a, R, F>(
        &'a self,
        context: &JobActivatorContext,
        job: F,
    ) -> Result<R, ActivationError<K::Error>>
    where
        F: FnOnce(&mut ActivationScope<'a, K>) -> Result<R, ActivationError<K::Error>>,
    {
        let mut scope = self.begin_scope(context);
        let outcome = job(&mut scope);
        let closed = if scope.is_closed() { Ok(()) } else { scope.close() };

        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) | (Err(err), Ok(())) => Err(err),
            (Err(err), Err(ActivationError::Teardown(teardown))) => {
                warn!("Closing the scope of a failed job failed as well: {}", teardown);
                Err(ActivationError::Aborted {
                    job: Box::new(err),
                    teardown,
                })
            }
            (Err(err), Err(close_err)) => {
                // `close` only fails with a teardown error on an open scope.
                warn!("Closing the scope of a failed job failed as well: {}", close_err);
                Err(err)
            }
        }
    }
}

impl<'k, K: IKernel> JobActivator for Activator<'k, K> {
    type Key = K::Key;
    type Instance = K::Instance;
    type Error = K::Error;
    type Scope<'a> = ActivationScope<'a, K> where Self: 'a;

    fn activate_job(&self, key: &K::Key) -> Result<K::Instance, ActivationError<K::Error>> {
        self.activate(key)
    }

    fn begin_scope<'a>(&'a self, context: &JobActivatorContext) -> ActivationScope<'a, K> {
        Activator::begin_scope(self, context)
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////
