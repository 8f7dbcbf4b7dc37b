//! The activation scope of a single job execution.

use crate::activator::Activator;
use crate::error::{ActivationError, ReleaseFailure, TeardownError};
use crate::kernel_traits::{IContainerScope, IKernel, JobActivatorScope};
use log::{debug, warn};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

///////////////////////////////////////////////////////////////////////////////
// Dispose Guard
///////////////////////////////////////////////////////////////////////////////

/// Owns a container scope and disposes it when dropped.
struct DisposeGuard<S: IContainerScope>(Option<S>);

impl<S: IContainerScope> DisposeGuard<S> {
    fn dispose(&mut self) -> Result<(), S::Error> {
        match self.0.take() {
            Some(mut scope) => scope.dispose(),
            None => Ok(()),
        }
    }
}

impl<S: IContainerScope> Drop for DisposeGuard<S> {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!("Disposing the container scope failed: {}", err);
        }
    }
}

///////////////////////////////////////////////////////////////////////////////
// Activation Scope
///////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Open,
    Closed,
}

/// Tracks everything resolved for one job execution.
///
/// Every instance returned by [`resolve`] is recorded. [`close`] releases
/// the recorded instances in the order they were resolved and then disposes
/// the container scope. A failing or panicking release never stops the
/// others, and the container scope is disposed no matter what.
///
/// A scope that is dropped while still open is closed on the spot; errors
/// are then only logged.
///
/// [`resolve`]: ActivationScope::resolve
/// [`close`]: ActivationScope::close
pub struct ActivationScope<'a, K: IKernel> {
    activator: &'a Activator<'a, K>,
    container_scope: Option<K::Scope>,
    resolved: Vec<K::Instance>,
    state: State,
}

impl<'a, K: IKernel> ActivationScope<'a, K> {
    /// Wraps a container scope that was just opened.
    pub fn new(activator: &'a Activator<'a, K>, container_scope: K::Scope) -> Self {
        Self {
            activator,
            container_scope: Some(container_scope),
            resolved: Vec::new(),
            state: State::Open,
        }
    }

    /// Creates a scope, failing if a collaborator is missing.
    ///
    /// A container scope that was supplied is disposed when the activator is
    /// missing.
    pub fn try_new(
        activator: Option<&'a Activator<'a, K>>,
        container_scope: Option<K::Scope>,
    ) -> Result<Self, ActivationError<K::Error>> {
        let mut guard = DisposeGuard(container_scope);
        let activator = activator.ok_or(ActivationError::InvalidArgument("activator"))?;
        let container_scope = guard
            .0
            .take()
            .ok_or(ActivationError::InvalidArgument("container scope"))?;
        Ok(Self::new(activator, container_scope))
    }

    /// Resolves an instance and records it for release.
    ///
    /// Scoped components come from the container scope of this activation
    /// scope, whatever other scopes are open. Nothing is recorded if the
    /// kernel fails.
    pub fn resolve(&mut self, key: &K::Key) -> Result<K::Instance, ActivationError<K::Error>> {
        let container_scope = match (&self.state, &self.container_scope) {
            (State::Open, Some(container_scope)) => container_scope,
            _ => return Err(ActivationError::InvalidState),
        };
        let instance = self.activator.activate_in(container_scope, key)?;
        self.resolved.push(instance.clone());
        Ok(instance)
    }

    /// Releases every resolved instance, then disposes the container scope.
    ///
    /// Can only be called once; later calls return
    /// [`ActivationError::InvalidState`] and release nothing.
    pub fn close(&mut self) -> Result<(), ActivationError<K::Error>> {
        if self.is_closed() {
            return Err(ActivationError::InvalidState);
        }
        self.state = State::Closed;

        // Disposed on every way out of this method, unwinding included.
        let mut guard = DisposeGuard(self.container_scope.take());
        let resolved = std::mem::take(&mut self.resolved);
        debug!("Closing activation scope with {} instance(s)", resolved.len());

        let activator = self.activator;
        let mut releases = Vec::new();
        let mut panicked = None;
        for (position, instance) in resolved.iter().enumerate() {
            // A panicking release is held back until the rest are released.
            match panic::catch_unwind(AssertUnwindSafe(|| activator.release(instance))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!("Releasing instance {} of the scope failed: {}", position, error);
                    releases.push(ReleaseFailure { position, error });
                }
                Err(payload) => {
                    warn!("Releasing instance {} of the scope panicked", position);
                    panicked.get_or_insert(payload);
                }
            }
        }

        let dispose = guard.dispose().err();
        if let Some(payload) = panicked {
            // Already unwinding when closed from a drop; a second panic aborts.
            if !std::thread::panicking() {
                panic::resume_unwind(payload);
            }
        }
        match TeardownError::from_parts(releases, dispose) {
            Some(teardown) => Err(ActivationError::Teardown(teardown)),
            None => Ok(()),
        }
    }

    /// The instances resolved so far, in resolution order.
    pub fn resolved(&self) -> &[K::Instance] {
        &self.resolved
    }

    /// Returns the number of instances waiting to be released.
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    /// Returns true if nothing is waiting to be released.
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// Returns true once [`close`](ActivationScope::close) was called.
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }
}

impl<'a, K: IKernel> Drop for ActivationScope<'a, K> {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(err) = self.close() {
            warn!("Closing a dropped activation scope failed: {}", err);
        }
    }
}

impl<'a, K: IKernel> fmt::Debug for ActivationScope<'a, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationScope")
            .field("resolved", &self.resolved.len())
            .field("state", &self.state)
            .finish()
    }
}

impl<'a, K: IKernel> JobActivatorScope for ActivationScope<'a, K> {
    type Key = K::Key;
    type Instance = K::Instance;
    type Error = K::Error;

    fn resolve(&mut self, key: &K::Key) -> Result<K::Instance, ActivationError<K::Error>> {
        ActivationScope::resolve(self, key)
    }

    fn dispose_scope(&mut self) -> Result<(), ActivationError<K::Error>> {
        self.close()
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activator::JobActivatorContext;
    use crate::fake::{Call, FakeScope, RecordingKernel};
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn context() -> JobActivatorContext {
        JobActivatorContext::new()
    }

    #[test]
    fn resolve_records_instances_in_order() {
        let kernel = RecordingKernel::new();
        let activator = Activator::new(&kernel);
        let mut scope = activator.begin_scope(&context());

        let a = scope.resolve("A").unwrap();
        let b = scope.resolve("B").unwrap();
        let c = scope.resolve("C").unwrap();

        assert_eq!(scope.resolved(), &[a, b, c]);
        assert_eq!(scope.len(), 3);
    }

    #[test]
    fn close_releases_in_resolution_order() {
        let kernel = RecordingKernel::new();
        let activator = Activator::new(&kernel);
        let mut scope = activator.begin_scope(&context());

        let a = scope.resolve("A").unwrap();
        let b = scope.resolve("B").unwrap();
        let c = scope.resolve("C").unwrap();
        scope.close().unwrap();

        assert_eq!(kernel.releases(), vec![a, b, c]);
        assert!(scope.is_closed());
        assert!(scope.is_empty());
    }

    #[test]
    fn close_releases_before_disposing() {
        let kernel = RecordingKernel::new();
        let activator = Activator::new(&kernel);
        let mut scope = activator.begin_scope(&context());

        scope.resolve("A").unwrap();
        scope.close().unwrap();

        assert_eq!(
            kernel.calls(),
            vec![Call::BeginScope(1), Call::Resolve("A".into()), Call::Release(1), Call::Dispose(1)]
        );
    }

    #[test]
    fn close_empty_scope_disposes_once() {
        let kernel = RecordingKernel::new();
        let activator = Activator::new(&kernel);
        let mut scope = activator.begin_scope(&context());

        scope.close().unwrap();
        drop(scope);

        assert!(kernel.releases().is_empty());
        assert_eq!(kernel.disposals(), vec![1]);
    }

    #[test]
    fn failing_release_does_not_stop_the_others() {
        let kernel = RecordingKernel::new().failing_release(2);
        let activator = Activator::new(&kernel);
        let mut scope = activator.begin_scope(&context());

        scope.resolve("A").unwrap();
        scope.resolve("B").unwrap();
        scope.resolve("C").unwrap();
        let err = scope.close().unwrap_err();

        assert_eq!(kernel.releases(), vec![1, 2, 3]);
        assert_eq!(kernel.disposals(), vec![1]);

        let teardown = err.as_teardown().unwrap();
        assert_eq!(teardown.releases().len(), 1);
        assert_eq!(teardown.releases()[0].position, 1);
        assert!(teardown.dispose().is_none());
    }

    #[test]
    fn release_and_dispose_failures_are_both_reported() {
        let kernel = RecordingKernel::new().failing_release(1).failing_dispose();
        let activator = Activator::new(&kernel);
        let mut scope = activator.begin_scope(&context());

        scope.resolve("A").unwrap();
        let err = scope.close().unwrap_err();

        let teardown = err.as_teardown().unwrap();
        assert_eq!(teardown.releases().len(), 1);
        assert!(teardown.dispose().is_some());
        assert_eq!(kernel.disposals(), vec![1]);
    }

    #[test]
    fn panicking_release_still_releases_the_rest_and_disposes() {
        let kernel = RecordingKernel::new().panicking_release(1);
        let activator = Activator::new(&kernel);
        let mut scope = activator.begin_scope(&context());
        scope.resolve("A").unwrap();
        scope.resolve("B").unwrap();
        scope.resolve("C").unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| scope.close()));

        assert!(result.is_err());
        assert!(scope.is_closed());
        assert_eq!(kernel.releases(), vec![1, 2, 3]);
        assert_eq!(kernel.disposals(), vec![1]);
    }

    #[test]
    fn resolve_goes_through_its_own_container_scope() {
        let kernel = RecordingKernel::new();
        let activator = Activator::new(&kernel);

        let mut first = activator.begin_scope(&context());
        let mut second = activator.begin_scope(&context());
        second.resolve("A").unwrap();
        first.resolve("B").unwrap();
        second.resolve("C").unwrap();

        assert_eq!(kernel.resolved_in(), vec![2, 1, 2]);
    }

    #[test]
    fn resolve_after_close_fails() {
        let kernel = RecordingKernel::new();
        let activator = Activator::new(&kernel);
        let mut scope = activator.begin_scope(&context());

        scope.close().unwrap();
        let result = scope.resolve("A");

        assert!(matches!(result, Err(ActivationError::InvalidState)));
        assert!(scope.is_empty());
        assert!(!kernel.calls().contains(&Call::Resolve("A".into())));
    }

    #[test]
    fn failed_resolution_records_nothing() {
        let kernel = RecordingKernel::new().failing_resolve("B");
        let activator = Activator::new(&kernel);
        let mut scope = activator.begin_scope(&context());

        scope.resolve("A").unwrap();
        assert!(scope.resolve("B").is_err());
        scope.close().unwrap();

        assert_eq!(kernel.releases(), vec![1]);
    }

    #[test]
    fn close_twice_fails_without_releasing_again() {
        let kernel = RecordingKernel::new();
        let activator = Activator::new(&kernel);
        let mut scope = activator.begin_scope(&context());

        scope.resolve("A").unwrap();
        scope.close().unwrap();
        let second = scope.close();

        assert!(matches!(second, Err(ActivationError::InvalidState)));
        assert_eq!(kernel.releases(), vec![1]);
        assert_eq!(kernel.disposals(), vec![1]);
    }

    #[test]
    fn drop_closes_an_open_scope() {
        let kernel = RecordingKernel::new();
        let activator = Activator::new(&kernel);

        {
            let mut scope = activator.begin_scope(&context());
            scope.resolve("A").unwrap();
            scope.resolve("B").unwrap();
        }

        assert_eq!(kernel.releases(), vec![1, 2]);
        assert_eq!(kernel.disposals(), vec![1]);
    }

    #[test]
    fn try_new_without_activator() {
        let kernel = RecordingKernel::new();
        let container_scope = FakeScope::open(&kernel);

        let result = ActivationScope::<RecordingKernel>::try_new(None, Some(container_scope));

        assert!(matches!(result, Err(ActivationError::InvalidArgument("activator"))));
        // The orphaned container scope is not leaked.
        assert_eq!(kernel.disposals(), vec![1]);
    }

    #[test]
    fn try_new_without_container_scope() {
        let kernel = RecordingKernel::new();
        let activator = Activator::new(&kernel);

        let result = ActivationScope::try_new(Some(&activator), None);

        assert!(matches!(result, Err(ActivationError::InvalidArgument("container scope"))));
    }

    #[test]
    fn try_new_with_both() {
        let kernel = RecordingKernel::new();
        let activator = Activator::new(&kernel);
        let container_scope = FakeScope::open(&kernel);

        let mut scope = ActivationScope::try_new(Some(&activator), Some(container_scope)).unwrap();
        scope.resolve("Job").unwrap();
        scope.close().unwrap();

        assert_eq!(kernel.disposals(), vec![1]);
    }

    #[test]
    fn independent_scopes() {
        let kernel = RecordingKernel::new();
        let activator = Activator::new(&kernel);

        let mut first = activator.begin_scope(&context());
        let mut second = activator.begin_scope(&context());
        let a = first.resolve("A").unwrap();
        let b = second.resolve("B").unwrap();

        second.close().unwrap();
        assert_eq!(kernel.releases(), vec![b]);
        assert_eq!(kernel.disposals(), vec![2]);

        first.close().unwrap();
        assert_eq!(kernel.releases(), vec![b, a]);
        assert_eq!(kernel.disposals(), vec![2, 1]);
    }
}
