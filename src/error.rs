//! Errors of the activation layer and of the kernel.

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// An error returned by user supplied factories, hooks and disposers.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

///////////////////////////////////////////////////////////////////////////////
// Activation Errors
///////////////////////////////////////////////////////////////////////////////

/// Error returned by the [`Activator`] and the [`ActivationScope`].
///
/// `E` is the error type of the kernel the activator is built on.
///
/// [`Activator`]: crate::Activator
/// [`ActivationScope`]: crate::ActivationScope
#[derive(Debug, Error)]
pub enum ActivationError<E>
where
    E: StdError + 'static,
{
    /// A required collaborator was not supplied.
    #[error("invalid argument: no {0} was supplied")]
    InvalidArgument(&'static str),

    /// The kernel could not produce the requested instance.
    #[error(transparent)]
    Resolution(E),

    /// The activation scope was already closed.
    #[error("the activation scope is closed")]
    InvalidState,

    /// Closing the activation scope did not go cleanly.
    #[error(transparent)]
    Teardown(TeardownError<E>),

    /// A job failed, and closing its scope did not go cleanly either.
    ///
    /// `job` is the error the job returned.
    #[error("the job failed and closing its scope failed as well: {teardown}")]
    Aborted {
        job: Box<ActivationError<E>>,
        #[source]
        teardown: TeardownError<E>,
    },
}

impl<E: StdError + 'static> ActivationError<E> {
    /// Returns the teardown error, if this is or carries one.
    pub fn as_teardown(&self) -> Option<&TeardownError<E>> {
        match self {
            Self::Teardown(teardown) | Self::Aborted { teardown, .. } => Some(teardown),
            _ => None,
        }
    }
}

/// A single instance that could not be released.
#[derive(Debug)]
pub struct ReleaseFailure<E> {
    /// Position of the instance in resolution order.
    pub position: usize,
    /// The error returned by the kernel.
    pub error: E,
}

/// Everything that went wrong while closing an activation scope.
///
/// Holds every release failure and the failure to dispose the container
/// scope, if any. At least one of them is present.
#[derive(Debug)]
pub struct TeardownError<E> {
    releases: Vec<ReleaseFailure<E>>,
    dispose: Option<E>,
}

impl<E> TeardownError<E> {
    /// Returns `None` when nothing failed.
    pub(crate) fn from_parts(releases: Vec<ReleaseFailure<E>>, dispose: Option<E>) -> Option<Self> {
        if releases.is_empty() && dispose.is_none() {
            None
        } else {
            Some(Self { releases, dispose })
        }
    }

    /// The instances that failed to release, in resolution order.
    pub fn releases(&self) -> &[ReleaseFailure<E>] {
        &self.releases
    }

    /// The error returned while disposing the container scope.
    pub fn dispose(&self) -> Option<&E> {
        self.dispose.as_ref()
    }
}

impl<E: fmt::Display> fmt::Display for TeardownError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(first) = self.releases.first() {
            write!(
                f,
                "failed to release {} instance(s), first at position {}: {}",
                self.releases.len(),
                first.position,
                first.error
            )?;
            if self.dispose.is_some() {
                f.write_str("; ")?;
            }
        }
        if let Some(dispose) = &self.dispose {
            write!(f, "failed to dispose the container scope: {}", dispose)?;
        }
        Ok(())
    }
}

impl<E: StdError + 'static> StdError for TeardownError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self.releases.first() {
            Some(first) => Some(&first.error),
            None => self.dispose.as_ref().map(|e| e as &(dyn StdError + 'static)),
        }
    }
}

///////////////////////////////////////////////////////////////////////////////
// Kernel Errors
///////////////////////////////////////////////////////////////////////////////

/// Error returned by the [`Kernel`].
///
/// [`Kernel`]: crate::Kernel
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("no component is registered for `{service}`")]
    NotRegistered { service: &'static str },

    #[error("`{service}` has a scoped lifestyle but no scope is active on this thread")]
    NoActiveScope { service: &'static str },

    #[error("circular dependency: {}", .path.join(" -> "))]
    Circular { path: Vec<&'static str> },

    #[error("the factory of `{service}` failed")]
    Factory {
        service: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("`{service}` was not produced as the requested type")]
    TypeMismatch { service: &'static str },

    #[error("tearing down `{service}` failed")]
    Teardown {
        service: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("{} components failed to tear down", .0.len())]
    Aggregate(Vec<KernelError>),
}

impl KernelError {
    /// Wraps the error of a factory.
    ///
    /// Kernel errors raised while resolving the dependencies of the factory
    /// are passed through as they are.
    pub(crate) fn from_factory(service: &'static str, source: BoxError) -> Self {
        match source.downcast::<KernelError>() {
            Ok(inner) => *inner,
            Err(source) => KernelError::Factory { service, source },
        }
    }

    /// Turns a list of errors into a single result.
    pub(crate) fn collect(mut errors: Vec<KernelError>) -> Result<(), KernelError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(KernelError::Aggregate(errors)),
        }
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////
