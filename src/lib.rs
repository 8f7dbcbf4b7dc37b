//! Scoped activation and guaranteed release of background job instances.
//!
//! # Features
//!
//! * One activation scope per job execution
//! * Every instance resolved through a scope is released when the scope
//!   closes, in resolution order
//! * The container scope is disposed exactly once, even if a release fails
//!   or panics
//! * Works with any container that implements [`IKernel`]
//! * A reference container, the [`Kernel`], with transient, scoped and
//!   singleton lifestyles
//!
//! # Creating an Activator
//!
//! The [`Activator`] borrows a kernel. Create one when the job runtime starts
//! and share it with every worker.
//!
//! ```rust
//! use jobscope::{Activator, Kernel};
//!
//! let kernel = Kernel::new();
//! let activator = Activator::new(&kernel);
//! ```
//!
//! To register components, use the [`KernelBuilder`]. Everything that must
//! happen when an instance is torn down is registered together with the
//! component.
//!
//! ```rust
//! use jobscope::{BoxError, IDisposable, Kernel};
//!
//! struct Connection;
//!
//! impl IDisposable for Connection {
//!     fn dispose(&self) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//! }
//!
//! struct SendMail {
//!     connection: std::sync::Arc<Connection>,
//! }
//!
//! let kernel = Kernel::builder()
//!     .scoped::<Connection, _>(|_| Ok(Connection))
//!     .disposable::<Connection>()
//!     .transient::<SendMail, _>(|resolver| {
//!         Ok(SendMail {
//!             connection: resolver.resolve()?,
//!         })
//!     })
//!     .build();
//! ```
//!
//! # Running a Job
//!
//! Open an [`ActivationScope`] for every job execution, resolve the job
//! through it and close it when the job is done. [`Activator::within_scope`]
//! does all of that, and also closes the scope when the job panics.
//!
//! ```rust
//! use jobscope::{Activator, JobActivatorContext, Kernel, ServiceKey};
//!
//! struct SendMail;
//!
//! let kernel = Kernel::builder()
//!     .transient::<SendMail, _>(|_| Ok(SendMail))
//!     .build();
//! let activator = Activator::new(&kernel);
//!
//! let mut scope = activator.begin_scope(&JobActivatorContext::for_job("42"));
//! let job = scope.resolve(&ServiceKey::of::<SendMail>()).unwrap();
//! assert!(job.downcast_ref::<SendMail>().is_some());
//! scope.close().unwrap();
//! ```
//!
//! Closing a scope that is already closed, or resolving from it, returns
//! [`ActivationError::InvalidState`]. A scope that is dropped while it is
//! still open is closed on the spot.

mod activator;
mod builder;
mod container;
mod error;
mod instance;
mod internal_helpers;
mod kernel_traits;
mod resolver;
mod scope;
mod service_traits;

#[cfg(test)]
mod fake;

pub use crate::activator::{Activator, JobActivatorContext};
pub use crate::builder::KernelBuilder;
pub use crate::container::{Kernel, ScopeHandle};
pub use crate::error::{ActivationError, BoxError, KernelError, ReleaseFailure, TeardownError};
pub use crate::instance::{Instance, InstanceId, ServiceKey};
pub use crate::kernel_traits::{IContainerScope, IKernel, JobActivator, JobActivatorScope};
pub use crate::resolver::Resolver;
pub use crate::scope::ActivationScope;
pub use crate::service_traits::{IDisposable, Lifestyle};
