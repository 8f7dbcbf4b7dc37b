//! A kernel that records every call, for testing the activator.

use crate::kernel_traits::{IContainerScope, IKernel};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Resolve(String),
    Release(u32),
    BeginScope(u32),
    Dispose(u32),
}

#[derive(Debug, PartialEq, Eq)]
pub struct FakeError(pub String);

impl fmt::Display for FakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for FakeError {}

#[derive(Default)]
struct Log {
    calls: Vec<Call>,
    /// The scope every scope-aware resolution went through.
    resolved_in: Vec<u32>,
    next_instance: u32,
    next_scope: u32,
}

/// Hands out numbered instances and scopes.
#[derive(Default)]
pub struct RecordingKernel {
    log: Rc<RefCell<Log>>,
    failing_resolve: Option<&'static str>,
    failing_release: Option<u32>,
    panicking_release: Option<u32>,
    failing_dispose: bool,
}

impl RecordingKernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_resolve(mut self, key: &'static str) -> Self {
        self.failing_resolve = Some(key);
        self
    }

    pub fn failing_release(mut self, instance: u32) -> Self {
        self.failing_release = Some(instance);
        self
    }

    pub fn panicking_release(mut self, instance: u32) -> Self {
        self.panicking_release = Some(instance);
        self
    }

    pub fn failing_dispose(mut self) -> Self {
        self.failing_dispose = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().calls.clone()
    }

    pub fn releases(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Release(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn disposals(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Dispose(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// The scopes that scope-aware resolutions went through, in order.
    pub fn resolved_in(&self) -> Vec<u32> {
        self.log.borrow().resolved_in.clone()
    }

    fn record(&self, call: Call) {
        self.log.borrow_mut().calls.push(call);
    }
}

impl IKernel for RecordingKernel {
    type Key = str;
    type Instance = u32;
    type Scope = FakeScope;
    type Error = FakeError;

    fn resolve(&self, key: &str) -> Result<u32, FakeError> {
        self.record(Call::Resolve(key.to_owned()));
        if self.failing_resolve == Some(key) {
            return Err(FakeError(format!("cannot resolve {}", key)));
        }
        let mut log = self.log.borrow_mut();
        log.next_instance += 1;
        Ok(log.next_instance)
    }

    fn release(&self, instance: &u32) -> Result<(), FakeError> {
        self.record(Call::Release(*instance));
        if self.panicking_release == Some(*instance) {
            panic!("release of {} panicked", instance);
        }
        if self.failing_release == Some(*instance) {
            return Err(FakeError(format!("cannot release {}", instance)));
        }
        Ok(())
    }

    fn resolve_in(&self, scope: &FakeScope, key: &str) -> Result<u32, FakeError> {
        self.log.borrow_mut().resolved_in.push(scope.id);
        self.resolve(key)
    }

    fn begin_scope(&self) -> FakeScope {
        FakeScope::open(self)
    }
}

pub struct FakeScope {
    id: u32,
    log: Rc<RefCell<Log>>,
    failing: bool,
}

impl FakeScope {
    /// Opens a scope of `kernel`, just like `IKernel::begin_scope`.
    pub fn open(kernel: &RecordingKernel) -> Self {
        let id = {
            let mut log = kernel.log.borrow_mut();
            log.next_scope += 1;
            log.next_scope
        };
        kernel.record(Call::BeginScope(id));
        Self {
            id,
            log: Rc::clone(&kernel.log),
            failing: kernel.failing_dispose,
        }
    }
}

impl IContainerScope for FakeScope {
    type Error = FakeError;

    fn dispose(&mut self) -> Result<(), FakeError> {
        self.log.borrow_mut().calls.push(Call::Dispose(self.id));
        if self.failing {
            return Err(FakeError(format!("cannot dispose scope {}", self.id)));
        }
        Ok(())
    }
}
