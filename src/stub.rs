//! Stub factory collaborator.
//!
//! The harness only depends on the factory's creation and cleanup hooks;
//! call-count bookkeeping belongs to the factory. [`RecordingStubs`] is
//! the in-memory factory used by the harness's own tests and by
//! embedders without a richer mocking layer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::value::Value;

/// Produces mockable callables and resets their bookkeeping between
/// tests. `reset()` is invoked exactly once per test by the sandbox's
/// cleanup guard.
pub trait StubFactory: Send {
    fn make_stub(&mut self) -> Value;
    fn reset(&mut self);
}

pub type SharedStubs = Arc<Mutex<dyn StubFactory>>;

/// The callable handle inside a [`Value::Stub`].
#[derive(Clone)]
pub struct StubHandle {
    calls: Arc<AtomicU64>,
}

impl StubHandle {
    fn new() -> Self {
        StubHandle {
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records the invocation; stubs answer with the absent value.
    pub fn invoke(&self, _args: &[Value]) -> Value {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Value::Nil
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Identity comparison; two stubs are the same object, not merely
    /// equal in shape.
    pub fn same(&self, other: &StubHandle) -> bool {
        Arc::ptr_eq(&self.calls, &other.calls)
    }
}

/// In-memory stub factory that counts invocations per stub.
#[derive(Default)]
pub struct RecordingStubs {
    issued: Vec<StubHandle>,
}

impl RecordingStubs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }
}

impl StubFactory for RecordingStubs {
    fn make_stub(&mut self) -> Value {
        let handle = StubHandle::new();
        self.issued.push(handle.clone());
        Value::Stub(handle)
    }

    fn reset(&mut self) {
        for handle in self.issued.drain(..) {
            handle.calls.store(0, Ordering::SeqCst);
        }
    }
}
