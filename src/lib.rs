//! Cordon is an isolated test execution harness: it runs individual
//! test-case functions (sync or async) inside a sandboxed environment,
//! tracks and reverses any side effects they register against the host's
//! event and timer subsystems, and produces structured failure reports
//! with source location and local-binding context — without ever crashing
//! the host process.
//!
//! The harness is built from small, composable pieces:
//!
//! - [`tracker::SideEffectTracker`] wraps the host's event/timer APIs so
//!   every registration made during a test can be reversed at teardown.
//! - [`expect::expect`] builds negatable matcher sets that raise
//!   structured failure messages on violation.
//! - [`sandbox::Harness`] composes the environment a test executes under
//!   and pairs it with an idempotent cleanup guard.
//! - [`fiber`] runs a test on an independently resumable execution
//!   context so errors raised after a suspension are still caught.
//! - [`inspect`] locates the first user-code frame of a failure and
//!   normalizes the raw error into a reportable reason.
//! - [`async_env`] adapts the above for tests that signal completion via
//!   explicit `done`/`fail` callbacks.

pub mod async_env;
pub mod config;
pub mod env;
pub mod errors;
pub mod expect;
pub mod fiber;
pub mod host;
pub mod inspect;
pub mod report;
pub mod runner;
pub mod sandbox;
pub mod stub;
pub mod trace;
pub mod tracker;
pub mod value;

pub use crate::config::HarnessConfig;
pub use crate::errors::HarnessError;
pub use crate::expect::expect;
pub use crate::report::FailureReport;
pub use crate::runner::{run_case, run_group, CaseOutcome, TestCase, TestGroup};
pub use crate::sandbox::{Cleanup, Flavor, Harness, LifecycleEvent, Sandbox};
pub use crate::value::Value;

/// Locks a mutex, recovering the guard if a previous holder panicked.
///
/// Panics are routine in this crate (matchers raise by panicking inside a
/// fiber), so a poisoned lock carries no meaning beyond "a test failed
/// while holding this".
pub(crate) fn lock<T: ?Sized>(m: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
