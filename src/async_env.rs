//! Async adapter.
//!
//! Tests that signal completion through explicit callbacks get a sandbox
//! whose `expect` must not let a raised expectation failure propagate:
//! the caller may be an externally-driven callback (a timer firing, an
//! event dispatch) the harness does not control, where an unwind would
//! crash or vanish unobserved. The async expectation therefore captures
//! its first failure as a [`FailureReport`] and forwards it; subsequent
//! matcher evaluations on the same built expectation are no-ops.

use std::sync::Arc;

use crate::expect::{CaptureShared, Expectation, ExpectationSink, FailSink};
use crate::lock;
use crate::report::FailureReport;
use crate::sandbox::{Cleanup, Flavor, Harness, LifecycleEvent, Sandbox};
use crate::trace::SiteRef;
use crate::value::Value;

pub type DoneFn = Arc<dyn Fn() + Send + Sync>;
pub type FailFn = Arc<dyn Fn(String) + Send + Sync>;

/// The environment exposed to an async test: `done`, `fail`, `stub`,
/// and a capturing `expect`, plus the tracked facade of the underlying
/// sandbox.
#[derive(Clone)]
pub struct AsyncSandbox {
    base: Sandbox,
    done: DoneFn,
    fail: FailFn,
    capture: Arc<CaptureShared>,
}

impl AsyncSandbox {
    /// Signals successful completion.
    pub fn done(&self) {
        (self.done)();
    }

    /// Signals failure with an explicit reason.
    pub fn fail(&self, reason: impl Into<String>) {
        (self.fail)(reason.into());
    }

    /// A fresh mocked callable from the stub factory.
    pub fn stub(&self) -> Value {
        self.base.stub()
    }

    /// Builds a capturing expectation: its first violation is reported
    /// through the adapter's sink instead of raising into the caller.
    #[track_caller]
    pub fn expect(&self, subject: impl Into<Value>) -> Expectation {
        Expectation::with_sink(
            subject.into(),
            FailSink::Capture(Arc::clone(&self.capture)),
            SiteRef::caller(),
        )
    }

    pub fn scope(&self) -> &crate::env::Scope {
        self.base.scope()
    }

    /// Tracked event registration; reversed at cleanup.
    #[track_caller]
    pub fn register(&self, event: &str, name: &str, callback: &Value) {
        self.base.register(event, name, callback);
    }

    /// Tracked timer creation; reversed at cleanup.
    #[track_caller]
    pub fn create_timer(&self, id: &str, delay_secs: f64, repetitions: u32, callback: &Value) {
        self.base.create_timer(id, delay_secs, repetitions, callback);
    }

    /// Tracked one-shot timer under a synthesized identifier.
    #[track_caller]
    pub fn schedule_once(&self, delay_secs: f64, callback: &Value) -> String {
        self.base.schedule_once(delay_secs, callback)
    }
}

/// Composes the async environment and its cleanup guard.
pub fn make_async_env(
    harness: &Harness,
    done: DoneFn,
    fail: FailFn,
    on_failed_expectation: ExpectationSink,
) -> (AsyncSandbox, Cleanup) {
    let (base, cleanup) = harness.sandbox(Flavor::Async);
    let capture = Arc::new(CaptureShared {
        notify: on_failed_expectation,
        scope: base.scope().clone(),
        config: Arc::clone(base.config()),
    });
    let env = AsyncSandbox {
        base,
        done,
        fail,
        capture,
    };
    (env, cleanup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{EventHub, SharedEvents, SharedTimers, TimerWheel};
    use crate::stub::{RecordingStubs, SharedStubs};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn harness() -> Harness {
        let events: SharedEvents = Arc::new(Mutex::new(EventHub::new()));
        let timers: SharedTimers = Arc::new(Mutex::new(TimerWheel::new()));
        let stubs: SharedStubs = Arc::new(Mutex::new(RecordingStubs::new()));
        Harness::new(events, timers, stubs)
    }

    #[test]
    fn async_creation_emits_lifecycle_event() {
        let harness = harness();
        let hits = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&hits);
        harness.add_observer(Arc::new(move |event| {
            if matches!(
                event,
                LifecycleEvent::SandboxCreated {
                    flavor: Flavor::Async
                }
            ) {
                sink.fetch_add(1, Ordering::SeqCst);
            }
        }));
        let _env = make_async_env(
            &harness,
            Arc::new(|| {}),
            Arc::new(|_| {}),
            Arc::new(|_| {}),
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn captured_failure_does_not_unwind_the_caller() {
        let harness = harness();
        let reports: Arc<Mutex<Vec<FailureReport>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let (env, _cleanup) = make_async_env(
            &harness,
            Arc::new(|| {}),
            Arc::new(|_| {}),
            Arc::new(move |report| lock(&sink).push(report)),
        );
        // Reaching this line proves the failure did not propagate.
        env.expect(1).to().eq(2);
        let reports = lock(&reports);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].reason, "Expected 1 to equal '2'");
    }
}
