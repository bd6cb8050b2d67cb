//! Expectation builder.
//!
//! `expect(subject)` builds a negatable set of matchers over a subject.
//! A violated matcher raises `Expectation Failed: Expected <subject>
//! <suffix>`, attributed to the matcher's call site. The same predicate
//! logic, inverted through `to_not`, produces the complementary message.
//!
//! Two fail sinks exist: the default raises straight through the fiber
//! boundary; the async adapter installs a capturing sink that converts
//! the first violation per built expectation into a [`FailureReport`]
//! and forwards it to a callback instead of unwinding the caller.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::HarnessConfig;
use crate::env::Scope;
use crate::inspect;
use crate::report::FailureReport;
use crate::trace::{self, SiteRef};
use crate::value::Value;

/// Receives the report captured by an async expectation's first failure.
pub type ExpectationSink = Arc<dyn Fn(FailureReport) + Send + Sync>;

pub(crate) struct CaptureShared {
    pub(crate) notify: ExpectationSink,
    pub(crate) scope: Scope,
    pub(crate) config: Arc<HarnessConfig>,
}

#[derive(Clone)]
pub(crate) enum FailSink {
    /// Raise at the caller; the fiber boundary catches it.
    Raise,
    /// Capture the failure into a report and forward it; never unwind.
    Capture(Arc<CaptureShared>),
}

/// One assertion subject, ready to take a polarity.
pub struct Expectation {
    subject: Value,
    sink: FailSink,
    /// Shared by every matcher set built from this expectation; the
    /// capturing sink fires at most once per expectation.
    latch: Arc<AtomicBool>,
    /// Where `expect` was called; the degraded-attribution fallback for
    /// captured failures.
    fallback: SiteRef,
}

/// Builds an expectation over `subject` with the default raising sink.
#[track_caller]
pub fn expect(subject: impl Into<Value>) -> Expectation {
    Expectation::with_sink(subject.into(), FailSink::Raise, SiteRef::caller())
}

impl Expectation {
    pub(crate) fn with_sink(subject: Value, sink: FailSink, fallback: SiteRef) -> Self {
        Expectation {
            subject,
            sink,
            latch: Arc::new(AtomicBool::new(false)),
            fallback,
        }
    }

    pub fn to(self) -> MatcherSet {
        self.polarized(false)
    }

    pub fn to_not(self) -> MatcherSet {
        self.polarized(true)
    }

    fn polarized(self, negated: bool) -> MatcherSet {
        MatcherSet {
            subject: self.subject,
            negated,
            sink: self.sink,
            latch: self.latch,
            fallback: self.fallback,
        }
    }
}

/// The matchers of one polarity over one subject.
pub struct MatcherSet {
    subject: Value,
    negated: bool,
    sink: FailSink,
    latch: Arc<AtomicBool>,
    fallback: SiteRef,
}

impl MatcherSet {
    // ------------------------------------------------------------------
    // Matchers
    // ------------------------------------------------------------------

    #[track_caller]
    pub fn eq(&self, other: impl Into<Value>) -> &Self {
        let other = other.into();
        self.verify(self.subject == other, format!("equal '{}'", other))
    }

    #[track_caller]
    pub fn lt(&self, other: impl Into<Value>) -> &Self {
        let other = other.into();
        let holds = match (self.subject.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        };
        self.verify(holds, format!("be less than '{}'", other))
    }

    #[track_caller]
    pub fn gt(&self, other: impl Into<Value>) -> &Self {
        let other = other.into();
        let holds = match (self.subject.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        };
        self.verify(holds, format!("be greater than '{}'", other))
    }

    #[track_caller]
    pub fn be_true(&self) -> &Self {
        self.verify(self.subject == Value::Bool(true), "be true".to_string())
    }

    #[track_caller]
    pub fn be_false(&self) -> &Self {
        self.verify(self.subject == Value::Bool(false), "be false".to_string())
    }

    /// The subject is a reference whose anchor is still alive.
    #[track_caller]
    pub fn be_alive(&self) -> &Self {
        self.verify(self.subject.is_live_ref(), "be a valid reference".to_string())
    }

    /// The subject is a reference whose anchor has been dropped.
    #[track_caller]
    pub fn be_dead(&self) -> &Self {
        self.verify(
            self.subject.is_dead_ref(),
            "be an invalid reference".to_string(),
        )
    }

    /// The subject is the absent value.
    #[track_caller]
    pub fn be_nil(&self) -> &Self {
        self.verify(self.subject.is_nil(), "be nil".to_string())
    }

    /// The subject is not the absent value.
    #[track_caller]
    pub fn exist(&self) -> &Self {
        self.verify(!self.subject.is_nil(), "exist".to_string())
    }

    #[track_caller]
    pub fn be_a(&self, type_name: &str) -> &Self {
        self.verify(
            self.subject.type_name() == type_name,
            format!("be a {}", type_name),
        )
    }

    /// Grammar alias of [`be_a`](Self::be_a).
    #[track_caller]
    pub fn be_an(&self, type_name: &str) -> &Self {
        self.verify(
            self.subject.type_name() == type_name,
            format!("be an {}", type_name),
        )
    }

    /// Invoking the subject as a zero-argument callable completes
    /// without raising.
    #[track_caller]
    pub fn succeed_when_called(&self) -> &Self {
        let holds = protected_call(&self.subject).is_ok();
        self.verify(holds, "succeed when called".to_string())
    }

    /// Invoking the subject as a zero-argument callable raises.
    #[track_caller]
    pub fn fail_when_called(&self) -> &Self {
        let holds = protected_call(&self.subject).is_err();
        self.verify(holds, "fail when called".to_string())
    }

    /// Invoking the subject raises an error whose normalized message
    /// equals `message`.
    #[track_caller]
    pub fn fail_with(&self, message: &str) -> &Self {
        let holds = match protected_call(&self.subject) {
            Err(raw) => inspect::strip_location_prefix(&raw) == message,
            Ok(_) => false,
        };
        self.verify(holds, format!("fail with '{}'", message))
    }

    // ------------------------------------------------------------------
    // Failure path
    // ------------------------------------------------------------------

    #[track_caller]
    fn verify(&self, holds: bool, tail: String) -> &Self {
        if holds == self.negated {
            let suffix = format!("to {}{}", if self.negated { "not " } else { "" }, tail);
            let message = format!(
                "{}: Expected {} {}",
                inspect::EXPECTATION_MARKER,
                self.subject.repr(),
                suffix
            );
            self.fire(message);
        }
        self
    }

    #[track_caller]
    fn fire(&self, message: String) {
        let site = SiteRef::caller();
        match &self.sink {
            FailSink::Raise => trace::raise_at(site, message),
            FailSink::Capture(shared) => {
                fire_captured(shared, &self.latch, site, self.fallback, message)
            }
        }
    }
}

/// Invokes a subject with no arguments under a protected boundary; the
/// subject's raise becomes a verdict, never a propagated error.
///
/// The invocation runs under a throwaway context so a swallowed raise
/// leaves no frame behind in the surrounding one; a stale frame would
/// later be mistaken for the attribution point of an unrelated failure.
fn protected_call(subject: &Value) -> Result<Value, String> {
    trace::activate(None);
    let result = catch_unwind(AssertUnwindSafe(|| subject.invoke(&[])));
    trace::deactivate();
    result.map_err(trace::payload_message)
}

/// The capturing fail path: fires at most once per built expectation,
/// converts the raise into a report via the stack inspector, and
/// forwards it instead of unwinding.
fn fire_captured(
    shared: &CaptureShared,
    latch: &AtomicBool,
    site: SiteRef,
    fallback: SiteRef,
    message: String,
) {
    if latch.swap(true, Ordering::SeqCst) {
        return;
    }
    let context_id = trace::activate(Some(shared.scope.clone()));
    let result = catch_unwind(AssertUnwindSafe(|| {
        trace::raise_at(site, message);
    }));
    let frames = trace::deactivate();
    let raw_error = match result {
        Err(payload) => trace::payload_message(payload),
        // raise_at never returns normally.
        Ok(()) => return,
    };
    if raw_error.is_empty() {
        tracing::warn!("empty error raised inside captured expectation");
        return;
    }
    let report = FailureReport::assemble(&frames, fallback, &raw_error, context_id, &shared.config);
    (shared.notify)(report);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Matchers raise through the ambient context; direct positive cases
    // are safe to call anywhere, and failing cases are exercised by the
    // integration suites where attribution can be observed end to end.

    #[test]
    fn passing_matchers_do_not_raise() {
        expect(2).to().eq(2).be_a("Number").gt(1).lt(3);
        expect("x").to_not().eq("y");
        expect(Value::Nil).to().be_nil();
        expect(true).to().be_true();
        expect(Value::func(|_| Value::Nil)).to().succeed_when_called();
    }

    #[test]
    fn protected_call_converts_raises_to_verdicts() {
        let raising = Value::func(|_| trace::raise("deliberate"));
        expect(raising.clone()).to().fail_when_called();
        expect(raising).to().fail_with("deliberate");
        expect(Value::Nil).to().fail_when_called();
    }

    #[test]
    fn swallowed_raises_leave_no_frames_in_the_enclosing_context() {
        trace::activate(None);
        let raising = Value::func(|_| trace::raise("swallowed"));
        expect(raising).to().fail_when_called();
        let frames = trace::deactivate();
        assert!(frames.is_empty(), "stale frames: {frames:?}");
    }

    #[test]
    fn negated_call_matchers() {
        let fine = Value::func(|_| Value::from(1));
        expect(fine.clone()).to_not().fail_when_called();
        expect(fine).to_not().fail_with("anything");
    }
}
