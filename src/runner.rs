//! Case and group execution.
//!
//! A test case enters through the composer, runs under the suspended
//! execution runner, has failures turned into reports by the stack
//! inspector, and always has its side effects reversed before the next
//! case's sandbox is composed.

use std::sync::Arc;

use serde::Serialize;

use crate::env::Scope;
use crate::errors::HarnessError;
use crate::fiber::{self, FiberHandle};
use crate::report::FailureReport;
use crate::sandbox::{Flavor, Harness, Sandbox};
use crate::trace::SiteRef;

/// A test body. Receives the sandbox it executes against and a fiber
/// handle it may use to suspend.
pub type CaseFn = Arc<dyn Fn(&Sandbox, &FiberHandle) + Send + Sync>;

/// One registered test case.
pub struct TestCase {
    pub name: String,
    body: CaseFn,
    /// Static definition site, the fallback attribution point when no
    /// user frame survives a failure.
    site: SiteRef,
}

impl TestCase {
    #[track_caller]
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(&Sandbox, &FiberHandle) + Send + Sync + 'static,
    ) -> Self {
        TestCase {
            name: name.into(),
            body: Arc::new(body),
            site: SiteRef::caller(),
        }
    }
}

/// A group of cases sharing fixture state installed by `before`.
pub struct TestGroup {
    pub name: String,
    before: Option<(CaseFn, SiteRef)>,
    pub cases: Vec<TestCase>,
}

impl TestGroup {
    pub fn new(name: impl Into<String>) -> Self {
        TestGroup {
            name: name.into(),
            before: None,
            cases: Vec::new(),
        }
    }

    /// Installs the group-level setup callback; it runs once under a
    /// group-setup sandbox whose scope every case reads through to.
    #[track_caller]
    pub fn before(mut self, f: impl Fn(&Sandbox, &FiberHandle) + Send + Sync + 'static) -> Self {
        self.before = Some((Arc::new(f), SiteRef::caller()));
        self
    }

    pub fn case(mut self, case: TestCase) -> Self {
        self.cases.push(case);
        self
    }
}

/// The verdict for one executed case.
///
/// `Empty` is distinct from success: the case ran to completion without
/// evaluating a single matcher, which usually means the test asserts
/// nothing at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CaseOutcome {
    Passed,
    Failed(FailureReport),
    Empty,
}

/// Runs one case in a fresh plain sandbox.
pub fn run_case(harness: &Harness, case: &TestCase) -> Result<CaseOutcome, HarnessError> {
    run_case_with_state(harness, case, None)
}

/// Runs one case whose scope reads through to `parent` (group state).
pub fn run_case_with_state(
    harness: &Harness,
    case: &TestCase,
    parent: Option<&Scope>,
) -> Result<CaseOutcome, HarnessError> {
    let (sandbox, cleanup) = harness.sandbox_with_parent(Flavor::Plain, parent);
    let outcome = execute(harness, &sandbox, &case.body)?;
    cleanup.run();

    if outcome.succeeded {
        if sandbox.assertions_evaluated() == 0 {
            return Ok(CaseOutcome::Empty);
        }
        return Ok(CaseOutcome::Passed);
    }

    let raw_error = outcome.raw_error.as_deref().unwrap_or_default();
    Ok(CaseOutcome::Failed(FailureReport::assemble(
        &outcome.frames,
        case.site,
        raw_error,
        outcome.context_id,
        sandbox.config(),
    )))
}

/// Runs a group: `before` under a group-setup sandbox, then each case
/// with a child scope of the group's. Cleanup always completes between
/// cases, so no case observes a predecessor's registrations.
pub fn run_group(
    harness: &Harness,
    group: &TestGroup,
) -> Result<Vec<(String, CaseOutcome)>, HarnessError> {
    let mut results = Vec::with_capacity(group.cases.len());

    let group_scope = match &group.before {
        Some((before, site)) => {
            let (setup, cleanup) = harness.sandbox(Flavor::GroupSetup);
            let outcome = execute(harness, &setup, before)?;
            if !outcome.succeeded {
                // A broken fixture fails every case in the group; there
                // is nothing meaningful to run them against.
                let raw_error = outcome.raw_error.as_deref().unwrap_or_default();
                let report = FailureReport::assemble(
                    &outcome.frames,
                    *site,
                    raw_error,
                    outcome.context_id,
                    &harness.config,
                );
                cleanup.run();
                for case in &group.cases {
                    results.push((case.name.clone(), CaseOutcome::Failed(report.clone())));
                }
                return Ok(results);
            }
            // The setup's registrations outlive the setup sandbox only
            // until the group finishes; its cleanup guard is dropped
            // here, reversing them before the first case runs. State
            // installed in the scope survives.
            let scope = setup.scope().clone();
            cleanup.run();
            Some(scope)
        }
        None => None,
    };

    for case in &group.cases {
        let outcome = run_case_with_state(harness, case, group_scope.as_ref())?;
        results.push((case.name.clone(), outcome));
    }
    Ok(results)
}

fn execute(
    harness: &Harness,
    sandbox: &Sandbox,
    body: &CaseFn,
) -> Result<fiber::ExecutionOutcome, HarnessError> {
    let body = Arc::clone(body);
    let sandbox = sandbox.clone();
    let scope = sandbox.scope().clone();
    fiber::run(scope, &harness.config, move |handle| {
        body(&sandbox, handle)
    })
}
