//! Harness-internal error taxonomy.
//!
//! These are failures of the harness machinery itself, never of the test
//! under execution — a failing test produces a
//! [`FailureReport`](crate::report::FailureReport), not a `HarnessError`.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error("failed to spawn execution context: {0}")]
    #[diagnostic(
        code(cordon::fiber::spawn),
        help("the host refused a new thread; check process limits")
    )]
    ContextSpawn(#[from] std::io::Error),

    #[error("execution context disconnected before completion")]
    #[diagnostic(code(cordon::fiber::lost))]
    ContextLost,

    #[error("execution context exceeded {limit} resumes without completing")]
    #[diagnostic(
        code(cordon::fiber::resume_limit),
        help("the test suspends in a loop; raise HarnessConfig::max_resumes if intentional")
    )]
    ResumeLimit { limit: usize },
}
