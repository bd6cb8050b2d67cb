//! Suspended execution runner.
//!
//! Test code may suspend partway through and later resume; a plain
//! protected call cannot catch an error raised after the resume point
//! because the original call frame has already returned. A fiber — here
//! a dedicated thread driven in lockstep over rendezvous channels, with
//! no true parallelism — preserves the call stack across suspension so
//! any error raised at any point of the function's logical lifetime is
//! caught at the same boundary.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};

use crate::config::HarnessConfig;
use crate::env::Scope;
use crate::errors::HarnessError;
use crate::inspect;
use crate::trace::{self, Frame};

/// The direct result of running a function inside an execution context.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub succeeded: bool,
    pub raw_error: Option<String>,
    /// Attribution frames recorded while the context was active,
    /// outermost first.
    pub frames: Vec<Frame>,
    /// Opaque handle identifying the context, carried into reports.
    pub context_id: u64,
}

enum Signal {
    Suspended,
    Finished(ExecutionOutcome),
}

/// Handed to the running function; `suspend` yields control back to the
/// driver until it resumes the fiber.
pub struct FiberHandle {
    yield_tx: Sender<Signal>,
    resume_rx: Receiver<()>,
}

impl FiberHandle {
    /// Yields to the driver until it resumes the fiber.
    ///
    /// Raises when the driver has abandoned the context (for example
    /// after hitting the resume limit), unwinding the test function so
    /// the thread can exit instead of suspending forever.
    pub fn suspend(&self) {
        if self.yield_tx.send(Signal::Suspended).is_ok() && self.resume_rx.recv().is_ok() {
            return;
        }
        trace::raise("execution context abandoned by its driver");
    }
}

/// An independently resumable execution context backed by a thread.
pub struct Fiber {
    signal_rx: Receiver<Signal>,
    resume_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Fiber {
    /// Spawns `f` on a fresh context. The context's failure recording is
    /// activated with `scope` as the locals source before `f` runs.
    pub fn spawn(
        scope: Option<Scope>,
        f: impl FnOnce(&FiberHandle) + Send + 'static,
    ) -> Result<Fiber, HarnessError> {
        let (signal_tx, signal_rx) = channel::<Signal>();
        let (resume_tx, resume_rx) = channel::<()>();
        let finish_tx = signal_tx.clone();

        let thread = thread::Builder::new()
            .name("cordon-fiber".to_string())
            .spawn(move || {
                let handle = FiberHandle {
                    yield_tx: signal_tx,
                    resume_rx,
                };
                let context_id = trace::activate(scope);
                let result = catch_unwind(AssertUnwindSafe(|| f(&handle)));
                let frames = trace::deactivate();
                let outcome = conclude(result, frames, context_id);
                // The driver may already have given up; nothing to do then.
                let _ = finish_tx.send(Signal::Finished(outcome));
            })?;

        Ok(Fiber {
            signal_rx,
            resume_tx,
            thread: Some(thread),
        })
    }

    fn next_signal(&self) -> Result<Signal, HarnessError> {
        self.signal_rx.recv().map_err(|_| HarnessError::ContextLost)
    }

    fn resume(&self) -> Result<(), HarnessError> {
        self.resume_tx.send(()).map_err(|_| HarnessError::ContextLost)
    }
}

impl Drop for Fiber {
    fn drop(&mut self) {
        // Dropping resume_tx unblocks a suspended fiber; join only once
        // the thread can actually finish.
        if let Some(thread) = self.thread.take() {
            if thread.is_finished() {
                let _ = thread.join();
            }
        }
    }
}

fn conclude(
    result: Result<(), Box<dyn std::any::Any + Send>>,
    frames: Vec<Frame>,
    context_id: u64,
) -> ExecutionOutcome {
    match result {
        Ok(()) => ExecutionOutcome {
            succeeded: true,
            raw_error: None,
            frames,
            context_id,
        },
        Err(payload) => {
            let message = trace::payload_message(payload);
            if message.is_empty() {
                // Malformed propagation from a nested protected call;
                // framework noise, not a test outcome.
                tracing::warn!(context_id, "empty error raised inside execution context");
                return ExecutionOutcome {
                    succeeded: true,
                    raw_error: None,
                    frames,
                    context_id,
                };
            }
            let raw_error = ensure_location_prefix(message, frames.last());
            ExecutionOutcome {
                succeeded: false,
                raw_error: Some(raw_error),
                frames,
                context_id,
            }
        }
    }
}

/// Raw errors conventionally embed `source:line:` at their head; foreign
/// panic payloads don't, so the innermost recorded frame supplies one.
fn ensure_location_prefix(message: String, innermost: Option<&Frame>) -> String {
    if inspect::has_location_prefix(&message) {
        return message;
    }
    match innermost {
        Some(frame) => format!("{}:{}: {}", frame.source_file, frame.line, message),
        None => message,
    }
}

/// Runs `f` to completion on a fresh fiber, resuming it whenever it
/// suspends, up to the configured resume limit.
pub fn run(
    scope: Scope,
    config: &HarnessConfig,
    f: impl FnOnce(&FiberHandle) + Send + 'static,
) -> Result<ExecutionOutcome, HarnessError> {
    let fiber = Fiber::spawn(Some(scope), f)?;
    let mut resumes = 0usize;
    loop {
        match fiber.next_signal()? {
            Signal::Suspended => {
                if resumes >= config.max_resumes {
                    return Err(HarnessError::ResumeLimit {
                        limit: config.max_resumes,
                    });
                }
                resumes += 1;
                fiber.resume()?;
            }
            Signal::Finished(outcome) => return Ok(outcome),
        }
    }
}
