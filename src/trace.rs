//! Ambient failure context: the raising path and the frame recorder.
//!
//! Every failure inside the harness travels as a panic whose payload is
//! a raw error string of the conventional `source:line: message` shape.
//! While a context is active on the current thread, each raise — and
//! each foreign panic, via a process-wide hook — records an attribution
//! frame together with a snapshot of the sandbox's local bindings. The
//! fiber boundary (or the async adapter's protected invocation) collects
//! those frames for the stack inspector.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, Location, PanicHookInfo};
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;

use crate::env::Scope;

/// A recorded attribution frame. `line == 0` means the runtime could not
/// line-attribute the failure from the frame alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub source_file: String,
    pub line: u32,
    pub locals: Vec<(String, String)>,
}

/// A static source location, used for definition-site fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteRef {
    pub file: &'static str,
    pub line: u32,
}

impl SiteRef {
    #[track_caller]
    pub fn caller() -> Self {
        let loc = Location::caller();
        SiteRef {
            file: loc.file(),
            line: loc.line(),
        }
    }
}

struct ActiveContext {
    id: u64,
    frames: Vec<Frame>,
    locals_source: Option<Scope>,
}

thread_local! {
    static ACTIVE: RefCell<Vec<ActiveContext>> = const { RefCell::new(Vec::new()) };
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Installs the frame-recording panic hook, once per process. The hook
/// stays silent for panics on threads with an active context (they are
/// harness-managed and will be caught) and delegates to the previous
/// hook everywhere else.
static HOOK: Lazy<()> = Lazy::new(|| {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        let handled = ACTIVE.with(|active| {
            let mut stack = active.borrow_mut();
            match stack.last_mut() {
                Some(ctx) => {
                    if let Some(loc) = info.location() {
                        let locals = ctx
                            .locals_source
                            .as_ref()
                            .map(Scope::locals_snapshot)
                            .unwrap_or_default();
                        ctx.frames.push(Frame {
                            source_file: loc.file().to_string(),
                            line: loc.line(),
                            locals,
                        });
                    }
                    true
                }
                None => false,
            }
        });
        if !handled {
            previous(info);
        }
    }));
});

/// Activates a failure context on the current thread, returning its
/// opaque id. Contexts nest; each `activate` must be paired with a
/// [`deactivate`].
pub(crate) fn activate(locals_source: Option<Scope>) -> u64 {
    Lazy::force(&HOOK);
    let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
    ACTIVE.with(|active| {
        active.borrow_mut().push(ActiveContext {
            id,
            frames: Vec::new(),
            locals_source,
        });
    });
    id
}

/// Pops the innermost context and returns the frames it recorded.
pub(crate) fn deactivate() -> Vec<Frame> {
    ACTIVE.with(|active| {
        active
            .borrow_mut()
            .pop()
            .map(|ctx| ctx.frames)
            .unwrap_or_default()
    })
}

/// The id of the innermost active context, if any.
pub(crate) fn current_context_id() -> Option<u64> {
    ACTIVE.with(|active| active.borrow().last().map(|ctx| ctx.id))
}

fn record_frame(file: &str, line: u32) {
    ACTIVE.with(|active| {
        let mut stack = active.borrow_mut();
        if let Some(ctx) = stack.last_mut() {
            let locals = ctx
                .locals_source
                .as_ref()
                .map(Scope::locals_snapshot)
                .unwrap_or_default();
            ctx.frames.push(Frame {
                source_file: file.to_string(),
                line,
                locals,
            });
        }
    });
}

/// Raises a failure attributed to the caller's source location.
///
/// Outside an active context this degenerates to a plain panic carrying
/// the same `source:line: message` payload.
#[track_caller]
pub fn raise(message: impl Into<String>) -> ! {
    raise_at(SiteRef::caller(), message.into())
}

/// Raises a failure attributed to an explicit site.
pub(crate) fn raise_at(site: SiteRef, message: String) -> ! {
    record_frame(site.file, site.line);
    panic::panic_any(format!("{}:{}: {}", site.file, site.line, message))
}

/// Extracts the raw error string from a caught panic payload.
pub(crate) fn payload_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(s) => (*s).to_string(),
            Err(_) => "panic payload of unrecognized type".to_string(),
        },
    }
}
