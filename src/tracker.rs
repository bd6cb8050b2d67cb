//! Side-effect tracking facade.
//!
//! Exposes the same call surface as the wrapped event/timer subsystems,
//! but records every registration so it can be reversed at test
//! teardown. The facade is the only mutation path the harness permits
//! test code to take into the shared host subsystems, and it guarantees
//! exactly symmetric create/remove pairs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::host::{SharedEvents, SharedTimers};
use crate::lock;
use crate::trace;
use crate::value::Value;

/// Separator between event and handler name in the diagnostic
/// identifier. Display only; reversal never re-parses it.
const EVENT_ID_SEPARATOR: char = '|';

static NEXT_SYNTHESIZED_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Event,
    Timer,
}

/// A recorded registration, slated for reversal at teardown. The fields
/// the matching `remove` needs are kept structurally; event or handler
/// names may contain any character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedRegistration {
    Event { event: String, name: String },
    Timer { id: String },
}

impl TrackedRegistration {
    pub fn category(&self) -> Category {
        match self {
            TrackedRegistration::Event { .. } => Category::Event,
            TrackedRegistration::Timer { .. } => Category::Timer,
        }
    }

    /// Human-facing identifier for diagnostics and snapshots.
    pub fn identifier(&self) -> String {
        match self {
            TrackedRegistration::Event { event, name } => {
                format!("{event}{EVENT_ID_SEPARATOR}{name}")
            }
            TrackedRegistration::Timer { id } => id.clone(),
        }
    }
}

/// Wraps the host's event and timer subsystems for one test's lifetime.
pub struct SideEffectTracker {
    events: SharedEvents,
    timers: SharedTimers,
    tracked: Mutex<Vec<TrackedRegistration>>,
    timer_prefix: String,
}

impl SideEffectTracker {
    pub fn new(events: SharedEvents, timers: SharedTimers, timer_prefix: impl Into<String>) -> Self {
        SideEffectTracker {
            events,
            timers,
            tracked: Mutex::new(Vec::new()),
            timer_prefix: timer_prefix.into(),
        }
    }

    /// Registers an event handler through the real subsystem and records
    /// the registration. Raises when `callback` is not callable.
    #[track_caller]
    pub fn register(&self, event: &str, name: &str, callback: &Value) {
        let cb = match callback.as_callback() {
            Some(cb) => cb,
            None => trace::raise(format!(
                "attempt to register a {} value as an event handler",
                callback.type_name()
            )),
        };
        lock(&self.events).register(event, name, cb);
        self.track(TrackedRegistration::Event {
            event: event.to_string(),
            name: name.to_string(),
        });
    }

    /// Creates a timer through the real subsystem and records it.
    /// `repetitions == 0` means unlimited. Raises when `callback` is not
    /// callable.
    #[track_caller]
    pub fn create_timer(&self, id: &str, delay_secs: f64, repetitions: u32, callback: &Value) {
        let cb = match callback.as_callback() {
            Some(cb) => cb,
            None => trace::raise(format!(
                "attempt to schedule a {} value as a timer callback",
                callback.type_name()
            )),
        };
        lock(&self.timers).create(id, delay_secs, repetitions, cb);
        self.track(TrackedRegistration::Timer { id: id.to_string() });
    }

    /// Schedules a one-shot timer under a synthesized identifier so it
    /// is tracked transparently. Returns the identifier.
    #[track_caller]
    pub fn schedule_once(&self, delay_secs: f64, callback: &Value) -> String {
        let n = NEXT_SYNTHESIZED_ID.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}{}", self.timer_prefix, n);
        self.create_timer(&id, delay_secs, 1, callback);
        id
    }

    fn track(&self, registration: TrackedRegistration) {
        lock(&self.tracked).push(registration);
    }

    /// A persistent snapshot of what is currently tracked, keyed by
    /// identifier. Cheap to clone; used by diagnostics and tests.
    pub fn snapshot(&self) -> im::HashMap<String, Category> {
        lock(&self.tracked)
            .iter()
            .map(|r| (r.identifier(), r.category()))
            .collect()
    }

    pub fn tracked_count(&self) -> usize {
        lock(&self.tracked).len()
    }

    /// Reverses every tracked registration against the real subsystems,
    /// in registration order. The list is drained first, so calling
    /// again is a no-op; a registration left behind would be a
    /// correctness defect, so reversal is exhaustive.
    pub fn revert(&self) {
        let drained: Vec<TrackedRegistration> = lock(&self.tracked).drain(..).collect();
        if drained.is_empty() {
            return;
        }
        tracing::debug!(count = drained.len(), "reversing tracked registrations");
        for registration in drained {
            match registration {
                TrackedRegistration::Event { event, name } => {
                    lock(&self.events).remove(&event, &name);
                }
                TrackedRegistration::Timer { id } => {
                    lock(&self.timers).remove(&id);
                }
            }
        }
    }
}
