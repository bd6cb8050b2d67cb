//! Host collaborator interfaces.
//!
//! The harness never reaches for the real event or timer subsystems as
//! ambient globals; both are injected behind these traits so the
//! harness's own tests can substitute fakes. The in-memory
//! implementations here double as those fakes and as a usable default
//! for embedders without a real host.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::lock;
use crate::value::Value;

/// A plain callable the host subsystems accept.
pub type Callback = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// The host's event-registration surface.
///
/// `remove` must be idempotent and accept names it did not itself create
/// without erroring; teardown scans only names the tracker recorded.
pub trait EventSubsystem: Send {
    fn register(&mut self, event: &str, name: &str, callback: Callback);
    fn remove(&mut self, event: &str, name: &str);
}

/// The host's timer-scheduling surface, same idempotency requirement.
pub trait TimerSubsystem: Send {
    fn create(&mut self, id: &str, delay_secs: f64, repetitions: u32, callback: Callback);
    fn remove(&mut self, id: &str);
}

pub type SharedEvents = Arc<Mutex<dyn EventSubsystem>>;
pub type SharedTimers = Arc<Mutex<dyn TimerSubsystem>>;

// ============================================================================
// IN-MEMORY IMPLEMENTATIONS
// ============================================================================

/// In-memory event subsystem keyed by `(event, name)`.
#[derive(Default)]
pub struct EventHub {
    handlers: HashMap<(String, String), Callback>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, event: &str, name: &str) -> bool {
        self.handlers
            .contains_key(&(event.to_string(), name.to_string()))
    }

    pub fn registration_count(&self) -> usize {
        self.handlers.len()
    }

    fn handlers_for(&self, event: &str) -> Vec<Callback> {
        self.handlers
            .iter()
            .filter(|((e, _), _)| e == event)
            .map(|(_, cb)| Arc::clone(cb))
            .collect()
    }
}

impl EventSubsystem for EventHub {
    fn register(&mut self, event: &str, name: &str, callback: Callback) {
        self.handlers
            .insert((event.to_string(), name.to_string()), callback);
    }

    fn remove(&mut self, event: &str, name: &str) {
        self.handlers.remove(&(event.to_string(), name.to_string()));
    }
}

/// Dispatches an event to every registered handler.
///
/// Handlers run after the hub lock is released; a handler registering or
/// removing entries through the same hub must not deadlock.
pub fn emit_event(hub: &Arc<Mutex<EventHub>>, event: &str, args: &[Value]) {
    let handlers = lock(hub).handlers_for(event);
    for cb in handlers {
        cb(args);
    }
}

struct TimerEntry {
    callback: Callback,
    /// None means unlimited repetitions.
    remaining: Option<u32>,
}

/// In-memory timer subsystem, driven manually by [`fire_timer`].
///
/// Scheduling is single-threaded cooperative: nothing fires until the
/// embedder (or a test) drives it.
#[derive(Default)]
pub struct TimerWheel {
    timers: HashMap<String, TimerEntry>,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_scheduled(&self, id: &str) -> bool {
        self.timers.contains_key(id)
    }

    pub fn scheduled_count(&self) -> usize {
        self.timers.len()
    }

    /// Consumes one repetition of `id`, removing the timer when its
    /// repetitions are exhausted. Returns the callback to invoke.
    fn take_shot(&mut self, id: &str) -> Option<Callback> {
        let entry = self.timers.get_mut(id)?;
        let cb = Arc::clone(&entry.callback);
        match entry.remaining {
            Some(1) => {
                self.timers.remove(id);
            }
            Some(ref mut n) => *n -= 1,
            None => {}
        }
        Some(cb)
    }
}

impl TimerSubsystem for TimerWheel {
    fn create(&mut self, id: &str, _delay_secs: f64, repetitions: u32, callback: Callback) {
        let remaining = if repetitions == 0 {
            None
        } else {
            Some(repetitions)
        };
        self.timers
            .insert(id.to_string(), TimerEntry { callback, remaining });
    }

    fn remove(&mut self, id: &str) {
        self.timers.remove(id);
    }
}

/// Fires one repetition of a scheduled timer, invoking its callback with
/// the wheel lock released. Returns false when no such timer exists.
pub fn fire_timer(wheel: &Arc<Mutex<TimerWheel>>, id: &str) -> bool {
    let cb = lock(wheel).take_shot(id);
    match cb {
        Some(cb) => {
            cb(&[]);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_callback() -> (Callback, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let cb: Callback = Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (cb, hits)
    }

    #[test]
    fn remove_is_idempotent_and_tolerant() {
        let mut hub = EventHub::new();
        let (cb, _) = counting_callback();
        hub.register("PLAYER_LOGIN", "probe", cb);
        hub.remove("PLAYER_LOGIN", "probe");
        hub.remove("PLAYER_LOGIN", "probe");
        hub.remove("PLAYER_LOGIN", "never-registered");
        assert_eq!(hub.registration_count(), 0);
    }

    #[test]
    fn single_shot_timer_unschedules_after_firing() {
        let wheel = Arc::new(Mutex::new(TimerWheel::new()));
        let (cb, hits) = counting_callback();
        lock(&wheel).create("t1", 0.5, 1, cb);
        assert!(fire_timer(&wheel, "t1"));
        assert!(!fire_timer(&wheel, "t1"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!lock(&wheel).is_scheduled("t1"));
    }

    #[test]
    fn repeating_timer_counts_down() {
        let wheel = Arc::new(Mutex::new(TimerWheel::new()));
        let (cb, hits) = counting_callback();
        lock(&wheel).create("t2", 1.0, 2, cb);
        assert!(fire_timer(&wheel, "t2"));
        assert!(fire_timer(&wheel, "t2"));
        assert!(!fire_timer(&wheel, "t2"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn handler_may_reschedule_without_deadlock() {
        let wheel = Arc::new(Mutex::new(TimerWheel::new()));
        let inner = Arc::clone(&wheel);
        let cb: Callback = Arc::new(move |_| {
            lock(&inner).create("follow-up", 0.1, 1, Arc::new(|_| {}));
        });
        lock(&wheel).create("t3", 0.1, 1, cb);
        assert!(fire_timer(&wheel, "t3"));
        assert!(lock(&wheel).is_scheduled("follow-up"));
    }
}
