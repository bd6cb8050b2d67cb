//! Sandbox environment composition.
//!
//! A [`Harness`] owns the injected host collaborators and composes, per
//! test invocation, the environment the test executes under: a layered
//! scope, the tracked side-effect facade, the stub factory, and the
//! expectation builder — paired with a cleanup guard that reverses
//! everything exactly once.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::HarnessConfig;
use crate::env::Scope;
use crate::expect::{Expectation, FailSink};
use crate::host::{SharedEvents, SharedTimers};
use crate::lock;
use crate::stub::SharedStubs;
use crate::trace::SiteRef;
use crate::tracker::SideEffectTracker;
use crate::value::Value;

/// The environment flavors the composer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// A regular test case.
    Plain,
    /// The group-level `before` callback; identical layering, but its
    /// scope becomes the parent of each case's scope.
    GroupSetup,
    /// Completion signalled via `done`/`fail`; `expect` captures instead
    /// of raising.
    Async,
}

/// Observable extension point: emitted once per environment creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    SandboxCreated { flavor: Flavor },
}

pub type Observer = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// The harness: injected host collaborators plus configuration, from
/// which sandbox environments are composed.
pub struct Harness {
    pub events: SharedEvents,
    pub timers: SharedTimers,
    pub stubs: SharedStubs,
    pub config: Arc<HarnessConfig>,
    observers: Mutex<Vec<Observer>>,
}

impl Harness {
    pub fn new(events: SharedEvents, timers: SharedTimers, stubs: SharedStubs) -> Self {
        Harness {
            events,
            timers,
            stubs,
            config: Arc::new(HarnessConfig::default()),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Registers a lifecycle observer (external reporting/plugin code).
    pub fn add_observer(&self, observer: Observer) {
        lock(&self.observers).push(observer);
    }

    pub(crate) fn notify(&self, event: LifecycleEvent) {
        for observer in lock(&self.observers).iter() {
            observer(&event);
        }
    }

    /// Composes a sandbox of the given flavor with a fresh root scope.
    pub fn sandbox(&self, flavor: Flavor) -> (Sandbox, Cleanup) {
        self.sandbox_with_parent(flavor, None)
    }

    /// Composes a sandbox whose scope reads through to `parent` (the
    /// case-state inheritance used under a group).
    pub fn sandbox_with_parent(&self, flavor: Flavor, parent: Option<&Scope>) -> (Sandbox, Cleanup) {
        let scope = match parent {
            Some(parent) => parent.child(),
            None => Scope::root(),
        };
        let tracker = Arc::new(SideEffectTracker::new(
            Arc::clone(&self.events),
            Arc::clone(&self.timers),
            self.config.timer_prefix.clone(),
        ));
        let sandbox = Sandbox {
            scope,
            tracker: Arc::clone(&tracker),
            stubs: Arc::clone(&self.stubs),
            config: Arc::clone(&self.config),
            assertions: Arc::new(AtomicUsize::new(0)),
        };
        let cleanup = Cleanup {
            tracker,
            stubs: Arc::clone(&self.stubs),
            done: AtomicBool::new(false),
        };
        self.notify(LifecycleEvent::SandboxCreated { flavor });
        (sandbox, cleanup)
    }
}

/// The environment one test invocation executes against. Cloning shares
/// the underlying scope, tracker, and counters.
#[derive(Clone)]
pub struct Sandbox {
    scope: Scope,
    tracker: Arc<SideEffectTracker>,
    stubs: SharedStubs,
    config: Arc<HarnessConfig>,
    assertions: Arc<AtomicUsize>,
}

impl Sandbox {
    /// The layered binding scope; what the test declares here is what
    /// failure reports list as locals.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Builds an expectation over `subject` with the sandbox's fail
    /// sink, counting the evaluation for empty-test detection.
    #[track_caller]
    pub fn expect(&self, subject: impl Into<Value>) -> Expectation {
        self.assertions.fetch_add(1, Ordering::SeqCst);
        Expectation::with_sink(subject.into(), FailSink::Raise, SiteRef::caller())
    }

    /// A fresh mocked callable from the stub factory.
    pub fn stub(&self) -> Value {
        lock(&self.stubs).make_stub()
    }

    /// Tracked event registration; reversed at cleanup.
    #[track_caller]
    pub fn register(&self, event: &str, name: &str, callback: &Value) {
        self.tracker.register(event, name, callback);
    }

    /// Tracked timer creation; reversed at cleanup.
    #[track_caller]
    pub fn create_timer(&self, id: &str, delay_secs: f64, repetitions: u32, callback: &Value) {
        self.tracker.create_timer(id, delay_secs, repetitions, callback);
    }

    /// Tracked one-shot timer under a synthesized identifier.
    #[track_caller]
    pub fn schedule_once(&self, delay_secs: f64, callback: &Value) -> String {
        self.tracker.schedule_once(delay_secs, callback)
    }

    pub fn assertions_evaluated(&self) -> usize {
        self.assertions.load(Ordering::SeqCst)
    }

    pub(crate) fn tracker(&self) -> &Arc<SideEffectTracker> {
        &self.tracker
    }

    pub(crate) fn config(&self) -> &Arc<HarnessConfig> {
        &self.config
    }

    pub(crate) fn stubs_handle(&self) -> &SharedStubs {
        &self.stubs
    }
}

/// Reverses a sandbox's side effects: tracker reversal plus stub factory
/// reset. Runs exactly once — explicitly via [`run`](Cleanup::run), or
/// on drop as a backstop.
pub struct Cleanup {
    tracker: Arc<SideEffectTracker>,
    stubs: SharedStubs,
    done: AtomicBool,
}

impl Cleanup {
    pub fn run(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        self.tracker.revert();
        lock(&self.stubs).reset();
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        self.run();
    }
}
