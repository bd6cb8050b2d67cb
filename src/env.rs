//! Layered lookup scopes.
//!
//! A sandbox environment is a chain of binding layers resolved
//! innermost-first: a case's own bindings, then the group state installed
//! by a `before` callback, then whatever ambient layer the embedder
//! supplies. Writes always land in the innermost layer, so mutating a
//! case's binding never mutates the group's.

use std::sync::{Arc, Mutex};

use crate::lock;
use crate::value::Value;

/// Binding names carrying this prefix are harness-internal and are never
/// reported as locals.
pub const INTERNAL_BINDING_PREFIX: &str = "__";

struct ScopeInner {
    // Declaration order is preserved so locals can be reported in the
    // order the test introduced them.
    slots: Mutex<Vec<(String, Value)>>,
    parent: Option<Scope>,
}

/// One layer of a sandbox environment, linked to its parent layer.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// A fresh scope with no parent.
    pub fn root() -> Self {
        Scope {
            inner: Arc::new(ScopeInner {
                slots: Mutex::new(Vec::new()),
                parent: None,
            }),
        }
    }

    /// A child layer that reads through to `self` for any name it does
    /// not define.
    pub fn child(&self) -> Self {
        Scope {
            inner: Arc::new(ScopeInner {
                slots: Mutex::new(Vec::new()),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Declares (or overwrites) a binding in this layer only.
    pub fn declare(&self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        let mut slots = lock(&self.inner.slots);
        if let Some(slot) = slots.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            slots.push((name, value));
        }
    }

    /// Resolves a name by walking the chain innermost-first.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            if let Some((_, v)) = lock(&scope.inner.slots).iter().find(|(n, _)| n == name) {
                return Some(v.clone());
            }
            current = scope.inner.parent.clone();
        }
        None
    }

    /// Like [`lookup`](Self::lookup) but yields the absent value instead
    /// of `None`.
    pub fn get(&self, name: &str) -> Value {
        self.lookup(name).unwrap_or_default()
    }

    /// Assigns to the nearest layer already defining `name`; declares
    /// locally when no layer does.
    pub fn assign(&self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            let mut slots = lock(&scope.inner.slots);
            if let Some(slot) = slots.iter_mut().find(|(n, _)| *n == name) {
                slot.1 = value;
                return;
            }
            drop(slots);
            current = scope.inner.parent.clone();
        }
        self.declare(name, value);
    }

    /// True when this layer (not a parent) defines `name`.
    pub fn defines_locally(&self, name: &str) -> bool {
        lock(&self.inner.slots).iter().any(|(n, _)| n == name)
    }

    /// The reportable locals of this layer: declaration order, internal
    /// bindings skipped, values rendered as text.
    pub fn locals_snapshot(&self) -> Vec<(String, String)> {
        lock(&self.inner.slots)
            .iter()
            .filter(|(name, _)| !name.starts_with(INTERNAL_BINDING_PREFIX))
            .map(|(name, value)| (name.clone(), value.repr()))
            .collect()
    }
}
