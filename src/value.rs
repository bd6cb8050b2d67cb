use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::host::Callback;
use crate::stub::StubHandle;
use crate::trace;

/// A native callable held by a [`Value::Func`].
///
/// Callables signal failure the same way test code does: by raising
/// (panicking) with a message. The harness catches raises at the fiber
/// boundary, and the call-based matchers catch them with a protected
/// invocation, so a raising callable never unwinds past the harness.
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// A value visible to sandboxed test code.
///
/// Subjects of expectations, locals reported in failure messages, and
/// callbacks handed to the tracked facade are all `Value`s.
///
/// # Examples
///
/// ```rust
/// use cordon::value::Value;
/// let n = Value::from(3);
/// assert_eq!(n.type_name(), "Number");
/// assert_eq!(n.to_string(), "3");
/// assert!(Value::default().is_nil());
/// ```
#[derive(Clone, Default)]
pub enum Value {
    /// The absent value.
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
    /// A handle to host-owned data; live while the [`Anchor`] it was
    /// created from is still alive.
    Ref(Weak<Mutex<Value>>),
    Func(NativeFn),
    /// A mocked callable produced by a stub factory.
    Stub(StubHandle),
}

impl Value {
    /// Returns the type name of the value as a string.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::Str(_) => "String",
            Value::Ref(_) => "Ref",
            Value::Func(_) => "Func",
            Value::Stub(_) => "Stub",
        }
    }

    /// Returns true if the value is Nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Returns the contained number if this is a Number value.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns true if this is a reference whose anchor is still alive.
    pub fn is_live_ref(&self) -> bool {
        match self {
            Value::Ref(weak) => weak.upgrade().is_some(),
            _ => false,
        }
    }

    /// Returns true if this is a reference whose anchor has been dropped.
    pub fn is_dead_ref(&self) -> bool {
        match self {
            Value::Ref(weak) => weak.upgrade().is_none(),
            _ => false,
        }
    }

    /// Invokes the value as a callable.
    ///
    /// Raises `attempt to call a <type> value` when the value is not
    /// callable, attributed to the caller's source location.
    #[track_caller]
    pub fn invoke(&self, args: &[Value]) -> Value {
        match self {
            Value::Func(f) => f(args),
            Value::Stub(handle) => handle.invoke(args),
            other => trace::raise(format!("attempt to call a {} value", other.type_name())),
        }
    }

    /// Adapts the value into a plain callback for the host subsystems.
    ///
    /// Stubs are wrapped in a plain invocable adapter because the real
    /// subsystems may reject non-callable objects.
    pub fn as_callback(&self) -> Option<Callback> {
        match self {
            Value::Func(f) => {
                let f = Arc::clone(f);
                Some(Arc::new(move |args: &[Value]| {
                    f(args);
                }))
            }
            Value::Stub(handle) => {
                let handle = handle.clone();
                Some(Arc::new(move |args: &[Value]| {
                    handle.invoke(args);
                }))
            }
            _ => None,
        }
    }

    /// The textual representation embedded in failure messages and locals.
    pub fn repr(&self) -> String {
        self.to_string()
    }

    /// Wraps a plain closure as a callable value.
    pub fn func(f: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Value {
        Value::Func(Arc::new(f))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Str(s) => write!(f, "{}", s),
            Value::Ref(weak) => {
                if weak.upgrade().is_some() {
                    write!(f, "ref")
                } else {
                    write!(f, "dead ref")
                }
            }
            Value::Func(_) => write!(f, "function"),
            Value::Stub(_) => write!(f, "stub"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name(), self)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            (Value::Func(a), Value::Func(b)) => Arc::ptr_eq(a, b),
            (Value::Stub(a), Value::Stub(b)) => a.same(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

/// Keeps a [`Value::Ref`] alive; dropping the anchor invalidates every
/// reference created from it.
///
/// # Examples
///
/// ```rust
/// use cordon::value::{Anchor, Value};
/// let anchor = Anchor::new(Value::from(1));
/// let r = anchor.reference();
/// assert!(r.is_live_ref());
/// drop(anchor);
/// assert!(r.is_dead_ref());
/// ```
pub struct Anchor(Arc<Mutex<Value>>);

impl Anchor {
    pub fn new(value: Value) -> Self {
        Anchor(Arc::new(Mutex::new(value)))
    }

    /// A reference value that stays live only as long as this anchor.
    pub fn reference(&self) -> Value {
        Value::Ref(Arc::downgrade(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_numbers_print_without_fraction() {
        assert_eq!(Value::from(2).to_string(), "2");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
    }

    #[test]
    fn func_equality_is_identity() {
        let a = Value::func(|_| Value::Nil);
        let b = Value::func(|_| Value::Nil);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn dead_ref_after_anchor_drop() {
        let anchor = Anchor::new(Value::from("payload"));
        let r = anchor.reference();
        assert!(r.is_live_ref());
        drop(anchor);
        assert!(r.is_dead_ref());
        assert_eq!(r.to_string(), "dead ref");
    }

    #[test]
    fn stub_adapts_to_plain_callback() {
        let mut factory = crate::stub::RecordingStubs::default();
        let stub = crate::stub::StubFactory::make_stub(&mut factory);
        let cb = stub.as_callback().unwrap();
        cb(&[]);
        match stub {
            Value::Stub(handle) => assert_eq!(handle.call_count(), 1),
            _ => unreachable!(),
        }
    }
}
