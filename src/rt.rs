//! Runtime support for woven programs.
//!
//! This module is emitted verbatim into every woven tree (as `agrt`) and
//! compiled as a standalone crate by the pointcut probe, so it must stay
//! self-contained over std. Do NOT access the `Context` fields from an
//! aspect file; generated proxies construct them.

use std::any::type_name;
use std::any::Any;

/// The opaque dynamic value passed through advice. Narrow it back with
/// [`unbox`] or inspect it in place with [`peek`].
pub type Value = Box<dyn Any>;

/// Box a statically typed value.
pub fn boxed<T: Any>(v: T) -> Value {
    Box::new(v)
}

/// Checked narrowing back to a static type. A mismatch is a reported
/// error, never undefined behavior.
pub fn unbox<T: Any>(v: Value, what: &str) -> T {
    match v.downcast::<T>() {
        Ok(b) => *b,
        Err(_) => panic!(
            "aspect runtime: cannot narrow {} to {}",
            what,
            type_name::<T>()
        ),
    }
}

/// Borrow a boxed value as a static type, if it has that type.
pub fn peek<T: Any>(v: &Value) -> Option<&T> {
    v.downcast_ref::<T>()
}

/// The pointcut for an aspect, produced at weave time by running the
/// aspect's `pointcut()` in isolation. Interpreted as a regular expression
/// over fully-qualified symbol names such as `crate::module::function` and
/// `crate::module::Type::method`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pointcut(String);

impl Pointcut {
    /// A "call" pointcut: matches call-sites of symbols whose
    /// fully-qualified name matches the regex.
    pub fn call(pattern: &str) -> Pointcut {
        Pointcut(pattern.to_string())
    }

    /// An "execution" pointcut (interception on entry to a function body).
    /// Not implemented.
    pub fn execution(_pattern: &str) -> Pointcut {
        panic!("\"execution\" pointcut is not implemented yet")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Pointcut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The receiver of a woven call, as visible to advice.
///
/// Exclusive (`&mut self` / by-value `self`) receivers are owned by the
/// forwarding thunk and cannot also be exposed here under Rust aliasing
/// rules; they are reported as `Exclusive`.
pub enum Receiver<'a> {
    /// The matched symbol is a free function.
    None,
    /// A `&self` method: the original receiver value.
    Shared(&'a dyn Any),
    /// A `&mut self` or by-value `self` method: the receiver is reachable
    /// only through the forwarding thunk.
    Exclusive,
}

impl<'a> Receiver<'a> {
    pub fn is_none(&self) -> bool {
        matches!(self, Receiver::None)
    }

    /// Borrow a shared receiver as a static type, if it has that type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Receiver::Shared(r) => r.downcast_ref::<T>(),
            _ => None,
        }
    }
}

type Thunk<'a> = Box<dyn FnMut(Vec<Value>) -> Vec<Value> + 'a>;

/// The joinpoint context handed to advice.
pub struct Context<'a> {
    args: Vec<Value>,
    thunk: Thunk<'a>,
    receiver: Receiver<'a>,
}

impl<'a> Context<'a> {
    /// Construct a context. Called from generated proxies only.
    pub fn new(args: Vec<Value>, thunk: Thunk<'a>, receiver: Receiver<'a>) -> Context<'a> {
        Context {
            args,
            thunk,
            receiver,
        }
    }

    /// The original argument sequence, in call order. Empty after
    /// [`proceed`](Context::proceed) or [`take_args`](Context::take_args)
    /// has moved the values out.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Move the original arguments out of the context.
    pub fn take_args(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.args)
    }

    /// Invoke the original symbol with the given boxed arguments and
    /// return its boxed results. Length and element types must match the
    /// symbol's signature; a mismatch is reported by the thunk.
    pub fn call(&mut self, args: Vec<Value>) -> Vec<Value> {
        (self.thunk)(args)
    }

    /// Forward the call unchanged: invoke the original symbol with the
    /// original arguments.
    pub fn proceed(&mut self) -> Vec<Value> {
        let args = self.take_args();
        self.call(args)
    }

    /// The receiver of the call, or [`Receiver::None`] for free functions.
    pub fn receiver(&self) -> &Receiver<'a> {
        &self.receiver
    }
}

/// An aspect: a pointcut selecting call-sites, and the "around" advice run
/// in their place. `Default` is a supertrait because woven code constructs
/// a fresh aspect value per intercepted invocation.
pub trait Aspect: Default {
    /// Returns the pointcut. Executed once, at weave time, in isolation.
    fn pointcut(&self) -> Pointcut;

    /// The "around" advice. Return the (possibly altered) result sequence;
    /// its length and element types must match the matched symbol's result
    /// types.
    fn advice(&mut self, ctx: &mut Context<'_>) -> Vec<Value>;
}
