//! Core data structures for the weaver.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{ACCESSOR_NAME_PREFIX, PROXY_NAME_PREFIX};

/// How a method takes its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiverKind {
    /// `&self`
    Shared,
    /// `&mut self`
    Exclusive,
    /// `self`
    Owned,
}

/// The receiver slot of a method signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverInfo {
    pub kind: ReceiverKind,
    /// Declared receiver type, without the borrow, e.g. `Greeter`.
    pub ty: String,
}

/// One ordered parameter of a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// Original binding name when it is a plain identifier.
    pub name: Option<String>,
    /// Parameter type as written, e.g. `String`, `&str`, `Vec<u32>`.
    pub ty: String,
}

/// Type signature of a function or method symbol, as reported by the
/// resolver adapter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FnSig {
    /// Receiver, or None for free functions.
    pub receiver: Option<ReceiverInfo>,
    /// Ordered non-receiver parameters.
    pub params: Vec<Param>,
    /// The symbol is variadic (extern-"C" `...`). Variadic symbols have no
    /// fixed-arity proxy and are never woven; the matcher skips them.
    pub variadic: bool,
    /// Ordered result types. Empty for unit, one entry per tuple element
    /// for tuple-returning symbols.
    pub results: Vec<String>,
}

impl FnSig {
    pub fn is_method(&self) -> bool {
        self.receiver.is_some()
    }
}

/// A function or method symbol bound by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Fully-qualified name, e.g. `crate::util::sayhello` or
    /// `crate::greet::Greeter::hello`.
    pub qualified: String,
    pub sig: FnSig,
}

/// Start position of an expression, as (1-based line, 0-based column).
pub type SiteKey = (usize, usize);

/// Shape of a matched use in target source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    /// `Expr::Path`: a free-function reference, called or taken as a
    /// value.
    Path,
    /// `Expr::MethodCall`: an inherent-method call through a receiver.
    MethodCall,
}

/// An identifier/selector use bound to a function or method symbol.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub file: PathBuf,
    pub key: SiteKey,
    pub kind: SiteKind,
    /// Whether the receiver expression's static type is reference-kind.
    /// Drives the address-of / dereference fix-up. Always false for free
    /// functions.
    pub receiver_is_ref: bool,
}

/// A call-site paired with the aspect whose matcher accepted it.
#[derive(Debug, Clone)]
pub struct Match {
    pub site: CallSite,
    pub symbol: Symbol,
    /// Declared name of the accepting aspect type.
    pub aspect: String,
    /// Other accepting aspects overridden at this site, in registration
    /// order. Non-empty exactly when a conflict warning was emitted.
    pub overridden: Vec<String>,
}

/// An aspect declaration discovered in the aspect file, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AspectDecl {
    pub name: String,
}

/// An aspect whose pointcut has been resolved and compiled.
#[derive(Debug)]
pub struct CompiledAspect {
    pub name: String,
    /// The resolved pointcut pattern, kept for diagnostics.
    pub pointcut: String,
    pub matcher: regex::Regex,
}

impl CompiledAspect {
    /// Pure predicate over fully-qualified symbol names.
    pub fn accepts(&self, qualified: &str) -> bool {
        self.matcher.is_match(qualified)
    }
}

/// Ordered list of output file paths produced by one weaving run. Empty
/// iff no match exists anywhere in the target.
#[derive(Debug, Default)]
pub struct RewriteManifest {
    pub files: Vec<PathBuf>,
}

impl RewriteManifest {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn push(&mut self, path: PathBuf) {
        self.files.push(path);
    }

    pub fn extend(&mut self, other: RewriteManifest) {
        self.files.extend(other.files);
    }
}

/// Generation context for synthesized names: a run-scoped monotonic
/// counter, threaded explicitly through every synthesis call so names are
/// unique across every rewritten file in one weave.
#[derive(Debug, Default)]
pub struct GenContext {
    next: usize,
}

impl GenContext {
    pub fn new() -> GenContext {
        GenContext::default()
    }

    /// Reserve the next proxy/accessor name pair.
    pub fn fresh(&mut self) -> (String, String) {
        let proxy = format!("{}{}", PROXY_NAME_PREFIX, self.next);
        let accessor = format!("{}{}", ACCESSOR_NAME_PREFIX, proxy);
        self.next += 1;
        (proxy, accessor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gen_context_names_are_monotonic() {
        let mut gcx = GenContext::new();
        let (p0, a0) = gcx.fresh();
        let (p1, a1) = gcx.fresh();
        assert_eq!(p0, "_ag_proxy_0");
        assert_eq!(a0, "_ag_pgen_ag_proxy_0");
        assert_eq!(p1, "_ag_proxy_1");
        assert_eq!(a1, "_ag_pgen_ag_proxy_1");
    }

    #[test]
    fn test_compiled_aspect_accepts() {
        let asp = CompiledAspect {
            name: "Logger".to_string(),
            pointcut: "sayhello$".to_string(),
            matcher: regex::Regex::new("sayhello$").unwrap(),
        };
        assert!(asp.accepts("crate::util::sayhello"));
        assert!(!asp.accepts("crate::util::sayhello_twice"));
    }
}
