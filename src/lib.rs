//! Aspect Weaver - Build-time call-site weaving for Rust sources.
//!
//! This crate takes a target source tree plus one aspect file and
//! produces a woven copy of the tree in which every call-site matched by
//! an aspect's pointcut is routed through that aspect's advice.

// Core data model and static configuration
pub mod constants;
pub mod debug_log;
pub mod error;
pub mod types;

// Aspect-side pipeline: discovery and pointcut resolution
pub mod registry;
pub mod pointcut;

// Target-side pipeline: symbol binding, matching, rewriting
pub mod resolve;
pub mod matcher;
pub mod rewrite;
pub mod weave;

// Output-side pipeline: tree assembly and the phase driver
pub mod fixup;
pub mod compiler;

// Runtime support module. Compiled into this crate for its own tests;
// woven trees receive it as an embedded source copy.
pub mod rt;

// Re-exports for public API
pub use compiler::{expand_target, Weaver};
pub use error::{Result, WeaveError};
pub use registry::{parse_aspect_file, AspectFile};
pub use resolve::{Resolver, SynResolver, SymbolTable, TableResolver};
pub use types::*;
