//! Static configuration constants for the aspect weaver.

/// Filename suffix marking aspect-definition files.
///
/// Files with this suffix are excluded from matching, from rewriting and
/// from tree assembly.
pub const ASPECT_FILE_SUFFIX: &str = "_aspect.rs";

/// Reserved module name under which the woven aspect file is emitted.
pub const GENERATED_ASPECT_MODULE: &str = "agaspect";

/// Reserved module name under which the runtime support module is emitted.
pub const RUNTIME_MODULE: &str = "agrt";

/// Final path segment of a target denoting "this directory and everything
/// reachable beneath it".
pub const RECURSION_MARKER: &str = "...";

/// Header prepended to every generated file.
pub const AUTOGEN_FILE_HEADER: &str = "// Code generated by aspect-weaver. DO NOT EDIT.\n";

/// Prefix for generated proxy function names. The run-scoped counter is
/// appended, e.g. `_ag_proxy_0`.
pub const PROXY_NAME_PREFIX: &str = "_ag_proxy_";

/// Prefix for generated accessor function names. The full proxy name is
/// appended, e.g. `_ag_pgen_ag_proxy_0`.
pub const ACCESSOR_NAME_PREFIX: &str = "_ag_pgen";

/// Source of the runtime support module, embedded so the pointcut probe and
/// the rewrite driver can materialize it without access to this crate's
/// own sources.
pub const RUNTIME_SOURCE: &str = include_str!("rt.rs");

/// Default output root for woven trees when the CLI is given none.
pub const DEFAULT_WOVEN_ROOT: &str = "/tmp/woven";
