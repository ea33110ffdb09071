//! Error taxonomy for the weaver.
//!
//! Everything here aborts the whole weave: a partial weave is never
//! surfaced as success. Match conflicts are the one recoverable anomaly and
//! are logged by the matcher instead of reported here.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WeaveError>;

#[derive(Debug, Error)]
pub enum WeaveError {
    /// Missing or invalid target / aspect-file specification.
    #[error("invalid arguments: {0}")]
    Argument(String),

    /// The aspect file violates the single-file / no-entry-point /
    /// reference-binding constraints.
    #[error("aspect file {file}: {reason}")]
    AspectShape { file: PathBuf, reason: String },

    /// The synthesized pointcut probe failed to compile, run, or produced
    /// an unparseable pattern.
    #[error("pointcut resolution failed for aspect `{aspect}`: {reason}")]
    PointcutResolution { aspect: String, reason: String },

    /// Materialization of the woven tree failed.
    #[error("tree assembly failed: {0}")]
    TreeAssembly(String),

    /// A target or aspect source file did not parse.
    #[error("parse error in {file}: {source}")]
    Parse {
        file: PathBuf,
        source: syn::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Terminate the process on a rewrite invariant violation.
///
/// An assumed syntactic shape was absent: this is a defect in the weaving
/// logic, not a user data problem, so it is never caught or retried.
#[macro_export]
macro_rules! invariant_violation {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        eprintln!("[aspect-weaver] rewrite invariant violation: {}", msg);
        $crate::debug_log!("rewrite invariant violation: {}", msg);
        std::process::exit(70);
    }};
}
