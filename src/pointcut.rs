//! Pointcut resolution.
//!
//! A pointcut's value may be the output of arbitrary Rust computation, not
//! a literal, so the only general way to obtain it is to run that
//! computation: materialize the aspect file plus a synthesized probe
//! program in a scratch directory, compile and run it as an isolated
//! subprocess, and read the pointcut string back from a result file.
//!
//! One resolution attempt per aspect, run sequentially, no timeout: a hang
//! in the aspect's own computation blocks the whole weave.

use std::fs;
use std::path::Path;
use std::process::Command;

use crate::constants::{AUTOGEN_FILE_HEADER, RUNTIME_SOURCE};
use crate::debug_log;
use crate::error::{Result, WeaveError};
use crate::registry::AspectFile;
use crate::types::CompiledAspect;

const RESULT_FILE: &str = "result.txt";
const PROBE_BIN: &str = "pointcut_probe";

/// Resolve and compile the pointcut of every aspect in the file, in
/// registration order.
pub fn resolve_pointcuts(af: &AspectFile) -> Result<Vec<CompiledAspect>> {
    let mut compiled = Vec::new();
    for decl in &af.aspects {
        let pattern = resolve_one(af, &decl.name)?;
        debug_log!("aspect {} resolved pointcut: {}", decl.name, pattern);
        compiled.push(compile_matcher(&decl.name, &pattern)?);
    }
    Ok(compiled)
}

/// Compile a resolved pointcut string into a matcher. An invalid pattern
/// is a resolution error, not a silent skip.
pub fn compile_matcher(aspect: &str, pattern: &str) -> Result<CompiledAspect> {
    let matcher = regex::Regex::new(pattern).map_err(|e| WeaveError::PointcutResolution {
        aspect: aspect.to_string(),
        reason: format!("pointcut `{}` is not a valid regex: {}", pattern, e),
    })?;
    Ok(CompiledAspect {
        name: aspect.to_string(),
        pointcut: pattern.to_string(),
        matcher,
    })
}

/// Run one aspect's pointcut computation in isolation and return the
/// produced pattern. The scratch directory is removed on every exit path
/// (TempDir is drop-scoped).
fn resolve_one(af: &AspectFile, aspect_name: &str) -> Result<String> {
    let perr = |reason: String| WeaveError::PointcutResolution {
        aspect: aspect_name.to_string(),
        reason,
    };

    let dir = tempfile::Builder::new()
        .prefix("aspect-weaver-")
        .tempdir()
        .map_err(|e| perr(format!("cannot create scratch dir: {}", e)))?;

    fs::write(dir.path().join("agrt.rs"), RUNTIME_SOURCE)
        .map_err(|e| perr(format!("cannot materialize agrt.rs: {}", e)))?;
    fs::write(dir.path().join("aspect.rs"), &af.source)
        .map_err(|e| perr(format!("cannot materialize aspect.rs: {}", e)))?;
    fs::write(dir.path().join("main.rs"), harness_source(aspect_name))
        .map_err(|e| perr(format!("cannot materialize main.rs: {}", e)))?;

    run_rustc(
        dir.path(),
        &[
            "--edition",
            "2021",
            "--crate-type",
            "lib",
            "--crate-name",
            "agrt",
            "agrt.rs",
        ],
    )
    .map_err(perr)?;
    run_rustc(
        dir.path(),
        &[
            "--edition",
            "2021",
            "--crate-name",
            "pointcut_probe",
            "main.rs",
            "--extern",
            "agrt=libagrt.rlib",
            "-o",
            PROBE_BIN,
        ],
    )
    .map_err(perr)?;

    let output = Command::new(dir.path().join(PROBE_BIN))
        .arg(RESULT_FILE)
        .current_dir(dir.path())
        .output()
        .map_err(|e| perr(format!("cannot run pointcut probe: {}", e)))?;
    if !output.status.success() {
        return Err(perr(format!(
            "pointcut probe failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.is_empty() {
        debug_log!("pointcut probe stdout: {}", stdout);
    }

    fs::read_to_string(dir.path().join(RESULT_FILE))
        .map_err(|e| perr(format!("cannot read pointcut result: {}", e)))
}

fn run_rustc(dir: &Path, args: &[&str]) -> std::result::Result<(), String> {
    let output = Command::new("rustc")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| format!("cannot run rustc: {}", e))?;
    if !output.status.success() {
        return Err(format!(
            "rustc {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(())
}

/// The synthesized probe program. This is the one place where raw text
/// templating is used; everything the rewrite engine emits is built as
/// syntax trees.
fn harness_source(aspect_name: &str) -> String {
    format!(
        r#"{header}
#[path = "aspect.rs"]
mod aspect;

fn main() {{
    let mut args = std::env::args().skip(1);
    let out = match args.next() {{
        Some(p) => p,
        None => panic!("usage: {probe} <result-file>"),
    }};
    let asp = <aspect::{name} as ::core::default::Default>::default();
    let pointcut = agrt::Aspect::pointcut(&asp);
    if let Err(e) = std::fs::write(&out, pointcut.as_str()) {{
        panic!("cannot write pointcut result: {{}}", e);
    }}
}}
"#,
        header = AUTOGEN_FILE_HEADER,
        probe = PROBE_BIN,
        name = aspect_name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_instantiates_the_named_aspect() {
        let src = harness_source("LoggingAspect");
        assert!(src.contains("<aspect::LoggingAspect as ::core::default::Default>::default()"));
        assert!(src.contains("agrt::Aspect::pointcut"));
        assert!(src.starts_with("// Code generated by aspect-weaver."));
        // The harness itself parses as Rust.
        syn::parse_file(&src).unwrap();
    }

    #[test]
    fn test_invalid_pattern_is_a_resolution_error() {
        let err = compile_matcher("Bad", "(unclosed").unwrap_err();
        match err {
            WeaveError::PointcutResolution { aspect, reason } => {
                assert_eq!(aspect, "Bad");
                assert!(reason.contains("not a valid regex"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_valid_pattern_compiles() {
        let asp = compile_matcher("Ok", "crate::util::.*$").unwrap();
        assert!(asp.accepts("crate::util::sayhello"));
        assert_eq!(asp.pointcut, "crate::util::.*$");
    }
}
