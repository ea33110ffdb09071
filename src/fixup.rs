//! Tree assembly: make the woven output a complete, buildable source tree.
//!
//! Rewriting only writes the files it changed plus the two support
//! modules. This pass copies every remaining target file into the woven
//! root (aspect-definition files excepted) and registers the support
//! modules in the crate root so `crate::agrt` and `crate::agaspect`
//! resolve.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::constants::{GENERATED_ASPECT_MODULE, RUNTIME_MODULE};
use crate::debug_log;
use crate::error::{Result, WeaveError};
use crate::matcher::is_aspect_marker;

/// Complete the woven tree under `out_root` from the unmodified remainder
/// of `target_root`.
pub fn assemble_tree(target_root: &Path, out_root: &Path) -> Result<()> {
    for entry in WalkDir::new(target_root) {
        let entry = entry.map_err(|e| WeaveError::TreeAssembly(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_aspect_marker(path) {
            continue;
        }
        let rel = path.strip_prefix(target_root).map_err(|e| {
            WeaveError::TreeAssembly(format!(
                "{} is not under {}: {}",
                path.display(),
                target_root.display(),
                e
            ))
        })?;
        let dest = out_root.join(rel);
        if dest.exists() {
            // Already produced by the rewrite pass.
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(path, &dest)?;
        debug_log!("copied {} -> {}", path.display(), dest.display());
    }
    register_support_modules(out_root)
}

/// Append the support module declarations to the woven crate root. Without
/// a root file the declarations cannot be registered automatically; the
/// weave still succeeds and the omission is logged.
fn register_support_modules(out_root: &Path) -> Result<()> {
    let root_file = ["lib.rs", "main.rs"]
        .iter()
        .map(|n| out_root.join(n))
        .find(|p| p.is_file());
    let Some(root_file) = root_file else {
        debug_log!(
            "no crate root in {}; {} and {} must be registered manually",
            out_root.display(),
            RUNTIME_MODULE,
            GENERATED_ASPECT_MODULE
        );
        return Ok(());
    };
    let mut source = fs::read_to_string(&root_file)?;
    for module in [RUNTIME_MODULE, GENERATED_ASPECT_MODULE] {
        let decl = format!("pub mod {};", module);
        if source.contains(&decl) {
            continue;
        }
        if !source.ends_with('\n') {
            source.push('\n');
        }
        source.push_str(&decl);
        source.push('\n');
    }
    fs::write(&root_file, source)?;
    debug_log!("registered support modules in {}", root_file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn touch(path: &PathBuf, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_copies_remainder_and_skips_rewritten_and_markers() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        let out = dir.path().join("woven");
        touch(&target.join("main.rs"), "fn main() {}\n");
        touch(&target.join("util.rs"), "pub fn u() {}\n");
        touch(&target.join("nested/helper.rs"), "pub fn h() {}\n");
        touch(&target.join("logging_aspect.rs"), "pub struct A;\n");
        // main.rs was already rewritten.
        touch(&out.join("main.rs"), "// rewritten\nfn main() {}\n");

        assemble_tree(&target, &out).unwrap();

        assert!(out.join("util.rs").is_file());
        assert!(out.join("nested/helper.rs").is_file());
        assert!(!out.join("logging_aspect.rs").exists());
        let main = fs::read_to_string(out.join("main.rs")).unwrap();
        assert!(main.starts_with("// rewritten"));
    }

    #[test]
    fn test_registers_support_modules_once() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        let out = dir.path().join("woven");
        touch(&target.join("main.rs"), "fn main() {}\n");

        assemble_tree(&target, &out).unwrap();
        assemble_tree(&target, &out).unwrap();

        let main = fs::read_to_string(out.join("main.rs")).unwrap();
        assert_eq!(main.matches("pub mod agrt;").count(), 1);
        assert_eq!(main.matches("pub mod agaspect;").count(), 1);
    }

    #[test]
    fn test_lib_root_preferred_over_main() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        let out = dir.path().join("woven");
        touch(&target.join("lib.rs"), "pub fn api() {}\n");
        touch(&target.join("main.rs"), "fn main() {}\n");

        assemble_tree(&target, &out).unwrap();

        let lib = fs::read_to_string(out.join("lib.rs")).unwrap();
        assert!(lib.contains("pub mod agrt;"));
        let main = fs::read_to_string(out.join("main.rs")).unwrap();
        assert!(!main.contains("pub mod agrt;"));
    }

    #[test]
    fn test_rootless_tree_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        let out = dir.path().join("woven");
        touch(&target.join("util.rs"), "pub fn u() {}\n");
        assemble_tree(&target, &out).unwrap();
        assert!(out.join("util.rs").is_file());
    }
}
