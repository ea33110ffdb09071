//! The top-level weaving pipeline.
//!
//! A run is four sequential phases over one target tree and exactly one
//! aspect file:
//!
//!   Phase 0  target expansion
//!   Phase 1  aspect registration and pointcut resolution
//!   Phase 2  matching and rewriting
//!   Phase 3  tree assembly
//!
//! Any phase error aborts the run; a partial weave is never reported as
//! success.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::constants::RECURSION_MARKER;
use crate::debug_log;
use crate::error::{Result, WeaveError};
use crate::fixup;
use crate::pointcut;
use crate::registry;
use crate::resolve::{Resolver, SynResolver};
use crate::types::RewriteManifest;
use crate::weave;

/// One weaving run.
pub struct Weaver {
    /// Target directory, optionally ending in the recursion marker.
    pub target: PathBuf,
    /// Root of the woven output tree.
    pub woven_root: PathBuf,
    /// The single aspect file of this run.
    pub aspect_file: PathBuf,
}

impl Weaver {
    pub fn run(&self) -> Result<RewriteManifest> {
        eprintln!("[aspect-weaver] Phase 0: target expansion");
        let (target_root, unit_dirs) = expand_target(&self.target)?;
        debug_log!(
            "target {} expanded to {} unit dir(s)",
            self.target.display(),
            unit_dirs.len()
        );

        eprintln!("[aspect-weaver] Phase 1: aspect registration and pointcut resolution");
        let af = registry::parse_aspect_file(&self.aspect_file)?;
        let aspects = pointcut::resolve_pointcuts(&af)?;
        for asp in &aspects {
            eprintln!(
                "[aspect-weaver]   aspect {} pointcut {}",
                asp.name, asp.pointcut
            );
        }

        eprintln!("[aspect-weaver] Phase 2: matching and rewriting");
        let resolver = SynResolver::build(&target_root, &unit_dirs)?;
        self.finish(&target_root, &resolver, &af, &aspects)
    }

    /// Run phases 2 and 3 with an externally provided resolver. Library
    /// entry point for front-ends carrying their own symbol tables.
    pub fn run_with_resolver(&self, resolver: &dyn Resolver) -> Result<RewriteManifest> {
        let (target_root, _) = expand_target(&self.target)?;
        let af = registry::parse_aspect_file(&self.aspect_file)?;
        let aspects = pointcut::resolve_pointcuts(&af)?;
        self.finish(&target_root, resolver, &af, &aspects)
    }

    fn finish(
        &self,
        target_root: &Path,
        resolver: &dyn Resolver,
        af: &registry::AspectFile,
        aspects: &[crate::types::CompiledAspect],
    ) -> Result<RewriteManifest> {
        let manifest = weave::weave(target_root, &self.woven_root, resolver, af, aspects)?;
        if manifest.is_empty() {
            eprintln!("[aspect-weaver] no matches; nothing woven");
            return Ok(manifest);
        }

        eprintln!("[aspect-weaver] Phase 3: tree assembly");
        fixup::assemble_tree(target_root, &self.woven_root)?;
        eprintln!(
            "[aspect-weaver] wove {} file(s) into {}",
            manifest.files.len(),
            self.woven_root.display()
        );
        Ok(manifest)
    }
}

/// Expand the target specification into the target root and its unit
/// directories, in deterministic order.
///
/// A trailing recursion marker selects the parent directory plus every
/// directory beneath it that directly contains at least one source file,
/// sorted lexicographically by relative path. Without the marker the
/// target is the single unit.
pub fn expand_target(target: &Path) -> Result<(PathBuf, Vec<PathBuf>)> {
    let recursive = target
        .file_name()
        .map(|n| n == RECURSION_MARKER)
        .unwrap_or(false);
    let root = if recursive {
        target
            .parent()
            .ok_or_else(|| {
                WeaveError::Argument(format!(
                    "target {} has no directory above the recursion marker",
                    target.display()
                ))
            })?
            .to_path_buf()
    } else {
        target.to_path_buf()
    };
    if !root.is_dir() {
        return Err(WeaveError::Argument(format!(
            "target {} is not a directory",
            root.display()
        )));
    }
    if !recursive {
        return Ok((root.clone(), vec![root]));
    }

    let mut dirs: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(&root) {
        let entry = entry.map_err(|e| WeaveError::Argument(e.to_string()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let has_source = std::fs::read_dir(entry.path())
            .into_iter()
            .flatten()
            .flatten()
            .any(|e| {
                e.path().is_file() && e.path().extension().map(|x| x == "rs").unwrap_or(false)
            });
        if has_source {
            dirs.push(entry.path().to_path_buf());
        }
    }
    dirs.sort();
    dirs.dedup();
    if dirs.is_empty() {
        return Err(WeaveError::Argument(format!(
            "target {} contains no source files",
            root.display()
        )));
    }
    Ok((root, dirs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_expand_plain_target_is_single_unit() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        let (root, units) = expand_target(dir.path()).unwrap();
        assert_eq!(root, dir.path());
        assert_eq!(units, vec![dir.path().to_path_buf()]);
    }

    #[test]
    fn test_expand_recursive_target_sorted_source_dirs_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/inner")).unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("a/x.rs"), "pub fn x() {}").unwrap();
        fs::write(dir.path().join("b/inner/y.rs"), "pub fn y() {}").unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();

        let marked = dir.path().join(RECURSION_MARKER);
        let (root, units) = expand_target(&marked).unwrap();
        assert_eq!(root, dir.path());
        assert_eq!(
            units,
            vec![
                dir.path().to_path_buf(),
                dir.path().join("a"),
                dir.path().join("b/inner"),
            ]
        );
    }

    #[test]
    fn test_expand_rejects_missing_dir() {
        let err = expand_target(Path::new("/nonexistent-weave-target")).unwrap_err();
        assert!(matches!(err, WeaveError::Argument(_)));
    }

    #[test]
    fn test_expand_recursive_rejects_sourceless_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/readme.md"), "hi").unwrap();
        let marked = dir.path().join(RECURSION_MARKER);
        let err = expand_target(&marked).unwrap_err();
        assert!(matches!(err, WeaveError::Argument(_)));
    }
}
