//! The per-run weave driver: scans every unit the resolver reports,
//! rewrites matched files and writes the woven sources under the output
//! root, mirroring the target tree's relative layout.
//!
//! A weave with zero matches anywhere writes nothing and returns an empty
//! manifest. Otherwise the output starts with the two support modules
//! (the runtime and the renamed aspect module) followed by each rewritten
//! file, in scan order.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use proc_macro2::Span;
use syn::spanned::Spanned;
use syn::visit_mut::VisitMut;

use crate::constants::{
    AUTOGEN_FILE_HEADER, GENERATED_ASPECT_MODULE, RUNTIME_MODULE, RUNTIME_SOURCE,
};
use crate::debug_log;
use crate::error::{Result, WeaveError};
use crate::matcher::{is_aspect_marker, scan_file};
use crate::registry::AspectFile;
use crate::resolve::Resolver;
use crate::rewrite::synthesize;
use crate::types::{CompiledAspect, GenContext, Match, RewriteManifest, SiteKey};

/// Weave the whole target into `out_root` and return the manifest of
/// written files.
pub fn weave(
    target_root: &Path,
    out_root: &Path,
    resolver: &dyn Resolver,
    af: &AspectFile,
    aspects: &[CompiledAspect],
) -> Result<RewriteManifest> {
    // Scan pass: parse every file once and collect its matches. The parse
    // trees are kept so the rewrite pass does not reparse.
    let mut scanned: Vec<(PathBuf, syn::File, HashMap<SiteKey, Match>)> = Vec::new();
    let mut total = 0usize;
    for unit in resolver.units() {
        for file in &unit.files {
            if is_aspect_marker(file) || same_file(file, &af.path) {
                continue;
            }
            let source = fs::read_to_string(file)?;
            let syntax = syn::parse_file(&source).map_err(|e| WeaveError::Parse {
                file: file.clone(),
                source: e,
            })?;
            let matches = scan_file(file, &syntax, resolver, aspects);
            if !matches.is_empty() {
                total += matches.len();
                scanned.push((file.clone(), syntax, matches));
            }
        }
    }

    let mut manifest = RewriteManifest::default();
    if total == 0 {
        debug_log!("no matches anywhere in {}; nothing woven", target_root.display());
        return Ok(manifest);
    }
    debug_log!(
        "{} match(es) in {} file(s)",
        total,
        scanned.len()
    );

    // Support modules first, then each rewritten file.
    manifest.push(write_runtime_module(out_root)?);
    manifest.push(write_aspect_module(out_root, af)?);

    let mut gcx = GenContext::new();
    for (file, mut syntax, matches) in scanned {
        let rel = file
            .strip_prefix(target_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| file.file_name().map(PathBuf::from).unwrap_or_default());
        rewrite_file(&mut syntax, &matches, &mut gcx);
        let out = out_root.join(&rel);
        write_generated(&out, &syntax)?;
        debug_log!("rewrote {} -> {}", file.display(), out.display());
        manifest.push(out);
    }
    Ok(manifest)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => a == b,
    }
}

/// Rewrite one parse tree in place: substitute every matched site, then
/// inject the runtime import and append the synthesized addendum after the
/// original items.
///
/// Only the runtime gets an import, under an alias that cannot collide
/// with the module registrations tree assembly appends to the crate root.
/// Generated code reaches the aspect module by absolute path.
fn rewrite_file(syntax: &mut syn::File, matches: &HashMap<SiteKey, Match>, gcx: &mut GenContext) {
    let mut rewriter = SiteRewriter {
        matches,
        gcx,
        addendum: Vec::new(),
    };
    rewriter.visit_file_mut(syntax);
    let addendum = rewriter.addendum;

    syntax
        .items
        .insert(0, syn::parse_quote!(use crate::agrt as aspectrt;));
    syntax.items.extend(addendum);
}

struct SiteRewriter<'a> {
    matches: &'a HashMap<SiteKey, Match>,
    gcx: &'a mut GenContext,
    addendum: Vec<syn::Item>,
}

impl VisitMut for SiteRewriter<'_> {
    fn visit_expr_mut(&mut self, expr: &mut syn::Expr) {
        // Children first, so sites nested in a matched call's receiver or
        // arguments are woven before the enclosing substitution clones
        // them. Synthesized replacements carry no source positions and are
        // never revisited.
        syn::visit_mut::visit_expr_mut(self, expr);

        let key = match expr {
            syn::Expr::Path(p) => {
                let s = p.span().start();
                (s.line, s.column)
            }
            syn::Expr::MethodCall(mc) => {
                let s = mc.method.span().start();
                (s.line, s.column)
            }
            _ => return,
        };
        let Some(m) = self.matches.get(&key) else {
            return;
        };
        let out = synthesize(m, expr, self.gcx);
        self.addendum.push(out.proxy);
        self.addendum.push(out.accessor);
        *expr = out.replacement;
    }
}

fn write_runtime_module(out_root: &Path) -> Result<PathBuf> {
    let path = out_root.join(format!("{}.rs", RUNTIME_MODULE));
    fs::create_dir_all(out_root)?;
    fs::write(&path, format!("{}{}", AUTOGEN_FILE_HEADER, RUNTIME_SOURCE))?;
    Ok(path)
}

/// Materialize the aspect file as the generated aspect module, with every
/// bare `agrt` path rebased to `crate::agrt` so it resolves inside the
/// woven crate.
///
/// The path rewrite cannot reach `agrt::` references inside macro token
/// streams (`vec![agrt::boxed(..)]` and the like), so the module also gets
/// `use crate::agrt;` injected: bare `agrt::` then resolves wherever it
/// appears, unless the aspect file already binds that name itself.
fn write_aspect_module(out_root: &Path, af: &AspectFile) -> Result<PathBuf> {
    let mut syntax = af.syntax.clone();
    RuntimePathRewriter.visit_file_mut(&mut syntax);
    if !binds_runtime_name(&syntax.items) {
        syntax.items.insert(0, syn::parse_quote!(use crate::agrt;));
    }
    let path = out_root.join(format!("{}.rs", GENERATED_ASPECT_MODULE));
    write_generated(&path, &syntax)?;
    Ok(path)
}

/// Whether any top-level use item already binds the name `agrt` (after the
/// path rebase, an original `use agrt;` has become `use crate::agrt;`).
fn binds_runtime_name(items: &[syn::Item]) -> bool {
    fn tree_binds(tree: &syn::UseTree) -> bool {
        match tree {
            syn::UseTree::Path(p) => tree_binds(&p.tree),
            syn::UseTree::Name(n) => n.ident == RUNTIME_MODULE,
            syn::UseTree::Rename(r) => r.rename == RUNTIME_MODULE,
            syn::UseTree::Group(g) => g.items.iter().any(tree_binds),
            syn::UseTree::Glob(_) => false,
        }
    }
    items.iter().any(|item| match item {
        syn::Item::Use(iu) => tree_binds(&iu.tree),
        _ => false,
    })
}

struct RuntimePathRewriter;

impl RuntimePathRewriter {
    fn is_runtime_root(ident: &syn::Ident) -> bool {
        ident == RUNTIME_MODULE
    }
}

impl VisitMut for RuntimePathRewriter {
    fn visit_path_mut(&mut self, path: &mut syn::Path) {
        if path.leading_colon.is_none()
            && path
                .segments
                .first()
                .map(|s| Self::is_runtime_root(&s.ident))
                .unwrap_or(false)
        {
            let krate: syn::PathSegment = syn::parse_quote!(crate);
            path.segments.insert(0, krate);
        }
        syn::visit_mut::visit_path_mut(self, path);
    }

    fn visit_item_use_mut(&mut self, iu: &mut syn::ItemUse) {
        if iu.leading_colon.is_none() {
            let rebase = match &iu.tree {
                syn::UseTree::Path(up) => Self::is_runtime_root(&up.ident),
                syn::UseTree::Name(un) => Self::is_runtime_root(&un.ident),
                _ => false,
            };
            if rebase {
                let inner = iu.tree.clone();
                iu.tree = syn::UseTree::Path(syn::UsePath {
                    ident: syn::Ident::new("crate", Span::call_site()),
                    colon2_token: Default::default(),
                    tree: Box::new(inner),
                });
            }
        }
        syn::visit_mut::visit_item_use_mut(self, iu);
    }
}

/// Serialize a generated tree under the autogen header.
fn write_generated(path: &Path, syntax: &syn::File) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = prettyplease::unparse(syntax);
    fs::write(path, format!("{}{}", AUTOGEN_FILE_HEADER, body))?;
    Ok(())
}
