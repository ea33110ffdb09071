//! The resolver adapter: whole-program symbol binding behind a trait.
//!
//! Static symbol resolution is an assumed external capability, not
//! something this crate reimplements. [`Resolver`] is the seam: given an
//! identifier/selector use at a source position, report the bound
//! function/method symbol and its full type signature, or nothing.
//!
//! Two adapters are bundled:
//! - [`TableResolver`] reads a position-keyed symbol table (JSON) produced
//!   by an external compiler front-end;
//! - [`SynResolver`] is a deliberately naive fallback that indexes the
//!   target tree itself with syn and binds by name, skipping anything
//!   ambiguous.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::debug_log;
use crate::error::{Result, WeaveError};
use crate::types::{FnSig, Param, ReceiverInfo, ReceiverKind, SiteKey, Symbol};

/// One compilation unit: a directory and its source files, in the order
/// the adapter enumerates them.
#[derive(Debug, Clone)]
pub struct Unit {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

/// An identifier/selector use to be resolved.
#[derive(Debug, Clone)]
pub enum SiteRef<'a> {
    /// A path expression, e.g. `sayhello` or `util::sayhello`.
    Path {
        file: &'a Path,
        key: SiteKey,
        path_text: &'a str,
    },
    /// A method call through a receiver, e.g. `g.hello(..)`.
    Method {
        file: &'a Path,
        key: SiteKey,
        name: &'a str,
    },
}

impl SiteRef<'_> {
    pub fn file(&self) -> &Path {
        match self {
            SiteRef::Path { file, .. } | SiteRef::Method { file, .. } => file,
        }
    }

    pub fn key(&self) -> SiteKey {
        match self {
            SiteRef::Path { key, .. } | SiteRef::Method { key, .. } => *key,
        }
    }
}

/// The injected resolver capability.
pub trait Resolver {
    /// Compilation units in scan order. The weaver processes them exactly
    /// in this order.
    fn units(&self) -> &[Unit];

    /// Bind a use to a function or method symbol. `None` means the use
    /// does not resolve to a callable symbol and is never matched.
    fn resolve(&self, site: &SiteRef<'_>) -> Option<Symbol>;

    /// Whether the receiver expression at a method site has
    /// reference-kind static type. `None` when the adapter cannot tell;
    /// the matcher then falls back to the expression's syntactic shape.
    fn receiver_is_ref(&self, _site: &SiteRef<'_>) -> Option<bool> {
        None
    }
}

// ---------------------------------------------------------------------------
// TableResolver: position-keyed symbol table from an external front-end
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableEntry {
    pub symbol: Symbol,
    /// Static borrow shape of the receiver expression at this site, when
    /// the front-end computed it.
    #[serde(default)]
    pub receiver_is_ref: Option<bool>,
}

/// Position-keyed symbol table, interchanged as JSON. Keys are
/// `<relative-file>:<line>:<column>` with 1-based lines and 0-based
/// columns of the expression start.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    pub bindings: HashMap<String, TableEntry>,
}

impl SymbolTable {
    pub fn read_from_file(path: &Path) -> Result<SymbolTable> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| {
            WeaveError::Argument(format!(
                "symbol table {} is not valid JSON: {}",
                path.display(),
                e
            ))
        })
    }
}

/// Resolver backed by a precomputed symbol table.
#[derive(Debug)]
pub struct TableResolver {
    root: PathBuf,
    units: Vec<Unit>,
    table: SymbolTable,
}

impl TableResolver {
    pub fn new(root: &Path, unit_dirs: &[PathBuf], table: SymbolTable) -> TableResolver {
        TableResolver {
            root: root.to_path_buf(),
            units: enumerate_units(unit_dirs),
            table,
        }
    }

    /// Bind a site programmatically. Used by tests and by front-ends that
    /// drive the weaver as a library.
    pub fn bind(&mut self, rel_file: &str, key: SiteKey, entry: TableEntry) {
        self.table
            .bindings
            .insert(format!("{}:{}:{}", rel_file, key.0, key.1), entry);
    }

    fn entry(&self, site: &SiteRef<'_>) -> Option<&TableEntry> {
        let rel = site.file().strip_prefix(&self.root).unwrap_or(site.file());
        let (line, col) = site.key();
        self.table
            .bindings
            .get(&format!("{}:{}:{}", rel.display(), line, col))
    }
}

impl Resolver for TableResolver {
    fn units(&self) -> &[Unit] {
        &self.units
    }

    fn resolve(&self, site: &SiteRef<'_>) -> Option<Symbol> {
        self.entry(site).map(|e| e.symbol.clone())
    }

    fn receiver_is_ref(&self, site: &SiteRef<'_>) -> Option<bool> {
        self.entry(site).and_then(|e| e.receiver_is_ref)
    }
}

// ---------------------------------------------------------------------------
// SynResolver: naive name-keyed index over the target tree
// ---------------------------------------------------------------------------

/// Naive bundled adapter: indexes every free function and inherent method
/// declared in the target units and binds uses by name. Ambiguous names
/// are skipped (logged), trait methods are not indexed. Receiver types
/// are crate-rooted so generated code resolves them from any module.
#[derive(Debug)]
pub struct SynResolver {
    units: Vec<Unit>,
    fns_by_name: HashMap<String, Vec<Symbol>>,
    methods_by_name: HashMap<String, Vec<Symbol>>,
}

impl SynResolver {
    /// Index all files of the given unit directories. `root` anchors
    /// module paths: `root/main.rs` or `root/lib.rs` is `crate`,
    /// `root/foo.rs` and `root/foo/mod.rs` are `crate::foo`, and so on.
    pub fn build(root: &Path, unit_dirs: &[PathBuf]) -> Result<SynResolver> {
        let units = enumerate_units(unit_dirs);
        let mut resolver = SynResolver {
            units,
            fns_by_name: HashMap::new(),
            methods_by_name: HashMap::new(),
        };
        for unit in resolver.units.clone() {
            for file in &unit.files {
                let source = fs::read_to_string(file)?;
                let syntax = syn::parse_file(&source).map_err(|e| WeaveError::Parse {
                    file: file.clone(),
                    source: e,
                })?;
                let module = module_path_for(root, file);
                resolver.index_items(&syntax.items, &module);
            }
        }
        Ok(resolver)
    }

    fn index_items(&mut self, items: &[syn::Item], module: &str) {
        for item in items {
            match item {
                syn::Item::Fn(f) => {
                    let qualified = format!("{}::{}", module, f.sig.ident);
                    let symbol = Symbol {
                        qualified,
                        sig: signature_of(&f.sig, None),
                    };
                    self.fns_by_name
                        .entry(f.sig.ident.to_string())
                        .or_default()
                        .push(symbol);
                }
                syn::Item::Impl(imp) if imp.trait_.is_none() => {
                    let Some(ty_name) = self_type_name(imp) else {
                        continue;
                    };
                    let qualified_ty = format!("{}::{}", module, ty_name);
                    for ii in &imp.items {
                        let syn::ImplItem::Fn(m) = ii else { continue };
                        let Some(recv) = receiver_of(&m.sig, &qualified_ty) else {
                            // Associated functions without a receiver are
                            // indexed as free functions under the type.
                            let symbol = Symbol {
                                qualified: format!("{}::{}", qualified_ty, m.sig.ident),
                                sig: signature_of(&m.sig, None),
                            };
                            self.fns_by_name
                                .entry(m.sig.ident.to_string())
                                .or_default()
                                .push(symbol);
                            continue;
                        };
                        let symbol = Symbol {
                            qualified: format!("{}::{}", qualified_ty, m.sig.ident),
                            sig: signature_of(&m.sig, Some(recv)),
                        };
                        self.methods_by_name
                            .entry(m.sig.ident.to_string())
                            .or_default()
                            .push(symbol);
                    }
                }
                syn::Item::Mod(md) => {
                    if let Some((_, items)) = &md.content {
                        let nested = format!("{}::{}", module, md.ident);
                        self.index_items(items, &nested);
                    }
                }
                _ => {}
            }
        }
    }
}

impl Resolver for SynResolver {
    fn units(&self) -> &[Unit] {
        &self.units
    }

    fn resolve(&self, site: &SiteRef<'_>) -> Option<Symbol> {
        match site {
            SiteRef::Path { path_text, .. } => {
                let last = path_text.rsplit("::").next().unwrap_or(path_text);
                let candidates = self.fns_by_name.get(last)?;
                if candidates.len() == 1 {
                    return Some(candidates[0].clone());
                }
                // Disambiguate by the path text as written: keep the
                // candidates whose qualified name ends with it.
                let suffix = path_text.trim_start_matches("crate::");
                let narrowed: Vec<&Symbol> = candidates
                    .iter()
                    .filter(|s| s.qualified.ends_with(suffix))
                    .collect();
                if narrowed.len() == 1 {
                    return Some(narrowed[0].clone());
                }
                debug_log!("ambiguous path use `{}`: {} candidates, skipped", path_text, candidates.len());
                None
            }
            SiteRef::Method { name, .. } => {
                let candidates = self.methods_by_name.get(*name)?;
                if candidates.len() == 1 {
                    return Some(candidates[0].clone());
                }
                debug_log!("ambiguous method use `{}`: {} candidates, skipped", name, candidates.len());
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// shared helpers
// ---------------------------------------------------------------------------

/// Enumerate the source files of each unit directory, sorted by name for
/// a deterministic scan order. Non-recursive: nested directories are their
/// own units.
pub fn enumerate_units(unit_dirs: &[PathBuf]) -> Vec<Unit> {
    let mut units = Vec::new();
    for dir in unit_dirs {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .into_iter()
            .flatten()
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().map(|e| e == "rs").unwrap_or(false))
            .collect();
        files.sort();
        units.push(Unit {
            dir: dir.clone(),
            files,
        });
    }
    units
}

/// Module path of a file relative to the target root.
pub fn module_path_for(root: &Path, file: &Path) -> String {
    let rel = file.strip_prefix(root).unwrap_or(file);
    let mut segments: Vec<String> = Vec::new();
    for comp in rel.components() {
        segments.push(comp.as_os_str().to_string_lossy().into_owned());
    }
    if let Some(last) = segments.last_mut() {
        *last = last.trim_end_matches(".rs").to_string();
    }
    match segments.last().map(String::as_str) {
        Some("main") | Some("lib") | Some("mod") => {
            segments.pop();
        }
        _ => {}
    }
    if segments.is_empty() {
        "crate".to_string()
    } else {
        format!("crate::{}", segments.join("::"))
    }
}

fn self_type_name(imp: &syn::ItemImpl) -> Option<String> {
    match imp.self_ty.as_ref() {
        syn::Type::Path(tp) => tp.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

fn receiver_of(sig: &syn::Signature, qualified_ty: &str) -> Option<ReceiverInfo> {
    let syn::FnArg::Receiver(recv) = sig.inputs.first()? else {
        return None;
    };
    let kind = match (&recv.reference, &recv.mutability) {
        (Some(_), Some(_)) => ReceiverKind::Exclusive,
        (Some(_), None) => ReceiverKind::Shared,
        (None, _) => ReceiverKind::Owned,
    };
    Some(ReceiverInfo {
        kind,
        ty: qualified_ty.to_string(),
    })
}

/// Extract the adapter-facing signature from a syn signature.
pub fn signature_of(sig: &syn::Signature, receiver: Option<ReceiverInfo>) -> FnSig {
    let mut params = Vec::new();
    for input in &sig.inputs {
        let syn::FnArg::Typed(pt) = input else { continue };
        let name = match pt.pat.as_ref() {
            syn::Pat::Ident(pi) => Some(pi.ident.to_string()),
            _ => None,
        };
        params.push(Param {
            name,
            ty: type_text(&pt.ty),
        });
    }
    let results = match &sig.output {
        syn::ReturnType::Default => Vec::new(),
        syn::ReturnType::Type(_, ty) => match ty.as_ref() {
            syn::Type::Tuple(tt) if !tt.elems.is_empty() => {
                tt.elems.iter().map(type_text).collect()
            }
            syn::Type::Tuple(_) => Vec::new(),
            other => vec![type_text(other)],
        },
    };
    FnSig {
        receiver,
        params,
        variadic: sig.variadic.is_some(),
        results,
    }
}

/// Render a type as compact source text.
pub fn type_text(ty: &syn::Type) -> String {
    quote::quote!(#ty).to_string().replace(' ', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_path_for_roots_and_nesting() {
        let root = Path::new("/t/src");
        assert_eq!(module_path_for(root, Path::new("/t/src/main.rs")), "crate");
        assert_eq!(module_path_for(root, Path::new("/t/src/lib.rs")), "crate");
        assert_eq!(
            module_path_for(root, Path::new("/t/src/util.rs")),
            "crate::util"
        );
        assert_eq!(
            module_path_for(root, Path::new("/t/src/util/mod.rs")),
            "crate::util"
        );
        assert_eq!(
            module_path_for(root, Path::new("/t/src/util/text.rs")),
            "crate::util::text"
        );
    }

    #[test]
    fn test_signature_of_tuple_and_unit_results() {
        let sig: syn::Signature = syn::parse_str("fn f(a: u32, b: String) -> (u32, String)").unwrap();
        let fs = signature_of(&sig, None);
        assert_eq!(fs.params.len(), 2);
        assert_eq!(fs.params[0].ty, "u32");
        assert_eq!(fs.results, vec!["u32".to_string(), "String".to_string()]);

        let sig: syn::Signature = syn::parse_str("fn g()").unwrap();
        assert!(signature_of(&sig, None).results.is_empty());
    }

    fn syn_resolver_for(source: &str) -> (tempfile::TempDir, SynResolver) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.rs"), source).unwrap();
        let resolver = SynResolver::build(dir.path(), &[dir.path().to_path_buf()]).unwrap();
        (dir, resolver)
    }

    #[test]
    fn test_syn_resolver_binds_free_fn_and_method() {
        let src = r#"
            pub struct Greeter { pub greeting: String }
            impl Greeter {
                pub fn hello(&self, name: String) -> String {
                    format!("{} {}", self.greeting, name)
                }
            }
            pub fn sayhello(name: String) -> String { name }
            fn main() { }
        "#;
        let (dir, resolver) = syn_resolver_for(src);
        let file = dir.path().join("main.rs");

        let sym = resolver
            .resolve(&SiteRef::Path {
                file: &file,
                key: (1, 0),
                path_text: "sayhello",
            })
            .unwrap();
        assert_eq!(sym.qualified, "crate::sayhello");
        assert!(sym.sig.receiver.is_none());

        let sym = resolver
            .resolve(&SiteRef::Method {
                file: &file,
                key: (1, 0),
                name: "hello",
            })
            .unwrap();
        assert_eq!(sym.qualified, "crate::Greeter::hello");
        let recv = sym.sig.receiver.unwrap();
        assert_eq!(recv.kind, ReceiverKind::Shared);
        assert_eq!(recv.ty, "crate::Greeter");
    }

    #[test]
    fn test_syn_resolver_skips_ambiguous_names() {
        let src = r#"
            mod a { pub fn f() {} }
            mod b { pub fn f() {} }
        "#;
        let (dir, resolver) = syn_resolver_for(src);
        let file = dir.path().join("main.rs");
        assert!(resolver
            .resolve(&SiteRef::Path {
                file: &file,
                key: (1, 0),
                path_text: "f",
            })
            .is_none());
        // The written path disambiguates.
        let sym = resolver
            .resolve(&SiteRef::Path {
                file: &file,
                key: (1, 0),
                path_text: "a::f",
            })
            .unwrap();
        assert_eq!(sym.qualified, "crate::a::f");
    }

    #[test]
    fn test_table_resolver_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        let mut resolver =
            TableResolver::new(dir.path(), &[dir.path().to_path_buf()], SymbolTable::default());
        resolver.bind(
            "main.rs",
            (3, 4),
            TableEntry {
                symbol: Symbol {
                    qualified: "crate::sayhello".to_string(),
                    sig: FnSig::default(),
                },
                receiver_is_ref: Some(false),
            },
        );
        let file = dir.path().join("main.rs");
        let site = SiteRef::Path {
            file: &file,
            key: (3, 4),
            path_text: "sayhello",
        };
        assert_eq!(
            resolver.resolve(&site).unwrap().qualified,
            "crate::sayhello"
        );
        assert_eq!(resolver.receiver_is_ref(&site), Some(false));
        assert!(resolver
            .resolve(&SiteRef::Path {
                file: &file,
                key: (9, 9),
                path_text: "sayhello",
            })
            .is_none());
    }
}
