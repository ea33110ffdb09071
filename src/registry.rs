//! Aspect registry: discovery of aspect-shaped declarations in the aspect
//! file, with shape validation.
//!
//! An aspect is a `pub struct` implementing `agrt::Aspect`. The aspect
//! file is a single compilation unit, must not declare `fn main` (the
//! pointcut probe synthesizes one), and aspect methods must take `self` by
//! reference: a by-value `self` could not carry mutable per-invocation
//! state through the generated wrapper's reference-passing convention.

use std::fs;
use std::path::{Path, PathBuf};

use syn::{ImplItem, Item, Visibility};

use crate::debug_log;
use crate::error::{Result, WeaveError};
use crate::types::AspectDecl;

/// A parsed aspect file with its discovered aspect declarations, in source
/// order. Source order is the registration order used by the matcher.
#[derive(Debug)]
pub struct AspectFile {
    pub path: PathBuf,
    pub syntax: syn::File,
    /// Raw source text, re-materialized by the pointcut probe.
    pub source: String,
    pub aspects: Vec<AspectDecl>,
}

/// Parse an aspect file and discover every aspect declared in it.
pub fn parse_aspect_file(path: &Path) -> Result<AspectFile> {
    let source = fs::read_to_string(path)?;
    let syntax = syn::parse_file(&source).map_err(|e| WeaveError::Parse {
        file: path.to_path_buf(),
        source: e,
    })?;
    let aspects = discover_aspects(&syntax, path)?;
    debug_log!(
        "parsed aspect file {}: {} aspect(s)",
        path.display(),
        aspects.len()
    );
    Ok(AspectFile {
        path: path.to_path_buf(),
        syntax,
        source,
        aspects,
    })
}

/// Discover aspect declarations in a parsed aspect file.
///
/// Shape errors reject the whole file; a file with zero aspects is also a
/// shape error, since there would be nothing to weave.
pub fn discover_aspects(file: &syn::File, path: &Path) -> Result<Vec<AspectDecl>> {
    let shape_err = |reason: String| WeaveError::AspectShape {
        file: path.to_path_buf(),
        reason,
    };

    let mut aspects = Vec::new();
    for item in &file.items {
        match item {
            Item::Fn(f) if f.sig.ident == "main" => {
                return Err(shape_err(
                    "fn main() is not supported in an aspect file (reserved for the pointcut probe)"
                        .to_string(),
                ));
            }
            Item::Impl(imp) => {
                let Some((_, trait_path, _)) = &imp.trait_ else {
                    continue;
                };
                let is_aspect_impl = trait_path
                    .segments
                    .last()
                    .map(|s| s.ident == "Aspect")
                    .unwrap_or(false);
                if !is_aspect_impl {
                    continue;
                }
                let name = aspect_type_name(imp, path)?;
                check_reference_binding(imp, &name, path)?;
                check_declared_pub(file, &name, path)?;
                aspects.push(AspectDecl { name });
            }
            _ => {}
        }
    }
    if aspects.is_empty() {
        return Err(shape_err("no aspect declarations found".to_string()));
    }
    Ok(aspects)
}

fn aspect_type_name(imp: &syn::ItemImpl, path: &Path) -> Result<String> {
    match imp.self_ty.as_ref() {
        syn::Type::Path(tp) => {
            if let Some(seg) = tp.path.segments.last() {
                return Ok(seg.ident.to_string());
            }
            Err(WeaveError::AspectShape {
                file: path.to_path_buf(),
                reason: "impl Aspect for an empty type path".to_string(),
            })
        }
        other => Err(WeaveError::AspectShape {
            file: path.to_path_buf(),
            reason: format!(
                "impl Aspect for a non-path type is not supported: {}",
                quote::quote!(#other)
            ),
        }),
    }
}

/// Reject aspect methods taking `self` by value. Mirrors the original
/// pointer-receiver requirement: the aspect capability must be satisfied
/// through a reference binding.
fn check_reference_binding(imp: &syn::ItemImpl, name: &str, path: &Path) -> Result<()> {
    for item in &imp.items {
        let ImplItem::Fn(method) = item else { continue };
        let Some(syn::FnArg::Receiver(recv)) = method.sig.inputs.first() else {
            continue;
        };
        if recv.reference.is_none() {
            return Err(WeaveError::AspectShape {
                file: path.to_path_buf(),
                reason: format!(
                    "aspect `{}`: method `{}` takes self by value; aspect methods must take \
                     self by reference",
                    name, method.sig.ident
                ),
            });
        }
    }
    Ok(())
}

/// The aspect type must be declared `pub` in the aspect file itself: woven
/// code references it from other modules as `crate::agaspect::<Name>`.
fn check_declared_pub(file: &syn::File, name: &str, path: &Path) -> Result<()> {
    for item in &file.items {
        let (ident, vis) = match item {
            Item::Struct(s) => (&s.ident, &s.vis),
            Item::Enum(e) => (&e.ident, &e.vis),
            _ => continue,
        };
        if ident != name {
            continue;
        }
        return match vis {
            Visibility::Public(_) => Ok(()),
            _ => Err(WeaveError::AspectShape {
                file: path.to_path_buf(),
                reason: format!("aspect type `{}` must be declared pub", name),
            }),
        };
    }
    Err(WeaveError::AspectShape {
        file: path.to_path_buf(),
        reason: format!("aspect type `{}` is not declared in the aspect file", name),
    })
}
