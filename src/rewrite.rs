//! The rewrite engine: per-match synthesis of proxy and accessor
//! functions, and the call-site substitution expression.
//!
//! All synthesis builds explicit syntax trees (`parse_quote!`); nothing is
//! emitted as text. A proxy mirrors the matched symbol's signature with
//! the receiver demoted to a leading parameter; its body boxes the
//! arguments, builds the forwarding thunk, hands control to the matched
//! aspect's advice and unboxes the results. The accessor returns a
//! callable of the call-site's original usage type, so symbol *values*
//! (not just immediate calls) substitute cleanly.

use proc_macro2::Span;
use quote::format_ident;
use syn::parse_quote;

use crate::invariant_violation;
use crate::types::{FnSig, GenContext, Match, ReceiverKind, SiteKind};

/// The output of one call-site synthesis: two addendum items and the
/// expression that replaces the original node.
pub struct Synthesized {
    pub proxy: syn::Item,
    pub accessor: syn::Item,
    pub replacement: syn::Expr,
}

/// Synthesize proxy, accessor and substitution for one match. `node` is
/// the original expression at the matched site.
pub fn synthesize(m: &Match, node: &syn::Expr, gcx: &mut GenContext) -> Synthesized {
    let (proxy_name, accessor_name) = gcx.fresh();
    let proxy_ident = format_ident!("{}", proxy_name);
    let accessor_ident = format_ident!("{}", accessor_name);

    let callee = callee_of(m, node);
    let proxy = proxy_item(m, &callee, &proxy_ident);
    let accessor = accessor_item(&m.symbol.sig, &proxy_ident, &accessor_ident);
    let replacement = replacement_expr(m, node, &accessor_ident);
    Synthesized {
        proxy: syn::Item::Fn(proxy),
        accessor: syn::Item::Fn(accessor),
        replacement,
    }
}

/// How the thunk invokes the original symbol.
enum Callee {
    /// A free function, by the path written at the call-site (it resolves
    /// in the rewritten file's scope, where the addendum also lives).
    Path(syn::Path),
    /// An inherent method, invoked on the demoted receiver parameter.
    Method(syn::Ident),
}

fn callee_of(m: &Match, node: &syn::Expr) -> Callee {
    match (m.site.kind, node) {
        (SiteKind::Path, syn::Expr::Path(p)) => Callee::Path(p.path.clone()),
        (SiteKind::MethodCall, syn::Expr::MethodCall(mc)) => Callee::Method(mc.method.clone()),
        (kind, other) => invariant_violation!(
            "site {:?} at {}:{}:{} does not have the expected node shape: {}",
            kind,
            m.site.file.display(),
            m.site.key.0,
            m.site.key.1,
            quote::quote!(#other)
        ),
    }
}

fn parse_type(text: &str) -> syn::Type {
    match syn::parse_str(text) {
        Ok(ty) => ty,
        Err(e) => invariant_violation!("signature type `{}` does not parse: {}", text, e),
    }
}

fn param_ident(i: usize) -> syn::Ident {
    syn::Ident::new(&format!("_ag_p{}", i), Span::call_site())
}

fn arg_ident(i: usize) -> syn::Ident {
    syn::Ident::new(&format!("_ag_arg{}", i), Span::call_site())
}

fn res_ident(i: usize) -> syn::Ident {
    syn::Ident::new(&format!("_ag_res{}", i), Span::call_site())
}

/// Return type of the proxy (and of the matched symbol): unit, a single
/// type, or a tuple of the ordered result types.
fn return_type(sig: &FnSig) -> syn::ReturnType {
    match sig.results.len() {
        0 => syn::ReturnType::Default,
        1 => {
            let ty = parse_type(&sig.results[0]);
            parse_quote!(-> #ty)
        }
        _ => {
            let tys: Vec<syn::Type> = sig.results.iter().map(|t| parse_type(t)).collect();
            parse_quote!(-> (#(#tys),*))
        }
    }
}

fn proxy_item(m: &Match, callee: &Callee, proxy_ident: &syn::Ident) -> syn::ItemFn {
    let sig = &m.symbol.sig;

    // Parameter list: receiver first, then the ordered parameters under
    // synthesized names.
    let mut inputs: Vec<syn::FnArg> = Vec::new();
    if let Some(recv) = &sig.receiver {
        let rty = parse_type(&recv.ty);
        inputs.push(match recv.kind {
            ReceiverKind::Shared => parse_quote!(_ag_recv: &#rty),
            ReceiverKind::Exclusive => parse_quote!(_ag_recv: &mut #rty),
            ReceiverKind::Owned => parse_quote!(_ag_recv: #rty),
        });
    }
    for (i, p) in sig.params.iter().enumerate() {
        let name = param_ident(i);
        let ty = parse_type(&p.ty);
        inputs.push(parse_quote!(#name: #ty));
    }
    let output = return_type(sig);

    let mut stmts: Vec<syn::Stmt> = Vec::new();

    // Box each parameter into the opaque dynamic-value sequence, in order.
    let boxed_params: Vec<syn::Expr> = (0..sig.params.len())
        .map(|i| {
            let name = param_ident(i);
            parse_quote!(aspectrt::boxed(#name))
        })
        .collect();
    stmts.push(parse_quote! {
        let _ag_args: Vec<aspectrt::Value> = vec![#(#boxed_params),*];
    });

    // Owned receivers are staged through an Option so the thunk stays
    // FnMut; a second forward reports instead of double-moving.
    if matches!(
        sig.receiver.as_ref().map(|r| r.kind),
        Some(ReceiverKind::Owned)
    ) {
        stmts.push(parse_quote! {
            let mut _ag_recv = Some(_ag_recv);
        });
    }

    stmts.push(thunk_stmt(sig, callee));

    let receiver_expr: syn::Expr = match sig.receiver.as_ref().map(|r| r.kind) {
        None => parse_quote!(aspectrt::Receiver::None),
        Some(ReceiverKind::Shared) => parse_quote!(aspectrt::Receiver::Shared(_ag_recv)),
        Some(ReceiverKind::Exclusive) | Some(ReceiverKind::Owned) => {
            parse_quote!(aspectrt::Receiver::Exclusive)
        }
    };
    stmts.push(parse_quote! {
        let mut _ag_ctx = aspectrt::Context::new(_ag_args, _ag_thunk, #receiver_expr);
    });

    // Fresh aspect value per intercepted invocation. The path is absolute
    // so rewritten crate-root files need no import that would collide with
    // the module registration tree assembly appends.
    let aspect_ident = format_ident!("{}", m.aspect);
    stmts.push(parse_quote! {
        let mut _ag_asp = crate::agaspect::#aspect_ident::default();
    });
    stmts.push(parse_quote! {
        let _ag_res = aspectrt::Aspect::advice(&mut _ag_asp, &mut _ag_ctx);
    });

    // Unbox the advice's result sequence back to the declared result
    // types, in order.
    match sig.results.len() {
        0 => stmts.push(parse_quote! {
            let _ = _ag_res;
        }),
        n => {
            stmts.push(parse_quote! {
                let mut _ag_res = _ag_res.into_iter();
            });
            for (i, rty) in sig.results.iter().enumerate() {
                let name = res_ident(i);
                let ty = parse_type(rty);
                let missing = format!("missing result {}", i);
                let what = format!("result {}", i);
                stmts.push(parse_quote! {
                    let #name: #ty = aspectrt::unbox(_ag_res.next().expect(#missing), #what);
                });
            }
            let names: Vec<syn::Ident> = (0..n).map(res_ident).collect();
            let tail: syn::Expr = if n == 1 {
                parse_quote!(#(#names)*)
            } else {
                parse_quote!((#(#names),*))
            };
            stmts.push(syn::Stmt::Expr(tail, None));
        }
    }

    parse_quote! {
        fn #proxy_ident(#(#inputs),*) #output {
            #(#stmts)*
        }
    }
}

/// The zero-argument-capturing forwarding thunk: unboxes each element back
/// to its declared parameter type, invokes the original symbol, and boxes
/// each result.
fn thunk_stmt(sig: &FnSig, callee: &Callee) -> syn::Stmt {
    let mut body: Vec<syn::Stmt> = Vec::new();
    body.push(parse_quote! {
        let mut _ag_args = _ag_args.into_iter();
    });
    for (i, p) in sig.params.iter().enumerate() {
        let name = arg_ident(i);
        let ty = parse_type(&p.ty);
        let missing = format!("missing argument {}", i);
        let what = format!("argument {}", i);
        body.push(parse_quote! {
            let #name: #ty = aspectrt::unbox(_ag_args.next().expect(#missing), #what);
        });
    }
    if matches!(
        sig.receiver.as_ref().map(|r| r.kind),
        Some(ReceiverKind::Owned)
    ) {
        body.push(parse_quote! {
            let _ag_recv = _ag_recv.take().expect("receiver already consumed");
        });
    }

    let args: Vec<syn::Ident> = (0..sig.params.len()).map(arg_ident).collect();
    let call: syn::Expr = match callee {
        Callee::Path(path) => parse_quote!(#path(#(#args),*)),
        Callee::Method(method) => parse_quote!(_ag_recv.#method(#(#args),*)),
    };

    match sig.results.len() {
        0 => {
            body.push(syn::Stmt::Expr(parse_quote!(#call), Some(Default::default())));
            body.push(syn::Stmt::Expr(parse_quote!(Vec::new()), None));
        }
        1 => {
            body.push(parse_quote! {
                let _ag_res0 = #call;
            });
            body.push(syn::Stmt::Expr(
                parse_quote!(vec![aspectrt::boxed(_ag_res0)]),
                None,
            ));
        }
        n => {
            let names: Vec<syn::Ident> = (0..n).map(res_ident).collect();
            body.push(parse_quote! {
                let (#(#names),*) = #call;
            });
            let boxed: Vec<syn::Expr> = names
                .iter()
                .map(|name| parse_quote!(aspectrt::boxed(#name)))
                .collect();
            body.push(syn::Stmt::Expr(parse_quote!(vec![#(#boxed),*]), None));
        }
    }

    parse_quote! {
        let _ag_thunk = Box::new(
            move |_ag_args: Vec<aspectrt::Value>| -> Vec<aspectrt::Value> { #(#body)* }
        );
    }
}

/// The accessor returns a callable of the call-site's original usage type:
/// a plain `fn` pointer for free functions, a receiver-capturing closure
/// for methods.
fn accessor_item(sig: &FnSig, proxy_ident: &syn::Ident, accessor_ident: &syn::Ident) -> syn::ItemFn {
    let param_tys: Vec<syn::Type> = sig.params.iter().map(|p| parse_type(&p.ty)).collect();
    let output = return_type(sig);

    let Some(recv) = &sig.receiver else {
        return parse_quote! {
            fn #accessor_ident() -> fn(#(#param_tys),*) #output {
                #proxy_ident
            }
        };
    };

    let rty = parse_type(&recv.ty);
    let names: Vec<syn::Ident> = (0..sig.params.len()).map(param_ident).collect();

    match recv.kind {
        ReceiverKind::Shared => parse_quote! {
            fn #accessor_ident(_ag_recv: &#rty) -> impl Fn(#(#param_tys),*) #output + '_ {
                move |#(#names: #param_tys),*| #proxy_ident(_ag_recv, #(#names),*)
            }
        },
        ReceiverKind::Exclusive => parse_quote! {
            fn #accessor_ident(_ag_recv: &mut #rty) -> impl FnMut(#(#param_tys),*) #output + '_ {
                move |#(#names: #param_tys),*| #proxy_ident(&mut *_ag_recv, #(#names),*)
            }
        },
        ReceiverKind::Owned => parse_quote! {
            fn #accessor_ident(_ag_recv: #rty) -> impl FnOnce(#(#param_tys),*) #output {
                move |#(#names: #param_tys),*| #proxy_ident(_ag_recv, #(#names),*)
            }
        },
    }
}

/// The expression substituted for the original node: a parenthesized
/// accessor invocation. For methods the receiver expression gets an
/// address-of adjustment when the receiver kind is borrowed but the
/// expression is value-typed, and a dereference adjustment in the
/// opposite case.
fn replacement_expr(m: &Match, node: &syn::Expr, accessor_ident: &syn::Ident) -> syn::Expr {
    match node {
        syn::Expr::Path(_) => parse_quote!((#accessor_ident())),
        syn::Expr::MethodCall(mc) => {
            let sig = &m.symbol.sig;
            let Some(recv) = &sig.receiver else {
                invariant_violation!(
                    "method call at {}:{}:{} matched a receiver-less symbol {}",
                    m.site.file.display(),
                    m.site.key.0,
                    m.site.key.1,
                    m.symbol.qualified
                );
            };
            let recv_expr = mc.receiver.as_ref().clone();
            let is_ref = m.site.receiver_is_ref;
            let adjusted: syn::Expr = match (recv.kind, is_ref) {
                (ReceiverKind::Shared, false) => parse_quote!(&#recv_expr),
                (ReceiverKind::Exclusive, false) => parse_quote!(&mut #recv_expr),
                (ReceiverKind::Owned, true) => parse_quote!(*#recv_expr),
                _ => recv_expr,
            };
            let args: Vec<syn::Expr> = mc.args.iter().cloned().collect();
            parse_quote!((#accessor_ident(#adjusted))(#(#args),*))
        }
        other => invariant_violation!(
            "unexpected node shape at substitution: {}",
            quote::quote!(#other)
        ),
    }
}
