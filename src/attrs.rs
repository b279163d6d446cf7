//! Attribute reading.
//!
//! Extracts configuration metadata from `syn` attribute lists: the record
//! prefix, serde field attributes, `cfg` feature gates, doc comments and
//! rename rules. Reading is lenient throughout: an attribute that fails to
//! parse is treated as absent, so half-typed source still yields whatever can
//! be read from it.

use proc_macro2::TokenStream;
use quote::ToTokens;
use syn::punctuated::Punctuated;
use syn::{Attribute, Expr, ExprLit, ImplItem, ItemImpl, Lit, Meta, Stmt, Token, Type};

use crate::settings::PrefixSettings;
use crate::types::{AttrValue, AttributeMap, FeatureExpr, RenameRule, Visibility};

/// Read `#[config_prefix = "web"]` (or `#[config_prefix("web")]`).
pub fn read_prefix(attrs: &[Attribute], settings: &PrefixSettings) -> Option<String> {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident(&settings.attribute))
        .find_map(|attr| match &attr.meta {
            Meta::NameValue(nv) => string_literal(&nv.value),
            Meta::List(_) => attr.parse_args::<syn::LitStr>().ok().map(|s| s.value()),
            Meta::Path(_) => None,
        })
}

/// Read a prefix returned from the prefix trait's method:
///
/// ```ignore
/// impl Configurable for WebConfig {
///     fn config_prefix() -> &'static str { "web" }
/// }
/// ```
///
/// Returns `(self type name, prefix)`.
pub fn read_impl_prefix(item: &ItemImpl, settings: &PrefixSettings) -> Option<(String, String)> {
    let (_, trait_path, _) = item.trait_.as_ref()?;
    let trait_name = trait_path.segments.last()?.ident.to_string();
    if trait_name != settings.trait_name {
        return None;
    }
    let self_ty = type_name(&item.self_ty)?;
    let prefix = item.items.iter().find_map(|impl_item| match impl_item {
        ImplItem::Fn(f) if f.sig.ident == settings.method => {
            result_expr(&f.block.stmts).and_then(string_literal)
        }
        _ => None,
    })?;
    Some((self_ty, prefix))
}

/// Collect the sub-attributes of every `#[serde(...)]` list.
///
/// `rename`, `default`, `flatten` and `skip` are the keys consumers act on;
/// everything else is preserved with its raw value.
pub fn read_field_attributes(attrs: &[Attribute]) -> AttributeMap {
    let mut map = AttributeMap::new();
    for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
        let mut parsed = AttributeMap::new();
        let result = attr.parse_nested_meta(|meta| {
            let key = meta.path.to_token_stream().to_string().replace(' ', "");
            if meta.input.peek(Token![=]) {
                let expr: Expr = meta.value()?.parse()?;
                let value = match string_literal(&expr) {
                    Some(s) => AttrValue::Str(s),
                    None => AttrValue::Raw(expr.to_token_stream().to_string()),
                };
                parsed.insert(key, value);
            } else if meta.input.peek(syn::token::Paren) {
                let content;
                syn::parenthesized!(content in meta.input);
                let tokens: TokenStream = content.parse()?;
                let deserialize_name = match key.as_str() {
                    "rename" | "alias" => deserialize_side(tokens.clone()),
                    _ => None,
                };
                match deserialize_name {
                    Some(name) => parsed.insert(key, AttrValue::Str(name)),
                    None => parsed.insert(key, AttrValue::Raw(tokens.to_string())),
                }
            } else {
                parsed.insert(key, AttrValue::Flag);
            }
            Ok(())
        });
        if result.is_ok() {
            map.extend(parsed);
        }
    }
    map
}

/// Read the container-level `#[serde(rename_all = "...")]` rule.
pub fn read_rename_all(attrs: &[Attribute]) -> Option<RenameRule> {
    let map = read_field_attributes(attrs);
    match map.get("rename_all")? {
        AttrValue::Str(rule) => RenameRule::parse(rule),
        AttrValue::Flag | AttrValue::Raw(_) => None,
    }
}

/// Combine every `#[cfg(...)]` on a declaration into one gate.
pub fn read_feature_gate(attrs: &[Attribute]) -> Option<FeatureExpr> {
    let gates: Vec<FeatureExpr> = attrs
        .iter()
        .filter(|a| a.path().is_ident("cfg"))
        .filter_map(|a| a.parse_args::<Meta>().ok())
        .map(|meta| cfg_expr(&meta))
        .collect();
    match gates.len() {
        0 => None,
        1 => gates.into_iter().next(),
        _ => Some(FeatureExpr::All(gates)),
    }
}

/// Join `///` lines into one doc string.
pub fn read_doc(attrs: &[Attribute]) -> Option<String> {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|a| a.path().is_ident("doc"))
        .filter_map(|a| match &a.meta {
            Meta::NameValue(nv) => string_literal(&nv.value),
            _ => None,
        })
        .map(|line| line.strip_prefix(' ').unwrap_or(&line).trim_end().to_string())
        .collect();
    let doc = lines.join("\n").trim().to_string();
    (!doc.is_empty()).then_some(doc)
}

/// Names listed in `#[derive(...)]`, by last path segment.
pub fn read_derives(attrs: &[Attribute]) -> Vec<String> {
    attrs
        .iter()
        .filter(|a| a.path().is_ident("derive"))
        .filter_map(|a| {
            a.parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)
                .ok()
        })
        .flat_map(|paths| {
            paths
                .into_iter()
                .filter_map(|p| p.segments.last().map(|s| s.ident.to_string()))
        })
        .collect()
}

pub fn read_visibility(vis: &syn::Visibility) -> Visibility {
    match vis {
        syn::Visibility::Public(_) => Visibility::Public,
        syn::Visibility::Restricted(r) if r.path.is_ident("crate") => Visibility::Crate,
        syn::Visibility::Restricted(r) => {
            Visibility::Restricted(r.path.to_token_stream().to_string().replace(' ', ""))
        }
        syn::Visibility::Inherited => Visibility::Private,
    }
}

/// Simple name of a path type: `crate::web::WebConfig` gives `WebConfig`.
pub fn type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(p) => p.path.segments.last().map(|s| s.ident.to_string()),
        Type::Group(g) => type_name(&g.elem),
        Type::Paren(p) => type_name(&p.elem),
        _ => None,
    }
}

/// The expression a block evaluates to: its tail expression, or failing that,
/// the operand of the first top-level `return`.
pub fn result_expr(stmts: &[Stmt]) -> Option<&Expr> {
    if let Some(Stmt::Expr(expr, None)) = stmts.last() {
        return Some(unwrap_return(expr));
    }
    stmts.iter().find_map(|stmt| match stmt {
        Stmt::Expr(Expr::Return(ret), _) => ret.expr.as_deref(),
        _ => None,
    })
}

fn unwrap_return(expr: &Expr) -> &Expr {
    match expr {
        Expr::Return(ret) => ret.expr.as_deref().unwrap_or(expr),
        _ => expr,
    }
}

/// A string literal, looking through parentheses, groups, references and `return`.
pub fn string_literal(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(s), ..
        }) => Some(s.value()),
        Expr::Paren(p) => string_literal(&p.expr),
        Expr::Group(g) => string_literal(&g.expr),
        Expr::Reference(r) => string_literal(&r.expr),
        Expr::Return(r) => r.expr.as_deref().and_then(string_literal),
        Expr::Block(b) => result_expr(&b.block.stmts).and_then(string_literal),
        _ => None,
    }
}

/// `rename(deserialize = "a", serialize = "b")` gives `a`.
fn deserialize_side(tokens: TokenStream) -> Option<String> {
    let parser = Punctuated::<syn::MetaNameValue, Token![,]>::parse_terminated;
    let pairs = syn::parse::Parser::parse2(parser, tokens).ok()?;
    pairs
        .iter()
        .find(|nv| nv.path.is_ident("deserialize"))
        .and_then(|nv| string_literal(&nv.value))
}

fn cfg_expr(meta: &Meta) -> FeatureExpr {
    match meta {
        Meta::NameValue(nv) if nv.path.is_ident("feature") => match string_literal(&nv.value) {
            Some(feature) => FeatureExpr::Feature(feature),
            None => FeatureExpr::Cfg(meta.to_token_stream().to_string()),
        },
        Meta::List(list) => {
            let nested = list
                .parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)
                .map(|items| items.iter().map(cfg_expr).collect::<Vec<_>>());
            let Ok(mut nested) = nested else {
                return FeatureExpr::Cfg(meta.to_token_stream().to_string());
            };
            if list.path.is_ident("not") && nested.len() == 1 {
                FeatureExpr::Not(Box::new(nested.remove(0)))
            } else if list.path.is_ident("all") {
                FeatureExpr::All(nested)
            } else if list.path.is_ident("any") {
                FeatureExpr::Any(nested)
            } else {
                FeatureExpr::Cfg(meta.to_token_stream().to_string())
            }
        }
        Meta::Path(path) => FeatureExpr::Cfg(path.to_token_stream().to_string()),
        Meta::NameValue(_) => FeatureExpr::Cfg(meta.to_token_stream().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn prefix_settings() -> PrefixSettings {
        crate::fixtures::test::settings().prefix
    }

    fn attrs_of(item: syn::ItemStruct) -> Vec<Attribute> {
        item.attrs
    }

    #[test]
    fn prefix_from_name_value_attribute() {
        let attrs = attrs_of(parse_quote! {
            #[derive(Debug, Configurable, Deserialize)]
            #[config_prefix = "web"]
            struct WebConfig {}
        });
        assert_eq!(read_prefix(&attrs, &prefix_settings()), Some("web".into()));
    }

    #[test]
    fn prefix_from_list_attribute() {
        let attrs = attrs_of(parse_quote! {
            #[config_prefix("redis")]
            struct RedisConfig {}
        });
        assert_eq!(read_prefix(&attrs, &prefix_settings()), Some("redis".into()));
    }

    #[test]
    fn missing_or_malformed_prefix_is_absent() {
        let attrs = attrs_of(parse_quote! {
            #[config_prefix = 42]
            struct Odd {}
        });
        assert_eq!(read_prefix(&attrs, &prefix_settings()), None);
        let bare = attrs_of(parse_quote! {
            #[config_prefix]
            struct Bare {}
        });
        assert_eq!(read_prefix(&bare, &prefix_settings()), None);
    }

    #[test]
    fn prefix_from_trait_impl() {
        let item: ItemImpl = parse_quote! {
            impl Configurable for crate::mail::MailConfig {
                fn config_prefix() -> &'static str {
                    "mail"
                }
            }
        };
        assert_eq!(
            read_impl_prefix(&item, &prefix_settings()),
            Some(("MailConfig".into(), "mail".into()))
        );
    }

    #[test]
    fn prefix_from_trait_impl_with_return() {
        let item: ItemImpl = parse_quote! {
            impl Configurable for MailConfig {
                fn config_prefix() -> &'static str {
                    return "mail";
                }
            }
        };
        assert_eq!(
            read_impl_prefix(&item, &prefix_settings()),
            Some(("MailConfig".into(), "mail".into()))
        );
    }

    #[test]
    fn other_trait_impls_are_ignored() {
        let item: ItemImpl = parse_quote! {
            impl Display for MailConfig {
                fn config_prefix() -> &'static str { "mail" }
            }
        };
        assert_eq!(read_impl_prefix(&item, &prefix_settings()), None);
    }

    #[test]
    fn serde_field_attributes() {
        let field: syn::Field = parse_quote! {
            #[serde(rename = "bind", default = "default_port", flatten, skip, with = humantime_serde)]
            pub port: u16
        };
        let map = read_field_attributes(&field.attrs);
        assert_eq!(map.rename(), Some("bind"));
        assert_eq!(
            map.get("default"),
            Some(&AttrValue::Str("default_port".into()))
        );
        assert!(map.is_flatten());
        assert!(map.is_skip());
        assert_eq!(map.get("with"), Some(&AttrValue::Raw("humantime_serde".into())));
    }

    #[test]
    fn bare_default_is_a_flag() {
        let field: syn::Field = parse_quote! {
            #[serde(default)]
            pub enabled: bool
        };
        let map = read_field_attributes(&field.attrs);
        assert_eq!(map.get("default"), Some(&AttrValue::Flag));
    }

    #[test]
    fn rename_deserialize_side() {
        let field: syn::Field = parse_quote! {
            #[serde(rename(serialize = "out", deserialize = "in"))]
            pub value: u8
        };
        assert_eq!(read_field_attributes(&field.attrs).rename(), Some("in"));
    }

    #[test]
    fn attributes_across_several_serde_lists() {
        let field: syn::Field = parse_quote! {
            #[serde(alias = "addr")]
            #[doc = "ignored"]
            #[serde(alias = "address")]
            pub host: String
        };
        let map = read_field_attributes(&field.attrs);
        assert_eq!(map.aliases().collect::<Vec<_>>(), vec!["addr", "address"]);
    }

    #[test]
    fn unparsable_serde_list_is_dropped() {
        let field: syn::Field = parse_quote! {
            #[serde(rename = )]
            #[serde(flatten)]
            pub inner: Inner
        };
        let map = read_field_attributes(&field.attrs);
        assert!(map.rename().is_none());
        assert!(map.is_flatten());
    }

    #[test]
    fn rename_all_rule() {
        let attrs = attrs_of(parse_quote! {
            #[serde(rename_all = "kebab-case", deny_unknown_fields)]
            struct S {}
        });
        assert_eq!(read_rename_all(&attrs), Some(RenameRule::Kebab));
    }

    #[test]
    fn feature_gates() {
        let attrs = attrs_of(parse_quote! {
            #[cfg(feature = "postgres")]
            #[cfg(not(any(feature = "lite", test)))]
            struct S {}
        });
        assert_eq!(
            read_feature_gate(&attrs),
            Some(FeatureExpr::All(vec![
                FeatureExpr::Feature("postgres".into()),
                FeatureExpr::Not(Box::new(FeatureExpr::Any(vec![
                    FeatureExpr::Feature("lite".into()),
                    FeatureExpr::Cfg("test".into()),
                ]))),
            ]))
        );
    }

    #[test]
    fn no_cfg_means_no_gate() {
        let attrs = attrs_of(parse_quote! {
            #[derive(Debug)]
            struct S {}
        });
        assert_eq!(read_feature_gate(&attrs), None);
    }

    #[test]
    fn doc_lines_are_joined() {
        let attrs = attrs_of(parse_quote! {
            /// Web server settings.
            ///
            /// Bound at startup.
            struct S {}
        });
        assert_eq!(
            read_doc(&attrs).as_deref(),
            Some("Web server settings.\n\nBound at startup.")
        );
    }

    #[test]
    fn derive_names() {
        let attrs = attrs_of(parse_quote! {
            #[derive(Debug, serde::Deserialize, Configurable)]
            struct S {}
        });
        assert_eq!(read_derives(&attrs), vec!["Debug", "Deserialize", "Configurable"]);
    }
}
