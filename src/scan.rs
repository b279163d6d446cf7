//! Source scanner: turns Rust files into [`Declarations`].
//!
//! Only what resolution needs is extracted: structs with named fields, enums,
//! functions with their result expression, and `const`/`static` items. Macros
//! are not expanded and tuple structs are ignored. `cfg` attributes on inline
//! modules and `impl` blocks are carried onto the items inside them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use quote::ToTokens;
use syn::{Fields, ImplItem, Item, ReturnType};
use walkdir::WalkDir;

use crate::attrs;
use crate::cache::DeclarationSource;
use crate::classify::Classifier;
use crate::error::ConfscopeError;
use crate::index::Scope;
use crate::settings::{EngineSettings, PrefixSettings};
use crate::types::{
    ConstDeclaration, Declarations, EnumDeclaration, FeatureExpr, FieldDeclaration,
    FunctionDeclaration, RecordDeclaration, VariantDeclaration,
};

#[derive(Debug, Clone)]
pub struct Scanner {
    classifier: Classifier,
    prefix: PrefixSettings,
}

impl Scanner {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            classifier: Classifier::from_settings(&settings.types),
            prefix: settings.prefix.clone(),
        }
    }

    /// Parse one file's text.
    pub fn scan_source(
        &self,
        crate_name: &str,
        path: Option<&Path>,
        text: &str,
    ) -> Result<Declarations, ConfscopeError> {
        let file = syn::parse_file(text).map_err(|e| ConfscopeError::Syntax {
            path: path.map(Path::to_path_buf).unwrap_or_default(),
            message: e.to_string(),
        })?;
        let mut decls = Declarations::new(crate_name);
        let mut cx = FileContext {
            crate_name,
            path: path.map(Path::to_path_buf),
            decls: &mut decls,
        };
        self.visit_items(&file.items, None, &mut cx);
        decls.apply_prefix_impls();
        Ok(decls)
    }

    /// Scan every `.rs` file below `root`. Files that cannot be read as UTF-8
    /// or do not parse are skipped with a warning.
    pub fn scan_crate(&self, crate_name: &str, root: &Path) -> Result<Declarations, ConfscopeError> {
        let mut decls = Declarations::new(crate_name);
        let files = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || (e.file_name() != "target" && !is_hidden(e.file_name())));

        for entry in files {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "rs") {
                continue;
            }
            let text = match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable source file");
                    continue;
                }
            };
            match self.scan_source(crate_name, Some(path), &text) {
                Ok(found) => decls.merge(found),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping source file"),
            }
        }

        // Trait impls may live in a different file than the struct.
        decls.apply_prefix_impls();
        tracing::debug!(
            crate_name,
            records = decls.records.len(),
            enums = decls.enums.len(),
            functions = decls.functions.len(),
            "scanned crate"
        );
        Ok(decls)
    }

    fn visit_items(&self, items: &[Item], gate: Option<FeatureExpr>, cx: &mut FileContext<'_>) {
        for item in items {
            match item {
                Item::Struct(s) => {
                    let Fields::Named(named) = &s.fields else {
                        continue;
                    };
                    let fields = named
                        .named
                        .iter()
                        .filter_map(|f| self.field(f))
                        .collect();
                    cx.decls.records.push(RecordDeclaration {
                        name: s.ident.to_string(),
                        crate_name: cx.crate_name.to_string(),
                        path: cx.path.clone(),
                        fields,
                        derives: attrs::read_derives(&s.attrs),
                        config_prefix: attrs::read_prefix(&s.attrs, &self.prefix),
                        doc: attrs::read_doc(&s.attrs),
                        rename_all: attrs::read_rename_all(&s.attrs),
                        gate: FeatureExpr::and(gate.clone(), attrs::read_feature_gate(&s.attrs)),
                    });
                }
                Item::Enum(e) => {
                    let variants = e
                        .variants
                        .iter()
                        .map(|v| VariantDeclaration {
                            name: v.ident.to_string(),
                            attributes: attrs::read_field_attributes(&v.attrs),
                            doc: attrs::read_doc(&v.attrs),
                            gate: attrs::read_feature_gate(&v.attrs),
                        })
                        .collect();
                    cx.decls.enums.push(EnumDeclaration {
                        name: e.ident.to_string(),
                        crate_name: cx.crate_name.to_string(),
                        path: cx.path.clone(),
                        variants,
                        rename_all: attrs::read_rename_all(&e.attrs),
                        doc: attrs::read_doc(&e.attrs),
                        gate: FeatureExpr::and(gate.clone(), attrs::read_feature_gate(&e.attrs)),
                    });
                }
                Item::Fn(f) => {
                    cx.decls.functions.push(FunctionDeclaration {
                        name: f.sig.ident.to_string(),
                        crate_name: cx.crate_name.to_string(),
                        owner: None,
                        return_type: return_type(&f.sig.output),
                        body: attrs::result_expr(&f.block.stmts).map(token_text),
                        gate: FeatureExpr::and(gate.clone(), attrs::read_feature_gate(&f.attrs)),
                    });
                }
                Item::Const(c) => cx.decls.consts.push(ConstDeclaration {
                    name: c.ident.to_string(),
                    crate_name: cx.crate_name.to_string(),
                    owner: None,
                    ty: render_type(&c.ty),
                    value: token_text(&c.expr),
                    gate: FeatureExpr::and(gate.clone(), attrs::read_feature_gate(&c.attrs)),
                }),
                Item::Static(s) => cx.decls.consts.push(ConstDeclaration {
                    name: s.ident.to_string(),
                    crate_name: cx.crate_name.to_string(),
                    owner: None,
                    ty: render_type(&s.ty),
                    value: token_text(&s.expr),
                    gate: FeatureExpr::and(gate.clone(), attrs::read_feature_gate(&s.attrs)),
                }),
                Item::Impl(imp) => self.visit_impl(imp, gate.clone(), cx),
                Item::Mod(m) => {
                    if let Some((_, inner)) = &m.content {
                        let gate = FeatureExpr::and(gate.clone(), attrs::read_feature_gate(&m.attrs));
                        self.visit_items(inner, gate, cx);
                    }
                }
                _ => {}
            }
        }
    }

    fn visit_impl(&self, imp: &syn::ItemImpl, gate: Option<FeatureExpr>, cx: &mut FileContext<'_>) {
        if let Some(prefix) = attrs::read_impl_prefix(imp, &self.prefix) {
            cx.decls.prefix_impls.push(prefix);
        }
        let Some(owner) = attrs::type_name(&imp.self_ty) else {
            return;
        };
        let gate = FeatureExpr::and(gate, attrs::read_feature_gate(&imp.attrs));
        for item in &imp.items {
            match item {
                ImplItem::Fn(f) => cx.decls.functions.push(FunctionDeclaration {
                    name: f.sig.ident.to_string(),
                    crate_name: cx.crate_name.to_string(),
                    owner: Some(owner.clone()),
                    return_type: return_type(&f.sig.output),
                    body: attrs::result_expr(&f.block.stmts).map(token_text),
                    gate: FeatureExpr::and(gate.clone(), attrs::read_feature_gate(&f.attrs)),
                }),
                ImplItem::Const(c) => cx.decls.consts.push(ConstDeclaration {
                    name: c.ident.to_string(),
                    crate_name: cx.crate_name.to_string(),
                    owner: Some(owner.clone()),
                    ty: render_type(&c.ty),
                    value: token_text(&c.expr),
                    gate: FeatureExpr::and(gate.clone(), attrs::read_feature_gate(&c.attrs)),
                }),
                _ => {}
            }
        }
    }

    fn field(&self, field: &syn::Field) -> Option<FieldDeclaration> {
        let name = field.ident.as_ref()?.to_string();
        let ty = render_type(&field.ty);
        let (wrappers, inner_type) = self.classifier.unwrap(&ty);
        Some(FieldDeclaration {
            name,
            ty,
            wrappers,
            inner_type,
            attributes: attrs::read_field_attributes(&field.attrs),
            doc: attrs::read_doc(&field.attrs),
            visibility: attrs::read_visibility(&field.vis),
            gate: attrs::read_feature_gate(&field.attrs),
        })
    }
}

struct FileContext<'a> {
    crate_name: &'a str,
    path: Option<PathBuf>,
    decls: &'a mut Declarations,
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.') && n.len() > 1)
}

fn return_type(output: &ReturnType) -> Option<String> {
    match output {
        ReturnType::Default => None,
        ReturnType::Type(_, ty) => Some(render_type(ty)),
    }
}

fn token_text<T: ToTokens>(node: &T) -> String {
    node.to_token_stream().to_string()
}

/// Type text in compact form: `Option<Vec<String>>`, `&'static str`, `[u8; 4]`.
pub fn render_type(ty: &syn::Type) -> String {
    let raw = token_text(ty);
    let mut out = String::with_capacity(raw.len());
    let mut prev: Option<&str> = None;
    for token in raw.split_whitespace() {
        if let Some(prev) = prev {
            let glue_after = matches!(prev, "<" | "::" | "&" | "(" | "[" | "'") || prev.ends_with("::");
            let glue_before = matches!(token, "<" | ">" | "::" | "," | ")" | "]" | ";" | ">>")
                || token.starts_with("::");
            if !glue_after && !glue_before {
                out.push(' ');
            }
        }
        out.push_str(token);
        prev = Some(token);
    }
    out
}

/// Scans crates from directories on disk.
///
/// Project declarations are the current crate and other workspace members;
/// dependency declarations are the dependency closure.
#[derive(Debug, Clone)]
pub struct CrateSources {
    scanner: Scanner,
    roots: HashMap<String, PathBuf>,
}

impl CrateSources {
    pub fn new(scanner: Scanner) -> Self {
        Self {
            scanner,
            roots: HashMap::new(),
        }
    }

    /// Register the source directory of a crate.
    pub fn with_crate(mut self, name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(name.into(), root.into());
        self
    }

    fn scan<'a>(
        &self,
        crates: impl Iterator<Item = &'a str>,
    ) -> Result<Vec<Declarations>, ConfscopeError> {
        crates
            .filter_map(|name| self.roots.get(name).map(|root| (name, root)))
            .map(|(name, root)| self.scanner.scan_crate(name, root))
            .collect()
    }
}

impl DeclarationSource for CrateSources {
    fn project_declarations(&self, scope: &Scope) -> Result<Vec<Declarations>, ConfscopeError> {
        let crates = std::iter::once(scope.current.as_str()).chain(scope.workspace.iter().map(String::as_str));
        self.scan(crates)
    }

    fn dependency_declarations(&self, scope: &Scope) -> Result<Vec<Declarations>, ConfscopeError> {
        self.scan(scope.dependencies.iter().map(String::as_str))
    }
}
