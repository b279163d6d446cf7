//! Type index: the queryable view of every declaration visible from one crate.
//!
//! An index is built for a [`Scope`] (the crate being edited, its dependency
//! closure, and the other workspace members) and a [`FeatureResolver`].
//! Declarations of crates outside the scope are dropped, and so is anything
//! whose `cfg` gate is false for its crate's enabled features.
//!
//! Collisions are never errors. When two records claim the same prefix, or two
//! types share a simple name, all of them are kept in a deterministic order:
//! current crate first, then dependencies, then other workspace crates, ties
//! broken by file path and then by name. Lookups that need one answer take the
//! first.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::classify::{DeclaredKind, TypeLookup};
use crate::types::{
    ConstDeclaration, Declarations, EnumDeclaration, FeatureExpr, FunctionDeclaration,
    RecordDeclaration,
};

/// How close a crate is to the one being edited. Lower sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    Current,
    Dependency,
    Workspace,
}

/// The set of crates whose declarations an index may contain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Scope {
    pub current: String,
    pub dependencies: BTreeSet<String>,
    pub workspace: BTreeSet<String>,
}

impl Scope {
    pub fn new(current: impl Into<String>) -> Self {
        Self {
            current: current.into(),
            dependencies: BTreeSet::new(),
            workspace: BTreeSet::new(),
        }
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.insert(name.into());
        self
    }

    pub fn with_workspace_crate(mut self, name: impl Into<String>) -> Self {
        self.workspace.insert(name.into());
        self
    }

    /// `None` for crates the scope does not include.
    pub fn ownership(&self, crate_name: &str) -> Option<Ownership> {
        if crate_name == self.current {
            Some(Ownership::Current)
        } else if self.dependencies.contains(crate_name) {
            Some(Ownership::Dependency)
        } else if self.workspace.contains(crate_name) {
            Some(Ownership::Workspace)
        } else {
            None
        }
    }

    /// Every crate in the scope, current crate first.
    pub fn crates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.current.as_str())
            .chain(self.dependencies.iter().map(String::as_str))
            .chain(self.workspace.iter().map(String::as_str))
    }
}

/// Enabled features per crate.
pub trait FeatureResolver {
    fn enabled_features(&self, crate_name: &str) -> BTreeSet<String>;
}

impl FeatureResolver for HashMap<String, BTreeSet<String>> {
    fn enabled_features(&self, crate_name: &str) -> BTreeSet<String> {
        self.get(crate_name).cloned().unwrap_or_default()
    }
}

/// A simple per-crate feature table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    enabled: HashMap<String, BTreeSet<String>>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(mut self, crate_name: impl Into<String>, feature: impl Into<String>) -> Self {
        self.enabled
            .entry(crate_name.into())
            .or_default()
            .insert(feature.into());
        self
    }
}

impl FeatureResolver for FeatureSet {
    fn enabled_features(&self, crate_name: &str) -> BTreeSet<String> {
        self.enabled.enabled_features(crate_name)
    }
}

/// A record or enum registered under its simple name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "declaration", rename_all = "snake_case")]
pub enum TypeDecl {
    Record(Arc<RecordDeclaration>),
    Enum(Arc<EnumDeclaration>),
}

impl TypeDecl {
    pub fn crate_name(&self) -> &str {
        match self {
            Self::Record(r) => &r.crate_name,
            Self::Enum(e) => &e.crate_name,
        }
    }

    fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Record(r) => r.path.as_ref(),
            Self::Enum(e) => e.path.as_ref(),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Record(r) => &r.name,
            Self::Enum(e) => &e.name,
        }
    }
}

/// Immutable, shareable index over the declarations of one scope.
#[derive(Debug, Clone)]
pub struct TypeIndex {
    scope: Scope,
    prefixes: HashMap<String, Vec<Arc<RecordDeclaration>>>,
    types: HashMap<String, Vec<TypeDecl>>,
    functions: HashMap<String, Vec<Arc<FunctionDeclaration>>>,
    consts: HashMap<String, Vec<Arc<ConstDeclaration>>>,
}

impl TypeIndex {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Records claiming `prefix`, in precedence order. Prefixes are case-sensitive.
    pub fn records_for_prefix(&self, prefix: &str) -> &[Arc<RecordDeclaration>] {
        self.prefixes.get(prefix).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The record that wins `prefix`.
    pub fn primary(&self, prefix: &str) -> Option<&Arc<RecordDeclaration>> {
        self.records_for_prefix(prefix).first()
    }

    /// All known prefixes, sorted.
    pub fn prefixes(&self) -> Vec<&str> {
        let mut prefixes: Vec<&str> = self.prefixes.keys().map(String::as_str).collect();
        prefixes.sort_unstable();
        prefixes
    }

    /// Every declaration with this simple name, in precedence order.
    pub fn lookup(&self, name: &str) -> &[TypeDecl] {
        self.types.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The record named `name`, preferring one from `from_crate` when given.
    pub fn record_in(&self, name: &str, from_crate: Option<&str>) -> Option<&Arc<RecordDeclaration>> {
        let mut records = self.lookup(name).iter().filter_map(|decl| match decl {
            TypeDecl::Record(r) => Some(r),
            TypeDecl::Enum(_) => None,
        });
        let first = records.clone().next();
        match from_crate {
            Some(krate) => records.find(|r| r.crate_name == krate).or(first),
            None => first,
        }
    }

    pub fn record(&self, name: &str) -> Option<&Arc<RecordDeclaration>> {
        self.record_in(name, None)
    }

    pub fn enum_decl(&self, name: &str) -> Option<&Arc<EnumDeclaration>> {
        self.lookup(name).iter().find_map(|decl| match decl {
            TypeDecl::Enum(e) => Some(e),
            TypeDecl::Record(_) => None,
        })
    }

    /// Document-facing variant names of the enum `name`.
    pub fn enum_variants(&self, name: &str) -> Option<Vec<String>> {
        self.enum_decl(name).map(|e| e.variant_keys())
    }

    /// Functions named `name`, in precedence order.
    pub fn functions(&self, name: &str) -> &[Arc<FunctionDeclaration>] {
        self.functions.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn consts(&self, name: &str) -> &[Arc<ConstDeclaration>] {
        self.consts.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn record_count(&self) -> usize {
        self.types
            .values()
            .flatten()
            .filter(|decl| matches!(decl, TypeDecl::Record(_)))
            .count()
    }
}

impl TypeLookup for TypeIndex {
    fn declared_kind(&self, name: &str) -> Option<DeclaredKind> {
        match self.lookup(name).first()? {
            TypeDecl::Record(_) => Some(DeclaredKind::Record),
            TypeDecl::Enum(_) => Some(DeclaredKind::Enum),
        }
    }

    fn variants(&self, name: &str) -> Option<Vec<String>> {
        self.enum_variants(name)
    }
}

/// Builds a [`TypeIndex`] from scanner output.
pub struct IndexBuilder<'a> {
    scope: Scope,
    features: &'a dyn FeatureResolver,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(scope: Scope, features: &'a dyn FeatureResolver) -> Self {
        Self { scope, features }
    }

    pub fn build<'d>(self, sets: impl IntoIterator<Item = &'d Declarations>) -> TypeIndex {
        let mut prefixes: HashMap<String, Vec<Arc<RecordDeclaration>>> = HashMap::new();
        let mut types: HashMap<String, Vec<TypeDecl>> = HashMap::new();
        let mut functions: HashMap<String, Vec<Arc<FunctionDeclaration>>> = HashMap::new();
        let mut consts: HashMap<String, Vec<Arc<ConstDeclaration>>> = HashMap::new();
        let mut skipped_crates = 0usize;

        for decls in sets {
            if self.scope.ownership(&decls.crate_name).is_none() {
                skipped_crates += 1;
                continue;
            }
            let enabled = self.features.enabled_features(&decls.crate_name);
            let active = |gate: &Option<FeatureExpr>| gate.as_ref().is_none_or(|g| g.evaluate(&enabled));

            for record in decls.records.iter().filter(|r| active(&r.gate)) {
                let mut record = record.clone();
                record.fields.retain(|f| active(&f.gate));
                let record = Arc::new(record);
                if let Some(prefix) = &record.config_prefix {
                    prefixes
                        .entry(prefix.clone())
                        .or_default()
                        .push(Arc::clone(&record));
                }
                types
                    .entry(record.name.clone())
                    .or_default()
                    .push(TypeDecl::Record(record));
            }
            for decl in decls.enums.iter().filter(|e| active(&e.gate)) {
                let mut decl = decl.clone();
                decl.variants.retain(|v| active(&v.gate));
                types
                    .entry(decl.name.clone())
                    .or_default()
                    .push(TypeDecl::Enum(Arc::new(decl)));
            }
            for function in decls.functions.iter().filter(|f| active(&f.gate)) {
                functions
                    .entry(function.name.clone())
                    .or_default()
                    .push(Arc::new(function.clone()));
            }
            for constant in decls.consts.iter().filter(|c| active(&c.gate)) {
                consts
                    .entry(constant.name.clone())
                    .or_default()
                    .push(Arc::new(constant.clone()));
            }
        }

        let scope = &self.scope;
        for records in prefixes.values_mut() {
            records.sort_by(|a, b| {
                order(scope, &a.crate_name, a.path.as_ref(), &a.name).cmp(&order(
                    scope,
                    &b.crate_name,
                    b.path.as_ref(),
                    &b.name,
                ))
            });
        }
        for decls in types.values_mut() {
            decls.sort_by(|a, b| {
                order(scope, a.crate_name(), a.path(), a.name()).cmp(&order(
                    scope,
                    b.crate_name(),
                    b.path(),
                    b.name(),
                ))
            });
        }
        for functions in functions.values_mut() {
            functions.sort_by(|a, b| rank_cmp(scope, &a.crate_name, &b.crate_name));
        }
        for consts in consts.values_mut() {
            consts.sort_by(|a, b| rank_cmp(scope, &a.crate_name, &b.crate_name));
        }

        let index = TypeIndex {
            scope: self.scope,
            prefixes,
            types,
            functions,
            consts,
        };
        tracing::debug!(
            crate_name = %index.scope.current,
            prefixes = index.prefixes.len(),
            records = index.record_count(),
            skipped_crates,
            "built type index"
        );
        index
    }
}

fn order<'a>(
    scope: &Scope,
    crate_name: &str,
    path: Option<&'a PathBuf>,
    name: &'a str,
) -> (Option<Ownership>, Option<&'a PathBuf>, &'a str) {
    (scope.ownership(crate_name), path, name)
}

fn rank_cmp(scope: &Scope, a: &str, b: &str) -> Ordering {
    scope.ownership(a).cmp(&scope.ownership(b))
}
