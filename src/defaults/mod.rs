//! Default value evaluation.
//!
//! A field's default comes from `#[serde(default)]` (the type's `Default`
//! implementation) or `#[serde(default = "path")]` (a function). Type defaults
//! are derived from the field's classification. Functions are evaluated from
//! the token text of their result expression in two independent stages:
//!
//! 1. [`const_eval`] folds compile-time arithmetic over literals and `const`
//!    items.
//! 2. [`fallback`] recognizes a catalogue of common constructor shapes such as
//!    `"x".to_string()` or `Ipv4Addr::new(127, 0, 0, 1)`.
//!
//! Anything neither stage understands is an unresolvable default: `None`,
//! logged at `debug`.

pub mod const_eval;
pub mod fallback;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use syn::Expr;

use crate::classify::Classifier;
use crate::index::TypeIndex;
use crate::types::{DefaultAttr, FieldDeclaration, FunctionDeclaration, RecordDeclaration};

/// Bound on `const` indirections followed while folding.
pub const MAX_EVAL_DEPTH: usize = 8;

/// A default value, rendered the way it would be written in a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValueLiteral(toml::Value);

impl ValueLiteral {
    pub fn new(value: toml::Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &toml::Value {
        &self.0
    }

    pub fn into_value(self) -> toml::Value {
        self.0
    }
}

impl fmt::Display for ValueLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a default function reference appears.
#[derive(Debug, Clone, Copy)]
pub struct OwnerScope<'a> {
    /// Crate whose functions are searched.
    pub crate_name: &'a str,
    /// Type text to use when the reference is `Default::default`.
    pub type_hint: Option<&'a str>,
}

impl<'a> OwnerScope<'a> {
    pub fn new(crate_name: &'a str) -> Self {
        Self {
            crate_name,
            type_hint: None,
        }
    }

    pub fn with_type_hint(mut self, ty: &'a str) -> Self {
        self.type_hint = Some(ty);
        self
    }
}

/// Evaluates default functions against a type index.
pub struct DefaultEvaluator<'a> {
    index: &'a TypeIndex,
    classifier: &'a Classifier,
}

impl<'a> DefaultEvaluator<'a> {
    pub fn new(index: &'a TypeIndex, classifier: &'a Classifier) -> Self {
        Self { index, classifier }
    }

    /// Evaluate the function named by a `default = "..."` path.
    pub fn evaluate(&self, function: &str, scope: &OwnerScope<'_>) -> Option<ValueLiteral> {
        let path: Vec<&str> = function.split("::").map(str::trim).collect();
        let (name, owner) = match path.as_slice() {
            [] => return None,
            [name] => (*name, None),
            [.., owner, name] => (*name, Some(*owner)),
        };

        if name == "default" {
            match owner {
                Some("Default" | "Self") => {
                    return scope.type_hint.and_then(|ty| self.type_default(ty));
                }
                Some(ty) => {
                    if let Some(value) = self.type_default(ty) {
                        return Some(value);
                    }
                }
                None => {}
            }
        }

        let Some(function) = self.find_function(name, owner, scope.crate_name) else {
            if owner.is_some()
                && let Some(value) = self.constructor(function, scope)
            {
                return Some(value);
            }
            tracing::debug!(function, crate_name = scope.crate_name, "default function not found");
            return None;
        };
        let value = self.evaluate_function(&function);
        if value.is_none() {
            tracing::debug!(function = %function.name, "unresolvable default");
        }
        value
    }

    /// Default of a declared field, if it has one.
    pub fn evaluate_field(
        &self,
        field: &FieldDeclaration,
        owner: &RecordDeclaration,
    ) -> Option<ValueLiteral> {
        match field.default_attr()? {
            DefaultAttr::TypeDefault => {
                let class = self.classifier.classify_field(field, self.index);
                self.classifier
                    .example_value(&class, self.index)
                    .map(ValueLiteral)
            }
            DefaultAttr::Function(path) => self.evaluate(
                &path,
                &OwnerScope::new(&owner.crate_name).with_type_hint(&field.ty),
            ),
        }
    }

    /// `Vec::new` or `HashMap::default` named directly: read it as a call
    /// with no arguments.
    fn constructor(&self, function: &str, scope: &OwnerScope<'_>) -> Option<ValueLiteral> {
        let expr = syn::parse_str::<Expr>(&format!("{function}()")).ok()?;
        let cx = EvalContext {
            index: self.index,
            classifier: self.classifier,
            crate_name: scope.crate_name,
            owner: None,
            return_type: scope.type_hint,
            depth: 0,
        };
        fallback::recognize(&expr, &cx).map(ValueLiteral)
    }

    fn type_default(&self, ty: &str) -> Option<ValueLiteral> {
        let class = self.classifier.classify(ty, self.index);
        self.classifier
            .example_value(&class, self.index)
            .map(ValueLiteral)
    }

    /// Same crate only. An impl method of the named owner wins over a free
    /// function, which wins over a method of any other type.
    fn find_function(
        &self,
        name: &str,
        owner: Option<&str>,
        crate_name: &str,
    ) -> Option<Arc<FunctionDeclaration>> {
        let candidates: Vec<&Arc<FunctionDeclaration>> = self
            .index
            .functions(name)
            .iter()
            .filter(|f| f.crate_name == crate_name)
            .collect();
        let by_owner = owner.and_then(|owner| {
            candidates
                .iter()
                .find(|f| f.owner.as_deref() == Some(owner))
        });
        by_owner
            .or_else(|| candidates.iter().find(|f| f.owner.is_none()))
            .or_else(|| candidates.first())
            .map(|f| Arc::clone(f))
    }

    fn evaluate_function(&self, function: &FunctionDeclaration) -> Option<ValueLiteral> {
        let body = function.body.as_deref()?;
        let expr = syn::parse_str::<Expr>(body).ok()?;
        let cx = EvalContext {
            index: self.index,
            crate_name: &function.crate_name,
            owner: function.owner.as_deref(),
            return_type: function.return_type.as_deref(),
            classifier: self.classifier,
            depth: 0,
        };
        value_of(&expr, &cx).map(ValueLiteral)
    }
}

/// What both evaluation stages can see.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub index: &'a TypeIndex,
    pub classifier: &'a Classifier,
    pub crate_name: &'a str,
    /// Self type of the function being evaluated.
    pub owner: Option<&'a str>,
    /// Declared return type, used to read `"8080".parse()` as a number.
    pub return_type: Option<&'a str>,
    pub depth: usize,
}

impl EvalContext<'_> {
    fn deeper(&self) -> Option<Self> {
        (self.depth < MAX_EVAL_DEPTH).then(|| Self {
            depth: self.depth + 1,
            ..*self
        })
    }
}

/// Constant folding first, then the fallback catalogue.
pub fn value_of(expr: &Expr, cx: &EvalContext<'_>) -> Option<toml::Value> {
    const_eval::fold(expr, cx)
        .and_then(|c| c.into_value())
        .or_else(|| fallback::recognize(expr, cx))
}
