//! Declarations produced by scanning source code.
//!
//! Everything here is plain owned data: a scanner builds these values once per
//! source change and the index builder consumes them. None of the types hold
//! parser state, so snapshots built from them can be shared across threads.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use convert_case::{Case, Casing};
use serde::Serialize;

/// A generic container peeled off a field type on the way to its innermost type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapperKind {
    /// `Option<T>`.
    Optional,
    /// `Vec<T>`, `VecDeque<T>`, `[T; N]`, `[T]`.
    Sequence,
    /// `Box<T>`, `Arc<T>`, `Rc<T>`, `Cow<'_, T>` and similar.
    Pointer,
}

/// Field or variant renaming applied by a container-level `rename_all` rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RenameRule {
    #[serde(rename = "lowercase")]
    Lower,
    #[serde(rename = "UPPERCASE")]
    Upper,
    #[serde(rename = "PascalCase")]
    Pascal,
    #[serde(rename = "camelCase")]
    Camel,
    #[serde(rename = "snake_case")]
    Snake,
    #[serde(rename = "SCREAMING_SNAKE_CASE")]
    ScreamingSnake,
    #[serde(rename = "kebab-case")]
    Kebab,
    #[serde(rename = "SCREAMING-KEBAB-CASE")]
    ScreamingKebab,
}

impl RenameRule {
    /// Parse the string form used in `#[serde(rename_all = "...")]`.
    pub fn parse(rule: &str) -> Option<Self> {
        let rule = match rule {
            "lowercase" => Self::Lower,
            "UPPERCASE" => Self::Upper,
            "PascalCase" => Self::Pascal,
            "camelCase" => Self::Camel,
            "snake_case" => Self::Snake,
            "SCREAMING_SNAKE_CASE" => Self::ScreamingSnake,
            "kebab-case" => Self::Kebab,
            "SCREAMING-KEBAB-CASE" => Self::ScreamingKebab,
            _ => return None,
        };
        Some(rule)
    }

    pub fn apply(self, name: &str) -> String {
        match self {
            Self::Lower => name.to_lowercase(),
            Self::Upper => name.to_uppercase(),
            Self::Pascal => name.to_case(Case::Pascal),
            Self::Camel => name.to_case(Case::Camel),
            Self::Snake => name.to_case(Case::Snake),
            Self::ScreamingSnake => name.to_case(Case::UpperSnake),
            Self::Kebab => name.to_case(Case::Kebab),
            Self::ScreamingKebab => name.to_case(Case::Kebab).to_uppercase(),
        }
    }
}

/// Declared visibility of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Crate,
    Restricted(String),
    Private,
}

/// The value of one sub-attribute inside `#[serde(...)]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "form", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    /// Flag-only form, e.g. `flatten`.
    Flag,
    /// `key = "string"`.
    Str(String),
    /// Anything else, kept as token text, e.g. `with = module` or `rename(serialize = "a")`.
    Raw(String),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// How a field obtains its value when the document omits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "function", rename_all = "snake_case")]
pub enum DefaultAttr {
    /// Bare `default`: the field type's `Default` implementation.
    TypeDefault,
    /// `default = "path::to::function"`.
    Function(String),
}

/// Sub-attributes read from a field's serde annotations, in declaration order.
///
/// Unrecognized keys are kept so consumers can explain why a field behaves the
/// way it does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AttributeMap(Vec<(String, AttrValue)>);

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: AttrValue) {
        self.0.push((key.into(), value));
    }

    /// First value recorded for `key`.
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a AttrValue> + 'a {
        self.0.iter().filter(move |(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn extend(&mut self, other: AttributeMap) {
        self.0.extend(other.0);
    }

    pub fn rename(&self) -> Option<&str> {
        self.get("rename").and_then(AttrValue::as_str)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.get_all("alias").filter_map(AttrValue::as_str)
    }

    pub fn default_attr(&self) -> Option<DefaultAttr> {
        match self.get("default")? {
            AttrValue::Flag => Some(DefaultAttr::TypeDefault),
            AttrValue::Str(function) => Some(DefaultAttr::Function(function.clone())),
            AttrValue::Raw(_) => None,
        }
    }

    pub fn is_flatten(&self) -> bool {
        matches!(self.get("flatten"), Some(AttrValue::Flag))
    }

    /// `skip` and `skip_deserializing` both hide a field from documents.
    pub fn is_skip(&self) -> bool {
        matches!(self.get("skip"), Some(AttrValue::Flag))
            || matches!(self.get("skip_deserializing"), Some(AttrValue::Flag))
    }
}

/// A conditional-compilation predicate read from `#[cfg(...)]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureExpr {
    Feature(String),
    Not(Box<FeatureExpr>),
    All(Vec<FeatureExpr>),
    Any(Vec<FeatureExpr>),
    /// A predicate that is not about features, e.g. `test` or `unix`.
    Cfg(String),
}

impl FeatureExpr {
    /// Evaluate against the enabled features of one crate.
    ///
    /// `cfg(test)` is false: test-only declarations never shape a document.
    /// Other non-feature predicates are assumed true.
    pub fn evaluate(&self, enabled: &BTreeSet<String>) -> bool {
        match self {
            Self::Feature(name) => enabled.contains(name),
            Self::Not(inner) => !inner.evaluate(enabled),
            Self::All(all) => all.iter().all(|e| e.evaluate(enabled)),
            Self::Any(any) => any.iter().any(|e| e.evaluate(enabled)),
            Self::Cfg(predicate) => predicate != "test",
        }
    }

    /// Conjunction of two optional gates.
    pub fn and(left: Option<FeatureExpr>, right: Option<FeatureExpr>) -> Option<FeatureExpr> {
        match (left, right) {
            (None, gate) | (gate, None) => gate,
            (Some(FeatureExpr::All(mut all)), Some(other)) => {
                all.push(other);
                Some(FeatureExpr::All(all))
            }
            (Some(left), Some(right)) => Some(FeatureExpr::All(vec![left, right])),
        }
    }
}

impl fmt::Display for FeatureExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, name: &str, items: &[FeatureExpr]) -> fmt::Result {
            write!(f, "{name}(")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{item}")?;
            }
            write!(f, ")")
        }
        match self {
            Self::Feature(name) => write!(f, "feature = \"{name}\""),
            Self::Not(inner) => write!(f, "not({inner})"),
            Self::All(all) => list(f, "all", all),
            Self::Any(any) => list(f, "any", any),
            Self::Cfg(predicate) => write!(f, "{predicate}"),
        }
    }
}

/// One named field of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDeclaration {
    pub name: String,
    /// Type as written, normalized to single-space token form.
    pub ty: String,
    /// Wrappers peeled from `ty`, outermost first.
    pub wrappers: Vec<WrapperKind>,
    /// Simple name of the innermost type.
    pub inner_type: String,
    pub attributes: AttributeMap,
    pub doc: Option<String>,
    pub visibility: Visibility,
    pub gate: Option<FeatureExpr>,
}

impl FieldDeclaration {
    /// The key this field is written under in a document.
    pub fn key(&self, rename_all: Option<RenameRule>) -> String {
        if let Some(rename) = self.attributes.rename() {
            return rename.to_string();
        }
        match rename_all {
            Some(rule) => rule.apply(&self.name),
            None => self.name.clone(),
        }
    }

    /// Whether `key` addresses this field, through its key or any alias.
    pub fn answers_to(&self, key: &str, rename_all: Option<RenameRule>) -> bool {
        self.key(rename_all) == key || self.attributes.aliases().any(|alias| alias == key)
    }

    pub fn is_flattened(&self) -> bool {
        self.attributes.is_flatten()
    }

    pub fn is_skipped(&self) -> bool {
        self.attributes.is_skip()
    }

    pub fn default_attr(&self) -> Option<DefaultAttr> {
        self.attributes.default_attr()
    }
}

/// A struct with named fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordDeclaration {
    pub name: String,
    pub crate_name: String,
    pub path: Option<PathBuf>,
    pub fields: Vec<FieldDeclaration>,
    pub derives: Vec<String>,
    pub config_prefix: Option<String>,
    pub doc: Option<String>,
    pub rename_all: Option<RenameRule>,
    pub gate: Option<FeatureExpr>,
}

impl RecordDeclaration {
    pub fn derives(&self, name: &str) -> bool {
        self.derives.iter().any(|d| d == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantDeclaration {
    pub name: String,
    pub attributes: AttributeMap,
    pub doc: Option<String>,
    pub gate: Option<FeatureExpr>,
}

/// An enum, used only as a leaf classification target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumDeclaration {
    pub name: String,
    pub crate_name: String,
    pub path: Option<PathBuf>,
    pub variants: Vec<VariantDeclaration>,
    pub rename_all: Option<RenameRule>,
    pub doc: Option<String>,
    pub gate: Option<FeatureExpr>,
}

impl EnumDeclaration {
    /// Variant names as they appear in a document.
    pub fn variant_keys(&self) -> Vec<String> {
        self.variants
            .iter()
            .filter(|v| !v.attributes.is_skip())
            .map(|v| match v.attributes.rename() {
                Some(rename) => rename.to_string(),
                None => match self.rename_all {
                    Some(rule) => rule.apply(&v.name),
                    None => v.name.clone(),
                },
            })
            .collect()
    }
}

/// A function whose tail expression may produce a default value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub crate_name: String,
    /// Self type of the enclosing `impl` block, if any.
    pub owner: Option<String>,
    pub return_type: Option<String>,
    /// Token text of the tail expression, or of the first `return` expression.
    pub body: Option<String>,
    pub gate: Option<FeatureExpr>,
}

/// A `const` or `static` item usable during constant folding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstDeclaration {
    pub name: String,
    pub crate_name: String,
    pub owner: Option<String>,
    pub ty: String,
    pub value: String,
    pub gate: Option<FeatureExpr>,
}

/// Everything a scanner found in one crate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Declarations {
    pub crate_name: String,
    pub records: Vec<RecordDeclaration>,
    pub enums: Vec<EnumDeclaration>,
    pub functions: Vec<FunctionDeclaration>,
    pub consts: Vec<ConstDeclaration>,
    /// Prefixes returned from trait implementations, by self type name.
    pub prefix_impls: Vec<(String, String)>,
}

impl Declarations {
    pub fn new(crate_name: impl Into<String>) -> Self {
        Self {
            crate_name: crate_name.into(),
            ..Self::default()
        }
    }

    pub fn merge(&mut self, other: Declarations) {
        self.records.extend(other.records);
        self.enums.extend(other.enums);
        self.functions.extend(other.functions);
        self.consts.extend(other.consts);
        self.prefix_impls.extend(other.prefix_impls);
    }

    /// Give records without a prefix attribute the prefix returned by their
    /// trait implementation, if one was found anywhere in the crate.
    pub fn apply_prefix_impls(&mut self) {
        for record in &mut self.records {
            if record.config_prefix.is_some() {
                continue;
            }
            if let Some((_, prefix)) = self.prefix_impls.iter().find(|(ty, _)| *ty == record.name)
            {
                record.config_prefix = Some(prefix.clone());
            }
        }
    }
}
