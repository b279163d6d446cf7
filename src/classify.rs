//! Semantic classification of field types.
//!
//! Classification works on the textual form of a type. Wrapper generics
//! (`Option`, `Vec`, `Box`, ...) are peeled left to right until the first
//! segment that is not a wrapper; that segment is the innermost type. Results
//! are computed per call and never cached, because they depend on nothing but
//! the type text and the declared names visible through a [`TypeLookup`].
//!
//! Map and set detection is a substring match on the container name
//! (`FxHashMap` counts as a map). A user type whose name merely contains
//! `HashMap` is classified as a map as well; that approximation is kept on
//! purpose.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::settings::TypeSettings;
use crate::types::{FieldDeclaration, WrapperKind};

/// Upper bound on peeled wrappers; pathological type text stops here.
pub const MAX_WRAPPER_DEPTH: usize = 16;

const MAP_NAMES: &[&str] = &["HashMap", "BTreeMap", "IndexMap"];
const SET_NAMES: &[&str] = &["HashSet", "BTreeSet", "IndexSet"];

const INT_NAMES: &[&str] = &[
    "u8", "u16", "u32", "u64", "u128", "usize", "i8", "i16", "i32", "i64", "i128", "isize",
];
const FLOAT_NAMES: &[&str] = &["f32", "f64"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericKind {
    Int,
    Float,
}

/// The value space a configuration key accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeClass {
    Bool,
    Numeric(NumericKind),
    StringLike,
    Enum,
    Map,
    Set,
    Sequence,
    Record,
    Unknown,
}

/// Whether a name is declared as a record or an enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredKind {
    Record,
    Enum,
}

/// Name lookup the classifier needs to tell records, enums and unknown types apart.
pub trait TypeLookup {
    fn declared_kind(&self, name: &str) -> Option<DeclaredKind>;

    /// Document-facing variant names of an enum.
    fn variants(&self, _name: &str) -> Option<Vec<String>> {
        None
    }
}

/// A lookup that knows no declarations; records and enums classify as `Unknown`.
pub struct NoTypes;

impl TypeLookup for NoTypes {
    fn declared_kind(&self, _name: &str) -> Option<DeclaredKind> {
        None
    }
}

/// Result of classifying one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// First category that is not transparent: `Sequence` for `Option<Vec<String>>`.
    pub class: TypeClass,
    /// Category of the innermost type: `StringLike` for `Option<Vec<String>>`.
    pub leaf: TypeClass,
    pub wrappers: Vec<WrapperKind>,
    /// Simple name of the innermost type.
    pub inner: String,
}

impl Classification {
    pub fn is_optional(&self) -> bool {
        self.wrappers.first() == Some(&WrapperKind::Optional)
    }

    /// A record reachable without passing through a sequence.
    pub fn is_record(&self) -> bool {
        self.class == TypeClass::Record
    }

    pub fn is_sequence_of_records(&self) -> bool {
        self.class == TypeClass::Sequence && self.leaf == TypeClass::Record
    }

    /// Maps and sets have no statically known keys below them.
    pub fn is_dynamic(&self) -> bool {
        matches!(self.class, TypeClass::Map | TypeClass::Set)
    }
}

/// Type classifier with an extensible wrapper table and string-like allow-list.
#[derive(Debug, Clone)]
pub struct Classifier {
    wrappers: HashMap<String, WrapperKind>,
    string_like: HashSet<String>,
}

impl Classifier {
    /// Builtin wrappers plus the configured extras and string-like names.
    pub fn from_settings(settings: &TypeSettings) -> Self {
        let mut wrappers = HashMap::new();
        wrappers.insert("Option".to_string(), WrapperKind::Optional);
        for name in ["Vec", "VecDeque", "LinkedList", "BinaryHeap"] {
            wrappers.insert(name.to_string(), WrapperKind::Sequence);
        }
        for name in [
            "Box", "Arc", "Rc", "Cow", "RefCell", "Cell", "Mutex", "RwLock",
        ] {
            wrappers.insert(name.to_string(), WrapperKind::Pointer);
        }
        for name in &settings.sequence_wrappers {
            wrappers.insert(name.clone(), WrapperKind::Sequence);
        }
        for name in &settings.pointer_wrappers {
            wrappers.insert(name.clone(), WrapperKind::Pointer);
        }

        let mut string_like: HashSet<String> = ["String", "str", "char"]
            .into_iter()
            .map(String::from)
            .collect();
        string_like.extend(settings.string_like.iter().cloned());

        Self {
            wrappers,
            string_like,
        }
    }

    pub fn with_wrapper(mut self, name: impl Into<String>, kind: WrapperKind) -> Self {
        self.wrappers.insert(name.into(), kind);
        self
    }

    pub fn with_string_like(mut self, name: impl Into<String>) -> Self {
        self.string_like.insert(name.into());
        self
    }

    /// Peel wrappers off `type_text`, outermost first, and return the simple
    /// name of the innermost type.
    pub fn unwrap(&self, type_text: &str) -> (Vec<WrapperKind>, String) {
        let mut wrappers = Vec::new();
        let mut current = normalize(type_text);

        for _ in 0..MAX_WRAPPER_DEPTH {
            if let Some(element) = array_element(&current) {
                wrappers.push(WrapperKind::Sequence);
                current = normalize(element);
                continue;
            }
            let (head, args) = split_generic(&current);
            if is_map(head) || is_set(head) {
                break;
            }
            let Some(kind) = self.wrappers.get(last_segment(head)) else {
                break;
            };
            let Some(inner) = args.and_then(first_type_argument) else {
                break;
            };
            wrappers.push(*kind);
            current = normalize(inner);
        }

        let (head, _) = split_generic(&current);
        (wrappers, last_segment(head).to_string())
    }

    /// Classify a type by its text.
    pub fn classify(&self, type_text: &str, lookup: &dyn TypeLookup) -> Classification {
        let (wrappers, inner) = self.unwrap(type_text);
        let leaf = self.leaf_class(&inner, lookup);
        let class = if wrappers.contains(&WrapperKind::Sequence) {
            TypeClass::Sequence
        } else {
            leaf
        };
        Classification {
            class,
            leaf,
            wrappers,
            inner,
        }
    }

    /// Classify a declared field, reusing the wrapper chain computed at scan time.
    pub fn classify_field(
        &self,
        field: &FieldDeclaration,
        lookup: &dyn TypeLookup,
    ) -> Classification {
        let leaf = self.leaf_class(&field.inner_type, lookup);
        let class = if field.wrappers.contains(&WrapperKind::Sequence) {
            TypeClass::Sequence
        } else {
            leaf
        };
        Classification {
            class,
            leaf,
            wrappers: field.wrappers.clone(),
            inner: field.inner_type.clone(),
        }
    }

    fn leaf_class(&self, name: &str, lookup: &dyn TypeLookup) -> TypeClass {
        if is_map(name) {
            return TypeClass::Map;
        }
        if is_set(name) {
            return TypeClass::Set;
        }
        if name == "bool" {
            return TypeClass::Bool;
        }
        if INT_NAMES.contains(&name) || name.starts_with("NonZero") {
            return TypeClass::Numeric(NumericKind::Int);
        }
        if FLOAT_NAMES.contains(&name) {
            return TypeClass::Numeric(NumericKind::Float);
        }
        if self.string_like.contains(name) {
            return TypeClass::StringLike;
        }
        match lookup.declared_kind(name) {
            Some(DeclaredKind::Record) => TypeClass::Record,
            Some(DeclaredKind::Enum) => TypeClass::Enum,
            None => TypeClass::Unknown,
        }
    }

    /// A representative TOML value for a type, used when a default comes from
    /// the type's `Default` implementation.
    ///
    /// `None` for optional types (their default is absence), records, and
    /// unknown types.
    pub fn example_value(
        &self,
        classification: &Classification,
        lookup: &dyn TypeLookup,
    ) -> Option<toml::Value> {
        if classification.is_optional() {
            return None;
        }
        let value = match classification.class {
            TypeClass::Bool => toml::Value::Boolean(false),
            TypeClass::Numeric(NumericKind::Int) => toml::Value::Integer(0),
            TypeClass::Numeric(NumericKind::Float) => toml::Value::Float(0.0),
            TypeClass::StringLike => toml::Value::String(String::new()),
            TypeClass::Sequence | TypeClass::Set => toml::Value::Array(Vec::new()),
            TypeClass::Map => toml::Value::Table(toml::Table::new()),
            TypeClass::Enum => {
                let first = lookup.variants(&classification.inner)?.into_iter().next()?;
                toml::Value::String(first)
            }
            TypeClass::Record | TypeClass::Unknown => return None,
        };
        Some(value)
    }
}

fn is_map(head: &str) -> bool {
    MAP_NAMES.iter().any(|name| head.contains(name))
}

fn is_set(head: &str) -> bool {
    SET_NAMES.iter().any(|name| head.contains(name))
}

/// Strip references, lifetimes, `mut`, `dyn` and whitespace at every depth:
/// `&'static str` becomes `str` and `Cow<'a, str>` becomes `Cow<str>`.
fn normalize(type_text: &str) -> String {
    let mut out = String::with_capacity(type_text.len());
    let mut rest = type_text.trim();
    'chars: while let Some(c) = rest.chars().next() {
        match c {
            '\'' => {
                rest = rest[1..]
                    .trim_start_matches(|c: char| c.is_alphanumeric() || c == '_')
                    .trim_start();
                if let Some(after) = rest.strip_prefix(',') {
                    rest = after.trim_start();
                }
                continue;
            }
            '&' => {
                rest = rest[1..].trim_start();
                continue;
            }
            _ => {}
        }
        if !out.ends_with(|p: char| p.is_alphanumeric() || p == '_') {
            for keyword in ["mut", "dyn"] {
                if let Some(after) = rest.strip_prefix(keyword)
                    && after.starts_with(char::is_whitespace)
                {
                    rest = after.trim_start();
                    continue 'chars;
                }
            }
        }
        if !c.is_whitespace() {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out.replace("<>", "")
}

/// `[T; N]` or `[T]` yields `T`.
fn array_element(text: &str) -> Option<&str> {
    let inner = text.strip_prefix('[')?.strip_suffix(']')?;
    let element = match top_level_position(inner, ';') {
        Some(at) => &inner[..at],
        None => inner,
    };
    Some(element)
}

/// `Option<Vec<String>>` yields `("Option", Some("Vec<String>"))`.
fn split_generic(text: &str) -> (&str, Option<&str>) {
    match text.find('<') {
        Some(open) if text.ends_with('>') => (&text[..open], Some(&text[open + 1..text.len() - 1])),
        _ => (text, None),
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

/// The first generic argument that is a type, skipping lifetimes (`Cow<'a, str>`).
fn first_type_argument(args: &str) -> Option<&str> {
    let mut rest = args;
    loop {
        let (arg, tail) = match top_level_position(rest, ',') {
            Some(at) => (&rest[..at], Some(&rest[at + 1..])),
            None => (rest, None),
        };
        let arg = arg.trim();
        if !arg.is_empty() && !arg.starts_with('\'') {
            return Some(arg);
        }
        rest = tail?;
    }
}

fn top_level_position(text: &str, needle: char) -> Option<usize> {
    let mut depth = 0i32;
    for (at, ch) in text.char_indices() {
        match ch {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth -= 1,
            c if c == needle && depth == 0 => return Some(at),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Declared;

    impl TypeLookup for Declared {
        fn declared_kind(&self, name: &str) -> Option<DeclaredKind> {
            match name {
                "MiddlewareConfig" => Some(DeclaredKind::Record),
                "LogLevel" => Some(DeclaredKind::Enum),
                _ => None,
            }
        }

        fn variants(&self, name: &str) -> Option<Vec<String>> {
            (name == "LogLevel").then(|| vec!["debug".into(), "info".into()])
        }
    }

    fn classify(text: &str) -> Classification {
        crate::fixtures::test::classifier().classify(text, &Declared)
    }

    #[test]
    fn primitives() {
        assert_eq!(classify("bool").class, TypeClass::Bool);
        assert_eq!(classify("u16").class, TypeClass::Numeric(NumericKind::Int));
        assert_eq!(classify("f64").class, TypeClass::Numeric(NumericKind::Float));
        assert_eq!(
            classify("std::num::NonZeroU32").class,
            TypeClass::Numeric(NumericKind::Int)
        );
        assert_eq!(classify("String").class, TypeClass::StringLike);
        assert_eq!(classify("&'static str").class, TypeClass::StringLike);
    }

    #[test]
    fn wrapper_transparency() {
        let nested = classify("Option<Vec<String>>");
        let plain = classify("Vec<String>");
        assert_eq!(nested.class, TypeClass::Sequence);
        assert_eq!(plain.class, TypeClass::Sequence);
        assert_eq!(nested.leaf, TypeClass::StringLike);
        assert_eq!(nested.leaf, plain.leaf);
        assert_eq!(
            nested.wrappers,
            vec![WrapperKind::Optional, WrapperKind::Sequence]
        );
        assert_eq!(plain.wrappers, vec![WrapperKind::Sequence]);
    }

    #[test]
    fn option_of_scalar_keeps_scalar_class() {
        let c = classify("Option<u16>");
        assert_eq!(c.class, TypeClass::Numeric(NumericKind::Int));
        assert!(c.is_optional());
    }

    #[test]
    fn pointers_are_transparent() {
        let c = classify("Arc<Box<MiddlewareConfig>>");
        assert_eq!(c.class, TypeClass::Record);
        assert_eq!(c.inner, "MiddlewareConfig");
        assert_eq!(c.wrappers, vec![WrapperKind::Pointer, WrapperKind::Pointer]);
    }

    #[test]
    fn cow_skips_lifetime_argument() {
        let c = classify("Cow<'static, str>");
        assert_eq!(c.class, TypeClass::StringLike);
        assert_eq!(c.inner, "str");
    }

    #[test]
    fn borrowed_strings_inside_wrappers() {
        let optional = classify("Option<&'static str>");
        assert_eq!(optional.class, TypeClass::StringLike);
        assert_eq!(optional.inner, "str");
        assert!(optional.is_optional());

        let list = classify("Vec<&'a str>");
        assert_eq!(list.class, TypeClass::Sequence);
        assert_eq!(list.leaf, TypeClass::StringLike);
        assert_eq!(list.inner, "str");

        let boxed = classify("Box<&'a mut MiddlewareConfig>");
        assert_eq!(boxed.class, TypeClass::Record);
        assert_eq!(boxed.inner, "MiddlewareConfig");
    }

    #[test]
    fn normalize_strips_at_every_depth() {
        assert_eq!(normalize("Option<&'static str>"), "Option<str>");
        assert_eq!(normalize("Cow<'a, str>"), "Cow<str>");
        assert_eq!(normalize("Box<dyn Any>"), "Box<Any>");
        assert_eq!(normalize("[u8; 4]"), "[u8;4]");
    }

    #[test]
    fn qualified_paths_use_last_segment() {
        let c = classify("std::option::Option<crate::web::MiddlewareConfig>");
        assert_eq!(c.class, TypeClass::Record);
        assert_eq!(c.inner, "MiddlewareConfig");
    }

    #[test]
    fn maps_and_sets_stop_unwrapping() {
        let map = classify("Option<HashMap<String, MiddlewareConfig>>");
        assert_eq!(map.class, TypeClass::Map);
        assert_eq!(map.inner, "HashMap");
        assert_eq!(map.wrappers, vec![WrapperKind::Optional]);
        assert_eq!(classify("BTreeSet<String>").class, TypeClass::Set);
        assert_eq!(classify("FxHashMap<String, u8>").class, TypeClass::Map);
    }

    #[test]
    fn substring_map_detection_is_an_approximation() {
        // A user type that merely contains a container name is a map too.
        assert_eq!(classify("MyHashMapConfig").class, TypeClass::Map);
    }

    #[test]
    fn arrays_and_slices_are_sequences() {
        let c = classify("[u8; 4]");
        assert_eq!(c.class, TypeClass::Sequence);
        assert_eq!(c.leaf, TypeClass::Numeric(NumericKind::Int));
        assert_eq!(classify("&[String]").leaf, TypeClass::StringLike);
    }

    #[test]
    fn declared_names_need_lookup() {
        assert_eq!(classify("LogLevel").class, TypeClass::Enum);
        assert_eq!(classify("Vec<MiddlewareConfig>").leaf, TypeClass::Record);
        assert!(classify("Vec<MiddlewareConfig>").is_sequence_of_records());
        assert_eq!(
            crate::fixtures::test::classifier().classify("LogLevel", &NoTypes).class,
            TypeClass::Unknown
        );
    }

    #[test]
    fn string_like_allow_list() {
        assert_eq!(classify("std::net::SocketAddr").class, TypeClass::StringLike);
        assert_eq!(classify("PathBuf").class, TypeClass::StringLike);
        assert_eq!(classify("Secret").class, TypeClass::Unknown);
        let extended = crate::fixtures::test::classifier().with_string_like("Secret");
        assert_eq!(
            extended.classify("Secret", &NoTypes).class,
            TypeClass::StringLike
        );
    }

    #[test]
    fn custom_wrappers() {
        let classifier = crate::fixtures::test::classifier().with_wrapper("Spanned", WrapperKind::Pointer);
        let c = classifier.classify("Spanned<u32>", &NoTypes);
        assert_eq!(c.class, TypeClass::Numeric(NumericKind::Int));
    }

    #[test]
    fn wrapper_without_arguments_is_innermost() {
        let c = classify("Vec");
        assert!(c.wrappers.is_empty());
        assert_eq!(c.inner, "Vec");
        assert_eq!(c.class, TypeClass::Unknown);
    }

    #[test]
    fn example_values() {
        let classifier = crate::fixtures::test::classifier();
        let example = |text: &str| {
            let c = classifier.classify(text, &Declared);
            classifier.example_value(&c, &Declared)
        };
        assert_eq!(example("bool"), Some(toml::Value::Boolean(false)));
        assert_eq!(example("u16"), Some(toml::Value::Integer(0)));
        assert_eq!(example("String"), Some(toml::Value::String(String::new())));
        assert_eq!(example("Vec<u8>"), Some(toml::Value::Array(vec![])));
        assert_eq!(example("LogLevel"), Some(toml::Value::String("debug".into())));
        assert_eq!(example("Option<u16>"), None);
        assert_eq!(example("MiddlewareConfig"), None);
    }
}
