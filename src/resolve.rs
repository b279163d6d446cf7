//! Nested path resolution.
//!
//! A document path such as `web.middlewares.cors` is resolved one segment at a
//! time. The first segment selects a record by prefix; every later segment
//! names a field of the current record. Record-typed fields are descended
//! into, flattened fields contribute their own fields to the record that
//! flattens them, and a sequence of records is descended into only when the
//! caller marks the segment as an array element (`[[web.routes]]`, or an
//! inline table inside an array). Maps and sets stop resolution: nothing below
//! them has a static schema.
//!
//! Resolution never backtracks. The first segment that cannot be resolved is
//! terminal and reported as a [`ResolveFailure`], which is a value, not an
//! error.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::classify::{Classification, Classifier, TypeClass};
use crate::index::TypeIndex;
use crate::types::{FieldDeclaration, RecordDeclaration};

/// Default bound on path length.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// One key of a document path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PathSegment {
    pub name: String,
    /// The document descends into an element of an array at this key.
    pub array_element: bool,
}

impl PathSegment {
    pub fn key(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            array_element: false,
        }
    }

    pub fn element(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            array_element: true,
        }
    }
}

/// A document path, outermost key first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct PathQuery {
    pub segments: Vec<PathSegment>,
}

impl PathQuery {
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Parse dotted notation where `[]` marks array descent: `web.routes[].path`.
    pub fn parse(text: &str) -> Self {
        let segments = text
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_suffix("[]") {
                Some(name) => PathSegment::element(name),
                None => PathSegment::key(s),
            })
            .collect();
        Self { segments }
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }

    pub fn prefix(&self) -> Option<&str> {
        self.segments.first().map(|s| s.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for PathQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", segment.name)?;
            if segment.array_element {
                write!(f, "[]")?;
            }
        }
        Ok(())
    }
}

/// Why a path could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ResolveFailure {
    #[error("unknown prefix '{prefix}'")]
    UnknownPrefix { prefix: String, known: Vec<String> },

    #[error("unknown field '{segment}' in {record}")]
    UnknownField {
        record: String,
        segment: String,
        siblings: Vec<String>,
    },

    #[error("'{field}' in {record} has no nested keys")]
    NotNestable { record: String, field: String },
}

/// Outcome of resolving a path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedPath {
    /// The path denotes a section: the prefix itself, or a record-typed field.
    Record {
        record: Arc<RecordDeclaration>,
        field: Option<FieldDeclaration>,
    },
    /// The path denotes a value. `owner` declares `field`.
    Field {
        owner: Arc<RecordDeclaration>,
        field: FieldDeclaration,
        class: Classification,
    },
    /// The path reached a map or set; anything below it is unchecked.
    Dynamic {
        owner: Arc<RecordDeclaration>,
        field: FieldDeclaration,
        class: Classification,
    },
    Failure(ResolveFailure),
}

impl ResolvedPath {
    pub fn failure(&self) -> Option<&ResolveFailure> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic { .. })
    }

    /// The field the path ends on, if it ends on one.
    pub fn field(&self) -> Option<&FieldDeclaration> {
        match self {
            Self::Record { field, .. } => field.as_ref(),
            Self::Field { field, .. } | Self::Dynamic { field, .. } => Some(field),
            Self::Failure(_) => None,
        }
    }
}

/// A field found on a record, together with the record that declares it.
struct Found {
    owner: Arc<RecordDeclaration>,
    field: FieldDeclaration,
}

enum Lookup {
    Field(Found),
    /// No field matched, but a flattened map absorbs unknown keys.
    CatchAll(Found),
    Missing,
}

/// Walks paths through a [`TypeIndex`].
pub struct Resolver<'a> {
    index: &'a TypeIndex,
    classifier: &'a Classifier,
    max_depth: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a TypeIndex, classifier: &'a Classifier) -> Self {
        Self {
            index,
            classifier,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn index(&self) -> &TypeIndex {
        self.index
    }

    pub fn resolve(&self, query: &PathQuery) -> ResolvedPath {
        let Some((first, rest)) = query.segments.split_first() else {
            return ResolvedPath::Failure(self.unknown_prefix(""));
        };
        let Some(root) = self.index.primary(&first.name) else {
            return ResolvedPath::Failure(self.unknown_prefix(&first.name));
        };

        let mut current = Arc::clone(root);
        let mut reached: Option<FieldDeclaration> = None;

        for (depth, segment) in rest.iter().enumerate() {
            let last = depth + 1 == rest.len();
            tracing::trace!(record = %current.name, segment = %segment.name, "resolving segment");

            if depth >= self.max_depth {
                return ResolvedPath::Failure(ResolveFailure::NotNestable {
                    record: current.name.clone(),
                    field: segment.name.clone(),
                });
            }

            let found = match self.find_field(&current, &segment.name) {
                Lookup::Field(found) => found,
                Lookup::CatchAll(Found { owner, field }) => {
                    let class = self.classifier.classify_field(&field, self.index);
                    return ResolvedPath::Dynamic { owner, field, class };
                }
                Lookup::Missing => {
                    return ResolvedPath::Failure(ResolveFailure::UnknownField {
                        record: current.name.clone(),
                        segment: segment.name.clone(),
                        siblings: self.children(&current),
                    });
                }
            };

            let class = self.classifier.classify_field(&found.field, self.index);
            match effective_class(&class, segment.array_element) {
                TypeClass::Map | TypeClass::Set => {
                    return ResolvedPath::Dynamic {
                        owner: found.owner,
                        field: found.field,
                        class,
                    };
                }
                TypeClass::Record => {
                    let Some(next) = self
                        .index
                        .record_in(&found.field.inner_type, Some(&found.owner.crate_name))
                    else {
                        return self.terminal(found, class, last);
                    };
                    current = Arc::clone(next);
                    reached = Some(found.field);
                }
                _ => return self.terminal(found, class, last),
            }
        }

        ResolvedPath::Record {
            record: current,
            field: reached,
        }
    }

    /// Document keys directly addressable on `record`, flattened fields
    /// expanded, in declaration order.
    pub fn children(&self, record: &RecordDeclaration) -> Vec<String> {
        let mut keys = Vec::new();
        let mut visited = HashSet::new();
        self.collect_children(record, &mut visited, &mut keys);
        keys
    }

    fn collect_children(
        &self,
        record: &RecordDeclaration,
        visited: &mut HashSet<(String, String)>,
        keys: &mut Vec<String>,
    ) {
        if !visited.insert((record.crate_name.clone(), record.name.clone())) {
            return;
        }
        for field in record.fields.iter().filter(|f| !f.is_skipped()) {
            if field.is_flattened() {
                if let Some(inner) = self.flattened_record(record, field) {
                    self.collect_children(&inner, visited, keys);
                }
                continue;
            }
            let key = field.key(record.rename_all);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }

    fn find_field(&self, record: &Arc<RecordDeclaration>, key: &str) -> Lookup {
        let mut visited = HashSet::new();
        let mut catch_all = None;
        match self.find_in(record, key, &mut visited, &mut catch_all) {
            Some(found) => Lookup::Field(found),
            None => catch_all.map_or(Lookup::Missing, Lookup::CatchAll),
        }
    }

    /// Direct fields first, then the fields of flattened records in
    /// declaration order. A flattened map is remembered as a catch-all.
    fn find_in(
        &self,
        record: &Arc<RecordDeclaration>,
        key: &str,
        visited: &mut HashSet<(String, String)>,
        catch_all: &mut Option<Found>,
    ) -> Option<Found> {
        if !visited.insert((record.crate_name.clone(), record.name.clone())) {
            return None;
        }
        let visible = record.fields.iter().filter(|f| !f.is_skipped());

        if let Some(field) = visible
            .clone()
            .filter(|f| !f.is_flattened())
            .find(|f| f.answers_to(key, record.rename_all))
        {
            return Some(Found {
                owner: Arc::clone(record),
                field: field.clone(),
            });
        }

        for field in visible.filter(|f| f.is_flattened()) {
            if let Some(inner) = self.flattened_record(record, field) {
                if let Some(found) = self.find_in(&inner, key, visited, catch_all) {
                    return Some(found);
                }
            } else if catch_all.is_none()
                && self.classifier.classify_field(field, self.index).is_dynamic()
            {
                *catch_all = Some(Found {
                    owner: Arc::clone(record),
                    field: field.clone(),
                });
            }
        }
        None
    }

    fn flattened_record(
        &self,
        owner: &RecordDeclaration,
        field: &FieldDeclaration,
    ) -> Option<Arc<RecordDeclaration>> {
        let class = self.classifier.classify_field(field, self.index);
        if !class.is_record() {
            return None;
        }
        self.index
            .record_in(&field.inner_type, Some(&owner.crate_name))
            .cloned()
    }

    fn terminal(&self, found: Found, class: Classification, last: bool) -> ResolvedPath {
        if last {
            ResolvedPath::Field {
                owner: found.owner,
                field: found.field,
                class,
            }
        } else {
            ResolvedPath::Failure(ResolveFailure::NotNestable {
                record: found.owner.name.clone(),
                field: found.field.name,
            })
        }
    }

    fn unknown_prefix(&self, prefix: &str) -> ResolveFailure {
        ResolveFailure::UnknownPrefix {
            prefix: prefix.to_string(),
            known: self.index.prefixes().into_iter().map(String::from).collect(),
        }
    }
}

/// A sequence entered through an array element behaves like its element type.
fn effective_class(class: &Classification, array_element: bool) -> TypeClass {
    if class.class == TypeClass::Sequence && array_element {
        class.leaf
    } else {
        class.class
    }
}
