//! Engine operations and the result types callers display.
//!
//! An [`Action`] describes one request (resolve a path, list keys, check a
//! document, ...). [`Engine::handle`](crate::Engine::handle) turns it into an
//! [`Outcome`], which implements `Display` for terminals and `Serialize` for
//! JSON consumers.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::classify::{NumericKind, TypeClass};
use crate::defaults::{DefaultEvaluator, ValueLiteral};
use crate::index::TypeIndex;
use crate::resolve::{PathQuery, ResolvedPath, Resolver};
use crate::validate::Diagnostic;

/// A request to the engine, independent of any CLI parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Resolve a dotted path such as `web.routes[].path`.
    Resolve { path: String },
    /// List the keys available below a path. An empty path lists prefixes.
    Keys { path: String },
    /// Check every key of a TOML document.
    Check { document: PathBuf },
    /// List every known prefix with the record it selects.
    Prefixes,
    /// Print (or write) a commented engine settings template.
    Settings { output: Option<PathBuf> },
}

/// What a resolved path denotes, with its default when one is known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathReport {
    pub path: String,
    pub resolved: ResolvedPath,
    pub default: Option<ValueLiteral>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixEntry {
    pub prefix: String,
    pub record: String,
    pub crate_name: String,
}

/// Result of an [`Action`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Resolved(PathReport),
    Keys {
        path: String,
        keys: Vec<String>,
    },
    Checked {
        document: PathBuf,
        diagnostics: Vec<Diagnostic>,
    },
    Prefixes {
        entries: Vec<PrefixEntry>,
    },
    Template {
        template: String,
    },
    TemplateWritten {
        path: PathBuf,
    },
}

impl Outcome {
    /// The outcome reports something wrong with the user's input.
    pub fn has_problems(&self) -> bool {
        match self {
            Outcome::Resolved(report) => report.resolved.failure().is_some(),
            Outcome::Checked { diagnostics, .. } => !diagnostics.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Resolved(report) => write!(f, "{report}"),
            Outcome::Keys { keys, .. } => write_lines(f, keys.iter()),
            Outcome::Checked {
                document,
                diagnostics,
            } => {
                if diagnostics.is_empty() {
                    return write!(f, "{}: ok", document.display());
                }
                write_lines(
                    f,
                    diagnostics
                        .iter()
                        .map(|d| format!("{}: {d}", document.display())),
                )
            }
            Outcome::Prefixes { entries } => write_lines(
                f,
                entries
                    .iter()
                    .map(|e| format!("{} = {} ({})", e.prefix, e.record, e.crate_name)),
            ),
            Outcome::Template { template } => write!(f, "{template}"),
            Outcome::TemplateWritten { path } => {
                write!(f, "Settings template written to {}", path.display())
            }
        }
    }
}

impl fmt::Display for PathReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = &self.path;
        match &self.resolved {
            ResolvedPath::Record { record, .. } => {
                write!(f, "{path}: section {} ({})", record.name, record.crate_name)?;
            }
            ResolvedPath::Field {
                owner,
                field,
                class,
            } => {
                write!(
                    f,
                    "{path}: {} ({}) in {}",
                    field.ty,
                    class_label(class.class),
                    owner.name
                )?;
            }
            ResolvedPath::Dynamic { owner, field, .. } => {
                write!(
                    f,
                    "{path}: free-form keys of {}.{} ({})",
                    owner.name, field.name, field.ty
                )?;
            }
            ResolvedPath::Failure(failure) => return write!(f, "{path}: {failure}"),
        }
        if let Some(default) = &self.default {
            write!(f, "\n  default = {default}")?;
        }
        if let Some(doc) = self.resolved.field().and_then(|field| field.doc.as_deref()) {
            for line in doc.lines() {
                write!(f, "\n  # {line}")?;
            }
        }
        Ok(())
    }
}

fn write_lines<I, T>(f: &mut fmt::Formatter<'_>, lines: I) -> fmt::Result
where
    I: IntoIterator<Item = T>,
    T: fmt::Display,
{
    for (i, line) in lines.into_iter().enumerate() {
        if i > 0 {
            writeln!(f)?;
        }
        write!(f, "{line}")?;
    }
    Ok(())
}

fn class_label(class: TypeClass) -> &'static str {
    match class {
        TypeClass::Bool => "boolean",
        TypeClass::Numeric(NumericKind::Int) => "integer",
        TypeClass::Numeric(NumericKind::Float) => "float",
        TypeClass::StringLike => "string",
        TypeClass::Enum => "enum",
        TypeClass::Map => "map",
        TypeClass::Set => "set",
        TypeClass::Sequence => "array",
        TypeClass::Record => "table",
        TypeClass::Unknown => "unknown",
    }
}

/// Resolve `path` and evaluate the default of the field it ends on.
pub fn report_path(resolver: &Resolver<'_>, evaluator: &DefaultEvaluator<'_>, path: &str) -> PathReport {
    let resolved = resolver.resolve(&PathQuery::parse(path));
    let default = match &resolved {
        ResolvedPath::Field { owner, field, .. } => evaluator.evaluate_field(field, owner),
        _ => None,
    };
    PathReport {
        path: path.to_string(),
        resolved,
        default,
    }
}

/// Keys directly below `path`; prefixes when `path` is empty.
pub fn list_keys(resolver: &Resolver<'_>, path: &str) -> Vec<String> {
    let query = PathQuery::parse(path);
    if query.is_empty() {
        return resolver
            .index()
            .prefixes()
            .into_iter()
            .map(String::from)
            .collect();
    }
    match resolver.resolve(&query) {
        ResolvedPath::Record { record, .. } => resolver.children(&record),
        _ => Vec::new(),
    }
}

/// Each prefix with the record that wins it.
pub fn list_prefixes(index: &TypeIndex) -> Vec<PrefixEntry> {
    index
        .prefixes()
        .into_iter()
        .filter_map(|prefix| {
            let record = index.primary(prefix)?;
            Some(PrefixEntry {
                prefix: prefix.to_string(),
                record: record.name.clone(),
                crate_name: record.crate_name.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::fixtures::test::sample_index;

    fn report(path: &str) -> PathReport {
        let index = sample_index();
        let classifier = crate::fixtures::test::classifier();
        let resolver = Resolver::new(&index, &classifier);
        let evaluator = DefaultEvaluator::new(&index, &classifier);
        report_path(&resolver, &evaluator, path)
    }

    #[test]
    fn field_report_includes_default_and_doc() {
        let report = report("web.port");
        assert_eq!(report.default.as_ref().map(ToString::to_string).as_deref(), Some("8080"));
        assert_eq!(
            report.to_string(),
            "web.port: u16 (integer) in WebConfig\n  default = 8080\n  # Port to listen on."
        );
    }

    #[test]
    fn section_report() {
        assert_eq!(report("web").to_string(), "web: section WebConfig (app)");
    }

    #[test]
    fn failure_report() {
        let report = report("web.prot");
        assert!(report.resolved.failure().is_some());
        assert_eq!(report.to_string(), "web.prot: unknown field 'prot' in WebConfig");
        assert!(Outcome::Resolved(report).has_problems());
    }

    #[test]
    fn dynamic_report() {
        assert_eq!(
            report("web.headers.x-trace").to_string(),
            "web.headers.x-trace: free-form keys of WebConfig.headers (HashMap<String, String>)"
        );
    }

    #[test]
    fn keys_below_sections() {
        let index = sample_index();
        let classifier = crate::fixtures::test::classifier();
        let resolver = Resolver::new(&index, &classifier);
        assert_eq!(list_keys(&resolver, "web.middlewares"), vec!["cors"]);
        assert_eq!(list_keys(&resolver, "web.routes[]"), vec!["path", "methods"]);
        assert!(list_keys(&resolver, "web.port").is_empty());
        assert_eq!(list_keys(&resolver, "").len(), 5);
    }

    #[test]
    fn prefixes_name_their_records() {
        let entries = list_prefixes(&sample_index());
        let web = entries.iter().find(|e| e.prefix == "web").unwrap();
        assert_eq!(web.record, "WebConfig");
        assert_eq!(web.crate_name, "app");
    }

    #[test]
    fn checked_display() {
        let clean = Outcome::Checked {
            document: "app.toml".into(),
            diagnostics: vec![],
        };
        assert_eq!(clean.to_string(), "app.toml: ok");
        assert!(!clean.has_problems());
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let outcome = Outcome::Keys {
            path: "web.middlewares".into(),
            keys: vec!["cors".into()],
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "keys");
        assert_eq!(json["keys"][0], "cors");
    }
}
