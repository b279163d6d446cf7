//! Headless document check: resolve every key of a TOML document.
//!
//! Each key that does not resolve produces one [`Diagnostic`] with its line.
//! Keys below a failed key or below a map/set are not checked again.

use std::fmt;

use serde::Serialize;

use crate::document::key_paths;
use crate::error::ConfscopeError;
use crate::resolve::{PathQuery, ResolveFailure, ResolvedPath, Resolver};

/// A document key the index does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub path: String,
    pub line: usize,
    pub failure: ResolveFailure,
}

impl Diagnostic {
    /// Keys that would have been valid in this position.
    pub fn candidates(&self) -> &[String] {
        match &self.failure {
            ResolveFailure::UnknownPrefix { known, .. } => known,
            ResolveFailure::UnknownField { siblings, .. } => siblings,
            ResolveFailure::NotNestable { .. } => &[],
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}: {}", self.line, self.path, self.failure)?;
        let candidates = self.candidates();
        if !candidates.is_empty() {
            write!(f, " (expected one of: {})", candidates.join(", "))?;
        }
        Ok(())
    }
}

/// Check `text` against the index behind `resolver`. Diagnostics are ordered
/// by line.
pub fn check_document(text: &str, resolver: &Resolver<'_>) -> Result<Vec<Diagnostic>, ConfscopeError> {
    let mut stopped: Vec<PathQuery> = Vec::new();
    let mut diagnostics = Vec::new();

    for key in key_paths(text)? {
        if stopped.iter().any(|s| is_below(&key.query, s)) {
            continue;
        }
        match resolver.resolve(&key.query) {
            ResolvedPath::Failure(failure) => {
                diagnostics.push(Diagnostic {
                    path: key.query.to_string(),
                    line: key.line,
                    failure,
                });
                stopped.push(key.query);
            }
            ResolvedPath::Dynamic { .. } => stopped.push(key.query),
            ResolvedPath::Record { .. } | ResolvedPath::Field { .. } => {}
        }
    }

    diagnostics.sort_by_key(|d| d.line);
    Ok(diagnostics)
}

/// Array flags are ignored: `a.b[].c` is below `a.b`.
fn is_below(query: &PathQuery, ancestor: &PathQuery) -> bool {
    query.segments.len() > ancestor.segments.len()
        && query
            .segments
            .iter()
            .zip(&ancestor.segments)
            .all(|(a, b)| a.name == b.name)
}
