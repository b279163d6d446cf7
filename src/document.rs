//! TOML documents as path queries.
//!
//! Every key of a document becomes a [`PathQuery`]: table headers, dotted
//! keys, keys of inline tables and keys inside `[[array]]` elements. A
//! segment that steps into an element of an array of tables (or into an
//! inline table inside an array) is marked as an array element.

use std::ops::Range;

use serde::Serialize;
use toml_edit::{ImDocument, InlineTable, Item, Table, Value};

use crate::error::ConfscopeError;
use crate::resolve::{PathQuery, PathSegment};

/// A key found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentKey {
    pub query: PathQuery,
    /// 1-based.
    pub line: usize,
}

/// All keys of `text`, parents before their children.
pub fn key_paths(text: &str) -> Result<Vec<DocumentKey>, ConfscopeError> {
    let doc = ImDocument::parse(text)?;
    let mut walker = Walker {
        lines: LineIndex::new(text),
        keys: Vec::new(),
    };
    walker.table(doc.as_table(), &PathQuery::default(), 1);
    Ok(walker.keys)
}

struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { starts }
    }

    fn line(&self, span: Option<Range<usize>>) -> Option<usize> {
        let offset = span?.start;
        Some(match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        })
    }
}

struct Walker {
    lines: LineIndex,
    keys: Vec<DocumentKey>,
}

impl Walker {
    fn table(&mut self, table: &Table, path: &PathQuery, parent_line: usize) {
        for (name, _) in table.iter() {
            let Some((key, item)) = table.get_key_value(name) else {
                continue;
            };
            let line = self
                .lines
                .line(key.span())
                .or_else(|| self.lines.line(item.span()))
                .unwrap_or(parent_line);
            self.item(item, child(path, name), line);
        }
    }

    fn item(&mut self, item: &Item, query: PathQuery, line: usize) {
        self.keys.push(DocumentKey {
            query: query.clone(),
            line,
        });
        match item {
            Item::Table(table) => self.table(table, &query, line),
            Item::ArrayOfTables(array) => {
                let element = as_element(query);
                for table in array.iter() {
                    let line = self.lines.line(table.span()).unwrap_or(line);
                    self.table(table, &element, line);
                }
            }
            Item::Value(value) => self.value(value, query, line),
            Item::None => {}
        }
    }

    fn value(&mut self, value: &Value, query: PathQuery, line: usize) {
        match value {
            Value::InlineTable(table) => self.inline(table, &query, line),
            Value::Array(array) => {
                let element = as_element(query);
                for value in array.iter() {
                    if let Value::InlineTable(table) = value {
                        let line = self.lines.line(value.span()).unwrap_or(line);
                        self.inline(table, &element, line);
                    }
                }
            }
            _ => {}
        }
    }

    fn inline(&mut self, table: &InlineTable, path: &PathQuery, parent_line: usize) {
        for (name, _) in table.iter() {
            let Some((key, value)) = table.get_key_value(name) else {
                continue;
            };
            let line = self
                .lines
                .line(key.span())
                .or_else(|| self.lines.line(value.span()))
                .unwrap_or(parent_line);
            let query = child(path, name);
            self.keys.push(DocumentKey {
                query: query.clone(),
                line,
            });
            if let Some(value) = value.as_value() {
                self.value(value, query, line);
            }
        }
    }
}

fn child(path: &PathQuery, name: &str) -> PathQuery {
    let mut query = path.clone();
    query.push(PathSegment::key(name));
    query
}

fn as_element(mut query: PathQuery) -> PathQuery {
    if let Some(last) = query.segments.last_mut() {
        last.array_element = true;
    }
    query
}
