//! Know what every key in a configuration file means. Point at your crates,
//! ask about a path, and get back the field that declares it.
//!
//! Confscope reads the Rust structs that make up an application's
//! configuration (records carrying a configuration prefix) and answers, for
//! any dotted path in a TOML document, which declared field it denotes, what
//! kind of value it accepts and what its default is.
//!
//! ```ignore
//! let engine = Engine::builder()
//!     .project_crate("app", "crates/app/src")
//!     .dependency("shared", "crates/shared/src")
//!     .build()?;
//!
//! match engine.resolve("web.middlewares.cors")? {
//!     ResolvedPath::Field { owner, field, class } => { /* MiddlewareConfig.cors, a bool */ }
//!     ResolvedPath::Failure(failure) => eprintln!("{failure}"),
//!     _ => {}
//! }
//! ```
//!
//! # Where the schema comes from
//!
//! There is no separate schema file. The structs are the schema:
//!
//! - **`#[config_prefix = "web"]`** (or `impl Configurable for T` with a
//!   `config_prefix()` method) marks a record as the owner of the `[web]`
//!   section.
//! - **Field types** decide what is below a key. Record-typed fields are
//!   sections, `Vec<Record>` fields are arrays of tables, maps and sets hold
//!   free-form keys, everything else is a value.
//! - **serde attributes** are honored: `rename`, `rename_all`, `alias`,
//!   `flatten`, `skip` and `default`.
//! - **`#[cfg(feature = "...")]`** gates remove records, fields and variants
//!   whose features are off.
//!
//! # Resolution
//!
//! The first segment of a path selects a record by prefix. Every later
//! segment is a field key of the current record. Resolution walks forward
//! only and stops at the first segment that cannot be resolved:
//!
//! | Situation | Result |
//! |-----------|--------|
//! | prefix unknown | [`ResolveFailure::UnknownPrefix`] with the known prefixes |
//! | key unknown | [`ResolveFailure::UnknownField`] with the sibling keys |
//! | key below a value | [`ResolveFailure::NotNestable`] |
//! | key below a map or set | [`ResolvedPath::Dynamic`] |
//!
//! Failures are values, not errors. [`ConfscopeError`] is reserved for I/O,
//! unparsable sources and documents, and bad engine settings.
//!
//! Arrays of tables are entered explicitly: `web.routes[].path` descends into
//! an element of `routes`, while `web.routes.path` does not. The document
//! adapter marks `[[web.routes]]` elements this way.
//!
//! # Crates and precedence
//!
//! A [`Scope`] names the crate being configured, its dependency closure and
//! the other workspace members. When two records claim the same prefix, the
//! current crate wins, then dependencies, then workspace members; ties break
//! by source path. Declarations of crates outside the scope are ignored.
//!
//! # Caching
//!
//! The type index is built once and shared as an immutable
//! `Arc<TypeIndex>`. Two independent signals mark it stale:
//!
//! - [`invalidate_project()`](Engine::invalidate_project) after first-party
//!   edits. Only project crates are rescanned.
//! - [`invalidate_dependencies()`](Engine::invalidate_dependencies) after
//!   dependency changes.
//!
//! Signals only bump counters; the next request rebuilds once no matter how
//! many signals arrived. While one thread rebuilds, others keep reading the
//! previous snapshot. See [`cache`] for the details.
//!
//! # Defaults
//!
//! `#[serde(default = "path")]` functions are evaluated without running any
//! code: literal and `const` arithmetic is folded, then a catalogue of common
//! constructors is recognized (`"x".to_string()`, `Ipv4Addr::new(..)`,
//! `Duration::from_secs(..)`, `vec![..]`, ...). Anything else has no known
//! default. See [`defaults`].
//!
//! # Engine settings
//!
//! The engine itself is configured with a layered settings file
//! (`confscope.toml` in the platform config directory, plus any file passed
//! to [`settings_file()`](EngineBuilder::settings_file)) and `CONFSCOPE_*`
//! environment variables. Settings cover the prefix attribute and trait
//! names, extra wrapper and string-like type names, and the path depth bound.
//! Unknown settings are rejected with their line number unless
//! [`strict(false)`](EngineBuilder::strict) is set. `confscope settings`
//! prints a commented template.
//!
//! # Clap adapter
//!
//! The `cli` module (behind the `clap` feature, on by default) provides
//! [`EngineArgs`] and [`Command`] for embedding in a clap parser, and the
//! `confscope` binary built on them. To use the library without clap:
//!
//! ```toml
//! confscope = { version = "...", default-features = false }
//! ```

pub mod attrs;
pub mod cache;
pub mod classify;
pub mod defaults;
pub mod document;
pub mod error;
pub mod index;
pub mod resolve;
pub mod scan;
pub mod settings;
pub mod types;

mod builder;
#[cfg(feature = "clap")]
mod cli;
mod ops;
mod validate;

#[cfg(test)]
mod fixtures;

pub use builder::{Engine, EngineBuilder};
pub use cache::{DeclarationSource, IndexCache, RebuildTicket, Snapshot};
pub use classify::{Classification, Classifier, NumericKind, TypeClass};
#[cfg(feature = "clap")]
pub use cli::{Command, EngineArgs};
pub use defaults::{DefaultEvaluator, OwnerScope, ValueLiteral};
pub use document::{DocumentKey, key_paths};
pub use error::ConfscopeError;
pub use index::{FeatureResolver, FeatureSet, IndexBuilder, Scope, TypeIndex};
pub use ops::{Action, Outcome, PathReport, PrefixEntry};
pub use resolve::{PathQuery, PathSegment, ResolveFailure, ResolvedPath, Resolver};
pub use scan::{CrateSources, Scanner};
pub use settings::EngineSettings;
pub use types::{
    Declarations, EnumDeclaration, FieldDeclaration, FunctionDeclaration, RecordDeclaration,
};
pub use validate::{Diagnostic, check_document};
