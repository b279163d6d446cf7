//! Errors for the parts of the engine that touch the outside world.
//!
//! Resolution outcomes such as an unknown prefix or an unresolvable default
//! are *not* errors; they are values of [`ResolvedPath`](crate::ResolvedPath)
//! and `Option`. Only I/O, unparsable input and bad engine settings end up
//! here.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfscopeError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse Rust source {path}: {message}")]
    Syntax { path: PathBuf, message: String },

    #[error("Failed to parse configuration document: {0}")]
    Document(#[from] toml_edit::TomlError),

    #[error("Failed to parse settings file {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Unknown setting '{key}' in {path} (line {line})")]
    UnknownSetting {
        key: String,
        path: PathBuf,
        line: usize,
    },

    #[error("Unknown settings in settings file")]
    UnknownSettings(Vec<ConfscopeError>),

    #[error("Invalid settings: {0}")]
    Settings(#[from] confique::Error),

    #[error("Invalid value for setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("No project crate configured; call .project_crate() on the builder")]
    NoProjectCrate,
}
