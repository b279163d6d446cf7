//! Clap adapter for confscope.
//!
//! This module is the **optional integration layer** between the engine and
//! the [clap](https://docs.rs/clap) CLI parser. It is compiled only when the
//! `clap` Cargo feature is enabled (on by default).
//!
//! [`EngineArgs`] describes which crates to scan and how, and turns into an
//! [`EngineBuilder`]. [`Command`] turns into an [`Action`] through
//! [`Command::into_action()`]. From there, all logic flows through the
//! clap-free [`Engine::handle()`](crate::Engine::handle) API.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::builder::EngineBuilder;
use crate::ops::Action;

/// Crates to scan, features and settings.
///
/// Embed this into your app's clap derive:
/// ```ignore
/// #[derive(Parser)]
/// struct Cli {
///     #[command(flatten)]
///     engine: EngineArgs,
///     #[command(subcommand)]
///     command: Command,
/// }
/// ```
#[derive(Debug, Args)]
pub struct EngineArgs {
    /// The crate being configured, as NAME=SRC_DIR.
    #[arg(long, value_parser = parse_crate_arg, default_value = "app=src")]
    pub project: (String, PathBuf),

    /// A dependency crate, as NAME=SRC_DIR. Repeatable.
    #[arg(long = "dep", value_parser = parse_crate_arg)]
    pub dependencies: Vec<(String, PathBuf)>,

    /// Another workspace member, as NAME=SRC_DIR. Repeatable.
    #[arg(long = "workspace", value_parser = parse_crate_arg)]
    pub workspace: Vec<(String, PathBuf)>,

    /// Enabled features, as CRATE/FEATURE or FEATURE for the project crate.
    #[arg(long, short = 'F', value_delimiter = ',')]
    pub features: Vec<String>,

    /// Additional settings file, read after the platform settings file.
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Ignore unknown keys in settings files.
    #[arg(long)]
    pub lenient: bool,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,
}

impl EngineArgs {
    pub fn builder(&self) -> EngineBuilder {
        let (project, root) = &self.project;
        let mut builder = EngineBuilder::new()
            .project_crate(project, root)
            .strict(!self.lenient);
        for (name, root) in &self.dependencies {
            builder = builder.dependency(name, root);
        }
        for (name, root) in &self.workspace {
            builder = builder.workspace_crate(name, root);
        }
        for entry in &self.features {
            let (crate_name, feature) = entry
                .split_once('/')
                .unwrap_or((project.as_str(), entry.as_str()));
            builder = builder.feature(crate_name, feature);
        }
        if let Some(path) = &self.settings {
            builder = builder.settings_file(path);
        }
        builder
    }
}

fn parse_crate_arg(arg: &str) -> Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((name, root)) if !name.is_empty() && !root.is_empty() => {
            Ok((name.to_string(), PathBuf::from(root)))
        }
        _ => Err(format!("expected NAME=SRC_DIR, got '{arg}'")),
    }
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show what a dotted document path denotes.
    Resolve {
        /// Dotted path; `[]` marks array descent (e.g. "web.routes[].path").
        path: String,
    },
    /// List the keys below a path, or every prefix when no path is given.
    Keys {
        #[arg(default_value = "")]
        path: String,
    },
    /// Check every key of a TOML configuration document.
    Check {
        document: PathBuf,
    },
    /// List known prefixes and the records they select.
    Prefixes,
    /// Generate a commented engine settings file.
    Settings {
        /// Write to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Command {
    /// Convert clap-parsed args into a framework-agnostic [`Action`].
    pub fn into_action(self) -> Action {
        match self {
            Command::Resolve { path } => Action::Resolve { path },
            Command::Keys { path } => Action::Keys { path },
            Command::Check { document } => Action::Check { document },
            Command::Prefixes => Action::Prefixes,
            Command::Settings { output } => Action::Settings { output },
        }
    }
}
