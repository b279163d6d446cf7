//! Engine settings.
//!
//! The names the engine recognizes (prefix attribute, prefix trait, extra
//! wrappers, string-like types) are configurable. Settings are layered the
//! usual way: compiled defaults, then settings files in precedence order, then
//! environment variables. Files are checked strictly: a key the settings do
//! not know is reported with its file and line instead of being ignored.

use std::path::{Path, PathBuf};

use confique::Config;
use serde::Deserialize;
use toml::{Table, Value};

use crate::error::ConfscopeError;

/// File name looked up in the platform configuration directory.
pub const SETTINGS_FILE: &str = "confscope.toml";

#[derive(Config, Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// How records announce their configuration prefix.
    #[config(nested)]
    pub prefix: PrefixSettings,

    /// Type names with fixed classification.
    #[config(nested)]
    pub types: TypeSettings,

    /// Deepest document path the resolver will walk before giving up.
    #[config(default = 32, env = "CONFSCOPE_MAX_DEPTH")]
    pub max_depth: usize,
}

#[derive(Config, Debug, Clone, PartialEq)]
pub struct PrefixSettings {
    /// Attribute carrying the prefix, as in `#[config_prefix = "web"]`.
    #[config(default = "config_prefix", env = "CONFSCOPE_PREFIX_ATTRIBUTE")]
    pub attribute: String,

    /// Trait whose implementation returns the prefix.
    #[config(default = "Configurable")]
    pub trait_name: String,

    /// Method of that trait returning the prefix.
    #[config(default = "config_prefix")]
    pub method: String,
}

#[derive(Config, Debug, Clone, PartialEq)]
pub struct TypeSettings {
    /// Types written in documents as plain strings.
    #[config(default = [
        "IpAddr", "Ipv4Addr", "Ipv6Addr", "SocketAddr", "SocketAddrV4", "SocketAddrV6",
        "PathBuf", "Path", "OsString", "Url", "Uri", "Uuid", "Duration", "Regex"
    ])]
    pub string_like: Vec<String>,

    /// Additional generic containers treated like `Vec<T>`.
    #[config(default = ["SmallVec", "ArrayVec", "NonEmpty"])]
    pub sequence_wrappers: Vec<String>,

    /// Additional generic containers that are transparent, like `Box<T>`.
    #[config(default = ["ArcSwap", "Weak"])]
    pub pointer_wrappers: Vec<String>,
}

/// Pre-loaded settings sources. No I/O happens while resolving these.
#[derive(Debug, Clone, Default)]
pub struct SettingsInput {
    /// File contents in precedence order: first = lowest priority.
    pub files: Vec<(PathBuf, String)>,
    /// Reject keys the settings do not define.
    pub strict: bool,
}

impl SettingsInput {
    /// Read every existing path; missing files are skipped.
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self, ConfscopeError> {
        let mut files = Vec::new();
        for path in paths {
            match std::fs::read_to_string(path) {
                Ok(content) => files.push((path.clone(), content)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(ConfscopeError::Io {
                        path: path.clone(),
                        source,
                    });
                }
            }
        }
        Ok(Self {
            files,
            strict: true,
        })
    }
}

impl EngineSettings {
    /// The values declared on the settings fields, with no files and no
    /// environment applied.
    pub fn defaults() -> Result<Self, ConfscopeError> {
        Self::builder().load().map_err(ConfscopeError::from)
    }

    /// Merge the given files over the defaults, then apply `CONFSCOPE_*`
    /// environment variables.
    pub fn load(input: SettingsInput) -> Result<Self, ConfscopeError> {
        resolve::<Self>(input)
    }

    /// Load from the platform settings file if one exists.
    pub fn load_default() -> Result<Self, ConfscopeError> {
        let paths: Vec<PathBuf> = platform_path().into_iter().collect();
        Self::load(SettingsInput::from_paths(&paths)?)
    }

    /// A commented TOML file listing every setting with its default.
    pub fn template() -> String {
        confique::toml::template::<Self>(confique::toml::FormatOptions::default())
    }
}

/// `~/.config/confscope/confscope.toml` on Linux, the platform equivalent elsewhere.
pub fn platform_path() -> Option<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "confscope")?;
    Some(dirs.config_dir().join(SETTINGS_FILE))
}

fn resolve<C: Config>(input: SettingsInput) -> Result<C, ConfscopeError>
where
    C::Layer: for<'de> Deserialize<'de>,
{
    let mut merged = Table::new();
    for (path, content) in &input.files {
        if input.strict {
            validate_unknown_keys::<C>(content, path)?;
        }
        let table: Table =
            toml::from_str(content).map_err(|source| ConfscopeError::SettingsParse {
                path: path.clone(),
                source,
            })?;
        deep_merge(&mut merged, table);
    }

    let layer: C::Layer =
        Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfscopeError::InvalidSetting {
                key: "<merged>".into(),
                reason: e.to_string(),
            })?;

    // Sources added first take precedence.
    C::builder()
        .env()
        .preloaded(layer)
        .load()
        .map_err(ConfscopeError::from)
}

/// Merge `overlay` into `base`; tables present on both sides merge recursively,
/// anything else is replaced.
fn deep_merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.remove(&key), value) {
            (Some(Value::Table(mut base_table)), Value::Table(overlay_table)) => {
                deep_merge(&mut base_table, overlay_table);
                base.insert(key, Value::Table(base_table));
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn validate_unknown_keys<C: Config>(content: &str, path: &Path) -> Result<(), ConfscopeError>
where
    C::Layer: for<'de> Deserialize<'de>,
{
    let mut unknown = Vec::new();
    let deserializer = toml::Deserializer::new(content);
    let _layer: C::Layer = serde_ignored::deserialize(deserializer, |ignored| {
        unknown.push(ignored.to_string());
    })
    .map_err(|source| ConfscopeError::SettingsParse {
        path: path.to_path_buf(),
        source,
    })?;

    if unknown.is_empty() {
        return Ok(());
    }
    let errors = unknown
        .into_iter()
        .map(|key| ConfscopeError::UnknownSetting {
            line: find_key_line(content, &key),
            key,
            path: path.to_path_buf(),
        })
        .collect();
    Err(ConfscopeError::UnknownSettings(errors))
}

/// 1-based line of a dotted key, tracking `[section]` headers. 0 when not found.
fn find_key_line(content: &str, dotted_key: &str) -> usize {
    let segments: Vec<&str> = dotted_key.split('.').collect();
    let Some((leaf, section)) = segments.split_last() else {
        return 0;
    };
    let mut current: Vec<String> = Vec::new();

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && !trimmed.starts_with("[[") {
            let header = trimmed.trim_start_matches('[').trim_end_matches(']').trim();
            current = header.split('.').map(|s| s.trim().to_string()).collect();
            continue;
        }
        let in_section =
            section.len() == current.len() && section.iter().zip(&current).all(|(a, b)| *a == b);
        if in_section
            && let Some(rest) = trimmed.strip_prefix(leaf)
            && rest.trim_start().starts_with('=')
        {
            return i + 1;
        }
    }
    0
}
