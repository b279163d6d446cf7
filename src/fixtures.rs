#[cfg(test)]
pub mod test {
    use crate::classify::Classifier;
    use crate::index::{FeatureSet, IndexBuilder, Scope, TypeIndex};
    use crate::scan::Scanner;
    use crate::settings::EngineSettings;
    use crate::types::{
        AttributeMap, Declarations, FieldDeclaration, RecordDeclaration, Visibility,
    };

    /// A small web service configuration exercising every resolution rule.
    pub const SAMPLE_SOURCE: &str = r#"
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use serde::Deserialize;

const BASE_TIMEOUT: u64 = 60;
const LOOP_A: u32 = LOOP_B;
const LOOP_B: u32 = LOOP_A;

/// Web server settings.
#[derive(Debug, Deserialize)]
#[config_prefix = "web"]
pub struct WebConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub middlewares: MiddlewareConfig,

    pub log_level: LogLevel,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    pub routes: Vec<Route>,

    pub headers: HashMap<String, String>,

    pub allowed_ips: HashSet<IpAddr>,

    #[serde(skip)]
    pub runtime_handle: Option<Handle>,

    #[serde(flatten)]
    pub tuning: Tuning,

    #[cfg(feature = "tls")]
    pub tls_cert: Option<PathBuf>,
}

impl WebConfig {
    const MAX_WORKERS: usize = 16;

    fn default_workers() -> usize {
        4
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MiddlewareConfig {
    pub cors: bool,
}

#[derive(Debug, Deserialize)]
pub struct Route {
    pub path: String,
    pub methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[config_prefix = "tuning"]
pub struct Tuning {
    pub keep_alive: u64,
    pub backlog: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

#[derive(Debug, Deserialize)]
#[config_prefix = "database"]
#[serde(rename_all = "kebab-case")]
pub struct DatabaseConfig {
    pub max_connections: u32,
    #[serde(rename = "url", alias = "dsn")]
    pub connection_string: String,
}

#[derive(Debug, Deserialize)]
#[config_prefix = "metadata"]
pub struct Metadata {
    pub name: String,
    #[serde(flatten)]
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Configurable for CacheConfig {
    fn config_prefix() -> &'static str {
        "cache"
    }
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

fn default_timeout_secs() -> u64 {
    BASE_TIMEOUT * 2
}

fn default_workers() -> usize {
    1
}

fn default_from_env() -> String {
    std::env::var("HOST").unwrap_or_default()
}
"#;

    pub fn settings() -> EngineSettings {
        EngineSettings::defaults().unwrap()
    }

    pub fn classifier() -> Classifier {
        Classifier::from_settings(&settings().types)
    }

    pub fn scanner() -> Scanner {
        Scanner::new(&settings())
    }

    pub fn declarations_of(crate_name: &str, source: &str) -> Declarations {
        scanner()
            .scan_source(crate_name, None, source)
            .unwrap()
    }

    pub fn index_of(source: &str) -> TypeIndex {
        let decls = declarations_of("app", source);
        IndexBuilder::new(Scope::new("app"), &FeatureSet::new()).build([&decls])
    }

    pub fn sample_index() -> TypeIndex {
        sample_index_with(FeatureSet::new())
    }

    pub fn sample_index_with(features: FeatureSet) -> TypeIndex {
        let decls = declarations_of("app", SAMPLE_SOURCE);
        IndexBuilder::new(Scope::new("app"), &features).build([&decls])
    }

    pub fn string_field(name: &str) -> FieldDeclaration {
        FieldDeclaration {
            name: name.into(),
            ty: "String".into(),
            wrappers: vec![],
            inner_type: "String".into(),
            attributes: AttributeMap::new(),
            doc: None,
            visibility: Visibility::Public,
            gate: None,
        }
    }

    pub fn record(name: &str, crate_name: &str) -> RecordDeclaration {
        RecordDeclaration {
            name: name.into(),
            crate_name: crate_name.into(),
            path: None,
            fields: vec![],
            derives: vec!["Deserialize".into()],
            config_prefix: None,
            doc: None,
            rename_all: None,
            gate: None,
        }
    }

    pub fn record_with_prefix(
        name: &str,
        crate_name: &str,
        prefix: &str,
        path: &str,
    ) -> RecordDeclaration {
        RecordDeclaration {
            config_prefix: Some(prefix.into()),
            path: Some(path.into()),
            ..record(name, crate_name)
        }
    }

    #[test]
    fn sample_source_scans() {
        let decls = declarations_of("app", SAMPLE_SOURCE);
        let prefixes: Vec<_> = decls
            .records
            .iter()
            .filter_map(|r| r.config_prefix.as_deref())
            .collect();
        assert_eq!(
            prefixes,
            vec!["web", "tuning", "database", "metadata", "cache"]
        );
        assert_eq!(decls.enums.len(), 1);
    }

    #[test]
    fn sample_index_registers_types() {
        let index = sample_index();
        assert!(index.record("MiddlewareConfig").is_some());
        assert!(index.enum_decl("LogLevel").is_some());
        assert_eq!(
            index.prefixes(),
            vec!["cache", "database", "metadata", "tuning", "web"]
        );
    }
}
