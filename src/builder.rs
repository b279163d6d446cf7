use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{DeclarationSource, IndexCache};
use crate::classify::Classifier;
use crate::defaults::{DefaultEvaluator, OwnerScope, ValueLiteral};
use crate::error::ConfscopeError;
use crate::index::{FeatureSet, IndexBuilder, Scope, TypeIndex};
use crate::ops::{self, Action, Outcome};
use crate::resolve::{PathQuery, ResolvedPath, Resolver};
use crate::scan::{CrateSources, Scanner};
use crate::settings::{self, EngineSettings, SettingsInput};
use crate::validate::{self, Diagnostic};

/// Builder for an [`Engine`].
///
/// Two things are required: the crate being configured (its name and source
/// directory) and, optionally, the crates it can see:
///
/// - **Dependencies**: [`dependency()`](Self::dependency) crates rank below the
///   project crate when prefixes collide.
/// - **Workspace members**: [`workspace_crate()`](Self::workspace_crate) crates
///   rank last.
///
/// Engine settings come from [`settings()`](Self::settings) when given,
/// otherwise from the platform settings file plus any
/// [`settings_file()`](Self::settings_file), later files winning.
pub struct EngineBuilder {
    project: Option<String>,
    scope: Option<Scope>,
    roots: Vec<(String, PathBuf)>,
    dependencies: Vec<String>,
    workspace: Vec<String>,
    features: FeatureSet,
    settings: Option<EngineSettings>,
    settings_files: Vec<PathBuf>,
    platform_settings: bool,
    strict: bool,
    source: Option<Box<dyn DeclarationSource + Send + Sync>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            project: None,
            scope: None,
            roots: Vec::new(),
            dependencies: Vec::new(),
            workspace: Vec::new(),
            features: FeatureSet::new(),
            settings: None,
            settings_files: Vec::new(),
            platform_settings: true,
            strict: true,
            source: None,
        }
    }

    /// The crate whose configuration is being resolved, and its `src` directory.
    pub fn project_crate(mut self, name: &str, root: impl Into<PathBuf>) -> Self {
        self.project = Some(name.to_string());
        self.roots.push((name.to_string(), root.into()));
        self
    }

    pub fn dependency(mut self, name: &str, root: impl Into<PathBuf>) -> Self {
        self.dependencies.push(name.to_string());
        self.roots.push((name.to_string(), root.into()));
        self
    }

    pub fn workspace_crate(mut self, name: &str, root: impl Into<PathBuf>) -> Self {
        self.workspace.push(name.to_string());
        self.roots.push((name.to_string(), root.into()));
        self
    }

    /// Enable a Cargo feature of one crate.
    pub fn feature(mut self, crate_name: &str, feature: &str) -> Self {
        self.features = self.features.enable(crate_name, feature);
        self
    }

    /// Use declarations from `source` instead of scanning directories.
    /// The scope must then be given with [`scope()`](Self::scope).
    pub fn source(mut self, source: impl DeclarationSource + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Set the scope directly. Replaces crates registered with
    /// [`project_crate()`](Self::project_crate) and friends.
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Use these settings and skip settings files entirely.
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Add a settings file on top of the platform file. Missing files are skipped.
    pub fn settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_files.push(path.into());
        self
    }

    /// Do not read the platform settings file.
    pub fn no_platform_settings(mut self) -> Self {
        self.platform_settings = false;
        self
    }

    /// Enable or disable strict mode for settings files (default: `true`).
    /// In strict mode, unknown settings produce errors.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn effective_scope(&self) -> Result<Scope, ConfscopeError> {
        if let Some(scope) = &self.scope {
            return Ok(scope.clone());
        }
        let project = self.project.as_deref().ok_or(ConfscopeError::NoProjectCrate)?;
        let scope = self
            .dependencies
            .iter()
            .fold(Scope::new(project), |scope, dep| scope.with_dependency(dep.as_str()));
        Ok(self
            .workspace
            .iter()
            .fold(scope, |scope, member| scope.with_workspace_crate(member.as_str())))
    }

    fn effective_settings_files(&self) -> Vec<PathBuf> {
        let platform = self
            .platform_settings
            .then(settings::platform_path)
            .flatten();
        platform
            .into_iter()
            .chain(self.settings_files.iter().cloned())
            .collect()
    }

    fn effective_settings(&mut self) -> Result<EngineSettings, ConfscopeError> {
        if let Some(settings) = self.settings.take() {
            return Ok(settings);
        }
        let mut input = SettingsInput::from_paths(&self.effective_settings_files())?;
        input.strict = self.strict;
        EngineSettings::load(input)
    }

    pub fn build(mut self) -> Result<Engine, ConfscopeError> {
        let scope = self.effective_scope()?;
        let settings = self.effective_settings()?;
        let source = match self.source.take() {
            Some(source) => source,
            None => {
                let sources = self
                    .roots
                    .drain(..)
                    .fold(CrateSources::new(Scanner::new(&settings)), |sources, (name, root)| {
                        sources.with_crate(name, root)
                    });
                Box::new(sources)
            }
        };
        tracing::debug!(crate_name = %scope.current, "engine built");
        Ok(Engine {
            classifier: Classifier::from_settings(&settings.types),
            scope,
            features: self.features,
            settings,
            source,
            cache: IndexCache::new(),
        })
    }
}

/// Resolves configuration paths for one crate.
///
/// The type index is built lazily on first use and cached. Call
/// [`invalidate_project()`](Self::invalidate_project) after first-party
/// sources change and [`invalidate_dependencies()`](Self::invalidate_dependencies)
/// after dependency sources change; the next request rebuilds.
pub struct Engine {
    scope: Scope,
    features: FeatureSet,
    settings: EngineSettings,
    classifier: Classifier,
    source: Box<dyn DeclarationSource + Send + Sync>,
    cache: IndexCache,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// The current type index, rebuilt if an invalidation arrived since the
    /// last build.
    pub fn index(&self) -> Result<Arc<TypeIndex>, ConfscopeError> {
        if let Some(index) = self.cache.load(&self.scope, self.source.as_ref(), &self.features)? {
            return Ok(index);
        }
        // First build still in flight on another thread: build privately.
        tracing::debug!(crate_name = %self.scope.current, "building uncached index");
        let mut sets = self.source.dependency_declarations(&self.scope)?;
        sets.extend(self.source.project_declarations(&self.scope)?);
        Ok(Arc::new(
            IndexBuilder::new(self.scope.clone(), &self.features).build(sets.iter()),
        ))
    }

    pub fn invalidate_project(&self) {
        self.cache.invalidate_project();
    }

    pub fn invalidate_dependencies(&self) {
        self.cache.invalidate_dependencies();
    }

    /// Resolve a dotted path; `[]` after a segment marks array descent.
    pub fn resolve(&self, path: &str) -> Result<ResolvedPath, ConfscopeError> {
        let index = self.index()?;
        Ok(self.resolver(&index).resolve(&PathQuery::parse(path)))
    }

    /// Default of the field `path` ends on.
    pub fn default_of(&self, path: &str) -> Result<Option<ValueLiteral>, ConfscopeError> {
        let index = self.index()?;
        let evaluator = DefaultEvaluator::new(&index, &self.classifier);
        Ok(match self.resolver(&index).resolve(&PathQuery::parse(path)) {
            ResolvedPath::Field { owner, field, .. } => evaluator.evaluate_field(&field, &owner),
            _ => None,
        })
    }

    /// Evaluate a `default = "..."` function reference as seen from `crate_name`.
    pub fn evaluate_default(
        &self,
        function: &str,
        crate_name: &str,
    ) -> Result<Option<ValueLiteral>, ConfscopeError> {
        let index = self.index()?;
        Ok(DefaultEvaluator::new(&index, &self.classifier)
            .evaluate(function, &OwnerScope::new(crate_name)))
    }

    pub fn check_document(&self, text: &str) -> Result<Vec<Diagnostic>, ConfscopeError> {
        let index = self.index()?;
        validate::check_document(text, &self.resolver(&index))
    }

    /// Handle an [`Action`] and print the result to stdout.
    pub fn handle_and_print(&self, action: &Action) -> Result<Outcome, ConfscopeError> {
        let outcome = self.handle(action)?;
        println!("{outcome}");
        Ok(outcome)
    }

    pub fn handle(&self, action: &Action) -> Result<Outcome, ConfscopeError> {
        match action {
            Action::Resolve { path } => {
                let index = self.index()?;
                let evaluator = DefaultEvaluator::new(&index, &self.classifier);
                Ok(Outcome::Resolved(ops::report_path(
                    &self.resolver(&index),
                    &evaluator,
                    path,
                )))
            }
            Action::Keys { path } => {
                let index = self.index()?;
                Ok(Outcome::Keys {
                    path: path.clone(),
                    keys: ops::list_keys(&self.resolver(&index), path),
                })
            }
            Action::Check { document } => {
                let text = std::fs::read_to_string(document).map_err(|source| ConfscopeError::Io {
                    path: document.clone(),
                    source,
                })?;
                Ok(Outcome::Checked {
                    document: document.clone(),
                    diagnostics: self.check_document(&text)?,
                })
            }
            Action::Prefixes => Ok(Outcome::Prefixes {
                entries: ops::list_prefixes(&*self.index()?),
            }),
            Action::Settings { output } => {
                let template = EngineSettings::template();
                match output {
                    Some(path) => {
                        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                            std::fs::create_dir_all(parent).map_err(|source| ConfscopeError::Io {
                                path: parent.to_path_buf(),
                                source,
                            })?;
                        }
                        std::fs::write(path, &template).map_err(|source| ConfscopeError::Io {
                            path: path.clone(),
                            source,
                        })?;
                        Ok(Outcome::TemplateWritten { path: path.clone() })
                    }
                    None => Ok(Outcome::Template { template }),
                }
            }
        }
    }

    fn resolver<'a>(&'a self, index: &'a TypeIndex) -> Resolver<'a> {
        Resolver::new(index, &self.classifier).with_max_depth(self.settings.max_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::{SAMPLE_SOURCE, declarations_of};
    use crate::types::Declarations;
    use std::fs;
    use tempfile::TempDir;

    fn project(source: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("lib.rs"), source).unwrap();
        dir
    }

    fn engine(dir: &TempDir) -> Engine {
        Engine::builder()
            .project_crate("app", dir.path())
            .settings(crate::fixtures::test::settings())
            .build()
            .unwrap()
    }

    #[test]
    fn project_crate_is_required() {
        let result = Engine::builder().settings(crate::fixtures::test::settings()).build();
        assert!(matches!(result, Err(ConfscopeError::NoProjectCrate)));
    }

    #[test]
    fn scope_collects_registered_crates() {
        let builder = Engine::builder()
            .project_crate("app", "app/src")
            .dependency("shared", "shared/src")
            .workspace_crate("tools", "tools/src");
        let scope = builder.effective_scope().unwrap();
        assert_eq!(scope.current, "app");
        assert!(scope.dependencies.contains("shared"));
        assert!(scope.workspace.contains("tools"));
    }

    #[test]
    fn settings_files_follow_platform_file() {
        let builder = Engine::builder()
            .no_platform_settings()
            .settings_file("a.toml")
            .settings_file("b.toml");
        assert_eq!(
            builder.effective_settings_files(),
            vec![PathBuf::from("a.toml"), PathBuf::from("b.toml")]
        );
    }

    #[test]
    fn settings_file_is_applied() {
        let dir = project(SAMPLE_SOURCE);
        let settings = dir.path().join("confscope.toml");
        fs::write(&settings, "max_depth = 2\n").unwrap();
        let engine = Engine::builder()
            .project_crate("app", dir.path())
            .no_platform_settings()
            .settings_file(&settings)
            .build()
            .unwrap();
        assert_eq!(engine.settings().max_depth, 2);
        assert!(matches!(
            engine.resolve("web.routes[].path").unwrap(),
            ResolvedPath::Field { .. }
        ));
    }

    #[test]
    fn unknown_setting_fails_the_build_in_strict_mode() {
        let dir = TempDir::new().unwrap();
        let settings = dir.path().join("confscope.toml");
        fs::write(&settings, "max_dpeth = 2\n").unwrap();
        let strict = Engine::builder()
            .project_crate("app", dir.path())
            .no_platform_settings()
            .settings_file(&settings)
            .build();
        assert!(strict.is_err());

        let lenient = Engine::builder()
            .project_crate("app", dir.path())
            .no_platform_settings()
            .settings_file(&settings)
            .strict(false)
            .build();
        assert!(lenient.is_ok());
    }

    #[test]
    fn resolves_from_scanned_sources() {
        let dir = project(SAMPLE_SOURCE);
        let engine = engine(&dir);
        match engine.resolve("web.middlewares.cors").unwrap() {
            ResolvedPath::Field { owner, .. } => assert_eq!(owner.name, "MiddlewareConfig"),
            other => panic!("Expected Field, got: {other:?}"),
        }
        assert_eq!(engine.default_of("web.port").unwrap().unwrap().to_string(), "8080");
        assert_eq!(
            engine
                .evaluate_default("default_timeout_secs", "app")
                .unwrap()
                .unwrap()
                .to_string(),
            "120"
        );
    }

    #[test]
    fn features_enable_gated_fields() {
        let dir = project(SAMPLE_SOURCE);
        let engine = Engine::builder()
            .project_crate("app", dir.path())
            .feature("app", "tls")
            .settings(crate::fixtures::test::settings())
            .build()
            .unwrap();
        assert!(matches!(
            engine.resolve("web.tls_cert").unwrap(),
            ResolvedPath::Field { .. }
        ));
    }

    #[test]
    fn edits_are_seen_after_invalidation() {
        let dir = project("#[config_prefix = \"web\"] struct Web { port: u16 }");
        let engine = engine(&dir);
        assert!(engine.resolve("web.host").unwrap().failure().is_some());

        fs::write(
            dir.path().join("lib.rs"),
            "#[config_prefix = \"web\"] struct Web { port: u16, host: String }",
        )
        .unwrap();
        assert!(engine.resolve("web.host").unwrap().failure().is_some());

        engine.invalidate_project();
        assert!(engine.resolve("web.host").unwrap().failure().is_none());
    }

    #[test]
    fn handle_check_reads_the_document() {
        let dir = project(SAMPLE_SOURCE);
        let document = dir.path().join("app.toml");
        fs::write(&document, "[web]\nport = 1\nprot = 2\n").unwrap();
        let outcome = engine(&dir)
            .handle(&Action::Check {
                document: document.clone(),
            })
            .unwrap();
        match &outcome {
            Outcome::Checked { diagnostics, .. } => {
                assert_eq!(diagnostics.len(), 1);
                assert_eq!(diagnostics[0].line, 3);
            }
            other => panic!("Expected Checked, got: {other:?}"),
        }
        assert!(outcome.has_problems());
    }

    #[test]
    fn handle_check_missing_document_is_io_error() {
        let dir = project(SAMPLE_SOURCE);
        let result = engine(&dir).handle(&Action::Check {
            document: dir.path().join("missing.toml"),
        });
        assert!(matches!(result, Err(ConfscopeError::Io { .. })));
    }

    #[test]
    fn handle_prefixes_and_keys() {
        let dir = project(SAMPLE_SOURCE);
        let engine = engine(&dir);
        match engine.handle(&Action::Prefixes).unwrap() {
            Outcome::Prefixes { entries } => assert_eq!(entries.len(), 5),
            other => panic!("Expected Prefixes, got: {other:?}"),
        }
        match engine
            .handle(&Action::Keys {
                path: "database".into(),
            })
            .unwrap()
        {
            Outcome::Keys { keys, .. } => assert_eq!(keys, vec!["max-connections", "url"]),
            other => panic!("Expected Keys, got: {other:?}"),
        }
    }

    #[test]
    fn handle_settings_template() {
        let dir = project("");
        let engine = engine(&dir);
        match engine.handle(&Action::Settings { output: None }).unwrap() {
            Outcome::Template { template } => assert!(template.contains("max_depth")),
            other => panic!("Expected Template, got: {other:?}"),
        }
        let output = dir.path().join("nested").join("confscope.toml");
        let outcome = engine
            .handle(&Action::Settings {
                output: Some(output.clone()),
            })
            .unwrap();
        assert_eq!(outcome, Outcome::TemplateWritten { path: output.clone() });
        assert!(fs::read_to_string(output).unwrap().contains("max_depth"));
    }

    struct Fixed(Vec<Declarations>);

    impl DeclarationSource for Fixed {
        fn project_declarations(&self, _: &Scope) -> Result<Vec<Declarations>, ConfscopeError> {
            Ok(self.0.clone())
        }

        fn dependency_declarations(&self, _: &Scope) -> Result<Vec<Declarations>, ConfscopeError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn custom_source_and_scope() {
        let engine = Engine::builder()
            .scope(Scope::new("app"))
            .source(Fixed(vec![declarations_of("app", SAMPLE_SOURCE)]))
            .settings(crate::fixtures::test::settings())
            .build()
            .unwrap();
        assert!(matches!(
            engine.resolve("database.dsn").unwrap(),
            ResolvedPath::Field { .. }
        ));
    }
}
