//! Injection pass - rewrites token placeholders in declaration order.

use crate::report::{FileChange, InjectionReport, TokenOutcome, TokenReport};
use crate::store::{ArtifactStore, FsArtifactStore};
use crate::walker::discover_artifacts;
use chrono::Utc;
use envinject_core::{
    Binding, BindingSource, Error, ExtensionFilter, Result, Token,
};
use futures::StreamExt;
use futures::stream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Options controlling a pass.
#[derive(Debug, Clone)]
pub struct InjectOptions {
    pub extensions: ExtensionFilter,
    /// Treat every unresolved token as fatal.
    pub strict: bool,
    /// Scan and report without writing.
    pub dry_run: bool,
    /// Files processed concurrently within one token.
    pub jobs: usize,
}

impl Default for InjectOptions {
    fn default() -> Self {
        Self {
            extensions: ExtensionFilter::default(),
            strict: false,
            dry_run: false,
            jobs: 8,
        }
    }
}

/// Substitutes token placeholders in the artifacts under a root directory.
pub struct Injector {
    root: PathBuf,
    tokens: Vec<Token>,
    bindings: Arc<dyn BindingSource>,
    store: Arc<dyn ArtifactStore>,
    options: InjectOptions,
}

impl Injector {
    pub fn new(root: impl Into<PathBuf>, tokens: Vec<Token>, bindings: Arc<dyn BindingSource>) -> Self {
        Self {
            root: root.into(),
            tokens,
            bindings,
            store: Arc::new(FsArtifactStore),
            options: InjectOptions::default(),
        }
    }

    /// Use a different artifact store than the local filesystem.
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_options(mut self, options: InjectOptions) -> Self {
        self.options = options;
        self
    }

    /// Run the pass.
    ///
    /// Unresolved tokens are warnings unless strict mode is on or the token is
    /// required; in that case the pass fails before any file is written. Any
    /// I/O failure aborts the remaining tokens.
    pub async fn run(&self) -> Result<InjectionReport> {
        let started_at = Utc::now();

        let artifacts = discover_artifacts(&self.root, &self.options.extensions)
            .await
            .inspect_err(|e| error!(root = %self.root.display(), error = %e, "Cannot scan artifact root"))?;
        info!(root = %self.root.display(), files = artifacts.len(), "Discovered artifacts");

        let plan: Vec<(&Token, Option<Binding>)> = self
            .tokens
            .iter()
            .map(|token| (token, self.bindings.resolve(token)))
            .collect();

        let fatal: Vec<String> = plan
            .iter()
            .filter(|(token, binding)| {
                binding.is_none() && (self.options.strict || token.required)
            })
            .map(|(token, _)| token.name().to_string())
            .collect();
        if !fatal.is_empty() {
            error!(tokens = ?fatal, "Required tokens have no binding");
            return Err(Error::Unresolved(fatal));
        }

        let mut tokens = Vec::with_capacity(plan.len());
        for (token, binding) in plan {
            let outcome = match binding {
                Some(binding) => self.inject_token(token, &binding, &artifacts).await?,
                None => self.count_unresolved(token, &artifacts).await?,
            };
            tokens.push(TokenReport {
                token: token.name().to_string(),
                outcome,
            });
        }

        let report = InjectionReport {
            root: self.root.clone(),
            dry_run: self.options.dry_run,
            started_at,
            finished_at: Utc::now(),
            files_scanned: artifacts.len(),
            tokens,
        };

        info!(
            resolved = report.resolved_count(),
            unresolved = report.unresolved().len(),
            files_scanned = report.files_scanned,
            files_changed = report.files_changed(),
            replacements = report.total_replacements(),
            dry_run = report.dry_run,
            "Injection complete"
        );

        Ok(report)
    }

    /// Replace one token's placeholder across the artifacts.
    ///
    /// Reads and substitutions run ahead concurrently; writes happen one at a
    /// time in path order and the first failure stops the token, so no file
    /// after a failed one is modified.
    async fn inject_token(
        &self,
        token: &Token,
        binding: &Binding,
        artifacts: &[PathBuf],
    ) -> Result<TokenOutcome> {
        let placeholder = token.placeholder();
        let dry_run = self.options.dry_run;
        let store = self.store.as_ref();

        let prepared = stream::iter(artifacts)
            .map(|path| {
                let placeholder = &placeholder;
                async move {
                    let result = read_artifact(store, path).await.map(|content| {
                        let substitution = placeholder.apply(&content, &binding.value);
                        let replacements = substitution.replacements;
                        let changed = substitution
                            .is_changed()
                            .then(|| substitution.content.into_owned());
                        (changed, replacements)
                    });
                    (path, result)
                }
            })
            .buffered(self.options.jobs.max(1));
        let mut prepared = std::pin::pin!(prepared);

        let mut files = Vec::new();
        while let Some((path, result)) = prepared.next().await {
            let relative = self.relative(path);
            let fail = |e: &Error| {
                error!(token = %token, path = %relative.display(), error = %e, "Failed to update artifact, stopping");
            };

            let (changed, replacements) = result.inspect_err(fail)?;
            let Some(content) = changed else {
                debug!(token = %token, path = %relative.display(), "No occurrences");
                continue;
            };

            if dry_run {
                info!(token = %token, path = %relative.display(), replacements, "Would replace placeholder");
            } else {
                store
                    .write(path, content)
                    .await
                    .map_err(|source| Error::Write {
                        path: path.clone(),
                        source,
                    })
                    .inspect_err(fail)?;
                info!(token = %token, path = %relative.display(), replacements, "Replaced placeholder");
            }

            files.push(FileChange {
                path: relative,
                replacements,
            });
        }

        let replacements: usize = files.iter().map(|f| f.replacements).sum();
        info!(
            token = %token,
            value = %binding.display_value(),
            files = files.len(),
            replacements,
            "Token injected"
        );

        Ok(TokenOutcome::Replaced {
            value: binding.display_value().to_string(),
            files,
            replacements,
        })
    }

    async fn count_unresolved(&self, token: &Token, artifacts: &[PathBuf]) -> Result<TokenOutcome> {
        let placeholder = token.placeholder();
        let store = self.store.as_ref();

        let counts: Vec<Result<usize>> = stream::iter(artifacts)
            .map(|path| {
                let placeholder = &placeholder;
                async move {
                    read_artifact(store, path)
                        .await
                        .map(|content| placeholder.count(&content))
                }
            })
            .buffered(self.options.jobs.max(1))
            .collect()
            .await;

        let mut occurrences = 0;
        let mut files = 0;
        for count in counts {
            let count = count.inspect_err(|e| error!(token = %token, error = %e, "Failed to read artifact"))?;
            if count > 0 {
                occurrences += count;
                files += 1;
            }
        }

        warn!(
            token = %token,
            placeholder = %placeholder,
            occurrences,
            files,
            "Token has no binding, placeholder left unchanged"
        );

        Ok(TokenOutcome::Unresolved { occurrences, files })
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root).unwrap_or(path).to_path_buf()
    }
}

async fn read_artifact(store: &dyn ArtifactStore, path: &Path) -> Result<Vec<u8>> {
    store.read(path).await.map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    fn bindings(pairs: &[(&str, &str)]) -> Arc<dyn BindingSource> {
        Arc::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        )
    }

    fn tokens(names: &[&str]) -> Vec<Token> {
        names.iter().map(|n| Token::new(*n).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_replaces_bound_token() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app.js");
        fs::write(&app, r#"url: "__NEXT_PUBLIC_CW_APP_URL__""#).unwrap();

        let injector = Injector::new(
            dir.path(),
            tokens(&["NEXT_PUBLIC_CW_APP_URL"]),
            bindings(&[("NEXT_PUBLIC_CW_APP_URL", "https://app.example.com")]),
        );
        let report = injector.run().await.unwrap();

        assert_eq!(
            fs::read_to_string(&app).unwrap(),
            r#"url: "https://app.example.com""#
        );
        assert_eq!(report.files_scanned, 1);
        assert_eq!(
            report.tokens[0].outcome,
            TokenOutcome::Replaced {
                value: "https://app.example.com".to_string(),
                files: vec![FileChange {
                    path: PathBuf::from("app.js"),
                    replacements: 1,
                }],
                replacements: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_unbound_token_left_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app.js");
        let original = r#"url: "__NEXT_PUBLIC_CW_APP_URL__", domain: "__NEXT_PUBLIC_CW_DOMAIN__""#;
        fs::write(&app, original).unwrap();

        let injector = Injector::new(
            dir.path(),
            tokens(&["NEXT_PUBLIC_CW_APP_URL", "NEXT_PUBLIC_CW_DOMAIN"]),
            bindings(&[
                ("NEXT_PUBLIC_CW_APP_URL", "https://app.example.com"),
                ("NEXT_PUBLIC_CW_DOMAIN", ""),
            ]),
        );
        let report = injector.run().await.unwrap();

        assert_eq!(
            fs::read_to_string(&app).unwrap(),
            r#"url: "https://app.example.com", domain: "__NEXT_PUBLIC_CW_DOMAIN__""#
        );
        assert_eq!(report.unresolved(), vec!["NEXT_PUBLIC_CW_DOMAIN"]);
        assert_eq!(
            report.tokens[1].outcome,
            TokenOutcome::Unresolved {
                occurrences: 1,
                files: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("static")).unwrap();
        fs::write(dir.path().join("index.html"), "<a href=\"__REDIRECT__\">").unwrap();
        fs::write(dir.path().join("static/a.js"), "__REDIRECT__;__REDIRECT__").unwrap();

        let injector = Injector::new(
            dir.path(),
            tokens(&["REDIRECT"]),
            bindings(&[("REDIRECT", "/home")]),
        );

        let first = injector.run().await.unwrap();
        assert_eq!(first.total_replacements(), 3);
        assert_eq!(first.files_changed(), 2);

        let second = injector.run().await.unwrap();
        assert_eq!(second.total_replacements(), 0);
        assert_eq!(second.files_changed(), 0);
        assert_eq!(
            fs::read_to_string(dir.path().join("static/a.js")).unwrap(),
            "/home;/home"
        );
    }

    #[tokio::test]
    async fn test_disallowed_extensions_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("manifest.json");
        fs::write(&json, "__TOKEN__").unwrap();
        let modified = fs::metadata(&json).unwrap().modified().unwrap();

        let injector = Injector::new(dir.path(), tokens(&["TOKEN"]), bindings(&[("TOKEN", "x")]));
        let report = injector.run().await.unwrap();

        assert_eq!(report.files_scanned, 0);
        assert_eq!(fs::read_to_string(&json).unwrap(), "__TOKEN__");
        assert_eq!(fs::metadata(&json).unwrap().modified().unwrap(), modified);
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let injector = Injector::new(
            dir.path().join("missing"),
            tokens(&["TOKEN"]),
            bindings(&[("TOKEN", "x")]),
        );

        let result = injector.run().await;
        assert!(matches!(result.unwrap_err(), Error::RootNotFound(_)));
    }

    #[tokio::test]
    async fn test_strict_mode_aborts_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app.js");
        fs::write(&app, "__BOUND__ __UNBOUND__").unwrap();

        let injector = Injector::new(
            dir.path(),
            tokens(&["BOUND", "UNBOUND"]),
            bindings(&[("BOUND", "value")]),
        )
        .with_options(InjectOptions {
            strict: true,
            ..Default::default()
        });

        match injector.run().await.unwrap_err() {
            Error::Unresolved(names) => assert_eq!(names, vec!["UNBOUND"]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read_to_string(&app).unwrap(), "__BOUND__ __UNBOUND__");
    }

    #[tokio::test]
    async fn test_required_token_is_fatal_without_strict() {
        let dir = tempfile::tempdir().unwrap();
        let tokens = vec![Token::new("API_URL").unwrap().required(true)];

        let injector = Injector::new(dir.path(), tokens, bindings(&[]));
        assert!(matches!(
            injector.run().await.unwrap_err(),
            Error::Unresolved(_)
        ));
    }

    #[tokio::test]
    async fn test_dry_run_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let css = dir.path().join("main.css");
        fs::write(&css, "background: url(__CDN__/bg.png)").unwrap();

        let injector = Injector::new(dir.path(), tokens(&["CDN"]), bindings(&[("CDN", "https://cdn")]))
            .with_options(InjectOptions {
                dry_run: true,
                ..Default::default()
            });
        let report = injector.run().await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.total_replacements(), 1);
        assert_eq!(
            fs::read_to_string(&css).unwrap(),
            "background: url(__CDN__/bg.png)"
        );
    }

    #[tokio::test]
    async fn test_secret_value_masked_in_report() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app.js");
        fs::write(&app, "key=__API_KEY__").unwrap();

        let tokens = vec![Token::new("API_KEY").unwrap().secret(true)];
        let injector = Injector::new(dir.path(), tokens, bindings(&[("API_KEY", "hunter2")]));
        let report = injector.run().await.unwrap();

        assert_eq!(fs::read_to_string(&app).unwrap(), "key=hunter2");
        match &report.tokens[0].outcome {
            TokenOutcome::Replaced { value, .. } => assert_eq!(value, "******"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_replacement_value_inserted_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app.js");
        fs::write(&app, "__PATTERN__").unwrap();

        let injector = Injector::new(
            dir.path(),
            tokens(&["PATTERN"]),
            bindings(&[("PATTERN", r"$1\${x}&")]),
        );
        injector.run().await.unwrap();

        assert_eq!(fs::read_to_string(&app).unwrap(), r"$1\${x}&");
    }

    #[tokio::test]
    async fn test_many_files_with_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..20 {
            fs::write(dir.path().join(format!("chunk-{i:02}.js")), "a=__A__;b=__B__").unwrap();
        }

        let injector = Injector::new(
            dir.path(),
            tokens(&["A", "B"]),
            bindings(&[("A", "1"), ("B", "2")]),
        )
        .with_options(InjectOptions {
            jobs: 4,
            ..Default::default()
        });
        let report = injector.run().await.unwrap();

        assert_eq!(report.files_changed(), 20);
        assert_eq!(report.total_replacements(), 40);
        match &report.tokens[0].outcome {
            TokenOutcome::Replaced { files, .. } => {
                let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
                let mut sorted = paths.clone();
                sorted.sort();
                assert_eq!(paths, sorted);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        for i in 0..20 {
            assert_eq!(
                fs::read_to_string(dir.path().join(format!("chunk-{i:02}.js"))).unwrap(),
                "a=1;b=2"
            );
        }
    }

    /// Filesystem store that fails reads or writes for chosen file names and
    /// records every successful write.
    #[derive(Default)]
    struct FaultyStore {
        fail_read: Option<&'static str>,
        fail_write: Option<&'static str>,
        written: std::sync::Mutex<Vec<String>>,
    }

    impl FaultyStore {
        fn matches(path: &Path, name: Option<&str>) -> bool {
            name.is_some_and(|name| path.file_name().is_some_and(|f| f == name))
        }

        fn written(&self) -> Vec<String> {
            self.written.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ArtifactStore for FaultyStore {
        async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
            if Self::matches(path, self.fail_read) {
                return Err(std::io::Error::other("injected read failure"));
            }
            FsArtifactStore.read(path).await
        }

        async fn write(&self, path: &Path, content: Vec<u8>) -> std::io::Result<()> {
            if Self::matches(path, self.fail_write) {
                return Err(std::io::Error::other("injected write failure"));
            }
            FsArtifactStore.write(path, content).await?;
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            self.written.lock().unwrap().push(name);
            Ok(())
        }
    }

    fn write_chunks(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), "__TOKEN__").unwrap();
        }
    }

    #[tokio::test]
    async fn test_write_failure_on_first_file_stops_token() {
        let dir = tempfile::tempdir().unwrap();
        write_chunks(dir.path(), &["a.js", "b.js", "c.js"]);

        let store = Arc::new(FaultyStore {
            fail_write: Some("a.js"),
            ..Default::default()
        });
        let injector = Injector::new(dir.path(), tokens(&["TOKEN"]), bindings(&[("TOKEN", "v")]))
            .with_store(store.clone())
            .with_options(InjectOptions {
                jobs: 4,
                ..Default::default()
            });

        let result = injector.run().await;
        assert!(
            matches!(result.unwrap_err(), Error::Write { path, .. } if path == dir.path().join("a.js"))
        );
        assert!(store.written().is_empty());
        for name in ["a.js", "b.js", "c.js"] {
            assert_eq!(fs::read_to_string(dir.path().join(name)).unwrap(), "__TOKEN__");
        }
    }

    #[tokio::test]
    async fn test_write_failure_keeps_earlier_writes_only() {
        let dir = tempfile::tempdir().unwrap();
        write_chunks(dir.path(), &["a.js", "b.js", "c.js"]);

        let store = Arc::new(FaultyStore {
            fail_write: Some("b.js"),
            ..Default::default()
        });
        let injector = Injector::new(dir.path(), tokens(&["TOKEN"]), bindings(&[("TOKEN", "v")]))
            .with_store(store.clone())
            .with_options(InjectOptions {
                jobs: 1,
                ..Default::default()
            });

        assert!(matches!(injector.run().await.unwrap_err(), Error::Write { .. }));
        assert_eq!(store.written(), vec!["a.js"]);
        assert_eq!(fs::read_to_string(dir.path().join("a.js")).unwrap(), "v");
        assert_eq!(fs::read_to_string(dir.path().join("c.js")).unwrap(), "__TOKEN__");
    }

    #[tokio::test]
    async fn test_write_failure_aborts_remaining_tokens() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "__FIRST__").unwrap();
        fs::write(dir.path().join("b.js"), "__SECOND__").unwrap();

        let store = Arc::new(FaultyStore {
            fail_write: Some("a.js"),
            ..Default::default()
        });
        let injector = Injector::new(
            dir.path(),
            tokens(&["FIRST", "SECOND"]),
            bindings(&[("FIRST", "1"), ("SECOND", "2")]),
        )
        .with_store(store.clone());

        assert!(injector.run().await.is_err());
        assert!(store.written().is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("b.js")).unwrap(), "__SECOND__");
    }

    #[tokio::test]
    async fn test_read_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_chunks(dir.path(), &["a.js", "b.js"]);

        let store = Arc::new(FaultyStore {
            fail_read: Some("a.js"),
            ..Default::default()
        });
        let injector = Injector::new(dir.path(), tokens(&["TOKEN"]), bindings(&[("TOKEN", "v")]))
            .with_store(store.clone());

        let result = injector.run().await;
        assert!(
            matches!(result.unwrap_err(), Error::Read { path, .. } if path == dir.path().join("a.js"))
        );
        assert!(store.written().is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("b.js")).unwrap(), "__TOKEN__");
    }

    #[tokio::test]
    async fn test_read_failure_while_counting_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        write_chunks(dir.path(), &["a.js"]);

        let store = Arc::new(FaultyStore {
            fail_read: Some("a.js"),
            ..Default::default()
        });
        let injector =
            Injector::new(dir.path(), tokens(&["TOKEN"]), bindings(&[])).with_store(store);

        assert!(matches!(injector.run().await.unwrap_err(), Error::Read { .. }));
    }

    #[tokio::test]
    async fn test_unreadable_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, "x").unwrap();

        let injector = Injector::new(file.join("out"), tokens(&["TOKEN"]), bindings(&[("TOKEN", "v")]));
        assert!(matches!(injector.run().await.unwrap_err(), Error::Walk { .. }));
    }
}
