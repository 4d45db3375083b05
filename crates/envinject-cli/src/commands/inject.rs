//! Injection command: build the configuration, run the pass, write the report.

use anyhow::{Context, Result};
use envinject_config::{InjectorConfig, Overrides, load_config};
use envinject_core::BindingSource;
use envinject_injector::{InjectOptions, InjectionReport, Injector};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Settings gathered from the command line.
#[derive(Debug, Default)]
pub struct InjectArgs {
    pub config: Option<PathBuf>,
    pub overrides: Overrides,
    pub dry_run: bool,
    pub jobs: usize,
    pub report: Option<PathBuf>,
}

/// Resolve configuration and run the injection pass against `bindings`.
pub async fn run(args: InjectArgs, bindings: Arc<dyn BindingSource>) -> Result<InjectionReport> {
    let file = args
        .config
        .as_deref()
        .map(|path| {
            load_config(path).with_context(|| format!("Invalid config file: {}", path.display()))
        })
        .transpose()?;

    let config = InjectorConfig::build(file, args.overrides).context("Invalid configuration")?;

    if config.tokens.is_empty() {
        warn!("No tokens declared, nothing to inject");
    }
    info!(
        root = %config.root.display(),
        tokens = config.tokens.len(),
        extensions = ?config.extensions.iter().collect::<Vec<_>>(),
        strict = config.strict,
        "Starting injection"
    );

    let options = InjectOptions {
        extensions: config.extensions.clone(),
        strict: config.strict,
        dry_run: args.dry_run,
        jobs: args.jobs,
    };
    let injector = Injector::new(config.root, config.tokens, bindings).with_options(options);
    let report = injector.run().await.context("Injection failed")?;

    if let Some(path) = &args.report {
        write_report(path, &report)?;
    }

    Ok(report)
}

fn write_report(path: &Path, report: &InjectionReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    info!(path = %path.display(), "Report written");
    Ok(())
}
