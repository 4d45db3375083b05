//! envinject CLI - container entrypoint for runtime config injection.

use clap::{Parser, ValueEnum};
use envinject_config::Overrides;
use envinject_core::{ExtensionFilter, ProcessEnv};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "envinject")]
#[command(
    about = "Replace __TOKEN__ placeholders in built assets with runtime values, then run a command",
    long_about = None
)]
struct Cli {
    /// Configuration file (KDL)
    #[arg(long, env = "ENVINJECT_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory of the build artifacts [default: .next]
    #[arg(long, env = "ENVINJECT_ROOT")]
    root: Option<PathBuf>,

    /// Token to inject; repeat or pass a comma-separated list
    #[arg(long = "token", env = "ENVINJECT_TOKENS", value_delimiter = ',')]
    tokens: Vec<String>,

    /// Comma-separated file extensions to scan [default: js,css,html]
    #[arg(long, env = "ENVINJECT_EXTENSIONS")]
    extensions: Option<String>,

    /// Fail when any declared token has no value
    #[arg(long, env = "ENVINJECT_STRICT")]
    strict: bool,

    /// Report replacements without writing files
    #[arg(long)]
    dry_run: bool,

    /// Files processed concurrently per token
    #[arg(long, default_value_t = 8)]
    jobs: usize,

    /// Write a JSON report of the pass to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log output format
    #[arg(long, env = "ENVINJECT_LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Command to run once injection completes
    #[arg(last = true)]
    command: Vec<String>,
}

impl Cli {
    fn inject_args(&self) -> commands::inject::InjectArgs {
        commands::inject::InjectArgs {
            config: self.config.clone(),
            overrides: Overrides {
                root: self.root.clone(),
                extensions: self.extensions.as_deref().map(ExtensionFilter::parse_list),
                strict: self.strict.then_some(true),
                tokens: self.tokens.clone(),
            },
            dry_run: self.dry_run,
            jobs: self.jobs,
            report: self.report.clone(),
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    commands::inject::run(cli.inject_args(), Arc::new(ProcessEnv)).await?;

    if cli.command.is_empty() {
        return Ok(());
    }
    commands::handoff::handoff(&cli.command)
}
