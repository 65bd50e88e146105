use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use upm_fingerprint::cancel::CancellationToken;
use upm_fingerprint::compare::StrategyKind;
use upm_fingerprint::compare::ranking::format_line;
use upm_fingerprint::config::AnalyzerConfig;
use upm_fingerprint::extract::JsonMetadataLoader;
use upm_fingerprint::fingerprint::FsFingerprintCache;
use upm_fingerprint::orchestrator::{MatchOrchestrator, resolve_managed_dir};
use upm_fingerprint::registry::UnityRegistry;
use upm_fingerprint::version::HostVersion;

#[derive(Parser)]
#[command(name = "upm-fingerprint")]
#[command(version, about = "Identify the Unity package versions compiled into a game")]
struct Cli {
    /// Managed directory of a Unity player, or the game executable
    managed: PathBuf,

    /// Comparison strategy
    #[arg(long, value_enum, default_value_t = StrategyKind::Balanced)]
    strategy: StrategyKind,

    /// Unity version the game was built with, e.g. 2021.3.5f1
    #[arg(long)]
    host_version: HostVersion,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ranked versions printed per package
    #[arg(long)]
    top: Option<usize>,

    /// Write a sorted, indented copy of every fingerprint next to it
    #[arg(long)]
    debug_fingerprints: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AnalyzerConfig::from_file(path)?,
        None => AnalyzerConfig::default(),
    };
    if let Some(top) = cli.top {
        config.top_results = top;
    }

    let _guard = init_logging(&config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli, config))
}

/// Logs to stderr and to `<dataDir>/upm-fingerprint.log`
fn init_logging(config: &AnalyzerConfig) -> anyhow::Result<WorkerGuard> {
    let log_path = config.log_path();
    let log_dir = log_path.parent().context("log path has no directory")?;
    let log_file = log_path.file_name().context("log path has no file name")?;
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, log_file));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}

async fn run(cli: Cli, config: AnalyzerConfig) -> anyhow::Result<()> {
    let managed = resolve_managed_dir(&cli.managed);
    info!(
        "Matching binaries in {} against Unity {}",
        managed.display(),
        cli.host_version
    );

    let registry = UnityRegistry::new(&config.registry_url, config.registry_cache_dir())?;
    let cache = FsFingerprintCache::new(config.fingerprint_dir())
        .with_debug_artifacts(cli.debug_fingerprints);
    let loader = JsonMetadataLoader;
    let strategy = cli.strategy.strategy();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let orchestrator = MatchOrchestrator::new(
        &registry,
        &cache,
        &loader,
        strategy.as_ref(),
        &config,
        cancel,
    );
    let matches = orchestrator.run(&managed, &cli.host_version).await?;

    for found in &matches {
        println!("{}", format_line(&found.package_id, &found.ranked));
    }
    Ok(())
}
