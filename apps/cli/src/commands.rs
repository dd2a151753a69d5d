//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

use repodoc_core::{
    DetectConfig, ProgressReporter, Services, SnapshotRepoConfig, detect_changes, snapshot_repo,
};
use repodoc_freshness::{load_freshness_state, render_state};
use repodoc_shared::{AppConfig, MaterializeStrategy, init_config, load_config, read_token};
use repodoc_snapshot::SnapshotResult;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// repodoc: pin repositories to commits and detect what changed since the
/// last documentation delivery.
#[derive(Parser)]
#[command(
    name = "repodoc",
    version,
    about = "Commit-pinned repository snapshots and documentation freshness detection.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Answer host queries from a scripted JSON fixture instead of GitHub.
    #[arg(long, global = true, env = "REPODOC_HOST_FIXTURE")]
    pub host_fixture: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Materialization strategy override.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum StrategyArg {
    Clone,
    Fixture,
}

impl From<StrategyArg> for MaterializeStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Clone => MaterializeStrategy::Clone,
            StrategyArg::Fixture => MaterializeStrategy::Fixture,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Resolve a reference to a commit and materialize its snapshot.
    Snapshot {
        /// Repository reference: owner/repo[@ref].
        reference: String,

        /// Snapshot root directory (overrides config).
        #[arg(long)]
        root: Option<PathBuf>,

        /// Materialization strategy (overrides config).
        #[arg(long)]
        strategy: Option<StrategyArg>,

        /// Fixture directory for the fixture strategy.
        #[arg(long)]
        fixture_root: Option<PathBuf>,

        /// Rematerialize even if a verified snapshot exists.
        #[arg(long)]
        force: bool,
    },

    /// Detect changes since the last delivered baseline.
    Detect {
        /// Repository: owner/repo.
        repo: String,

        /// Freshness state file (overrides config).
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Freshness state inspection.
    State {
        #[command(subcommand)]
        action: StateAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// State subcommands.
#[derive(Subcommand)]
pub(crate) enum StateAction {
    /// Print the canonical state document.
    Show {
        /// Freshness state file (overrides config).
        #[arg(long)]
        state: Option<PathBuf>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
///
/// Logs go to stderr; stdout carries command output only.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "repodoc=info",
        1 => "repodoc=debug",
        _ => "repodoc=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let fixture = cli.host_fixture.as_deref();
    match cli.command {
        Command::Snapshot {
            reference,
            root,
            strategy,
            fixture_root,
            force,
        } => {
            let overrides = SnapshotOverrides {
                root,
                strategy: strategy.map(Into::into),
                fixture_root,
            };
            cmd_snapshot(&reference, overrides, force, fixture).await
        }
        Command::Detect { repo, state } => cmd_detect(&repo, state, fixture).await,
        Command::State { action } => match action {
            StateAction::Show { state } => cmd_state_show(state, fixture).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SnapshotOverrides {
    root: Option<PathBuf>,
    strategy: Option<MaterializeStrategy>,
    fixture_root: Option<PathBuf>,
}

impl SnapshotOverrides {
    fn apply(self, config: &mut AppConfig) {
        if let Some(root) = self.root {
            config.snapshot.root = root.display().to_string();
        }
        if let Some(strategy) = self.strategy {
            config.snapshot.strategy = strategy;
        }
        if let Some(fixture_root) = self.fixture_root {
            config.snapshot.fixture_root = Some(fixture_root.display().to_string());
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn state_path(config: &AppConfig, state: Option<PathBuf>) -> PathBuf {
    state.unwrap_or_else(|| PathBuf::from(&config.freshness.state_path))
}

async fn cmd_snapshot(
    reference: &str,
    overrides: SnapshotOverrides,
    force: bool,
    host_fixture: Option<&Path>,
) -> Result<()> {
    let mut config = load_config()?;
    overrides.apply(&mut config);
    let services = Services::from_config(&config, host_fixture)?;

    let snapshot_config = SnapshotRepoConfig {
        reference: reference.to_string(),
        snapshot: config.snapshot.clone(),
        object_storage: config.object_storage.clone(),
        host_token: read_token(&config.host.token_env),
        force_rebuild: force,
    };

    info!(reference, force, strategy = ?config.snapshot.strategy, "creating snapshot");

    let reporter = CliProgress::new();
    let result = snapshot_repo(
        &snapshot_config,
        services.host.as_ref(),
        services.object_store.clone(),
        &reporter,
    )
    .await;
    reporter.finish();

    print_json(&result?)
}

async fn cmd_detect(repo: &str, state: Option<PathBuf>, host_fixture: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let services = Services::from_config(&config, host_fixture)?;

    let detect_config = DetectConfig {
        repo_ref: repo.to_string(),
        state_path: state_path(&config, state),
        remote: services.state_mirror(&config.freshness)?,
        compare_per_page: config.host.compare_per_page,
        compare_file_cap: config.host.compare_file_cap,
    };

    info!(repo, state = %detect_config.state_path.display(), "detecting changes");

    let reporter = CliProgress::new();
    let report = detect_changes(&detect_config, services.host.clone(), &reporter).await;
    reporter.finish();

    print_json(&report?)
}

async fn cmd_state_show(state: Option<PathBuf>, host_fixture: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let services = Services::from_config(&config, host_fixture)?;
    let path = state_path(&config, state);
    let remote = services.state_mirror(&config.freshness)?;

    let document = load_freshness_state(&path, remote.as_ref()).await?;
    print!("{}", render_state(&document)?);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn snapshot_ready(&self, result: &SnapshotResult, elapsed: std::time::Duration) {
        let verb = if result.idempotent_hit { "Reused" } else { "Materialized" };
        self.spinner.set_message(format!(
            "{verb} {} ({} files, {:.1}s)",
            result.snapshot_id,
            result.manifest.file_count,
            elapsed.as_secs_f64()
        ));
    }
}
