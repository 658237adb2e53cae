//! QuotaWatch CLI
//!
//! Command-line interface for the quota threshold notifier.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use quotawatch::db::{Database, MarkerStore};
use quotawatch::feed::FeedClient;
use quotawatch::models::{CycleReport, DispatchStatus, NotificationKey, ReconcileReport};
use quotawatch::notifier::{NotifyPass, QuotaNotifier};
use quotawatch::Config;

/// QuotaWatch - disk quota threshold notifications
#[derive(Parser)]
#[command(name = "quotawatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "QUOTAWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full cycle: reconcile, then notify
    Run,

    /// Notify new breaches only
    Notify,

    /// Clear records of resolved breaches only
    Reconcile,

    /// Run cycles repeatedly until interrupted
    Watch {
        /// Time between cycles (e.g. "15m", "1h"); defaults to notifier.watch_interval
        #[arg(long, value_parser = humantime::parse_duration)]
        interval: Option<Duration>,
    },

    /// Inspect and manage notification records
    Markers {
        #[command(subcommand)]
        command: MarkersCommands,
    },

    /// Database management
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },

    /// Check ledger and record store connectivity
    Health,
}

#[derive(Subcommand)]
enum MarkersCommands {
    /// List live notification records
    List,

    /// Delete a record so the entity is notified again on its next breach
    Delete {
        /// Record key, "<quota_id>:<user|group>:<entity_id>"
        key: NotificationKey,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Run ledger database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config, cli.verbose);

    let result = match cli.command {
        Commands::Run => run_cycle(config, cli.format).await,
        Commands::Notify => run_notify(config, cli.format).await,
        Commands::Reconcile => run_reconcile(config, cli.format).await,
        Commands::Watch { interval } => run_watch(config, interval, cli.format).await,
        Commands::Markers { command } => run_markers(config, command, cli.format).await,
        Commands::Db { command } => run_db(config, command).await,
        Commands::Health => run_health(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `--verbose` wins over `RUST_LOG`, which wins over the configured level
fn log_filter(configured_level: &str, verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured_level))
}

fn init_tracing(config: &Config, verbose: bool) {
    let filter = log_filter(&config.logging.level, verbose);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn build_notifier(config: &Config) -> anyhow::Result<QuotaNotifier> {
    let db = Database::new(config)
        .await
        .context("failed to connect to the quota ledger")?;
    let feed = FeedClient::new(&config.feed)?;

    Ok(QuotaNotifier::new(
        config,
        Arc::new(db.ledger()),
        Arc::new(db.markers(&config.redis.key_prefix)),
        Arc::new(feed),
    ))
}

async fn run_cycle(config: Config, format: OutputFormat) -> anyhow::Result<()> {
    let notifier = build_notifier(&config).await?;
    let report = notifier.run_cycle().await?;
    print_cycle(&report, format)?;
    fail_on_entity_errors(report.failure_count())
}

async fn run_notify(config: Config, format: OutputFormat) -> anyhow::Result<()> {
    let notifier = build_notifier(&config).await?;
    let pass = notifier.notify_breaches().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&pass.dispatched)?),
        OutputFormat::Text => print_notify_pass(&pass),
    }

    let failures = pass
        .dispatched
        .iter()
        .filter(|e| !matches!(e.status, DispatchStatus::Notified { .. }))
        .count();
    fail_on_entity_errors(failures)
}

async fn run_reconcile(config: Config, format: OutputFormat) -> anyhow::Result<()> {
    let notifier = build_notifier(&config).await?;
    let report = notifier.reconcile().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_reconcile(&report),
    }

    fail_on_entity_errors(report.failures.len())
}

async fn run_watch(
    config: Config,
    interval: Option<Duration>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let every = interval.unwrap_or(config.notifier.watch_interval);
    anyhow::ensure!(!every.is_zero(), "watch interval must be greater than zero");

    let notifier = build_notifier(&config).await?;

    tokio::select! {
        () = notifier.watch(every, |report| {
            if let Err(e) = print_cycle(report, format) {
                warn!(error = %e, "Failed to print cycle report");
            }
        }) => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Ctrl+C received, stopping watch");
        }
    }

    Ok(())
}

async fn run_markers(
    config: Config,
    command: MarkersCommands,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let db = Database::new(&config).await?;
    let store = db.markers(&config.redis.key_prefix);

    match command {
        MarkersCommands::List => {
            let records = store.list_all().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                OutputFormat::Text => {
                    if records.is_empty() {
                        println!("No notification records.");
                    }
                    for record in records {
                        println!(
                            "{:<28} {:<30} {:>7.2}%  sent {}",
                            record.key.to_string(),
                            record.display_name,
                            record.utilization_percent,
                            record.sent_at.format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                }
            }
        }
        MarkersCommands::Delete { key } => {
            if store.delete(&key).await? {
                println!("Deleted notification record {key}");
            } else {
                println!("No notification record {key}");
            }
        }
    }

    Ok(())
}

async fn run_db(config: Config, command: DbCommands) -> anyhow::Result<()> {
    match command {
        DbCommands::Migrate => {
            let db = Database::new(&config).await?;
            db.migrate().await?;
            println!("Migrations applied.");
        }
    }
    Ok(())
}

async fn run_health(config: Config) -> anyhow::Result<()> {
    let db = Database::new(&config).await?;
    db.health_check().await?;
    println!("Ledger:  ok");
    println!("Records: ok");
    Ok(())
}

fn fail_on_entity_errors(failures: usize) -> anyhow::Result<()> {
    if failures > 0 {
        anyhow::bail!("{failures} entity notification(s) failed; see the report above");
    }
    Ok(())
}

fn print_cycle(report: &CycleReport, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "Cycle {} at {} (threshold {}%)",
        report.run_id,
        report.started_at.format("%Y-%m-%d %H:%M:%S"),
        report.threshold_percent
    );
    print_reconcile(&report.reconciled);
    print_notify_pass(&NotifyPass {
        quotas_checked: report.quotas_checked,
        breaches: report.breaches,
        suppressed: report.suppressed,
        dispatched: report.dispatched.clone(),
    });
    Ok(())
}

fn print_notify_pass(pass: &NotifyPass) {
    println!(
        "Checked {} quotas: {} above threshold, {} already notified",
        pass.quotas_checked, pass.breaches, pass.suppressed
    );
    for entry in &pass.dispatched {
        let detail = match &entry.status {
            DispatchStatus::Notified { message_id } => format!("sent as {message_id}"),
            DispatchStatus::DeliveryFailed { reason } => format!("delivery failed: {reason}"),
            DispatchStatus::RecordFailed { message_id, reason } => {
                format!("sent as {message_id}, NOT recorded: {reason}")
            }
            DispatchStatus::AlreadyRecorded { message_id } => {
                format!("sent as {message_id}, record already present")
            }
        };
        println!(
            "  {:<28} {:<30} {:>7.2}%  {}",
            entry.key.to_string(),
            entry.display_name,
            entry.utilization_percent,
            detail
        );
    }
}

fn print_reconcile(report: &ReconcileReport) {
    println!(
        "Reconciled records: {} cleared, {} retained, {} failed",
        report.cleared.len(),
        report.retained.len(),
        report.failures.len()
    );
    for cleared in &report.cleared {
        println!("  cleared {} ({})", cleared.key, cleared.reason.label());
    }
    for failure in &report.failures {
        println!("  failed  {}: {}", failure.key, failure.reason);
    }
}
