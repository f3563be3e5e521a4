//! drift-migrate CLI - move rows between drifted PostgreSQL schemas.

use clap::{Parser, Subcommand};
use drift_migrate::error::{EXIT_CANCELLED, EXIT_TRANSFER_ERROR};
use drift_migrate::{Config, MigrateError, Orchestrator, RunStatus, TableStatus};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "drift-migrate")]
#[command(about = "Schema-aware migration between drifted PostgreSQL databases")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Timeout in seconds for graceful shutdown (default: 60)
    #[arg(long, default_value = "60")]
    shutdown_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate every table in the configured run order
    Run {
        /// Override source schema
        #[arg(long)]
        source_schema: Option<String>,

        /// Override target schema
        #[arg(long)]
        target_schema: Option<String>,

        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Dry run: classify and validate plans without moving data
        #[arg(long)]
        dry_run: bool,
    },

    /// Compare source and target schemas table by table
    Compare,

    /// Validate row counts between source and target
    Validate,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            source_schema,
            target_schema,
            batch_size,
            dry_run,
        } => {
            // Apply overrides
            if let Some(schema) = source_schema {
                config.source.schema = schema;
            }
            if let Some(schema) = target_schema {
                config.target.schema = schema;
            }
            if let Some(size) = batch_size {
                config.migration.batch_size = size;
            }
            config.validate()?;

            // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
            let cancel_token = setup_signal_handler(cli.shutdown_timeout);

            let orchestrator = Orchestrator::new(config).await?;
            let report = orchestrator.run(cancel_token, dry_run).await?;
            orchestrator.close();

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                let status_msg = match (dry_run, report.status) {
                    (true, _) => "Dry run completed!",
                    (false, RunStatus::Completed) => "Migration completed!",
                    (false, RunStatus::CompletedWithErrors) => "Migration completed with errors",
                    (false, RunStatus::Cancelled) => "Migration cancelled",
                };
                println!("\n{}", status_msg);
                println!("  Run ID: {}", report.run_id);
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!(
                    "  Tables: {} succeeded, {} failed, {} skipped of {}",
                    report.tables_succeeded,
                    report.tables_failed,
                    report.tables_skipped,
                    report.tables_total
                );
                println!("  Rows: {}", report.rows_written);
                for table in &report.tables {
                    let outcome = match table.status {
                        TableStatus::Succeeded => format!("{} rows", table.rows_written),
                        TableStatus::Failed => {
                            format!("FAILED: {}", table.error.as_deref().unwrap_or("unknown error"))
                        }
                        TableStatus::Skipped => {
                            format!("skipped: {}", table.detail.as_deref().unwrap_or(""))
                        }
                    };
                    println!("    {:<32} {}", table.table, outcome);
                }
                if !report.failed_tables.is_empty() {
                    println!("  Failed tables: {:?}", report.failed_tables);
                }
            }

            if report.status == RunStatus::Cancelled {
                return Ok(ExitCode::from(EXIT_CANCELLED));
            }
            if !report.succeeded() {
                return Ok(ExitCode::from(EXIT_TRANSFER_ERROR));
            }
        }

        Commands::Compare => {
            let orchestrator = Orchestrator::new(config).await?;
            let classification = orchestrator.compare().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&classification)?);
            } else {
                println!("Identical tables ({}):", classification.identical.len());
                for table in &classification.identical {
                    println!("  {}", table);
                }
                println!("\nDivergent tables ({}):", classification.divergent.len());
                for (table, diff) in &classification.divergent {
                    println!("  {}", table);
                    for column in &diff.only_in_source {
                        println!("    - {} (source only)", column);
                    }
                    for column in &diff.only_in_target {
                        println!("    + {} (target only)", column);
                    }
                    for change in &diff.changed {
                        if let Some((from, to)) = &change.data_type {
                            println!("    ~ {}: {} -> {}", change.column, from, to);
                        }
                        if let Some((from, to)) = &change.nullable {
                            println!("    ~ {}: nullable {} -> {}", change.column, from, to);
                        }
                        if let Some((from, to)) = &change.default {
                            println!(
                                "    ~ {}: default {} -> {}",
                                change.column,
                                from.as_deref().unwrap_or("none"),
                                to.as_deref().unwrap_or("none")
                            );
                        }
                    }
                    if !diff.reordered.is_empty() {
                        println!("    reordered: {}", diff.reordered.join(", "));
                    }
                }
                println!("\nOnly in source ({}):", classification.only_in_source.len());
                for table in &classification.only_in_source {
                    println!("  {}", table);
                }
                println!("\nOnly in target ({}):", classification.only_in_target.len());
                for table in &classification.only_in_target {
                    println!("  {}", table);
                }
            }
        }

        Commands::Validate => {
            let orchestrator = Orchestrator::new(config).await?;
            let counts = orchestrator.validate().await?;
            let mismatches = counts.iter().filter(|c| !c.matches).count();

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                for check in &counts {
                    println!(
                        "  {:<32} source={:<10} target={:<10} {}",
                        check.table,
                        check.source_rows,
                        check.target_rows,
                        if check.matches { "OK" } else { "MISMATCH" }
                    );
                }
                println!(
                    "\nValidation completed: {} tables, {} mismatched",
                    counts.len(),
                    mismatches
                );
            }

            if mismatches > 0 {
                return Ok(ExitCode::from(EXIT_TRANSFER_ERROR));
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source: {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target: {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    "health check",
                    "one or both databases are unreachable",
                ));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG, when set, takes precedence over --verbosity.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().try_init().map_err(|e| e.to_string())
    } else {
        subscriber.try_init().map_err(|e| e.to_string())
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
/// The table in flight finishes first; no new table is started.
#[cfg(unix)]
fn setup_signal_handler(shutdown_timeout: u64) -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        let mut stream = match signal(kind) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Cannot install {} handler: {}", name, e);
                continue;
            }
        };
        tokio::spawn(async move {
            stream.recv().await;
            eprintln!(
                "\nReceived {}. Finishing the current table (timeout: {}s)...",
                name, shutdown_timeout
            );
            token.cancel();
            tokio::time::sleep(std::time::Duration::from_secs(shutdown_timeout)).await;
            eprintln!("Shutdown timeout elapsed, exiting");
            std::process::exit(i32::from(EXIT_CANCELLED));
        });
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler(shutdown_timeout: u64) -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            return;
        }
        eprintln!("\nReceived Ctrl-C. Finishing the current table...");
        token.cancel();
        tokio::time::sleep(std::time::Duration::from_secs(shutdown_timeout)).await;
        std::process::exit(i32::from(EXIT_CANCELLED));
    });

    cancel_token
}
