use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use chrono::{NaiveDate, Utc};
use clap::Parser;
use rollcall::{
    config::{ConfigError, RollcallConfig},
    observability,
    reconcile::Reconciler,
    retention::RetentionPurger,
    store::{self, AttendanceStore},
};
use tokio_util::sync::CancellationToken;

/// CLI arguments for rollcall
#[derive(Parser, Debug)]
#[command(version, about = "Attendance reconciliation and retention jobs", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (defaults to environment variables)
    #[arg(short, long, global = true, env = "ROLLCALL_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Mark roster members without a report for a day
    Reconcile {
        /// Day to reconcile, YYYY-MM-DD (defaults to today in UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Report who would be marked without inserting anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete records older than the retention window
    Purge {
        /// Retention window in days (overrides config)
        #[arg(long)]
        days: Option<u32>,
        /// Count expired records without deleting them
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref(), &args.command) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = observability::init_tracing(&config.logging) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let store = match store::create_store(&config.store).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!(
                "Error: failed to open {} store: {}",
                config.store.backend_name(),
                e
            );
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    match args.command {
        Command::Reconcile { date, .. } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            run_reconcile(store, &config, date, cancel).await
        }
        Command::Purge { .. } => run_purge(store, &config, cancel).await,
    }
}

/// Load configuration, apply command-line overrides and check that the
/// chosen job has what it needs. Runs before any store access.
fn load_config(path: Option<&Path>, command: &Command) -> Result<RollcallConfig, ConfigError> {
    let mut config = match path {
        Some(path) => RollcallConfig::from_file(path)?,
        None => RollcallConfig::from_env()?,
    };

    match command {
        Command::Reconcile { dry_run, .. } => {
            config.reconcile.dry_run |= *dry_run;
            config.require_roster()?;
        }
        Command::Purge { days, dry_run } => {
            config.retention.dry_run |= *dry_run;
            if days.is_some() {
                config.retention.days = *days;
            }
            config.require_retention()?;
        }
    }

    Ok(config)
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::warn!("Received Ctrl-C, stopping at the next page boundary");
            cancel.cancel();
        }
        Err(e) => tracing::error!(error = %e, "Failed to install Ctrl-C handler"),
    }
}

async fn run_reconcile(
    store: Arc<dyn AttendanceStore>,
    config: &RollcallConfig,
    date: NaiveDate,
    cancel: CancellationToken,
) -> ExitCode {
    let reconciler = match Reconciler::from_config(store, config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match reconciler.run(date, &config.reconcile.roster, cancel).await {
        Ok(report) => {
            for outcome in &report.outcomes {
                println!("{}", outcome);
            }
            tracing::info!(
                date = %report.date,
                responded = report.responded(),
                marked = report.marked(),
                failed = report.failed(),
                skipped = report.skipped,
                "Reconciliation finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: reconciliation for {} failed: {}", date, e);
            ExitCode::FAILURE
        }
    }
}

async fn run_purge(
    store: Arc<dyn AttendanceStore>,
    config: &RollcallConfig,
    cancel: CancellationToken,
) -> ExitCode {
    let purger = match RetentionPurger::from_config(store, config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let report = purger.run(Utc::now(), cancel).await;
    println!("{}", report.summary());

    if report.is_fatal() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
