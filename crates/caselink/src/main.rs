//! caselink - AI event to ticketing case linker
//!
//! stdout carries JSON results only; logs go to stderr.

use anyhow::Result;
use caselink::commands::{run_alert, run_stream, run_sync_assets};
use caselink::{App, CaseOptions, Config};
use caselink_shared::CaseMode;
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, info_span};
use tracing_subscriber::EnvFilter;

/// Log filter environment variable
const LOG_ENV: &str = "CASELINK_LOG";

/// Caselink CLI
#[derive(Parser)]
#[command(name = "caselink")]
#[command(about = "Link AI observability events to ticketing cases", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (overrides $CASELINK_CONFIG and defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate JSON-lines records from stdin with their case
    Stream {
        /// Use this event id for every record
        #[arg(long)]
        event_id: Option<String>,

        /// create, lookup or open
        #[arg(long, default_value = "create")]
        mode: CaseMode,

        /// Add an AI summary to created cases
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        include_summary: bool,
    },

    /// Create or find the case for one alert payload on stdin
    Alert,

    /// Map application names from a payload on stdin to digital assets
    SyncAsset,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load(cli.config.as_deref())?;
    let app = App::open(config)?;

    let stdin = io::stdin();
    let stdout = io::stdout();

    match cli.command {
        Commands::Stream {
            event_id,
            mode,
            include_summary,
        } => {
            let options = CaseOptions {
                mode,
                include_summary,
            };
            run_stream(&app, options, event_id.as_deref(), stdin.lock(), stdout.lock())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Alert => {
            let response = run_alert(&app, stdin.lock(), stdout.lock())?;
            Ok(if response.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::SyncAsset => {
            let report = run_sync_assets(&app, stdin.lock(), stdout.lock())?;
            Ok(if report.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    let invocation = uuid::Uuid::new_v4();
    let span = info_span!("invocation", id = %invocation);
    let _guard = span.enter();

    info!("caselink v{} starting", env!("CARGO_PKG_VERSION"));

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("[FATAL] {:#}", e);
            ExitCode::FAILURE
        }
    }
}
