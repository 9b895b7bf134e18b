mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use commands::metrics::DeriveMetricsArgs;
use commands::sbi::{CertifyArgs, SbiExportArgs, SbiImportArgs, SbiUploadArgs, SbiValidateArgs};

/// Payment times reporting: metrics derivation and SBI reconciliation
#[derive(Parser)]
#[command(
    name = "ptrs",
    version,
    about = "Payment times reporting: metrics derivation and SBI reconciliation",
    long_about = "Runs the tenant-scoped payment times engine over a JSON dataset \
                  snapshot. Derives payment time, payment term and partial payment \
                  metrics, imports SBI results files, validates small-business \
                  coverage and gates certification."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Engine configuration file (.yaml, .yml or .json)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log filter, e.g. "info" or "ptrs_core=debug"
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive payment time, payment term and partial payment for a run
    DeriveMetrics(DeriveMetricsArgs),
    /// Import an SBI results CSV and merge it onto the run's stage rows
    SbiImport(SbiImportArgs),
    /// Validate the run's stage rows against the latest applied SBI upload
    SbiValidate(SbiValidateArgs),
    /// Export the run's distinct payee ABNs for the SBI tool
    SbiExport(SbiExportArgs),
    /// Show an SBI upload with its results and row changes
    SbiUpload(SbiUploadArgs),
    /// Check whether the run may be certified
    Certify(CertifyArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = match input::file::read_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(2);
        }
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::DeriveMetrics(args) => commands::metrics::run_derive_metrics(args, config),
        Commands::SbiImport(args) => commands::sbi::run_import(args, config),
        Commands::SbiValidate(args) => commands::sbi::run_validate(args, config),
        Commands::SbiExport(args) => commands::sbi::run_export(args, config),
        Commands::SbiUpload(args) => commands::sbi::run_upload(args, config),
        Commands::Certify(args) => commands::sbi::run_certify(args, config),
        Commands::Version => {
            println!("ptrs {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
