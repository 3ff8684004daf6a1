use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use attest::{check_document, run_document};

#[derive(Parser)]
#[command(name = "attest")]
#[command(about = "Declarative black-box API testing with RAML coverage", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every test in a document and report the results
    Run {
        /// Test document (YAML)
        spec: PathBuf,

        /// Append LCOV coverage records to this file
        #[arg(long, env = "ATTEST_LCOV")]
        lcov: Option<PathBuf>,
    },

    /// Parse and validate a document without sending any requests
    Check {
        /// Test document (YAML)
        spec: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.debug {
        tracing::Level::TRACE
    } else if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(cli.debug) // Show target module in debug mode
        .init();

    match cli.command {
        Commands::Run { spec, lcov } => {
            let summary = run_document(&spec, lcov.as_deref()).await?;
            if summary.failed() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Check { spec } => check_document(&spec),
    }
}
