//! Publish harness CLI
//!
//! Scaffolds, restores, builds and publishes template projects with the
//! configured toolchain and checks that each publish produced its artifacts.

use clap::Parser;
use pubharness::cli::{self, Context};
use pubharness::commands::Commands;
use pubharness::common::logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pubharness", about = "Template publish pipeline verification harness")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write detailed logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let guard = logging::init_cli(cli.verbose, cli.log_file.as_deref());

    let result = match Context::load(cli.config.as_deref(), cli.verbose > 0) {
        Ok(ctx) => cli::dispatch(cli.command, ctx).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        tracing::debug!(error = ?e, "Command failed");
        eprintln!("Error: {e}");
        drop(guard);
        std::process::exit(1);
    }
}
