//! CLI command definitions
//!
//! Defines the clap commands for the publish harness CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a scenario matrix (the built-in matrix by default)
    Run {
        /// YAML matrix file to run instead of the built-in matrix
        #[arg(long, short)]
        matrix: Option<PathBuf>,

        /// Only run scenarios whose name contains this text (case-insensitive)
        #[arg(long, short)]
        filter: Option<String>,

        #[command(flatten)]
        run: RunOptions,
    },

    /// Run a single scenario described on the command line
    Scenario {
        /// Template: web, webapi, mvc or razor
        #[arg(long, short)]
        template: String,

        /// Build configuration: Debug or Release
        #[arg(long, short, default_value = "Release")]
        configuration: String,

        /// Toolchain variant: managed-frontend (core) or native-frontend (native, desktop)
        #[arg(long, default_value = "managed-frontend")]
        toolchain: String,

        /// Template framework passed to `new --framework`
        #[arg(long)]
        framework: Option<String>,

        /// Authentication mode for templates that support it
        #[arg(long)]
        auth: Option<String>,

        /// Use LocalDB instead of SQLite (requires Individual or IndividualB2C auth)
        #[arg(long)]
        use_local_db: bool,

        /// Target framework override, e.g. net461
        #[arg(long)]
        target_framework: Option<String>,

        #[command(flatten)]
        run: RunOptions,
    },

    /// List scenario names
    List {
        /// YAML matrix file to list instead of the built-in matrix
        #[arg(long, short)]
        matrix: Option<PathBuf>,
    },

    /// Run one program through the process runner
    Exec {
        /// Program to run
        program: String,

        /// Argument string, tokenized like a shell command line
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        args: String,

        /// Working directory (default: current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Create the working directory if it is missing
        #[arg(long)]
        create_dir: bool,

        /// Kill the process tree after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Check that the configured toolchain can be found
    Check,
}

/// Options shared by commands that execute scenarios
#[derive(Args, Clone, Debug, Default)]
pub struct RunOptions {
    /// Keep scenario directories of failed scenarios
    #[arg(long)]
    pub keep: bool,

    /// Echo process output live
    #[arg(long)]
    pub stream: bool,

    /// Print reports as JSON
    #[arg(long)]
    pub json: bool,

    /// Override every stage timeout, in seconds (0 disables timeouts)
    #[arg(long)]
    pub timeout: Option<u64>,
}
