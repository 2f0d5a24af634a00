//! Error types for the publish harness
//!
//! Only harness-level problems are errors. A toolchain stage that exits
//! non-zero or an artifact that is missing is a scenario verdict, not an
//! `Error`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Unknown {kind} '{value}'. Expected one of: {expected}")]
    UnknownVariant {
        kind: &'static str,
        value: String,
        expected: String,
    },

    // === Host Errors ===
    #[error("Host error while preparing '{}': {source}", path.display())]
    Infrastructure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid scenario matrix: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Run Outcome ===
    #[error("{failed} of {total} scenario(s) failed")]
    ScenariosFailed { failed: usize, total: usize },

    #[error("'{program}' did not succeed: {outcome}")]
    ProcessFailed { program: String, outcome: String },

    #[error("Run cancelled")]
    Cancelled,

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an unknown variant error listing the accepted names
    pub fn unknown_variant(kind: &'static str, value: &str, expected: &[&str]) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.to_string(),
            expected: expected.join(", "),
        }
    }

    /// Create a file read error
    pub fn file_read(path: &std::path::Path, error: &io::Error) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }
}
