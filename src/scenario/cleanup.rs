//! Scenario directory cleanup

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::Path;

/// What happened to a scenario directory once the verdict was fixed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum CleanupOutcome {
    Removed,
    AlreadyAbsent,
    /// Left on disk for inspection after a failure
    Kept,
    Failed(String),
}

impl CleanupOutcome {
    /// The directory is gone
    pub fn is_clean(&self) -> bool {
        matches!(self, CleanupOutcome::Removed | CleanupOutcome::AlreadyAbsent)
    }
}

impl fmt::Display for CleanupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupOutcome::Removed => write!(f, "removed"),
            CleanupOutcome::AlreadyAbsent => write!(f, "already absent"),
            CleanupOutcome::Kept => write!(f, "kept"),
            CleanupOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Recursively remove a scenario directory
///
/// Safe to call any number of times. Errors are logged and returned as
/// [`CleanupOutcome::Failed`], never propagated.
pub async fn remove_scenario_dir(dir: &Path) -> CleanupOutcome {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            tracing::debug!(dir = %dir.display(), "Removed scenario directory");
            CleanupOutcome::Removed
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => CleanupOutcome::AlreadyAbsent,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove scenario directory");
            CleanupOutcome::Failed(e.to_string())
        }
    }
}
