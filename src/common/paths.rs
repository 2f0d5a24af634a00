//! Configuration, log and workspace paths

use rand::distr::Alphanumeric;
use rand::Rng;
use std::path::PathBuf;

/// Name used for the config directory and the default workspace
const APP_NAME: &str = "publish-harness";

/// Length of the random suffix appended to project names
const RANDOM_SUFFIX_LEN: usize = 11;

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/publish-harness/`
/// - macOS: `~/Library/Application Support/publish-harness/`
/// - Windows: `%APPDATA%\publish-harness\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("logs"))
}

/// Default parent directory for scenario working directories
pub fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join(APP_NAME)
}

/// Random lowercase alphanumeric suffix for project and directory names
pub fn random_suffix() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Build a unique project name from a stem, e.g. `MvcCore_k3q0x8m2a1z`
pub fn unique_project_name(stem: &str) -> String {
    format!("{}_{}", stem, random_suffix())
}
