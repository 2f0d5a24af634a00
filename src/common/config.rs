//! Configuration file handling

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::{config_path, default_workspace_root};
use super::Result;
use crate::scenario::StageKind;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Toolchain program names and environment
    #[serde(default)]
    pub toolchain: ToolchainConfig,

    /// Per-stage timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Scenario workspace settings
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Stage retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Process output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// External toolchain settings
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ToolchainConfig {
    /// Front-end program used for scaffold, restore and build
    #[serde(default = "default_frontend")]
    pub frontend: String,

    /// Native build tool used by the publish stage
    #[serde(default = "default_build_tool")]
    pub build_tool: String,

    /// Extra arguments appended to every scaffold command
    #[serde(default)]
    pub new_extra_args: String,

    /// Environment variables set for every invocation
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            frontend: default_frontend(),
            build_tool: default_build_tool(),
            new_extra_args: String::new(),
            env: BTreeMap::new(),
        }
    }
}

fn default_frontend() -> String {
    "dotnet".to_string()
}
fn default_build_tool() -> String {
    "msbuild".to_string()
}

/// Timeout settings in seconds, 0 disables the timeout
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Timeouts {
    #[serde(default = "default_scaffold")]
    pub scaffold_secs: u64,

    #[serde(default = "default_stage")]
    pub restore_secs: u64,

    #[serde(default = "default_stage")]
    pub build_secs: u64,

    #[serde(default = "default_stage")]
    pub publish_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            scaffold_secs: default_scaffold(),
            restore_secs: default_stage(),
            build_secs: default_stage(),
            publish_secs: default_stage(),
        }
    }
}

fn default_scaffold() -> u64 {
    300
}
fn default_stage() -> u64 {
    600
}

impl Timeouts {
    /// Timeout for a stage, `None` when disabled
    pub fn for_stage(&self, stage: StageKind) -> Option<Duration> {
        let secs = match stage {
            StageKind::Scaffold => self.scaffold_secs,
            StageKind::Restore => self.restore_secs,
            StageKind::Build => self.build_secs,
            StageKind::Publish => self.publish_secs,
        };
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    /// Apply the same timeout to every stage
    pub fn set_all(&mut self, secs: u64) {
        self.scaffold_secs = secs;
        self.restore_secs = secs;
        self.build_secs = secs;
        self.publish_secs = secs;
    }
}

/// Where scenario projects are generated
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// Parent directory of every scenario directory
    pub root: Option<PathBuf>,

    /// Leave the scenario directory in place when the scenario fails
    #[serde(default)]
    pub keep_on_failure: bool,
}

impl WorkspaceConfig {
    /// Effective workspace root
    pub fn root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(default_workspace_root)
    }
}

/// Retry settings for transient stage failures
///
/// The default of one attempt means no retry.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Stages eligible for retry
    #[serde(default = "default_retry_stages")]
    pub stages: Vec<StageKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            stages: default_retry_stages(),
        }
    }
}

fn default_max_attempts() -> u32 {
    1
}
fn default_delay_ms() -> u64 {
    2000
}
fn default_retry_stages() -> Vec<StageKind> {
    vec![StageKind::Restore]
}

/// Process output configuration
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Echo process output live to the console
    #[serde(default)]
    pub stream: bool,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path, which must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| super::Error::file_read(path, &e))?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.toolchain.frontend, "dotnet");
        assert_eq!(config.toolchain.build_tool, "msbuild");
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.retry.stages, vec![StageKind::Restore]);
        assert!(!config.workspace.keep_on_failure);
        assert_eq!(
            config.timeouts.for_stage(StageKind::Scaffold),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
[toolchain]
frontend = "/opt/dotnet/dotnet"
build_tool = "msbuild.exe"
new_extra_args = "--no-restore"

[toolchain.env]
DOTNET_CLI_TELEMETRY_OPTOUT = "1"

[timeouts]
restore_secs = 0

[workspace]
root = "/var/tmp/harness"
keep_on_failure = true

[retry]
max_attempts = 3
delay_ms = 10
stages = ["restore", "build"]

[output]
stream = true
"#,
        )
        .unwrap();

        assert_eq!(config.toolchain.frontend, "/opt/dotnet/dotnet");
        assert_eq!(config.toolchain.new_extra_args, "--no-restore");
        assert_eq!(
            config.toolchain.env.get("DOTNET_CLI_TELEMETRY_OPTOUT").map(String::as_str),
            Some("1")
        );
        assert_eq!(config.timeouts.for_stage(StageKind::Restore), None);
        assert_eq!(config.workspace.root(), PathBuf::from("/var/tmp/harness"));
        assert!(config.workspace.keep_on_failure);
        assert_eq!(config.retry.stages, vec![StageKind::Restore, StageKind::Build]);
        assert!(config.output.stream);
    }

    #[test]
    fn test_unknown_stage_in_retry_rejected() {
        let err = Config::parse("[retry]\nstages = [\"deploy\"]\n").unwrap_err();
        assert!(matches!(err, super::super::Error::ConfigParse(_)));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::parse("[toolchain]\nfrontnd = \"dotnet\"\n").is_err());
    }
}
