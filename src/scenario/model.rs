//! Scenario and stage construction
//!
//! A [`Scenario`] is the fully resolved pipeline for one parameter set:
//! four invocations in fixed order, all sharing one working directory.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::params::{ScenarioParams, ToolchainVariant};
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::process::Invocation;

/// Attempts at picking a project name whose directory does not exist yet
const MAX_NAME_ATTEMPTS: usize = 8;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Scaffold,
    Restore,
    Build,
    Publish,
}

impl StageKind {
    /// Execution order of every scenario
    pub const ORDER: [StageKind; 4] = [
        StageKind::Scaffold,
        StageKind::Restore,
        StageKind::Build,
        StageKind::Publish,
    ];
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Scaffold => write!(f, "scaffold"),
            StageKind::Restore => write!(f, "restore"),
            StageKind::Build => write!(f, "build"),
            StageKind::Publish => write!(f, "publish"),
        }
    }
}

/// One pipeline stage and the invocation that performs it
#[derive(Debug, Clone)]
pub struct Stage {
    pub kind: StageKind,
    pub invocation: Invocation,
}

/// A runnable scenario
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    project_name: String,
    working_dir: PathBuf,
    stages: Vec<Stage>,
    publish_output: PathBuf,
    expected_artifacts: Vec<PathBuf>,
    result_url: String,
}

impl Scenario {
    /// Build a scenario in a fresh, uniquely named directory under the
    /// configured workspace root
    pub fn from_params(params: &ScenarioParams, config: &Config) -> Result<Self> {
        params.validate()?;
        let root = config.workspace.root();

        for _ in 0..MAX_NAME_ATTEMPTS {
            let project_name = paths::unique_project_name(&params.stem());
            if !root.join(&project_name).exists() {
                return Ok(Self::with_project_name(params, config, project_name));
            }
            tracing::debug!(%project_name, "Project directory already exists, picking another name");
        }

        Err(Error::Internal(format!(
            "could not find an unused project directory under '{}'",
            root.display()
        )))
    }

    /// Build a scenario with a fixed project name
    pub fn with_project_name(
        params: &ScenarioParams,
        config: &Config,
        project_name: String,
    ) -> Self {
        let working_dir = config.workspace.root().join(&project_name);
        let publish_output = publish_output_folder(params);
        let toolchain = &config.toolchain;

        let stages = StageKind::ORDER
            .iter()
            .map(|&kind| {
                let (program, args) = match kind {
                    StageKind::Scaffold => (
                        toolchain.frontend.clone(),
                        scaffold_args(params, &toolchain.new_extra_args),
                    ),
                    StageKind::Restore => (toolchain.frontend.clone(), "restore".to_string()),
                    StageKind::Build => (toolchain.frontend.clone(), "build".to_string()),
                    StageKind::Publish => publish_command(
                        params,
                        &project_name,
                        &publish_output,
                        &toolchain.frontend,
                        &toolchain.build_tool,
                    ),
                };
                let invocation = Invocation::new(program, args, &working_dir)
                    .create_dir_if_missing(kind == StageKind::Scaffold)
                    .timeout(config.timeouts.for_stage(kind))
                    .envs(toolchain.env.clone());
                Stage { kind, invocation }
            })
            .collect();

        Self {
            name: format!("{} {}", params.display_name(), project_name),
            project_name,
            working_dir,
            stages,
            publish_output,
            expected_artifacts: params.expected_artifacts.clone(),
            result_url: params.result_url(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Stages in execution order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Publish output folder relative to the working directory
    pub fn publish_output(&self) -> &Path {
        &self.publish_output
    }

    /// Files expected inside the publish output folder
    pub fn expected_artifacts(&self) -> &[PathBuf] {
        &self.expected_artifacts
    }

    pub fn result_url(&self) -> &str {
        &self.result_url
    }
}

/// `bin/<configuration>/PublishOutput`
fn publish_output_folder(params: &ScenarioParams) -> PathBuf {
    PathBuf::from("bin")
        .join(params.configuration.as_str())
        .join("PublishOutput")
}

/// Arguments for the scaffold command
fn scaffold_args(params: &ScenarioParams, extra: &str) -> String {
    let mut args = vec![
        "new".to_string(),
        params.template.template_name().to_string(),
        "--framework".to_string(),
        params.framework.clone(),
    ];
    if let Some(tfm) = &params.target_framework {
        args.push("--target-framework-override".to_string());
        args.push(tfm.clone());
    }
    if let Some(auth) = params.auth {
        args.push("--auth".to_string());
        args.push(auth.as_arg().to_string());
    }
    let extra = extra.trim();
    if !extra.is_empty() {
        args.push(extra.to_string());
    }
    if params.use_local_db {
        args.push("--use-local-db".to_string());
    }
    args.join(" ")
}

/// Program and arguments for the publish stage
///
/// Both variants carry identical configuration and output-path properties;
/// only the program and the leading argument differ.
fn publish_command(
    params: &ScenarioParams,
    project_name: &str,
    publish_output: &Path,
    frontend: &str,
    build_tool: &str,
) -> (String, String) {
    let base = format!(
        "{}.csproj /p:DeployOnBuild=true /p:Configuration={} /p:PublishUrl={}",
        project_name,
        params.configuration,
        publish_output.display()
    );
    match params.toolchain {
        ToolchainVariant::Managed => (frontend.to_string(), format!("{} {}", build_tool, base)),
        ToolchainVariant::Native => (build_tool.to_string(), base),
    }
}
