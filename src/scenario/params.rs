//! Scenario parameter types
//!
//! Defines the data structures for deserializing YAML scenario matrices
//! and the built-in matrix covering every template/configuration pair.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::common::{Error, Result};

/// Project template passed to the scaffold command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    /// Empty web application
    Web,
    /// Web API
    WebApi,
    /// Model-view-controller web application
    Mvc,
    /// Razor pages web application
    Razor,
}

impl TemplateKind {
    const NAMES: &'static [&'static str] = &["web", "webapi", "mvc", "razor"];

    /// Short name understood by the scaffolding tool
    pub fn template_name(&self) -> &'static str {
        match self {
            TemplateKind::Web => "web",
            TemplateKind::WebApi => "webapi",
            TemplateKind::Mvc => "mvc",
            TemplateKind::Razor => "razor",
        }
    }

    /// Leading part of generated project names
    pub fn stem(&self) -> &'static str {
        match self {
            TemplateKind::Web => "EmptyWeb",
            TemplateKind::WebApi => "WebAPI",
            TemplateKind::Mvc => "Mvc",
            TemplateKind::Razor => "Razor",
        }
    }

    /// Whether the template takes an `--auth` option
    pub fn supports_auth(&self) -> bool {
        !matches!(self, TemplateKind::Web)
    }

    /// URL the published application would answer on
    pub fn default_result_url(&self) -> &'static str {
        match self {
            TemplateKind::WebApi => "http://localhost:5000/api/Values",
            _ => "http://localhost:5000",
        }
    }
}

impl FromStr for TemplateKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "web" => Ok(TemplateKind::Web),
            "webapi" => Ok(TemplateKind::WebApi),
            "mvc" => Ok(TemplateKind::Mvc),
            "razor" => Ok(TemplateKind::Razor),
            _ => Err(Error::unknown_variant("template", s, Self::NAMES)),
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template_name())
    }
}

/// Build configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum BuildConfiguration {
    #[serde(alias = "debug")]
    Debug,
    #[serde(alias = "release")]
    Release,
}

impl BuildConfiguration {
    const NAMES: &'static [&'static str] = &["Debug", "Release"];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildConfiguration::Debug => "Debug",
            BuildConfiguration::Release => "Release",
        }
    }
}

impl FromStr for BuildConfiguration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(BuildConfiguration::Debug),
            "release" => Ok(BuildConfiguration::Release),
            _ => Err(Error::unknown_variant("configuration", s, Self::NAMES)),
        }
    }
}

impl fmt::Display for BuildConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the publish stage reaches the build tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum ToolchainVariant {
    /// Publish through the front-end program, build tool as first argument
    #[default]
    #[serde(rename = "managed-frontend", alias = "core", alias = "managed")]
    Managed,
    /// Publish by invoking the build tool program directly
    #[serde(rename = "native-frontend", alias = "native", alias = "desktop")]
    Native,
}

impl ToolchainVariant {
    const NAMES: &'static [&'static str] = &["managed-frontend", "native-frontend"];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolchainVariant::Managed => "managed-frontend",
            ToolchainVariant::Native => "native-frontend",
        }
    }
}

impl FromStr for ToolchainVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "managed-frontend" | "managed" | "core" => Ok(ToolchainVariant::Managed),
            "native-frontend" | "native" | "desktop" => Ok(ToolchainVariant::Native),
            _ => Err(Error::unknown_variant("toolchain", s, Self::NAMES)),
        }
    }
}

impl fmt::Display for ToolchainVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication mode passed to templates that support it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum AuthMode {
    #[serde(alias = "none")]
    None,
    #[serde(alias = "individual")]
    Individual,
    #[serde(alias = "individualb2c")]
    IndividualB2C,
    #[serde(alias = "singleorg")]
    SingleOrg,
    #[serde(alias = "multiorg")]
    MultiOrg,
    #[serde(alias = "windows")]
    Windows,
}

impl AuthMode {
    const NAMES: &'static [&'static str] = &[
        "None",
        "Individual",
        "IndividualB2C",
        "SingleOrg",
        "MultiOrg",
        "Windows",
    ];

    pub fn as_arg(&self) -> &'static str {
        match self {
            AuthMode::None => "None",
            AuthMode::Individual => "Individual",
            AuthMode::IndividualB2C => "IndividualB2C",
            AuthMode::SingleOrg => "SingleOrg",
            AuthMode::MultiOrg => "MultiOrg",
            AuthMode::Windows => "Windows",
        }
    }

    /// Modes that store users in a local database
    pub fn supports_local_db(&self) -> bool {
        matches!(self, AuthMode::Individual | AuthMode::IndividualB2C)
    }
}

impl FromStr for AuthMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::NAMES
            .iter()
            .position(|name| name.eq_ignore_ascii_case(s))
            .map(|i| {
                [
                    AuthMode::None,
                    AuthMode::Individual,
                    AuthMode::IndividualB2C,
                    AuthMode::SingleOrg,
                    AuthMode::MultiOrg,
                    AuthMode::Windows,
                ][i]
            })
            .ok_or_else(|| Error::unknown_variant("auth mode", s, Self::NAMES))
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// Parameters for one scenario
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioParams {
    /// Project template
    pub template: TemplateKind,
    /// Framework the template is instantiated for
    #[serde(default = "default_framework")]
    pub framework: String,
    /// Build configuration used by the publish stage
    pub configuration: BuildConfiguration,
    /// Publish routing
    #[serde(default)]
    pub toolchain: ToolchainVariant,
    /// Authentication mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthMode>,
    /// Pass `--use-local-db` to the scaffold command
    #[serde(default)]
    pub use_local_db: bool,
    /// Target framework override, makes the project a full-framework one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_framework: Option<String>,
    /// Result URL marker carried into the report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    /// Files that must exist in the publish output folder
    #[serde(default = "default_artifacts")]
    pub expected_artifacts: Vec<PathBuf>,
}

pub fn default_framework() -> String {
    "netcoreapp2.1".to_string()
}

pub fn default_artifacts() -> Vec<PathBuf> {
    vec![PathBuf::from("web.config")]
}

impl ScenarioParams {
    /// Minimal parameters with defaults for everything optional
    pub fn new(template: TemplateKind, configuration: BuildConfiguration) -> Self {
        Self {
            template,
            framework: default_framework(),
            configuration,
            toolchain: ToolchainVariant::default(),
            auth: None,
            use_local_db: false,
            target_framework: None,
            result_url: None,
            expected_artifacts: default_artifacts(),
        }
    }

    pub fn toolchain(mut self, toolchain: ToolchainVariant) -> Self {
        self.toolchain = toolchain;
        self
    }

    pub fn auth(mut self, auth: AuthMode) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn local_db(mut self, use_local_db: bool) -> Self {
        self.use_local_db = use_local_db;
        self
    }

    pub fn target_framework(mut self, framework: impl Into<String>) -> Self {
        self.target_framework = Some(framework.into());
        self
    }

    /// Full-framework projects publish as standalone applications
    pub fn is_standalone(&self) -> bool {
        self.target_framework.is_some()
    }

    /// Project name stem, e.g. `MvcCore` or `RazorNET`
    pub fn stem(&self) -> String {
        let flavor = if self.is_standalone() { "NET" } else { "Core" };
        format!("{}{}", self.template.stem(), flavor)
    }

    pub fn result_url(&self) -> String {
        self.result_url
            .clone()
            .unwrap_or_else(|| self.template.default_result_url().to_string())
    }

    /// Human-readable name listing the parameters that vary
    pub fn display_name(&self) -> String {
        let mut parts = vec![
            self.configuration.to_string(),
            self.toolchain.to_string(),
        ];
        if let Some(auth) = self.auth {
            parts.push(format!("auth={}", auth));
        }
        if self.use_local_db {
            parts.push("local-db".to_string());
        }
        if let Some(tfm) = &self.target_framework {
            parts.push(tfm.clone());
        }
        format!("{}[{}]", self.stem(), parts.join(", "))
    }

    /// Reject parameter combinations the scaffold command cannot honor
    pub fn validate(&self) -> Result<()> {
        if !is_token(&self.framework) {
            return Err(Error::Config(format!(
                "framework must be a single non-empty token, got '{}'",
                self.framework
            )));
        }
        if let Some(tfm) = &self.target_framework {
            if !is_token(tfm) {
                return Err(Error::Config(format!(
                    "target framework must be a single non-empty token, got '{}'",
                    tfm
                )));
            }
        }
        if let Some(auth) = self.auth {
            if !self.template.supports_auth() {
                return Err(Error::Config(format!(
                    "template '{}' does not accept an auth mode (got '{}')",
                    self.template, auth
                )));
            }
        }
        if self.use_local_db && !self.auth.is_some_and(|a| a.supports_local_db()) {
            return Err(Error::Config(
                "use_local_db requires auth mode Individual or IndividualB2C".to_string(),
            ));
        }
        if self.expected_artifacts.is_empty() {
            return Err(Error::Config(
                "expected_artifacts must name at least one file".to_string(),
            ));
        }
        for artifact in &self.expected_artifacts {
            if !is_contained_relative(artifact) {
                return Err(Error::Config(format!(
                    "expected artifact '{}' must be a relative path inside the publish folder",
                    artifact.display()
                )));
            }
        }
        Ok(())
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}

fn is_contained_relative(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// A list of scenarios loaded from YAML or built in
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioMatrix {
    pub scenarios: Vec<ScenarioParams>,
}

impl ScenarioMatrix {
    /// Load a matrix from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, &e))?;
        Self::parse(&content)
    }

    /// Parse a matrix from YAML text and validate every entry
    pub fn parse(content: &str) -> Result<Self> {
        let matrix: ScenarioMatrix = serde_yaml::from_str(content)?;
        for (i, params) in matrix.scenarios.iter().enumerate() {
            params.validate().map_err(|e| {
                Error::Config(format!("scenario #{} ({}): {}", i + 1, params.display_name(), e))
            })?;
        }
        Ok(matrix)
    }

    /// Keep only scenarios whose display name contains `needle`
    pub fn filter(mut self, needle: &str) -> Self {
        let needle = needle.to_ascii_lowercase();
        self.scenarios
            .retain(|p| p.display_name().to_ascii_lowercase().contains(&needle));
        self
    }

    /// The standard matrix: every template on Release and Debug, with the
    /// auth and local-db combinations for mvc/razor, each repeated for the
    /// `net461` full-framework override
    pub fn builtin() -> Self {
        use BuildConfiguration::{Debug, Release};

        let mut scenarios = Vec::new();
        for target in [None, Some("net461")] {
            for template in [TemplateKind::Web, TemplateKind::WebApi] {
                for configuration in [Release, Debug] {
                    scenarios.push(with_target(ScenarioParams::new(template, configuration), target));
                }
            }
            for template in [TemplateKind::Mvc, TemplateKind::Razor] {
                for (auth, local_db) in [
                    (AuthMode::None, false),
                    (AuthMode::Individual, false),
                    (AuthMode::Individual, true),
                ] {
                    for configuration in [Release, Debug] {
                        let params = ScenarioParams::new(template, configuration)
                            .auth(auth)
                            .local_db(local_db);
                        scenarios.push(with_target(params, target));
                    }
                }
            }
        }
        Self { scenarios }
    }
}

fn with_target(params: ScenarioParams, target: Option<&str>) -> ScenarioParams {
    match target {
        Some(tfm) => params.target_framework(tfm),
        None => params,
    }
}
