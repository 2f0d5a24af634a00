//! Publish scenarios
//!
//! A scenario scaffolds a project from a template, restores, builds and
//! publishes it, then checks that the publish output holds the expected
//! artifacts. Scenarios come from the built-in matrix or a YAML matrix file.

mod cleanup;
mod model;
mod orchestrator;
mod params;
mod report;
mod verify;

pub use cleanup::{remove_scenario_dir, CleanupOutcome};
pub use model::{Scenario, Stage, StageKind};
pub use orchestrator::{Orchestrator, RetryPolicy};
pub use params::{
    AuthMode, BuildConfiguration, ScenarioMatrix, ScenarioParams, TemplateKind, ToolchainVariant,
};
pub use report::{print_report, print_summary, ScenarioReport, StageRecord, Verdict};
pub use verify::missing_artifacts;
