//! Scenario verdicts and reports

use colored::Colorize;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::cleanup::CleanupOutcome;
use super::model::StageKind;
use crate::process::{serialize_millis, ExecutionResult, ExitOutcome, Invocation};

/// Final judgement on one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    /// A stage did not complete with exit code 0
    StageFailed {
        stage: StageKind,
        outcome: ExitOutcome,
    },
    /// Every stage succeeded but expected publish artifacts are missing
    VerificationFailed { missing: Vec<PathBuf> },
    /// The host could not prepare the stage
    Infrastructure { stage: StageKind, reason: String },
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Passed => write!(f, "passed"),
            Verdict::StageFailed { stage, outcome } => {
                write!(f, "{} stage failed: {}", stage, outcome)
            }
            Verdict::VerificationFailed { missing } => {
                let names: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
                write!(f, "missing publish artifacts: {}", names.join(", "))
            }
            Verdict::Infrastructure { stage, reason } => {
                write!(f, "infrastructure error in {} stage: {}", stage, reason)
            }
        }
    }
}

/// One executed stage
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub program: String,
    pub args: String,
    /// Number of executions, more than one only when retried
    pub attempts: u32,
    /// Result of the last attempt
    pub result: ExecutionResult,
}

impl StageRecord {
    pub fn new(stage: StageKind, invocation: &Invocation, attempts: u32, result: ExecutionResult) -> Self {
        Self {
            stage,
            program: invocation.program().to_string(),
            args: invocation.args().to_string(),
            attempts,
            result,
        }
    }

    /// Command line as it would be typed
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args)
        }
    }
}

/// Everything known about one scenario run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub project_name: String,
    pub working_dir: PathBuf,
    pub result_url: String,
    #[serde(flatten)]
    pub verdict: Verdict,
    pub stages: Vec<StageRecord>,
    pub cleanup: CleanupOutcome,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.verdict.passed()
    }
}

/// Print one report in human-readable form
pub fn print_report(report: &ScenarioReport, verbose: bool) {
    println!("\n{} {}", "Scenario:".blue().bold(), report.name.white().bold());
    println!("  {}", report.working_dir.display().to_string().dimmed());

    for record in &report.stages {
        let retried = if record.attempts > 1 {
            format!(" (attempt {})", record.attempts)
        } else {
            String::new()
        };
        if record.result.success() {
            println!(
                "  {} {}{} {}",
                "✓".green(),
                record.stage,
                retried,
                format!("{:.1}s", record.result.duration.as_secs_f64()).dimmed()
            );
            if verbose {
                println!("    $ {}", record.command_line().dimmed());
            }
        } else {
            println!(
                "  {} {}{}: {}",
                "✗".red(),
                record.stage,
                retried,
                record.result.outcome
            );
            println!("    $ {}", record.command_line().dimmed());
            for line in &record.result.output_tail {
                println!("    {} {}", "│".dimmed(), line);
            }
        }
    }

    match &report.verdict {
        Verdict::Passed => {
            println!("  {} {}", "✓".green(), "publish output verified".dimmed());
        }
        Verdict::VerificationFailed { missing } => {
            for path in missing {
                println!("  {} missing {}", "✗".red(), path.display());
            }
        }
        Verdict::Infrastructure { stage, reason } => {
            println!("  {} {} setup: {}", "✗".red(), stage, reason);
        }
        Verdict::StageFailed { .. } => {}
    }

    if !report.cleanup.is_clean() {
        println!("  {} cleanup {}", "!".yellow(), report.cleanup);
    }

    if report.passed() {
        println!("{} {}", "✓".green().bold(), "Passed".green().bold());
    } else {
        println!("{} {}", "✗".red().bold(), "Failed".red().bold());
    }
}

/// Print the pass/fail tally for a run
pub fn print_summary(reports: &[ScenarioReport]) {
    let failed: Vec<&ScenarioReport> = reports.iter().filter(|r| !r.passed()).collect();
    let passed = reports.len() - failed.len();

    println!();
    if failed.is_empty() {
        println!(
            "{} {} scenario(s) passed",
            "✓".green().bold(),
            passed.to_string().green().bold()
        );
        return;
    }

    println!(
        "{} {} passed, {} failed",
        "✗".red().bold(),
        passed,
        failed.len().to_string().red().bold()
    );
    for report in failed {
        println!("  {} {}: {}", "✗".red(), report.name, report.verdict);
    }
}
