//! Publish harness - template publish pipeline verification
//!
//! This library runs external toolchain commands with timeouts and
//! cancellation, and drives scaffold, restore, build and publish scenarios
//! whose publish output is checked for the expected artifacts.

pub mod cli;
pub mod commands;
pub mod common;
pub mod process;
pub mod scenario;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use process::{run_process, CancelToken, ExecutionResult, ExitOutcome, Invocation};
pub use scenario::{Orchestrator, Scenario, ScenarioParams, ScenarioReport, Verdict};
