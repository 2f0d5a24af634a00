//! Process execution results

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Why a process never started
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum LaunchFailure {
    /// The program could not be resolved
    ProgramNotFound(String),
    /// The program exists but may not be executed
    PermissionDenied(String),
    /// The working directory does not exist and was not created
    WorkingDirectoryMissing(String),
    /// The argument string could not be tokenized
    InvalidArguments(String),
    /// Creating the working directory failed on the host
    DirectoryCreation(String),
    /// Any other OS-level spawn error
    Spawn(String),
}

impl LaunchFailure {
    /// Host-side failures that say nothing about the toolchain itself
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, LaunchFailure::DirectoryCreation(_))
    }
}

impl fmt::Display for LaunchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchFailure::ProgramNotFound(d) => write!(f, "program not found: {}", d),
            LaunchFailure::PermissionDenied(d) => write!(f, "permission denied: {}", d),
            LaunchFailure::WorkingDirectoryMissing(d) => {
                write!(f, "working directory does not exist: {}", d)
            }
            LaunchFailure::InvalidArguments(d) => write!(f, "invalid argument string: {}", d),
            LaunchFailure::DirectoryCreation(d) => {
                write!(f, "could not create working directory: {}", d)
            }
            LaunchFailure::Spawn(d) => write!(f, "failed to spawn: {}", d),
        }
    }
}

/// How a process execution ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExitOutcome {
    /// Exited normally with a code
    Completed { code: i32 },
    /// Ended without reporting a code, e.g. killed by a signal
    Terminated { signal: Option<i32> },
    /// Never started
    FailedToStart { failure: LaunchFailure },
    /// Deadline expired and the process tree was killed
    TimedOut {
        #[serde(rename = "after_ms", serialize_with = "serialize_millis")]
        after: Duration,
    },
    /// Cancellation was requested and the process tree was killed
    Cancelled,
    /// The host could not observe the process ending; its tree was killed
    WaitFailed { reason: String },
}

pub(crate) fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl ExitOutcome {
    /// Exit code, present only for normal termination
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExitOutcome::Completed { code } => Some(*code),
            _ => None,
        }
    }

    /// Success is exactly "completed with code 0"
    pub fn success(&self) -> bool {
        self.exit_code() == Some(0)
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Completed { code } => write!(f, "exit code {}", code),
            ExitOutcome::Terminated { signal: Some(sig) } => {
                write!(f, "terminated by signal {}", sig)
            }
            ExitOutcome::Terminated { signal: None } => write!(f, "terminated without exit code"),
            ExitOutcome::FailedToStart { failure } => write!(f, "failed to start ({})", failure),
            ExitOutcome::TimedOut { after } => {
                write!(f, "timed out after {}s", after.as_secs_f64())
            }
            ExitOutcome::Cancelled => write!(f, "cancelled"),
            ExitOutcome::WaitFailed { reason } => {
                write!(f, "lost track of process: {}", reason)
            }
        }
    }
}

/// Result of one process execution, produced once and never mutated
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub outcome: ExitOutcome,
    /// Process id, present whenever the process was spawned
    pub pid: Option<u32>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// Last captured output lines, stdout and stderr interleaved
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output_tail: Vec<String>,
}

impl ExecutionResult {
    /// Result for a process that never started
    pub fn not_started(failure: LaunchFailure, duration: Duration) -> Self {
        Self {
            outcome: ExitOutcome::FailedToStart { failure },
            pid: None,
            duration,
            output_tail: Vec::new(),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.outcome.exit_code()
    }

    pub fn success(&self) -> bool {
        self.outcome.success()
    }
}
