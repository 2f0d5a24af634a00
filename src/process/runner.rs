//! External process execution
//!
//! Spawns one program, streams its output, waits for it to finish and
//! reports how it ended. Launch problems are reported as an outcome, never
//! as an error, so callers only ever inspect an [`ExecutionResult`].

use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::cancel::CancelToken;
use super::invocation::Invocation;
use super::outcome::{ExecutionResult, ExitOutcome, LaunchFailure};
use super::sink::{OutputSink, OutputStream};

/// Number of output lines kept on the result for diagnostics
pub const OUTPUT_TAIL_LINES: usize = 20;

/// How long to wait for the output readers once the child has exited
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Executes invocations to completion
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run the invocation and report how it ended
    async fn execute(&self, invocation: &Invocation, cancel: &CancelToken) -> ExecutionResult;
}

/// Runner backed by real OS processes
#[derive(Clone, Default)]
pub struct SystemRunner {
    sink: Option<Arc<dyn OutputSink>>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self { sink: None }
    }

    /// Forward every captured output line to `sink`
    pub fn with_sink(sink: Arc<dyn OutputSink>) -> Self {
        Self { sink: Some(sink) }
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    #[tracing::instrument(skip_all, fields(program = %invocation.program(), dir = %invocation.working_dir().display()))]
    async fn execute(&self, invocation: &Invocation, cancel: &CancelToken) -> ExecutionResult {
        let started = Instant::now();

        if let Err(failure) = prepare_working_dir(invocation).await {
            tracing::warn!(%failure, "Process not started");
            return ExecutionResult::not_started(failure, started.elapsed());
        }

        let mut command = match build_command(invocation) {
            Ok(command) => command,
            Err(failure) => {
                tracing::warn!(%failure, "Process not started");
                return ExecutionResult::not_started(failure, started.elapsed());
            }
        };

        tracing::debug!(args = invocation.args(), "Spawning process");
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let failure = classify_spawn_error(invocation.program(), &e);
                tracing::warn!(%failure, "Process not started");
                return ExecutionResult::not_started(failure, started.elapsed());
            }
        };

        let pid = child.id();
        tracing::debug!(?pid, "Process started");

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(OUTPUT_TAIL_LINES)));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(
                stdout,
                OutputStream::Stdout,
                invocation.program().to_string(),
                self.sink.clone(),
                Arc::clone(&tail),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(
                stderr,
                OutputStream::Stderr,
                invocation.program().to_string(),
                self.sink.clone(),
                Arc::clone(&tail),
            ));
        }

        let outcome = wait_for_exit(&mut child, pid, invocation.timeout_duration(), cancel).await;

        // Anything the program left running in its group goes with it.
        if let Some(pid) = pid {
            kill_group(pid).await;
        }

        let drain = async {
            for reader in readers {
                let _ = reader.await;
            }
        };
        if tokio::time::timeout(READER_DRAIN_TIMEOUT, drain).await.is_err() {
            tracing::debug!("Output readers still open after exit, detaching");
        }

        let output_tail = tail
            .lock()
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default();

        let duration = started.elapsed();
        tracing::debug!(%outcome, elapsed_ms = duration.as_millis() as u64, "Process finished");

        ExecutionResult {
            outcome,
            pid,
            duration,
            output_tail,
        }
    }
}

/// Run `program` with `args` in `working_dir` and return `(exit code, pid)`
///
/// The exit code is `None` whenever the process did not complete normally,
/// including when it could not be started at all.
pub async fn run_process(
    program: &str,
    args: &str,
    working_dir: &Path,
    create_dir: bool,
    sink: Option<Arc<dyn OutputSink>>,
) -> (Option<i32>, Option<u32>) {
    let runner = match sink {
        Some(sink) => SystemRunner::with_sink(sink),
        None => SystemRunner::new(),
    };
    let invocation = Invocation::new(program, args, working_dir).create_dir_if_missing(create_dir);
    let result = runner.execute(&invocation, &CancelToken::new()).await;
    (result.exit_code(), result.pid)
}

/// Create the working directory if requested, then require it to exist
async fn prepare_working_dir(invocation: &Invocation) -> Result<(), LaunchFailure> {
    let dir = invocation.working_dir();

    if invocation.creates_dir() && !dir.exists() {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            LaunchFailure::DirectoryCreation(format!("{}: {}", dir.display(), e))
        })?;
        tracing::debug!(dir = %dir.display(), "Created working directory");
    }

    if !dir.is_dir() {
        return Err(LaunchFailure::WorkingDirectoryMissing(
            dir.display().to_string(),
        ));
    }

    Ok(())
}

/// Translate an invocation into a ready-to-spawn command
///
/// Unix children get their own process group so the whole tree can be
/// signalled on timeout.
fn build_command(invocation: &Invocation) -> Result<Command, LaunchFailure> {
    let mut std_cmd = std::process::Command::new(invocation.program());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;

        let args = invocation
            .split_args()
            .map_err(|e| LaunchFailure::InvalidArguments(e.to_string()))?;
        std_cmd.args(args).process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;

        let raw = invocation.args().trim();
        if !raw.is_empty() {
            std_cmd.raw_arg(raw);
        }
    }

    std_cmd
        .current_dir(invocation.working_dir())
        .envs(invocation.env_vars())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut command = Command::from(std_cmd);
    command.kill_on_drop(true);
    Ok(command)
}

fn classify_spawn_error(program: &str, err: &io::Error) -> LaunchFailure {
    let detail = format!("'{}': {}", program, err);
    match err.kind() {
        io::ErrorKind::NotFound => LaunchFailure::ProgramNotFound(detail),
        io::ErrorKind::PermissionDenied => LaunchFailure::PermissionDenied(detail),
        _ => LaunchFailure::Spawn(detail),
    }
}

/// Read one child stream line by line until EOF
fn spawn_reader<R>(
    reader: R,
    stream: OutputStream,
    program: String,
    sink: Option<Arc<dyn OutputSink>>,
    tail: Arc<Mutex<VecDeque<String>>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    let line = text.trim_end_matches(|c| c == '\n' || c == '\r');
                    if let Some(sink) = &sink {
                        sink.line(&program, stream, line);
                    }
                    if let Ok(mut tail) = tail.lock() {
                        if tail.len() == OUTPUT_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line.to_string());
                    }
                }
                Err(e) => {
                    tracing::debug!(%stream, "Error reading process output: {}", e);
                    break;
                }
            }
        }
    })
}

enum Wait {
    Exited(io::Result<ExitStatus>),
    Deadline(Duration),
    Cancelled,
}

/// Wait for the child while racing the timeout and the cancel token
async fn wait_for_exit(
    child: &mut Child,
    pid: Option<u32>,
    timeout: Option<Duration>,
    cancel: &CancelToken,
) -> ExitOutcome {
    let deadline = async {
        match timeout {
            Some(limit) => {
                tokio::time::sleep(limit).await;
                limit
            }
            None => std::future::pending().await,
        }
    };

    let waited = tokio::select! {
        status = child.wait() => Wait::Exited(status),
        limit = deadline => Wait::Deadline(limit),
        _ = cancel.cancelled() => Wait::Cancelled,
    };

    match waited {
        Wait::Exited(Ok(status)) => exit_status_outcome(status),
        Wait::Exited(Err(e)) => {
            tracing::warn!(?pid, "Failed to wait for process, killing process tree: {}", e);
            kill_tree(child, pid).await;
            ExitOutcome::WaitFailed {
                reason: e.to_string(),
            }
        }
        Wait::Deadline(after) => {
            tracing::warn!(?pid, timeout_secs = after.as_secs_f64(), "Process timed out, killing process tree");
            kill_tree(child, pid).await;
            ExitOutcome::TimedOut { after }
        }
        Wait::Cancelled => {
            tracing::info!(?pid, "Cancellation requested, killing process tree");
            kill_tree(child, pid).await;
            ExitOutcome::Cancelled
        }
    }
}

fn exit_status_outcome(status: ExitStatus) -> ExitOutcome {
    match status.code() {
        Some(code) => ExitOutcome::Completed { code },
        None => ExitOutcome::Terminated {
            signal: exit_signal(&status),
        },
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Kill the child and everything it spawned, then reap the child
async fn kill_tree(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        kill_group(pid).await;
    }

    if let Err(e) = child.kill().await {
        tracing::debug!("Kill after tree kill: {}", e);
    }
}

/// Kill every process in the group (Unix) or tree (Windows) rooted at `pid`
///
/// The leader may already have exited; an empty group is not an error.
async fn kill_group(pid: u32) {
    #[cfg(unix)]
    {
        // Negative pid addresses the process group created at spawn.
        let result = unsafe { libc::kill(-(pid as i32), libc::SIGKILL) };
        if result != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                tracing::debug!(pid, "Process group kill failed: {}", err);
            }
        }
    }

    #[cfg(windows)]
    {
        let status = Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = status {
            tracing::debug!(pid, "taskkill failed: {}", e);
        }
    }
}
