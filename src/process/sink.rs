//! Destinations for captured process output

use colored::Colorize;
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;

/// Which child stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Receives output lines while a process runs
///
/// Called from the reader tasks, so implementations must be cheap and
/// must not block.
pub trait OutputSink: Send + Sync {
    fn line(&self, program: &str, stream: OutputStream, line: &str);
}

/// Forwards lines as debug-level tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn line(&self, program: &str, stream: OutputStream, line: &str) {
        tracing::debug!(target: "pubharness::process::output", program, %stream, "{}", line);
    }
}

/// Echoes lines to stderr for live visibility
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn line(&self, _program: &str, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => eprintln!("    {} {}", "│".dimmed(), line.dimmed()),
            OutputStream::Stderr => eprintln!("    {} {}", "│".yellow(), line),
        }
    }
}

/// Keeps every line in memory
#[derive(Debug, Default)]
pub struct CaptureSink {
    lines: Mutex<Vec<(OutputStream, String)>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured lines in arrival order
    pub fn lines(&self) -> Vec<(OutputStream, String)> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Lines from one stream only
    pub fn stream(&self, stream: OutputStream) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, l)| l)
            .collect()
    }
}

impl OutputSink for CaptureSink {
    fn line(&self, _program: &str, stream: OutputStream, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((stream, line.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink_splits_streams() {
        let sink = CaptureSink::new();
        sink.line("dotnet", OutputStream::Stdout, "Restoring packages");
        sink.line("dotnet", OutputStream::Stderr, "warning NU1603");
        sink.line("dotnet", OutputStream::Stdout, "Restore completed");

        assert_eq!(sink.lines().len(), 3);
        assert_eq!(
            sink.stream(OutputStream::Stdout),
            vec!["Restoring packages", "Restore completed"]
        );
        assert_eq!(sink.stream(OutputStream::Stderr), vec!["warning NU1603"]);
    }
}
