//! A single external program execution request

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything needed to run one external program once
///
/// Built with [`Invocation::new`] and the consuming builder methods; the
/// runner only ever borrows it.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: String,
    args: String,
    working_dir: PathBuf,
    create_dir: bool,
    timeout: Option<Duration>,
    env: BTreeMap<String, String>,
}

impl Invocation {
    /// Create an invocation of `program` with a raw argument string
    pub fn new(
        program: impl Into<String>,
        args: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into(),
            working_dir: working_dir.into(),
            create_dir: false,
            timeout: None,
            env: BTreeMap::new(),
        }
    }

    /// Create the working directory (and its parents) before spawning
    pub fn create_dir_if_missing(mut self, create: bool) -> Self {
        self.create_dir = create;
        self
    }

    /// Kill the process tree if it is still running after `timeout`
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set one environment variable for the child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables for the child
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &str {
        &self.args
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn creates_dir(&self) -> bool {
        self.create_dir
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Split the argument string into argv entries
    ///
    /// POSIX shell-word rules: whitespace separates, single and double
    /// quotes group, backslash escapes. Only used on Unix; Windows passes
    /// the raw string to the child untouched.
    pub fn split_args(&self) -> std::result::Result<Vec<String>, shell_words::ParseError> {
        shell_words::split(&self.args)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.trim().is_empty() {
            write!(f, "{}", self.program)
        } else {
            write!(f, "{} {}", self.program, self.args.trim())
        }
    }
}
