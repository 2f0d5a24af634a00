//! Process runner
//!
//! Runs one external program per [`Invocation`] and reports an
//! [`ExecutionResult`]. Platform differences in argument passing and
//! process-tree termination stay inside this module.

mod cancel;
mod invocation;
mod outcome;
mod runner;
mod sink;

pub use cancel::CancelToken;
pub use invocation::Invocation;
pub use outcome::{ExecutionResult, ExitOutcome, LaunchFailure};
pub(crate) use outcome::serialize_millis;
pub use runner::{run_process, ProcessRunner, SystemRunner, OUTPUT_TAIL_LINES};
pub use sink::{CaptureSink, ConsoleSink, OutputSink, OutputStream, TracingSink};
