//! procsignal - Ordered signal streams for native child processes
//!
//! Wraps a child process so callers receive one strictly ordered sequence of
//! signals describing its captured output and lifecycle:
//! - **Output** / **Error** - one per captured line, numbered globally across
//!   stdout and stderr
//! - **Exited** - after the process exited and both channels were drained
//! - **Disposed** - after early termination requested by the caller
//!
//! ## Consuming a run
//!
//! - [`ProcessObservable::subscribe`] - push-based [`Subscription`] (also a `Stream`)
//! - [`ProcessObservable::start_task`] / [`to_aggregate`] - one awaited [`ProcessResult`]
//! - [`ProcessObservable::dispose`] - idempotent early termination
//!
//! Construction has no side effects; the process is spawned on first
//! consumption. Launch failures never raise: they complete the sequence
//! without signals and surface as [`ProcessResult::error`].
//!
//! ```no_run
//! use procsignal::ProcessObservable;
//!
//! # async fn run() {
//! let result = ProcessObservable::create("git", "status --short")
//!     .start_task()
//!     .await;
//!
//! for line in &result.data {
//!     println!("{:>4} {}: {}", line.line_number, line.kind, line.data);
//! }
//! println!("exit code: {:?}", result.exit_code);
//! # }
//! ```

pub mod config;
pub mod emitter;
pub mod error;
pub mod launcher;
pub mod lifecycle;
pub mod logging;
pub mod observable;
pub mod reader;
pub mod signal;
pub mod task;

pub use config::{load_config, Config};
pub use error::ProcessError;
pub use launcher::{
    CommandSpec, LaunchedProcess, Launcher, NativeLauncher, OutputPipe, ProcessHandle,
    ResolvedCommand,
};
pub use logging::{init_logging, LogFormat};
pub use observable::{Observation, ProcessBuilder, ProcessObservable, Subscription};
pub use signal::{DataLine, DataLineType, ProcessResult, ProcessSignal, RunPhase};
pub use task::{aggregate, to_aggregate, ProcessTask};
