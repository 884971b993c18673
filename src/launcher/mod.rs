//! Process launcher
//!
//! Resolves what to run and spawns it with both output streams redirected:
//! - Executables and script files (via a configured interpreter)
//! - Host-specific argument string handling
//! - Structured launch failures instead of raised errors

pub mod command;
pub mod spawn;

pub use command::{split_arguments, Arguments, CommandSource, CommandSpec, ResolvedCommand};
pub use spawn::{
    exit_code, HandleFuture, LaunchedProcess, Launcher, NativeLauncher, OutputPipe, ProcessHandle,
};
