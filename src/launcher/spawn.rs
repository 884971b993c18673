//! Native process creation
//!
//! The [`Launcher`] trait is the seam between the emitter and the OS. The
//! production implementation is [`NativeLauncher`]; tests can provide their
//! own launcher backed by in-memory pipes.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};

use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

use super::command::{Arguments, ResolvedCommand};
use crate::config::LaunchConfig;
use crate::error::ProcessError;

/// Readable end of a redirected output pipe
pub type OutputPipe = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed future returned by [`ProcessHandle`] methods
pub type HandleFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Exit-notification and control handle for a spawned process
pub trait ProcessHandle: Send {
    /// Wait for the process to exit and return its exit code
    fn wait(&mut self) -> HandleFuture<'_, io::Result<i32>>;

    /// Request termination without waiting for it
    fn start_kill(&mut self) -> io::Result<()>;
}

/// Everything produced by a successful launch
pub struct LaunchedProcess {
    pub process_id: u32,
    pub handle: Box<dyn ProcessHandle>,
    pub stdout: OutputPipe,
    pub stderr: OutputPipe,
}

impl std::fmt::Debug for LaunchedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedProcess")
            .field("process_id", &self.process_id)
            .finish_non_exhaustive()
    }
}

/// Creates native processes with redirected output
///
/// Failures are returned as values; implementations must never panic on a
/// bad command.
pub trait Launcher: Send + Sync {
    fn launch(
        &self,
        command: &ResolvedCommand,
        config: &LaunchConfig,
    ) -> Result<LaunchedProcess, ProcessError>;
}

/// Launcher backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeLauncher;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

impl Launcher for NativeLauncher {
    fn launch(
        &self,
        command: &ResolvedCommand,
        config: &LaunchConfig,
    ) -> Result<LaunchedProcess, ProcessError> {
        let program = command.program.to_string_lossy().into_owned();

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.prefix_args);
        match &command.arguments {
            Arguments::Split(args) => {
                cmd.args(args);
            }
            #[cfg(windows)]
            Arguments::Raw(raw) => {
                if !raw.is_empty() {
                    cmd.raw_arg(raw);
                }
            }
            // `Arguments::parse` never yields `Raw` here, but a hand-built
            // `ResolvedCommand` may; split it the same way
            #[cfg(not(windows))]
            Arguments::Raw(raw) => {
                cmd.args(super::command::split_arguments(raw)?);
            }
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(config.kill_on_dispose);

        #[cfg(windows)]
        {
            if config.hide_window {
                cmd.creation_flags(CREATE_NO_WINDOW);
            }
        }

        if let Some(ref dir) = config.working_dir {
            cmd.current_dir(dir);
        }

        if config.env_clear {
            cmd.env_clear();
        }
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        tracing::debug!("Spawning: {}", command.display());

        let mut child = cmd
            .spawn()
            .map_err(|e| ProcessError::from_spawn(program.clone(), &e))?;

        let process_id = child.id().ok_or_else(|| ProcessError::SpawnFailed {
            program: program.clone(),
            message: "process exited before its id could be read".to_string(),
        })?;

        let missing_pipe = |name: &str| ProcessError::SpawnFailed {
            program: program.clone(),
            message: format!("{} was not captured", name),
        };
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        Ok(LaunchedProcess {
            process_id,
            handle: Box::new(NativeHandle {
                child,
                kill_on_dispose: config.kill_on_dispose,
            }),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        })
    }
}

struct NativeHandle {
    child: Child,
    kill_on_dispose: bool,
}

impl ProcessHandle for NativeHandle {
    fn wait(&mut self) -> HandleFuture<'_, io::Result<i32>> {
        Box::pin(async move {
            let status = self.child.wait().await?;
            Ok(exit_code(status))
        })
    }

    fn start_kill(&mut self) -> io::Result<()> {
        if self.kill_on_dispose {
            self.child.start_kill()
        } else {
            Ok(())
        }
    }
}

/// Exit code of a finished process
///
/// On Unix a signal-terminated process reports `128 + signal`, matching
/// what a shell would show.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}
