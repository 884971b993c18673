//! Common test utilities for procsignal tests
#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use procsignal::launcher::HandleFuture;
use procsignal::{
    LaunchedProcess, Launcher, ProcessError, ProcessHandle, ProcessSignal, ResolvedCommand,
};
use procsignal::config::LaunchConfig;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;

/// Process id reported by fake processes
pub const FAKE_PID: u32 = 4242;

/// Static lines written by fixture processes
pub const LOREM_IPSUM_LINES: [&str; 5] = [
    "At vero eos et accusamus et iusto odio dignissimos ducimus qui blanditiis",
    "praesentium voluptatum deleniti atque corrupti quos dolores et quas molestias",
    "excepturi sint occaecati cupiditate non provident, similique sunt in culpa qui",
    "officia deserunt mollitia animi, id est laborum et dolorum fuga.Et harum",
    "quidem rerum facilis est et expedita distinctio.Nam libero tempore, cum soluta",
];

/// Launcher handing out one in-memory process
pub struct FakeLauncher {
    process: Mutex<Option<LaunchedProcess>>,
    launched_with: Arc<Mutex<Option<ResolvedCommand>>>,
}

impl FakeLauncher {
    /// Launcher whose every launch fails
    pub fn exhausted() -> Self {
        Self {
            process: Mutex::new(None),
            launched_with: Arc::new(Mutex::new(None)),
        }
    }
}

impl Launcher for FakeLauncher {
    fn launch(
        &self,
        command: &ResolvedCommand,
        _config: &LaunchConfig,
    ) -> Result<LaunchedProcess, ProcessError> {
        *self.launched_with.lock().unwrap() = Some(command.clone());
        self.process
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ProcessError::SpawnFailed {
                program: command.display(),
                message: "fake process already launched".to_string(),
            })
    }
}

/// Test-side controls for a fake process
pub struct FakeControl {
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    exit: Option<oneshot::Sender<i32>>,
    killed: Arc<AtomicBool>,
    launched_with: Arc<Mutex<Option<ResolvedCommand>>>,
}

impl FakeControl {
    pub async fn stdout(&mut self, text: &str) {
        write(self.stdout.as_mut(), text).await;
    }

    pub async fn stderr(&mut self, text: &str) {
        write(self.stderr.as_mut(), text).await;
    }

    pub fn close_stdout(&mut self) {
        self.stdout.take();
    }

    pub fn close_stderr(&mut self) {
        self.stderr.take();
    }

    /// Report process exit; pipes stay open until closed separately
    pub fn exit(&mut self, code: i32) {
        if let Some(tx) = self.exit.take() {
            let _ = tx.send(code);
        }
    }

    /// Drop the exit notifier so waiting for the exit fails
    pub fn abandon_exit(&mut self) {
        self.exit.take();
    }

    /// Close both pipes and exit
    pub fn finish(&mut self, code: i32) {
        self.close_stdout();
        self.close_stderr();
        self.exit(code);
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn launched_with(&self) -> Option<ResolvedCommand> {
        self.launched_with.lock().unwrap().clone()
    }
}

async fn write(pipe: Option<&mut DuplexStream>, text: &str) {
    let pipe = pipe.expect("pipe already closed");
    pipe.write_all(text.as_bytes()).await.expect("write to fake pipe");
}

struct FakeHandle {
    exit: oneshot::Receiver<i32>,
    killed: Arc<AtomicBool>,
}

impl ProcessHandle for FakeHandle {
    fn wait(&mut self) -> HandleFuture<'_, io::Result<i32>> {
        Box::pin(async move {
            (&mut self.exit)
                .await
                .map_err(|_| io::Error::other("fake exit sender dropped"))
        })
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Create a fake launcher and its controls
pub fn fake_process() -> (FakeLauncher, FakeControl) {
    let (stdout_writer, stdout_reader) = tokio::io::duplex(64 * 1024);
    let (stderr_writer, stderr_reader) = tokio::io::duplex(64 * 1024);
    let (exit_tx, exit_rx) = oneshot::channel();
    let killed = Arc::new(AtomicBool::new(false));
    let launched_with = Arc::new(Mutex::new(None));

    let launched = LaunchedProcess {
        process_id: FAKE_PID,
        handle: Box::new(FakeHandle {
            exit: exit_rx,
            killed: Arc::clone(&killed),
        }),
        stdout: Box::new(stdout_reader),
        stderr: Box::new(stderr_reader),
    };

    let launcher = FakeLauncher {
        process: Mutex::new(Some(launched)),
        launched_with: Arc::clone(&launched_with),
    };
    let control = FakeControl {
        stdout: Some(stdout_writer),
        stderr: Some(stderr_writer),
        exit: Some(exit_tx),
        killed,
        launched_with,
    };

    (launcher, control)
}

/// Line numbers of all output/error signals, in delivery order
pub fn line_numbers(signals: &[ProcessSignal]) -> Vec<u64> {
    signals.iter().filter_map(|s| s.line_number()).collect()
}

/// Data of signals matching `pick`, in delivery order
pub fn lines_where(signals: &[ProcessSignal], pick: fn(&ProcessSignal) -> bool) -> Vec<String> {
    signals
        .iter()
        .filter(|s| pick(s))
        .filter_map(|s| match s {
            ProcessSignal::Output { data, .. } | ProcessSignal::Error { data, .. } => {
                Some(data.clone())
            }
            _ => None,
        })
        .collect()
}

pub fn is_output(signal: &ProcessSignal) -> bool {
    matches!(signal, ProcessSignal::Output { .. })
}

pub fn is_error(signal: &ProcessSignal) -> bool {
    matches!(signal, ProcessSignal::Error { .. })
}

/// Writes a fixture script to a temp dir (not marked executable)
pub fn create_script(name: &str, content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write script");
    (dir, path)
}
