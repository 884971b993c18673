//! Signal emitter
//!
//! The single serialization point of a run. Both stream readers and the exit
//! watcher hand their events to one [`Emitter`]; a single lock guards the
//! line counter, the hand-off to the subscriber and the terminated flag, so
//! line numbers are unique, gap-free and in delivery order, and nothing is
//! delivered after the terminal signal.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::launcher::{LaunchedProcess, ProcessHandle};
use crate::reader::read_lines;
use crate::signal::{DataLineType, ProcessSignal};

/// Sending half of a run's signal sequence
pub type SignalSender = mpsc::UnboundedSender<ProcessSignal>;

/// Shared merge point for one run
#[derive(Clone)]
pub struct Emitter {
    state: Arc<Mutex<EmitterState>>,
}

struct EmitterState {
    process_id: u32,
    next_line: u64,
    /// Dropped when the sequence terminates, which completes it for the receiver
    sink: Option<SignalSender>,
    /// Disposal requested; only `Disposed` may still be delivered
    disposing: bool,
}

impl Emitter {
    pub fn new(process_id: u32, sink: SignalSender) -> Self {
        Self {
            state: Arc::new(Mutex::new(EmitterState {
                process_id,
                next_line: 0,
                sink: Some(sink),
                disposing: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EmitterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn process_id(&self) -> u32 {
        self.lock().process_id
    }

    /// Sequence one captured line
    ///
    /// Returns `false` once the sequence has terminated; the line is dropped
    /// and the caller should stop reading.
    pub fn line(&self, kind: DataLineType, data: String) -> bool {
        let mut state = self.lock();
        if state.sink.is_none() || state.disposing {
            return false;
        }

        let process_id = state.process_id;
        let line_number = state.next_line;
        state.next_line += 1;

        let signal = match kind {
            DataLineType::Output => ProcessSignal::Output {
                process_id,
                line_number,
                data,
            },
            DataLineType::Error => ProcessSignal::Error {
                process_id,
                line_number,
                data,
            },
        };

        tracing::trace!(process_id, line_number, channel = %kind, "Line captured");

        if let Some(sink) = &state.sink {
            // A dropped receiver is disposing the run; keep numbering consistent
            let _ = sink.send(signal);
        }
        true
    }

    /// Emit `Exited` and complete the sequence
    ///
    /// Returns `false` if the sequence had already terminated or disposal
    /// has been claimed.
    pub fn exited(&self, exit_code: i32) -> bool {
        let mut state = self.lock();
        if state.disposing {
            return false;
        }
        let process_id = state.process_id;
        Self::terminate(
            &mut state,
            ProcessSignal::Exited {
                process_id,
                exit_code,
            },
        )
    }

    /// Claim the terminal signal for disposal without delivering it yet
    ///
    /// From now on lines and `Exited` are dropped. Returns `false` if the
    /// sequence had already terminated or disposal was already claimed.
    pub fn request_dispose(&self) -> bool {
        let mut state = self.lock();
        if state.sink.is_none() || state.disposing {
            return false;
        }
        state.disposing = true;
        true
    }

    /// Emit `Disposed` and complete the sequence
    ///
    /// Returns `false` if the sequence had already terminated.
    pub fn disposed(&self) -> bool {
        let mut state = self.lock();
        let process_id = state.process_id;
        Self::terminate(
            &mut state,
            ProcessSignal::Disposed {
                process_id: Some(process_id),
            },
        )
    }

    fn terminate(state: &mut EmitterState, signal: ProcessSignal) -> bool {
        match state.sink.take() {
            Some(sink) => {
                tracing::debug!(
                    process_id = state.process_id,
                    lines = state.next_line,
                    "Sequence terminated: {:?}",
                    signal
                );
                let _ = sink.send(signal);
                true
            }
            None => false,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().sink.is_none()
    }

    /// Number of line numbers handed out so far
    pub fn lines_emitted(&self) -> u64 {
        self.lock().next_line
    }
}

/// How a driven run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    /// Process exited, both channels drained, `Exited` delivered
    Exited(i32),
    /// Run ended without `Exited`: the caller disposed it, or waiting for
    /// the exit failed and the run was torn down as if disposed
    Disposed,
}

/// Run the readers and the exit watcher for a launched process
///
/// `Exited` is only emitted after the process has exited *and* both readers
/// reached end-of-stream. Cancelling `cancel` stops everything; the process
/// is released before `Disposed` is delivered.
pub async fn drive(
    launched: LaunchedProcess,
    emitter: Emitter,
    cancel: CancellationToken,
) -> DriveOutcome {
    let LaunchedProcess {
        process_id,
        mut handle,
        stdout,
        stderr,
    } = launched;

    let stdout_task = tokio::spawn(read_lines(
        stdout,
        DataLineType::Output,
        emitter.clone(),
        cancel.clone(),
    ));
    let stderr_task = tokio::spawn(read_lines(
        stderr,
        DataLineType::Error,
        emitter.clone(),
        cancel.clone(),
    ));

    let waited = tokio::select! {
        _ = cancel.cancelled() => None,
        status = handle.wait() => Some(status),
    };

    let exit_code = match waited {
        None => {
            release(handle, process_id);
            emitter.disposed();
            return DriveOutcome::Disposed;
        }
        Some(Err(e)) => {
            tracing::warn!(process_id, error = %e, "Failed to wait for process exit");
            cancel.cancel();
            release(handle, process_id);
            emitter.disposed();
            return DriveOutcome::Disposed;
        }
        Some(Ok(code)) => code,
    };

    tracing::debug!(process_id, exit_code, "Process exited, draining output");

    let drained = tokio::select! {
        _ = cancel.cancelled() => false,
        _ = async {
            let _ = stdout_task.await;
            let _ = stderr_task.await;
        } => true,
    };

    if drained && emitter.exited(exit_code) {
        DriveOutcome::Exited(exit_code)
    } else {
        // Process already gone; nothing left to release
        emitter.disposed();
        DriveOutcome::Disposed
    }
}

/// Kill and drop the process handle; failures are suppressed
fn release(mut handle: Box<dyn ProcessHandle>, process_id: u32) {
    if let Err(e) = handle.start_kill() {
        tracing::debug!(process_id, error = %e, "Ignoring kill failure during disposal");
    }
}
