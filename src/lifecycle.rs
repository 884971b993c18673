//! Run lifecycle and disposal
//!
//! Tracks the per-run state machine
//! `NotStarted -> Running -> {Exited | LaunchFailed | Disposed}` and owns the
//! cancellation token that stops the readers and the exit watcher.
//! Disposal is idempotent and safe at any point, including after the run
//! has completed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::emitter::{self, DriveOutcome, Emitter, SignalSender};
use crate::error::ProcessError;
use crate::launcher::LaunchedProcess;
use crate::signal::{ProcessSignal, RunPhase};

pub struct Lifecycle {
    state: Mutex<LifecycleState>,
    /// Stops readers and the exit watcher
    cancel: CancellationToken,
    /// Fired once the run reaches a terminal phase
    done: CancellationToken,
}

struct LifecycleState {
    phase: RunPhase,
    subscribed: bool,
    process_id: Option<u32>,
    emitter: Option<Emitter>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState {
                phase: RunPhase::NotStarted,
                subscribed: false,
                process_id: None,
                emitter: None,
            }),
            cancel: CancellationToken::new(),
            done: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> RunPhase {
        self.lock().phase
    }

    pub fn process_id(&self) -> Option<u32> {
        self.lock().process_id
    }

    /// Token that fires when the run reaches a terminal phase
    pub fn done(&self) -> CancellationToken {
        self.done.clone()
    }

    /// Start the run for its one and only subscriber
    ///
    /// `launch` is invoked under the lifecycle lock so a concurrent
    /// `dispose` either precedes the spawn (and the subscriber only sees
    /// `Disposed`) or follows it (and the process is torn down).
    pub fn start<F>(self: &Arc<Self>, sink: SignalSender, launch: F) -> Result<(), ProcessError>
    where
        F: FnOnce() -> Result<LaunchedProcess, ProcessError>,
    {
        let mut state = self.lock();

        if state.subscribed {
            return Err(ProcessError::AlreadySubscribed);
        }
        state.subscribed = true;

        if state.phase == RunPhase::Disposed {
            tracing::debug!("Run disposed before subscription");
            let _ = sink.send(ProcessSignal::Disposed { process_id: None });
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            state.phase = RunPhase::LaunchFailed;
            self.done.cancel();
            ProcessError::SpawnFailed {
                program: String::new(),
                message: format!("no tokio runtime available: {}", e),
            }
        })?;

        let launched = match launch() {
            Ok(launched) => launched,
            Err(e) => {
                tracing::warn!(error = %e, "Process launch failed");
                state.phase = RunPhase::LaunchFailed;
                self.done.cancel();
                return Err(e);
            }
        };

        let process_id = launched.process_id;
        tracing::debug!(process_id, "Process started");

        let emitter = Emitter::new(process_id, sink);
        state.phase = RunPhase::Running;
        state.process_id = Some(process_id);
        state.emitter = Some(emitter.clone());

        let lifecycle = Arc::clone(self);
        let cancel = self.cancel.clone();
        runtime.spawn(async move {
            let outcome = emitter::drive(launched, emitter, cancel).await;
            lifecycle.finish(outcome);
        });

        Ok(())
    }

    fn finish(&self, outcome: DriveOutcome) {
        let mut state = self.lock();
        state.emitter = None;
        if state.phase == RunPhase::Running {
            state.phase = match outcome {
                DriveOutcome::Exited(code) => RunPhase::Exited(code),
                DriveOutcome::Disposed => RunPhase::Disposed,
            };
        }
        tracing::debug!(process_id = ?state.process_id, phase = ?state.phase, "Run finished");
        self.done.cancel();
    }

    /// Dispose the run
    ///
    /// First call releases everything; later calls are no-ops. For a running
    /// process the `Disposed` signal is delivered by the driver after the
    /// process has been told to terminate, so a consumer seeing `Disposed`
    /// never finds the kill still pending.
    pub fn dispose(&self) {
        let mut state = self.lock();
        match state.phase {
            RunPhase::NotStarted => {
                state.phase = RunPhase::Disposed;
                self.done.cancel();
            }
            RunPhase::Running => {
                if let Some(emitter) = state.emitter.take() {
                    // Loses against an `Exited` already delivered; finish() records that
                    if emitter.request_dispose() {
                        state.phase = RunPhase::Disposed;
                    }
                }
                self.cancel.cancel();
            }
            RunPhase::Exited(_) | RunPhase::LaunchFailed | RunPhase::Disposed => {}
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.phase() == RunPhase::Disposed
    }
}
