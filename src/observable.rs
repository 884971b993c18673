//! Cold process observables
//!
//! A [`ProcessObservable`] only captures what to run. The process is spawned
//! when the run is first consumed, either by [`ProcessObservable::subscribe`]
//! or by awaiting [`ProcessObservable::start_task`]. Each observable is one
//! run with one consumer; clones share the run, so any clone can dispose it.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::config::{load_config, Config};
use crate::error::ProcessError;
use crate::launcher::{CommandSpec, Launcher, NativeLauncher};
use crate::lifecycle::Lifecycle;
use crate::signal::{ProcessSignal, RunPhase};
use crate::task::{to_aggregate, ProcessTask};

/// Captures everything needed to start a run; building has no side effects
pub struct ProcessBuilder {
    spec: CommandSpec,
    config: Config,
    launcher: Arc<dyn Launcher>,
}

impl ProcessBuilder {
    /// Run a native executable
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self::from_spec(CommandSpec::executable(executable, ""))
    }

    /// Run a script file through the interpreter configured for its extension
    pub fn script(path: impl Into<PathBuf>) -> Self {
        Self::from_spec(CommandSpec::script(path, ""))
    }

    fn from_spec(spec: CommandSpec) -> Self {
        Self {
            spec,
            config: Config::default(),
            launcher: Arc::new(NativeLauncher),
        }
    }

    /// Set the argument string, passed following host quoting rules
    pub fn arguments(mut self, arguments: impl Into<String>) -> Self {
        self.spec.arguments = arguments.into();
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Load layered configuration (see [`load_config`]) with `path` as the
    /// highest-priority file
    pub fn config_file(mut self, path: Option<&str>) -> Result<Self, ProcessError> {
        self.config = load_config(path).map_err(|e| ProcessError::Config {
            message: format!("{:#}", e),
        })?;
        Ok(self)
    }

    /// Set the working directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.launch.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.launch.env.insert(key.into(), value.into());
        self
    }

    /// Use a custom launcher instead of spawning native processes
    pub fn launcher(mut self, launcher: impl Launcher + 'static) -> Self {
        self.launcher = Arc::new(launcher);
        self
    }

    pub fn build(self) -> ProcessObservable {
        ProcessObservable {
            run: Arc::new(Run {
                spec: self.spec,
                config: self.config,
                launcher: self.launcher,
                lifecycle: Arc::new(Lifecycle::new()),
            }),
        }
    }
}

struct Run {
    spec: CommandSpec,
    config: Config,
    launcher: Arc<dyn Launcher>,
    lifecycle: Arc<Lifecycle>,
}

/// Lazily started process run producing an ordered [`ProcessSignal`] sequence
#[derive(Clone)]
pub struct ProcessObservable {
    run: Arc<Run>,
}

impl std::fmt::Debug for ProcessObservable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessObservable")
            .field("spec", &self.run.spec)
            .field("phase", &self.phase())
            .finish()
    }
}

impl ProcessObservable {
    /// Observable for an executable and an argument string
    pub fn create(executable: impl Into<PathBuf>, arguments: impl Into<String>) -> Self {
        ProcessBuilder::new(executable).arguments(arguments).build()
    }

    /// Observable for a script file (or executable) and an argument string
    pub fn from_file(path: impl Into<PathBuf>, arguments: impl Into<String>) -> Self {
        ProcessBuilder::script(path).arguments(arguments).build()
    }

    pub fn builder(executable: impl Into<PathBuf>) -> ProcessBuilder {
        ProcessBuilder::new(executable)
    }

    pub fn command(&self) -> &CommandSpec {
        &self.run.spec
    }

    /// Start the run and receive its signals
    ///
    /// Never fails: a launch failure yields a subscription that completes
    /// without signals and reports the error through
    /// [`Subscription::failure`].
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let run = &self.run;

        let started = run.lifecycle.start(tx, || {
            let resolved = run.spec.resolve(&run.config.scripts)?;
            run.launcher.launch(&resolved, &run.config.launch)
        });

        match started {
            Ok(()) => Subscription::new(rx, None, Some(Arc::clone(&run.lifecycle))),
            // Must not dispose the run that owns the first subscription
            Err(ProcessError::AlreadySubscribed) => {
                Subscription::new(rx, Some(ProcessError::AlreadySubscribed), None)
            }
            Err(e) => Subscription::new(rx, Some(e), Some(Arc::clone(&run.lifecycle))),
        }
    }

    /// Start the run and push every signal to `observer` on a background task
    ///
    /// See [`Subscription::observe`] for the behaviour outside a runtime.
    pub fn observe<F>(&self, observer: F) -> Observation
    where
        F: FnMut(ProcessSignal) + Send + 'static,
    {
        self.subscribe().observe(observer)
    }

    /// Start the run and aggregate it into one [`ProcessResult`](crate::ProcessResult)
    pub fn start_task(&self) -> ProcessTask {
        to_aggregate(self)
    }

    /// Dispose the run; idempotent and safe after completion
    pub fn dispose(&self) {
        self.run.lifecycle.dispose();
    }

    /// Dispose the run when `token` is cancelled
    ///
    /// The watcher ends on its own once the run completes. Outside a tokio
    /// runtime no watcher can be spawned: an already cancelled token disposes
    /// the run immediately, otherwise the token is ignored and `None` is
    /// returned.
    pub fn dispose_on(&self, token: CancellationToken) -> Option<JoinHandle<()>> {
        let lifecycle = Arc::clone(&self.run.lifecycle);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            if token.is_cancelled() {
                lifecycle.dispose();
            } else {
                tracing::warn!("No tokio runtime; dispose_on cannot watch the token");
            }
            return None;
        };

        let done = lifecycle.done();
        Some(runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => lifecycle.dispose(),
                _ = done.cancelled() => {}
            }
        }))
    }

    /// Wait until the run reaches a terminal phase
    pub async fn completed(&self) -> RunPhase {
        self.run.lifecycle.done().cancelled().await;
        self.phase()
    }

    pub fn phase(&self) -> RunPhase {
        self.run.lifecycle.phase()
    }

    pub fn process_id(&self) -> Option<u32> {
        self.run.lifecycle.process_id()
    }

    pub fn is_disposed(&self) -> bool {
        self.run.lifecycle.is_disposed()
    }
}

/// Consumer end of a run's signal sequence
///
/// Yields signals in emitter order and returns `None` once the sequence has
/// completed. Dropping an unfinished subscription disposes the run.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<ProcessSignal>,
    failure: Option<ProcessError>,
    lifecycle: Option<Arc<Lifecycle>>,
}

impl Subscription {
    fn new(
        receiver: mpsc::UnboundedReceiver<ProcessSignal>,
        failure: Option<ProcessError>,
        lifecycle: Option<Arc<Lifecycle>>,
    ) -> Self {
        Self {
            receiver,
            failure,
            lifecycle,
        }
    }

    /// Next signal, or `None` when the sequence has completed
    pub async fn recv(&mut self) -> Option<ProcessSignal> {
        self.receiver.recv().await
    }

    /// Next signal if one is already queued
    pub fn try_recv(&mut self) -> Result<ProcessSignal, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Launch failure, if the run could not be started
    pub fn failure(&self) -> Option<&ProcessError> {
        self.failure.as_ref()
    }

    pub fn take_failure(&mut self) -> Option<ProcessError> {
        self.failure.take()
    }

    /// Dispose the underlying run
    pub fn dispose(&self) {
        if let Some(lifecycle) = &self.lifecycle {
            lifecycle.dispose();
        }
    }

    /// Collect every remaining signal until completion
    pub async fn collect(mut self) -> Vec<ProcessSignal> {
        let mut signals = Vec::new();
        while let Some(signal) = self.recv().await {
            signals.push(signal);
        }
        signals
    }

    /// Push every signal to `observer` on a background task
    ///
    /// The returned [`Observation`] resolves with the launch failure (if
    /// any) once the sequence completes. Outside a tokio runtime nothing can
    /// be running, so the signals already queued are delivered on the calling
    /// thread and the observation is complete on return.
    pub fn observe<F>(mut self, mut observer: F) -> Observation
    where
        F: FnMut(ProcessSignal) + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Observation::spawned(runtime.spawn(async move {
                while let Some(signal) = self.recv().await {
                    observer(signal);
                }
                self.take_failure()
            })),
            Err(_) => {
                while let Ok(signal) = self.try_recv() {
                    observer(signal);
                }
                Observation::finished(self.take_failure())
            }
        }
    }
}

/// Completion of an observer started with [`Subscription::observe`]
///
/// Resolves to the launch failure, if any. A panic inside the observer is
/// resumed on the awaiting task.
#[must_use = "an Observation only reports the launch failure when awaited"]
pub struct Observation {
    state: ObservationState,
}

enum ObservationState {
    Spawned(JoinHandle<Option<ProcessError>>),
    Finished(Option<ProcessError>),
}

impl Observation {
    fn spawned(handle: JoinHandle<Option<ProcessError>>) -> Self {
        Self {
            state: ObservationState::Spawned(handle),
        }
    }

    fn finished(failure: Option<ProcessError>) -> Self {
        Self {
            state: ObservationState::Finished(failure),
        }
    }

    /// Whether the observer has already seen the whole sequence
    pub fn is_finished(&self) -> bool {
        match &self.state {
            ObservationState::Spawned(handle) => handle.is_finished(),
            ObservationState::Finished(_) => true,
        }
    }
}

impl Future for Observation {
    type Output = Option<ProcessError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            ObservationState::Spawned(handle) => match Pin::new(handle).poll(cx) {
                Poll::Ready(Ok(failure)) => Poll::Ready(failure),
                Poll::Ready(Err(e)) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                // Aborted by runtime shutdown: the sequence ended without a failure
                Poll::Ready(Err(_)) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
            ObservationState::Finished(failure) => Poll::Ready(failure.take()),
        }
    }
}

impl std::fmt::Debug for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observation")
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Stream for Subscription {
    type Item = ProcessSignal;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // No-op once the run has completed
        self.dispose();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_side_effect_free() {
        let observable = ProcessObservable::create("nonexistent_command_12345", "/fail");

        assert_eq!(observable.phase(), RunPhase::NotStarted);
        assert_eq!(observable.process_id(), None);
        assert_eq!(observable.command().arguments, "/fail");
    }

    #[test]
    fn test_builder_captures_configuration() {
        let observable = ProcessObservable::builder("make")
            .arguments("build")
            .current_dir("/tmp")
            .env("KEY", "value")
            .build();

        assert_eq!(observable.run.config.launch.working_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(
            observable.run.config.launch.env.get("KEY"),
            Some(&"value".to_string())
        );
        assert_eq!(observable.phase(), RunPhase::NotStarted);
    }

    #[test]
    fn test_builder_loads_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("procsignal.toml");
        std::fs::write(&path, "[launch]\nkill_on_dispose = false\n").unwrap();

        let observable = ProcessObservable::builder("make")
            .config_file(path.to_str())
            .unwrap()
            .build();

        assert!(!observable.run.config.launch.kill_on_dispose);
    }

    #[test]
    fn test_builder_reports_broken_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("procsignal.toml");
        std::fs::write(&path, "[launch]\nkill_on_dispose = \"sometimes\"\n").unwrap();

        let result = ProcessObservable::builder("make").config_file(path.to_str());

        match result {
            Err(e @ ProcessError::Config { .. }) => assert_eq!(e.error_type(), "config_error"),
            Err(other) => panic!("Expected Config error, got {:?}", other),
            Ok(_) => panic!("Expected Config error"),
        }
    }

    #[tokio::test]
    async fn test_subscribe_to_missing_executable() {
        let observable = ProcessObservable::create("nonexistent_command_12345", "");
        let mut subscription = observable.subscribe();

        assert!(matches!(
            subscription.failure(),
            Some(ProcessError::NotFound { .. })
        ));
        assert!(subscription.recv().await.is_none());
        assert_eq!(observable.phase(), RunPhase::LaunchFailed);
    }

    #[tokio::test]
    async fn test_dispose_before_subscribe() {
        let observable = ProcessObservable::create("nonexistent_command_12345", "");
        observable.dispose();
        observable.dispose();

        let signals = observable.subscribe().collect().await;

        assert_eq!(signals, vec![ProcessSignal::Disposed { process_id: None }]);
        assert!(observable.is_disposed());
    }

    #[tokio::test]
    async fn test_second_subscription_does_not_disturb_first() {
        let observable = ProcessObservable::create("nonexistent_command_12345", "");
        let _first = observable.subscribe();

        let second = observable.subscribe();
        assert_eq!(second.failure(), Some(&ProcessError::AlreadySubscribed));
        drop(second);

        assert_eq!(observable.phase(), RunPhase::LaunchFailed);
    }

    #[test]
    fn test_observe_without_runtime_reports_failure() {
        let observable = ProcessObservable::create("nonexistent_command_12345", "");
        let mut seen = Vec::new();
        let (tx, rx) = std::sync::mpsc::channel();

        let observation = observable.observe(move |signal| {
            let _ = tx.send(signal);
        });
        assert!(observation.is_finished());
        seen.extend(rx.try_iter());

        let failure = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(observation);

        assert!(seen.is_empty());
        match failure {
            Some(ProcessError::SpawnFailed { message, .. }) => assert!(message.contains("runtime")),
            other => panic!("Expected SpawnFailed, got {:?}", other),
        }
        assert_eq!(observable.phase(), RunPhase::LaunchFailed);
    }

    #[test]
    fn test_observe_without_runtime_delivers_queued_signals() {
        let observable = ProcessObservable::create("nonexistent_command_12345", "");
        observable.dispose();
        let (tx, rx) = std::sync::mpsc::channel();

        let observation = observable.observe(move |signal| {
            let _ = tx.send(signal);
        });

        assert!(observation.is_finished());
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![ProcessSignal::Disposed { process_id: None }]
        );
    }

    #[test]
    fn test_dispose_on_without_runtime() {
        let idle = ProcessObservable::create("nonexistent_command_12345", "");
        assert!(idle.dispose_on(CancellationToken::new()).is_none());
        assert_eq!(idle.phase(), RunPhase::NotStarted);

        let cancelled = ProcessObservable::create("nonexistent_command_12345", "");
        let token = CancellationToken::new();
        token.cancel();
        assert!(cancelled.dispose_on(token).is_none());
        assert!(cancelled.is_disposed());
    }

    #[tokio::test]
    async fn test_dispose_on_token() {
        let observable = ProcessObservable::create("nonexistent_command_12345", "");
        let token = CancellationToken::new();

        let watcher = observable.dispose_on(token.clone()).unwrap();
        token.cancel();
        watcher.await.unwrap();

        assert!(observable.is_disposed());
        assert_eq!(observable.completed().await, RunPhase::Disposed);
    }
}
