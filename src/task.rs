//! Task aggregator
//!
//! Bridges a run's signal sequence into a single awaited [`ProcessResult`].
//! The result is resolved exactly once, when the sequence completes, and
//! awaiting it never fails: launch failures land in [`ProcessResult::error`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::ProcessError;
use crate::observable::{ProcessObservable, Subscription};
use crate::signal::{ProcessResult, RunPhase};

/// Subscribe to `observable` and fold its sequence into one result
///
/// Starts the run immediately. The fold runs on a background task; the
/// returned [`ProcessTask`] resolves when the sequence completes.
pub fn to_aggregate(observable: &ProcessObservable) -> ProcessTask {
    let subscription = observable.subscribe();
    let (tx, rx) = oneshot::channel();

    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                let _ = tx.send(aggregate(subscription).await);
            });
        }
        Err(_) => {
            // Without a runtime the run never started; its failure is already known
            let _ = tx.send(fold_failed(subscription));
        }
    }

    ProcessTask {
        receiver: rx,
        observable: observable.clone(),
    }
}

/// Fold a subscription into a result, consuming it to completion
pub async fn aggregate(mut subscription: Subscription) -> ProcessResult {
    let mut result = ProcessResult::default();
    while let Some(signal) = subscription.recv().await {
        result.apply(signal);
    }
    result.error = subscription.take_failure();
    result
}

fn fold_failed(mut subscription: Subscription) -> ProcessResult {
    let mut result = ProcessResult::default();
    while let Ok(signal) = subscription.try_recv() {
        result.apply(signal);
    }
    result.error = subscription.take_failure();
    result
}

/// Awaitable handle to an aggregated run
#[must_use = "a ProcessTask does nothing visible unless awaited"]
pub struct ProcessTask {
    receiver: oneshot::Receiver<ProcessResult>,
    observable: ProcessObservable,
}

impl ProcessTask {
    /// Dispose the underlying run; the task then resolves with `is_disposed`
    pub fn dispose(&self) {
        self.observable.dispose();
    }

    pub fn phase(&self) -> RunPhase {
        self.observable.phase()
    }

    pub fn observable(&self) -> &ProcessObservable {
        &self.observable
    }
}

impl Future for ProcessTask {
    type Output = ProcessResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let polled = Pin::new(&mut self.receiver).poll(cx);
        match polled {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The aggregating task was torn down (runtime shutdown)
            Poll::Ready(Err(_)) => Poll::Ready(ProcessResult::failed(ProcessError::SpawnFailed {
                program: self
                    .observable
                    .command()
                    .source
                    .path()
                    .to_string_lossy()
                    .into_owned(),
                message: "result aggregation was aborted".to_string(),
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for ProcessTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTask")
            .field("observable", &self.observable)
            .finish_non_exhaustive()
    }
}
