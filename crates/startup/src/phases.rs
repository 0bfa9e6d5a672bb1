//! Ordered startup phases.
//!
//! A [`PhaseScheduler`] holds phases of named [`Task`]s. Tasks of one phase
//! run concurrently; the next phase starts once every task of the current
//! one has finished. Startup is best-effort: a failing (or panicking) task
//! is reported, counted as finished and recorded in the [`StartupReport`],
//! and later phases still run.

use crate::error::{ErrorKind, Result};
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::instrument;

type Init<S> = Box<dyn Fn(Arc<S>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A named unit of startup work.
pub struct Task<S> {
    name: String,
    init: Init<S>,
}

impl<S> Task<S> {
    pub fn new<F, Fut>(name: impl Into<String>, init: F) -> Self
    where
        F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            init: Box::new(move |state| init(state).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<S> std::fmt::Debug for Task<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Task").field(&self.name).finish()
    }
}

/// Which tasks finished cleanly and which did not.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StartupReport {
    pub completed: Vec<String>,
    pub failed: Vec<String>,
}

impl StartupReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct PhaseScheduler<S> {
    phases: Vec<Vec<Task<S>>>,
}

impl<S> Default for PhaseScheduler<S> {
    fn default() -> Self {
        Self { phases: Vec::new() }
    }
}

impl<S> std::fmt::Debug for PhaseScheduler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseScheduler").field("phases", &self.phases).finish()
    }
}

impl<S> PhaseScheduler<S>
where
    S: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a phase that runs after every phase added before it.
    pub fn phase(mut self, tasks: impl IntoIterator<Item = Task<S>>) -> Self {
        self.phases.push(tasks.into_iter().collect());
        self
    }

    pub fn task_count(&self) -> usize {
        self.phases.iter().map(Vec::len).sum()
    }

    #[instrument(skip_all, fields(phases = self.phases.len(), tasks = self.task_count()))]
    pub async fn run(&self, state: Arc<S>) -> StartupReport {
        let total = self.task_count();
        let mut finished = 0usize;
        let mut summary = StartupReport::default();

        for (index, phase) in self.phases.iter().enumerate() {
            tracing::info!(phase = index, tasks = phase.len(), "starting phase");
            let mut running = phase
                .iter()
                .map(|task| {
                    tracing::debug!(task = %task.name, "launching task");
                    let state = Arc::clone(&state);
                    // The init call itself runs inside the guard: a panic while
                    // building the future counts the same as one while polling it.
                    let launched = AssertUnwindSafe(async move { (task.init)(state).await }).catch_unwind();
                    async move { (task.name.as_str(), launched.await) }
                })
                .collect::<FuturesUnordered<_>>();

            while let Some((name, outcome)) = running.next().await {
                finished += 1;
                match outcome {
                    Ok(Ok(())) => summary.completed.push(name.to_string()),
                    Ok(Err(err)) => {
                        larder_persist::report(&err);
                        summary.failed.push(name.to_string());
                    }
                    Err(payload) => {
                        let err = exn::Exn::from(ErrorKind::Panicked {
                            task: name.to_string(),
                            message: panic_message(payload.as_ref()),
                        });
                        larder_persist::report(&err);
                        summary.failed.push(name.to_string());
                    }
                }
                let percent = finished as f64 * 100.0 / total as f64;
                tracing::info!(task = name, "Initialisation is {percent:.1}% complete");
            }
        }
        summary
    }
}

/// The text of a panic raised with a string literal or a formatted message.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
