//! Concurrent dispatcher
//!
//! Spawns one worker task per target. Each worker runs the whole pipeline
//! (resolve, decode, compile, load) on its own connection and sends exactly
//! one [`LoadOutcome`] into a shared channel. A join task waits for every
//! worker and only then fires the completion signal, so the summary always
//! arrives after the last outcome.
//!
//! A failing target never cancels its siblings.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::LoadConfig;
use crate::connection::ConnectionFactory;
use crate::error::{Error, Result};
use crate::loader::{LoadReport, TransactionalLoader};
use crate::query::LoadPlan;
use crate::source::Target;

/// Terminal status of one target
#[derive(Debug)]
pub enum LoadStatus {
    /// Committed
    Done(LoadReport),
    /// Abandoned, transaction rolled back if one was open
    Failed(Error),
}

/// Result reported exactly once per target
#[derive(Debug)]
pub struct LoadOutcome {
    /// Source path of the target
    pub source: PathBuf,
    /// Table name of the target
    pub table: String,
    /// Terminal status
    pub status: LoadStatus,
}

impl LoadOutcome {
    /// Whether the target committed
    pub fn is_done(&self) -> bool {
        matches!(self.status, LoadStatus::Done(_))
    }

    /// The failure, if any
    pub fn error(&self) -> Option<&Error> {
        match &self.status {
            LoadStatus::Failed(e) => Some(e),
            LoadStatus::Done(_) => None,
        }
    }

    /// `Done: <table>` or `Failed: <table> <error>`
    pub fn report_line(&self) -> String {
        match &self.status {
            LoadStatus::Done(_) => format!("Done: {}", self.table),
            LoadStatus::Failed(e) => format!("Failed: {} {}", self.table, e),
        }
    }
}

/// Totals delivered with the completion signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Targets committed
    pub done: usize,
    /// Targets failed
    pub failed: usize,
}

impl DispatchSummary {
    /// Total targets
    pub fn total(&self) -> usize {
        self.done + self.failed
    }

    /// Whether every target committed
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Final completion line
    pub fn completion_line(&self) -> String {
        format!("masterload: {} done, {} failed", self.done, self.failed)
    }
}

/// Handle over a running dispatch
pub struct Dispatch {
    outcomes: mpsc::UnboundedReceiver<LoadOutcome>,
    finished: oneshot::Receiver<DispatchSummary>,
}

impl Dispatch {
    /// Next outcome in completion order.
    ///
    /// Returns `None` once every worker has reported.
    pub async fn next_outcome(&mut self) -> Option<LoadOutcome> {
        self.outcomes.recv().await
    }

    /// Wait for the completion signal.
    ///
    /// Outcomes not yet taken with [`next_outcome`](Self::next_outcome) are
    /// discarded.
    pub async fn finished(self) -> Result<DispatchSummary> {
        self.finished
            .await
            .map_err(|_| Error::internal("dispatcher join task dropped"))
    }
}

/// Runs targets concurrently
#[derive(Clone)]
pub struct Dispatcher {
    factory: Arc<dyn ConnectionFactory>,
    config: Arc<LoadConfig>,
}

impl Dispatcher {
    /// Create a dispatcher. `config` is shared read-only by every worker.
    pub fn new(factory: Arc<dyn ConnectionFactory>, config: LoadConfig) -> Self {
        Self {
            factory,
            config: Arc::new(config),
        }
    }

    /// Load policy
    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Build targets from paths with the configured extensions and dispatch.
    ///
    /// A path that does not name a table becomes a failed outcome.
    pub fn dispatch_paths<P: AsRef<Path>>(&self, paths: &[P]) -> Dispatch {
        let prepared = paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                Target::with_extensions(path, self.config.extensions.iter().cloned())
                    .map_err(|e| (path.to_path_buf(), e))
            })
            .collect();
        self.spawn_all(prepared)
    }

    /// Dispatch prepared targets
    pub fn dispatch(&self, targets: Vec<Target>) -> Dispatch {
        self.spawn_all(targets.into_iter().map(Ok).collect())
    }

    /// Dispatch and feed each outcome to `on_outcome` as it arrives
    pub async fn run<F>(&self, targets: Vec<Target>, mut on_outcome: F) -> Result<DispatchSummary>
    where
        F: FnMut(&LoadOutcome),
    {
        let mut dispatch = self.dispatch(targets);
        while let Some(outcome) = dispatch.next_outcome().await {
            on_outcome(&outcome);
        }
        dispatch.finished().await
    }

    fn spawn_all(&self, prepared: Vec<std::result::Result<Target, (PathBuf, Error)>>) -> Dispatch {
        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();

        let mut workers: Vec<(PathBuf, String, JoinHandle<bool>)> = Vec::with_capacity(prepared.len());
        for entry in prepared {
            let target = match entry {
                Ok(target) => target,
                Err((source, e)) => {
                    let table = source.display().to_string();
                    let outcome = LoadOutcome {
                        source: source.clone(),
                        table: table.clone(),
                        status: LoadStatus::Failed(e),
                    };
                    let handle = spawn_report(tx.clone(), outcome);
                    workers.push((source, table, handle));
                    continue;
                }
            };

            let source = target.source().to_path_buf();
            let table = target.table_name().to_string();
            let span = info_span!("target", table = %table);
            let factory = Arc::clone(&self.factory);
            let config = Arc::clone(&self.config);
            let tx = tx.clone();

            let handle = tokio::spawn(
                async move {
                    let outcome = run_target(target, factory, config).await;
                    let done = outcome.is_done();
                    let _ = tx.send(outcome);
                    done
                }
                .instrument(span),
            );
            workers.push((source, table, handle));
        }

        info!(targets = workers.len(), "Dispatched targets");
        tokio::spawn(join_workers(workers, tx, done_tx));

        Dispatch {
            outcomes: rx,
            finished: done_rx,
        }
    }
}

fn spawn_report(tx: mpsc::UnboundedSender<LoadOutcome>, outcome: LoadOutcome) -> JoinHandle<bool> {
    tokio::spawn(async move {
        let done = outcome.is_done();
        let _ = tx.send(outcome);
        done
    })
}

async fn join_workers(
    workers: Vec<(PathBuf, String, JoinHandle<bool>)>,
    tx: mpsc::UnboundedSender<LoadOutcome>,
    done_tx: oneshot::Sender<DispatchSummary>,
) {
    let mut summary = DispatchSummary::default();

    let (targets, handles): (Vec<_>, Vec<_>) = workers
        .into_iter()
        .map(|(source, table, handle)| ((source, table), handle))
        .unzip();
    let results = futures::future::join_all(handles).await;

    for ((source, table), result) in targets.into_iter().zip(results) {
        match result {
            Ok(true) => summary.done += 1,
            Ok(false) => summary.failed += 1,
            Err(join_err) => {
                // Worker died before reporting
                error!(table = %table, error = %join_err, "Worker task failed");
                summary.failed += 1;
                let _ = tx.send(LoadOutcome {
                    source,
                    table,
                    status: LoadStatus::Failed(Error::internal(format!(
                        "worker task failed: {}",
                        join_err
                    ))),
                });
            }
        }
    }

    // Close the outcome stream before signalling completion
    drop(tx);
    info!(done = summary.done, failed = summary.failed, "All targets finished");
    let _ = done_tx.send(summary);
}

async fn run_target(
    target: Target,
    factory: Arc<dyn ConnectionFactory>,
    config: Arc<LoadConfig>,
) -> LoadOutcome {
    let source = target.source().to_path_buf();
    let table = target.table_name().to_string();
    info!(source = %source.display(), "Loading target");

    let status = match compile(target, config).await {
        Ok(plan) => {
            let mut loader = TransactionalLoader::new(factory);
            match loader.run(&plan).await {
                Ok(report) => LoadStatus::Done(report),
                Err(e) => {
                    warn!(state = %loader.state(), error = %e, "Target failed");
                    LoadStatus::Failed(e)
                }
            }
        }
        Err(e) => {
            warn!(category = %e.category(), error = %e, "Target failed before loading");
            LoadStatus::Failed(e)
        }
    };

    LoadOutcome {
        source,
        table,
        status,
    }
}

/// Decoding and compilation are file-bound, so they run off the async workers
async fn compile(target: Target, config: Arc<LoadConfig>) -> Result<LoadPlan> {
    tokio::task::spawn_blocking(move || LoadPlan::compile(&target, &config))
        .await
        .map_err(|e| Error::internal(format!("compile task failed: {}", e)))?
}
