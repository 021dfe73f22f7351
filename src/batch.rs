//! Concurrent batch execution.
//!
//! Every source gets its own task; a semaphore caps how many run at once.
//! Tasks report over a channel and the coordinator's collector loop is the
//! only writer of the `BatchResult`, so counts always add up to the number of
//! resolved videos no matter how many tasks fail.

use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::VidscribeError;
use crate::pipeline::{Stage, StageTracker, TaskOutcome, TaskReport, VideoPipeline};
use crate::resolver::BatchJob;

/// A failed task, carrying the stage and source it failed on.
#[derive(Debug)]
pub struct TaskFailure {
    pub index: usize,
    pub source: PathBuf,
    pub stage: Stage,
    pub error: VidscribeError,
}

impl TaskFailure {
    /// The failure as a single error naming the stage and source.
    pub fn into_error(self) -> VidscribeError {
        VidscribeError::Task {
            path: self.source,
            stage: self.stage,
            source: Box::new(self.error),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (at {}): {}",
            self.source.display(),
            self.stage,
            self.error
        )
    }
}

#[derive(Debug, Default)]
pub struct BatchResult {
    pub succeeded: usize,
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<TaskFailure>,
}

impl BatchResult {
    fn record(&mut self, report: TaskReport) {
        match report.outcome {
            TaskOutcome::Done { output } => {
                self.succeeded += 1;
                self.outputs.push(output);
            }
            TaskOutcome::Failed { stage, error } => self.failures.push(TaskFailure {
                index: report.index,
                source: report.source,
                stage,
                error,
            }),
        }
    }

    fn finalize(&mut self) {
        self.outputs.sort();
        self.failures.sort_by_key(|failure| failure.index);
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self, elapsed: Duration) -> String {
        format!(
            "Processed {} videos successfully; {} failed in {:.2} seconds",
            self.succeeded,
            self.failed(),
            elapsed.as_secs_f64()
        )
    }
}

/// "N of M completed", readable from any thread while the batch runs.
#[derive(Debug, Clone)]
pub struct BatchProgress {
    completed: Arc<AtomicUsize>,
    total: usize,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            completed: Arc::new(AtomicUsize::new(0)),
            total,
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    fn tick(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }
}

pub struct BatchCoordinator {
    pipeline: Arc<VideoPipeline>,
    max_concurrent: usize,
    cancel_on_fatal: bool,
    show_progress: bool,
}

impl BatchCoordinator {
    pub fn new(pipeline: Arc<VideoPipeline>, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            max_concurrent: max_concurrent.max(1),
            cancel_on_fatal: true,
            show_progress: false,
        }
    }

    pub fn cancel_on_fatal(mut self, enabled: bool) -> Self {
        self.cancel_on_fatal = enabled;
        self
    }

    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    pub async fn run(&self, job: &BatchJob) -> BatchResult {
        self.run_with_progress(job, BatchProgress::new(job.len()))
            .await
    }

    /// Run every task of `job` and wait for all of them. Individual failures
    /// are collected in the result, never returned as an error.
    pub async fn run_with_progress(&self, job: &BatchJob, progress: BatchProgress) -> BatchResult {
        let run_id = Uuid::new_v4();
        let span = info_span!("batch", run_id = %run_id);
        self.execute(job, progress).instrument(span).await
    }

    async fn execute(&self, job: &BatchJob, progress: BatchProgress) -> BatchResult {
        let total = job.len();
        info!(
            "Processing {} videos with up to {} at a time",
            total, self.max_concurrent
        );

        let bar = self.progress_bar(total);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let (tx, mut rx) = mpsc::channel::<TaskReport>(self.max_concurrent);
        let mut handles = Vec::with_capacity(total);

        for (index, source) in job.sources.iter().cloned().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            let task_source = source.clone();
            let tracker = StageTracker::new();
            let task_tracker = tracker.clone();

            let handle = tokio::spawn(
                async move {
                    let report = match semaphore.acquire_owned().await {
                        Ok(permit) => {
                            let report =
                                pipeline.run_tracked(index, task_source, task_tracker).await;
                            drop(permit);
                            report
                        }
                        Err(_) => TaskReport {
                            index,
                            source: task_source,
                            outcome: TaskOutcome::Failed {
                                stage: Stage::Pending,
                                error: VidscribeError::Aborted("worker pool closed".to_string()),
                            },
                        },
                    };

                    if tx.send(report).await.is_err() {
                        error!("Batch collector stopped before task {} reported", index);
                    }
                }
                .in_current_span(),
            );
            handles.push((index, source, tracker, handle));
        }

        // The channel closes once every task has reported or died.
        drop(tx);

        let mut result = BatchResult::default();
        let mut reported = vec![false; total];

        while let Some(report) = rx.recv().await {
            reported[report.index] = true;
            self.observe(&report);
            result.record(report);

            let done = progress.tick();
            bar.set_position(done as u64);
        }

        for (index, source, tracker, handle) in handles {
            if let Err(e) = handle.await {
                if reported[index] {
                    continue;
                }
                let stage = tracker.get();
                error!("Task for {} aborted at {}: {}", source.display(), stage, e);
                result.record(TaskReport {
                    index,
                    source,
                    outcome: TaskOutcome::Failed {
                        stage,
                        error: VidscribeError::Aborted(e.to_string()),
                    },
                });
                let done = progress.tick();
                bar.set_position(done as u64);
            }
        }

        result.finalize();
        bar.finish_with_message(format!("{} done, {} failed", result.succeeded, result.failed()));
        info!(
            "Batch finished: {} succeeded, {} failed",
            result.succeeded,
            result.failed()
        );
        result
    }

    fn observe(&self, report: &TaskReport) {
        match &report.outcome {
            TaskOutcome::Done { .. } => {
                debug!("Collected result for {}", report.source.display())
            }
            TaskOutcome::Failed { error, .. } => {
                if self.cancel_on_fatal && error.is_fatal_for_batch() {
                    warn!("Cancelling remaining videos");
                    self.pipeline.cancel_signal().cancel(error.to_string());
                }
            }
        }
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} videos {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar
    }
}
