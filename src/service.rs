use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use crate::events::WatchBatch;
use crate::filter::ReceiptFilter;
use crate::pipeline::{PipelineError, ReceiptOutcome, ReceiptPipeline};
use crate::watcher::{DirectoryWatcher, WatchPoll};

/// Counters reported when the watch loop ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSummary {
    pub batches: usize,
    pub overflows: usize,
    pub ignored: usize,
    pub processed: usize,
    pub failed: usize,
}

/// Feeds batches through the filter and the pipeline, one event at a time.
pub struct Dispatcher {
    filter: ReceiptFilter,
    pipeline: ReceiptPipeline,
    halt_on_backend_error: bool,
    summary: ServiceSummary,
}

impl Dispatcher {
    pub fn new(filter: ReceiptFilter, pipeline: ReceiptPipeline) -> Self {
        let halt_on_backend_error = pipeline.config().halt_on_backend_error;
        Self {
            filter,
            pipeline,
            halt_on_backend_error,
            summary: ServiceSummary::default(),
        }
    }

    pub fn summary(&self) -> ServiceSummary {
        self.summary
    }

    /// Processes every event of `batch` in order. Returns the outcomes of the
    /// files that completed; stops at the first backend error when those halt.
    /// Other failures only end the file they happened on.
    pub fn dispatch(&mut self, batch: WatchBatch) -> Result<Vec<ReceiptOutcome>, PipelineError> {
        self.summary.batches += 1;
        let mut outcomes = Vec::new();

        for event in batch.events {
            if event.is_overflow() {
                self.summary.overflows += 1;
                tracing::debug!("Dropping overflow notification for {}", batch.dir.display());
                continue;
            }

            let Some(file) = self.filter.qualify(event) else {
                self.summary.ignored += 1;
                continue;
            };

            match self.pipeline.process(&file) {
                Ok(outcome) => {
                    self.summary.processed += 1;
                    outcomes.push(outcome);
                }
                Err(err) => {
                    self.summary.failed += 1;
                    if self.halt_on_backend_error && err.is_backend() {
                        return Err(err);
                    }
                    tracing::error!("Skipping {}: {}", file.path.display(), err);
                }
            }
        }

        Ok(outcomes)
    }
}

/// The main loop: watch, filter, process, until interrupted or nothing is left to watch.
pub struct WatchService {
    watcher: DirectoryWatcher,
    dispatcher: Dispatcher,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
}

impl WatchService {
    pub fn new(watcher: DirectoryWatcher, dispatcher: Dispatcher, poll_interval: Duration, running: Arc<AtomicBool>) -> Self {
        Self {
            watcher,
            dispatcher,
            poll_interval,
            running,
        }
    }

    pub fn run(&mut self) -> Result<ServiceSummary> {
        tracing::info!("Listening to Directory {}...", self.watcher.root().display());

        while self.running.load(Ordering::SeqCst) {
            match self.watcher.poll(self.poll_interval) {
                WatchPoll::Idle => continue,
                WatchPoll::Closed => {
                    tracing::info!("No accessible directories left to watch");
                    break;
                }
                WatchPoll::Batches(batches) => {
                    for batch in batches {
                        self.dispatcher.dispatch(batch)?;
                    }
                }
            }
        }

        Ok(self.dispatcher.summary())
    }
}
