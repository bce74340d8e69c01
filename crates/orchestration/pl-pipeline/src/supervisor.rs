//! Pipeline supervisor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pl_error::{PelicanError, PipelineError, Result};
use pl_fs::sleep_cancellable;
use pl_scanner::Scanner;
use pl_traits::StorageBackend;
use pl_types::config::PipelineConfig;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::processor::Processor;
use crate::stats::{PipelineStats, StatsSnapshot};

/// Depth of the pipeline error channel; drained concurrently with the
/// workers, so it only needs to absorb bursts.
const ERROR_QUEUE_DEPTH: usize = 16;

/// One scan→match→replicate→remove pipeline.
///
/// Owns a scanner and N processor workers sharing the backend handler
/// instances. Each scan cycle streams hits into a queue the workers drain;
/// cycle errors are collected from a shared sink. With `stopOnError` a cycle
/// that surfaced at least one error ends the pipeline with an error,
/// letting the process cancel its siblings.
pub struct Pipeline {
    name: String,
    stop_on_error: bool,
    scan_interval: Duration,
    scanner: Scanner,
    processors: Vec<Processor>,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    /// Wire a pipeline from its configuration and the backends built for
    /// it. Backend instances are shared by all workers.
    pub fn from_config(
        config: &PipelineConfig,
        backends: Vec<Arc<dyn StorageBackend>>,
    ) -> Result<Self> {
        let scanner = Scanner::new(
            format!("scanner-{}", config.name),
            &config.scanner.directory,
            &config.scanner.pattern,
            config.scanner.batch_size,
        )?;

        let stats = Arc::new(PipelineStats::new());
        let processors = (0..config.processor.max_processors.max(1))
            .map(|i| {
                Processor::new(
                    format!("processor-{i}-{}", config.name),
                    backends.clone(),
                    &config.processor,
                    stats.clone(),
                )
            })
            .collect();

        Ok(Self {
            name: config.name.clone(),
            stop_on_error: config.stop_on_error,
            scan_interval: config.scanner.interval,
            scanner,
            processors,
            stats,
        })
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Counters shared with this pipeline's workers.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Run scan cycles until cancellation, or once when `poll` is off.
    pub async fn run(&self, cancel: CancellationToken, poll: bool) -> Result<()> {
        info!(
            pipeline = %self.name,
            workers = self.processors.len(),
            scan_interval = ?self.scan_interval,
            "pipeline started"
        );

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let errors = self.run_cycle(&cancel).await;

            if errors > 0 && self.stop_on_error {
                return Err(PipelineError::Stopped(self.name.clone()).into());
            }

            if !poll {
                debug!(pipeline = %self.name, "polling disabled, exiting pipeline");
                return Ok(());
            }

            if !sleep_cancellable(&cancel, self.scan_interval).await {
                return Ok(());
            }
        }
    }

    /// One scan cycle: scanner feeds the shared queue, workers drain it,
    /// the error sink is drained concurrently. Returns the number of
    /// non-cancellation errors observed.
    async fn run_cycle(&self, cancel: &CancellationToken) -> u64 {
        let started = Instant::now();
        let (err_tx, mut err_rx) = mpsc::channel::<PelicanError>(ERROR_QUEUE_DEPTH);

        let hits = self.scanner.scan(cancel.clone(), err_tx.clone());
        let queue = Arc::new(Mutex::new(hits));

        let workers = futures::future::join_all(self.processors.iter().map(|processor| {
            processor.process(cancel.clone(), queue.clone(), err_tx.clone())
        }));
        drop(err_tx);

        let drain = async {
            let mut count = 0u64;
            while let Some(err) = err_rx.recv().await {
                if err.is_canceled() {
                    continue;
                }
                count += 1;
                self.stats.record_error();
                error!(pipeline = %self.name, error = %err, "error occurred in pipeline");
            }
            count
        };

        let (_, errors) = tokio::join!(workers, drain);

        let snapshot = self.stats.snapshot();
        info!(
            pipeline = %self.name,
            elapsed = ?started.elapsed(),
            markers_seen = snapshot.markers_seen,
            markers_uploaded = snapshot.markers_uploaded,
            markers_failed = snapshot.markers_failed,
            files_replicated = snapshot.files_replicated,
            bytes_replicated = snapshot.bytes_replicated,
            files_removed = snapshot.files_removed,
            cycle_errors = errors,
            "scan cycle finished"
        );

        errors
    }
}
