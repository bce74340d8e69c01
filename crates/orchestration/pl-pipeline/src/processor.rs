//! Processor workers: the per-marker state machine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pl_error::PelicanError;
use pl_fs::stat_if_exists;
use pl_traits::StorageBackend;
use pl_types::config::{FileMatcherConfig, ProcessorConfig};
use pl_types::{MarkerResult, ScanHit};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::readiness::{wait_until_ready, MarkerCheck};
use crate::remover::Remover;
use crate::stats::PipelineStats;

/// Marker queue shared by all workers of one pipeline. Whichever worker is
/// idle takes the lock and pulls the next hit.
pub type SharedMarkerQueue = Arc<Mutex<mpsc::Receiver<ScanHit>>>;

/// Depth of the processor → remover channel.
const RESULT_QUEUE_DEPTH: usize = 16;

/// One worker of a pipeline's processor pool.
///
/// A worker pulls markers from the shared queue and walks each through the
/// state machine: a vanished marker is dropped, the readiness gate runs
/// (best-effort), matchers resolve the candidate set, every backend
/// replicates it concurrently, and the aggregated result feeds the
/// worker's remover. Backend fan-out is bounded by the number of backends,
/// so a pipeline runs at most workers × backends put batches at once.
pub struct Processor {
    id: String,
    backends: Vec<Arc<dyn StorageBackend>>,
    matchers: Vec<FileMatcherConfig>,
    flush_delay: Duration,
    check: MarkerCheck,
    remover: Remover,
    stats: Arc<PipelineStats>,
}

impl Processor {
    pub fn new(
        id: impl Into<String>,
        backends: Vec<Arc<dyn StorageBackend>>,
        config: &ProcessorConfig,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let id = id.into();
        Self {
            remover: Remover::new(format!("remover-{id}"), stats.clone()),
            id,
            backends,
            matchers: config.file_matcher_configs.clone(),
            flush_delay: config.flush_delay,
            check: MarkerCheck::from(&config.marker_check_config),
            stats,
        }
    }

    /// Unique identifier of this worker.
    pub fn info(&self) -> &str {
        &self.id
    }

    /// Consume markers until the queue drains or `cancel` fires. Completed
    /// results flow into this worker's remover; errors into `errors`.
    pub async fn process(
        &self,
        cancel: CancellationToken,
        markers: SharedMarkerQueue,
        errors: mpsc::Sender<PelicanError>,
    ) {
        debug!(processor = %self.id, "processor starting");

        let (results_tx, results_rx) = mpsc::channel(RESULT_QUEUE_DEPTH);

        let upload = async {
            loop {
                let hit = {
                    let mut queue = markers.lock().await;
                    // Cancellation wins over a queued marker.
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        hit = queue.recv() => hit,
                    }
                };
                let Some(hit) = hit else { break };

                self.stats.record_marker_seen();
                if let Some(result) = self.process_marker(&cancel, hit).await {
                    tokio::select! {
                        sent = results_tx.send(result) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                        _ = cancel.cancelled() => break,
                    }
                }

                if cancel.is_cancelled() {
                    warn!(processor = %self.id, "context canceled, stopping marker intake");
                    break;
                }
            }
            drop(results_tx);
        };

        let remove = self.remover.run(&cancel, results_rx, errors);

        tokio::join!(upload, remove);
        debug!(processor = %self.id, "processing stopped");
    }

    async fn process_marker(
        &self,
        cancel: &CancellationToken,
        hit: ScanHit,
    ) -> Option<MarkerResult> {
        // A producer may have withdrawn the marker since discovery.
        match stat_if_exists(&hit.path).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(
                    processor = %self.id,
                    marker = %hit.path.display(),
                    trace_id = %hit.trace_id,
                    "marker vanished before processing, dropping"
                );
                return None;
            }
            Err(err) => {
                warn!(
                    processor = %self.id,
                    marker = %hit.path.display(),
                    error = %err,
                    "failed to stat marker, dropping"
                );
                return None;
            }
        }

        let size = match wait_until_ready(cancel, &hit, self.flush_delay, &self.check).await {
            Ok(size) => size,
            Err(err) if err.is_canceled() => return None,
            Err(err) => {
                warn!(
                    processor = %self.id,
                    marker = %hit.path.display(),
                    trace_id = %hit.trace_id,
                    error = %err,
                    "failed to wait for marker file to be ready, skipping upload"
                );
                return None;
            }
        };

        let candidates = match self.upload_candidates(&hit) {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(
                    processor = %self.id,
                    marker = %hit.path.display(),
                    trace_id = %hit.trace_id,
                    error = %err,
                    "failed to prepare upload candidates, skipping upload"
                );
                return None;
            }
        };

        info!(
            processor = %self.id,
            marker = %hit.path.display(),
            trace_id = %hit.trace_id,
            marker_file_size = size,
            candidates = candidates.len(),
            "processing marker file"
        );

        // One put task per backend; the channel closes once every clone of
        // the sender is dropped, ending aggregation.
        let (tx, mut rx) = mpsc::channel(self.backends.len().max(1));
        for backend in &self.backends {
            let backend = backend.clone();
            let cancel = cancel.clone();
            let hit = hit.clone();
            let candidates = candidates.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                backend.put(cancel, hit, candidates, tx).await;
            });
        }
        drop(tx);

        let mut result = MarkerResult::new(hit.path.clone(), hit.trace_id.clone());
        while let Some(backend_result) = rx.recv().await {
            if backend_result.error.is_none() {
                let files = backend_result.outcomes.len() as u64;
                let bytes = backend_result.outcomes.iter().map(|o| o.size).sum();
                self.stats.record_replicated(files, bytes);
            }
            result.absorb(backend_result);
        }

        if result.is_success() {
            self.stats.record_marker_uploaded();
        } else {
            self.stats.record_marker_failed();
            warn!(
                processor = %self.id,
                marker = %hit.path.display(),
                trace_id = %hit.trace_id,
                "one or more storage sync operations failed"
            );
        }

        Some(result)
    }

    /// Run the configured matchers in order and concatenate their outputs.
    /// The marker reaches the candidate set only through a matcher whose
    /// patterns cover its extension.
    fn upload_candidates(&self, hit: &ScanHit) -> Result<Vec<PathBuf>, PelicanError> {
        let mut candidates = Vec::new();
        for config in &self.matchers {
            let matcher = pl_matcher::for_kind(config.matcher_type);
            let matches = matcher.match_files(&hit.path, config)?;
            debug!(
                processor = %self.id,
                marker = %hit.path.display(),
                matcher = %config.matcher_type,
                matches = matches.len(),
                "matcher results"
            );
            candidates.extend(matches);
        }
        Ok(candidates)
    }
}
