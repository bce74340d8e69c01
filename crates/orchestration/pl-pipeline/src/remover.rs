//! Local-copy removal after successful replication.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use pl_error::PelicanError;
use pl_fs::stat_if_exists;
use pl_types::MarkerResult;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::stats::PipelineStats;

/// The set of local paths eligible for deletion: the marker itself plus the
/// source of every outcome reported by an errorless backend. Deduplicated
/// and sorted lexically, so removal order is stable.
pub fn removal_set(result: &MarkerResult) -> Vec<PathBuf> {
    let mut unique: BTreeSet<PathBuf> = BTreeSet::new();
    unique.insert(result.marker_path.clone());

    for backend_result in result.results.values() {
        if backend_result.error.is_some() {
            continue;
        }
        for outcome in &backend_result.outcomes {
            unique.insert(outcome.src.clone());
        }
    }

    unique.into_iter().collect()
}

/// Consumes marker results and deletes the local copies of fully replicated
/// groups.
///
/// A result carrying an error forwards the error and deletes nothing: the
/// marker and its data files stay on disk for the next scan to retry, which
/// is where the at-least-once property comes from. Individual delete
/// failures are surfaced but do not stop the remaining paths.
pub struct Remover {
    id: String,
    stats: Arc<PipelineStats>,
}

impl Remover {
    pub fn new(id: impl Into<String>, stats: Arc<PipelineStats>) -> Self {
        Self {
            id: id.into(),
            stats,
        }
    }

    /// Drain `results` until the channel closes or `cancel` fires.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        mut results: mpsc::Receiver<MarkerResult>,
        errors: mpsc::Sender<PelicanError>,
    ) {
        loop {
            // Cancellation wins over a queued result.
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(remover = %self.id, "context canceled, stopping file removal");
                    return;
                }
                result = results.recv() => result,
            };
            let Some(mut result) = result else { return };

            if let Some(err) = result.error.take() {
                warn!(
                    remover = %self.id,
                    marker = %result.marker_path.display(),
                    trace_id = %result.trace_id,
                    "storage sync failed, skipping file removal"
                );
                if self.emit(cancel, &errors, err).await.is_err() {
                    return;
                }
                continue;
            }

            let paths = removal_set(&result);
            info!(
                remover = %self.id,
                marker = %result.marker_path.display(),
                trace_id = %result.trace_id,
                local_files = ?paths,
                "marker file processed, removing local copies"
            );

            for path in paths {
                match stat_if_exists(&path).await {
                    Ok(Some(_)) => {}
                    _ => continue,
                }
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        self.stats.record_file_removed();
                        info!(
                            remover = %self.id,
                            path = %path.display(),
                            trace_id = %result.trace_id,
                            "removed local file after successful upload"
                        );
                    }
                    Err(err) => {
                        warn!(
                            remover = %self.id,
                            path = %path.display(),
                            error = %err,
                            "failed to remove file"
                        );
                        let remove_err = PelicanError::Remove {
                            path: path.clone(),
                            message: err.to_string(),
                        };
                        if self.emit(cancel, &errors, remove_err).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn emit(
        &self,
        cancel: &CancellationToken,
        errors: &mpsc::Sender<PelicanError>,
        err: PelicanError,
    ) -> Result<(), ()> {
        tokio::select! {
            sent = errors.send(err) => sent.map_err(|_| ()),
            _ = cancel.cancelled() => Err(()),
        }
    }
}
