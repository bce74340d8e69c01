//! Marker-file scanner.
//!
//! A scanner wraps the bounded walker and streams every regular file whose
//! final extension equals the configured marker pattern. The walk runs on a
//! blocking task; hits flow through a bounded channel, so a full queue
//! exerts backpressure on the traversal while all workers are busy.

use std::io;
use std::path::{Path, PathBuf};

use pl_error::{PelicanError, ScanError};
use pl_fs::{file_extension, WalkDecision, Walker};
use pl_types::config::is_valid_marker_pattern;
use pl_types::ScanHit;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Depth of the scanner → processor channel.
const SCAN_QUEUE_DEPTH: usize = 16;

/// Streams marker files found below a scan root.
pub struct Scanner {
    id: String,
    directory: PathBuf,
    pattern: String,
    batch_size: usize,
}

impl Scanner {
    /// Create a scanner.
    ///
    /// `pattern` must be a plain dot-prefixed extension (or empty to match
    /// everything); wildcard characters are rejected here rather than at
    /// scan time.
    pub fn new(
        id: impl Into<String>,
        directory: impl Into<PathBuf>,
        pattern: impl Into<String>,
        batch_size: usize,
    ) -> Result<Self, ScanError> {
        let pattern = pattern.into();
        if !is_valid_marker_pattern(&pattern) {
            return Err(ScanError::InvalidPattern(pattern));
        }

        Ok(Self {
            id: id.into(),
            directory: directory.into(),
            pattern,
            batch_size,
        })
    }

    /// Unique identifier of this scanner instance.
    pub fn info(&self) -> &str {
        &self.id
    }

    /// Drive one traversal of the scan root.
    ///
    /// Marker hits stream through the returned channel, which is closed
    /// exactly once, after the traversal finishes or cancellation is
    /// observed. Missing-path races are swallowed; any other traversal
    /// error goes to `errors` and ends the scan.
    pub fn scan(
        &self,
        cancel: CancellationToken,
        errors: mpsc::Sender<PelicanError>,
    ) -> mpsc::Receiver<ScanHit> {
        let (tx, rx) = mpsc::channel(SCAN_QUEUE_DEPTH);

        let id = self.id.clone();
        let directory = self.directory.clone();
        let pattern = self.pattern.clone();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let walker = Walker::new(batch_size);
            let result = walker.start(&directory, &mut |path, meta, err| {
                scan_entry(&id, &pattern, &cancel, &tx, path, meta, err)
            });
            walker.end();

            if let Err(err) = result {
                warn!(
                    scanner = %id,
                    directory = %directory.display(),
                    error = %err,
                    "error in scanner"
                );
                let _ = errors.blocking_send(err);
            }
        });

        rx
    }
}

fn scan_entry(
    id: &str,
    pattern: &str,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<ScanHit>,
    path: &Path,
    meta: Option<&std::fs::Metadata>,
    err: Option<io::Error>,
) -> Result<WalkDecision, PelicanError> {
    if cancel.is_cancelled() {
        return Ok(WalkDecision::SkipAll);
    }

    if let Some(err) = err {
        if err.kind() == io::ErrorKind::NotFound {
            // Deleted between listing and stat; the next scan settles it.
            warn!(scanner = %id, path = %path.display(), "path doesn't exist, skipping");
            return Ok(WalkDecision::Continue);
        }
        return Err(ScanError::Walk {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
        .into());
    }

    let meta = match meta {
        Some(meta) => meta,
        None => return Ok(WalkDecision::Continue),
    };

    let ext = file_extension(path);
    if !meta.is_file() || (!pattern.is_empty() && ext != pattern) {
        debug!(
            scanner = %id,
            path = %path.display(),
            ext = %ext,
            marker_pattern = %pattern,
            "skipping path"
        );
        return Ok(WalkDecision::Continue);
    }

    let hit = ScanHit::new(path.to_path_buf(), meta);
    info!(
        scanner = %id,
        marker = %path.display(),
        trace_id = %hit.trace_id,
        "scanner found marker file"
    );

    // Backpressure: block until a worker frees a slot. The send only fails
    // when every receiver is gone, which is how cancellation reaches a
    // parked scanner.
    if tx.blocking_send(hit).is_err() {
        return Ok(WalkDecision::SkipAll);
    }

    Ok(WalkDecision::Continue)
}
