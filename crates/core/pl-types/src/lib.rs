//! Shared data model for pelican.
//!
//! The entities here flow through the scan → match → replicate → remove
//! pipeline: a [`ScanHit`] is produced by the scanner and handed to exactly
//! one processor worker; each backend answers with a [`BackendResult`] made
//! of per-file [`PutOutcome`]s; the processor folds those into a
//! [`MarkerResult`] which the remover consumes. All entities are tree-shaped
//! and live in isolation per marker.

pub mod config;

pub use config::{Config, MatcherKind};

use std::collections::HashMap;
use std::fs::Metadata;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use pl_error::{PelicanError, StorageError};
use serde::{Deserialize, Serialize};

/// Storage backend kind tag.
///
/// Used as the key of the per-marker result map and as the `kind()` label of
/// a backend, so two backends of the same kind within one pipeline would
/// shadow each other; the configuration allows at most one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// S3 or any S3-compatible object store
    S3,
    /// Google Cloud Storage driven through its S3-compatible endpoint
    Gcs,
    /// A directory on the local filesystem
    Local,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::S3 => write!(f, "s3"),
            Self::Gcs => write!(f, "gcs"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Checksum algorithm recorded on a [`PutOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumKind {
    Md5,
    Sha256,
}

impl std::fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

/// A marker file discovered by the scanner.
///
/// Carries the stat snapshot taken at discovery time so the readiness gate
/// can short-circuit without touching the filesystem again, plus an opaque
/// trace tag that follows the marker through every log line.
#[derive(Debug, Clone)]
pub struct ScanHit {
    /// Absolute path of the marker file
    pub path: PathBuf,

    /// File size at discovery
    pub size: u64,

    /// Last modification time at discovery, when the platform reports one
    pub modified: Option<DateTime<Utc>>,

    /// Opaque tag correlating all processing of this marker
    pub trace_id: String,
}

impl ScanHit {
    /// Build a hit from a path and its stat snapshot, stamping a fresh
    /// trace tag.
    pub fn new(path: PathBuf, meta: &Metadata) -> Self {
        Self {
            path,
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            trace_id: uuid::Uuid::new_v4().simple().to_string(),
        }
    }
}

/// Metadata of one replicated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    /// Local source path
    pub src: PathBuf,

    /// Destination key (object key or path below the target root)
    pub dest: String,

    /// Checksum algorithm backing `checksum`
    pub checksum_kind: ChecksumKind,

    /// Checksum of the stored object
    pub checksum: String,

    /// Stored size in bytes
    pub size: u64,

    /// Last-modified timestamp reported by the target, if any
    pub last_modified: Option<DateTime<Utc>>,
}

/// The result of replicating one marker's candidate set to one backend.
///
/// `error` is set iff at least one candidate failed (or the pre-sync failed,
/// or a candidate was missing at put time); `outcomes` then holds whatever
/// completed before the failure was aggregated.
#[derive(Debug, Clone)]
pub struct BackendResult {
    /// Stable identifier of the backend instance
    pub backend_id: String,

    /// Backend kind tag
    pub kind: BackendKind,

    /// Marker the candidates belong to
    pub marker_path: PathBuf,

    /// Per-file outcomes, in candidate order
    pub outcomes: Vec<PutOutcome>,

    /// First error observed, if any
    pub error: Option<StorageError>,
}

impl BackendResult {
    /// A result carrying only an error (pre-sync failures).
    pub fn failed(
        backend_id: impl Into<String>,
        kind: BackendKind,
        marker_path: PathBuf,
        error: StorageError,
    ) -> Self {
        Self {
            backend_id: backend_id.into(),
            kind,
            marker_path,
            outcomes: Vec::new(),
            error: Some(error),
        }
    }
}

/// The aggregated outcome of processing one marker across all backends.
#[derive(Debug)]
pub struct MarkerResult {
    /// Marker file path
    pub marker_path: PathBuf,

    /// Trace tag inherited from the scan hit
    pub trace_id: String,

    /// Per-backend results, keyed by kind
    pub results: HashMap<BackendKind, BackendResult>,

    /// First aggregated error; `None` iff every backend succeeded
    pub error: Option<PelicanError>,
}

impl MarkerResult {
    /// An empty result for a marker about to be replicated.
    pub fn new(marker_path: PathBuf, trace_id: String) -> Self {
        Self {
            marker_path,
            trace_id,
            results: HashMap::new(),
            error: None,
        }
    }

    /// Fold one backend result in, recording the first error observed.
    pub fn absorb(&mut self, result: BackendResult) {
        if let Some(err) = &result.error {
            if self.error.is_none() {
                self.error = Some(PelicanError::Marker {
                    marker: self.marker_path.clone(),
                    message: err.to_string(),
                });
            }
        }
        self.results.insert(result.kind, result);
    }

    /// True when every backend replicated the marker's set successfully.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_error::StorageError;

    fn outcome(src: &str) -> PutOutcome {
        PutOutcome {
            src: PathBuf::from(src),
            dest: format!("prefix{src}"),
            checksum_kind: ChecksumKind::Md5,
            checksum: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            size: 0,
            last_modified: None,
        }
    }

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::S3.to_string(), "s3");
        assert_eq!(BackendKind::Gcs.to_string(), "gcs");
        assert_eq!(BackendKind::Local.to_string(), "local");
    }

    #[test]
    fn test_absorb_keeps_first_error() {
        let mut mr = MarkerResult::new(PathBuf::from("/scan/a.mf"), "t1".to_string());

        mr.absorb(BackendResult {
            backend_id: "s3-test".to_string(),
            kind: BackendKind::S3,
            marker_path: PathBuf::from("/scan/a.mf"),
            outcomes: vec![outcome("/scan/a.dat")],
            error: Some(StorageError::Client("first".to_string())),
        });
        mr.absorb(BackendResult::failed(
            "local-test",
            BackendKind::Local,
            PathBuf::from("/scan/a.mf"),
            StorageError::PreSync("second".to_string()),
        ));

        assert!(!mr.is_success());
        let message = mr.error.as_ref().unwrap().to_string();
        assert!(message.contains("first"), "got: {message}");
        assert!(message.contains("/scan/a.mf"));
        assert_eq!(mr.results.len(), 2);
    }

    #[test]
    fn test_absorb_success_keeps_error_nil() {
        let mut mr = MarkerResult::new(PathBuf::from("/scan/b.mf"), "t2".to_string());
        mr.absorb(BackendResult {
            backend_id: "local-test".to_string(),
            kind: BackendKind::Local,
            marker_path: PathBuf::from("/scan/b.mf"),
            outcomes: vec![outcome("/scan/b.mf")],
            error: None,
        });

        assert!(mr.is_success());
        assert!(mr.results.contains_key(&BackendKind::Local));
    }
}
