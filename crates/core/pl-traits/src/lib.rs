//! Component contracts shared across the pelican workspace.
//!
//! The seams between pipeline stages are traits so each side can be swapped
//! in tests: processors drive [`StorageBackend`]s, the generic fan-out driver
//! consumes a [`PutTarget`] capability, the object-store target talks to a
//! [`ObjectStoreClient`], and matchers implement [`FileMatcher`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pl_error::{MatchError, StorageError};
use pl_types::config::FileMatcherConfig;
use pl_types::{BackendKind, BackendResult, MatcherKind, PutOutcome, ScanHit};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Metadata of a stored object, as reported by an object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStat {
    /// Object key
    pub key: String,

    /// Entity tag with surrounding quotes stripped; equals the MD5 hex
    /// digest for objects written in a single part
    pub etag: String,

    /// Object size in bytes
    pub size: u64,

    /// Last-modified timestamp, when reported
    pub last_modified: Option<DateTime<Utc>>,
}

/// Minimal object-store surface the object-store target needs.
///
/// Mirrors the handful of calls made against the wire client so tests can
/// substitute an in-memory fake. The production implementation wraps the AWS
/// SDK; GCS interoperability endpoints satisfy the same contract.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Whether the bucket exists.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Create the bucket in `region`.
    async fn make_bucket(&self, bucket: &str, region: &str) -> Result<(), StorageError>;

    /// Stat an object; `None` when the key does not exist.
    async fn stat_object(&self, bucket: &str, key: &str)
        -> Result<Option<ObjectStat>, StorageError>;

    /// Upload a local file, sending its MD5 (hex) for end-to-end integrity.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        src: &Path,
        content_md5_hex: &str,
    ) -> Result<ObjectStat, StorageError>;
}

/// Single-file put capability consumed by the parallel put driver.
///
/// Implementations bring their own idempotence: a put of a file whose
/// checksum already matches the destination must succeed without rewriting.
#[async_trait]
pub trait PutTarget: Send + Sync {
    /// Stable identifier for logs and results.
    fn id(&self) -> &str;

    /// Kind tag of the underlying storage.
    fn kind(&self) -> BackendKind;

    /// One-time container bootstrap (bucket or directory creation).
    /// Memoized by implementations; called before every put batch.
    async fn ensure_container(&self, cancel: &CancellationToken) -> Result<(), StorageError>;

    /// Replicate a single file to `dest`.
    async fn put_file(
        &self,
        cancel: &CancellationToken,
        src: &Path,
        dest: &str,
    ) -> Result<PutOutcome, StorageError>;
}

/// A storage backend as seen by processor workers.
///
/// `put` replicates a marker's candidate set and answers with exactly one
/// [`BackendResult`] on `results`, or exits silently when `cancel` fires
/// while emitting.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Stable identifier for logs and results.
    fn info(&self) -> &str;

    /// Kind tag, the key of the per-marker result map.
    fn kind(&self) -> BackendKind;

    /// Replicate `candidates` for `marker`.
    async fn put(
        &self,
        cancel: CancellationToken,
        marker: ScanHit,
        candidates: Vec<PathBuf>,
        results: mpsc::Sender<BackendResult>,
    );
}

/// Computes the sibling data files belonging to a marker.
pub trait FileMatcher: Send + Sync {
    /// Which matcher variant this is.
    fn kind(&self) -> MatcherKind;

    /// Resolve `cfg.patterns` against the marker's directory.
    ///
    /// Returns existing candidates only; pattern parse failures and I/O
    /// errors (other than missing candidates) are errors.
    fn match_files(&self, marker: &Path, cfg: &FileMatcherConfig)
        -> Result<Vec<PathBuf>, MatchError>;
}
