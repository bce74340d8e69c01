//! Object-store put target.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pl_error::StorageError;
use pl_fs::{file_md5, sleep_cancellable};
use pl_traits::{ObjectStoreClient, PutTarget};
use pl_types::{BackendKind, ChecksumKind, PutOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bucket bootstrap tolerates a cluster cold start: up to 300 attempts one
/// second apart before giving up.
pub const BOOTSTRAP_MAX_ATTEMPTS: u32 = 300;
const BOOTSTRAP_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Single-file put capability over an S3-compatible object store.
///
/// Puts are content-addressed idempotent: the destination object's entity
/// tag is compared against the source's MD5 before uploading, so re-running
/// a pipeline skips everything already present. After an upload whose
/// entity tag disagrees with the precomputed digest the source is hashed
/// again, since a producer may have appended mid-upload; only a second
/// disagreement is an error.
pub struct ObjectStoreTarget {
    id: String,
    kind: BackendKind,
    client: Arc<dyn ObjectStoreClient>,
    bucket: String,
    region: String,
    verified: Mutex<HashSet<String>>,
}

impl ObjectStoreTarget {
    pub fn new(
        id: impl Into<String>,
        kind: BackendKind,
        client: Arc<dyn ObjectStoreClient>,
        bucket: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            client,
            bucket: bucket.into(),
            region: region.into(),
            verified: Mutex::new(HashSet::new()),
        }
    }

    /// Verify the bucket exists, creating it when absent, retrying through
    /// cluster cold starts. Call once before the pipeline starts.
    pub async fn bootstrap(&self, cancel: &CancellationToken) -> Result<(), StorageError> {
        let mut last_err = None;
        for attempt in 0..BOOTSTRAP_MAX_ATTEMPTS {
            match self.verify_bucket().await {
                Ok(()) => {
                    info!(
                        backend = %self.id,
                        bucket = %self.bucket,
                        attempt,
                        "bucket exists or was created"
                    );
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        backend = %self.id,
                        bucket = %self.bucket,
                        attempt,
                        max_attempts = BOOTSTRAP_MAX_ATTEMPTS,
                        error = %err,
                        "bucket not reachable, retrying in 1s"
                    );
                    last_err = Some(err);
                }
            }
            if !sleep_cancellable(cancel, BOOTSTRAP_RETRY_DELAY).await {
                return Err(StorageError::Canceled);
            }
        }
        Err(last_err.unwrap_or_else(|| StorageError::PreSync("bucket bootstrap failed".into())))
    }

    /// Check-and-create, memoized per bucket so repeated pre-syncs are
    /// constant time.
    async fn verify_bucket(&self) -> Result<(), StorageError> {
        if self.verified.lock().contains(&self.bucket) {
            return Ok(());
        }

        if !self.client.bucket_exists(&self.bucket).await? {
            debug!(backend = %self.id, bucket = %self.bucket, "bucket does not exist, creating it");
            self.client.make_bucket(&self.bucket, &self.region).await?;
        }

        self.verified.lock().insert(self.bucket.clone());
        Ok(())
    }
}

#[async_trait]
impl PutTarget for ObjectStoreTarget {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn ensure_container(&self, _cancel: &CancellationToken) -> Result<(), StorageError> {
        self.verify_bucket().await
    }

    async fn put_file(
        &self,
        cancel: &CancellationToken,
        src: &Path,
        dest: &str,
    ) -> Result<PutOutcome, StorageError> {
        let local_md5 = file_md5(src)
            .await
            .map_err(|err| StorageError::Io(format!("failed to calculate local checksum: {err}")))?;

        // Skip the upload when the destination already carries this content.
        match self.client.stat_object(&self.bucket, dest).await {
            Ok(Some(stat)) if stat.etag == local_md5 => {
                info!(
                    backend = %self.id,
                    src = %src.display(),
                    object = %stat.key,
                    md5 = %stat.etag,
                    bucket = %self.bucket,
                    "object already exists in bucket, skipping upload"
                );
                return Ok(PutOutcome {
                    src: src.to_path_buf(),
                    dest: stat.key,
                    checksum_kind: ChecksumKind::Md5,
                    checksum: stat.etag,
                    size: stat.size,
                    last_modified: stat.last_modified,
                });
            }
            Ok(_) => {}
            // Stat failures fall through to the upload attempt.
            Err(err) => debug!(
                backend = %self.id,
                object = %dest,
                error = %err,
                "stat before upload failed, uploading anyway"
            ),
        }

        let uploaded = tokio::select! {
            result = self.client.put_object(&self.bucket, dest, src, &local_md5) => result?,
            _ = cancel.cancelled() => return Err(StorageError::Canceled),
        };

        let mut checksum = local_md5;
        if uploaded.etag != checksum {
            // The producer may have appended to the source mid-upload;
            // only a mismatch against a fresh digest is fatal.
            let latest = file_md5(src).await.map_err(|err| {
                StorageError::Io(format!("failed to calculate local checksum: {err}"))
            })?;
            if uploaded.etag != latest {
                let local_size = tokio::fs::metadata(src)
                    .await
                    .map(|m| m.len())
                    .map_err(|err| StorageError::Io(err.to_string()))?;
                warn!(
                    backend = %self.id,
                    src = %src.display(),
                    object = %dest,
                    expected_md5 = %latest,
                    actual_md5 = %uploaded.etag,
                    "checksum mismatch after upload"
                );
                return Err(StorageError::ChecksumMismatch {
                    expected: latest,
                    actual: uploaded.etag,
                    remote_size: uploaded.size,
                    local_size,
                });
            }
            checksum = latest;
        }

        info!(
            backend = %self.id,
            src = %src.display(),
            object = %uploaded.key,
            checksum = %checksum,
            bucket = %self.bucket,
            size = uploaded.size,
            "file uploaded to the bucket"
        );

        Ok(PutOutcome {
            src: src.to_path_buf(),
            dest: uploaded.key,
            checksum_kind: ChecksumKind::Md5,
            checksum,
            size: uploaded.size,
            last_modified: uploaded.last_modified,
        })
    }
}
