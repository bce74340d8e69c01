//! Local-directory put target.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pl_error::StorageError;
use pl_fs::{copy_with_fsync, file_md5, stat_if_exists};
use pl_traits::PutTarget;
use pl_types::config::LocalDirConfig;
use pl_types::{BackendKind, ChecksumKind, PutOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Single-file put capability over a local directory tree.
///
/// Replication is a copy followed by fsync; a destination whose MD5 already
/// equals the source's is left untouched. Subdirectory layout beneath the
/// scan root is recreated under the target root with the configured mode.
pub struct LocalDirTarget {
    id: String,
    root: PathBuf,
    mode: u32,
    created: Mutex<bool>,
}

impl LocalDirTarget {
    pub fn new(id: impl Into<String>, config: &LocalDirConfig) -> Self {
        Self {
            id: id.into(),
            root: PathBuf::from(&config.path),
            mode: config.mode,
            created: Mutex::new(false),
        }
    }

    fn dest_on_disk(&self, dest: &str) -> PathBuf {
        self.root.join(dest.trim_start_matches('/'))
    }
}

#[async_trait]
impl PutTarget for LocalDirTarget {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn ensure_container(&self, _cancel: &CancellationToken) -> Result<(), StorageError> {
        if *self.created.lock() {
            return Ok(());
        }

        match stat_if_exists(&self.root).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                info!(backend = %self.id, path = %self.root.display(), "creating target directory");
                tokio::fs::create_dir_all(&self.root)
                    .await
                    .map_err(|err| StorageError::PreSync(err.to_string()))?;
                set_dir_mode(&self.root, self.mode).await;
            }
            Err(err) => return Err(StorageError::PreSync(err.to_string())),
        }

        *self.created.lock() = true;
        Ok(())
    }

    async fn put_file(
        &self,
        _cancel: &CancellationToken,
        src: &Path,
        dest: &str,
    ) -> Result<PutOutcome, StorageError> {
        let src_meta = stat_if_exists(src)
            .await
            .map_err(|err| StorageError::Io(err.to_string()))?
            .ok_or_else(|| StorageError::MissingCandidate(src.display().to_string()))?;

        let local_md5 = file_md5(src)
            .await
            .map_err(|err| StorageError::Io(format!("failed to calculate local checksum: {err}")))?;

        let dest_path = self.dest_on_disk(dest);
        if let Ok(Some(dest_meta)) = stat_if_exists(&dest_path).await {
            let dest_md5 = file_md5(&dest_path).await.map_err(|err| {
                StorageError::Io(format!("failed to calculate destination checksum: {err}"))
            })?;
            if dest_md5 == local_md5 {
                info!(
                    backend = %self.id,
                    src = %src.display(),
                    dest = %dest_path.display(),
                    md5 = %dest_md5,
                    "file already exists in the local directory, skipping copy"
                );
                return Ok(outcome(src, &dest_path, dest_md5, &dest_meta));
            }
        }

        debug!(
            backend = %self.id,
            src = %src.display(),
            dest = %dest_path.display(),
            checksum = %local_md5,
            "copying file to the local directory"
        );
        copy_with_fsync(src, &dest_path, self.mode)
            .await
            .map_err(|err| StorageError::Io(format!("failed to copy file: {err}")))?;

        Ok(outcome(src, &dest_path, local_md5, &src_meta))
    }
}

fn outcome(src: &Path, dest: &Path, checksum: String, meta: &std::fs::Metadata) -> PutOutcome {
    PutOutcome {
        src: src.to_path_buf(),
        dest: dest.to_string_lossy().to_string(),
        checksum_kind: ChecksumKind::Md5,
        checksum,
        size: meta.len(),
        last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
    }
}

#[cfg(unix)]
async fn set_dir_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await;
}

#[cfg(not(unix))]
async fn set_dir_mode(_path: &Path, _mode: u32) {}
