//! Filesystem primitives for pelican.
//!
//! This crate provides:
//! - [`Walker`] - bounded-memory directory traversal with lexical batches
//! - path arithmetic ([`split_file_path`], [`combine_file_path`],
//!   [`destination_path`])
//! - streaming content hashing ([`file_md5`], [`file_sha256`])
//! - [`copy_with_fsync`] for durable local replication
//! - [`sleep_cancellable`], the timer-with-cancel primitive every delay in
//!   the pipeline goes through

mod delay;
mod hash;
mod paths;
mod walker;

pub use delay::sleep_cancellable;
pub use hash::{file_md5, file_sha256};
pub use paths::{combine_file_path, destination_path, file_extension, split_file_path};
pub use walker::{WalkDecision, Walker};

use std::path::Path;

/// Stat a path, mapping "not found" to `None` and keeping other errors.
pub async fn stat_if_exists(path: &Path) -> std::io::Result<Option<std::fs::Metadata>> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Copy `src` to `dest`, creating parent directories with `mode`, then fsync
/// the destination so a crash cannot leave a torn copy behind.
pub async fn copy_with_fsync(src: &Path, dest: &Path, mode: u32) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
        set_mode(parent, mode).await;
    }

    tokio::fs::copy(src, dest).await?;
    set_mode(dest, mode).await;

    let file = tokio::fs::File::open(dest).await?;
    file.sync_all().await
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(err) =
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
    {
        tracing::warn!(path = %path.display(), error = %err, "failed to set permissions");
    }
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stat_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        tokio::fs::write(&present, b"x").await.unwrap();

        assert!(stat_if_exists(&present).await.unwrap().is_some());
        assert!(stat_if_exists(&dir.path().join("absent.txt"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_copy_with_fsync_creates_tree() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        tokio::fs::write(&src, b"payload").await.unwrap();

        let dest = dir.path().join("a/b/dest.bin");
        copy_with_fsync(&src, &dest, 0o750).await.unwrap();

        let copied = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(copied, b"payload");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = tokio::fs::metadata(&dest).await.unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o750);
        }
    }
}
