//! Generic parallel put driver.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pl_error::StorageError;
use pl_fs::destination_path;
use pl_traits::{PutTarget, StorageBackend};
use pl_types::{BackendKind, BackendResult, PutOutcome, ScanHit};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Fan-out driver turning a single-file [`PutTarget`] into a full
/// [`StorageBackend`].
///
/// For each marker the driver runs the target's container pre-sync, checks
/// every candidate's existence up front, replicates the surviving candidates
/// concurrently (one task per candidate, destination computed from the scan
/// root and prefix), and aggregates the outcomes. The first error recorded
/// (missing candidates first, then put failures, both in candidate order)
/// becomes the backend result's error.
pub struct ParallelPutDriver<T: PutTarget> {
    target: T,
    root_dir: PathBuf,
    prefix: String,
}

impl<T: PutTarget> ParallelPutDriver<T> {
    /// Wrap `target`, replicating beneath `prefix` relative to `root_dir`.
    pub fn new(target: T, root_dir: PathBuf, prefix: String) -> Self {
        Self {
            target,
            root_dir,
            prefix,
        }
    }

    /// Destination key for one candidate.
    fn dest_for(&self, src: &Path) -> String {
        destination_path(&self.root_dir, src, &self.prefix)
    }

    async fn replicate(
        &self,
        cancel: &CancellationToken,
        marker: &ScanHit,
        candidates: &[PathBuf],
    ) -> BackendResult {
        let id = self.target.id().to_string();
        let kind = self.target.kind();

        if let Err(err) = self.target.ensure_container(cancel).await {
            return BackendResult::failed(
                id,
                kind,
                marker.path.clone(),
                StorageError::PreSync(err.to_string()),
            );
        }

        // Missing candidates are recorded but do not stop the rest.
        let mut errors: Vec<StorageError> = Vec::new();
        let mut present: Vec<PathBuf> = Vec::new();
        for candidate in candidates {
            match pl_fs::stat_if_exists(candidate).await {
                Ok(Some(_)) => present.push(candidate.clone()),
                Ok(None) => {
                    warn!(
                        backend = %id,
                        src = %candidate.display(),
                        trace_id = %marker.trace_id,
                        "candidate file does not exist"
                    );
                    errors.push(StorageError::MissingCandidate(
                        candidate.display().to_string(),
                    ));
                }
                Err(err) => errors.push(StorageError::Io(err.to_string())),
            }
        }

        let puts = present.iter().map(|src| {
            let dest = self.dest_for(src);
            async move {
                debug!(
                    backend = %self.target.id(),
                    src = %src.display(),
                    dest = %dest,
                    "replicating candidate"
                );
                self.target.put_file(cancel, src, &dest).await
            }
        });

        let mut outcomes: Vec<PutOutcome> = Vec::new();
        for (src, result) in present.iter().zip(futures::future::join_all(puts).await) {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    error!(
                        backend = %id,
                        src = %src.display(),
                        trace_id = %marker.trace_id,
                        error = %err,
                        "failed to replicate candidate"
                    );
                    errors.push(err);
                }
            }
        }

        let error = errors.into_iter().next();
        if error.is_none() {
            info!(
                backend = %id,
                marker = %marker.path.display(),
                trace_id = %marker.trace_id,
                files = outcomes.len(),
                "backend handled the marker file"
            );
        }

        BackendResult {
            backend_id: id,
            kind,
            marker_path: marker.path.clone(),
            outcomes,
            error,
        }
    }
}

#[async_trait]
impl<T: PutTarget> StorageBackend for ParallelPutDriver<T> {
    fn info(&self) -> &str {
        self.target.id()
    }

    fn kind(&self) -> BackendKind {
        self.target.kind()
    }

    async fn put(
        &self,
        cancel: CancellationToken,
        marker: ScanHit,
        candidates: Vec<PathBuf>,
        results: mpsc::Sender<BackendResult>,
    ) {
        let result = self.replicate(&cancel, &marker, &candidates).await;

        tokio::select! {
            sent = results.send(result) => {
                if sent.is_err() {
                    warn!(backend = %self.target.id(), "result channel closed before emission");
                }
            }
            _ = cancel.cancelled() => {
                warn!(backend = %self.target.id(), "context canceled while emitting backend result");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;
    use pl_types::ChecksumKind;
    use std::collections::HashSet;
    use std::fs::File;

    /// Target that records puts and fails on scripted paths.
    struct ScriptedTarget {
        fail_suffixes: Vec<&'static str>,
        fail_presync: bool,
        puts: Mutex<Vec<(PathBuf, String)>>,
    }

    impl ScriptedTarget {
        fn ok() -> Self {
            Self {
                fail_suffixes: Vec::new(),
                fail_presync: false,
                puts: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(suffixes: Vec<&'static str>) -> Self {
            Self {
                fail_suffixes: suffixes,
                ..Self::ok()
            }
        }
    }

    #[async_trait]
    impl PutTarget for ScriptedTarget {
        fn id(&self) -> &str {
            "scripted-target"
        }

        fn kind(&self) -> BackendKind {
            BackendKind::Local
        }

        async fn ensure_container(
            &self,
            _cancel: &CancellationToken,
        ) -> Result<(), StorageError> {
            if self.fail_presync {
                return Err(StorageError::Client("container unavailable".to_string()));
            }
            Ok(())
        }

        async fn put_file(
            &self,
            _cancel: &CancellationToken,
            src: &Path,
            dest: &str,
        ) -> Result<PutOutcome, StorageError> {
            let rendered = src.display().to_string();
            if self.fail_suffixes.iter().any(|s| rendered.ends_with(s)) {
                return Err(StorageError::Client(format!("scripted failure: {rendered}")));
            }
            self.puts
                .lock()
                .push((src.to_path_buf(), dest.to_string()));
            Ok(PutOutcome {
                src: src.to_path_buf(),
                dest: dest.to_string(),
                checksum_kind: ChecksumKind::Md5,
                checksum: "00".to_string(),
                size: 1,
                last_modified: Some(Utc::now()),
            })
        }
    }

    fn hit(path: &Path) -> ScanHit {
        let meta = std::fs::metadata(path).unwrap();
        ScanHit::new(path.to_path_buf(), &meta)
    }

    async fn run_put(
        driver: &ParallelPutDriver<ScriptedTarget>,
        marker: &Path,
        candidates: Vec<PathBuf>,
    ) -> BackendResult {
        let (tx, mut rx) = mpsc::channel(1);
        driver
            .put(CancellationToken::new(), hit(marker), candidates, tx)
            .await;
        rx.recv().await.unwrap()
    }

    #[tokio::test]
    async fn test_all_candidates_replicated() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("m.mf");
        let data = dir.path().join("m.dat");
        File::create(&marker).unwrap();
        File::create(&data).unwrap();

        let driver = ParallelPutDriver::new(
            ScriptedTarget::ok(),
            dir.path().to_path_buf(),
            "uploads".to_string(),
        );
        let result = run_put(&driver, &marker, vec![data.clone(), marker.clone()]).await;

        assert!(result.error.is_none());
        assert_eq!(result.outcomes.len(), 2);
        assert_eq!(result.outcomes[0].dest, "uploads/m.dat");
        assert_eq!(result.outcomes[1].dest, "uploads/m.mf");
    }

    #[tokio::test]
    async fn test_missing_candidate_recorded_but_rest_attempted() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("m.mf");
        File::create(&marker).unwrap();
        let missing = dir.path().join("m.dat");

        let driver = ParallelPutDriver::new(
            ScriptedTarget::ok(),
            dir.path().to_path_buf(),
            String::new(),
        );
        let result = run_put(&driver, &marker, vec![marker.clone(), missing]).await;

        let err = result.error.expect("missing candidate must be an error");
        assert!(err.to_string().contains("candidate file is missing"));
        // The marker itself still replicated.
        assert_eq!(result.outcomes.len(), 1);
        assert!(result.outcomes[0].src.ends_with("m.mf"));
    }

    #[tokio::test]
    async fn test_first_error_wins_in_candidate_order() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("m.mf");
        let a = dir.path().join("m.a");
        let b = dir.path().join("m.b");
        for f in [&marker, &a, &b] {
            File::create(f).unwrap();
        }

        let driver = ParallelPutDriver::new(
            ScriptedTarget::failing_on(vec![".a", ".b"]),
            dir.path().to_path_buf(),
            String::new(),
        );
        let result = run_put(&driver, &marker, vec![a, b, marker.clone()]).await;

        let err = result.error.unwrap();
        assert!(err.to_string().ends_with("m.a"), "got: {err}");
    }

    #[tokio::test]
    async fn test_presync_failure_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("m.mf");
        File::create(&marker).unwrap();

        let target = ScriptedTarget {
            fail_presync: true,
            ..ScriptedTarget::ok()
        };
        let driver =
            ParallelPutDriver::new(target, dir.path().to_path_buf(), String::new());
        let result = run_put(&driver, &marker, vec![marker.clone()]).await;

        let err = result.error.unwrap();
        assert!(err.to_string().contains("pre-sync validation failed"));
        assert!(result.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_subdirectory_layout_preserved() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("day1")).unwrap();
        let marker = dir.path().join("day1/m.mf");
        File::create(&marker).unwrap();

        let driver = ParallelPutDriver::new(
            ScriptedTarget::ok(),
            dir.path().to_path_buf(),
            "pre".to_string(),
        );
        let result = run_put(&driver, &marker, vec![marker.clone()]).await;
        assert_eq!(result.outcomes[0].dest, "pre/day1/m.mf");
    }

    #[tokio::test]
    async fn test_no_duplicate_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("m.mf");
        let data = dir.path().join("m.dat");
        File::create(&marker).unwrap();
        File::create(&data).unwrap();

        let target = ScriptedTarget::ok();
        let driver =
            ParallelPutDriver::new(target, dir.path().to_path_buf(), String::new());
        let result = run_put(&driver, &marker, vec![marker.clone(), data]).await;

        let dests: HashSet<_> = result.outcomes.iter().map(|o| o.dest.clone()).collect();
        assert_eq!(dests.len(), result.outcomes.len());
    }
}
