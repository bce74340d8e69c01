//! Shared test support for the pelican end-to-end suite.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pl_error::StorageError;
use pl_traits::StorageBackend;
use pl_types::config::{Config, PipelineConfig};
use pl_types::{BackendKind, BackendResult, ChecksumKind, PutOutcome, ScanHit};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A backend whose behavior is scripted per call.
///
/// `fail_first_n` makes the first N put batches fail with a client error;
/// everything after succeeds. Every put batch is recorded.
pub struct MockBackend {
    id: String,
    kind: BackendKind,
    fail_first_n: AtomicU32,
    pub puts: Mutex<Vec<(PathBuf, Vec<PathBuf>)>>,
}

impl MockBackend {
    pub fn succeeding(kind: BackendKind) -> Arc<Self> {
        Self::failing_first(kind, 0)
    }

    pub fn failing(kind: BackendKind) -> Arc<Self> {
        Self::failing_first(kind, u32::MAX)
    }

    pub fn failing_first(kind: BackendKind, n: u32) -> Arc<Self> {
        Arc::new(Self {
            id: format!("{kind}-mock"),
            kind,
            fail_first_n: AtomicU32::new(n),
            puts: Mutex::new(Vec::new()),
        })
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().len()
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn info(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn put(
        &self,
        _cancel: CancellationToken,
        marker: ScanHit,
        candidates: Vec<PathBuf>,
        results: mpsc::Sender<BackendResult>,
    ) {
        self.puts
            .lock()
            .push((marker.path.clone(), candidates.clone()));

        let remaining = self.fail_first_n.load(Ordering::SeqCst);
        let error = if remaining > 0 {
            if remaining != u32::MAX {
                self.fail_first_n.fetch_sub(1, Ordering::SeqCst);
            }
            Some(StorageError::Client("scripted backend failure".to_string()))
        } else {
            None
        };

        let outcomes = if error.is_none() {
            candidates
                .iter()
                .map(|c| PutOutcome {
                    src: c.clone(),
                    dest: c.to_string_lossy().to_string(),
                    checksum_kind: ChecksumKind::Md5,
                    checksum: "00".to_string(),
                    size: 1,
                    last_modified: None,
                })
                .collect()
        } else {
            Vec::new()
        };

        let _ = results
            .send(BackendResult {
                backend_id: self.id.clone(),
                kind: self.kind,
                marker_path: marker.path,
                outcomes,
                error,
            })
            .await;
    }
}

/// Parse a pipeline section from YAML, substituting the scan root.
pub fn pipeline_config(yaml: &str, scan_root: &Path) -> PipelineConfig {
    let rendered = yaml.replace("{SCAN_ROOT}", &scan_root.display().to_string());
    let config: Config = serde_yaml::from_str(&rendered).expect("test yaml must parse");
    config
        .pipelines
        .into_iter()
        .next()
        .expect("test yaml must define one pipeline")
}

/// Write a file, creating parent directories.
pub fn write_file(path: &Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}
