//! End-to-end pipeline scenarios over temp directories.

use std::sync::Arc;
use std::time::Duration;

use pl_integration_tests::{pipeline_config, write_file, MockBackend};
use pl_pipeline::Pipeline;
use pl_storage::{LocalDirTarget, ParallelPutDriver};
use pl_traits::StorageBackend;
use pl_types::config::LocalDirConfig;
use pl_types::BackendKind;
use tokio_util::sync::CancellationToken;

const BASIC_PIPELINE: &str = r#"
pipelines:
  - name: e2e
    scanner:
      directory: {SCAN_ROOT}
      pattern: ".txt"
      interval: 10ms
      batchSize: 64
    processor:
      maxProcessors: 1
      flushDelay: 0s
      fileMatcherConfigs:
        - matcherType: basic
          patterns: [".txt"]
"#;

fn local_backend(out: &std::path::Path, scan_root: &std::path::Path) -> Arc<dyn StorageBackend> {
    let target = LocalDirTarget::new(
        "local-e2e",
        &LocalDirConfig {
            enabled: true,
            path: out.display().to_string(),
            mode: 0o755,
        },
    );
    Arc::new(ParallelPutDriver::new(
        target,
        scan_root.to_path_buf(),
        String::new(),
    ))
}

/// Two markers, a mock backend that succeeds: both groups replicate and both
/// local files are removed.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_markers_replicate_and_are_removed() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("f1.txt"), b"one");
    write_file(&dir.path().join("f2.txt"), b"two");

    let backend = MockBackend::succeeding(BackendKind::S3);
    let config = pipeline_config(BASIC_PIPELINE, dir.path());
    let pipeline = Pipeline::from_config(&config, vec![backend.clone()]).unwrap();

    pipeline.run(CancellationToken::new(), false).await.unwrap();

    // Hits arrive in lexical order, one put batch per marker.
    let puts = backend.puts.lock();
    assert_eq!(puts.len(), 2);
    assert!(puts[0].0.ends_with("f1.txt"));
    assert!(puts[1].0.ends_with("f2.txt"));
    drop(puts);

    assert!(!dir.path().join("f1.txt").exists());
    assert!(!dir.path().join("f2.txt").exists());

    let stats = pipeline.stats();
    assert_eq!(stats.markers_uploaded, 2);
    assert_eq!(stats.markers_failed, 0);
}

/// Two markers plus a non-matching file, backend always errors: both markers
/// produce errors, stay on disk, and the stray file is never scanned.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_backend_leaves_files_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("f1.txt"), b"one");
    write_file(&dir.path().join("f2.txt"), b"two");
    write_file(&dir.path().join("invalid.extOther"), b"zzz");

    let backend = MockBackend::failing(BackendKind::S3);
    let config = pipeline_config(BASIC_PIPELINE, dir.path());
    let pipeline = Pipeline::from_config(&config, vec![backend.clone()]).unwrap();

    pipeline.run(CancellationToken::new(), false).await.unwrap();

    assert_eq!(backend.put_count(), 2, "the stray extension is never emitted");
    assert!(dir.path().join("f1.txt").exists());
    assert!(dir.path().join("f2.txt").exists());
    assert!(dir.path().join("invalid.extOther").exists());

    let stats = pipeline.stats();
    assert_eq!(stats.markers_failed, 2);
    assert_eq!(stats.files_removed, 0);
}

/// One backend succeeds, the other fails: nothing is removed. After the
/// failing backend recovers, the next pass replicates and the healthy
/// backend's destination is reused byte-for-byte (checksum short-circuit).
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partial_backend_failure_then_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("g1.txt"), b"group one payload");

    let config = pipeline_config(BASIC_PIPELINE, dir.path());
    let flaky = MockBackend::failing_first(BackendKind::S3, 1);

    // First pass: local backend succeeds, mock fails → no removal.
    let pipeline = Pipeline::from_config(
        &config,
        vec![local_backend(out.path(), dir.path()), flaky.clone()],
    )
    .unwrap();
    pipeline.run(CancellationToken::new(), false).await.unwrap();

    assert!(dir.path().join("g1.txt").exists(), "error skips removal");
    let replicated = out.path().join("g1.txt");
    assert!(replicated.exists(), "healthy backend still replicated");
    let first_mtime = std::fs::metadata(&replicated).unwrap().modified().unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;

    // Second pass: the mock recovered; the local side short-circuits on
    // matching checksums and the group is finally removed.
    let pipeline = Pipeline::from_config(
        &config,
        vec![local_backend(out.path(), dir.path()), flaky.clone()],
    )
    .unwrap();
    pipeline.run(CancellationToken::new(), false).await.unwrap();

    assert!(!dir.path().join("g1.txt").exists());
    let second_mtime = std::fs::metadata(&replicated).unwrap().modified().unwrap();
    assert_eq!(first_mtime, second_mtime, "matching checksum must skip rewrite");
}

/// Marker groups: data files resolved by matchers ride along with the
/// marker and subdirectory layout is preserved at the destination.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn marker_groups_with_local_backend() {
    let scan = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_file(&scan.path().join("batch/rec.mf"), b"done");
    write_file(&scan.path().join("batch/rec.dat"), b"payload-data");

    let yaml = r#"
pipelines:
  - name: groups
    scanner:
      directory: {SCAN_ROOT}
      pattern: ".mf"
      interval: 10ms
      batchSize: 64
    processor:
      maxProcessors: 1
      flushDelay: 0s
      fileMatcherConfigs:
        - matcherType: basic
          patterns: [".mf", ".dat"]
"#;
    let config = pipeline_config(yaml, scan.path());
    let pipeline =
        Pipeline::from_config(&config, vec![local_backend(out.path(), scan.path())]).unwrap();

    pipeline.run(CancellationToken::new(), false).await.unwrap();

    assert!(out.path().join("batch/rec.mf").exists());
    assert!(out.path().join("batch/rec.dat").exists());
    assert_eq!(
        std::fs::read(out.path().join("batch/rec.dat")).unwrap(),
        b"payload-data"
    );
    assert!(!scan.path().join("batch/rec.mf").exists());
    assert!(!scan.path().join("batch/rec.dat").exists());
}

/// Running the pipeline twice over identical content performs zero fresh
/// copies on the second run.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_run_is_idempotent() {
    let scan = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    let config = pipeline_config(BASIC_PIPELINE, scan.path());

    write_file(&scan.path().join("r1.txt"), b"stable content");
    let pipeline =
        Pipeline::from_config(&config, vec![local_backend(out.path(), scan.path())]).unwrap();
    pipeline.run(CancellationToken::new(), false).await.unwrap();

    let dest = out.path().join("r1.txt");
    let first_mtime = std::fs::metadata(&dest).unwrap().modified().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The producer re-drops the same file; the upload short-circuits.
    write_file(&scan.path().join("r1.txt"), b"stable content");
    let pipeline =
        Pipeline::from_config(&config, vec![local_backend(out.path(), scan.path())]).unwrap();
    pipeline.run(CancellationToken::new(), false).await.unwrap();

    assert!(!scan.path().join("r1.txt").exists());
    let second_mtime = std::fs::metadata(&dest).unwrap().modified().unwrap();
    assert_eq!(first_mtime, second_mtime);
}

/// Sequential matcher drives the candidate set: consecutive parts ride
/// along, the out-of-sequence straggler stays behind.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sequential_parts_stop_at_gap() {
    let scan = tempfile::tempdir().unwrap();
    write_file(&scan.path().join("rec.mf"), b"done");
    write_file(&scan.path().join("rec_01.gz"), b"p1");
    write_file(&scan.path().join("rec_02.gz"), b"p2");
    write_file(&scan.path().join("rec_099.gz"), b"stray");

    let yaml = r#"
pipelines:
  - name: seq
    scanner:
      directory: {SCAN_ROOT}
      pattern: ".mf"
      interval: 10ms
      batchSize: 64
    processor:
      maxProcessors: 1
      flushDelay: 0s
      fileMatcherConfigs:
        - matcherType: basic
          patterns: [".mf"]
        - matcherType: sequential
          patterns: ["{{markerName}}_##.gz"]
"#;
    let config = pipeline_config(yaml, scan.path());
    let backend = MockBackend::succeeding(BackendKind::S3);
    let pipeline = Pipeline::from_config(&config, vec![backend.clone()]).unwrap();

    pipeline.run(CancellationToken::new(), false).await.unwrap();

    let puts = backend.puts.lock();
    assert_eq!(puts.len(), 1);
    let candidates = &puts[0].1;
    assert_eq!(candidates.len(), 3);
    assert!(candidates.iter().any(|c| c.ends_with("rec_01.gz")));
    assert!(candidates.iter().any(|c| c.ends_with("rec_02.gz")));
    assert!(!candidates.iter().any(|c| c.ends_with("rec_099.gz")));
    drop(puts);

    // Replicated members are removed, the straggler survives for a future
    // marker.
    assert!(!scan.path().join("rec_01.gz").exists());
    assert!(scan.path().join("rec_099.gz").exists());
}

/// A marker below its readiness threshold is picked up once the producer
/// finishes writing it.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn readiness_gate_waits_for_growing_marker() {
    let scan = tempfile::tempdir().unwrap();
    let marker = scan.path().join("slow.txt");
    write_file(&marker, b"abc"); // 3 bytes, below the 10-byte gate

    let yaml = r#"
pipelines:
  - name: readiness
    scanner:
      directory: {SCAN_ROOT}
      pattern: ".txt"
      interval: 10ms
      batchSize: 64
    processor:
      maxProcessors: 1
      flushDelay: 0s
      markerCheckConfig:
        checkInterval: 20ms
        maxAttempts: 10
        minSize: 10
      fileMatcherConfigs:
        - matcherType: basic
          patterns: [".txt"]
"#;
    let config = pipeline_config(yaml, scan.path());
    let backend = MockBackend::succeeding(BackendKind::S3);
    let pipeline = Pipeline::from_config(&config, vec![backend.clone()]).unwrap();

    let grower = marker.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        write_file(&grower, b"abcdefghijk"); // 11 bytes
    });

    pipeline.run(CancellationToken::new(), false).await.unwrap();

    assert_eq!(backend.put_count(), 1);
    assert!(!marker.exists(), "ready marker replicates and is removed");
    assert_eq!(pipeline.stats().markers_uploaded, 1);
}

/// A marker that never reaches the threshold is uploaded anyway once the
/// attempts are exhausted (best-effort readiness).
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn readiness_gate_proceeds_after_exhausted_attempts() {
    let scan = tempfile::tempdir().unwrap();
    let marker = scan.path().join("stalled.txt");
    write_file(&marker, b"abc"); // permanently 3 bytes

    let yaml = r#"
pipelines:
  - name: stalled
    scanner:
      directory: {SCAN_ROOT}
      pattern: ".txt"
      interval: 10ms
      batchSize: 64
    processor:
      maxProcessors: 1
      flushDelay: 0s
      markerCheckConfig:
        checkInterval: 10ms
        maxAttempts: 2
        minSize: 10
      fileMatcherConfigs:
        - matcherType: basic
          patterns: [".txt"]
"#;
    let config = pipeline_config(yaml, scan.path());
    let backend = MockBackend::succeeding(BackendKind::S3);
    let pipeline = Pipeline::from_config(&config, vec![backend.clone()]).unwrap();

    let started = std::time::Instant::now();
    pipeline.run(CancellationToken::new(), false).await.unwrap();

    // Both check intervals elapsed before the gate gave up.
    assert!(started.elapsed() >= Duration::from_millis(20));
    assert_eq!(backend.put_count(), 1, "upload proceeds despite the stall");
    assert!(!marker.exists());
}

/// Glob matchers ship whole part-directories along with the marker.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn glob_matcher_collects_nested_parts() {
    let scan = tempfile::tempdir().unwrap();
    write_file(&scan.path().join("run.mf"), b"done");
    write_file(&scan.path().join("parts/run_a.gz"), b"a");
    write_file(&scan.path().join("parts/run_b.gz"), b"b");
    write_file(&scan.path().join("parts/other_c.gz"), b"c");

    let yaml = r#"
pipelines:
  - name: glob
    scanner:
      directory: {SCAN_ROOT}
      pattern: ".mf"
      interval: 10ms
      batchSize: 64
    processor:
      maxProcessors: 1
      flushDelay: 0s
      fileMatcherConfigs:
        - matcherType: basic
          patterns: [".mf"]
        - matcherType: glob
          patterns: ["parts/{{markerName}}_*.gz"]
"#;
    let config = pipeline_config(yaml, scan.path());
    let backend = MockBackend::succeeding(BackendKind::S3);
    let pipeline = Pipeline::from_config(&config, vec![backend.clone()]).unwrap();

    pipeline.run(CancellationToken::new(), false).await.unwrap();

    let puts = backend.puts.lock();
    let candidates = &puts[0].1;
    assert_eq!(candidates.len(), 3);
    assert!(candidates.iter().any(|c| c.ends_with("parts/run_a.gz")));
    assert!(candidates.iter().any(|c| c.ends_with("parts/run_b.gz")));
    assert!(!candidates.iter().any(|c| c.ends_with("parts/other_c.gz")));
    drop(puts);

    assert!(scan.path().join("parts/other_c.gz").exists());
    assert!(!scan.path().join("parts/run_a.gz").exists());
}
