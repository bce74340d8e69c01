//! Optional runtime-profiling sidecar.
//!
//! Writes one JSON line of tokio runtime metrics per interval, enough to
//! spot a saturated worker pool or a runaway task count in production
//! without attaching a debugger.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use pl_types::config::ProfilingConfig;
use tracing::{error, info, warn};

/// Start the snapshot collector. Runs until the process exits.
pub fn start(config: &ProfilingConfig) -> anyhow::Result<()> {
    let dir = PathBuf::from(&config.directory);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("runtime_stats.jsonl");
    let interval = config.interval;

    tokio::spawn(async move {
        let handle = tokio::runtime::Handle::current();
        let mut file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to open profiling file");
                return;
            }
        };

        loop {
            let metrics = handle.metrics();
            let snapshot = serde_json::json!({
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "pid": std::process::id(),
                "workers_count": metrics.num_workers(),
                "alive_tasks_count": metrics.num_alive_tasks(),
                "global_queue_depth": metrics.global_queue_depth(),
            });

            if let Err(err) = writeln!(file, "{snapshot}") {
                warn!(error = %err, "failed to write profiling snapshot");
            }
            let _ = file.flush();

            tokio::time::sleep(interval).await;
        }
    });

    info!(interval = ?config.interval, directory = %config.directory, "profiling sidecar started");
    Ok(())
}
