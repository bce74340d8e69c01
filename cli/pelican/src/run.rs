//! Upload command execution: pipeline fan-out, signals, exit codes.

use std::time::Duration;

use anyhow::Context;
use pl_pipeline::Pipeline;
use pl_types::config::Config;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::args::UploadArgs;
use crate::{logging, profiling};

/// Exit code when at least one pipeline surfaced a stop-on-error failure.
const EXIT_PIPELINE_FAILED: i32 = 4;

/// Grace period between cancellation and process exit, letting in-flight
/// tasks log their shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Run the upload command. Returns the process exit code.
pub async fn execute(args: UploadArgs) -> anyhow::Result<i32> {
    let config = Config::load(&args.config)
        .with_context(|| format!("failed to initialize config from {}", args.config.display()))?;

    let _log_guard = logging::init(&config.log)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        poll = args.poll,
        "pelican starting"
    );

    if config.profiling.enabled {
        profiling::start(&config.profiling).context("failed to initialize profiling")?;
    }

    let cancel = CancellationToken::new();
    spawn_signal_watcher(cancel.clone());

    let mut handles = Vec::new();
    for pipeline_config in &config.pipelines {
        if !pipeline_config.enabled {
            warn!(pipeline = %pipeline_config.name, "pipeline disabled");
            continue;
        }

        info!(
            pipeline = %pipeline_config.name,
            description = %pipeline_config.description,
            directory = %pipeline_config.scanner.directory,
            pattern = %pipeline_config.scanner.pattern,
            workers = pipeline_config.processor.max_processors,
            "starting pipeline"
        );

        let backends = pl_storage::build_backends(pipeline_config, &cancel)
            .await
            .with_context(|| {
                format!("failed to build backends for pipeline '{}'", pipeline_config.name)
            })?;
        if backends.is_empty() {
            warn!(pipeline = %pipeline_config.name, "no storage backends enabled");
        }

        let pipeline = Pipeline::from_config(pipeline_config, backends)
            .with_context(|| format!("failed to build pipeline '{}'", pipeline_config.name))?;

        let cancel_all = cancel.clone();
        let poll = args.poll;
        handles.push(tokio::spawn(async move {
            let name = pipeline.name().to_string();
            let result = pipeline.run(cancel_all.clone(), poll).await;
            warn!(pipeline = %name, "pipeline stopped");
            if result.is_err() {
                // One failing stop-on-error pipeline takes the others down.
                error!(pipeline = %name, "stopping all pipelines because of error");
                cancel_all.cancel();
            }
            result
        }));
    }

    if handles.is_empty() {
        warn!("no enabled pipelines in configuration");
    }

    let results = futures::future::join_all(handles).await;
    cancel.cancel();
    tokio::time::sleep(SHUTDOWN_GRACE).await;

    let mut failed = false;
    for result in results {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(error = %err, "pipeline finished with error");
                failed = true;
            }
            Err(join_err) => {
                error!(error = %join_err, "pipeline task panicked");
                failed = true;
            }
        }
    }

    info!("all pipelines have stopped");
    Ok(if failed { EXIT_PIPELINE_FAILED } else { 0 })
}

fn spawn_signal_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = term.recv() => {}
                    }
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        info!("received exit signal, stopping pipelines");
        cancel.cancel();
    });
}
