//! Marker readiness gate.

use std::time::Duration;

use pl_error::{PelicanError, PipelineError};
use pl_fs::{sleep_cancellable, stat_if_exists};
use pl_types::config::MarkerCheckConfig;
use pl_types::ScanHit;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Resolved readiness thresholds.
#[derive(Debug, Clone, Copy)]
pub struct MarkerCheck {
    /// Delay between stat attempts
    pub check_interval: Duration,

    /// Attempts before proceeding anyway
    pub max_attempts: u32,

    /// Minimum marker size in bytes. With the default of zero every marker
    /// is ready on its discovery stat and the whole wait path is skipped;
    /// producers opt into the gate by configuring a larger threshold.
    pub min_size: u64,
}

impl From<&MarkerCheckConfig> for MarkerCheck {
    fn from(config: &MarkerCheckConfig) -> Self {
        Self {
            check_interval: config.check_interval,
            max_attempts: config.max_attempts,
            min_size: config.min_size,
        }
    }
}

/// Wait for the marker to reach its minimum size.
///
/// Best-effort readiness: after `max_attempts` without reaching `min_size`
/// the marker is declared ready anyway with a warning, so an upload never
/// blocks forever on a stalled producer. Returns the last observed size.
///
/// Errors: cancellation, and the marker vanishing mid-wait (a producer
/// withdrew it); both abandon the marker for this pipeline run.
pub async fn wait_until_ready(
    cancel: &CancellationToken,
    marker: &ScanHit,
    flush_delay: Duration,
    check: &MarkerCheck,
) -> Result<u64, PelicanError> {
    // The discovery snapshot often already satisfies the gate.
    if marker.size >= check.min_size {
        debug!(
            marker = %marker.path.display(),
            size = marker.size,
            min_size = check.min_size,
            "marker file is ready, no need to wait"
        );
        return Ok(marker.size);
    }

    if !sleep_cancellable(cancel, flush_delay).await {
        return Err(PelicanError::Canceled);
    }

    let mut last_size = marker.size;
    let mut attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            warn!(
                marker = %marker.path.display(),
                "canceled while waiting for marker file to be ready"
            );
            return Err(PelicanError::Canceled);
        }

        if attempts >= check.max_attempts {
            warn!(
                marker = %marker.path.display(),
                attempts,
                max_attempts = check.max_attempts,
                size = last_size,
                min_size = check.min_size,
                "marker file not ready after maximum attempts, continuing with upload anyway"
            );
            return Ok(last_size);
        }

        match stat_if_exists(&marker.path).await {
            Ok(Some(meta)) => {
                if meta.len() >= check.min_size {
                    debug!(
                        marker = %marker.path.display(),
                        size = meta.len(),
                        attempts,
                        "marker file is ready"
                    );
                    return Ok(meta.len());
                }
                last_size = meta.len();
                debug!(
                    marker = %marker.path.display(),
                    size = last_size,
                    min_size = check.min_size,
                    attempts,
                    "marker file below minimum size, waiting"
                );
            }
            Ok(None) => {
                return Err(PipelineError::MarkerVanished(marker.path.clone()).into());
            }
            Err(err) => {
                return Err(pl_error::ScanError::Walk {
                    path: marker.path.clone(),
                    message: err.to_string(),
                }
                .into());
            }
        }

        if !sleep_cancellable(cancel, check.check_interval).await {
            return Err(PelicanError::Canceled);
        }
        attempts += 1;
    }
}
