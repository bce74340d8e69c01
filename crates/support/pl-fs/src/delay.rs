//! Cancellation-aware delay.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Sleep for `delay`, waking early when `cancel` fires.
///
/// Returns `true` when the full delay elapsed, `false` on cancellation. No
/// timer outlives the token: the sleep future is dropped as soon as the
/// select resolves. A zero delay returns immediately.
pub async fn sleep_cancellable(cancel: &CancellationToken, delay: Duration) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }

    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
