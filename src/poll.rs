//! Fixed-interval polling.
//!
//! One helper serves every "try, sleep, retry" loop in the crate: the
//! polling accept discipline and the capture store's `wait_for_count`.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Default interval between probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Run `probe` every `interval` until it yields a value or `timeout` elapses.
///
/// The probe runs at least once, even with a zero timeout. `None` for the
/// timeout polls forever; callers that need to stop early race this future
/// against their shutdown signal.
///
/// Returns `None` only on timeout.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    timeout: Option<Duration>,
    mut probe: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = Instant::now();

    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }

        if let Some(timeout) = timeout {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return None;
            }
            tokio::time::sleep(interval.min(timeout - elapsed)).await;
        } else {
            tokio::time::sleep(interval).await;
        }
    }
}
