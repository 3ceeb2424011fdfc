//! Bounded fixed-interval readiness polling.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Returned when the predicate never reported ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimeout {
    /// Number of attempts made before giving up.
    pub attempts: u32,
}

/// Control value returned by a probe on each attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T, E> {
    /// The resource is ready; polling stops with this value.
    Ready(T),
    /// Not ready yet; try again after the interval.
    Pending,
    /// Unrecoverable; polling stops with this error.
    Abort(E),
}

/// Calls `probe` up to `max_attempts` times, sleeping `interval` between
/// attempts, until it reports [`Probe::Ready`] or [`Probe::Abort`].
///
/// No sleep happens after the final attempt.
pub async fn poll_until_ready<T, E, F, Fut>(
    mut probe: F,
    max_attempts: u32,
    interval: Duration,
) -> Result<Result<T, E>, PollTimeout>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Probe<T, E>>,
{
    for attempt in 1..=max_attempts {
        match probe(attempt).await {
            Probe::Ready(value) => {
                debug!(attempt, "Readiness probe succeeded");
                return Ok(Ok(value));
            }
            Probe::Abort(err) => return Ok(Err(err)),
            Probe::Pending => {}
        }
        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }
    Err(PollTimeout {
        attempts: max_attempts,
    })
}
