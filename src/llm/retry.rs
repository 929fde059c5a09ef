use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Attempts allowed per logical model call, including the first.
pub const MAX_ATTEMPTS: u32 = 3;

const MIN_BACKOFF_SECS: u64 = 4;
const MAX_BACKOFF_SECS: u64 = 10;

/// Delay before the retry following failed attempt `attempt` (0-based).
/// Doubles per attempt, clamped to the 4–10 s band.
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = 1u64
        .checked_shl(attempt)
        .unwrap_or(MAX_BACKOFF_SECS)
        .clamp(MIN_BACKOFF_SECS, MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}

/// Runs `op` up to `max_attempts` times, sleeping `policy(attempt)` between
/// attempts and logging each failure visibly. Exhaustion returns the last
/// error unchanged.
pub async fn retry_with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    policy: impl Fn(u32) -> Duration,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    tracing::error!(error = %e, attempts = attempt, "call failed, retries exhausted");
                    return Err(e);
                }
                let delay = policy(attempt - 1);
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_secs = delay.as_secs(),
                    "call failed, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
