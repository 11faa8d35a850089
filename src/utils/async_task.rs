use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Retries `task` under `policy`: each attempt runs against the policy
/// timeout, failed attempts double the delay up to the cap, and a
/// random jitter spreads retries so backlogged callers do not stampede.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    label: &str,
    task: F,
    policy: &BackoffPolicy,
) -> Result<P>
where
    F: Fn() -> T,
    T: std::future::Future<Output = Result<P>>,
{
    let timeout_duration = Duration::from_millis(policy.timeout_ms);
    let mut last = Error::Fatal(format!("{label}: no attempt was made"));

    for attempt in 0..policy.max_retries {
        match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => {
                return Ok(r);
            }
            Ok(Err(error)) => {
                warn!("{label} attempt {} failed: {:?}", attempt + 1, &error);
                last = error;
            }
            Err(_) => {
                warn!(
                    "{label} attempt {} timed out after {:?}",
                    attempt + 1,
                    timeout_duration
                );
                last = Error::Fatal(format!("{label} timed out after {timeout_duration:?}"));
            }
        };

        if attempt + 1 < policy.max_retries {
            sleep(backoff_delay(policy, attempt)).await;
        } else {
            warn!("{label} gave up after {} attempts", policy.max_retries);
        }
    }
    Err(last)
}

/// Delay before retrying attempt `attempt + 1`. The cap applies after
/// jitter, so the policy maximum is a hard bound.
fn backoff_delay(policy: &BackoffPolicy, attempt: u32) -> Duration {
    let base = policy.delay_for_attempt(attempt);
    let jitter = rand::thread_rng().gen_range(0..=policy.base_delay_ms.max(2) / 2);
    Duration::from_millis(base.saturating_add(jitter).min(policy.max_delay_ms))
}
