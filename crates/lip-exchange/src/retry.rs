//! Rate-limit backoff local to a failing call path.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{ExchangeError, ExchangeResult};

const BASE_DELAY: Duration = Duration::from_millis(100);
const MAX_DELAY: Duration = Duration::from_secs(5);
const MAX_RETRIES: u32 = 3;

/// Run `op`, retrying `RateLimited` with exponential backoff
/// (100 ms doubling, capped at 5 s) up to three times. A rate limit that
/// survives all retries surfaces as a transient transport failure.
pub async fn with_rate_limit_retry<T, F, Fut>(mut op: F) -> ExchangeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ExchangeResult<T>>,
{
    let mut delay = BASE_DELAY;
    let mut attempt = 0u32;
    loop {
        match op().await {
            Err(ExchangeError::RateLimited) if attempt < MAX_RETRIES => {
                attempt += 1;
                warn!(attempt, delay_ms = delay.as_millis() as u64, "Rate limited, backing off");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(ExchangeError::RateLimited) => {
                return Err(ExchangeError::TransportUnavailable(
                    "rate limited after retries".to_string(),
                ));
            }
            other => return other,
        }
    }
}
