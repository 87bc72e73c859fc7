// Retry policy for portal calls: exponential backoff for network errors, one honored wait for rate limits.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::PortalError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    network_attempts: u32,
    backoff_base: Duration,
    rate_limit_retries: u32,
    default_rate_limit_delay: Duration,
    max_rate_limit_delay: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            network_attempts: config.network_attempts.max(1),
            backoff_base: config.backoff_base,
            rate_limit_retries: config.rate_limit_retries,
            default_rate_limit_delay: config.default_rate_limit_delay,
            max_rate_limit_delay: config.max_rate_limit_delay,
        }
    }

    /// Delay before the retry that follows the `failures`-th network failure.
    fn backoff(&self, failures: u32) -> Duration {
        let exp = self
            .backoff_base
            .saturating_mul(1u32 << (failures.saturating_sub(1)).min(16));
        let jitter_ms = (exp.as_millis() / 4) as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        exp + jitter
    }

    fn rate_limit_delay(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or(self.default_rate_limit_delay)
            .min(self.max_rate_limit_delay)
    }

    /// Run `op` until it succeeds, fails terminally, or the retry budget is spent.
    ///
    /// Auth and parse errors return immediately. Sleeps are async; callers must
    /// not hold locks across this call.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, PortalError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PortalError>>,
    {
        let mut network_failures = 0u32;
        let mut rate_limit_hits = 0u32;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(PortalError::Network(msg)) => {
                    network_failures += 1;
                    if network_failures >= self.network_attempts {
                        warn!(
                            "portal call failed after {} attempts: {}",
                            network_failures, msg
                        );
                        return Err(PortalError::Network(msg));
                    }
                    let delay = self.backoff(network_failures);
                    warn!(
                        "portal call failed (attempt {}), retrying in {:?}: {}",
                        network_failures, delay, msg
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(PortalError::RateLimited { retry_after }) => {
                    if rate_limit_hits >= self.rate_limit_retries {
                        warn!("portal still rate limiting after {} retries", rate_limit_hits);
                        return Err(PortalError::RateLimited { retry_after });
                    }
                    rate_limit_hits += 1;
                    let delay = self.rate_limit_delay(retry_after);
                    warn!("portal rate limited, waiting {:?} before retry", delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}
