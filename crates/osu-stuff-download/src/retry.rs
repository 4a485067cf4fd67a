//! Retry policy with exponential backoff for lookups

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_attempts: u32,

    pub initial_backoff: Duration,

    pub max_backoff: Duration,

    pub multiplier: f64,

    /// Add up to 30% random delay on top of the backoff
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that makes a single attempt
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Create retry policy from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_parse("OSU_STUFF_MAX_RETRIES").unwrap_or(defaults.max_attempts),
            initial_backoff: env_parse("OSU_STUFF_RETRY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_backoff),
            max_backoff: env_parse("OSU_STUFF_MAX_BACKOFF_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_backoff),
            multiplier: env_parse("OSU_STUFF_BACKOFF_MULTIPLIER").unwrap_or(defaults.multiplier),
            jitter: env_parse("OSU_STUFF_RETRY_JITTER").unwrap_or(defaults.jitter),
        }
    }

    /// Run `f` until it succeeds, fails with a non-retryable error or
    /// runs out of attempts
    pub async fn execute<F, Fut, T>(&self, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.should_retry() || attempt >= self.max_attempts => {
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    warn!("Attempt {} failed: {}", attempt, e);

                    let mut delay = backoff;
                    if self.jitter {
                        let jitter = rand::rng().random_range(0.0..0.3);
                        #[allow(clippy::cast_precision_loss)]
                        let jitter_ms = (delay.as_millis() as f64 * jitter) as u64;
                        delay += Duration::from_millis(jitter_ms);
                    }

                    tokio::time::sleep(delay).await;

                    backoff = Duration::from_secs_f64(
                        (backoff.as_secs_f64() * self.multiplier)
                            .min(self.max_backoff.as_secs_f64()),
                    );
                }
            }
        }
    }
}

pub(crate) fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}
