use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{ApiError, Result};

/// Configuration for retrying user-initiated sends.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub delays: Vec<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::with_max_retries(2)
    }
}

impl RetryConfig {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delays: Vec::new(),
        }
    }

    /// Backoff starting at 250ms and doubling, capped at 4s.
    pub fn with_max_retries(max_retries: usize) -> Self {
        let delays = (0..max_retries)
            .map(|attempt| Duration::from_millis(250u64 << attempt.min(4)))
            .collect();
        Self {
            max_retries,
            delays,
        }
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        self.delays
            .get(attempt)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::from_secs(1))
    }
}

/// Run a non-idempotent request, retrying only when it never left the client.
///
/// Anything that may have reached the server (any HTTP status, timeouts after
/// connecting) is returned as-is so the backend never sees a duplicate.
pub async fn retry_unsent<T, F, Fut>(config: &RetryConfig, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        match op().await {
            Err(e) if e.was_not_sent() && attempt < config.max_retries => {
                let delay = config.delay_for(attempt);
                warn!(
                    "{} attempt {}/{} failed ({}), retrying in {}ms…",
                    what,
                    attempt + 1,
                    max_attempts,
                    e,
                    delay.as_millis(),
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Whether a failure is worth waiting for the next poll over.
pub fn is_transient(err: &ApiError) -> bool {
    match err {
        ApiError::Network(_) | ApiError::Decode(_) => true,
        ApiError::Status { status, .. } => {
            status.is_server_error() || status.as_u16() == 408 || status.as_u16() == 429
        }
        ApiError::Protocol(_) => false,
    }
}
