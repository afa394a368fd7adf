//! Retry logic with exponential backoff for transient provider errors.

use crate::error::ProviderError;
use crate::types::RetryConfig;
use std::thread;

/// Execute a provider call, retrying transient errors.
///
/// Non-retryable errors return immediately; the last error is returned
/// once all attempts are used.
pub fn with_retry<T, F>(config: &RetryConfig, what: &str, mut operation: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Result<T, ProviderError>,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt + 1 >= attempts => return Err(e),
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                log::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    what,
                    attempt + 1,
                    attempts,
                    e,
                    delay
                );
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}
