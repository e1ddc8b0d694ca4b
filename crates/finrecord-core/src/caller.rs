//! Single model invocation with a deadline and a bounded retry.

use std::time::Duration;

use crate::generator::{GenerationError, TextGenerator};

#[derive(Debug, Clone)]
pub struct CallerConfig {
    pub max_length: u32,
    pub timeout: Duration,
    /// Extra attempts after the first failure. Only retryable errors are retried.
    pub max_retries: u32,
    /// Base delay before a retry; grows linearly with the attempt number.
    pub retry_backoff: Duration,
}

impl Default for CallerConfig {
    fn default() -> Self {
        Self {
            max_length: 512,
            timeout: Duration::from_secs(120),
            max_retries: 1,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// Invoke the generator and return its first candidate.
///
/// `on_retry` is called with the upcoming attempt number (1-based) and the
/// error that triggered it.
pub async fn call_model(
    generator: &dyn TextGenerator,
    prompt: &str,
    config: &CallerConfig,
    on_retry: impl Fn(u32, &GenerationError),
) -> Result<String, GenerationError> {
    let mut attempt: u32 = 0;
    loop {
        let outcome =
            tokio::time::timeout(config.timeout, generator.generate(prompt, config.max_length))
                .await;

        let err = match outcome {
            Ok(Ok(candidates)) => {
                return candidates
                    .into_iter()
                    .next()
                    .ok_or(GenerationError::EmptyResponse);
            }
            Ok(Err(e)) => e,
            Err(_) => GenerationError::Timeout(config.timeout),
        };

        if attempt >= config.max_retries || !err.is_retryable() {
            tracing::warn!(model = generator.name(), attempt, error = %err, "generation failed");
            return Err(err);
        }

        attempt += 1;
        on_retry(attempt, &err);

        let jitter = Duration::from_millis(fastrand::u64(0..=250));
        let backoff = config.retry_backoff * attempt + jitter;
        tracing::debug!(model = generator.name(), attempt, ?backoff, error = %err, "retrying generation");
        tokio::time::sleep(backoff).await;
    }
}
