//! Timing and timeout wrappers used at component boundaries.

use std::fmt::Display;
use std::time::{Duration, Instant};

use docqa_llm::LlmError;
use tracing::Instrument;

/// Run `fut` inside a span named after `operation`, logging start, outcome, and
/// elapsed time.
pub async fn timed<T, E, F>(operation: &'static str, fut: F) -> (Result<T, E>, Duration)
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    let span = tracing::info_span!("docqa.op", operation);
    async move {
        tracing::debug!(operation, "started");
        let started = Instant::now();
        let result = fut.await;
        let elapsed = started.elapsed();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        match &result {
            Ok(_) => tracing::debug!(operation, elapsed_ms, "finished"),
            Err(e) => tracing::error!(operation, elapsed_ms, error = %e, "failed"),
        }
        (result, elapsed)
    }
    .instrument(span)
    .await
}

/// Bound an external call by `seconds`.
///
/// # Errors
///
/// Returns [`LlmError::Timeout`] if the deadline passes, or the call's own error.
pub async fn with_timeout<T, F>(operation: &'static str, seconds: u64, fut: F) -> Result<T, LlmError>
where
    F: Future<Output = Result<T, LlmError>>,
{
    tokio::time::timeout(Duration::from_secs(seconds), fut)
        .await
        .map_err(|_| LlmError::Timeout { operation, seconds })?
}
