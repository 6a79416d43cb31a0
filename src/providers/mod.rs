//! Capability interfaces over the external embedding and generation
//! models, plus the shipped OpenAI-compatible REST implementations.
//!
//! The orchestrator only ever sees these traits, so alternate backends
//! can be substituted without touching it.

pub mod embedding;
pub mod generation;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use embedding::RestEmbeddingProvider;
pub use generation::RestGenerationProvider;

/// Produces one dense vector per input text, order-preserving. Every
/// returned vector must have exactly [`dimensions`](Self::dimensions)
/// components; implementations reject anything else with
/// `EmbeddingDimension` rather than silently coercing.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// The fixed vector dimension this provider declares.
    fn dimensions(&self) -> usize;

    /// Embed `texts` with the tier-selected `model`.
    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Produces an answer to `question` given retrieved `context`.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate with the tier-selected `model`. Output is returned
    /// verbatim apart from trimming surrounding whitespace.
    async fn generate(&self, model: &str, question: &str, context: &str) -> Result<String>;
}

/// Run `op` up to `attempts` times, sleeping `backoff * 2^n` between
/// tries. Non-transient errors (dimension mismatches, config errors)
/// surface immediately.
pub(crate) async fn with_retries<T, F, Fut>(attempts: u32, backoff: Duration, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    debug_assert!(attempts > 0);
    let mut delay = backoff;
    let mut tries = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && tries + 1 < attempts => {
                tries += 1;
                tracing::debug!(attempt = tries, error = %e, "provider call failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShortstackError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let out = with_retries(3, Duration::from_millis(1), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ShortstackError::EmbeddingProvider("flaky".into()))
            } else {
                Ok(42)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_error() {
        let calls = AtomicU32::new(0);
        let err = with_retries(3, Duration::from_millis(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ShortstackError::GenerationProvider("down".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ShortstackError::GenerationProvider(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = with_retries(3, Duration::from_millis(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ShortstackError::EmbeddingDimension {
                expected: 3,
                got: 4,
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ShortstackError::EmbeddingDimension { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
