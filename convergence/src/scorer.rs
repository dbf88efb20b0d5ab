//! Scorer — the judging contract, plus the bounded-retry pipeline the
//! engine actually calls.
//!
//! One [`Scorer::score`] call yields all three components so they come from
//! a single coherent judgment context. The pipeline enforces the contract
//! range, retries up to the configured budget, and degrades to zero scores
//! instead of failing the run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::chunk::ChunkScores;
use crate::config::EngineConfig;
use crate::similarity;
use crate::state::IterationRecord;

/// Error type for scorer backends.
#[derive(Debug, thiserror::Error)]
pub enum ScorerError {
    #[error("scoring failed: {0}")]
    ScoringFailed(String),

    #[error("similarity check failed: {0}")]
    SimilarityFailed(String),
}

/// The judging contract.
///
/// Judged scores may vary between calls — determinism is not required —
/// but each call's triple is one judgment, never re-derived piecemeal.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Rate a gist against the running query and iteration history.
    async fn score(
        &self,
        query: &str,
        gist: &str,
        history: &[IterationRecord],
    ) -> Result<ChunkScores, ScorerError>;

    /// Relatedness of two gists in `[0, 1]`, used by link formation.
    /// Defaults to the lexical comparator; judged scorers can override.
    async fn similarity(&self, a: &str, b: &str) -> Result<f64, ScorerError> {
        Ok(similarity::lexical_cosine(a, b))
    }
}

/// Retry-and-degrade wrapper around a scorer.
///
/// Out-of-range triples are rejected as failed attempts so an invalid chunk
/// never reaches the competition. After the budget is spent the chunk is
/// still emitted, just with [`ChunkScores::ZERO`].
pub struct ScoringPipeline {
    scorer: Arc<dyn Scorer>,
    retry_budget: u32,
    per_call_timeout: Duration,
}

impl ScoringPipeline {
    pub fn new(scorer: Arc<dyn Scorer>, config: &EngineConfig) -> Self {
        Self {
            scorer,
            retry_budget: config.retry_budget,
            per_call_timeout: config.per_call_timeout,
        }
    }

    /// Judge one gist. Infallible by design: exhausting the budget degrades
    /// to zero scores rather than aborting the iteration.
    pub async fn score(&self, query: &str, gist: &str, history: &[IterationRecord]) -> ChunkScores {
        let attempts = self.retry_budget.max(1);
        for attempt in 1..=attempts {
            match tokio::time::timeout(
                self.per_call_timeout,
                self.scorer.score(query, gist, history),
            )
            .await
            {
                Ok(Ok(scores)) if scores.in_range() => return scores,
                Ok(Ok(scores)) => warn!(
                    attempt,
                    relevance = scores.relevance,
                    confidence = scores.confidence,
                    surprise = scores.surprise,
                    "scorer returned out-of-range scores; rejecting"
                ),
                Ok(Err(err)) => warn!(attempt, error = %err, "scorer call failed"),
                Err(_) => warn!(attempt, "scorer call timed out"),
            }
        }
        warn!(attempts, "scoring budget exhausted; degrading to zero scores");
        ChunkScores::ZERO
    }

    /// Similarity for link formation. Failures and timeouts degrade to 0.0
    /// (unrelated) — a flaky comparator must not unwind past the engine.
    pub async fn similarity(&self, a: &str, b: &str) -> f64 {
        match tokio::time::timeout(self.per_call_timeout, self.scorer.similarity(a, b)).await {
            Ok(Ok(sim)) => sim.clamp(0.0, 1.0),
            Ok(Err(err)) => {
                warn!(error = %err, "similarity check failed; treating gists as unrelated");
                0.0
            }
            Err(_) => {
                warn!("similarity check timed out; treating gists as unrelated");
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `failures` times, then returns `scores`.
    struct FlakyScorer {
        failures: u32,
        scores: ChunkScores,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Scorer for FlakyScorer {
        async fn score(
            &self,
            _query: &str,
            _gist: &str,
            _history: &[IterationRecord],
        ) -> Result<ChunkScores, ScorerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ScorerError::ScoringFailed("judge unavailable".to_string()))
            } else {
                Ok(self.scores)
            }
        }
    }

    fn pipeline(scorer: Arc<dyn Scorer>, retry_budget: u32) -> ScoringPipeline {
        ScoringPipeline::new(
            scorer,
            &EngineConfig {
                retry_budget,
                per_call_timeout: Duration::from_secs(1),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_retries_within_budget() {
        let scorer = Arc::new(FlakyScorer {
            failures: 3,
            scores: ChunkScores::new(0.8, 0.7, 0.6),
            calls: AtomicU32::new(0),
        });
        let scores = pipeline(scorer.clone(), 5).score("q", "gist", &[]).await;
        assert_eq!(scores, ChunkScores::new(0.8, 0.7, 0.6));
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_degrades_to_zero_after_budget() {
        let scorer = Arc::new(FlakyScorer {
            failures: u32::MAX,
            scores: ChunkScores::ZERO,
            calls: AtomicU32::new(0),
        });
        let scores = pipeline(scorer.clone(), 5).score("q", "gist", &[]).await;
        assert_eq!(scores, ChunkScores::ZERO);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_out_of_range_counts_as_failed_attempt() {
        struct OutOfRangeScorer;

        #[async_trait]
        impl Scorer for OutOfRangeScorer {
            async fn score(
                &self,
                _query: &str,
                _gist: &str,
                _history: &[IterationRecord],
            ) -> Result<ChunkScores, ScorerError> {
                Ok(ChunkScores::new(1.5, 0.5, 0.5))
            }
        }

        let scores = pipeline(Arc::new(OutOfRangeScorer), 3)
            .score("q", "gist", &[])
            .await;
        assert_eq!(scores, ChunkScores::ZERO);
    }

    #[tokio::test]
    async fn test_default_similarity_is_lexical() {
        struct PlainScorer;

        #[async_trait]
        impl Scorer for PlainScorer {
            async fn score(
                &self,
                _query: &str,
                _gist: &str,
                _history: &[IterationRecord],
            ) -> Result<ChunkScores, ScorerError> {
                Ok(ChunkScores::new(0.5, 0.5, 0.5))
            }
        }

        let pipeline = pipeline(Arc::new(PlainScorer), 1);
        let same = pipeline.similarity("red apple", "red apple").await;
        let unrelated = pipeline.similarity("red apple", "blue whale").await;
        assert!((same - 1.0).abs() < 1e-9);
        assert_eq!(unrelated, 0.0);
    }

    #[tokio::test]
    async fn test_similarity_failure_degrades_to_unrelated() {
        struct BrokenComparator;

        #[async_trait]
        impl Scorer for BrokenComparator {
            async fn score(
                &self,
                _query: &str,
                _gist: &str,
                _history: &[IterationRecord],
            ) -> Result<ChunkScores, ScorerError> {
                Ok(ChunkScores::new(0.5, 0.5, 0.5))
            }

            async fn similarity(&self, _a: &str, _b: &str) -> Result<f64, ScorerError> {
                Err(ScorerError::SimilarityFailed("comparator down".to_string()))
            }
        }

        let sim = pipeline(Arc::new(BrokenComparator), 1)
            .similarity("a", "a")
            .await;
        assert_eq!(sim, 0.0);
    }
}
