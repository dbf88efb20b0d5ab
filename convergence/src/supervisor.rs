//! Supervisor — final answer/confidence synthesis after the loop ends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::state::IterationRecord;

/// The supervisor's composed result for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub answer: String,
    pub confidence: f64,
}

/// Error type for supervisor backends.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("supervision failed: {0}")]
    SupervisionFailed(String),
}

/// Composes the final answer from the winning chunk(s) and history.
#[async_trait]
pub trait Supervisor: Send + Sync {
    async fn decide(
        &self,
        query: &str,
        winner: &Chunk,
        history: &[IterationRecord],
    ) -> Result<Verdict, SupervisorError>;
}

/// Default supervisor: the last winner's gist is the answer, its judged
/// confidence is the run's confidence. Backends that re-judge the answer
/// with an independent pass implement [`Supervisor`] themselves.
pub struct ExtractiveSupervisor;

#[async_trait]
impl Supervisor for ExtractiveSupervisor {
    async fn decide(
        &self,
        _query: &str,
        winner: &Chunk,
        _history: &[IterationRecord],
    ) -> Result<Verdict, SupervisorError> {
        Ok(Verdict {
            answer: winner.gist.clone(),
            confidence: winner.confidence(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkScores;

    #[tokio::test]
    async fn test_extractive_supervisor_takes_winner_verbatim() {
        let winner = Chunk::new(
            "lang",
            "the bridge opened in 1937",
            ChunkScores::new(0.9, 0.8, 0.7),
            None,
            2,
        );
        let verdict = ExtractiveSupervisor
            .decide("when did the bridge open?", &winner, &[])
            .await
            .unwrap();
        assert_eq!(verdict.answer, "the bridge opened in 1937");
        assert!((verdict.confidence - 0.8).abs() < 1e-12);
    }
}
