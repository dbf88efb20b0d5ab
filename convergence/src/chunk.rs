//! Chunk — one processor's judged contribution for an iteration.
//!
//! A chunk is immutable once built: fusion produces *new* context for the
//! next iteration, it never edits an existing chunk. The derived `weight`
//! can only come from the constructor, so the
//! `weight == relevance × confidence × surprise` invariant holds for every
//! chunk the competition ever sees.

use serde::{Deserialize, Serialize};

/// The three judged components of a chunk, each in `[0.0, 1.0]`.
///
/// All three come out of a single scorer invocation so they reflect one
/// coherent judgment, not three independently re-derived opinions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkScores {
    pub relevance: f64,
    pub confidence: f64,
    pub surprise: f64,
}

impl ChunkScores {
    /// The degraded judgment used when the scoring budget is exhausted:
    /// the chunk cannot win but does not crash the run.
    pub const ZERO: ChunkScores = ChunkScores {
        relevance: 0.0,
        confidence: 0.0,
        surprise: 0.0,
    };

    pub fn new(relevance: f64, confidence: f64, surprise: f64) -> Self {
        Self {
            relevance,
            confidence,
            surprise,
        }
    }

    /// Whether every component lies in the contract range `[0, 1]`.
    pub fn in_range(&self) -> bool {
        [self.relevance, self.confidence, self.surprise]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }

    /// The competition weight derived from the three components.
    pub fn weight(&self) -> f64 {
        self.relevance * self.confidence * self.surprise
    }
}

/// One processor's scored output for a single iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Name the processor was registered under, unique within a run.
    pub processor_name: String,
    /// The text payload produced by the processor.
    pub gist: String,
    /// Follow-up the processor wants answered next, if any.
    pub additional_question: Option<String>,
    /// Iteration this chunk was produced in.
    pub source_iteration: u32,
    scores: ChunkScores,
    weight: f64,
}

impl Chunk {
    /// Build a chunk from a judged gist. The weight is computed here and
    /// nowhere else.
    pub fn new(
        processor_name: impl Into<String>,
        gist: impl Into<String>,
        scores: ChunkScores,
        additional_question: Option<String>,
        source_iteration: u32,
    ) -> Self {
        Self {
            processor_name: processor_name.into(),
            gist: gist.into(),
            additional_question,
            source_iteration,
            scores,
            weight: scores.weight(),
        }
    }

    pub fn relevance(&self) -> f64 {
        self.scores.relevance
    }

    pub fn confidence(&self) -> f64 {
        self.scores.confidence
    }

    pub fn surprise(&self) -> f64 {
        self.scores.surprise
    }

    pub fn scores(&self) -> ChunkScores {
        self.scores
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_is_component_product() {
        let chunk = Chunk::new("math", "42", ChunkScores::new(0.9, 0.9, 0.9), None, 0);
        assert!((chunk.weight() - 0.729).abs() < 1e-9);
        assert!(
            (chunk.weight() - chunk.relevance() * chunk.confidence() * chunk.surprise()).abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn test_zero_scores_cannot_win() {
        let chunk = Chunk::new("vision", "blurry", ChunkScores::ZERO, None, 2);
        assert_eq!(chunk.weight(), 0.0);
        assert!(chunk.scores().in_range());
    }

    #[test]
    fn test_in_range_rejects_out_of_contract_scores() {
        assert!(ChunkScores::new(0.0, 0.5, 1.0).in_range());
        assert!(!ChunkScores::new(1.2, 0.5, 0.5).in_range());
        assert!(!ChunkScores::new(0.5, -0.1, 0.5).in_range());
        assert!(!ChunkScores::new(0.5, 0.5, f64::NAN).in_range());
    }

    #[test]
    fn test_question_travels_with_chunk() {
        let chunk = Chunk::new(
            "search",
            "found three candidates",
            ChunkScores::new(0.5, 0.5, 0.5),
            Some("which candidate is most recent?".to_string()),
            1,
        );
        assert_eq!(
            chunk.additional_question.as_deref(),
            Some("which candidate is most recent?")
        );
        assert_eq!(chunk.source_iteration, 1);
    }
}
