//! Run State — everything one query's processing owns.
//!
//! Created when [`crate::orchestrator::Orchestrator::process`] starts,
//! dropped when it finishes. Concurrent queries never share any of this:
//! each run gets its own counter, query, contexts, history, and graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::chunk::Chunk;
use crate::graph::{LinkDelta, RelationshipGraph};

/// What one iteration produced. Immutable once appended to the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub run_id: String,
    pub iteration: u32,
    /// The query as it stood when this iteration ran.
    pub query: String,
    /// The uptree winner, or `None` when no chunk survived the round.
    pub winner: Option<Chunk>,
    /// Every chunk that competed this iteration.
    pub chunks: Vec<Chunk>,
    /// Links formed and dissolved by this iteration.
    pub link_delta: LinkDelta,
    /// Winning chunk's judged confidence; `None` counts as 0.0 for
    /// termination purposes.
    pub confidence: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl IterationRecord {
    pub fn has_winner(&self) -> bool {
        self.winner.is_some()
    }

    pub fn winner_name(&self) -> Option<&str> {
        self.winner.as_ref().map(|w| w.processor_name.as_str())
    }
}

/// Mutable state for one query's run.
#[derive(Debug)]
pub struct RunState {
    pub run_id: String,
    /// Zero-based iteration counter, advanced by the loop controller.
    pub iteration: u32,
    pub graph: RelationshipGraph,
    original_query: String,
    query: String,
    broadcast: Vec<String>,
    fused: HashMap<String, String>,
    history: Vec<IterationRecord>,
    started_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            run_id: Uuid::new_v4().to_string(),
            iteration: 0,
            graph: RelationshipGraph::new(),
            original_query: query.clone(),
            query,
            broadcast: Vec::new(),
            fused: HashMap::new(),
            history: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// The query as the caller posed it.
    pub fn original_query(&self) -> &str {
        &self.original_query
    }

    /// The running query, including appended follow-up questions.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Append a winner's follow-up question to the running query.
    pub fn refine_query(&mut self, question: &str) {
        self.query.push(' ');
        self.query.push_str(question);
    }

    /// Winning gists broadcast so far, oldest first.
    pub fn broadcast(&self) -> &[String] {
        &self.broadcast
    }

    pub fn push_broadcast(&mut self, gist: String) {
        self.broadcast.push(gist);
    }

    /// Fused prior context for a processor, set by the last fusion that
    /// touched it.
    pub fn fused_for(&self, processor: &str) -> Option<&str> {
        self.fused.get(processor).map(String::as_str)
    }

    pub fn set_fused(&mut self, processor: &str, context: String) {
        self.fused.insert(processor.to_string(), context);
    }

    pub fn record(&mut self, record: IterationRecord) {
        self.history.push(record);
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    pub fn into_history(self) -> Vec<IterationRecord> {
        self.history
    }

    /// The most recent winner across all recorded iterations.
    pub fn last_winner(&self) -> Option<&Chunk> {
        self.history.iter().rev().find_map(|r| r.winner.as_ref())
    }

    pub fn advance(&mut self) {
        self.iteration += 1;
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkScores;

    fn record_with_winner(state: &RunState, winner: Option<Chunk>) -> IterationRecord {
        IterationRecord {
            run_id: state.run_id.clone(),
            iteration: state.iteration,
            query: state.query().to_string(),
            confidence: winner.as_ref().map(|w| w.confidence()),
            winner,
            chunks: Vec::new(),
            link_delta: LinkDelta::default(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_query_refinement_appends() {
        let mut state = RunState::new("who painted this?");
        state.refine_query("is it from the 19th century?");
        assert_eq!(
            state.query(),
            "who painted this? is it from the 19th century?"
        );
        assert_eq!(state.original_query(), "who painted this?");
    }

    #[test]
    fn test_last_winner_skips_winnerless_iterations() {
        let mut state = RunState::new("q");
        let chunk = Chunk::new("lang", "an answer", ChunkScores::new(0.5, 0.5, 0.5), None, 0);

        let first = record_with_winner(&state, Some(chunk));
        state.record(first);
        state.advance();
        let second = record_with_winner(&state, None);
        state.record(second);

        assert_eq!(state.history().len(), 2);
        assert_eq!(state.last_winner().unwrap().processor_name, "lang");
    }

    #[test]
    fn test_fused_context_per_processor() {
        let mut state = RunState::new("q");
        assert!(state.fused_for("vision").is_none());
        state.set_fused("vision", "combined gists".to_string());
        assert_eq!(state.fused_for("vision"), Some("combined gists"));
        assert!(state.fused_for("lang").is_none());
    }

    #[test]
    fn test_runs_do_not_share_identity() {
        let a = RunState::new("q");
        let b = RunState::new("q");
        assert_ne!(a.run_id, b.run_id);
    }
}
