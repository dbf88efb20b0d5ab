//! Link formation — relate the winner to sufficiently similar peers.
//!
//! Planning is a pure function of the chunk set, the current graph, and the
//! threshold: running it twice over the same inputs yields the same delta.
//! Only the winner's outgoing edges are ever touched.

use std::collections::BTreeMap;

use crate::chunk::Chunk;
use crate::graph::{LinkChange, LinkDelta, RelationshipGraph};
use crate::scorer::ScoringPipeline;

/// The planned graph changes for one iteration.
#[derive(Debug, Default)]
pub(crate) struct LinkPlan {
    /// Newly formed and dissolved links — the iteration's recorded delta.
    pub delta: LinkDelta,
    /// Links that persist above the threshold; their weight is refreshed
    /// with the fresh similarity evidence but they are not part of the
    /// delta and do not dirty anyone.
    pub refreshed: Vec<LinkChange>,
}

pub(crate) async fn plan_links(
    scoring: &ScoringPipeline,
    winner: &Chunk,
    chunks: &[Chunk],
    graph: &RelationshipGraph,
    threshold: f64,
) -> LinkPlan {
    let mut plan = LinkPlan::default();
    let mut similarities: BTreeMap<String, f64> = BTreeMap::new();

    for chunk in chunks {
        if chunk.processor_name == winner.processor_name {
            continue;
        }
        let sim = scoring.similarity(&winner.gist, &chunk.gist).await;
        similarities.insert(chunk.processor_name.clone(), sim);

        if sim >= threshold {
            let change = LinkChange {
                from: winner.processor_name.clone(),
                to: chunk.processor_name.clone(),
                weight: sim,
            };
            if graph.has_link(&winner.processor_name, &chunk.processor_name) {
                plan.refreshed.push(change);
            } else {
                plan.delta.added.push(change);
            }
        }
    }

    // Previously formed winner-edges that fell below the threshold this
    // iteration. Peers that produced no chunk this round cannot be judged
    // and keep their links untouched.
    for (target, link) in graph.links_from(&winner.processor_name) {
        if let Some(&sim) = similarities.get(&target) {
            if sim < threshold {
                plan.delta.removed.push(LinkChange {
                    from: winner.processor_name.clone(),
                    to: target,
                    weight: link.weight,
                });
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkScores;
    use crate::config::EngineConfig;
    use crate::scorer::{Scorer, ScorerError};
    use crate::state::IterationRecord;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct LexicalOnlyScorer;

    #[async_trait]
    impl Scorer for LexicalOnlyScorer {
        async fn score(
            &self,
            _query: &str,
            _gist: &str,
            _history: &[IterationRecord],
        ) -> Result<ChunkScores, ScorerError> {
            Ok(ChunkScores::new(0.5, 0.5, 0.5))
        }
    }

    fn pipeline() -> ScoringPipeline {
        ScoringPipeline::new(Arc::new(LexicalOnlyScorer), &EngineConfig::default())
    }

    fn chunk(name: &str, gist: &str) -> Chunk {
        Chunk::new(name, gist, ChunkScores::new(0.5, 0.5, 0.5), None, 0)
    }

    fn scenario() -> (Chunk, Vec<Chunk>) {
        let winner = chunk("lang", "the tower is in paris france");
        let chunks = vec![
            winner.clone(),
            chunk("search", "paris france is where the tower is"),
            chunk("math", "seventeen point five squared"),
        ];
        (winner, chunks)
    }

    #[tokio::test]
    async fn test_links_similar_peers_only() {
        let (winner, chunks) = scenario();
        let graph = RelationshipGraph::new();
        let plan = plan_links(&pipeline(), &winner, &chunks, &graph, 0.5).await;

        assert_eq!(plan.delta.added.len(), 1);
        assert_eq!(plan.delta.added[0].from, "lang");
        assert_eq!(plan.delta.added[0].to, "search");
        assert!(plan.delta.removed.is_empty());
        assert!(plan.refreshed.is_empty());
    }

    #[tokio::test]
    async fn test_planning_is_idempotent_within_iteration() {
        let (winner, chunks) = scenario();
        let graph = RelationshipGraph::new();
        let first = plan_links(&pipeline(), &winner, &chunks, &graph, 0.5).await;
        let second = plan_links(&pipeline(), &winner, &chunks, &graph, 0.5).await;
        assert_eq!(first.delta, second.delta);
    }

    #[tokio::test]
    async fn test_existing_link_is_refreshed_not_re_added() {
        let (winner, chunks) = scenario();
        let mut graph = RelationshipGraph::new();
        graph.upsert_link("lang", "search", 0.9, 0);

        let plan = plan_links(&pipeline(), &winner, &chunks, &graph, 0.5).await;
        assert!(plan.delta.added.is_empty());
        assert_eq!(plan.refreshed.len(), 1);
        assert_eq!(plan.refreshed[0].to, "search");
    }

    #[tokio::test]
    async fn test_dissimilar_existing_link_is_removed() {
        let (winner, chunks) = scenario();
        let mut graph = RelationshipGraph::new();
        graph.upsert_link("lang", "math", 0.8, 0);

        let plan = plan_links(&pipeline(), &winner, &chunks, &graph, 0.5).await;
        assert_eq!(plan.delta.removed.len(), 1);
        assert_eq!(plan.delta.removed[0].to, "math");
    }

    #[tokio::test]
    async fn test_absent_peer_keeps_its_link() {
        let (winner, chunks) = scenario();
        let mut graph = RelationshipGraph::new();
        graph.upsert_link("lang", "vision", 0.8, 0);

        // "vision" produced no chunk this round; its link is not judged.
        let plan = plan_links(&pipeline(), &winner, &chunks, &graph, 0.5).await;
        assert!(plan
            .delta
            .removed
            .iter()
            .all(|change| change.to != "vision"));
    }
}
