//! Competition Engine — one uptree/downtree iteration.
//!
//! ```text
//! Asking ──▶ Scoring ──▶ Competing ──▶ Broadcasting ──▶ Linking ──▶ Fusing ──▶ Done
//!   │fan-out     │judge       │max-weight     │winner gist     │graph      │merge
//!   │to all      │every       │winner         │to everyone     │delta      │dirty
//!   │processors  │survivor    │(uptree)       │(downtree)      │           │gists
//! ```
//!
//! Failure semantics: processor-level failures are local to the iteration,
//! scorer failures degrade the chunk to zero weight, and only a total
//! Asking failure (no processor reachable at all) is fatal to the run.

pub mod asking;
pub mod competition;
pub mod fusion;
pub mod linking;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunk::Chunk;
use crate::config::EngineConfig;
use crate::graph::LinkDelta;
use crate::processor::{ProcessorHandle, ProcessorReply};
use crate::scorer::{Scorer, ScoringPipeline};
use crate::state::RunState;

use std::sync::Arc;

use self::asking::AskFailure;
use self::fusion::Fuser;

/// Phase of one competition cycle. Phases advance strictly left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CyclePhase {
    Asking,
    Scoring,
    Competing,
    Broadcasting,
    Linking,
    Fusing,
    Done,
}

impl CyclePhase {
    /// The next phase in the cycle; `Done` is absorbing.
    pub fn advance(self) -> CyclePhase {
        match self {
            Self::Asking => Self::Scoring,
            Self::Scoring => Self::Competing,
            Self::Competing => Self::Broadcasting,
            Self::Broadcasting => Self::Linking,
            Self::Linking => Self::Fusing,
            Self::Fusing => Self::Done,
            Self::Done => Self::Done,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Done
    }
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asking => write!(f, "asking"),
            Self::Scoring => write!(f, "scoring"),
            Self::Competing => write!(f, "competing"),
            Self::Broadcasting => write!(f, "broadcasting"),
            Self::Linking => write!(f, "linking"),
            Self::Fusing => write!(f, "fusing"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Engine-wide failures. Everything below this level is absorbed locally.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no processors available: all {attempted} ask calls failed")]
    NoProcessorsAvailable { attempted: usize },

    #[error("cycle cancelled during {phase}")]
    Cancelled { phase: CyclePhase },
}

/// What one cycle produced.
#[derive(Debug)]
pub struct CycleOutcome {
    /// Every chunk that competed, in arrival order.
    pub chunks: Vec<Chunk>,
    /// The uptree winner; `None` when no chunk survived the round.
    pub winner: Option<Chunk>,
    /// Links formed and dissolved this iteration.
    pub link_delta: LinkDelta,
    /// Processors dropped by backend errors.
    pub ask_failures: Vec<AskFailure>,
    /// Processors dropped by the per-call deadline.
    pub timed_out: Vec<String>,
}

/// Drives one iteration of the competition-fusion cycle.
pub struct CompetitionEngine {
    scoring: ScoringPipeline,
    fuser: Arc<dyn Fuser>,
    config: EngineConfig,
}

impl CompetitionEngine {
    pub fn new(scorer: Arc<dyn Scorer>, fuser: Arc<dyn Fuser>, config: EngineConfig) -> Self {
        Self {
            scoring: ScoringPipeline::new(scorer, &config),
            fuser,
            config,
        }
    }

    /// Run one full cycle against the given run state.
    pub async fn run_cycle(
        &self,
        processors: &[ProcessorHandle],
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, EngineError> {
        let mut phase = CyclePhase::Asking;
        debug!(iteration = state.iteration, %phase, "cycle phase");
        let report = asking::fan_out(
            processors,
            state,
            self.config.per_call_timeout,
            self.config.max_concurrency,
            cancel,
        )
        .await?;

        // "Unreachable" means errored, not slow: a round where every
        // processor failed outright aborts the run, a round where every
        // processor merely timed out just records no winner.
        if report.replies.is_empty() && report.timeouts.is_empty() {
            return Err(EngineError::NoProcessorsAvailable {
                attempted: processors.len(),
            });
        }

        phase = phase.advance();
        debug!(iteration = state.iteration, %phase, survivors = report.replies.len(), "cycle phase");
        let chunks = self.score_replies(state, report.replies).await;

        phase = phase.advance();
        debug!(iteration = state.iteration, %phase, "cycle phase");
        let winner = competition::select_winner(&chunks).cloned();
        match &winner {
            Some(w) => info!(
                iteration = state.iteration,
                winner = %w.processor_name,
                weight = w.weight(),
                confidence = w.confidence(),
                "uptree competition settled"
            ),
            None => info!(
                iteration = state.iteration,
                "no chunk survived the round; iteration has no winner"
            ),
        }

        phase = phase.advance();
        debug!(iteration = state.iteration, %phase, "cycle phase");
        if let Some(w) = &winner {
            state.push_broadcast(w.gist.clone());
        }

        phase = phase.advance();
        debug!(iteration = state.iteration, %phase, "cycle phase");
        let link_delta = match &winner {
            Some(w) => {
                let plan = linking::plan_links(
                    &self.scoring,
                    w,
                    &chunks,
                    &state.graph,
                    self.config.similarity_threshold,
                )
                .await;
                for change in plan.delta.added.iter().chain(plan.refreshed.iter()) {
                    state
                        .graph
                        .upsert_link(&change.from, &change.to, change.weight, state.iteration);
                }
                for change in &plan.delta.removed {
                    state.graph.remove_link(&change.from, &change.to);
                }
                plan.delta
            }
            None => LinkDelta::default(),
        };

        phase = phase.advance();
        debug!(iteration = state.iteration, %phase, dirty = link_delta.dirty_processors().len(), "cycle phase");
        self.fuse_dirty(state, &chunks, &link_delta).await;

        phase = phase.advance();
        debug_assert!(phase.is_terminal());

        Ok(CycleOutcome {
            chunks,
            winner,
            link_delta,
            ask_failures: report.failures,
            timed_out: report.timeouts,
        })
    }

    /// Judge every surviving gist. Input order is preserved so the chunk
    /// list is reproducible given the same reply set.
    async fn score_replies(
        &self,
        state: &RunState,
        replies: Vec<(String, ProcessorReply)>,
    ) -> Vec<Chunk> {
        let judged = futures::future::join_all(
            replies
                .iter()
                .map(|(_, reply)| self.scoring.score(state.query(), &reply.gist, state.history())),
        )
        .await;

        replies
            .into_iter()
            .zip(judged)
            .map(|((name, reply), scores)| {
                Chunk::new(
                    name,
                    reply.gist,
                    scores,
                    reply.additional_question,
                    state.iteration,
                )
            })
            .collect()
    }

    /// Merge each dirty processor's gist with its linked neighbors' gists
    /// into its prior context for the next Asking phase.
    async fn fuse_dirty(&self, state: &mut RunState, chunks: &[Chunk], delta: &LinkDelta) {
        for name in delta.dirty_processors() {
            let Some(own) = chunks.iter().find(|c| c.processor_name == name) else {
                debug!(processor = %name, "dirty processor has no chunk this round; skipping fusion");
                continue;
            };
            let neighbor_gists: Vec<String> = state
                .graph
                .neighbors(&name)
                .into_iter()
                .filter(|peer| peer != &name)
                .filter_map(|peer| {
                    chunks
                        .iter()
                        .find(|c| c.processor_name == peer)
                        .map(|c| c.gist.clone())
                })
                .collect();

            match self.fuser.fuse(&own.gist, &neighbor_gists).await {
                Ok(fused) => {
                    debug!(
                        processor = %name,
                        neighbors = neighbor_gists.len(),
                        "fused context updated"
                    );
                    state.set_fused(&name, fused);
                }
                Err(err) => {
                    warn!(processor = %name, error = %err, "fusion failed; keeping previous context");
                }
            }
        }
    }
}
