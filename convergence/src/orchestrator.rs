//! Orchestrator — owns the iteration budget and the single public entry
//! point, [`Orchestrator::process`].
//!
//! Loop contract: run a competition cycle, record it, stop when the winner's
//! confidence reaches the output threshold or the budget is exhausted —
//! both are successful terminations. The supervisor then composes the final
//! answer from the recorded history.
//!
//! One orchestrator can serve concurrent queries: each `process` call owns a
//! fresh [`RunState`] (and with it a fresh relationship graph), while the
//! processor set and collaborators are shared read-only.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::fusion::{ConcatFuser, Fuser};
use crate::engine::{CompetitionEngine, EngineError};
use crate::events::{preview, Observer, RunEvent, SharedEventBus};
use crate::processor::{Processor, ProcessorHandle};
use crate::registry::{CapabilityRegistry, RegistryError};
use crate::scorer::Scorer;
use crate::state::{IterationRecord, RunState};
use crate::supervisor::{ExtractiveSupervisor, Supervisor};

/// A completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub answer: String,
    pub confidence: f64,
    pub history: Vec<IterationRecord>,
}

/// Fatal run failures. Each carries the partial history recorded before the
/// failure so the caller can diagnose what happened.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("no processors available at iteration {iteration}")]
    NoProcessorsAvailable {
        iteration: u32,
        history: Vec<IterationRecord>,
    },

    #[error("supervision failed after {iterations} iterations: {reason}")]
    SupervisionFailed {
        iterations: u32,
        reason: String,
        history: Vec<IterationRecord>,
    },

    #[error("run cancelled at iteration {iteration}")]
    Cancelled {
        iteration: u32,
        history: Vec<IterationRecord>,
    },
}

impl RunError {
    /// The iteration records completed before the failure.
    pub fn history(&self) -> &[IterationRecord] {
        match self {
            Self::NoProcessorsAvailable { history, .. }
            | Self::SupervisionFailed { history, .. }
            | Self::Cancelled { history, .. } => history,
        }
    }
}

/// The loop controller. Build one per processor line-up, then call
/// [`Orchestrator::process`] per query.
pub struct Orchestrator {
    config: EngineConfig,
    processors: Vec<ProcessorHandle>,
    scorer: Arc<dyn Scorer>,
    supervisor: Arc<dyn Supervisor>,
    fuser: Arc<dyn Fuser>,
    observers: Vec<Arc<dyn Observer>>,
    bus: Option<SharedEventBus>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(scorer: Arc<dyn Scorer>, config: EngineConfig) -> Self {
        Self {
            config,
            processors: Vec::new(),
            scorer,
            supervisor: Arc::new(ExtractiveSupervisor),
            fuser: Arc::new(ConcatFuser),
            observers: Vec::new(),
            bus: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_supervisor(mut self, supervisor: Arc<dyn Supervisor>) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn with_fuser(mut self, fuser: Arc<dyn Fuser>) -> Self {
        self.fuser = fuser;
        self
    }

    /// Inject a per-query observer. Observers may not affect the run:
    /// panics are swallowed and logged.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Attach an event bus. The bus receives run lifecycle events and, as
    /// an observer, a bridged event per recorded iteration.
    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.observers.push(bus.clone());
        self.bus = Some(bus);
        self
    }

    /// Instantiate a capability from the registry and add it to the
    /// line-up under its capability name.
    pub fn add_processor(
        &mut self,
        registry: &CapabilityRegistry,
        name: &str,
        args: &serde_json::Value,
    ) -> Result<(), RegistryError> {
        let instance = registry.instantiate(name, args)?;
        self.processors
            .push(ProcessorHandle::new(name, Arc::from(instance)));
        Ok(())
    }

    /// Add a pre-built processor instance.
    pub fn add_processor_instance(&mut self, name: impl Into<String>, instance: Arc<dyn Processor>) {
        self.processors.push(ProcessorHandle::new(name, instance));
    }

    pub fn processor_names(&self) -> Vec<String> {
        self.processors.iter().map(|p| p.name.clone()).collect()
    }

    /// Token callers use to cancel in-flight runs cooperatively.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Process one query to an answer and confidence.
    pub async fn process(&self, query: &str) -> Result<RunOutcome, RunError> {
        let engine = CompetitionEngine::new(
            self.scorer.clone(),
            self.fuser.clone(),
            self.config.clone(),
        );
        let mut state = RunState::new(query);
        info!(
            run_id = %state.run_id,
            processors = self.processors.len(),
            max_iterations = self.config.max_iterations,
            "starting run"
        );
        self.publish(RunEvent::RunStarted {
            run_id: state.run_id.clone(),
            query_preview: preview(query),
            processors: self.processor_names(),
            timestamp: Utc::now(),
        });

        while state.iteration < self.config.max_iterations {
            if self.cancel.is_cancelled() {
                return Err(self.fail_cancelled(state));
            }
            debug!(run_id = %state.run_id, iteration = state.iteration, "starting iteration");

            let cycle = match engine
                .run_cycle(&self.processors, &mut state, &self.cancel)
                .await
            {
                Ok(cycle) => cycle,
                Err(EngineError::NoProcessorsAvailable { attempted }) => {
                    let iteration = state.iteration;
                    self.publish(RunEvent::RunFailed {
                        run_id: state.run_id.clone(),
                        iteration,
                        reason: format!("no processors available ({attempted} attempted)"),
                        timestamp: Utc::now(),
                    });
                    return Err(RunError::NoProcessorsAvailable {
                        iteration,
                        history: state.into_history(),
                    });
                }
                Err(EngineError::Cancelled { .. }) => {
                    return Err(self.fail_cancelled(state));
                }
            };

            let record = IterationRecord {
                run_id: state.run_id.clone(),
                iteration: state.iteration,
                query: state.query().to_string(),
                confidence: cycle.winner.as_ref().map(|w| w.confidence()),
                winner: cycle.winner,
                chunks: cycle.chunks,
                link_delta: cycle.link_delta,
                recorded_at: Utc::now(),
            };
            debug!(
                run_id = %state.run_id,
                iteration = record.iteration,
                winner = record.winner_name().unwrap_or("<none>"),
                dropped = cycle.ask_failures.len() + cycle.timed_out.len(),
                "iteration recorded"
            );
            state.record(record.clone());
            self.notify_observers(&record);

            // Converged: a no-winner round counts as confidence 0.0 and
            // never terminates the loop early.
            if let Some(winner) = &record.winner {
                if winner.confidence() >= self.config.output_threshold {
                    info!(
                        run_id = %state.run_id,
                        iteration = record.iteration,
                        confidence = winner.confidence(),
                        "confidence threshold reached"
                    );
                    break;
                }
                if let Some(question) = &winner.additional_question {
                    state.refine_query(question);
                }
            }
            state.advance();
        }

        self.supervise(state).await
    }

    /// Hand the recorded history to the supervisor for the final verdict.
    async fn supervise(&self, state: RunState) -> Result<RunOutcome, RunError> {
        let iterations = state.history().len() as u32;

        let Some(winner) = state.last_winner().cloned() else {
            self.publish(RunEvent::RunFailed {
                run_id: state.run_id.clone(),
                iteration: state.iteration,
                reason: "no winner produced in any iteration".to_string(),
                timestamp: Utc::now(),
            });
            return Err(RunError::SupervisionFailed {
                iterations,
                reason: "no winner produced in any iteration".to_string(),
                history: state.into_history(),
            });
        };

        let decision = tokio::time::timeout(
            self.config.per_call_timeout,
            self.supervisor
                .decide(state.original_query(), &winner, state.history()),
        )
        .await;

        let verdict = match decision {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(err)) => return Err(self.fail_supervision(state, err.to_string())),
            Err(_) => return Err(self.fail_supervision(state, "supervisor timed out".to_string())),
        };

        info!(
            run_id = %state.run_id,
            iterations,
            confidence = verdict.confidence,
            "run completed"
        );
        self.publish(RunEvent::RunCompleted {
            run_id: state.run_id.clone(),
            iterations,
            confidence: verdict.confidence,
            timestamp: Utc::now(),
        });

        Ok(RunOutcome {
            run_id: state.run_id.clone(),
            answer: verdict.answer,
            confidence: verdict.confidence,
            history: state.into_history(),
        })
    }

    fn fail_supervision(&self, state: RunState, reason: String) -> RunError {
        self.publish(RunEvent::RunFailed {
            run_id: state.run_id.clone(),
            iteration: state.iteration,
            reason: reason.clone(),
            timestamp: Utc::now(),
        });
        RunError::SupervisionFailed {
            iterations: state.history().len() as u32,
            reason,
            history: state.into_history(),
        }
    }

    fn fail_cancelled(&self, state: RunState) -> RunError {
        let iteration = state.iteration;
        warn!(run_id = %state.run_id, iteration, "run cancelled");
        self.publish(RunEvent::RunFailed {
            run_id: state.run_id.clone(),
            iteration,
            reason: "cancelled".to_string(),
            timestamp: Utc::now(),
        });
        RunError::Cancelled {
            iteration,
            history: state.into_history(),
        }
    }

    fn notify_observers(&self, record: &IterationRecord) {
        for observer in &self.observers {
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| observer.on_iteration(record)));
            if outcome.is_err() {
                warn!(
                    iteration = record.iteration,
                    "observer panicked; notification dropped"
                );
            }
        }
    }

    fn publish(&self, event: RunEvent) {
        if let Some(bus) = &self.bus {
            bus.publish(event);
        }
    }
}
