//! Asking phase — concurrent fan-out to every registered processor.
//!
//! JoinSet fan-out, Semaphore-bounded, with a per-call deadline and
//! cooperative cancellation. Partial failure policy: a processor that
//! errors or times out is dropped for this iteration only; the round
//! proceeds with whatever survived.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{CyclePhase, EngineError};
use crate::processor::{AskContext, ProcessorHandle, ProcessorReply};
use crate::state::RunState;

/// A processor dropped from the round by a backend error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskFailure {
    pub processor: String,
    pub error: String,
}

enum AskOutcome {
    Replied { processor: String, reply: ProcessorReply },
    Failed(AskFailure),
    TimedOut { processor: String },
    Cancelled,
}

/// What the fan-out collected, in arrival order.
#[derive(Debug, Default)]
pub(crate) struct AskReport {
    pub replies: Vec<(String, ProcessorReply)>,
    pub failures: Vec<AskFailure>,
    pub timeouts: Vec<String>,
}

/// Ask every processor concurrently and collect whatever succeeds before
/// the deadline.
///
/// Fatal only when no processor is reachable at all: an empty processor
/// set, or every single ask failing with an error. A round where everyone
/// merely timed out is survivable — those processors are dropped for this
/// iteration and the round records no winner.
pub(crate) async fn fan_out(
    processors: &[ProcessorHandle],
    state: &RunState,
    per_call_timeout: Duration,
    max_concurrency: Option<usize>,
    cancel: &CancellationToken,
) -> Result<AskReport, EngineError> {
    if processors.is_empty() {
        return Err(EngineError::NoProcessorsAvailable { attempted: 0 });
    }

    let cap = max_concurrency.unwrap_or(processors.len()).max(1);
    let sem = Arc::new(Semaphore::new(cap));
    let mut join_set: JoinSet<AskOutcome> = JoinSet::new();

    for handle in processors {
        let sem = sem.clone();
        let name = handle.name.clone();
        let instance = handle.instance.clone();
        let cancel = cancel.clone();
        let ctx = AskContext {
            query: state.query().to_string(),
            broadcast: state.broadcast().to_vec(),
            fused_prior: state.fused_for(&name).map(str::to_string),
            iteration: state.iteration,
        };

        join_set.spawn(async move {
            let _permit = match sem.acquire().await {
                Ok(permit) => permit,
                Err(_) => return AskOutcome::Cancelled,
            };
            tokio::select! {
                _ = cancel.cancelled() => AskOutcome::Cancelled,
                res = tokio::time::timeout(per_call_timeout, instance.ask(&ctx)) => match res {
                    Ok(Ok(reply)) => AskOutcome::Replied { processor: name, reply },
                    Ok(Err(err)) => AskOutcome::Failed(AskFailure {
                        processor: name,
                        error: err.to_string(),
                    }),
                    Err(_) => AskOutcome::TimedOut { processor: name },
                },
            }
        });
    }

    let mut report = AskReport::default();
    let mut cancelled = false;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(AskOutcome::Replied { processor, reply }) => {
                debug!(%processor, "gist collected");
                report.replies.push((processor, reply));
            }
            Ok(AskOutcome::Failed(failure)) => {
                warn!(
                    processor = %failure.processor,
                    error = %failure.error,
                    "processor dropped for this iteration"
                );
                report.failures.push(failure);
            }
            Ok(AskOutcome::TimedOut { processor }) => {
                warn!(
                    %processor,
                    timeout_ms = per_call_timeout.as_millis() as u64,
                    "processor timed out; dropped for this iteration"
                );
                report.timeouts.push(processor);
            }
            Ok(AskOutcome::Cancelled) => cancelled = true,
            Err(join_err) => {
                // A panicking backend is dropped like any other failure;
                // the round continues with whatever succeeded.
                warn!(error = %join_err, "ask task panicked");
            }
        }
    }

    if cancelled || cancel.is_cancelled() {
        return Err(EngineError::Cancelled {
            phase: CyclePhase::Asking,
        });
    }

    Ok(report)
}
