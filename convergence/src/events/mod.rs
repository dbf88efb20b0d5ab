//! Observation layer: iteration observers and the run event bus.
//!
//! Observation never affects control flow. The orchestrator swallows (and
//! logs) observer panics, and the bus's publish cannot fail. Telemetry and
//! experiment loggers live behind these two surfaces, outside the core.

pub mod bus;
pub mod types;

pub use bus::{EventBus, SharedEventBus};
pub use types::{preview, RunEvent};

use chrono::Utc;

use crate::state::IterationRecord;

/// Per-iteration observer, injected into the orchestrator for one query —
/// never a process-wide singleton, so concurrent queries cannot race on
/// logging state.
pub trait Observer: Send + Sync {
    fn on_iteration(&self, record: &IterationRecord);
}

/// The bus doubles as an observer: each recorded iteration becomes an
/// [`RunEvent::IterationCompleted`] on the channel.
impl Observer for EventBus {
    fn on_iteration(&self, record: &IterationRecord) {
        self.publish(RunEvent::IterationCompleted {
            run_id: record.run_id.clone(),
            iteration: record.iteration,
            winner: record.winner_name().map(str::to_string),
            confidence: record.confidence,
            links_added: record.link_delta.added.len(),
            links_removed: record.link_delta.removed.len(),
            timestamp: Utc::now(),
        });
    }
}
