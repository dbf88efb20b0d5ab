//! Event types for run observation.
//!
//! These carry enough to follow a run from outside without ever being able
//! to influence it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle events published over the bus during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// Processing of a query began.
    RunStarted {
        run_id: String,
        query_preview: String,
        processors: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// One competition cycle finished and was recorded.
    IterationCompleted {
        run_id: String,
        iteration: u32,
        winner: Option<String>,
        confidence: Option<f64>,
        links_added: usize,
        links_removed: usize,
        timestamp: DateTime<Utc>,
    },

    /// The run converged or exhausted its budget and produced an answer.
    RunCompleted {
        run_id: String,
        iterations: u32,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// The run ended with a fatal error.
    RunFailed {
        run_id: String,
        iteration: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl RunEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::IterationCompleted { .. } => "iteration_completed",
            Self::RunCompleted { .. } => "run_completed",
            Self::RunFailed { .. } => "run_failed",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::IterationCompleted { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunFailed { run_id, .. } => run_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::RunStarted { timestamp, .. }
            | Self::IterationCompleted { timestamp, .. }
            | Self::RunCompleted { timestamp, .. }
            | Self::RunFailed { timestamp, .. } => *timestamp,
        }
    }
}

/// Truncate free text for event payloads.
pub fn preview(text: &str) -> String {
    const MAX: usize = 80;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(MAX).collect();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_tagging() {
        let event = RunEvent::RunCompleted {
            run_id: "run-1".to_string(),
            iterations: 2,
            confidence: 0.9,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "run_completed");
        assert_eq!(event.event_type(), "run_completed");
        assert_eq!(event.run_id(), "run-1");
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(200);
        let short = preview(&long);
        assert_eq!(short.chars().count(), 81);
        assert!(short.ends_with('…'));
        assert_eq!(preview("short"), "short");
    }
}
