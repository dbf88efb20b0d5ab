//! Run configuration for the orchestration loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for one query's competition-fusion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Iteration budget for the uptree/downtree loop.
    pub max_iterations: u32,
    /// Winning-chunk confidence at which the loop converges.
    pub output_threshold: f64,
    /// Gist similarity above which a link to the winner is formed.
    pub similarity_threshold: f64,
    /// Deadline for each processor ask and each scorer judgment.
    pub per_call_timeout: Duration,
    /// Scoring attempts before a chunk degrades to zero scores.
    pub retry_budget: u32,
    /// Cap on concurrent processor asks. `None` means every registered
    /// processor may be in flight at once.
    pub max_concurrency: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            output_threshold: 0.5,
            similarity_threshold: 0.5,
            per_call_timeout: Duration::from_secs(30),
            retry_budget: 5,
            max_concurrency: None,
        }
    }
}
