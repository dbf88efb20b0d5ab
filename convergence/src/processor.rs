//! Processor — the capability contract.
//!
//! A processor is an opaque capability (vision, language, search, math, ...)
//! that turns a query plus accumulated context into a candidate gist. It does
//! **not** judge its own output; scoring is delegated to the [`Scorer`]
//! (crate::scorer::Scorer) so the judging policy stays uniform across
//! heterogeneous backends.
//!
//! Broadcast and fused context flow *into* each call through [`AskContext`]
//! rather than being written into the processor, so instances stay stateless
//! and can serve concurrent asks.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything a processor gets to see for one ask.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AskContext {
    /// The running query, including any appended follow-up questions.
    pub query: String,
    /// Winning gists broadcast in previous iterations, oldest first.
    pub broadcast: Vec<String>,
    /// This processor's fused prior from link formation, if any.
    pub fused_prior: Option<String>,
    /// Zero-based iteration number.
    pub iteration: u32,
}

impl AskContext {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Whether any shared context has accumulated yet.
    pub fn has_context(&self) -> bool {
        !self.broadcast.is_empty() || self.fused_prior.is_some()
    }
}

/// A processor's raw (not yet judged) output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorReply {
    pub gist: String,
    pub additional_question: Option<String>,
}

impl ProcessorReply {
    pub fn new(gist: impl Into<String>) -> Self {
        Self {
            gist: gist.into(),
            additional_question: None,
        }
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.additional_question = Some(question.into());
        self
    }
}

/// Failure of a single processor. Always local to one iteration — the
/// processor is excluded from that round's competition and nothing else.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// The backend call itself failed (upstream error, transport, ...).
    #[error("ask failed: {0}")]
    AskFailed(#[from] anyhow::Error),

    /// The backend answered with something unusable as a gist.
    #[error("malformed reply: {0}")]
    MalformedReply(String),
}

/// The capability contract every backend implements.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Produce a candidate gist for the query under the given context.
    async fn ask(&self, ctx: &AskContext) -> Result<ProcessorReply, ProcessorError>;
}

/// A processor together with the name it joined the run under.
#[derive(Clone)]
pub struct ProcessorHandle {
    pub name: String,
    pub instance: Arc<dyn Processor>,
}

impl ProcessorHandle {
    pub fn new(name: impl Into<String>, instance: Arc<dyn Processor>) -> Self {
        Self {
            name: name.into(),
            instance,
        }
    }
}

impl std::fmt::Debug for ProcessorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
