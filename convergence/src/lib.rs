//! Competition-fusion orchestration engine.
//!
//! Fans a query out to a set of independent processors, runs a repeated
//! uptree-competition / downtree-broadcast / link-formation / fusion cycle
//! across them, and converges on a single answer with a confidence score.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       Orchestrator                         │
//! │  • owns the iteration budget and termination check         │
//! │  • single public entry point: process(query)               │
//! └────────────────────────────┬───────────────────────────────┘
//!                              │ one cycle per iteration
//!                              ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │                     CompetitionEngine                      │
//! │  Asking → Scoring → Competing → Broadcasting               │
//! │         → Linking → Fusing → Done                          │
//! └───────┬──────────────┬──────────────┬──────────────────────┘
//!         ▼              ▼              ▼
//!   ┌───────────┐  ┌───────────┐  ┌───────────────┐
//!   │ Processor │  │  Scorer   │  │ Relationship  │
//!   │  (trait)  │  │  (trait)  │  │    Graph      │
//!   └───────────┘  └───────────┘  └───────────────┘
//! ```
//!
//! Processor, scorer, and supervisor backends are external collaborators
//! behind traits; observation (the [`events`] module) can watch a run but
//! never influence it.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use convergence::{CapabilityRegistry, EngineConfig, Orchestrator};
//!
//! let mut registry = CapabilityRegistry::new();
//! registry.register_fn("language", |args| build_language_processor(args));
//! registry.register_fn("vision", |args| build_vision_processor(args));
//! let registry = registry.shared();
//!
//! let mut orchestrator = Orchestrator::new(Arc::new(my_scorer), EngineConfig::default());
//! orchestrator.add_processor(&registry, "language", &serde_json::json!({}))?;
//! orchestrator.add_processor(&registry, "vision", &serde_json::json!({}))?;
//!
//! let outcome = orchestrator.process("what is happening in this scene?").await?;
//! println!("{} ({:.2})", outcome.answer, outcome.confidence);
//! ```

pub mod chunk;
pub mod config;
pub mod engine;
pub mod events;
pub mod graph;
pub mod orchestrator;
pub mod processor;
pub mod registry;
pub mod scorer;
pub mod similarity;
pub mod state;
pub mod supervisor;

// Re-export the public surface.
pub use chunk::{Chunk, ChunkScores};
pub use config::EngineConfig;
pub use engine::asking::AskFailure;
pub use engine::fusion::{ConcatFuser, Fuser, FusionError};
pub use engine::{CompetitionEngine, CycleOutcome, CyclePhase, EngineError};
pub use events::{EventBus, Observer, RunEvent, SharedEventBus};
pub use graph::{Link, LinkChange, LinkDelta, RelationshipGraph};
pub use orchestrator::{Orchestrator, RunError, RunOutcome};
pub use processor::{AskContext, Processor, ProcessorError, ProcessorHandle, ProcessorReply};
pub use registry::{CapabilityRegistry, ProcessorFactory, RegistryError, SharedRegistry};
pub use scorer::{Scorer, ScorerError, ScoringPipeline};
pub use state::{IterationRecord, RunState};
pub use supervisor::{ExtractiveSupervisor, Supervisor, SupervisorError, Verdict};
