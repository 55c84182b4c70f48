//! Two-agent planning: a tool-less brain directs a tool-using worker and
//! keeps a structured picture of the target between iterations.

pub mod extraction;
pub mod orchestrator;
pub mod prompts;
pub mod state;
pub mod stop;

pub use extraction::{ExtractionResult, Extractor, ReasoningStep, ServiceEntry, extraction_schema};
pub use orchestrator::{BrainOrchestrator, BrainOutcome, BrainProgress, ExitReason, IterationRecord};
pub use state::{Phase, TargetState};
pub use stop::StopPolicy;
