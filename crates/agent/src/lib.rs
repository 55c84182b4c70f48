//! The citycode agent: a reason/act loop over a memory thread, and the
//! orchestrators built on top of it.
//!
//! The [`Agent`] follows a **Reason → Act → Observe** cycle:
//!
//! 1. **Record** the user message in the thread
//! 2. **Build the prompt** (system prompt, summary, recent window)
//! 3. **Send to LLM** via the configured provider
//! 4. **If tool calls**: execute tools, record results, loop back to step 2
//! 5. **If text response**: record it and end the turn
//!
//! The loop ends on a text answer, an LLM failure or the step limit.
//!
//! On top of the loop:
//!
//! - [`ChatSession`] keeps one thread across turns
//! - [`TaskOrchestrator`] runs one-shot traced tasks, alone or in batches
//! - [`BrainOrchestrator`] pairs a planning brain with a tool-using worker

pub mod agent;
pub mod brain;
pub mod prompt;
pub mod session;
pub mod task;

#[cfg(test)]
mod test_helpers;

pub use agent::{Agent, TurnOutcome, TurnStatus};
pub use brain::{BrainOrchestrator, BrainOutcome, BrainProgress, ExitReason, Phase, StopPolicy, TargetState};
pub use prompt::{ContextMode, PromptBuilder};
pub use session::ChatSession;
pub use task::{ContextStrategy, NullContext, StaticContext, TaskOrchestrator};
