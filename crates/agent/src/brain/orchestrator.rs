//! Brain/Worker orchestration.
//!
//! # Architecture
//!
//! ```text
//!            TargetState ──context──┐
//!                 ▲                 ▼
//!                 │          ┌─────────────┐
//!             merge          │    Brain     │  ← plans, never runs tools
//!                 │          └──┬───────▲───┘
//!          ┌──────┴─────┐  task │       │ result
//!          │ Extraction │       ▼       │
//!          └──────▲─────┘  ┌─────────────┐
//!                 │ notes  │   Worker     │  ← runs tools
//!                 └────────┴─────────────┘
//! ```
//!
//! Each iteration: the brain decides, a stop keyword ends the session,
//! otherwise the worker executes, the brain writes notes on the result, the
//! notes are extracted into facts and merged into the state, and the
//! note-taking exchange is dropped from the brain's thread so only
//! decisions accumulate there. When the loop ends for any reason the brain
//! writes a report and a terminal trace event is emitted.

use super::extraction::Extractor;
use super::prompts;
use super::state::{Phase, TargetState};
use super::stop::StopPolicy;
use crate::agent::{Agent, truncate_chars};
use crate::session::ChatSession;
use citycode_config::{AgentRole, AppConfig, BrainConfig};
use citycode_core::error::Result;
use citycode_core::memory::MemoryStore;
use citycode_core::message::Message;
use citycode_core::provider::Provider;
use citycode_core::tool::ToolExecutor;
use citycode_memory::InMemoryStore;
use citycode_telemetry::{EventSink, EventType, LlmProxy, ToolProxy, Tracer};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

/// Characters of a worker result kept per iteration in the report prompt.
const HISTORY_RESULT_CHARS: usize = 500;

/// Why the loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The brain's decision contained a stop keyword.
    StopKeyword,
    MaxIterations,
    /// The brain produced no usable decision.
    BrainUnavailable,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopKeyword => "stop_keyword",
            ExitReason::MaxIterations => "max_iterations",
            ExitReason::BrainUnavailable => "brain_unavailable",
        }
    }
}

/// Live progress, for a UI to render as the session runs.
#[derive(Debug, Clone)]
pub enum BrainProgress {
    IterationStarted {
        iteration: u32,
        max_iterations: u32,
        phase: Phase,
        open_ports: usize,
        findings: usize,
    },
    Decision { iteration: u32, text: String },
    WorkerResult { iteration: u32, text: String },
    StateUpdated { iteration: u32, state: TargetState },
    Finished { reason: ExitReason },
    Failed { error: String },
}

/// One brain decision and what the worker made of it.
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub decision: String,
    /// `None` when the decision stopped the session.
    pub worker_result: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BrainOutcome {
    pub session_id: String,
    /// `None` when the session failed.
    pub exit_reason: Option<ExitReason>,
    pub error: Option<String>,
    pub report: String,
    pub iterations: u32,
    pub state: TargetState,
    pub history: Vec<IterationRecord>,
}

impl BrainOutcome {
    /// The report, preceded by the failure message if there was one.
    pub fn text(&self) -> String {
        match &self.error {
            Some(error) => format!("{error}\n\n{}", self.report),
            None => self.report.clone(),
        }
    }
}

pub struct BrainOrchestrator {
    brain: ChatSession,
    worker: ChatSession,
    extractor: Extractor,
    stop: StopPolicy,
    state: TargetState,
    brain_prompt: String,
    pacing: Duration,
    tracer: Tracer,
    progress: Option<UnboundedSender<BrainProgress>>,
    history: Vec<IterationRecord>,
    initialized: bool,
}

impl BrainOrchestrator {
    /// Assemble a session from ready-made agents.
    ///
    /// The brain agent should have no tools. Both agents are expected to
    /// already be wired to `tracer` through proxies if their calls should
    /// appear in the session's trace.
    pub fn new(
        target: impl Into<String>,
        goal: impl Into<String>,
        brain: Agent,
        worker: Agent,
        extractor: Extractor,
        tracer: Tracer,
    ) -> Self {
        let config = BrainConfig::default();
        Self {
            brain: ChatSession::new(brain),
            worker: ChatSession::new(worker),
            extractor,
            stop: StopPolicy::from_config(&config),
            state: TargetState::new(target, goal, config.max_iterations),
            brain_prompt: prompts::DEFAULT_BRAIN_PROMPT.into(),
            pacing: Duration::from_millis(config.pacing_ms),
            tracer,
            progress: None,
            history: Vec::new(),
            initialized: false,
        }
    }

    /// Wire a session from configuration: tracing proxies on every
    /// capability, a fresh in-memory thread per agent, and the
    /// `[roles.brain]` / `[roles.worker]` LLM settings.
    pub fn from_config(
        config: &AppConfig,
        target: impl Into<String>,
        goal: impl Into<String>,
        brain_provider: Arc<dyn Provider>,
        worker_provider: Arc<dyn Provider>,
        tools: Arc<dyn ToolExecutor>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let tracer = Tracer::fresh(sink);
        let brain_llm: Arc<dyn Provider> = Arc::new(LlmProxy::new(brain_provider, tracer.clone()));
        let worker_llm: Arc<dyn Provider> = Arc::new(LlmProxy::new(worker_provider, tracer.clone()));
        let tools: Arc<dyn ToolExecutor> = Arc::new(ToolProxy::new(tools, tracer.clone()));

        let brain_settings = config.resolve_llm(AgentRole::Brain);
        let worker_settings = config.resolve_llm(AgentRole::Worker);

        let agent = |llm: Arc<dyn Provider>| {
            Agent::new(uuid::Uuid::new_v4().to_string(), Arc::new(InMemoryStore::new()), llm)
                .with_max_steps(config.agent.max_steps)
                .with_history_window(config.agent.history_window)
                .with_rollup(config.agent.rollup.clone())
        };
        let brain = agent(Arc::clone(&brain_llm)).with_llm(&brain_settings);
        let worker = agent(worker_llm).with_llm(&worker_settings).with_tools(tools);
        let extractor = Extractor::new(brain_llm, brain_settings.model.clone());

        Self::new(target, goal, brain, worker, extractor, tracer).with_config(&config.brain)
    }

    /// Replace the default strategist prompt.
    pub fn with_brain_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.brain_prompt = prompt.into();
        self
    }

    pub fn with_max_iterations(mut self, n: u32) -> Self {
        self.state.max_iterations = n;
        self
    }

    /// Pause between iterations.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_stop_policy(mut self, stop: StopPolicy) -> Self {
        self.stop = stop;
        self
    }

    /// Iteration budget, pacing and stop keywords from `[brain]`.
    pub fn with_config(self, config: &BrainConfig) -> Self {
        self.with_max_iterations(config.max_iterations)
            .with_pacing(Duration::from_millis(config.pacing_ms))
            .with_stop_policy(StopPolicy::from_config(config))
    }

    pub fn with_progress(mut self, tx: UnboundedSender<BrainProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn session_id(&self) -> &str {
        self.tracer.trace_id()
    }

    pub fn state(&self) -> &TargetState {
        &self.state
    }

    pub fn brain(&self) -> &ChatSession {
        &self.brain
    }

    pub fn worker(&self) -> &ChatSession {
        &self.worker
    }

    /// Run the session to the end. Never fails: errors are reported in the
    /// outcome and in a `brain_session_failed` event.
    pub async fn run(&mut self) -> BrainOutcome {
        info!(
            session_id = %self.session_id(),
            target = %self.state.target_id,
            max_iterations = self.state.max_iterations,
            "Starting brain session"
        );
        self.tracer.emit(
            EventType::BrainSessionStarted,
            json!({
                "target": self.state.target_id,
                "goal": self.state.goal,
                "max_iterations": self.state.max_iterations,
            }),
        );

        match self.run_loop().await {
            Ok(reason) => {
                info!(reason = reason.as_str(), iterations = self.state.iteration, "Brain loop finished");
                self.send(BrainProgress::Finished { reason });
                let report = self.final_report().await;
                self.tracer.emit(
                    EventType::BrainSessionCompleted,
                    json!({
                        "iterations": self.state.iteration,
                        "exit_reason": reason.as_str(),
                        "target_state": self.state,
                        "final_report": report,
                    }),
                );
                self.outcome(Some(reason), None, report)
            }
            Err(e) => {
                let message = format!("Brain session failed: {e}");
                error!(session_id = %self.session_id(), error = %e, "Brain session failed");
                self.send(BrainProgress::Failed { error: message.clone() });
                let report = self.final_report().await;
                self.tracer.emit(
                    EventType::BrainSessionFailed,
                    json!({
                        "error": message,
                        "iterations": self.state.iteration,
                        "target_state": self.state,
                    }),
                );
                self.outcome(None, Some(message), report)
            }
        }
    }

    async fn run_loop(&mut self) -> Result<ExitReason> {
        self.initialize().await?;

        while self.state.iteration < self.state.max_iterations {
            self.state.iteration += 1;
            let iteration = self.state.iteration;
            self.send(BrainProgress::IterationStarted {
                iteration,
                max_iterations: self.state.max_iterations,
                phase: self.state.phase,
                open_ports: self.state.open_ports.len(),
                findings: self.state.key_findings.len(),
            });

            // 1. Decide
            let prompt = prompts::decision(&self.state.context_block(), &self.state.target_id);
            let decision = self.brain.ask(&prompt, "").await?;
            if !decision.is_done() || decision.text.trim().is_empty() {
                warn!(iteration, status = decision.status.as_str(), "Brain produced no decision");
                return Ok(ExitReason::BrainUnavailable);
            }
            let decision = decision.text.trim().to_string();
            self.send(BrainProgress::Decision {
                iteration,
                text: decision.clone(),
            });

            // 2. Stop?
            if let Some(keyword) = self.stop.matched(&decision) {
                info!(iteration, keyword, "Brain decided to stop");
                self.history.push(IterationRecord {
                    iteration,
                    decision,
                    worker_result: None,
                });
                return Ok(ExitReason::StopKeyword);
            }

            // 3. Execute
            let result = self.worker.ask(&prompts::worker_task(&decision), "").await?;
            self.send(BrainProgress::WorkerResult {
                iteration,
                text: result.text.clone(),
            });

            // 4. Notes, 5. extraction, 6. merge
            let brain_memory = Arc::clone(self.brain.agent().memory());
            let brain_thread = self.brain.thread_id().to_string();
            let checkpoint = brain_memory.message_count(&brain_thread).await?;
            let summary_checkpoint = brain_memory.summary(&brain_thread).await?;

            let notes = self.brain.ask(&prompts::notes(&decision, &result.text), "").await?;
            if notes.is_done() {
                let extraction = self.extractor.extract(&notes.text).await;
                self.state.merge(&extraction);
            } else {
                warn!(iteration, "Brain wrote no notes, state unchanged");
            }

            // 7. Forget the note-taking exchange, including any rollup it triggered
            brain_memory.truncate(&brain_thread, checkpoint).await?;
            brain_memory.update_summary(&brain_thread, &summary_checkpoint).await?;

            self.history.push(IterationRecord {
                iteration,
                decision,
                worker_result: Some(result.text),
            });

            // 8. Report progress and pace
            self.send(BrainProgress::StateUpdated {
                iteration,
                state: self.state.clone(),
            });
            if !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        Ok(ExitReason::MaxIterations)
    }

    /// Seed the brain's thread with its prompt and the target.
    async fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let init = prompts::brain_init(&self.brain_prompt, &self.state.target_id, &self.state.goal);
        self.brain
            .agent()
            .memory()
            .append(self.brain.thread_id(), Message::system(init))
            .await?;
        self.initialized = true;
        Ok(())
    }

    async fn final_report(&mut self) -> String {
        let prompt = prompts::report(
            &self.state.target_id,
            &self.state.goal,
            self.state.iteration,
            &self.state.context_block(),
            &self.history_text(),
        );

        match self.brain.ask(&prompt, "").await {
            Ok(outcome) if outcome.is_done() => self.frame_report(&outcome.text),
            Ok(outcome) => format!("Error generating report: {}", outcome.text),
            Err(e) => {
                warn!(error = %e, "Report generation failed");
                format!("Error generating report: {e}")
            }
        }
    }

    fn history_text(&self) -> String {
        if self.history.is_empty() {
            return "(no iterations completed)".into();
        }
        self.history
            .iter()
            .map(|record| {
                let result = record
                    .worker_result
                    .as_deref()
                    .map(|r| truncate_chars(r, HISTORY_RESULT_CHARS))
                    .unwrap_or_else(|| "(session stopped)".into());
                format!(
                    "Iteration {}:\n  Decision: {}\n  Result: {}",
                    record.iteration, record.decision, result
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn frame_report(&self, body: &str) -> String {
        let rule = "=".repeat(60);
        format!(
            "BRAIN SESSION REPORT\n{rule}\nTarget: {}\nGoal: {}\nIterations: {}/{}\nGenerated: {}\n\n{}\n\n{rule}",
            self.state.target_id,
            self.state.goal,
            self.state.iteration,
            self.state.max_iterations,
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            body.trim(),
        )
    }

    fn outcome(&self, exit_reason: Option<ExitReason>, error: Option<String>, report: String) -> BrainOutcome {
        BrainOutcome {
            session_id: self.session_id().to_string(),
            exit_reason,
            error,
            report,
            iterations: self.state.iteration,
            state: self.state.clone(),
            history: self.history.clone(),
        }
    }

    fn send(&self, event: BrainProgress) {
        if let Some(tx) = &self.progress {
            // A closed receiver only means nobody is watching.
            let _ = tx.send(event);
        }
    }
}
