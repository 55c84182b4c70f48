//! The reason/act loop.
//!
//! One call to [`Agent::step`] is one turn:
//!
//! 1. **Record** the user message in the agent's memory thread
//! 2. **Build** the prompt (system, summary, recent window, user text)
//! 3. **Ask** the LLM, offering the tool schema
//! 4. **If tool calls**: run them one after another, record each result
//!    against its call id, loop back to step 2
//! 5. **If text**: record it as the answer, roll the summary up if the
//!    thread has grown large, and return
//!
//! The loop stops early on an LLM failure or an empty response, and gives up
//! after `max_steps` LLM requests. None of those are errors: they come back
//! as a [`TurnOutcome`] with the matching [`TurnStatus`]. `Err` is reserved
//! for the memory store failing or the stored thread breaking the
//! tool-call/tool-result pairing.

use crate::prompt::PromptBuilder;
use citycode_config::{ResolvedLlm, RollupConfig};
use citycode_core::error::{MemoryError, Result};
use citycode_core::memory::MemoryStore;
use citycode_core::message::{Message, MessageToolCall, Role, SCRATCHPAD_KEY, ScratchEntry};
use citycode_core::provider::{Provider, ProviderRequest, ToolDefinition};
use citycode_core::tool::{FAILED_MARKER, ToolExecutor, render_tool_outcome};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const EMPTY_RESPONSE_MESSAGE: &str = "Agent stopped due to empty LLM response.";
pub const MAX_STEPS_MESSAGE: &str = "Agent stopped after reaching max steps.";

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Done,
    Failed,
    MaxStepsExceeded,
}

impl TurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStatus::Done => "done",
            TurnStatus::Failed => "failed",
            TurnStatus::MaxStepsExceeded => "max_steps_exceeded",
        }
    }
}

/// The result of one turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub status: TurnStatus,
    /// The answer, or the explanation recorded when the turn stopped early.
    pub text: String,
    /// Tokens reported by every LLM response in the turn.
    pub tokens_used: u32,
    /// LLM requests made.
    pub steps: u32,
}

impl TurnOutcome {
    pub fn is_done(&self) -> bool {
        self.status == TurnStatus::Done
    }
}

/// A single agent bound to one memory thread.
pub struct Agent {
    thread_id: String,
    memory: Arc<dyn MemoryStore>,
    provider: Arc<dyn Provider>,
    /// `None` for agents that only reason (the brain).
    tools: Option<Arc<dyn ToolExecutor>>,
    builder: PromptBuilder,
    model: String,
    temperature: f32,
    top_p: Option<f32>,
    max_tokens: Option<u32>,
    reasoning_effort: Option<String>,
    max_steps: u32,
    history_window: usize,
    rollup: RollupConfig,
}

impl Agent {
    pub fn new(thread_id: impl Into<String>, memory: Arc<dyn MemoryStore>, provider: Arc<dyn Provider>) -> Self {
        Self {
            thread_id: thread_id.into(),
            memory,
            provider,
            tools: None,
            builder: PromptBuilder::default(),
            model: String::new(),
            temperature: 0.7,
            top_p: None,
            max_tokens: None,
            reasoning_effort: None,
            max_steps: 10,
            history_window: 40,
            rollup: RollupConfig::default(),
        }
    }

    /// Give the agent a tool capability.
    pub fn with_tools(mut self, tools: Arc<dyn ToolExecutor>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_prompt_builder(mut self, builder: PromptBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Apply resolved LLM settings (model, sampling, token cap).
    pub fn with_llm(mut self, llm: &ResolvedLlm) -> Self {
        self.model = llm.model.clone();
        self.temperature = llm.temperature;
        self.top_p = llm.top_p;
        self.max_tokens = Some(llm.max_tokens);
        self.reasoning_effort = llm.reasoning_effort.clone();
        self
    }

    /// Set max LLM requests per turn.
    pub fn with_max_steps(mut self, max: u32) -> Self {
        self.max_steps = max;
        self
    }

    /// Set how many recent messages are replayed into each prompt.
    pub fn with_history_window(mut self, n: usize) -> Self {
        self.history_window = n;
        self
    }

    pub fn with_rollup(mut self, rollup: RollupConfig) -> Self {
        self.rollup = rollup;
        self
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn memory(&self) -> &Arc<dyn MemoryStore> {
        &self.memory
    }

    /// Run one turn for `user_text`.
    ///
    /// `repo_context` is handed to the prompt builder on every request; it is
    /// only used in AST mode.
    pub async fn step(&self, user_text: &str, repo_context: &str) -> Result<TurnOutcome> {
        info!(thread_id = %self.thread_id, max_steps = self.max_steps, "Starting turn");

        self.memory.append(&self.thread_id, Message::user(user_text)).await?;

        let definitions: Vec<ToolDefinition> = self.tools.as_ref().map(|t| t.definitions()).unwrap_or_default();
        let mut tokens_used: u32 = 0;
        let mut scratch: Vec<ScratchEntry> = Vec::new();

        for step in 1..=self.max_steps {
            debug!(thread_id = %self.thread_id, step, "Agent loop iteration");

            let prompt = self.build_prompt(user_text, repo_context).await?;
            let request = self.request(prompt, definitions.clone());

            let response = match self.provider.complete(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(thread_id = %self.thread_id, step, error = %e, "LLM request failed");
                    let text = format!("{FAILED_MARKER}: Failed to get a response from the LLM: {e}");
                    self.memory.append(&self.thread_id, Message::assistant(&text)).await?;
                    return Ok(TurnOutcome {
                        status: TurnStatus::Failed,
                        text,
                        tokens_used,
                        steps: step,
                    });
                }
            };

            if let Some(usage) = &response.usage {
                tokens_used = tokens_used.saturating_add(usage.total_tokens);
            }

            let message = response.message;

            if !message.tool_calls.is_empty() {
                debug!(tool_count = message.tool_calls.len(), "Executing tool calls");
                let calls = message.tool_calls.clone();
                self.memory
                    .append(&self.thread_id, Message::assistant_tool_calls(message.content, calls.clone()))
                    .await?;

                for call in &calls {
                    let observation = self.run_tool_call(call, &mut scratch).await;
                    self.memory
                        .append(&self.thread_id, Message::tool_result(&call.id, observation))
                        .await?;
                }
                continue;
            }

            if !message.content.trim().is_empty() {
                let text = message.content;
                let mut answer = Message::assistant(&text);
                if !scratch.is_empty() {
                    answer = answer.with_metadata(SCRATCHPAD_KEY, serde_json::to_value(&scratch)?);
                }
                self.memory.append(&self.thread_id, answer).await?;
                self.maybe_rollup().await?;

                info!(
                    thread_id = %self.thread_id,
                    steps = step,
                    tool_calls = scratch.len(),
                    tokens = tokens_used,
                    "Turn complete"
                );
                return Ok(TurnOutcome {
                    status: TurnStatus::Done,
                    text,
                    tokens_used,
                    steps: step,
                });
            }

            warn!(thread_id = %self.thread_id, step, "LLM returned neither tool calls nor content");
            self.memory
                .append(&self.thread_id, Message::assistant(EMPTY_RESPONSE_MESSAGE))
                .await?;
            return Ok(TurnOutcome {
                status: TurnStatus::Failed,
                text: EMPTY_RESPONSE_MESSAGE.into(),
                tokens_used,
                steps: step,
            });
        }

        warn!(thread_id = %self.thread_id, max_steps = self.max_steps, "Max steps reached");
        self.memory
            .append(&self.thread_id, Message::assistant(MAX_STEPS_MESSAGE))
            .await?;
        Ok(TurnOutcome {
            status: TurnStatus::MaxStepsExceeded,
            text: MAX_STEPS_MESSAGE.into(),
            tokens_used,
            steps: self.max_steps,
        })
    }

    /// Summary plus a window of recent messages that never opens on a tool
    /// result whose call fell outside the window.
    async fn build_prompt(&self, user_text: &str, repo_context: &str) -> Result<Vec<Message>> {
        let summary = self.memory.summary(&self.thread_id).await?;
        let mut recent = self.memory.last_events(&self.thread_id, self.history_window).await?;
        let dangling = recent.iter().take_while(|m| m.role == Role::Tool).count();
        recent.drain(..dangling);

        Ok(self.builder.build(&summary, &recent, user_text, repo_context)?)
    }

    fn request(&self, messages: Vec<Message>, tools: Vec<ToolDefinition>) -> ProviderRequest {
        let mut request = ProviderRequest::new(self.model.clone(), messages).with_tools(tools);
        request.temperature = self.temperature;
        request.top_p = self.top_p;
        request.max_tokens = self.max_tokens;
        request.reasoning_effort = self.reasoning_effort.clone();
        request
    }

    /// Run one tool call and return the text recorded as its result.
    async fn run_tool_call(&self, call: &MessageToolCall, scratch: &mut Vec<ScratchEntry>) -> String {
        let args = if call.arguments.trim().is_empty() {
            Ok(serde_json::json!({}))
        } else {
            serde_json::from_str::<serde_json::Value>(&call.arguments)
        };
        let args = match args {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Unparseable tool arguments");
                return format!(
                    "{FAILED_MARKER}: Failed to parse arguments for {}: {e}: {}",
                    call.name, call.arguments
                );
            }
        };

        let Some(tools) = &self.tools else {
            warn!(tool = %call.name, "Tool call from an agent without tools");
            return format!("{FAILED_MARKER}: No tools are available to this agent (requested {})", call.name);
        };

        let start = Instant::now();
        let observation = render_tool_outcome(tools.execute(&call.name, args.clone()).await);
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(tool = %call.name, duration_ms, "Tool executed");

        scratch.push(ScratchEntry {
            action: call.name.clone(),
            args,
            observation: observation.clone(),
            duration_ms,
            timestamp: chrono::Utc::now(),
        });
        observation
    }

    /// Fold the newest messages into the summary once the recent window is
    /// larger than the threshold. Stored messages are left untouched.
    async fn maybe_rollup(&self) -> std::result::Result<(), MemoryError> {
        let window = self.memory.last_events(&self.thread_id, self.rollup.window).await?;
        let total: usize = window.iter().map(|m| m.content.chars().count()).sum();
        if total <= self.rollup.threshold_chars {
            return Ok(());
        }

        let tail = &window[window.len().saturating_sub(self.rollup.keep)..];
        let mut summary = self.memory.summary(&self.thread_id).await?;
        for msg in tail {
            if !summary.is_empty() {
                summary.push('\n');
            }
            summary.push_str(&format!("{}: {}", msg.role, truncate_chars(&msg.content, self.rollup.truncate_chars)));
        }
        self.memory.update_summary(&self.thread_id, &summary).await?;

        debug!(thread_id = %self.thread_id, window_chars = total, folded = tail.len(), "Rolled up summary");
        Ok(())
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use citycode_core::error::ProviderError;
    use citycode_memory::InMemoryStore;
    use serde_json::json;

    fn agent_with(provider: Arc<SequentialMockProvider>, memory: Arc<InMemoryStore>) -> Agent {
        Agent::new("t1", memory, provider)
            .with_tools(Arc::new(MockTools::new()))
            .with_model("mock-model")
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = Arc::new(SequentialMockProvider::single_text("Hello! How can I help?"));
        let memory = Arc::new(InMemoryStore::new());
        let agent = agent_with(provider.clone(), memory.clone());

        let outcome = agent.step("Hello!", "").await.unwrap();
        assert_eq!(outcome.status, TurnStatus::Done);
        assert_eq!(outcome.text, "Hello! How can I help?");
        assert_eq!(outcome.tokens_used, 15);
        assert_eq!(outcome.steps, 1);

        let stored = memory.last_events("t1", 10).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].role, Role::User);
        assert_eq!(stored[1].role, Role::Assistant);
        assert!(stored[1].metadata.is_empty());
    }

    #[tokio::test]
    async fn tool_results_are_correlated_before_next_request() {
        let calls = vec![
            make_tool_call_with_id("c1", "echo", json!({"text": "one"})),
            make_tool_call_with_id("c2", "echo", json!({"text": "two"})),
        ];
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(calls, "thinking", "done"));
        let memory = Arc::new(InMemoryStore::new());
        let agent = agent_with(provider.clone(), memory.clone());

        let outcome = agent.step("echo twice", "").await.unwrap();
        assert!(outcome.is_done());
        assert_eq!(outcome.tokens_used, 30);

        let requests = provider.requests();

        let second = &requests[1];
        let tool_msgs: Vec<&Message> = second.messages.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_msgs.len(), 2);
        assert_eq!(tool_msgs[0].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(tool_msgs[0].content, "one");
        assert_eq!(tool_msgs[1].tool_call_id.as_deref(), Some("c2"));
        assert_eq!(tool_msgs[1].content, "two");

        let issuing = second.messages.iter().find(|m| !m.tool_calls.is_empty()).unwrap();
        assert_eq!(issuing.content, "thinking");
        assert!(second.tools.iter().any(|t| t.name == "echo"));
    }

    #[tokio::test]
    async fn scratchpad_is_attached_to_final_answer() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("echo", json!({"text": "hi"}))],
            "",
            "said hi",
        ));
        let memory = Arc::new(InMemoryStore::new());
        agent_with(provider, memory.clone()).step("say hi", "").await.unwrap();

        let stored = memory.last_events("t1", 10).await.unwrap();
        let answer = stored.last().unwrap();
        let scratch = answer.scratchpad();
        assert_eq!(scratch.len(), 1);
        assert_eq!(scratch[0].action, "echo");
        assert_eq!(scratch[0].args, json!({"text": "hi"}));
        assert_eq!(scratch[0].observation, "hi");
    }

    #[tokio::test]
    async fn failing_tool_does_not_abort_turn() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("boom", json!({}))],
            "",
            "recovered",
        ));
        let memory = Arc::new(InMemoryStore::new());
        let outcome = agent_with(provider.clone(), memory.clone()).step("try it", "").await.unwrap();

        assert!(outcome.is_done());
        assert_eq!(provider.call_count(), 2);
        let stored = memory.last_events("t1", 10).await.unwrap();
        let tool_msg = stored.iter().find(|m| m.role == Role::Tool).unwrap();
        assert!(tool_msg.content.starts_with("FAILED"));
        assert!(tool_msg.content.contains("exploded"));
    }

    #[tokio::test]
    async fn unknown_tool_yields_descriptive_text() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("teleport", json!({}))],
            "",
            "ok",
        ));
        let memory = Arc::new(InMemoryStore::new());
        agent_with(provider, memory.clone()).step("go", "").await.unwrap();

        let stored = memory.last_events("t1", 10).await.unwrap();
        let tool_msg = stored.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool_msg.content, "FAILED: Unknown tool: teleport");
    }

    #[tokio::test]
    async fn bad_arguments_become_tool_error_message() {
        let call = MessageToolCall {
            id: "c1".into(),
            name: "echo".into(),
            arguments: "{not json".into(),
        };
        let tools = Arc::new(MockTools::new());
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(vec![call], "", "fine"));
        let memory = Arc::new(InMemoryStore::new());
        let agent = Agent::new("t1", memory.clone(), provider).with_tools(tools.clone());

        let outcome = agent.step("go", "").await.unwrap();
        assert!(outcome.is_done());
        assert!(tools.calls().is_empty());

        let stored = memory.last_events("t1", 10).await.unwrap();
        let tool_msg = stored.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
        assert!(tool_msg.content.contains("Failed to parse arguments for echo"));
    }

    #[tokio::test]
    async fn max_steps_with_always_tool_calling_llm() {
        let provider = Arc::new(
            SequentialMockProvider::new(vec![make_tool_call_response(
                vec![make_tool_call("echo", json!({"text": "again"}))],
                "",
            )])
            .repeating(),
        );
        let memory = Arc::new(InMemoryStore::new());
        let agent = agent_with(provider.clone(), memory.clone()).with_max_steps(3);

        let outcome = agent.step("loop forever", "").await.unwrap();
        assert_eq!(outcome.status, TurnStatus::MaxStepsExceeded);
        assert_eq!(outcome.text, MAX_STEPS_MESSAGE);
        assert_eq!(outcome.steps, 3);
        assert_eq!(outcome.tokens_used, 45);
        assert_eq!(provider.call_count(), 3);

        let stored = memory.last_events("t1", 100).await.unwrap();
        assert_eq!(stored.last().unwrap().content, MAX_STEPS_MESSAGE);
    }

    #[tokio::test]
    async fn llm_failure_fails_the_turn() {
        let provider = Arc::new(SequentialMockProvider::scripted(vec![Err(ProviderError::Network(
            "connection refused".into(),
        ))]));
        let memory = Arc::new(InMemoryStore::new());
        let outcome = agent_with(provider, memory.clone()).step("hello", "").await.unwrap();

        assert_eq!(outcome.status, TurnStatus::Failed);
        assert!(outcome.text.contains("connection refused"));
        assert_eq!(outcome.tokens_used, 0);

        let stored = memory.last_events("t1", 10).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].content, outcome.text);
    }

    #[tokio::test]
    async fn empty_response_fails_the_turn() {
        let provider = Arc::new(SequentialMockProvider::single_text("   "));
        let memory = Arc::new(InMemoryStore::new());
        let outcome = agent_with(provider, memory).step("hello", "").await.unwrap();
        assert_eq!(outcome.status, TurnStatus::Failed);
        assert_eq!(outcome.text, EMPTY_RESPONSE_MESSAGE);
    }

    #[tokio::test]
    async fn agent_without_tools_answers_every_call_id() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("echo", json!({"text": "x"}))],
            "",
            "plain answer",
        ));
        let memory = Arc::new(InMemoryStore::new());
        let agent = Agent::new("brain", memory.clone(), provider.clone());

        let outcome = agent.step("think", "").await.unwrap();
        assert!(outcome.is_done());
        assert!(provider.requests()[0].tools.is_empty());

        let stored = memory.last_events("brain", 10).await.unwrap();
        let tool_msg = stored.iter().find(|m| m.role == Role::Tool).unwrap();
        assert!(tool_msg.content.starts_with("FAILED: No tools are available"));
    }

    #[tokio::test]
    async fn window_never_opens_on_tool_result() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![
                make_tool_call_with_id("c1", "echo", json!({"text": "a"})),
                make_tool_call_with_id("c2", "echo", json!({"text": "b"})),
            ],
            "",
            "done",
        ));
        let memory = Arc::new(InMemoryStore::new());
        // user, assistant(tool calls), tool, tool: a window of 2 starts on a tool message
        let agent = agent_with(provider.clone(), memory).with_history_window(2);

        let outcome = agent.step("go", "").await.unwrap();
        assert!(outcome.is_done());
        let requests = provider.requests();
        let second = &requests[1];
        assert!(second.messages.iter().all(|m| m.role != Role::Tool));
        assert_eq!(second.messages.last().unwrap().content, "go");
    }

    #[tokio::test]
    async fn history_is_replayed_across_turns() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("first answer"),
            make_text_response("second answer"),
        ]));
        let memory = Arc::new(InMemoryStore::new());
        let agent = agent_with(provider.clone(), memory);

        agent.step("first question", "").await.unwrap();
        agent.step("second question", "").await.unwrap();

        let contents: Vec<String> = provider.requests()[1].messages.iter().map(|m| m.content.clone()).collect();
        assert_eq!(&contents[1..], ["first question", "first answer", "second question"]);
    }

    #[tokio::test]
    async fn rollup_appends_to_summary_when_window_is_large() {
        let long_answer = "x".repeat(500);
        let provider = Arc::new(SequentialMockProvider::single_text(&long_answer));
        let memory = Arc::new(InMemoryStore::new());
        let agent = agent_with(provider, memory.clone()).with_rollup(RollupConfig {
            window: 20,
            threshold_chars: 100,
            keep: 2,
            truncate_chars: 10,
        });

        agent.step("tell me a lot", "").await.unwrap();

        let summary = memory.summary("t1").await.unwrap();
        assert_eq!(summary, "user: tell me a ...\nassistant: xxxxxxxxxx...");
        // Messages themselves are still there
        assert_eq!(memory.last_events("t1", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn small_threads_are_not_rolled_up() {
        let provider = Arc::new(SequentialMockProvider::single_text("short"));
        let memory = Arc::new(InMemoryStore::new());
        agent_with(provider, memory.clone()).step("hi", "").await.unwrap();
        assert!(memory.summary("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn llm_settings_reach_the_request() {
        let provider = Arc::new(SequentialMockProvider::single_text("ok"));
        let memory = Arc::new(InMemoryStore::new());
        let llm = ResolvedLlm {
            model: "openai/gpt-4o".into(),
            temperature: 0.2,
            top_p: Some(0.9),
            max_tokens: 512,
            reasoning_effort: Some("low".into()),
        };
        Agent::new("t1", memory, provider.clone())
            .with_llm(&llm)
            .step("hi", "")
            .await
            .unwrap();

        let requests = provider.requests();

        let request = &requests[0];
        assert_eq!(request.model, "openai/gpt-4o");
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.top_p, Some(0.9));
        assert_eq!(request.max_tokens, Some(512));
        assert_eq!(request.reasoning_effort.as_deref(), Some("low"));
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
