//! Traced single-agent tasks.
//!
//! Every task gets its own trace id and memory thread. The LLM and tool
//! capabilities are wrapped in tracing proxies that share the trace id, so
//! the trace log holds the whole story of a task:
//!
//! ```text
//! task_started → context_build_completed → (llm_request → llm_response
//!   → (tool_request → tool_response)*)* → task_completed | task_failed
//! ```

use crate::agent::{Agent, TurnOutcome};
use crate::prompt::{ContextMode, PromptBuilder};
use async_trait::async_trait;
use citycode_config::{AgentConfig, ResolvedLlm, RollupConfig};
use citycode_core::error::Result;
use citycode_core::memory::MemoryStore;
use citycode_core::provider::Provider;
use citycode_core::tool::ToolExecutor;
use citycode_telemetry::{EventSink, EventType, LlmProxy, ToolProxy, Tracer};
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Produces repository context for a request.
#[async_trait]
pub trait ContextStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn build(&self, request: &str) -> Result<String>;
}

/// No context.
pub struct NullContext;

#[async_trait]
impl ContextStrategy for NullContext {
    fn name(&self) -> &str {
        "none"
    }

    async fn build(&self, _request: &str) -> Result<String> {
        Ok(String::new())
    }
}

/// The same text for every request, e.g. a pre-built repository map.
pub struct StaticContext {
    name: String,
    text: String,
}

impl StaticContext {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

#[async_trait]
impl ContextStrategy for StaticContext {
    fn name(&self) -> &str {
        &self.name
    }

    async fn build(&self, _request: &str) -> Result<String> {
        Ok(self.text.clone())
    }
}

/// Runs traced tasks, one at a time or as a bounded batch.
pub struct TaskOrchestrator {
    provider: Arc<dyn Provider>,
    tools: Arc<dyn ToolExecutor>,
    memory: Arc<dyn MemoryStore>,
    sink: Arc<dyn EventSink>,
    context: Arc<dyn ContextStrategy>,
    builder: PromptBuilder,
    llm: Option<ResolvedLlm>,
    max_steps: u32,
    history_window: usize,
    rollup: RollupConfig,
    concurrency: usize,
}

impl TaskOrchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<dyn ToolExecutor>,
        memory: Arc<dyn MemoryStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let defaults = AgentConfig::default();
        Self {
            provider,
            tools,
            memory,
            sink,
            context: Arc::new(NullContext),
            builder: PromptBuilder::default(),
            llm: None,
            max_steps: defaults.max_steps,
            history_window: defaults.history_window,
            rollup: defaults.rollup,
            concurrency: 4,
        }
    }

    pub fn with_context(mut self, context: Arc<dyn ContextStrategy>) -> Self {
        self.context = context;
        self
    }

    pub fn with_prompt_builder(mut self, builder: PromptBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_llm(mut self, llm: ResolvedLlm) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Take step budget, history window and rollup from `[agent]`.
    pub fn with_agent_config(mut self, config: &AgentConfig) -> Self {
        self.max_steps = config.max_steps;
        self.history_window = config.history_window;
        self.rollup = config.rollup.clone();
        self
    }

    /// Maximum tasks in flight during [`execute_batch`](Self::execute_batch).
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Run one task under a fresh trace id and return the agent's answer.
    ///
    /// Turns that stop early (LLM failure, step budget) still complete the
    /// task; their explanation is the result. Only infrastructure errors
    /// produce `task_failed`, and they are returned.
    pub async fn execute_task(&self, request: &str) -> Result<String> {
        let tracer = Tracer::fresh(Arc::clone(&self.sink));
        let start = Instant::now();
        info!(trace_id = %tracer.trace_id(), "Starting task");

        tracer.emit(
            EventType::TaskStarted,
            json!({
                "user_request": request,
                "context_mode": self.builder.mode().as_str(),
            }),
        );

        match self.run_traced(&tracer, request).await {
            Ok(outcome) => {
                tracer.emit(
                    EventType::TaskCompleted,
                    json!({
                        "result": outcome.text,
                        "status": outcome.status.as_str(),
                        "tokens_used": outcome.tokens_used,
                        "duration_seconds": start.elapsed().as_secs_f64(),
                    }),
                );
                Ok(outcome.text)
            }
            Err(e) => {
                warn!(trace_id = %tracer.trace_id(), error = %e, "Task failed");
                tracer.emit(
                    EventType::TaskFailed,
                    json!({
                        "error": e.to_string(),
                        "error_type": e.kind(),
                        "duration_seconds": start.elapsed().as_secs_f64(),
                    }),
                );
                Err(e)
            }
        }
    }

    /// Run many tasks with at most `concurrency` in flight. Results come back
    /// in the order of `requests`.
    pub async fn execute_batch(&self, requests: Vec<String>) -> Vec<Result<String>> {
        let mut results: Vec<(usize, Result<String>)> = stream::iter(requests.into_iter().enumerate())
            .map(|(index, request)| async move { (index, self.execute_task(&request).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    async fn run_traced(&self, tracer: &Tracer, request: &str) -> Result<TurnOutcome> {
        let context_start = Instant::now();
        let context = self.context.build(request).await?;
        tracer.emit(
            EventType::ContextBuildCompleted,
            json!({
                "strategy": self.context.name(),
                "duration_seconds": context_start.elapsed().as_secs_f64(),
                "context_length": context.chars().count(),
                "context": context,
            }),
        );

        // AST context goes into the system prompt; anything else rides on the request.
        let (user_text, repo_context) = if context.trim().is_empty() {
            (request.to_string(), String::new())
        } else if self.builder.mode() == ContextMode::Ast {
            (request.to_string(), context)
        } else {
            (format!("{context}\n\n### User Request:\n{request}"), String::new())
        };

        let provider: Arc<dyn Provider> = Arc::new(LlmProxy::new(Arc::clone(&self.provider), tracer.clone()));
        let tools: Arc<dyn ToolExecutor> = Arc::new(ToolProxy::new(Arc::clone(&self.tools), tracer.clone()));

        let mut agent = Agent::new(tracer.trace_id(), Arc::clone(&self.memory), provider)
            .with_tools(tools)
            .with_prompt_builder(self.builder.clone())
            .with_max_steps(self.max_steps)
            .with_history_window(self.history_window)
            .with_rollup(self.rollup.clone());
        if let Some(llm) = &self.llm {
            agent = agent.with_llm(llm);
        }

        agent.step(&user_text, &repo_context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use citycode_core::message::Role;
    use citycode_core::provider::{ProviderRequest, ProviderResponse};
    use citycode_core::error::ProviderError;
    use citycode_memory::InMemoryStore;
    use citycode_telemetry::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn orchestrator(provider: Arc<dyn Provider>, sink: Arc<MemorySink>) -> TaskOrchestrator {
        TaskOrchestrator::new(provider, Arc::new(MockTools::new()), Arc::new(InMemoryStore::new()), sink)
    }

    fn event_types(sink: &MemorySink) -> Vec<EventType> {
        sink.events().iter().map(|e| e.event_type).collect()
    }

    #[tokio::test]
    async fn traced_task_event_sequence() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("echo", serde_json::json!({"text": "hi"}))],
            "",
            "all done",
        ));
        let sink = Arc::new(MemorySink::new());
        let result = orchestrator(provider, sink.clone()).execute_task("say hi").await.unwrap();
        assert_eq!(result, "all done");

        assert_eq!(
            event_types(&sink),
            vec![
                EventType::TaskStarted,
                EventType::ContextBuildCompleted,
                EventType::LlmRequest,
                EventType::LlmResponse,
                EventType::ToolRequest,
                EventType::ToolResponse,
                EventType::LlmRequest,
                EventType::LlmResponse,
                EventType::TaskCompleted,
            ]
        );

        let events = sink.events();
        let trace_id = &events[0].trace_id;
        assert!(events.iter().all(|e| &e.trace_id == trace_id));

        let completed = sink.of_type(EventType::TaskCompleted);
        assert_eq!(completed[0].data["status"], "done");
        assert_eq!(completed[0].data["tokens_used"], 30);
        assert_eq!(sink.of_type(EventType::TaskStarted)[0].data["context_mode"], "none");
    }

    #[tokio::test]
    async fn static_context_is_prepended_to_request() {
        let provider = Arc::new(SequentialMockProvider::single_text("ok"));
        let sink = Arc::new(MemorySink::new());
        orchestrator(provider.clone(), sink.clone())
            .with_context(Arc::new(StaticContext::new("repo_map", "src/lib.rs")))
            .execute_task("explain")
            .await
            .unwrap();

        let user = provider.requests()[0]
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .cloned()
            .unwrap();
        assert_eq!(user.content, "src/lib.rs\n\n### User Request:\nexplain");

        let ctx = &sink.of_type(EventType::ContextBuildCompleted)[0];
        assert_eq!(ctx.data["strategy"], "repo_map");
        assert_eq!(ctx.data["context_length"], 10);
    }

    #[tokio::test]
    async fn ast_mode_puts_context_in_system_prompt() {
        let provider = Arc::new(SequentialMockProvider::single_text("ok"));
        let sink = Arc::new(MemorySink::new());
        orchestrator(provider.clone(), sink)
            .with_prompt_builder(PromptBuilder::new(ContextMode::Ast))
            .with_context(Arc::new(StaticContext::new("repo_map", "MAP")))
            .execute_task("explain")
            .await
            .unwrap();

        let requests = provider.requests();

        let messages = &requests[0].messages;
        assert!(messages[0].content.starts_with("MAP\n\n"));
        assert_eq!(messages.last().unwrap().content, "explain");
    }

    #[tokio::test]
    async fn llm_failure_still_completes_task() {
        let provider = Arc::new(SequentialMockProvider::scripted(vec![Err(ProviderError::Timeout(
            "slow".into(),
        ))]));
        let sink = Arc::new(MemorySink::new());
        let result = orchestrator(provider, sink.clone()).execute_task("hello").await.unwrap();
        assert!(result.starts_with("FAILED"));

        let response = &sink.of_type(EventType::LlmResponse)[0];
        assert!(response.data["response"].is_null());
        assert_eq!(sink.of_type(EventType::TaskCompleted)[0].data["status"], "failed");
    }

    #[tokio::test]
    async fn infrastructure_error_emits_task_failed() {
        let provider = Arc::new(SequentialMockProvider::single_text("unused"));
        let sink = Arc::new(MemorySink::new());
        let orchestrator = TaskOrchestrator::new(
            provider,
            Arc::new(MockTools::new()),
            Arc::new(BrokenMemory),
            sink.clone(),
        );

        let err = orchestrator.execute_task("hello").await.unwrap_err();
        assert!(err.to_string().contains("disk gone"));

        let failed = sink.of_type(EventType::TaskFailed);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].data["error_type"], "MemoryError");
        assert!(sink.of_type(EventType::TaskCompleted).is_empty());
    }

    /// Answers with the last user message, so batch results can be matched to inputs.
    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError> {
            let last = request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            Ok(make_text_response(&format!("answer to {last}")))
        }
    }

    #[tokio::test]
    async fn batch_preserves_input_order_and_trace_ids() {
        let sink = Arc::new(MemorySink::new());
        let orchestrator = orchestrator(Arc::new(EchoProvider), sink.clone()).with_concurrency(2);

        let requests: Vec<String> = (0..5).map(|i| format!("q{i}")).collect();
        let results = orchestrator.execute_batch(requests).await;

        let answers: Vec<String> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(answers, vec!["answer to q0", "answer to q1", "answer to q2", "answer to q3", "answer to q4"]);

        let started = sink.of_type(EventType::TaskStarted);
        let mut ids: Vec<&str> = started.iter().map(|e| e.trace_id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    /// Records the most calls it ever had in flight at once.
    #[derive(Default)]
    struct InFlightProvider {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Provider for InFlightProvider {
        fn name(&self) -> &str {
            "in-flight"
        }

        async fn complete(&self, _request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(make_text_response("done"))
        }
    }

    #[tokio::test]
    async fn batch_never_exceeds_concurrency() {
        let provider = Arc::new(InFlightProvider::default());
        let orchestrator = orchestrator(provider.clone(), Arc::new(MemorySink::new())).with_concurrency(2);

        let requests: Vec<String> = (0..6).map(|i| format!("task {i}")).collect();
        let results = orchestrator.execute_batch(requests).await;

        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(provider.peak.load(Ordering::SeqCst), 2);
    }
}
