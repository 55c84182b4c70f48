//! Shared test helpers for agent, session, task and brain tests.

use async_trait::async_trait;
use citycode_core::error::{MemoryError, ProviderError, ToolError};
use citycode_core::memory::MemoryStore;
use citycode_core::message::{Message, MessageToolCall};
use citycode_core::provider::{Provider, ProviderRequest, ProviderResponse, StructuredSchema, ToolDefinition, Usage};
use citycode_core::tool::{ToolExecutor, ToolResult};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue. With
/// `repeating()` the last response is replayed forever; otherwise running
/// out of responses panics. Every request is recorded.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    structured: Mutex<VecDeque<Result<serde_json::Value, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    call_count: Mutex<usize>,
    repeat_last: bool,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    /// Responses that may include failures.
    pub fn scripted(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            structured: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            call_count: Mutex::new(0),
            repeat_last: false,
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a provider that first returns tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, thought: &str, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls, thought),
            make_text_response(answer),
        ])
    }

    /// Replay the last scripted response once the queue runs out.
    pub fn repeating(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Queue answers for `complete_structured`; an empty queue answers with an error.
    pub fn with_structured(self, answers: Vec<Result<serde_json::Value, ProviderError>>) -> Self {
        *self.structured.lock().unwrap() = answers.into();
        self
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();

        let index = if *count < responses.len() {
            *count
        } else if self.repeat_last && !responses.is_empty() {
            responses.len() - 1
        } else {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                *count,
                responses.len()
            );
        };

        *count += 1;
        responses[index].clone()
    }

    async fn complete_structured(
        &self,
        request: ProviderRequest,
        _schema: &StructuredSchema,
    ) -> Result<serde_json::Value, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.structured
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidResponse("no structured answer scripted".into())))
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        finish_reason: Some("stop".into()),
        metadata: serde_json::Map::new(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_tool_calls(thought, tool_calls),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        finish_reason: Some("tool_calls".into()),
        metadata: serde_json::Map::new(),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    make_tool_call_with_id(&format!("call_{name}"), name, args)
}

pub fn make_tool_call_with_id(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// A tool executor with one behavior per tool name, recording every call.
///
/// `echo` returns its `text` argument, `boom` fails with an execution error,
/// `flaky` returns a failed result. Anything else is an unknown tool.
#[derive(Default)]
pub struct MockTools {
    calls: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MockTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(String, serde_json::Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for MockTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        ["echo", "boom", "flaky"]
            .into_iter()
            .map(|name| ToolDefinition {
                name: name.into(),
                description: format!("mock {name}"),
                parameters: serde_json::json!({"type": "object"}),
            })
            .collect()
    }

    async fn execute(&self, name: &str, params: serde_json::Value) -> Result<ToolResult, ToolError> {
        self.calls.lock().unwrap().push((name.to_string(), params.clone()));
        match name {
            "echo" => Ok(ToolResult::ok(params["text"].as_str().unwrap_or_default())),
            "boom" => Err(ToolError::ExecutionFailed {
                tool_name: "boom".into(),
                reason: "exploded".into(),
            }),
            "flaky" => Ok(ToolResult::failed("disk not mounted")),
            other => Err(ToolError::NotFound(other.to_string())),
        }
    }
}

/// A memory store whose appends always fail.
pub struct BrokenMemory;

#[async_trait]
impl MemoryStore for BrokenMemory {
    fn name(&self) -> &str {
        "broken"
    }

    async fn append(&self, _thread_id: &str, _message: Message) -> Result<(), MemoryError> {
        Err(MemoryError::Storage("disk gone".into()))
    }

    async fn last_events(&self, _thread_id: &str, _n: usize) -> Result<Vec<Message>, MemoryError> {
        Ok(vec![])
    }

    async fn summary(&self, _thread_id: &str) -> Result<String, MemoryError> {
        Ok(String::new())
    }

    async fn update_summary(&self, _thread_id: &str, _summary: &str) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn message_count(&self, _thread_id: &str) -> Result<usize, MemoryError> {
        Ok(0)
    }

    async fn truncate(&self, _thread_id: &str, _len: usize) -> Result<(), MemoryError> {
        Ok(())
    }
}
