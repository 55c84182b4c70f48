//! Tracing proxies around the LLM and tool capabilities.
//!
//! Both proxies emit a `*_request` event before delegating and a
//! `*_response` event afterwards. They hand back exactly what the wrapped
//! capability returned, errors included, and never call it more than once.

use crate::model::EventType;
use crate::tracer::Tracer;
use async_trait::async_trait;
use citycode_core::error::{ProviderError, ToolError};
use citycode_core::message::Message;
use citycode_core::provider::{Provider, ProviderRequest, ProviderResponse, StructuredSchema, ToolDefinition};
use citycode_core::tool::{FAILED_MARKER, ToolExecutor, ToolResult, render_tool_outcome};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;

const LLM_FAILURE_MARKER: &str = "Failed to get response from LLM";

// ── LLM ───────────────────────────────────────────────────────────────────

pub struct LlmProxy {
    inner: Arc<dyn Provider>,
    tracer: Tracer,
}

impl LlmProxy {
    pub fn new(inner: Arc<dyn Provider>, tracer: Tracer) -> Self {
        Self { inner, tracer }
    }

    fn request_view(messages: &[Message], tools: &[ToolDefinition]) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                let mut v = json!({ "role": m.role, "content": m.content });
                if !m.tool_calls.is_empty() {
                    v["tool_calls"] = json!(m.tool_calls);
                }
                if let Some(id) = &m.tool_call_id {
                    v["tool_call_id"] = json!(id);
                }
                v
            })
            .collect();
        let tools: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        json!({ "messages": messages, "tools": tools })
    }

    /// Flattened response: model, one choice with content and tool calls, usage.
    fn response_view(response: &ProviderResponse) -> Value {
        json!({
            "model": response.model,
            "choices": [{
                "message": {
                    "role": response.message.role,
                    "content": response.message.content,
                    "tool_calls": response.message.tool_calls,
                },
                "finish_reason": response.finish_reason,
            }],
            "usage": response.usage,
        })
    }
}

#[async_trait]
impl Provider for LlmProxy {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.tracer.emit(
            EventType::LlmRequest,
            Self::request_view(&request.messages, &request.tools),
        );

        let start = Instant::now();
        let result = self.inner.complete(request).await;
        let duration_seconds = start.elapsed().as_secs_f64();

        let data = match &result {
            Ok(response) => json!({
                "response": Self::response_view(response),
                "duration_seconds": duration_seconds,
            }),
            Err(e) => json!({
                "response": null,
                "error": LLM_FAILURE_MARKER,
                "detail": e.to_string(),
                "duration_seconds": duration_seconds,
            }),
        };
        self.tracer.emit(EventType::LlmResponse, data);
        result
    }

    async fn complete_structured(
        &self,
        request: ProviderRequest,
        schema: &StructuredSchema,
    ) -> Result<Value, ProviderError> {
        let mut view = Self::request_view(&request.messages, &request.tools);
        view["schema"] = json!(schema.name);
        self.tracer.emit(EventType::LlmRequest, view);

        let start = Instant::now();
        let result = self.inner.complete_structured(request, schema).await;
        let duration_seconds = start.elapsed().as_secs_f64();

        let data = match &result {
            Ok(parsed) => json!({
                "response": { "parsed": parsed },
                "duration_seconds": duration_seconds,
            }),
            Err(e) => json!({
                "response": null,
                "error": LLM_FAILURE_MARKER,
                "detail": e.to_string(),
                "duration_seconds": duration_seconds,
            }),
        };
        self.tracer.emit(EventType::LlmResponse, data);
        result
    }
}

// ── Tools ─────────────────────────────────────────────────────────────────

pub struct ToolProxy {
    inner: Arc<dyn ToolExecutor>,
    tracer: Tracer,
}

impl ToolProxy {
    pub fn new(inner: Arc<dyn ToolExecutor>, tracer: Tracer) -> Self {
        Self { inner, tracer }
    }
}

#[async_trait]
impl ToolExecutor for ToolProxy {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.inner.definitions()
    }

    async fn execute(&self, name: &str, params: Value) -> Result<ToolResult, ToolError> {
        self.tracer.emit(
            EventType::ToolRequest,
            json!({ "tool_name": name, "params": params }),
        );

        let start = Instant::now();
        let result = self.inner.execute(name, params).await;
        let duration_seconds = start.elapsed().as_secs_f64();

        let output = match &result {
            Ok(r) if r.success => r.output.clone(),
            Ok(r) => render_tool_outcome(Ok(r.clone())),
            Err(e) => format!("{FAILED_MARKER}: {e}"),
        };
        self.tracer.emit(
            EventType::ToolResponse,
            json!({
                "tool_name": name,
                "output": output,
                "success": matches!(&result, Ok(r) if r.success),
                "duration_seconds": duration_seconds,
            }),
        );
        result
    }
}
