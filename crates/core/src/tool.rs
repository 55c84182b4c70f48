//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act: run shell commands,
//! read and write files. Individual tools implement [`Tool`]; anything that
//! can dispatch a call by name implements [`ToolExecutor`] (the registry, or a
//! tracing proxy wrapping it).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Prefix marking a tool outcome the model should treat as a failure.
pub const FAILED_MARKER: &str = "FAILED";

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool considers the run successful
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self { success: true, output: output.into(), data: None }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self { success: false, output: output.into(), data: None }
    }
}

/// A single named tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "run_command", "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The tool capability as the agent loop sees it: a schema to advertise and
/// a way to run a call by name.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Definitions of every tool this executor can run.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run `name` with `params`. Unknown names yield [`ToolError::NotFound`].
    async fn execute(&self, name: &str, params: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;
}

/// Turn a tool outcome into the text recorded as the tool-role message.
///
/// This is the one place where a tool `Err` stops being an error: the model
/// sees it as an observation prefixed with `FAILED`.
pub fn render_tool_outcome(outcome: std::result::Result<ToolResult, ToolError>) -> String {
    match outcome {
        Ok(result) if result.success => result.output,
        Ok(result) if result.output.starts_with(FAILED_MARKER) => result.output,
        Ok(result) => format!("{FAILED_MARKER}: {}", result.output),
        Err(e) => format!("{FAILED_MARKER}: {e}"),
    }
}

/// A registry of available tools, populated explicitly at startup.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        tracing::debug!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute and render in one go; never fails.
    pub async fn dispatch(&self, name: &str, params: serde_json::Value) -> String {
        render_tool_outcome(ToolExecutor::execute(self, name, params).await)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    async fn execute(&self, name: &str, params: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(params).await
    }
}
