//! Error types for the citycode domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all citycode operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Prompt assembly ---
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    // --- Trace sink ---
    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short machine-readable name of the variant, used in failure trace events.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Provider(_) => "ProviderError",
            Error::Memory(_) => "MemoryError",
            Error::Tool(_) => "ToolError",
            Error::Prompt(_) => "PromptError",
            Error::Trace(_) => "TraceError",
            Error::Config { .. } => "ConfigError",
            Error::Serialization(_) => "SerializationError",
            Error::Internal(_) => "InternalError",
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether retrying the same request might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. } | ProviderError::Timeout(_) | ProviderError::Network(_)
        ) || matches!(self, ProviderError::ApiError { status_code, .. } if *status_code >= 500)
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Violations of the tool-call / tool-result pairing when assembling a prompt.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("tool result {tool_call_id} has no matching prior tool call")]
    OrphanToolResult { tool_call_id: String },

    #[error("tool message {message_id} is missing its tool_call_id")]
    MissingToolCallId { message_id: String },

    #[error("tool call {tool_call_id} has no tool result")]
    UnansweredToolCall { tool_call_id: String },
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Trace sink I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Trace event could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}
