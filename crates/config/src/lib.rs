//! Configuration loading, validation, and management for citycode.
//!
//! Loads configuration from `~/.citycode/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.
//! The resulting [`AppConfig`] is passed by value into constructors; there is
//! no global configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.citycode/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling and transport settings shared by every agent
    #[serde(default)]
    pub llm: LlmConfig,

    /// Per-role overrides for the brain/worker orchestrator
    #[serde(default)]
    pub roles: RolesConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub brain: BrainConfig,

    #[serde(default)]
    pub trace: TraceConfig,

    #[serde(default)]
    pub batch: BatchConfig,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("llm", &self.llm)
            .field("roles", &self.roles)
            .field("providers", &self.providers)
            .field("agent", &self.agent)
            .field("memory", &self.memory)
            .field("tools", &self.tools)
            .field("brain", &self.brain)
            .field("trace", &self.trace)
            .field("batch", &self.batch)
            .finish()
    }
}

// ── Providers ─────────────────────────────────────────────────────────────

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

// ── LLM ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Overrides the provider's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries on transient failures (rate limit, network, timeout)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            temperature: default_temperature(),
            top_p: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            reasoning_effort: None,
        }
    }
}

/// Which agent a set of LLM settings is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Default,
    Brain,
    Worker,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brain: Option<RoleConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<RoleConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// LLM settings after applying role overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLlm {
    pub model: String,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub max_tokens: u32,
    pub reasoning_effort: Option<String>,
}

// ── Agent ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Reason/act iterations per turn
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Messages replayed into each prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// "none", "ast" or "rag"
    #[serde(default = "default_context_mode")]
    pub context_mode: String,

    /// Replaces the mode's built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub rollup: RollupConfig,
}

fn default_max_steps() -> u32 {
    10
}
fn default_history_window() -> usize {
    40
}
fn default_context_mode() -> String {
    "none".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            history_window: default_history_window(),
            context_mode: default_context_mode(),
            system_prompt: None,
            rollup: RollupConfig::default(),
        }
    }
}

/// Summary rollup after a final answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupConfig {
    /// Messages whose length is measured
    #[serde(default = "default_rollup_window")]
    pub window: usize,

    /// Total characters above which a rollup happens
    #[serde(default = "default_rollup_threshold")]
    pub threshold_chars: usize,

    /// Most recent messages folded into the summary
    #[serde(default = "default_rollup_keep")]
    pub keep: usize,

    /// Per-message character cap inside the summary
    #[serde(default = "default_rollup_truncate")]
    pub truncate_chars: usize,
}

fn default_rollup_window() -> usize {
    20
}
fn default_rollup_threshold() -> usize {
    12_000
}
fn default_rollup_keep() -> usize {
    6
}
fn default_rollup_truncate() -> usize {
    300
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            window: default_rollup_window(),
            threshold_chars: default_rollup_threshold(),
            keep: default_rollup_keep(),
            truncate_chars: default_rollup_truncate(),
        }
    }
}

// ── Memory / tools ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "memory", "file" or "sqlite"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Directory (file backend) or database file (sqlite backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_memory_backend() -> String {
    "memory".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_max_read_lines")]
    pub max_read_lines: usize,

    /// Working directory for relative paths; current directory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,
}

fn default_command_timeout() -> u64 {
    30
}
fn default_max_read_lines() -> usize {
    200
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            max_read_lines: default_max_read_lines(),
            workspace: None,
        }
    }
}

// ── Brain / trace / batch ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Pause between iterations
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// A decision containing any of these (case-insensitive) ends the session
    #[serde(default = "default_stop_keywords")]
    pub stop_keywords: Vec<String>,
}

fn default_max_iterations() -> u32 {
    50
}
fn default_pacing_ms() -> u64 {
    1000
}
fn default_stop_keywords() -> Vec<String> {
    ["complete", "finished", "done", "success", "accomplished"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            pacing_ms: default_pacing_ms(),
            stop_keywords: default_stop_keywords(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory trace files are written into
    #[serde(default = "default_trace_dir")]
    pub dir: PathBuf,
}

fn default_trace_dir() -> PathBuf {
    PathBuf::from("tmp")
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_trace_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum tasks in flight during batch execution
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    4
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────

const CONTEXT_MODES: &[&str] = &["none", "ast", "rag"];
const MEMORY_BACKENDS: &[&str] = &["memory", "file", "sqlite"];

impl AppConfig {
    /// Load configuration from the default path (~/.citycode/config.toml).
    ///
    /// Environment overrides:
    /// - `CITYCODE_API_KEY`, then `OPENROUTER_API_KEY`, then `OPENAI_API_KEY`
    /// - `CITYCODE_PROVIDER`, `CITYCODE_MODEL`, `CITYCODE_BASE_URL`
    /// - `CITYCODE_MAX_STEPS`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load from `path` if given, otherwise from the default location, then
    /// apply environment overrides and validate.
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(path.unwrap_or(&default_path))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("CITYCODE_API_KEY")
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("CITYCODE_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("CITYCODE_MODEL") {
            self.default_model = model;
        }

        if let Some(url) = lookup("CITYCODE_BASE_URL") {
            self.llm.base_url = Some(url);
        }

        if let Some(steps) = lookup("CITYCODE_MAX_STEPS") {
            match steps.parse() {
                Ok(n) => self.agent.max_steps = n,
                Err(_) => tracing::warn!(value = %steps, "Ignoring non-numeric CITYCODE_MAX_STEPS"),
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".citycode")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let temps = std::iter::once(self.llm.temperature).chain(
            [&self.roles.brain, &self.roles.worker]
                .into_iter()
                .flatten()
                .filter_map(|r| r.temperature),
        );
        for t in temps {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError("agent.max_steps must be > 0".into()));
        }

        if self.brain.max_iterations == 0 {
            return Err(ConfigError::ValidationError("brain.max_iterations must be > 0".into()));
        }

        if self.batch.concurrency == 0 {
            return Err(ConfigError::ValidationError("batch.concurrency must be > 0".into()));
        }

        if !CONTEXT_MODES.contains(&self.agent.context_mode.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "agent.context_mode must be one of {CONTEXT_MODES:?}, got '{}'",
                self.agent.context_mode
            )));
        }

        if !MEMORY_BACKENDS.contains(&self.memory.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend must be one of {MEMORY_BACKENDS:?}, got '{}'",
                self.memory.backend
            )));
        }

        Ok(())
    }

    /// LLM settings for `role`, with `[roles.*]` overrides applied.
    pub fn resolve_llm(&self, role: AgentRole) -> ResolvedLlm {
        let overrides = match role {
            AgentRole::Default => None,
            AgentRole::Brain => self.roles.brain.as_ref(),
            AgentRole::Worker => self.roles.worker.as_ref(),
        };
        ResolvedLlm {
            model: overrides
                .and_then(|o| o.model.clone())
                .unwrap_or_else(|| self.default_model.clone()),
            temperature: overrides
                .and_then(|o| o.temperature)
                .unwrap_or(self.llm.temperature),
            top_p: self.llm.top_p,
            max_tokens: self.llm.max_tokens,
            reasoning_effort: self.llm.reasoning_effort.clone(),
        }
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// This config as TOML with every API key replaced by a placeholder.
    pub fn redacted_toml(&self) -> String {
        let mut copy = self.clone();
        if copy.api_key.is_some() {
            copy.api_key = Some("[REDACTED]".into());
        }
        for provider in copy.providers.values_mut() {
            if provider.api_key.is_some() {
                provider.api_key = Some("[REDACTED]".into());
            }
        }
        toml::to_string_pretty(&copy).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            llm: LlmConfig::default(),
            roles: RolesConfig::default(),
            providers: HashMap::new(),
            agent: AgentConfig::default(),
            memory: MemoryConfig::default(),
            tools: ToolsConfig::default(),
            brain: BrainConfig::default(),
            trace: TraceConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
