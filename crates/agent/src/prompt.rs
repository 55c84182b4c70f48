//! Prompt assembly.
//!
//! A prompt is always laid out the same way:
//!
//! 1. the mode's system message (with the repository context in front of it
//!    in [`ContextMode::Ast`])
//! 2. a "previous conversation summary" system message, when one exists
//! 3. the replayed window of recent messages, tool calls and tool results intact
//! 4. the new user message, unless the replay already ends with it
//!
//! The builder is pure: it reads nothing and writes nothing.

use citycode_core::error::PromptError;
use citycode_core::message::{Message, Role};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Where repository context comes from, and how the system prompt reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextMode {
    #[default]
    None,
    /// A pre-built repository map sits in front of the system prompt.
    Ast,
    /// Retrieved snippets are folded into the user request instead.
    Rag,
}

impl ContextMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextMode::None => "none",
            ContextMode::Ast => "ast",
            ContextMode::Rag => "rag",
        }
    }

    fn default_system_prompt(&self) -> &'static str {
        match self {
            ContextMode::None => SYSTEM_PROMPT_NONE,
            ContextMode::Ast => SYSTEM_PROMPT_AST,
            ContextMode::Rag => SYSTEM_PROMPT_RAG,
        }
    }
}

impl FromStr for ContextMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ContextMode::None),
            "ast" => Ok(ContextMode::Ast),
            "rag" => Ok(ContextMode::Rag),
            other => Err(format!("unknown context mode '{other}' (expected none, ast or rag)")),
        }
    }
}

impl fmt::Display for ContextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const SYSTEM_PROMPT_NONE: &str = "You are a capable software and systems assistant with access to tools. \
Work step by step: decide what you need to know, call a tool to find out, read the result, and repeat \
until you can answer. Tool results that start with FAILED describe an error; adjust and try another \
approach instead of repeating the same call. When you are done, reply with a plain-text answer and no tool calls.";

const SYSTEM_PROMPT_AST: &str = "You are a capable software assistant working inside the repository \
summarized above. Use the repository map to decide which files to open, read them with tools before \
changing anything, and verify your work by running commands. When you are done, reply with a \
plain-text answer and no tool calls.";

const SYSTEM_PROMPT_RAG: &str = "You are a capable software assistant. The user request may be preceded \
by retrieved code snippets; treat them as hints and confirm details with tools before relying on them. \
When you are done, reply with a plain-text answer and no tool calls.";

/// Assembles the message sequence for one LLM request.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    mode: ContextMode,
    system_prompt: Option<String>,
}

impl PromptBuilder {
    pub fn new(mode: ContextMode) -> Self {
        Self {
            mode,
            system_prompt: None,
        }
    }

    /// Replace the mode's built-in system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn mode(&self) -> ContextMode {
        self.mode
    }

    /// The system message text for this mode.
    pub fn system_prompt(&self, repo_context: &str) -> String {
        let base = self
            .system_prompt
            .as_deref()
            .unwrap_or_else(|| self.mode.default_system_prompt());
        if self.mode == ContextMode::Ast && !repo_context.trim().is_empty() {
            format!("{repo_context}\n\n{base}")
        } else {
            base.to_string()
        }
    }

    /// Build the prompt for one request.
    ///
    /// Fails if the replay contains a tool result that does not answer a tool
    /// call issued earlier in the same replay.
    pub fn build(
        &self,
        summary: &str,
        recent: &[Message],
        user_text: &str,
        repo_context: &str,
    ) -> Result<Vec<Message>, PromptError> {
        validate_replay(recent)?;

        let mut messages = Vec::with_capacity(recent.len() + 3);
        messages.push(Message::system(self.system_prompt(repo_context)));

        if !summary.trim().is_empty() {
            messages.push(Message::system(format!("Previous conversation summary:\n{summary}")));
        }

        messages.extend(recent.iter().cloned());

        let already_present = recent
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .is_some_and(|m| m.content == user_text);
        if !already_present {
            messages.push(Message::user(user_text));
        }

        Ok(messages)
    }
}

/// Every tool message must carry an id that an earlier assistant message in
/// the same replay issued, and every tool call must be answered before the
/// next non-tool message.
fn validate_replay(recent: &[Message]) -> Result<(), PromptError> {
    let mut issued: HashSet<&str> = HashSet::new();
    let mut pending: Vec<&str> = Vec::new();
    for msg in recent {
        match msg.role {
            Role::Tool => {
                let id = msg.tool_call_id.as_deref().ok_or_else(|| PromptError::MissingToolCallId {
                    message_id: msg.id.clone(),
                })?;
                if !issued.contains(id) {
                    return Err(PromptError::OrphanToolResult {
                        tool_call_id: id.to_string(),
                    });
                }
                pending.retain(|p| *p != id);
            }
            _ => {
                ensure_answered(&pending)?;
                if msg.role == Role::Assistant {
                    pending = msg.tool_calls.iter().map(|tc| tc.id.as_str()).collect();
                    issued.extend(pending.iter().copied());
                }
            }
        }
    }
    ensure_answered(&pending)
}

fn ensure_answered(pending: &[&str]) -> Result<(), PromptError> {
    match pending.first() {
        Some(id) => Err(PromptError::UnansweredToolCall {
            tool_call_id: (*id).to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citycode_core::message::MessageToolCall;

    fn call(id: &str) -> MessageToolCall {
        MessageToolCall {
            id: id.into(),
            name: "run_command".into(),
            arguments: r#"{"command":"ls"}"#.into(),
        }
    }

    #[test]
    fn layout_with_summary_and_history() {
        let builder = PromptBuilder::new(ContextMode::None);
        let recent = vec![Message::user("first"), Message::assistant("reply")];

        let prompt = builder.build("earlier stuff", &recent, "second", "").unwrap();
        assert_eq!(prompt.len(), 5);
        assert_eq!(prompt[0].role, Role::System);
        assert_eq!(prompt[1].content, "Previous conversation summary:\nearlier stuff");
        assert_eq!(prompt[2].content, "first");
        assert_eq!(prompt[3].content, "reply");
        assert_eq!(prompt[4].role, Role::User);
        assert_eq!(prompt[4].content, "second");
    }

    #[test]
    fn empty_summary_is_omitted() {
        let prompt = PromptBuilder::default().build("", &[], "hi", "").unwrap();
        assert_eq!(prompt.len(), 2);
        assert_eq!(prompt[1].content, "hi");
    }

    #[test]
    fn user_message_not_duplicated() {
        let recent = vec![Message::user("do the thing")];
        let prompt = PromptBuilder::default().build("", &recent, "do the thing", "").unwrap();
        let users = prompt.iter().filter(|m| m.role == Role::User).count();
        assert_eq!(users, 1);
    }

    #[test]
    fn user_message_still_present_after_tool_round() {
        let recent = vec![
            Message::user("list files"),
            Message::assistant_tool_calls("", vec![call("c1")]),
            Message::tool_result("c1", "a.txt"),
        ];
        let prompt = PromptBuilder::default().build("", &recent, "list files", "").unwrap();
        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt.last().unwrap().role, Role::Tool);
    }

    #[test]
    fn tool_correlation_is_preserved() {
        let recent = vec![
            Message::user("go"),
            Message::assistant_tool_calls("checking", vec![call("c1"), call("c2")]),
            Message::tool_result("c1", "one"),
            Message::tool_result("c2", "two"),
        ];
        let prompt = PromptBuilder::default().build("", &recent, "go", "").unwrap();
        assert_eq!(prompt[2].tool_calls.len(), 2);
        assert_eq!(prompt[3].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(prompt[4].tool_call_id.as_deref(), Some("c2"));
    }

    #[test]
    fn orphan_tool_result_is_rejected() {
        let recent = vec![Message::user("go"), Message::tool_result("ghost", "??")];
        let err = PromptBuilder::default().build("", &recent, "go", "").unwrap_err();
        assert!(matches!(err, PromptError::OrphanToolResult { tool_call_id } if tool_call_id == "ghost"));
    }

    #[test]
    fn tool_call_without_result_is_rejected() {
        // The second result was never stored, then the user spoke again
        let recent = vec![
            Message::user("go"),
            Message::assistant_tool_calls("", vec![call("c1"), call("c2")]),
            Message::tool_result("c1", "one"),
            Message::user("again"),
        ];
        let err = PromptBuilder::default().build("", &recent, "again", "").unwrap_err();
        assert!(matches!(err, PromptError::UnansweredToolCall { tool_call_id } if tool_call_id == "c2"));

        // Same gap at the end of the window
        let err = PromptBuilder::default().build("", &recent[..3], "go", "").unwrap_err();
        assert!(matches!(err, PromptError::UnansweredToolCall { .. }));
    }

    #[test]
    fn tool_result_without_id_is_rejected() {
        let mut msg = Message::tool_result("x", "out");
        msg.tool_call_id = None;
        let err = PromptBuilder::default().build("", &[msg], "go", "").unwrap_err();
        assert!(matches!(err, PromptError::MissingToolCallId { .. }));
    }

    #[test]
    fn ast_mode_puts_repo_context_first() {
        let builder = PromptBuilder::new(ContextMode::Ast);
        let system = builder.system_prompt("src/main.rs: fn main");
        assert!(system.starts_with("src/main.rs: fn main\n\n"));
        assert!(system.ends_with(SYSTEM_PROMPT_AST));

        // Other modes ignore the block
        let none = PromptBuilder::new(ContextMode::None).system_prompt("src/main.rs");
        assert_eq!(none, SYSTEM_PROMPT_NONE);
    }

    #[test]
    fn custom_system_prompt_wins() {
        let builder = PromptBuilder::new(ContextMode::Rag).with_system_prompt("Be terse.");
        assert_eq!(builder.system_prompt(""), "Be terse.");
    }

    #[test]
    fn context_mode_parsing() {
        assert_eq!("AST".parse::<ContextMode>().unwrap(), ContextMode::Ast);
        assert_eq!("none".parse::<ContextMode>().unwrap(), ContextMode::None);
        assert!("vector".parse::<ContextMode>().is_err());
        assert_eq!(ContextMode::Rag.to_string(), "rag");
    }
}
