//! Chat session: an agent plus a running token count.

use crate::agent::{Agent, TurnOutcome};
use citycode_core::error::{MemoryError, Result};
use citycode_core::memory::MemoryStore;
use citycode_core::message::Message;

/// Messages returned by [`ChatSession::history`].
pub const HISTORY_LIMIT: usize = 100;

pub struct ChatSession {
    agent: Agent,
    total_tokens: u64,
}

impl ChatSession {
    pub fn new(agent: Agent) -> Self {
        Self { agent, total_tokens: 0 }
    }

    /// Run one turn and add its tokens to the session total.
    pub async fn ask(&mut self, text: &str, repo_context: &str) -> Result<TurnOutcome> {
        let outcome = self.agent.step(text, repo_context).await?;
        self.total_tokens += u64::from(outcome.tokens_used);
        Ok(outcome)
    }

    /// The most recent messages of this session's thread.
    pub async fn history(&self) -> std::result::Result<Vec<Message>, MemoryError> {
        self.agent.memory().last_events(self.agent.thread_id(), HISTORY_LIMIT).await
    }

    pub async fn summary(&self) -> std::result::Result<String, MemoryError> {
        self.agent.memory().summary(self.agent.thread_id()).await
    }

    pub fn thread_id(&self) -> &str {
        self.agent.thread_id()
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use citycode_core::message::Role;
    use citycode_memory::InMemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn tokens_accumulate_across_turns() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("one"),
            make_text_response("two"),
        ]));
        let agent = Agent::new("chat", Arc::new(InMemoryStore::new()), provider);
        let mut session = ChatSession::new(agent);

        let first = session.ask("a", "").await.unwrap();
        assert_eq!(first.text, "one");
        session.ask("b", "").await.unwrap();
        assert_eq!(session.total_tokens(), 30);
    }

    #[tokio::test]
    async fn history_and_summary_come_from_the_thread() {
        let memory = Arc::new(InMemoryStore::new());
        let provider = Arc::new(SequentialMockProvider::single_text("pong"));
        let mut session = ChatSession::new(Agent::new("chat", memory.clone(), provider));

        session.ask("ping", "").await.unwrap();
        let history = session.history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].content, "pong");

        memory.update_summary("chat", "talked about ping").await.unwrap();
        assert_eq!(session.summary().await.unwrap(), "talked about ping");
        assert_eq!(session.thread_id(), "chat");
    }
}
