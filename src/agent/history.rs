//! Conversation state: the append-only message history.
//!
//! Owned by exactly one in-flight turn. The orchestrator never mutates a
//! `Conversation` — it works on a transcript copy — so a failed turn
//! leaves the caller's history byte-for-byte unchanged and a successful
//! turn appends exactly one assistant message.

use crate::inference::types::{ChatMessage, Role};

/// Ordered, append-only conversation history.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    /// An empty conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a conversation from caller-supplied history.
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    /// Append the pending user turn. Call before starting the orchestrator.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::text(Role::User, content));
    }

    /// Fold the assembled assistant message back in. Called exactly once,
    /// and only after the turn completed successfully.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages
            .push(ChatMessage::text(Role::Assistant, content));
    }

    /// The history in context-window order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Snapshot of the history for an orchestrator transcript.
    pub fn to_transcript(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_user_then_assistant() {
        let mut convo = Conversation::new();
        convo.push_user("What's the weather in Paris?");
        convo.push_assistant("15°C and cloudy.");

        assert_eq!(convo.len(), 2);
        assert_eq!(convo.messages()[0].role, Role::User);
        assert_eq!(convo.messages()[1].role, Role::Assistant);
        assert_eq!(
            convo.messages()[1].content.as_deref(),
            Some("15°C and cloudy.")
        );
    }

    #[test]
    fn test_transcript_is_a_snapshot() {
        let mut convo = Conversation::new();
        convo.push_user("hello");

        let transcript = convo.to_transcript();
        convo.push_assistant("hi");

        // The transcript taken before the append is unaffected.
        assert_eq!(transcript.len(), 1);
        assert_eq!(convo.len(), 2);
    }

    #[test]
    fn test_from_messages_preserves_order() {
        let convo = Conversation::from_messages(vec![
            ChatMessage::text(Role::System, "be helpful"),
            ChatMessage::text(Role::User, "first"),
            ChatMessage::text(Role::Assistant, "second"),
        ]);
        let roles: Vec<Role> = convo.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }
}
