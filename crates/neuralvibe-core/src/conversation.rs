//! Conversation log and the context window sent upstream

use tracing::debug;

use crate::types::{Message, Role, TokenCounts, Usage};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Provide clear, concise and accurate responses.";
pub const DEFAULT_MAX_HISTORY: usize = 10;

/// Append-only message log owned by the caller
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> &Message {
        self.push(Message::user(text))
    }

    /// Record a reply together with the usage the backend reported
    pub fn push_assistant(&mut self, text: impl Into<String>, usage: Usage) -> &Message {
        self.push(Message::assistant(text).with_tokens(TokenCounts::from(usage)))
    }

    fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Sum of the total tokens recorded on assistant messages
    pub fn total_tokens(&self) -> u64 {
        self.messages
            .iter()
            .filter_map(|m| m.tokens)
            .map(|t| u64::from(t.total))
            .sum()
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

/// Shapes the outbound request: system prompt, bounded history, newest user turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextWindow {
    pub system_prompt: Option<String>,
    pub max_history: usize,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

impl ContextWindow {
    pub fn apply(&self, conversation: &[Message]) -> Vec<Message> {
        // The newest user turn always goes out, even past the history bound.
        let (history, latest) = match conversation.split_last() {
            Some((last, rest)) if last.role == Role::User => (rest, Some(last)),
            _ => (conversation, None),
        };

        let skip = history.len().saturating_sub(self.max_history);
        let mut request = Vec::with_capacity(self.max_history + 2);

        if let Some(prompt) = self.system_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            request.push(Message::system(prompt));
        }
        request.extend(
            history[skip..]
                .iter()
                .filter(|m| m.role != Role::System)
                .cloned(),
        );
        request.extend(latest.cloned());

        debug!(
            "Context window: {} of {} messages sent",
            request.len(),
            conversation.len()
        );
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("q{i}"))
                } else {
                    Message::assistant(format!("a{i}"))
                }
            })
            .collect()
    }

    #[test]
    fn test_push_assistant_records_tokens() {
        let mut conv = Conversation::new();
        conv.push_user("hi");
        let reply = conv.push_assistant("hello", Usage::new(3, 4));
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.tokens.map(|t| t.total), Some(7));
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.total_tokens(), 7);
        conv.clear();
        assert!(conv.is_empty());
    }

    #[test]
    fn test_window_prepends_system_prompt() {
        let out = ContextWindow::default().apply(&log(1));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, Role::System);
        assert_eq!(out[0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(out[1].content, "q0");
    }

    #[test]
    fn test_window_bounds_history_and_keeps_latest() {
        // 21 messages: 20 history + newest user turn q20
        let out = ContextWindow::default().apply(&log(21));
        assert_eq!(out.len(), 1 + 10 + 1);
        assert_eq!(out[1].content, "q10");
        assert_eq!(out.last().unwrap().content, "q20");
    }

    #[test]
    fn test_window_without_system_prompt() {
        let window = ContextWindow {
            system_prompt: Some("  ".into()),
            max_history: 2,
        };
        let out = window.apply(&log(5));
        let contents: Vec<&str> = out.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q2", "a3", "q4"]);
    }

    #[test]
    fn test_window_trailing_assistant_is_history() {
        let window = ContextWindow {
            system_prompt: None,
            max_history: 1,
        };
        let out = window.apply(&log(2));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "a1");
    }

    #[test]
    fn test_window_does_not_mutate_log() {
        let messages = log(3);
        let before = messages.clone();
        let _ = ContextWindow::default().apply(&messages);
        assert_eq!(messages, before);
    }
}
