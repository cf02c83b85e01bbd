//! Conversation memory: bounded per-conversation (question, answer) history.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// One completed exchange in a conversation, newest last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

impl ConversationTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Storage for conversation history, keyed by conversation id.
///
/// Implementations enforce the length cap on `put`: the stored list never
/// exceeds `cap()` turns, evicting oldest-first.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Load the history for a conversation. Unknown ids yield an empty list.
    async fn get(&self, conversation_id: &str) -> Vec<ConversationTurn>;

    /// Replace the history for a conversation, truncating to the last `cap()`.
    async fn put(&self, conversation_id: &str, turns: Vec<ConversationTurn>);

    /// Maximum turns retained per conversation.
    fn cap(&self) -> usize;
}

/// In-memory store. The persistence format behind this interface belongs to
/// an external collaborator; this implementation backs tests and single-node
/// deployments.
pub struct InMemoryMemoryStore {
    histories: RwLock<HashMap<String, Vec<ConversationTurn>>>,
    cap: usize,
}

impl InMemoryMemoryStore {
    pub fn new(cap: usize) -> Self {
        Self {
            histories: RwLock::new(HashMap::new()),
            cap,
        }
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn get(&self, conversation_id: &str) -> Vec<ConversationTurn> {
        self.histories
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn put(&self, conversation_id: &str, mut turns: Vec<ConversationTurn>) {
        if turns.len() > self.cap {
            turns.drain(..turns.len() - self.cap);
        }
        self.histories
            .write()
            .await
            .insert(conversation_id.to_string(), turns);
    }

    fn cap(&self) -> usize {
        self.cap
    }
}

/// Format the last `n` turns for prompt context, truncating each answer to
/// `answer_chars` characters.
pub fn format_history(turns: &[ConversationTurn], n: usize, answer_chars: usize) -> String {
    let start = turns.len().saturating_sub(n);
    turns[start..]
        .iter()
        .map(|turn| {
            let answer: String = turn.answer.chars().take(answer_chars).collect();
            let ellipsis = if turn.answer.chars().count() > answer_chars {
                "..."
            } else {
                ""
            };
            format!("User: {}\nAssistant: {}{}", turn.question, answer, ellipsis)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_conversation_is_empty() {
        let store = InMemoryMemoryStore::new(5);
        assert!(store.get("nope").await.is_empty());
    }

    #[tokio::test]
    async fn put_enforces_cap_fifo() {
        let store = InMemoryMemoryStore::new(3);
        let turns: Vec<_> = (0..6)
            .map(|i| ConversationTurn::new(format!("q{i}"), format!("a{i}")))
            .collect();
        store.put("c1", turns).await;

        let kept = store.get("c1").await;
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].question, "q3");
        assert_eq!(kept[2].question, "q5");
    }

    #[tokio::test]
    async fn cap_holds_after_repeated_appends() {
        let store = InMemoryMemoryStore::new(5);
        for i in 0..20 {
            let mut turns = store.get("c1").await;
            turns.push(ConversationTurn::new(format!("q{i}"), format!("a{i}")));
            store.put("c1", turns).await;
            assert!(store.get("c1").await.len() <= 5);
        }
        let kept = store.get("c1").await;
        assert_eq!(kept.len(), 5);
        assert_eq!(kept.last().unwrap().question, "q19");
    }

    #[test]
    fn format_history_truncates_answers() {
        let turns = vec![
            ConversationTurn::new("first?", "a".repeat(300)),
            ConversationTurn::new("second?", "short"),
        ];
        let formatted = format_history(&turns, 2, 100);
        assert!(formatted.contains("first?"));
        assert!(formatted.contains("..."));
        assert!(formatted.contains("Assistant: short"));
        assert!(!formatted.contains(&"a".repeat(150)));
    }

    #[test]
    fn format_history_takes_last_n() {
        let turns = vec![
            ConversationTurn::new("one", "1"),
            ConversationTurn::new("two", "2"),
            ConversationTurn::new("three", "3"),
        ];
        let formatted = format_history(&turns, 2, 100);
        assert!(!formatted.contains("one"));
        assert!(formatted.contains("two"));
        assert!(formatted.contains("three"));
    }
}
