//! Bounded per-conversation history.
//!
//! A session keeps the most recent `max_history` exchanges (one user
//! message plus one assistant message each). Older messages are evicted
//! first. Sessions live only as long as the process.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

/// Default number of exchanges kept per session.
pub const DEFAULT_MAX_HISTORY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

pub struct SessionStore {
    max_history: usize,
    sessions: Mutex<HashMap<String, Vec<Message>>>,
}

impl SessionStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history: max_history.max(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Message>>> {
        // History is append-only text; a panic mid-append cannot leave it
        // structurally invalid.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Allocate a fresh session id. The session itself appears on the
    /// first recorded exchange.
    pub fn create_session(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Append one exchange and evict the oldest messages beyond the window.
    pub fn add_exchange(&self, session_id: &str, user: &str, assistant: &str) {
        let limit = self.max_history * 2;
        let mut sessions = self.lock();
        let history = sessions.entry(session_id.to_string()).or_default();
        history.push(Message {
            role: Role::User,
            content: user.to_string(),
        });
        history.push(Message {
            role: Role::Assistant,
            content: assistant.to_string(),
        });
        if history.len() > limit {
            let excess = history.len() - limit;
            history.drain(..excess);
        }
    }

    pub fn messages(&self, session_id: &str) -> Vec<Message> {
        self.lock().get(session_id).cloned().unwrap_or_default()
    }

    /// History rendered as `User: ...` / `Assistant: ...` lines, or `None`
    /// for an unknown or empty session.
    pub fn history(&self, session_id: &str) -> Option<String> {
        let sessions = self.lock();
        let history = sessions.get(session_id).filter(|h| !h.is_empty())?;
        Some(
            history
                .iter()
                .map(|m| format!("{}: {}", m.role, m.content))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    pub fn clear_session(&self, session_id: &str) {
        self.lock().remove(session_id);
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_session_does_not_register() {
        let store = SessionStore::default();
        let a = store.create_session();
        let b = store.create_session();
        assert_ne!(a, b);
        assert_eq!(store.session_count(), 0);
        assert!(store.history(&a).is_none());
    }

    #[test]
    fn test_history_format() {
        let store = SessionStore::default();
        store.add_exchange("s", "What is TDD?", "Writing tests first.");
        assert_eq!(
            store.history("s").unwrap(),
            "User: What is TDD?\nAssistant: Writing tests first."
        );
    }

    #[test]
    fn test_window_evicts_oldest() {
        let store = SessionStore::new(2);
        for i in 0..5 {
            store.add_exchange("s", &format!("q{}", i), &format!("a{}", i));
            assert!(store.messages("s").len() <= 4);
        }
        let contents: Vec<_> = store
            .messages("s")
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["q3", "a3", "q4", "a4"]);
    }

    #[test]
    fn test_sessions_are_independent() {
        let store = SessionStore::new(1);
        store.add_exchange("a", "qa", "aa");
        store.add_exchange("b", "qb", "ab");
        assert_eq!(store.messages("a")[0].content, "qa");
        assert_eq!(store.messages("b")[1].role, Role::Assistant);
        store.clear_session("a");
        assert!(store.messages("a").is_empty());
        assert_eq!(store.session_count(), 1);
    }
}
