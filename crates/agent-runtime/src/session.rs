//! Conversation sessions keyed by thread id

use crate::{Result, RuntimeError};
use agent_llm::Message;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One executed tool call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub name: String,
    pub input: Value,
    pub output: String,
}

/// Everything the loop remembers about one thread
///
/// `state` is handed to every tool call made on this thread.
#[derive(Debug, Default)]
pub struct ConversationSession<S> {
    pub thread_id: String,
    pub messages: Vec<Message>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub state: S,
}

impl<S: Default> ConversationSession<S> {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            tool_calls: Vec::new(),
            state: S::default(),
        }
    }
}

impl<S> ConversationSession<S> {
    /// True before the first turn has been recorded
    pub fn is_fresh(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Shared handle to a session; holding the lock gives exclusive use
pub type SessionHandle<S> = Arc<tokio::sync::Mutex<ConversationSession<S>>>;

/// Storage for conversation sessions
#[async_trait]
pub trait SessionStore<S: Send>: Send + Sync {
    /// Open the session for `thread_id`, creating an empty one on first use
    async fn open(&self, thread_id: &str) -> Result<SessionHandle<S>>;

    /// Forget a thread; returns whether it existed
    async fn remove(&self, thread_id: &str) -> Result<bool>;
}

/// Process-local session store
pub struct MemorySessionStore<S> {
    sessions: Mutex<HashMap<String, SessionHandle<S>>>,
}

impl<S> Default for MemorySessionStore<S> {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl<S> MemorySessionStore<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known threads
    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<S: Default + Send + 'static> SessionStore<S> for MemorySessionStore<S> {
    async fn open(&self, thread_id: &str) -> Result<SessionHandle<S>> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| RuntimeError::Session(e.to_string()))?;

        let handle = sessions.entry(thread_id.to_string()).or_insert_with(|| {
            debug!(thread_id, "Creating session");
            Arc::new(tokio::sync::Mutex::new(ConversationSession::new(thread_id)))
        });
        Ok(Arc::clone(handle))
    }

    async fn remove(&self, thread_id: &str) -> Result<bool> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| RuntimeError::Session(e.to_string()))?;
        Ok(sessions.remove(thread_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_once() {
        let store: MemorySessionStore<u8> = MemorySessionStore::new();

        let first = store.open("t1").await.unwrap();
        first.lock().await.messages.push(Message::user("hi"));

        let again = store.open("t1").await.unwrap();
        assert_eq!(again.lock().await.messages.len(), 1);
        assert!(store.open("t2").await.unwrap().lock().await.is_fresh());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_remove() {
        let store: MemorySessionStore<u8> = MemorySessionStore::new();
        store.open("t").await.unwrap();
        assert!(store.remove("t").await.unwrap());
        assert!(!store.remove("t").await.unwrap());
    }
}
