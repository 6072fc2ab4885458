//! Session management
//!
//! The store owns every task conversation known to this process together
//! with the queue of messages waiting for the agent. Every operation takes
//! the same lock, so operations never interleave; a pop followed by an ack
//! is still two separate steps.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tokio::sync::Mutex;

/// Session lifecycle status
///
/// The backend may push statuses this SDK does not know about; those are
/// kept verbatim in [`SessionStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Session is accepting messages
    Active,
    /// Session has been ended
    Ended,
    /// Backend-defined status
    Other(String),
}

impl SessionStatus {
    /// Wire representation of the status
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "ACTIVE",
            Self::Ended => "ENDED",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl From<&str> for SessionStatus {
    fn from(s: &str) -> Self {
        match s {
            "ACTIVE" => Self::Active,
            "ENDED" => Self::Ended,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single queued conversation message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    /// Message ID (expected unique within a session, not enforced)
    pub message_id: String,
    /// Free-form role: "user", "action", "assistant", ...
    pub role: String,
    /// Text content
    pub content: String,
    /// Time the message was enqueued
    pub created_at: DateTime<Utc>,
    /// Backend acknowledgment token
    pub ack_token: Option<String>,
}

/// One task-level conversation
#[derive(Debug, Clone)]
pub struct Session {
    /// Task ID (store key)
    pub task_id: String,
    /// Session ID
    pub session_id: String,
    /// Owning project ID
    pub project_id: String,
    /// Current lifecycle status
    pub status: SessionStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recently enqueued message
    pub last_message_at: DateTime<Utc>,
    pending: VecDeque<MessageRecord>,
    ack_token: Option<String>,
}

impl Session {
    fn new(task_id: String, session_id: String, project_id: String) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            session_id,
            project_id,
            status: SessionStatus::Active,
            created_at: now,
            last_message_at: now,
            pending: VecDeque::new(),
            ack_token: None,
        }
    }

    /// Number of messages waiting to be popped
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Queued messages, oldest first
    pub fn pending(&self) -> impl Iterator<Item = &MessageRecord> {
        self.pending.iter()
    }

    /// Token of the last delivered batch that has not been acked yet
    pub fn ack_token(&self) -> Option<&str> {
        self.ack_token.as_deref()
    }

    /// Check if session is active
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// In-memory session store keyed by task ID
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionManager {
    /// Create an empty session store
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Register a session for `task_id`.
    ///
    /// An existing entry is replaced, discarding its queued messages and
    /// outstanding ack token.
    pub async fn add_session(
        &self,
        task_id: impl Into<String>,
        session_id: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Session {
        let session = Session::new(task_id.into(), session_id.into(), project_id.into());
        let mut sessions = self.sessions.lock().await;
        if let Some(previous) = sessions.insert(session.task_id.clone(), session.clone()) {
            if !previous.pending.is_empty() {
                tracing::debug!(
                    task_id = %session.task_id,
                    dropped = previous.pending.len(),
                    "Session re-registered, discarding queued messages"
                );
            }
        }
        tracing::info!(
            task_id = %session.task_id,
            session_id = %session.session_id,
            project_id = %session.project_id,
            "Registered session"
        );
        session
    }

    /// Snapshot of the session for `task_id`
    pub async fn get_session(&self, task_id: &str) -> Option<Session> {
        self.sessions.lock().await.get(task_id).cloned()
    }

    /// Append a message to the session's queue.
    ///
    /// Messages for unknown tasks are dropped. Returns whether the message
    /// was enqueued.
    pub async fn add_message(
        &self,
        task_id: &str,
        message_id: impl Into<String>,
        role: impl Into<String>,
        content: impl Into<String>,
        ack_token: Option<String>,
    ) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(task_id) else {
            tracing::debug!(task_id, "Dropping message for unknown session");
            return false;
        };

        // Keep insertion timestamps non-decreasing even if the wall clock steps back
        let created_at = Utc::now().max(session.last_message_at);
        session.pending.push_back(MessageRecord {
            message_id: message_id.into(),
            role: role.into(),
            content: content.into(),
            created_at,
            ack_token,
        });
        session.last_message_at = created_at;
        true
    }

    /// Remove and return up to `limit` messages from the front of the queue.
    ///
    /// When at least one message is returned, the session's outstanding ack
    /// token becomes the token of the last returned message.
    pub async fn pop_messages(&self, task_id: &str, limit: usize) -> Vec<MessageRecord> {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(task_id) else {
            return Vec::new();
        };

        let take = limit.min(session.pending.len());
        let items: Vec<MessageRecord> = session.pending.drain(..take).collect();
        if let Some(last) = items.last() {
            session.ack_token = last.ack_token.clone();
        }
        items
    }

    /// Acknowledge the last delivered batch.
    ///
    /// Succeeds only if `ack_token` equals the outstanding token, which is
    /// then cleared.
    pub async fn ack(&self, task_id: &str, ack_token: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(task_id) {
            Some(session) if session.ack_token.as_deref() == Some(ack_token) => {
                session.ack_token = None;
                true
            }
            _ => false,
        }
    }

    /// Snapshot of all sessions
    pub async fn list_sessions(&self) -> Vec<Session> {
        self.sessions.lock().await.values().cloned().collect()
    }

    /// Overwrite the status of a session. Returns false for unknown tasks.
    pub async fn set_status(&self, task_id: &str, status: SessionStatus) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(task_id) {
            Some(session) => {
                tracing::debug!(task_id, status = %status, "Session status updated");
                session.status = status;
                true
            }
            None => false,
        }
    }

    /// Mark a session as ended
    pub async fn end_session(&self, task_id: &str) {
        if self.set_status(task_id, SessionStatus::Ended).await {
            tracing::info!(task_id, "Ended session");
        }
    }

    /// Get session count
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn manager_with_session(task_id: &str) -> SessionManager {
        let manager = SessionManager::new();
        manager.add_session(task_id, "sess-1", "proj-1").await;
        manager
    }

    #[tokio::test]
    async fn test_add_session() {
        let manager = SessionManager::new();
        let session = manager.add_session("t1", "s1", "p1").await;

        assert_eq!(session.task_id, "t1");
        assert_eq!(session.session_id, "s1");
        assert_eq!(session.project_id, "p1");
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.pending_count(), 0);
        assert!(session.ack_token().is_none());
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_add_session_overwrites_queue() {
        let manager = manager_with_session("t1").await;
        manager
            .add_message("t1", "m1", "user", "hello", Some("a1".to_string()))
            .await;

        manager.add_session("t1", "s2", "p2").await;

        let session = manager.get_session("t1").await.unwrap();
        assert_eq!(session.session_id, "s2");
        assert_eq!(session.pending_count(), 0);
        assert!(manager.pop_messages("t1", 20).await.is_empty());
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_pop_is_fifo_and_leaves_remainder() {
        let manager = manager_with_session("t1").await;
        for i in 0..5 {
            manager
                .add_message("t1", format!("m{i}"), "user", format!("msg {i}"), None)
                .await;
        }

        let first = manager.pop_messages("t1", 3).await;
        let ids: Vec<&str> = first.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m0", "m1", "m2"]);

        let session = manager.get_session("t1").await.unwrap();
        assert_eq!(session.pending_count(), 2);

        let rest = manager.pop_messages("t1", 20).await;
        let ids: Vec<&str> = rest.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m3", "m4"]);
    }

    #[tokio::test]
    async fn test_created_at_non_decreasing() {
        let manager = manager_with_session("t1").await;
        for i in 0..10 {
            manager
                .add_message("t1", format!("m{i}"), "user", "x", None)
                .await;
        }
        let messages = manager.pop_messages("t1", 10).await;
        assert!(messages
            .windows(2)
            .all(|pair| pair[0].created_at <= pair[1].created_at));

        let session = manager.get_session("t1").await.unwrap();
        assert_eq!(session.last_message_at, messages[9].created_at);
    }

    #[tokio::test]
    async fn test_pop_sets_ack_token_from_last_item() {
        let manager = manager_with_session("t1").await;
        manager
            .add_message("t1", "m1", "user", "a", Some("tok-1".to_string()))
            .await;
        manager
            .add_message("t1", "m2", "user", "b", Some("tok-2".to_string()))
            .await;

        let popped = manager.pop_messages("t1", 20).await;
        assert_eq!(popped.len(), 2);

        let session = manager.get_session("t1").await.unwrap();
        assert_eq!(session.ack_token(), Some("tok-2"));

        // Earlier token in the batch is not the outstanding one
        assert!(!manager.ack("t1", "tok-1").await);
        assert!(manager.ack("t1", "tok-2").await);
    }

    #[tokio::test]
    async fn test_empty_pop_keeps_outstanding_token() {
        let manager = manager_with_session("t1").await;
        manager
            .add_message("t1", "m1", "user", "a", Some("tok-1".to_string()))
            .await;
        manager.pop_messages("t1", 20).await;

        assert!(manager.pop_messages("t1", 20).await.is_empty());
        assert!(manager.pop_messages("t1", 0).await.is_empty());

        assert!(manager.ack("t1", "tok-1").await);
    }

    #[tokio::test]
    async fn test_pop_without_token_replaces_outstanding() {
        let manager = manager_with_session("t1").await;
        manager
            .add_message("t1", "m1", "user", "a", Some("tok-1".to_string()))
            .await;
        manager.pop_messages("t1", 1).await;
        manager.add_message("t1", "m2", "user", "b", None).await;
        manager.pop_messages("t1", 1).await;

        assert!(!manager.ack("t1", "tok-1").await);
    }

    #[tokio::test]
    async fn test_ack_is_one_shot() {
        let manager = manager_with_session("t1").await;
        manager
            .add_message("t1", "m1", "user", "hello", Some("a1".to_string()))
            .await;
        manager.pop_messages("t1", 20).await;

        assert!(!manager.ack("t1", "wrong").await);
        assert!(manager.ack("t1", "a1").await);
        assert!(!manager.ack("t1", "a1").await);
    }

    #[tokio::test]
    async fn test_unknown_task_is_soft_noop() {
        let manager = SessionManager::new();

        assert!(!manager.add_message("ghost", "m1", "user", "x", None).await);
        assert!(manager.pop_messages("ghost", 20).await.is_empty());
        assert!(!manager.ack("ghost", "a1").await);
        assert!(manager.get_session("ghost").await.is_none());
        manager.end_session("ghost").await;
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_end_session() {
        let manager = manager_with_session("t1").await;
        manager.end_session("t1").await;

        let session = manager.get_session("t1").await.unwrap();
        assert_eq!(session.status, SessionStatus::Ended);
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn test_list_sessions_is_snapshot() {
        let manager = SessionManager::new();
        manager.add_session("t1", "s1", "p1").await;
        manager.add_session("t2", "s2", "p1").await;

        let mut ids: Vec<String> = manager
            .list_sessions()
            .await
            .into_iter()
            .map(|s| s.task_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["t1".to_string(), "t2".to_string()]);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(SessionStatus::from("ACTIVE"), SessionStatus::Active);
        assert_eq!(SessionStatus::from("ENDED"), SessionStatus::Ended);
        assert_eq!(
            SessionStatus::from("RUNNING"),
            SessionStatus::Other("RUNNING".to_string())
        );
        assert_eq!(SessionStatus::Other("RUNNING".to_string()).to_string(), "RUNNING");
    }

    #[tokio::test]
    async fn test_status_kept_verbatim() {
        assert_eq!(
            SessionStatus::from("active"),
            SessionStatus::Other("active".to_string())
        );
        assert_eq!(SessionStatus::from("Ended").as_str(), "Ended");

        let manager = manager_with_session("t1").await;
        assert!(manager.set_status("t1", SessionStatus::from("active")).await);
        let session = manager.get_session("t1").await.unwrap();
        assert_eq!(session.status.as_str(), "active");
        assert!(!session.is_active());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enqueue_keeps_every_message() {
        let manager = Arc::new(manager_with_session("t1").await);
        let mut handles = Vec::new();
        for worker in 0..8 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    manager
                        .add_message("t1", format!("w{worker}-{i}"), "user", "x", None)
                        .await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let all = manager.pop_messages("t1", 1000).await;
        assert_eq!(all.len(), 200);

        // Per-producer order is preserved
        for worker in 0..8 {
            let prefix = format!("w{worker}-");
            let seq: Vec<usize> = all
                .iter()
                .filter_map(|m| m.message_id.strip_prefix(&prefix))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..25).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let manager = SessionManager::new();
        manager.add_session("t1", "s1", "p1").await;
        manager
            .add_message("t1", "m1", "user", "hello", Some("a1".to_string()))
            .await;

        let messages = manager.pop_messages("t1", 20).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello");

        assert!(manager.ack("t1", "a1").await);
        assert!(!manager.ack("t1", "a1").await);
    }
}
