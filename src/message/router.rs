//! Backend event routing
//!
//! Turns inbound backend envelopes into session store mutations and fans
//! outbound envelopes out to the registered backend senders.

use super::envelope::{BackendEvent, Envelope};
use crate::error::Result;
use crate::session::{SessionManager, SessionStatus};
use crate::ws::InboundHandler;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keys tried, in order, when resolving a message ID
const MESSAGE_ID_KEYS: [&str; 4] = ["message_id", "action_id", "id", "request_id"];

const DEFAULT_USER_ROLE: &str = "user";
const DEFAULT_ACTION_ROLE: &str = "action";
const DEFAULT_ACTION_LABEL: &str = "action";

/// A path from this process to the backend
#[async_trait]
pub trait OutboundHandler: Send + Sync {
    /// Deliver an envelope
    async fn send(&self, envelope: &Envelope) -> Result<()>;
}

/// Routes backend events into the session store
pub struct MessageRouter {
    sessions: Arc<SessionManager>,
    outbound_handlers: RwLock<Vec<Arc<dyn OutboundHandler>>>,
}

impl MessageRouter {
    /// Create a new router over the given session store
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            sessions,
            outbound_handlers: RwLock::new(Vec::new()),
        }
    }

    /// Add a backend sender; senders are invoked in registration order
    pub async fn register_outbound_handler(&self, handler: Arc<dyn OutboundHandler>) {
        self.outbound_handlers.write().await.push(handler);
    }

    /// Apply one inbound backend event. Malformed or partial events are
    /// dropped without error.
    pub async fn handle_backend_event(&self, value: &Value) {
        match BackendEvent::from_value(value) {
            BackendEvent::TaskUserMessage(payload) => {
                self.enqueue(&payload, DEFAULT_USER_ROLE, resolve_content(payload.get("content")))
                    .await;
            }
            BackendEvent::TaskAction(payload) => {
                let content = summarize_action(&payload);
                self.enqueue(&payload, DEFAULT_ACTION_ROLE, content).await;
            }
            BackendEvent::TaskStatusUpdate(payload) => {
                let Some(task_id) = task_id(&payload) else {
                    tracing::debug!("Dropping status update without task_id");
                    return;
                };
                // A missing or non-string status leaves the session untouched
                if let Some(status) = payload.get("status").and_then(Value::as_str) {
                    self.sessions
                        .set_status(task_id, SessionStatus::from(status))
                        .await;
                }
            }
            BackendEvent::Unknown(kind) => {
                tracing::debug!(event_type = ?kind, "Ignoring backend event");
            }
        }
    }

    /// Send an envelope through every outbound handler, in order.
    ///
    /// The first handler error is returned as-is and later handlers are
    /// not invoked.
    pub async fn send_to_backend(&self, envelope: &Envelope) -> Result<()> {
        let handlers = self.outbound_handlers.read().await.clone();
        if handlers.is_empty() {
            tracing::warn!(event_type = %envelope.kind, "No outbound handler registered");
        }
        for handler in handlers {
            handler.send(envelope).await?;
        }
        Ok(())
    }

    async fn enqueue(&self, payload: &Map<String, Value>, default_role: &str, content: String) {
        let Some(task_id) = task_id(payload) else {
            tracing::debug!("Dropping backend message without task_id");
            return;
        };

        let message_id = resolve_message_id(payload);
        let role = resolve_role(payload, default_role);
        let ack_token = payload.get("ack_token").and_then(scalar_to_string);

        self.sessions
            .add_message(task_id, message_id, role, content, ack_token)
            .await;
    }
}

#[async_trait]
impl InboundHandler for MessageRouter {
    async fn handle(&self, payload: Value) {
        self.handle_backend_event(&payload).await;
    }
}

#[async_trait]
impl OutboundHandler for MessageRouter {
    async fn send(&self, envelope: &Envelope) -> Result<()> {
        self.send_to_backend(envelope).await
    }
}

fn task_id(payload: &Map<String, Value>) -> Option<&str> {
    payload
        .get("task_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Strings pass through, integers are rendered; anything else is rejected
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

fn resolve_message_id(payload: &Map<String, Value>) -> String {
    MESSAGE_ID_KEYS
        .iter()
        .find_map(|key| payload.get(*key).and_then(scalar_to_string))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn resolve_role(payload: &Map<String, Value>, default: &str) -> String {
    payload
        .get("role")
        .and_then(Value::as_str)
        .filter(|role| !role.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn resolve_content(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => render_json(other),
    }
}

fn render_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

/// Human-readable content for a `task_action` event
fn summarize_action(payload: &Map<String, Value>) -> String {
    if let Some(content) = payload
        .get("content")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
    {
        return content.to_string();
    }

    let label = payload
        .get("action")
        .and_then(Value::as_str)
        .filter(|a| !a.is_empty())
        .unwrap_or(DEFAULT_ACTION_LABEL);

    match payload.get("args").and_then(Value::as_object) {
        Some(args) => {
            let detail = match args.get("command").and_then(Value::as_str) {
                Some(command) if !command.is_empty() => command.to_string(),
                _ => render_json(&Value::Object(args.clone())),
            };
            format!("{}: {}", label, detail)
        }
        None => label.to_string(),
    }
}
