//! Tool names, argument and result types

use crate::error::Error;
use crate::session::MessageRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Default page size for `receive_messages`
pub const DEFAULT_RECEIVE_LIMIT: usize = 20;

/// Tools exposed to the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    CreateTaskSession,
    SendMessage,
    ReceiveMessages,
    AckMessages,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        ToolName::CreateTaskSession,
        ToolName::SendMessage,
        ToolName::ReceiveMessages,
        ToolName::AckMessages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::CreateTaskSession => "create_task_session",
            ToolName::SendMessage => "send_message",
            ToolName::ReceiveMessages => "receive_messages",
            ToolName::AckMessages => "ack_messages",
        }
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        let (description, required, optional): (&str, &[&str], &[&str]) = match self {
            ToolName::CreateTaskSession => (
                "Create a task in a backend project and open a session for it",
                &["project_id"],
                &["task_title", "prefill", "task_id", "session_id", "app_url"],
            ),
            ToolName::SendMessage => (
                "Send a message to the task conversation",
                &["task_id", "content"],
                &["metadata"],
            ),
            ToolName::ReceiveMessages => (
                "Pop pending messages for a task, oldest first",
                &["task_id"],
                &["limit"],
            ),
            ToolName::AckMessages => (
                "Acknowledge the last batch returned by receive_messages",
                &["task_id", "ack_token"],
                &[],
            ),
        };
        ToolDescriptor {
            name: self.as_str(),
            description,
            required: required.to_vec(),
            optional: optional.to_vec(),
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| Error::UnknownTool(s.to_string()))
    }
}

/// Name and argument summary of a tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub required: Vec<&'static str>,
    pub optional: Vec<&'static str>,
}

/// Title used when `task_title` is omitted or null
pub fn default_title() -> String {
    "Untitled".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskSessionArgs {
    pub project_id: String,
    #[serde(default)]
    pub task_title: Option<String>,
    #[serde(default)]
    pub prefill: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub app_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageArgs {
    pub task_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiveMessagesArgs {
    pub task_id: String,
    /// Negative values yield an empty batch
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AckMessagesArgs {
    pub task_id: String,
    pub ack_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskSessionResult {
    pub task_id: String,
    pub session_id: String,
    pub app_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageResult {
    pub delivered: bool,
}

/// Wire form of a popped message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub message_id: String,
    pub role: String,
    pub content: String,
    pub ack_token: Option<String>,
    /// ISO-8601, UTC
    pub created_at: String,
}

impl From<MessageRecord> for MessageView {
    fn from(record: MessageRecord) -> Self {
        Self {
            message_id: record.message_id,
            role: record.role,
            content: record.content,
            ack_token: record.ack_token,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveMessagesResult {
    pub messages: Vec<MessageView>,
    pub next_ack_token: Option<String>,
    /// No look-ahead is performed, so this is always false
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckMessagesResult {
    pub status: AckStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_name_parse() {
        for tool in ToolName::ALL {
            assert_eq!(tool.as_str().parse::<ToolName>().unwrap(), tool);
        }
        let err = "drop_tables".parse::<ToolName>().unwrap_err();
        assert!(matches!(err, Error::UnknownTool(name) if name == "drop_tables"));
    }

    #[test]
    fn test_create_args_defaults() {
        let args: CreateTaskSessionArgs =
            serde_json::from_value(json!({"project_id": "p1"})).unwrap();
        assert!(args.task_title.is_none());
        assert!(args.task_id.is_none());
        assert!(args.prefill.is_none());

        let args: CreateTaskSessionArgs =
            serde_json::from_value(json!({"project_id": "p1", "task_title": null})).unwrap();
        assert!(args.task_title.is_none());
    }

    #[test]
    fn test_receive_args_accept_negative_limit() {
        let args: ReceiveMessagesArgs =
            serde_json::from_value(json!({"task_id": "t1", "limit": -1})).unwrap();
        assert_eq!(args.limit, Some(-1));
    }

    #[test]
    fn test_ack_status_wire_form() {
        let ok = serde_json::to_value(AckMessagesResult { status: AckStatus::Ok }).unwrap();
        assert_eq!(ok, json!({"status": "ok"}));
        let ignored = serde_json::to_value(AckMessagesResult {
            status: AckStatus::Ignored,
        })
        .unwrap();
        assert_eq!(ignored, json!({"status": "ignored"}));
    }

    #[test]
    fn test_descriptor_lists_arguments() {
        let descriptor = ToolName::SendMessage.descriptor();
        assert_eq!(descriptor.name, "send_message");
        assert_eq!(descriptor.required, vec!["task_id", "content"]);
        assert_eq!(descriptor.optional, vec!["metadata"]);
    }
}
