//! Agent-facing tool facade
//!
//! Validates tool arguments, maps each call onto the session store or an
//! outbound envelope, and returns JSON results.

use super::types::*;
use crate::error::{Error, Result};
use crate::message::{Envelope, OutboundHandler, CREATE_TASK, SDK_MESSAGE};
use crate::session::SessionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Dispatches tool calls by name
pub struct ToolServer {
    sessions: Arc<SessionManager>,
    backend: Arc<dyn OutboundHandler>,
}

impl ToolServer {
    /// `backend` receives every envelope the tools produce
    pub fn new(sessions: Arc<SessionManager>, backend: Arc<dyn OutboundHandler>) -> Self {
        Self { sessions, backend }
    }

    /// Descriptors of every exposed tool
    pub fn tools(&self) -> Vec<ToolDescriptor> {
        ToolName::ALL.iter().map(ToolName::descriptor).collect()
    }

    /// Invoke a tool by name. `null` arguments are treated as an empty
    /// object.
    pub async fn handle_request(&self, tool_name: &str, arguments: Value) -> Result<Value> {
        let tool: ToolName = tool_name.parse()?;
        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };

        match tool {
            ToolName::CreateTaskSession => {
                to_value(self.create_task_session(parse_args(tool, arguments)?).await?)
            }
            ToolName::SendMessage => to_value(self.send_message(parse_args(tool, arguments)?).await?),
            ToolName::ReceiveMessages => {
                to_value(self.receive_messages(parse_args(tool, arguments)?).await)
            }
            ToolName::AckMessages => to_value(self.ack_messages(parse_args(tool, arguments)?).await),
        }
    }

    /// Register the session locally, then ask the backend to create the task
    pub async fn create_task_session(
        &self,
        args: CreateTaskSessionArgs,
    ) -> Result<CreateTaskSessionResult> {
        if args.project_id.trim().is_empty() {
            return Err(invalid(ToolName::CreateTaskSession, "project_id must not be empty"));
        }

        let task_id = args
            .task_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let session_id = args
            .session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| task_id.clone());

        self.sessions
            .add_session(task_id.clone(), session_id.clone(), args.project_id.clone())
            .await;

        let envelope = Envelope::new(
            CREATE_TASK,
            json!({
                "task_id": task_id,
                "project_id": args.project_id,
                "title": args.task_title.unwrap_or_else(default_title),
                "prefill": args.prefill,
            }),
        );
        self.backend.send(&envelope).await?;

        tracing::info!(task_id = %task_id, session_id = %session_id, "Task session created");
        Ok(CreateTaskSessionResult {
            task_id,
            session_id,
            app_url: args.app_url,
        })
    }

    /// Fire-and-forget: `delivered` only means the envelope was handed off
    pub async fn send_message(&self, args: SendMessageArgs) -> Result<SendMessageResult> {
        let envelope = Envelope::new(
            SDK_MESSAGE,
            json!({
                "task_id": args.task_id,
                "content": args.content,
                "metadata": args.metadata,
            }),
        );
        self.backend.send(&envelope).await?;
        Ok(SendMessageResult { delivered: true })
    }

    pub async fn receive_messages(&self, args: ReceiveMessagesArgs) -> ReceiveMessagesResult {
        let limit = match args.limit {
            Some(limit) => usize::try_from(limit.max(0)).unwrap_or(usize::MAX),
            None => DEFAULT_RECEIVE_LIMIT,
        };
        let records = self.sessions.pop_messages(&args.task_id, limit).await;
        let next_ack_token = records.last().and_then(|record| record.ack_token.clone());

        ReceiveMessagesResult {
            messages: records.into_iter().map(MessageView::from).collect(),
            next_ack_token,
            has_more: false,
        }
    }

    /// A stale or unknown token is not an error
    pub async fn ack_messages(&self, args: AckMessagesArgs) -> AckMessagesResult {
        let status = if self.sessions.ack(&args.task_id, &args.ack_token).await {
            AckStatus::Ok
        } else {
            tracing::debug!(task_id = %args.task_id, "Ack token ignored");
            AckStatus::Ignored
        };
        AckMessagesResult { status }
    }
}

fn parse_args<T: DeserializeOwned>(tool: ToolName, arguments: Value) -> Result<T> {
    serde_json::from_value(arguments).map_err(|e| invalid(tool, e))
}

fn invalid(tool: ToolName, message: impl ToString) -> Error {
    Error::InvalidArguments {
        tool: tool.as_str().to_string(),
        message: message.to_string(),
    }
}

fn to_value<T: Serialize>(result: T) -> Result<Value> {
    Ok(serde_json::to_value(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Capture {
        sent: Mutex<Vec<Envelope>>,
    }

    #[async_trait]
    impl OutboundHandler for Capture {
        async fn send(&self, envelope: &Envelope) -> Result<()> {
            self.sent.lock().await.push(envelope.clone());
            Ok(())
        }
    }

    fn server() -> (Arc<SessionManager>, Arc<Capture>, ToolServer) {
        let sessions = Arc::new(SessionManager::new());
        let capture = Arc::new(Capture::default());
        let server = ToolServer::new(sessions.clone(), capture.clone());
        (sessions, capture, server)
    }

    #[tokio::test]
    async fn test_create_task_session_defaults() {
        let (sessions, capture, server) = server();

        let result = server
            .handle_request("create_task_session", json!({"project_id": "proj-1"}))
            .await
            .unwrap();

        let task_id = result["task_id"].as_str().unwrap().to_string();
        assert!(uuid::Uuid::parse_str(&task_id).is_ok());
        assert_eq!(result["session_id"], task_id.as_str());
        assert_eq!(result["app_url"], Value::Null);

        let session = sessions.get_session(&task_id).await.unwrap();
        assert_eq!(session.project_id, "proj-1");

        let sent = capture.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "create_task");
        assert_eq!(
            sent[0].payload,
            json!({"task_id": task_id, "project_id": "proj-1", "title": "Untitled", "prefill": null})
        );
    }

    #[tokio::test]
    async fn test_create_task_session_null_title_defaults() {
        let (sessions, capture, server) = server();

        let result = server
            .handle_request(
                "create_task_session",
                json!({"project_id": "p1", "task_title": null, "prefill": null}),
            )
            .await
            .unwrap();

        let task_id = result["task_id"].as_str().unwrap();
        assert!(sessions.get_session(task_id).await.is_some());
        let sent = capture.sent.lock().await;
        assert_eq!(sent[0].payload["title"], "Untitled");
        assert_eq!(sent[0].payload["prefill"], Value::Null);
    }

    #[tokio::test]
    async fn test_create_task_session_explicit_ids() {
        let (sessions, capture, server) = server();

        let result = server
            .handle_request(
                "create_task_session",
                json!({
                    "project_id": "proj-1",
                    "task_title": "Fix login",
                    "prefill": "Look at auth.rs",
                    "task_id": "task-7",
                    "session_id": "sess-7",
                    "app_url": "https://app.conductor.local/tasks/task-7"
                }),
            )
            .await
            .unwrap();

        assert_eq!(
            result,
            json!({
                "task_id": "task-7",
                "session_id": "sess-7",
                "app_url": "https://app.conductor.local/tasks/task-7"
            })
        );
        assert_eq!(sessions.get_session("task-7").await.unwrap().session_id, "sess-7");
        let sent = capture.sent.lock().await;
        assert_eq!(sent[0].payload["title"], "Fix login");
        assert_eq!(sent[0].payload["prefill"], "Look at auth.rs");
    }

    #[tokio::test]
    async fn test_create_requires_project_id() {
        let (_, capture, server) = server();

        for args in [json!({}), json!({"project_id": "  "}), Value::Null] {
            let err = server
                .handle_request("create_task_session", args)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidArguments { ref tool, .. } if tool == "create_task_session"));
        }
        assert!(capture.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_send_message() {
        let (_, capture, server) = server();

        let result = server
            .handle_request(
                "send_message",
                json!({"task_id": "t1", "content": "done", "metadata": {"files": 2}}),
            )
            .await
            .unwrap();
        assert_eq!(result, json!({"delivered": true}));

        let sent = capture.sent.lock().await;
        assert_eq!(sent[0].kind, "sdk_message");
        assert_eq!(
            sent[0].payload,
            json!({"task_id": "t1", "content": "done", "metadata": {"files": 2}})
        );
    }

    #[tokio::test]
    async fn test_send_message_missing_content() {
        let (_, _, server) = server();
        let err = server
            .handle_request("send_message", json!({"task_id": "t1"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");
        assert!(err.to_string().contains("content"));
    }

    #[tokio::test]
    async fn test_receive_and_ack() {
        let (sessions, _, server) = server();
        sessions.add_session("t1", "s1", "p1").await;
        sessions
            .add_message("t1", "m1", "user", "first", Some("tok-1".to_string()))
            .await;
        sessions
            .add_message("t1", "m2", "user", "second", Some("tok-2".to_string()))
            .await;

        let result = server
            .handle_request("receive_messages", json!({"task_id": "t1"}))
            .await
            .unwrap();
        let result: ReceiveMessagesResult = serde_json::from_value(result).unwrap();
        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[0].message_id, "m1");
        assert_eq!(result.messages[1].content, "second");
        assert_eq!(result.next_ack_token.as_deref(), Some("tok-2"));
        assert!(!result.has_more);
        assert!(chrono::DateTime::parse_from_rfc3339(&result.messages[0].created_at).is_ok());

        let stale = server
            .handle_request("ack_messages", json!({"task_id": "t1", "ack_token": "tok-1"}))
            .await
            .unwrap();
        assert_eq!(stale, json!({"status": "ignored"}));

        let ok = server
            .handle_request("ack_messages", json!({"task_id": "t1", "ack_token": "tok-2"}))
            .await
            .unwrap();
        assert_eq!(ok, json!({"status": "ok"}));

        let again = server
            .handle_request("ack_messages", json!({"task_id": "t1", "ack_token": "tok-2"}))
            .await
            .unwrap();
        assert_eq!(again, json!({"status": "ignored"}));
    }

    #[tokio::test]
    async fn test_receive_respects_limit() {
        let (sessions, _, server) = server();
        sessions.add_session("t1", "s1", "p1").await;
        for i in 0..5 {
            sessions
                .add_message("t1", format!("m{}", i), "user", "x", None)
                .await;
        }

        let first = server
            .receive_messages(ReceiveMessagesArgs {
                task_id: "t1".to_string(),
                limit: Some(3),
            })
            .await;
        assert_eq!(first.messages.len(), 3);
        assert!(first.next_ack_token.is_none());

        let rest = server
            .handle_request("receive_messages", json!({"task_id": "t1", "limit": 10}))
            .await
            .unwrap();
        assert_eq!(rest["messages"].as_array().unwrap().len(), 2);
        assert_eq!(rest["messages"][0]["message_id"], "m3");
    }

    #[tokio::test]
    async fn test_receive_negative_limit_returns_empty_batch() {
        let (sessions, _, server) = server();
        sessions.add_session("t1", "s1", "p1").await;
        sessions
            .add_message("t1", "m1", "user", "hello", Some("tok-1".to_string()))
            .await;

        let result = server
            .handle_request("receive_messages", json!({"task_id": "t1", "limit": -1}))
            .await
            .unwrap();
        assert_eq!(
            result,
            json!({"messages": [], "next_ack_token": null, "has_more": false})
        );

        let zero = server
            .handle_request("receive_messages", json!({"task_id": "t1", "limit": 0}))
            .await
            .unwrap();
        assert!(zero["messages"].as_array().unwrap().is_empty());

        // Nothing was consumed
        let rest = server
            .handle_request("receive_messages", json!({"task_id": "t1"}))
            .await
            .unwrap();
        assert_eq!(rest["messages"][0]["message_id"], "m1");
        assert_eq!(rest["next_ack_token"], "tok-1");
    }

    #[tokio::test]
    async fn test_receive_unknown_task_is_empty() {
        let (_, _, server) = server();
        let result = server
            .handle_request("receive_messages", json!({"task_id": "missing"}))
            .await
            .unwrap();
        assert_eq!(
            result,
            json!({"messages": [], "next_ack_token": null, "has_more": false})
        );
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (_, _, server) = server();
        let err = server
            .handle_request("delete_task", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTool(ref name) if name == "delete_task"));
        assert!(err.to_string().contains("delete_task"));
    }

    #[test]
    fn test_tools_listing() {
        let (_, _, server) = server();
        let names: Vec<&str> = server.tools().iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec!["create_task_session", "send_message", "receive_messages", "ack_messages"]
        );
    }
}
