//! Structured event emission to the backend

use crate::error::Result;
use crate::message::{Envelope, OutboundHandler, TASK_STATUS_UPDATE};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

/// Emits timestamped events through an outbound handler
pub struct EventReporter {
    sender: Arc<dyn OutboundHandler>,
}

impl EventReporter {
    pub fn new(sender: Arc<dyn OutboundHandler>) -> Self {
        Self { sender }
    }

    /// Send `{type, timestamp, payload}` with the current UTC time
    pub async fn emit(&self, event_type: &str, payload: Value) -> Result<()> {
        let envelope = Envelope::new(event_type, payload).with_timestamp(Utc::now());
        self.sender.send(&envelope).await
    }

    /// Report a task status change
    pub async fn task_status(&self, task_id: &str, status: &str, summary: Option<&str>) -> Result<()> {
        tracing::debug!(task_id = %task_id, status = %status, "Reporting task status");
        self.emit(
            TASK_STATUS_UPDATE,
            json!({"task_id": task_id, "status": status, "summary": summary}),
        )
        .await
    }
}
