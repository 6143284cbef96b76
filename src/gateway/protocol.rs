//! Gateway wire protocol.
//!
//! Newline-delimited JSON over a Unix domain socket. The server pushes
//! [`ServerMessage`]s to the attached reviewer, the reviewer sends
//! [`ClientMessage`]s back. Every envelope carries a `type` discriminator.

use crate::approval::types::{ApprovalRequest, Decision, Todo};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server → reviewer. Payload lives under `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    ApprovalRequest(ApprovalRequest),
    AgentStatus(StatusUpdate),
    TodosUpdate(TodosUpdate),
    WorkflowEvent(WorkflowEvent),
    ProtocolError(ProtocolErrorReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Reviewer attached, agent not started yet
    Connected,
    Running,
    Completed,
    Failed,
}

impl AgentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Failed)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Connected => write!(f, "connected"),
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Completed => write!(f, "completed"),
            AgentStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodosUpdate {
    pub todos: Vec<Todo>,
}

/// Progress the reviewer may display but never has to act on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolErrorReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    pub message: String,
}

impl ServerMessage {
    pub fn status(status: AgentStatus, details: Option<String>) -> Self {
        ServerMessage::AgentStatus(StatusUpdate { status, details })
    }

    pub fn todos(todos: Vec<Todo>) -> Self {
        ServerMessage::TodosUpdate(TodosUpdate { todos })
    }

    pub fn workflow(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        ServerMessage::WorkflowEvent(WorkflowEvent {
            event_type: event_type.into(),
            data,
        })
    }

    pub fn protocol_error(request_id: Option<Uuid>, message: impl Into<String>) -> Self {
        ServerMessage::ProtocolError(ProtocolErrorReport {
            request_id,
            message: message.into(),
        })
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::ApprovalRequest(_) => "approval_request",
            ServerMessage::AgentStatus(_) => "agent_status",
            ServerMessage::TodosUpdate(_) => "todos_update",
            ServerMessage::WorkflowEvent(_) => "workflow_event",
            ServerMessage::ProtocolError(_) => "protocol_error",
        }
    }
}

/// Reviewer → server. Fields sit beside `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Must be the first line on every connection
    Attach { session_id: String },
    ApprovalDecision { request_id: Uuid, decision: Decision },
    /// Tear the session down; open requests are cancelled
    EndSession,
}

/// Serialize one envelope as a JSON line (trailing newline included).
pub fn encode_line<T: Serialize>(message: &T) -> Result<String> {
    let mut json = serde_json::to_string(message).context("Failed to encode gateway message")?;
    json.push('\n');
    Ok(json)
}
