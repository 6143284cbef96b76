//! Types for the approval flow.

use crate::policy::types::DecisionKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Structured tool arguments, always a JSON object.
pub type ToolArgs = serde_json::Map<String, serde_json::Value>;

/// A tool invocation proposed by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Agent-side identifier for this call
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: ToolArgs,
}

impl ToolCall {
    /// Build a call with a freshly generated id.
    pub fn new(name: impl Into<String>, args: ToolArgs) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            args,
        }
    }
}

/// Highlight information for a whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentHighlight {
    pub doc_id: String,
    /// Why the agent wants this document
    pub reason: String,
    pub legally_significant_pages: Vec<u32>,
    pub page_summaries: BTreeMap<u32, String>,
}

/// Highlight information for specific pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageHighlight {
    pub doc_id: String,
    pub page_nums: Vec<u32>,
    pub context: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    Write,
    Edit,
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOperation::Write => write!(f, "write"),
            FileOperation::Edit => write!(f, "edit"),
        }
    }
}

/// Highlight information for a file the agent wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHighlight {
    pub file_path: String,
    pub operation: FileOperation,
    /// Bounded preview of the proposed content
    pub content_preview: String,
    /// Whether the file already exists in the agent's workspace
    #[serde(default)]
    pub file_exists: bool,
    /// Bounded preview of what the file holds now, when it exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_preview: Option<String>,
}

/// A request for human approval. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub request_id: Uuid,
    /// The agent's id for the gated call
    pub tool_call_id: String,
    pub tool_name: String,
    pub tool_args: ToolArgs,
    pub allowed_decisions: Vec<DecisionKind>,
    #[serde(default)]
    pub document_highlights: Vec<DocumentHighlight>,
    #[serde(default)]
    pub page_highlights: Vec<PageHighlight>,
    #[serde(default)]
    pub file_highlights: Vec<FileHighlight>,
    pub agent_reasoning: String,
    #[serde(default)]
    pub related_todos: Vec<String>,
    /// Text from the policy rule that gated this call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_note: Option<String>,
    pub created_at: DateTime<Utc>,
    /// When the broker will give up and reject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    pub fn allows(&self, kind: DecisionKind) -> bool {
        self.allowed_decisions.contains(&kind)
    }
}

/// A reviewer's decision on one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Edit { edited_args: ToolArgs },
    Reject {
        #[serde(default)]
        reason: String,
    },
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::Approve => DecisionKind::Approve,
            Decision::Edit { .. } => DecisionKind::Edit,
            Decision::Reject { .. } => DecisionKind::Reject,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Decision::Reject {
            reason: reason.into(),
        }
    }
}

/// A task-list entry, owned by the agent's todo board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub content: String,
    pub status: TodoStatus,
    #[serde(default)]
    pub active_form: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

/// What the tool layer should do once the gate has been passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum ExecutionDirective {
    /// Run the tool with these arguments
    Execute { args: ToolArgs },
    /// Don't run it; tell the agent why
    Reject { reason: String },
}

/// How a tool call got through (or didn't get through) the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Policy didn't require a review
    Ungated,
    Approved,
    Edited,
    Rejected,
    /// No decision before the deadline
    Expired,
    /// Session torn down while waiting
    Cancelled,
}

impl Disposition {
    /// Whether the tool ends up running.
    pub fn executes(&self) -> bool {
        matches!(
            self,
            Disposition::Ungated | Disposition::Approved | Disposition::Edited
        )
    }

    pub fn from_str_loose(s: &str) -> Option<Disposition> {
        match s.to_lowercase().trim() {
            "ungated" | "free" => Some(Disposition::Ungated),
            "approved" | "approve" => Some(Disposition::Approved),
            "edited" | "edit" => Some(Disposition::Edited),
            "rejected" | "reject" | "denied" => Some(Disposition::Rejected),
            "expired" | "timeout" => Some(Disposition::Expired),
            "cancelled" | "canceled" => Some(Disposition::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Ungated => write!(f, "ungated"),
            Disposition::Approved => write!(f, "approved"),
            Disposition::Edited => write!(f, "edited"),
            Disposition::Rejected => write!(f, "rejected"),
            Disposition::Expired => write!(f, "expired"),
            Disposition::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The broker's answer to a proposal: what to do and how we got there.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// None for ungated calls
    pub request_id: Option<Uuid>,
    pub disposition: Disposition,
    pub directive: ExecutionDirective,
}

impl Resolution {
    pub fn ungated(args: ToolArgs) -> Self {
        Self {
            request_id: None,
            disposition: Disposition::Ungated,
            directive: ExecutionDirective::Execute { args },
        }
    }

    pub(crate) fn rejected(request_id: Uuid, disposition: Disposition, reason: String) -> Self {
        Self {
            request_id: Some(request_id),
            disposition,
            directive: ExecutionDirective::Reject { reason },
        }
    }
}
