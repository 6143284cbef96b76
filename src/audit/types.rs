//! Types for the audit log.
//!
//! Every tool call the agent makes gets one entry: ungated, approved,
//! edited, rejected, expired or cancelled.

use crate::approval::types::Disposition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single entry in the audit log. One entry per tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,

    /// Session identifier (generated at `counsel run` start)
    pub session_id: String,

    /// Approval request id, for gated calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,

    pub tool_call_id: String,
    pub tool_name: String,

    /// How the call got through the gate
    pub disposition: Disposition,

    /// Rejection reason, when not executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Tool result status: success, error or denied
    pub status: String,

    /// Arguments the tool actually ran with, if it ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_args: Option<serde_json::Value>,

    /// Time spent waiting on the reviewer (milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_ms: Option<u64>,
}

/// Summary statistics for a session's audit log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub total_calls: usize,
    pub ungated: usize,
    pub approved: usize,
    pub edited: usize,
    pub rejected: usize,
    /// Expired or cancelled
    pub abandoned: usize,
    pub failed: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl SessionSummary {
    /// Format as a human-readable one-liner for terminal output.
    pub fn one_line(&self) -> String {
        format!(
            "{} calls | {} ungated | {} approved | {} edited | {} rejected | {} expired/cancelled | {} failed",
            self.total_calls,
            self.ungated,
            self.approved,
            self.edited,
            self.rejected,
            self.abandoned,
            self.failed
        )
    }
}

/// Filter criteria for querying audit logs.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub session_id: Option<String>,
    /// Exact tool name
    pub tool_name: Option<String>,
    pub disposition: Option<Disposition>,
    pub limit: Option<usize>,
}
