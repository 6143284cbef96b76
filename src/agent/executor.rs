//! The gated executor: every tool call the agent makes passes through here.
//!
//! It asks the broker for a directive, runs the tool (with the original or
//! edited args) or turns a rejection into a denial result, and writes one
//! audit entry per call regardless of outcome.

use crate::approval::types::*;
use crate::approval::ApprovalBroker;
use crate::audit::{AuditLogger, LogEntry};
use crate::tools::ToolExecutor;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
    /// Blocked by the reviewer, the deadline or teardown
    Denied,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolStatus::Success => write!(f, "success"),
            ToolStatus::Error => write!(f, "error"),
            ToolStatus::Denied => write!(f, "denied"),
        }
    }
}

/// What the agent sees back for one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub status: ToolStatus,
    pub content: String,
}

impl ToolResult {
    fn new(call: &ToolCall, status: ToolStatus, content: String) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status,
            content,
        }
    }

    /// A denial the agent can read and route around.
    pub fn denied(call: &ToolCall, reason: &str) -> Self {
        Self::new(
            call,
            ToolStatus::Denied,
            format!(
                "Tool call '{}' was rejected by the human reviewer: {}. Do not retry it unchanged; adjust the plan and continue.",
                call.name, reason
            ),
        )
    }
}

pub struct GatedExecutor {
    broker: Arc<ApprovalBroker>,
    tools: Arc<dyn ToolExecutor>,
    audit: Option<Arc<Mutex<AuditLogger>>>,
}

impl GatedExecutor {
    pub fn new(broker: Arc<ApprovalBroker>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self {
            broker,
            tools,
            audit: None,
        }
    }

    pub fn with_audit(mut self, logger: AuditLogger) -> Self {
        self.audit = Some(Arc::new(Mutex::new(logger)));
        self
    }

    pub fn broker(&self) -> &Arc<ApprovalBroker> {
        &self.broker
    }

    /// Gate, then execute or deny. Never fails: execution errors come back
    /// as `error` results.
    pub async fn run_tool(&self, call: &ToolCall, recent_reasoning: &[String]) -> ToolResult {
        let started = Instant::now();
        let resolution = self.broker.propose_and_await(call, recent_reasoning).await;
        let waited = started.elapsed();

        let result = match &resolution.directive {
            ExecutionDirective::Execute { args } => match self.tools.execute(&call.name, args).await {
                Ok(output) => ToolResult::new(call, ToolStatus::Success, output),
                Err(e) => {
                    tracing::warn!(tool = %call.name, "Tool execution failed: {:#}", e);
                    ToolResult::new(call, ToolStatus::Error, format!("Tool execution failed: {:#}", e))
                }
            },
            ExecutionDirective::Reject { reason } => {
                tracing::info!(tool = %call.name, disposition = %resolution.disposition, "Tool call not executed");
                ToolResult::denied(call, reason)
            }
        };

        self.record(call, &resolution, &result, waited.as_millis()).await;
        result
    }

    async fn record(&self, call: &ToolCall, resolution: &Resolution, result: &ToolResult, waited_ms: u128) {
        let Some(audit) = &self.audit else {
            return;
        };
        let (executed_args, reason) = match &resolution.directive {
            ExecutionDirective::Execute { args } => (Some(serde_json::Value::Object(args.clone())), None),
            ExecutionDirective::Reject { reason } => (None, Some(reason.clone())),
        };
        let entry = LogEntry {
            timestamp: Utc::now(),
            session_id: self.broker.session_id().to_string(),
            request_id: resolution.request_id,
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            disposition: resolution.disposition,
            reason,
            status: result.status.to_string(),
            executed_args,
            wait_ms: resolution
                .request_id
                .map(|_| u64::try_from(waited_ms).unwrap_or(u64::MAX)),
        };
        if let Err(e) = audit.lock().await.log(&entry) {
            tracing::error!("Failed to write audit log: {:#}", e);
        }
    }
}
