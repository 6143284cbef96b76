//! Scripted agent: replays a recorded plan through the gate.
//!
//! A plan is a JSON list of steps. Each step is one of
//! `{"say": "..."}`, `{"todos": [...]}` or `{"tool": "name", "args": {...}}`.
//! The runner never decides anything; rejections and errors are recorded in
//! the transcript and the plan carries on with the next step.

use crate::agent::executor::{GatedExecutor, ToolResult, ToolStatus};
use crate::approval::types::{Todo, ToolArgs, ToolCall};
use crate::gateway::protocol::{AgentStatus, ServerMessage};
use crate::gateway::transport::Transport;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanStep {
    Say {
        say: String,
    },
    Todos {
        todos: Vec<Todo>,
    },
    Tool {
        tool: String,
        #[serde(default)]
        args: ToolArgs,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan: {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid plan file: {}", path.display()))
    }

    /// Accepts either `{"steps": [...]}` or a bare list of steps.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json).context("Failed to parse plan JSON")?;
        if value.is_array() {
            let steps = serde_json::from_value(value).context("Unrecognised plan step")?;
            return Ok(Plan { steps });
        }
        serde_json::from_value(value).context("Unrecognised plan step")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEntry {
    Message(String),
    Call(ToolCall),
    Result(ToolResult),
}

/// Everything the agent said and every tool result it got back.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    pub entries: Vec<TranscriptEntry>,
}

impl Transcript {
    /// The agent's own messages, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                TranscriptEntry::Message(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn results(&self) -> impl Iterator<Item = &ToolResult> {
        self.entries.iter().filter_map(|e| match e {
            TranscriptEntry::Result(r) => Some(r),
            _ => None,
        })
    }

    pub fn count(&self, status: ToolStatus) -> usize {
        self.results().filter(|r| r.status == status).count()
    }
}

pub struct ScriptedAgent {
    executor: GatedExecutor,
    /// Where status, todo and progress events go
    events: Arc<dyn Transport>,
}

impl ScriptedAgent {
    pub fn new(executor: GatedExecutor, events: Arc<dyn Transport>) -> Self {
        Self { executor, events }
    }

    async fn emit(&self, message: ServerMessage) {
        let kind = message.kind();
        if let Err(e) = self.events.send(message).await {
            tracing::debug!(kind, "Event not delivered: {:#}", e);
        }
    }

    /// Run the whole plan, one step at a time.
    pub async fn run(&self, plan: &Plan) -> Transcript {
        let mut transcript = Transcript::default();
        self.emit(ServerMessage::status(
            AgentStatus::Running,
            Some(format!("{} plan steps", plan.steps.len())),
        ))
        .await;

        for step in &plan.steps {
            match step {
                PlanStep::Say { say } => {
                    transcript.entries.push(TranscriptEntry::Message(say.clone()));
                    self.emit(ServerMessage::workflow("agent_message", json!({ "text": say })))
                        .await;
                }
                PlanStep::Todos { todos } => {
                    let mut args = ToolArgs::new();
                    args.insert("todos".to_string(), json!(todos));
                    self.call_tool(ToolCall::new("write_todos", args), &mut transcript)
                        .await;
                }
                PlanStep::Tool { tool, args } => {
                    self.call_tool(ToolCall::new(tool.clone(), args.clone()), &mut transcript)
                        .await;
                }
            }
        }

        let details = format!(
            "{} succeeded, {} denied, {} failed",
            transcript.count(ToolStatus::Success),
            transcript.count(ToolStatus::Denied),
            transcript.count(ToolStatus::Error)
        );
        tracing::info!(session = %self.executor.broker().session_id(), "Plan finished: {}", details);
        self.emit(ServerMessage::status(AgentStatus::Completed, Some(details)))
            .await;
        transcript
    }

    async fn call_tool(&self, call: ToolCall, transcript: &mut Transcript) {
        self.emit(ServerMessage::workflow(
            "tool_call",
            json!({ "call_id": call.id, "tool_name": call.name, "args": call.args }),
        ))
        .await;
        transcript.entries.push(TranscriptEntry::Call(call.clone()));

        let result = self.executor.run_tool(&call, &transcript.messages()).await;

        self.emit(ServerMessage::workflow(
            "tool_result",
            json!({ "call_id": result.call_id, "tool_name": result.tool_name, "status": result.status }),
        ))
        .await;
        if call.name == "write_todos" && result.status == ToolStatus::Success {
            let todos = self.executor.broker().task_list().await;
            self.emit(ServerMessage::todos(todos)).await;
        }
        transcript.entries.push(TranscriptEntry::Result(result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_steps_parse() {
        let plan = Plan::from_json(
            r#"[
                {"say": "Looking at the lease"},
                {"todos": [{"content": "Review lease", "status": "in_progress", "activeForm": "Reviewing lease"}]},
                {"tool": "get_documents", "args": {"doc_ids": ["d1"]}},
                {"tool": "list_data_room_documents"}
            ]"#,
        )
        .unwrap();
        assert_eq!(plan.steps.len(), 4);
        assert!(matches!(plan.steps[0], PlanStep::Say { .. }));
        assert!(matches!(plan.steps[1], PlanStep::Todos { .. }));
        match &plan.steps[3] {
            PlanStep::Tool { tool, args } => {
                assert_eq!(tool, "list_data_room_documents");
                assert!(args.is_empty());
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_plan_object_form() {
        let plan = Plan::from_json(r#"{"steps": [{"say": "hi"}]}"#).unwrap();
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn test_bad_step_rejected() {
        assert!(Plan::from_json(r#"[{"shell": "rm -rf /"}]"#).is_err());
    }

    #[test]
    fn test_transcript_messages_only() {
        let mut t = Transcript::default();
        t.entries.push(TranscriptEntry::Message("one".into()));
        t.entries.push(TranscriptEntry::Call(ToolCall::new("read_file", ToolArgs::new())));
        t.entries.push(TranscriptEntry::Message("two".into()));
        assert_eq!(t.messages(), vec!["one".to_string(), "two".to_string()]);
    }
}
