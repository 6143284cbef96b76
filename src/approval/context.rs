//! Approval context builder.
//!
//! Turns a gated tool call into an `ApprovalRequest` the reviewer can act on:
//! which documents and pages the agent wants, what it's about to write, why it
//! says it needs them and which tasks it's working on.
//!
//! Building never fails. If a collaborator can't resolve a document or file,
//! that highlight is dropped and the request goes out without it. A missing
//! summary must never block a reviewer from seeing the request.

use crate::approval::collaborators::{DocumentSource, FileSource};
use crate::approval::types::*;
use crate::policy::{Gate, PolicySet, ToolKind};
use crate::utils::text::{clip, normalize_path, preview, sentence_mentioning};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

const FALLBACK_REASONING: &str = "Continuing with analysis task";
const FALLBACK_DOCUMENT_REASON: &str = "Document requested for review";
const PAGE_REVIEW_REASON: &str = "Pages requested for detailed review";

/// Messages shorter than this are acknowledgements, not reasoning.
const MIN_REASONING_CHARS: usize = 50;
/// How far back to look for a sentence explaining a specific document.
const DOCUMENT_REASON_WINDOW: usize = 10;
const DOCUMENT_REASON_CHARS: usize = 200;

/// What a tool call touches, read off its name and arguments.
#[derive(Debug, Clone, PartialEq)]
enum Access {
    Documents(Vec<String>),
    Pages {
        doc_id: String,
        page_nums: Vec<u32>,
        context: Option<String>,
    },
    File {
        path: String,
        operation: FileOperation,
        content: String,
    },
}

/// Classify a call into everything it accesses. A call can hit several
/// categories (a page read is also a document read) or none.
fn classify(call: &ToolCall) -> Vec<Access> {
    let args = &call.args;
    let mut accesses = Vec::new();

    match ToolKind::of(&call.name) {
        ToolKind::PageAccess => {
            if let Some(doc_id) = str_arg(args, "doc_id") {
                let mut page_nums = page_list(args.get("page_nums"));
                if page_nums.is_empty() {
                    page_nums = page_list(args.get("page_num"));
                }
                accesses.push(Access::Pages {
                    doc_id: doc_id.to_string(),
                    page_nums,
                    context: str_arg(args, "context").map(str::to_string),
                });
            }
        }
        ToolKind::FileMutation => {
            let path = str_arg(args, "file_path").or_else(|| str_arg(args, "path"));
            if let Some(path) = path {
                let operation = if call.name == "edit_file" {
                    FileOperation::Edit
                } else {
                    FileOperation::Write
                };
                let content = str_arg(args, "content")
                    .filter(|c| !c.is_empty())
                    .or_else(|| str_arg(args, "new_string"))
                    .unwrap_or_default();
                accesses.push(Access::File {
                    path: path.to_string(),
                    operation,
                    content: content.to_string(),
                });
            }
        }
        _ => {}
    }

    let mut doc_ids = Vec::new();
    for key in ["doc_ids", "document_ids"] {
        if let Some(Value::Array(items)) = args.get(key) {
            for id in items.iter().filter_map(Value::as_str) {
                if !doc_ids.iter().any(|d: &String| d == id) {
                    doc_ids.push(id.to_string());
                }
            }
        }
    }
    if !doc_ids.is_empty() {
        accesses.push(Access::Documents(doc_ids));
    }

    accesses
}

fn str_arg<'a>(args: &'a ToolArgs, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// Accepts `[3, 4]`, `3`, or `["3", "4"]`.
fn page_list(value: Option<&Value>) -> Vec<u32> {
    let to_page = |v: &Value| -> Option<u32> {
        match v {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    };
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(to_page).collect(),
        Some(v) => to_page(v).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Builds approval requests from gated tool calls.
pub struct ContextBuilder {
    policy: Arc<PolicySet>,
    documents: Arc<dyn DocumentSource>,
    files: Arc<dyn FileSource>,
}

impl ContextBuilder {
    pub fn new(
        policy: Arc<PolicySet>,
        documents: Arc<dyn DocumentSource>,
        files: Arc<dyn FileSource>,
    ) -> Self {
        Self {
            policy,
            documents,
            files,
        }
    }

    /// Assemble the request for a gated call. `recent_reasoning` is the
    /// agent's messages, oldest first.
    pub async fn build(
        &self,
        call: &ToolCall,
        todos: &[Todo],
        recent_reasoning: &[String],
    ) -> ApprovalRequest {
        let settings = self.policy.settings();
        tracing::debug!(tool = %call.name, call_id = %call.id, "Building approval context");

        let agent_reasoning = extract_reasoning(
            recent_reasoning,
            settings.reasoning_window,
            settings.reasoning_chars,
        );

        let mut document_highlights = Vec::new();
        let mut page_highlights = Vec::new();
        let mut file_highlights = Vec::new();
        let mut mentions: Vec<String> = Vec::new();

        for access in classify(call) {
            match access {
                Access::Documents(doc_ids) => {
                    for doc_id in doc_ids {
                        let reason = extract_document_reason(&doc_id, recent_reasoning);
                        if let Some(h) = self.document_highlight(&doc_id, reason).await {
                            push_unique_doc(&mut document_highlights, h);
                        }
                        mentions.push(doc_id);
                    }
                }
                Access::Pages {
                    doc_id,
                    page_nums,
                    context,
                } => {
                    if let Some(h) = self
                        .document_highlight(&doc_id, PAGE_REVIEW_REASON.to_string())
                        .await
                    {
                        push_unique_doc(&mut document_highlights, h);
                    }
                    page_highlights.push(PageHighlight {
                        doc_id: doc_id.clone(),
                        page_nums,
                        context: context.unwrap_or_else(|| agent_reasoning.clone()),
                    });
                    mentions.push(doc_id);
                }
                Access::File {
                    path,
                    operation,
                    content,
                } => {
                    match self.files.file_state(&path).await {
                        Ok(state) => file_highlights.push(FileHighlight {
                            file_path: path.clone(),
                            operation,
                            content_preview: preview(&content, settings.preview_chars),
                            file_exists: state.exists,
                            existing_preview: state
                                .preview
                                .filter(|_| state.exists)
                                .map(|current| preview(&current, settings.preview_chars)),
                        }),
                        Err(e) => {
                            tracing::warn!(path = %path, "Could not resolve file state, omitting highlight: {:#}", e);
                        }
                    }
                    mentions.push(normalize_path(&path));
                }
            }
        }

        let related_todos = select_related_todos(todos, &mentions, settings.max_related_todos);

        let (allowed_decisions, policy_note) = match self.policy.gate(&call.name) {
            Gate::Approval {
                allowed_decisions,
                prompt,
                ..
            } => (allowed_decisions, prompt),
            // Built for an ungated tool (callers normally check first);
            // fall back to what the tool kind would get.
            Gate::Open { .. } => (ToolKind::of(&call.name).default_decisions(), None),
        };

        let created_at = Utc::now();
        let expires_at = settings
            .decision_timeout_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| created_at + chrono::Duration::seconds(secs));

        ApprovalRequest {
            request_id: Uuid::new_v4(),
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            tool_args: call.args.clone(),
            allowed_decisions,
            document_highlights,
            page_highlights,
            file_highlights,
            agent_reasoning,
            related_todos,
            policy_note,
            created_at,
            expires_at,
        }
    }

    /// Look a document up; `None` (with a log line) when it can't be resolved.
    async fn document_highlight(&self, doc_id: &str, reason: String) -> Option<DocumentHighlight> {
        match self.documents.document_metadata(doc_id).await {
            Ok(Some(meta)) => Some(DocumentHighlight {
                doc_id: doc_id.to_string(),
                reason,
                legally_significant_pages: meta.legally_significant_pages,
                page_summaries: meta.page_summaries,
            }),
            Ok(None) => {
                tracing::debug!(doc_id, "Document not in data room, omitting highlight");
                None
            }
            Err(e) => {
                tracing::warn!(doc_id, "Document lookup failed, omitting highlight: {:#}", e);
                None
            }
        }
    }
}

fn push_unique_doc(highlights: &mut Vec<DocumentHighlight>, highlight: DocumentHighlight) {
    if !highlights.iter().any(|h| h.doc_id == highlight.doc_id) {
        highlights.push(highlight);
    }
}

/// The agent's most recent substantive message.
fn extract_reasoning(messages: &[String], window: usize, max_chars: usize) -> String {
    messages
        .iter()
        .rev()
        .take(window)
        .find(|m| m.chars().count() > MIN_REASONING_CHARS)
        .map(|m| clip(m.trim(), max_chars).to_string())
        .unwrap_or_else(|| FALLBACK_REASONING.to_string())
}

/// Why the agent wants one particular document: the latest sentence naming it.
fn extract_document_reason(doc_id: &str, messages: &[String]) -> String {
    messages
        .iter()
        .rev()
        .take(DOCUMENT_REASON_WINDOW)
        .find_map(|m| sentence_mentioning(m, doc_id, DOCUMENT_REASON_CHARS))
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_DOCUMENT_REASON.to_string())
}

/// In-progress todos first, then any todo that mentions something the
/// call touches. Best-effort substring matching.
fn select_related_todos(todos: &[Todo], mentions: &[String], limit: usize) -> Vec<String> {
    let in_progress = todos
        .iter()
        .filter(|t| t.status == TodoStatus::InProgress);

    let mentioned = todos.iter().filter(|t| {
        t.status != TodoStatus::InProgress
            && mentions.iter().any(|m| {
                let file_name = m.rsplit('/').next().unwrap_or(m);
                !m.is_empty() && (t.content.contains(m.as_str()) || t.content.contains(file_name))
            })
    });

    let mut selected: Vec<String> = Vec::new();
    for todo in in_progress.chain(mentioned) {
        if selected.len() >= limit {
            break;
        }
        if !selected.contains(&todo.content) {
            selected.push(todo.content.clone());
        }
    }
    selected
}
