//! Reviewer-side state machine.
//!
//! Folds incoming server envelopes into a phase, a FIFO of requests waiting
//! for a decision (the head is the one presented) and a highlight projection
//! derived from the presented request. The projection is disposable: it is
//! rebuilt from whatever is presented and cleared on every submission.

use crate::approval::types::{ApprovalRequest, Decision, Todo, ToolArgs};
use crate::gateway::protocol::{AgentStatus, ClientMessage, ProtocolErrorReport, ServerMessage, WorkflowEvent};
use crate::policy::DecisionKind;
use crate::utils::text::normalize_path;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use thiserror::Error;
use uuid::Uuid;

/// How many answered request ids we remember to drop redeliveries.
const ANSWERED_HISTORY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Attached, nothing heard from the agent yet
    Connected,
    AgentRunning,
    AwaitingDecision,
    Finished(AgentStatus),
}

/// Local refusals. None of these produce an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("no approval request is being presented")]
    NothingPresented,

    #[error("decision '{decision}' is not allowed for this request (allowed: {allowed})")]
    DecisionNotAllowed { decision: DecisionKind, allowed: String },

    #[error("edited arguments must be a JSON object: {0}")]
    InvalidEditArgs(String),
}

/// Parse reviewer-typed edit text. Anything but a JSON object is refused.
pub fn parse_edit_args(raw: &str) -> Result<ToolArgs, ClientError> {
    match serde_json::from_str::<serde_json::Value>(raw.trim()) {
        Ok(serde_json::Value::Object(args)) => Ok(args),
        Ok(other) => Err(ClientError::InvalidEditArgs(format!(
            "expected an object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(ClientError::InvalidEditArgs(e.to_string())),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// What the presented request touches, for highlighting in a document or
/// file view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightProjection {
    documents: BTreeSet<String>,
    pages: BTreeMap<String, BTreeSet<u32>>,
    files: BTreeSet<String>,
}

impl HighlightProjection {
    pub fn from_request(request: &ApprovalRequest) -> Self {
        let mut projection = Self::default();
        for doc in &request.document_highlights {
            projection.documents.insert(doc.doc_id.clone());
        }
        for page in &request.page_highlights {
            projection.documents.insert(page.doc_id.clone());
            projection
                .pages
                .entry(page.doc_id.clone())
                .or_default()
                .extend(page.page_nums.iter().copied());
        }
        for file in &request.file_highlights {
            projection.files.insert(normalize_path(&file.file_path));
        }
        projection
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.pages.is_empty() && self.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.documents.clear();
        self.pages.clear();
        self.files.clear();
    }

    pub fn documents(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().map(String::as_str)
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    pub fn pages_of(&self, doc_id: &str) -> Vec<u32> {
        self.pages
            .get(doc_id)
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_document_highlighted(&self, doc_id: &str) -> bool {
        self.documents.contains(doc_id)
    }

    pub fn is_page_highlighted(&self, doc_id: &str, page: u32) -> bool {
        self.pages.get(doc_id).is_some_and(|p| p.contains(&page))
    }

    pub fn is_file_highlighted(&self, path: &str) -> bool {
        self.files.contains(&normalize_path(path))
    }
}

/// What a handled envelope meant for the reviewer.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// A request is now the one presented
    Presented(Uuid),
    /// A request was queued behind the presented one
    Queued(Uuid),
    /// Redelivery of a request we already hold or answered
    Duplicate(Uuid),
    Status(AgentStatus),
    Todos,
    Workflow(WorkflowEvent),
    Error(ProtocolErrorReport),
}

pub struct DecisionClient {
    session_id: String,
    phase: Phase,
    queue: VecDeque<ApprovalRequest>,
    highlights: HighlightProjection,
    answered: HashSet<Uuid>,
    answered_order: VecDeque<Uuid>,
    todos: Vec<Todo>,
    status_details: Option<String>,
    last_error: Option<ProtocolErrorReport>,
}

impl DecisionClient {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            phase: Phase::Connected,
            queue: VecDeque::new(),
            highlights: HighlightProjection::default(),
            answered: HashSet::new(),
            answered_order: VecDeque::new(),
            todos: Vec::new(),
            status_details: None,
            last_error: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished(_))
    }

    /// The request awaiting a decision, if any.
    pub fn presented(&self) -> Option<&ApprovalRequest> {
        self.queue.front()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn highlights(&self) -> &HighlightProjection {
        &self.highlights
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn status_details(&self) -> Option<&str> {
        self.status_details.as_deref()
    }

    pub fn last_error(&self) -> Option<&ProtocolErrorReport> {
        self.last_error.as_ref()
    }

    pub fn handle(&mut self, message: ServerMessage) -> Update {
        match message {
            ServerMessage::ApprovalRequest(request) => self.enqueue(request),
            ServerMessage::AgentStatus(update) => {
                self.status_details = update.details;
                match update.status {
                    AgentStatus::Connected => {}
                    AgentStatus::Running => {
                        if self.queue.is_empty() {
                            self.phase = Phase::AgentRunning;
                        }
                    }
                    status @ (AgentStatus::Completed | AgentStatus::Failed) => {
                        // A finished agent isn't waiting on anything
                        self.queue.clear();
                        self.highlights.clear();
                        self.phase = Phase::Finished(status);
                    }
                }
                Update::Status(update.status)
            }
            ServerMessage::TodosUpdate(update) => {
                self.todos = update.todos;
                Update::Todos
            }
            ServerMessage::WorkflowEvent(event) => Update::Workflow(event),
            ServerMessage::ProtocolError(report) => {
                tracing::warn!(request_id = ?report.request_id, "Server reported: {}", report.message);
                self.last_error = Some(report.clone());
                Update::Error(report)
            }
        }
    }

    fn enqueue(&mut self, request: ApprovalRequest) -> Update {
        let id = request.request_id;
        if self.answered.contains(&id) || self.queue.iter().any(|r| r.request_id == id) {
            return Update::Duplicate(id);
        }
        self.queue.push_back(request);
        if self.queue.len() == 1 {
            self.present_head();
            Update::Presented(id)
        } else {
            Update::Queued(id)
        }
    }

    fn present_head(&mut self) {
        match self.queue.front() {
            Some(request) => {
                self.highlights = HighlightProjection::from_request(request);
                self.phase = Phase::AwaitingDecision;
            }
            None => {
                self.highlights.clear();
                if !self.is_finished() {
                    self.phase = Phase::AgentRunning;
                }
            }
        }
    }

    /// Decide the presented request. On success the request is retired,
    /// highlights are cleared and the next queued request (if any) is
    /// presented.
    pub fn submit(&mut self, decision: Decision) -> Result<ClientMessage, ClientError> {
        let Some(request) = self.queue.front() else {
            return Err(ClientError::NothingPresented);
        };
        let kind = decision.kind();
        if !request.allows(kind) {
            return Err(ClientError::DecisionNotAllowed {
                decision: kind,
                allowed: request
                    .allowed_decisions
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        let request_id = request.request_id;
        self.queue.pop_front();
        self.remember_answered(request_id);
        self.highlights.clear();
        self.present_head();

        Ok(ClientMessage::ApprovalDecision {
            request_id,
            decision,
        })
    }

    fn remember_answered(&mut self, request_id: Uuid) {
        if self.answered.insert(request_id) {
            self.answered_order.push_back(request_id);
        }
        while self.answered_order.len() > ANSWERED_HISTORY {
            if let Some(oldest) = self.answered_order.pop_front() {
                self.answered.remove(&oldest);
            }
        }
    }

    /// Edit the presented request with reviewer-typed JSON.
    pub fn submit_edit(&mut self, raw: &str) -> Result<ClientMessage, ClientError> {
        if self.queue.is_empty() {
            return Err(ClientError::NothingPresented);
        }
        let edited_args = parse_edit_args(raw)?;
        self.submit(Decision::Edit { edited_args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::types::*;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn request(decisions: &[DecisionKind]) -> ApprovalRequest {
        ApprovalRequest {
            request_id: Uuid::new_v4(),
            tool_call_id: "call_1".to_string(),
            tool_name: "get_page_text".to_string(),
            tool_args: ToolArgs::new(),
            allowed_decisions: decisions.to_vec(),
            document_highlights: vec![DocumentHighlight {
                doc_id: "d1".to_string(),
                reason: "Pages requested for detailed review".to_string(),
                legally_significant_pages: vec![2],
                page_summaries: BTreeMap::new(),
            }],
            page_highlights: vec![PageHighlight {
                doc_id: "d1".to_string(),
                page_nums: vec![3, 4],
                context: "indemnity".to_string(),
            }],
            file_highlights: vec![FileHighlight {
                file_path: "/memo.md".to_string(),
                operation: FileOperation::Write,
                content_preview: "draft".to_string(),
                file_exists: false,
                existing_preview: None,
            }],
            agent_reasoning: "Checking the cap".to_string(),
            related_todos: vec![],
            policy_note: None,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    fn all() -> Vec<DecisionKind> {
        DecisionKind::all().to_vec()
    }

    #[test]
    fn test_starts_connected_then_running() {
        let mut client = DecisionClient::new("s1");
        assert_eq!(client.phase(), Phase::Connected);
        client.handle(ServerMessage::status(AgentStatus::Running, None));
        assert_eq!(client.phase(), Phase::AgentRunning);
    }

    #[test]
    fn test_request_projects_highlights() {
        let mut client = DecisionClient::new("s1");
        let req = request(&all());
        let id = req.request_id;
        assert_eq!(client.handle(ServerMessage::ApprovalRequest(req)), Update::Presented(id));
        assert_eq!(client.phase(), Phase::AwaitingDecision);

        let h = client.highlights();
        assert!(h.is_document_highlighted("d1"));
        assert!(h.is_page_highlighted("d1", 3));
        assert!(!h.is_page_highlighted("d1", 2));
        assert!(h.is_file_highlighted("memo.md"));
        assert_eq!(h.pages_of("d1"), vec![3, 4]);
    }

    #[test]
    fn test_submit_clears_and_returns_to_running() {
        let mut client = DecisionClient::new("s1");
        let req = request(&all());
        let id = req.request_id;
        client.handle(ServerMessage::ApprovalRequest(req));

        let msg = client.submit(Decision::Approve).unwrap();
        assert_eq!(
            msg,
            ClientMessage::ApprovalDecision {
                request_id: id,
                decision: Decision::Approve
            }
        );
        assert!(client.highlights().is_empty());
        assert_eq!(client.phase(), Phase::AgentRunning);
        assert!(client.presented().is_none());
    }

    #[test]
    fn test_disallowed_decision_refused_locally() {
        let mut client = DecisionClient::new("s1");
        client.handle(ServerMessage::ApprovalRequest(request(&[
            DecisionKind::Approve,
            DecisionKind::Reject,
        ])));

        let err = client.submit_edit(r#"{"doc_id": "d1"}"#).unwrap_err();
        assert!(matches!(err, ClientError::DecisionNotAllowed { decision: DecisionKind::Edit, .. }));
        // Still presented, highlights intact
        assert!(client.presented().is_some());
        assert!(!client.highlights().is_empty());
    }

    #[test]
    fn test_invalid_edit_json_never_produces_envelope() {
        let mut client = DecisionClient::new("s1");
        client.handle(ServerMessage::ApprovalRequest(request(&all())));

        assert!(matches!(
            client.submit_edit("{not json"),
            Err(ClientError::InvalidEditArgs(_))
        ));
        assert!(matches!(
            client.submit_edit("[1, 2]"),
            Err(ClientError::InvalidEditArgs(_))
        ));
        assert_eq!(client.phase(), Phase::AwaitingDecision);

        let msg = client.submit_edit(r#"{"doc_id": "d1", "page_nums": [3]}"#).unwrap();
        let ClientMessage::ApprovalDecision { decision: Decision::Edit { edited_args }, .. } = msg else {
            panic!("expected an edit decision");
        };
        assert_eq!(edited_args.get("page_nums"), Some(&json!([3])));
    }

    #[test]
    fn test_submit_with_nothing_presented() {
        let mut client = DecisionClient::new("s1");
        assert_eq!(client.submit(Decision::Approve), Err(ClientError::NothingPresented));
    }

    #[test]
    fn test_queue_presents_in_order_and_ignores_redelivery() {
        let mut client = DecisionClient::new("s1");
        let first = request(&all());
        let second = request(&all());
        let (a, b) = (first.request_id, second.request_id);

        client.handle(ServerMessage::ApprovalRequest(first.clone()));
        assert_eq!(client.handle(ServerMessage::ApprovalRequest(second)), Update::Queued(b));
        assert_eq!(
            client.handle(ServerMessage::ApprovalRequest(first.clone())),
            Update::Duplicate(a)
        );

        client.submit(Decision::reject("no")).unwrap();
        assert_eq!(client.presented().map(|r| r.request_id), Some(b));
        assert_eq!(client.phase(), Phase::AwaitingDecision);

        // Replay of an answered request after reconnect
        assert_eq!(client.handle(ServerMessage::ApprovalRequest(first)), Update::Duplicate(a));
    }

    #[test]
    fn test_answered_history_is_bounded() {
        let mut client = DecisionClient::new("s1");
        let first = request(&all());
        client.handle(ServerMessage::ApprovalRequest(first.clone()));
        client.submit(Decision::Approve).unwrap();

        for _ in 0..ANSWERED_HISTORY {
            client.handle(ServerMessage::ApprovalRequest(request(&all())));
            client.submit(Decision::Approve).unwrap();
        }
        assert_eq!(client.answered.len(), ANSWERED_HISTORY);
        assert_eq!(client.answered_order.len(), ANSWERED_HISTORY);
        assert!(!client.answered.contains(&first.request_id));

        // The most recent answers are still recognised
        let recent = *client.answered_order.back().unwrap();
        assert!(client.answered.contains(&recent));
    }

    #[test]
    fn test_completion_finishes_and_drops_queue() {
        let mut client = DecisionClient::new("s1");
        client.handle(ServerMessage::ApprovalRequest(request(&all())));
        client.handle(ServerMessage::todos(vec![Todo {
            content: "Review lease".into(),
            status: TodoStatus::InProgress,
            active_form: "Reviewing lease".into(),
        }]));
        client.handle(ServerMessage::status(AgentStatus::Completed, Some("done".into())));

        assert_eq!(client.phase(), Phase::Finished(AgentStatus::Completed));
        assert!(client.presented().is_none());
        assert_eq!(client.todos().len(), 1);
        assert_eq!(client.status_details(), Some("done"));
    }
}
