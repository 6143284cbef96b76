//! The core approval scenarios against the broker and the gated executor,
//! plus the reviewer loop driving a whole plan over the socket.

mod common;

use common::*;
use counsel::agent::{GatedExecutor, ToolStatus};
use counsel::approval::{
    ApprovalBroker, Collaborators, Decision, Disposition, ExecutionDirective, FileOperation,
    Proposal, ProtocolViolation, ToolArgs, ToolCall,
};
use counsel::audit::{AuditLogger, AuditReader};
use counsel::cli::review::review_loop;
use counsel::client::{AutoApprove, AutoReject, DecisionClient, Phase};
use counsel::gateway::protocol::{AgentStatus, ServerMessage};
use counsel::gateway::GatewayClient;
use counsel::policy::{parser, PolicySet};
use counsel::tools::{DataRoom, DataRoomTools};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

const GATE_ALL: &str = r#"
law: scenarios
rules:
  - require_approval: "*"
    decisions: [approve, edit, reject]
"#;

fn args(value: serde_json::Value) -> ToolArgs {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("args must be an object"),
    }
}

struct Fixture {
    broker: Arc<ApprovalBroker>,
    tools: DataRoomTools,
    outbound: mpsc::UnboundedReceiver<ServerMessage>,
}

fn fixture() -> Fixture {
    let policy = Arc::new(PolicySet::new(parser::parse_policy_str(GATE_ALL).unwrap()).unwrap());
    let tools = DataRoomTools::new(DataRoom::from_json(DATA_ROOM).unwrap());
    let (tx, outbound) = mpsc::unbounded_channel();
    let broker = ApprovalBroker::new(
        "scenarios",
        policy,
        Collaborators {
            documents: tools.room.clone(),
            files: tools.workspace.clone(),
            tasks: tools.todos.clone(),
        },
        Arc::new(tx),
    );
    Fixture {
        broker: Arc::new(broker),
        tools,
        outbound,
    }
}

fn emitted_request(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> counsel::approval::ApprovalRequest {
    match rx.try_recv() {
        Ok(ServerMessage::ApprovalRequest(request)) => request,
        other => panic!("expected an approval request, got {:?}", other),
    }
}

#[tokio::test]
async fn test_page_read_approved_with_original_args() {
    let mut f = fixture();
    let call = ToolCall::new("get_page_text", args(json!({"doc_id": "d1", "page_nums": [3, 4]})));
    let Proposal::Pending(ticket) = f.broker.propose(&call, &[]).await else {
        panic!("page reads are gated");
    };

    let request = emitted_request(&mut f.outbound);
    assert_eq!(request.request_id, ticket.request_id());
    assert_eq!(request.page_highlights.len(), 1);
    assert_eq!(request.page_highlights[0].doc_id, "d1");
    assert_eq!(request.page_highlights[0].page_nums, vec![3, 4]);
    assert!(!request.page_highlights[0].context.is_empty());
    // The document itself is highlighted with its significant pages
    assert_eq!(request.document_highlights[0].legally_significant_pages, vec![3, 4]);

    f.broker.resolve(request.request_id, Decision::Approve).await.unwrap();
    let resolution = f.broker.wait(ticket).await;
    assert_eq!(resolution.disposition, Disposition::Approved);
    assert_eq!(
        resolution.directive,
        ExecutionDirective::Execute {
            args: args(json!({"doc_id": "d1", "page_nums": [3, 4]}))
        }
    );
}

#[tokio::test]
async fn test_file_write_edited_args_substituted() {
    let mut f = fixture();
    let executor = GatedExecutor::new(f.broker.clone(), Arc::new(f.tools.clone()));
    let long_content = "x".repeat(1000);
    let call = ToolCall::new(
        "write_file",
        args(json!({"path": "report.md", "content": long_content})),
    );
    let run = tokio::spawn(async move { executor.run_tool(&call, &[]).await });

    wait_for_pending(&f.broker, 1).await;
    let request = emitted_request(&mut f.outbound);
    assert_eq!(request.file_highlights.len(), 1);
    assert_eq!(request.file_highlights[0].file_path, "report.md");
    assert_eq!(request.file_highlights[0].operation, FileOperation::Write);
    assert!(request.file_highlights[0].content_preview.len() < 1000);

    f.broker
        .resolve(
            request.request_id,
            Decision::Edit {
                edited_args: args(json!({"path": "report.md", "content": "revised"})),
            },
        )
        .await
        .unwrap();

    let result = run.await.unwrap();
    assert_eq!(result.status, ToolStatus::Success);
    assert_eq!(
        f.tools.workspace.contents("report.md").await.as_deref(),
        Some("revised")
    );
}

#[tokio::test]
async fn test_rejection_becomes_denial_and_clears_entry() {
    let mut f = fixture();
    let executor = GatedExecutor::new(f.broker.clone(), Arc::new(f.tools.clone()));
    let call = ToolCall::new("get_documents", args(json!({"doc_ids": ["d1"]})));
    let run = tokio::spawn(async move { executor.run_tool(&call, &[]).await });

    wait_for_pending(&f.broker, 1).await;
    let request = emitted_request(&mut f.outbound);
    f.broker
        .resolve(request.request_id, Decision::reject("not needed"))
        .await
        .unwrap();

    let result = run.await.unwrap();
    assert_eq!(result.status, ToolStatus::Denied);
    assert!(result.content.contains("not needed"));
    assert!(!f.broker.is_pending(request.request_id).await);
    assert_eq!(f.broker.pending_count().await, 0);
}

#[tokio::test]
async fn test_unknown_request_changes_nothing() {
    let mut f = fixture();
    let call = ToolCall::new("get_documents", args(json!({"doc_ids": ["d2"]})));
    let Proposal::Pending(_ticket) = f.broker.propose(&call, &[]).await else {
        panic!("document reads are gated");
    };
    let request = emitted_request(&mut f.outbound);

    let stray = Uuid::new_v4();
    let err = f.broker.resolve(stray, Decision::Approve).await.unwrap_err();
    assert_eq!(err, ProtocolViolation::UnknownRequest(stray));
    assert!(!err.is_retryable());

    assert_eq!(f.broker.pending_count().await, 1);
    assert!(f.broker.is_pending(request.request_id).await);
    assert_eq!(f.broker.settled_state(stray).await, None);
    assert!(f.outbound.try_recv().is_err(), "nothing else is emitted");
}

#[tokio::test]
async fn test_audit_log_records_every_call() {
    let mut f = fixture();
    let logs = TempDir::new().unwrap();
    let logger = AuditLogger::in_dir(logs.path(), "scenarios").unwrap();
    let executor = GatedExecutor::new(f.broker.clone(), Arc::new(f.tools.clone())).with_audit(logger);

    let run = tokio::spawn(async move {
        let first = ToolCall::new("list_data_room_documents", ToolArgs::new());
        let second = ToolCall::new("get_documents", args(json!({"doc_ids": ["d2"]})));
        let a = executor.run_tool(&first, &[]).await;
        let b = executor.run_tool(&second, &[]).await;
        (a, b)
    });

    wait_for_pending(&f.broker, 1).await;
    let first = emitted_request(&mut f.outbound);
    f.broker.resolve(first.request_id, Decision::Approve).await.unwrap();
    wait_for_pending(&f.broker, 1).await;
    let second = emitted_request(&mut f.outbound);
    f.broker.resolve(second.request_id, Decision::reject("")).await.unwrap();
    let (a, b) = run.await.unwrap();
    assert_eq!(a.status, ToolStatus::Success);
    assert_eq!(b.status, ToolStatus::Denied);

    let entries = AuditReader::with_dir(logs.path()).read_session("scenarios").unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].disposition, Disposition::Approved);
    assert_eq!(entries[1].disposition, Disposition::Rejected);
    assert_eq!(entries[1].reason.as_deref(), Some("Rejected by reviewer"));

    let summary = AuditReader::summarize(&entries);
    assert_eq!(summary.total_calls, 2);
    assert_eq!(summary.approved, 1);
    assert_eq!(summary.rejected, 1);
}

#[tokio::test]
async fn test_review_loop_auto_approves_plan() {
    let h = Harness::start(POLICY).await;
    let mut conn = GatewayClient::new(&h.socket).attach(&h.session_id).await.unwrap();

    let agent = h.agent();
    let run = tokio::spawn(async move { agent.run(&Harness::plan()).await });

    let mut state = DecisionClient::new(h.session_id.clone());
    tokio::time::timeout(
        std::time::Duration::from_secs(10),
        review_loop(&mut conn, &mut state, &AutoApprove),
    )
    .await
    .expect("review loop should finish with the plan")
    .unwrap();

    assert_eq!(state.phase(), Phase::Finished(AgentStatus::Completed));
    assert!(state.presented().is_none());
    assert_eq!(state.queued(), 0);
    assert_eq!(state.todos().len(), 2);

    let transcript = run.await.unwrap();
    assert_eq!(transcript.count(ToolStatus::Denied), 0);
    assert!(h.tools.workspace.contents("findings.md").await.is_some());
}

#[tokio::test]
async fn test_review_loop_auto_rejects_plan() {
    let h = Harness::start(POLICY).await;
    let mut conn = GatewayClient::new(&h.socket).attach(&h.session_id).await.unwrap();

    let agent = h.agent();
    let run = tokio::spawn(async move { agent.run(&Harness::plan()).await });

    let mut state = DecisionClient::new(h.session_id.clone());
    let reviewer = AutoReject::new("outside the engagement scope");
    tokio::time::timeout(
        std::time::Duration::from_secs(10),
        review_loop(&mut conn, &mut state, &reviewer),
    )
    .await
    .expect("review loop should finish with the plan")
    .unwrap();

    let transcript = run.await.unwrap();
    // get_page_text and write_file are gated; read_file then fails on a missing file
    assert_eq!(transcript.count(ToolStatus::Denied), 2);
    assert_eq!(transcript.count(ToolStatus::Error), 1);
    assert!(transcript
        .results()
        .filter(|r| r.status == ToolStatus::Denied)
        .all(|r| r.content.contains("outside the engagement scope")));
    assert!(h.tools.workspace.contents("findings.md").await.is_none());
}
