//! Approval broker — the gate between a proposed tool call and its execution.
//!
//! Per call:
//! 1. Ungated tools get an immediate execute directive, nothing is emitted
//! 2. Gated tools get a context-rich request, a pending entry and a
//!    one-shot completion handle
//! 3. The caller suspends on that handle until `resolve`, expiry or teardown
//!
//! Teardown also closes the broker: any gated call proposed afterwards is
//! cancelled on the spot instead of waiting for a reviewer who has left.
//!
//! The pending table is the only mutable shared state. Every transition out
//! of `Open` is a remove under the table lock, so two decisions racing for the
//! same request can't both win.

use crate::approval::collaborators::{DocumentSource, FileSource, TaskList};
use crate::approval::context::ContextBuilder;
use crate::approval::error::ProtocolViolation;
use crate::approval::types::*;
use crate::gateway::protocol::ServerMessage;
use crate::gateway::transport::Transport;
use crate::policy::PolicySet;
use std::collections::{HashMap, VecDeque};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use uuid::Uuid;

/// How many settled request ids we remember for duplicate detection.
const SETTLED_HISTORY: usize = 1024;

const DEFAULT_REJECT_REASON: &str = "Rejected by reviewer";

/// The collaborators a broker reads context from.
#[derive(Clone)]
pub struct Collaborators {
    pub documents: Arc<dyn DocumentSource>,
    pub files: Arc<dyn FileSource>,
    pub tasks: Arc<dyn TaskList>,
}

/// Server-side bookkeeping for one open request.
struct PendingApproval {
    request: ApprovalRequest,
    resolver: oneshot::Sender<Resolution>,
}

#[derive(Default)]
struct PendingTable {
    open: HashMap<Uuid, PendingApproval>,
    settled: HashMap<Uuid, Disposition>,
    settled_order: VecDeque<Uuid>,
    /// Teardown reason once the session has been closed
    closed: Option<String>,
}

impl PendingTable {
    fn settle(&mut self, request_id: Uuid, disposition: Disposition) {
        self.settled.insert(request_id, disposition);
        self.settled_order.push_back(request_id);
        while self.settled_order.len() > SETTLED_HISTORY {
            if let Some(oldest) = self.settled_order.pop_front() {
                self.settled.remove(&oldest);
            }
        }
    }
}

/// Result of proposing a call: either ready to go or waiting on a human.
pub enum Proposal {
    Ready(Resolution),
    Pending(ApprovalTicket),
}

/// Completion handle for one pending request. Redeem it with
/// [`ApprovalBroker::wait`].
pub struct ApprovalTicket {
    request_id: Uuid,
    receiver: oneshot::Receiver<Resolution>,
    /// Local instant matching the request's `expires_at`
    deadline: Option<Instant>,
}

impl ApprovalTicket {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

/// Per-session approval broker.
pub struct ApprovalBroker {
    session_id: String,
    policy: Arc<PolicySet>,
    context: ContextBuilder,
    tasks: Arc<dyn TaskList>,
    transport: Arc<dyn Transport>,
    table: Mutex<PendingTable>,
}

impl ApprovalBroker {
    pub fn new(
        session_id: impl Into<String>,
        policy: Arc<PolicySet>,
        collaborators: Collaborators,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            context: ContextBuilder::new(
                policy.clone(),
                collaborators.documents,
                collaborators.files,
            ),
            policy,
            tasks: collaborators.tasks,
            transport,
            table: Mutex::new(PendingTable::default()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current todo list, as the context builder sees it.
    pub async fn task_list(&self) -> Vec<Todo> {
        self.tasks.task_list().await
    }

    /// Gate a call. Ungated calls come back `Ready`; gated calls are
    /// registered, emitted to the reviewer and come back `Pending`.
    pub async fn propose(&self, call: &ToolCall, recent_reasoning: &[String]) -> Proposal {
        if !self.policy.requires_approval(&call.name) {
            tracing::debug!(session = %self.session_id, tool = %call.name, "Ungated tool call");
            return Proposal::Ready(Resolution::ungated(call.args.clone()));
        }

        let todos = self.tasks.task_list().await;
        let request = self.context.build(call, &todos, recent_reasoning).await;
        let request_id = request.request_id;
        let deadline = request.expires_at.map(|at| {
            let remaining = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            Instant::now() + remaining
        });
        let (resolver, receiver) = oneshot::channel();

        // Register before emitting so an instant decision always finds the entry
        {
            let mut table = self.table.lock().await;
            if let Some(reason) = table.closed.clone() {
                table.settle(request_id, Disposition::Cancelled);
                drop(table);
                tracing::info!(
                    session = %self.session_id,
                    %request_id,
                    tool = %call.name,
                    "Session closed, gated call cancelled"
                );
                return Proposal::Ready(Resolution::rejected(
                    request_id,
                    Disposition::Cancelled,
                    reason,
                ));
            }
            table.open.insert(
                request_id,
                PendingApproval {
                    request: request.clone(),
                    resolver,
                },
            );
        }

        tracing::info!(
            session = %self.session_id,
            %request_id,
            tool = %call.name,
            "Awaiting approval"
        );

        if let Err(e) = self
            .transport
            .send(ServerMessage::ApprovalRequest(request))
            .await
        {
            // Stays pending; replayed when a reviewer attaches
            tracing::warn!(%request_id, "Approval request not delivered: {:#}", e);
        }

        Proposal::Pending(ApprovalTicket {
            request_id,
            receiver,
            deadline,
        })
    }

    /// Suspend until the ticket's request is resolved, expires or is cancelled.
    ///
    /// The deadline is the request's `expires_at`, counted from when the
    /// request was built rather than from when the caller started waiting.
    pub async fn wait(&self, ticket: ApprovalTicket) -> Resolution {
        let ApprovalTicket {
            request_id,
            mut receiver,
            deadline,
        } = ticket;

        let received = match deadline {
            None => receiver.await,
            Some(deadline) => match tokio::time::timeout_at(deadline, &mut receiver).await {
                Ok(received) => received,
                Err(_) => {
                    if let Some(resolution) = self.expire(request_id).await {
                        return resolution;
                    }
                    // A decision won the race against the deadline
                    receiver.await
                }
            },
        };

        received.unwrap_or_else(|_| {
            Resolution::rejected(
                request_id,
                Disposition::Cancelled,
                "Approval channel closed before a decision arrived".to_string(),
            )
        })
    }

    /// Propose and, if gated, wait. The tool layer's single entry point.
    pub async fn propose_and_await(&self, call: &ToolCall, recent_reasoning: &[String]) -> Resolution {
        match self.propose(call, recent_reasoning).await {
            Proposal::Ready(resolution) => resolution,
            Proposal::Pending(ticket) => self.wait(ticket).await,
        }
    }

    /// Apply a reviewer's decision.
    ///
    /// Unknown and already-settled ids are rejected without touching the
    /// table. A decision outside the request's allowed set leaves the
    /// request open for a valid resubmission.
    pub async fn resolve(
        &self,
        request_id: Uuid,
        decision: Decision,
    ) -> Result<Disposition, ProtocolViolation> {
        let mut table = self.table.lock().await;

        if let Some(&disposition) = table.settled.get(&request_id) {
            tracing::debug!(%request_id, %disposition, "Duplicate decision ignored");
            return Err(ProtocolViolation::AlreadyResolved {
                request_id,
                disposition,
            });
        }

        let allowed = match table.open.get(&request_id) {
            None => {
                tracing::warn!(session = %self.session_id, %request_id, "Decision for unknown request");
                return Err(ProtocolViolation::UnknownRequest(request_id));
            }
            Some(entry) => &entry.request.allowed_decisions,
        };

        let kind = decision.kind();
        if !allowed.contains(&kind) {
            let allowed = allowed
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(%request_id, decision = %kind, "Decision not allowed for this request");
            return Err(ProtocolViolation::DecisionNotAllowed {
                request_id,
                decision: kind,
                allowed,
            });
        }

        let Some(entry) = table.open.remove(&request_id) else {
            return Err(ProtocolViolation::UnknownRequest(request_id));
        };

        let (disposition, directive) = match decision {
            Decision::Approve => (
                Disposition::Approved,
                ExecutionDirective::Execute {
                    args: entry.request.tool_args,
                },
            ),
            Decision::Edit { edited_args } => (
                Disposition::Edited,
                ExecutionDirective::Execute { args: edited_args },
            ),
            Decision::Reject { reason } => {
                let reason = if reason.trim().is_empty() {
                    DEFAULT_REJECT_REASON.to_string()
                } else {
                    reason
                };
                (Disposition::Rejected, ExecutionDirective::Reject { reason })
            }
        };

        table.settle(request_id, disposition);
        drop(table);

        tracing::info!(
            session = %self.session_id,
            %request_id,
            tool = %entry.request.tool_name,
            %disposition,
            "Approval resolved"
        );

        let resolution = Resolution {
            request_id: Some(request_id),
            disposition,
            directive,
        };
        if entry.resolver.send(resolution).is_err() {
            tracing::debug!(%request_id, "Caller stopped waiting before the decision arrived");
        }

        Ok(disposition)
    }

    /// Time out one request. `None` if it already settled.
    async fn expire(&self, request_id: Uuid) -> Option<Resolution> {
        let mut table = self.table.lock().await;
        let entry = table.open.remove(&request_id)?;
        table.settle(request_id, Disposition::Expired);
        drop(table);
        tracing::warn!(session = %self.session_id, %request_id, "Approval request expired");
        let window = entry
            .request
            .expires_at
            .map(|at| (at - entry.request.created_at).num_seconds())
            .unwrap_or_default();
        Some(Resolution::rejected(
            request_id,
            Disposition::Expired,
            format!("No decision received within {} seconds", window),
        ))
    }

    /// Session teardown: every open request resolves as a cancellation and
    /// the broker closes, so later gated calls are cancelled with the same
    /// reason. Returns how many open requests were cancelled.
    pub async fn cancel_all(&self, reason: &str) -> usize {
        let mut table = self.table.lock().await;
        if table.closed.is_none() {
            table.closed = Some(reason.to_string());
        }
        let drained: Vec<(Uuid, PendingApproval)> = table.open.drain().collect();
        for (request_id, _) in &drained {
            table.settle(*request_id, Disposition::Cancelled);
        }
        drop(table);

        let count = drained.len();
        for (request_id, entry) in drained {
            let _ = entry.resolver.send(Resolution::rejected(
                request_id,
                Disposition::Cancelled,
                reason.to_string(),
            ));
        }
        if count > 0 {
            tracing::info!(session = %self.session_id, count, "Cancelled pending approvals");
        }
        count
    }

    /// Open requests, oldest first (for replay to a reattaching reviewer).
    pub async fn pending_requests(&self) -> Vec<ApprovalRequest> {
        let table = self.table.lock().await;
        let mut requests: Vec<ApprovalRequest> =
            table.open.values().map(|p| p.request.clone()).collect();
        requests.sort_by_key(|r| r.created_at);
        requests
    }

    pub async fn pending_count(&self) -> usize {
        self.table.lock().await.open.len()
    }

    pub async fn is_pending(&self, request_id: Uuid) -> bool {
        self.table.lock().await.open.contains_key(&request_id)
    }

    /// Whether teardown has closed the broker to new requests.
    pub async fn is_closed(&self) -> bool {
        self.table.lock().await.closed.is_some()
    }

    /// Final state of a settled request, if still remembered.
    pub async fn settled_state(&self, request_id: Uuid) -> Option<Disposition> {
        self.table.lock().await.settled.get(&request_id).copied()
    }
}
