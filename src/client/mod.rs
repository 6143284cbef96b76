//! Decision client: the reviewer's side of the protocol.

pub mod state;
pub mod terminal;

use crate::approval::types::{ApprovalRequest, Decision};
use crate::policy::DecisionKind;
use anyhow::Result;
use async_trait::async_trait;

pub use state::{parse_edit_args, ClientError, DecisionClient, HighlightProjection, Phase, Update};
pub use terminal::TerminalReviewer;

/// Something that turns a presented request into a decision.
/// Implementations can be terminal-based, scripted, auto-approve, etc.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, request: &ApprovalRequest, highlights: &HighlightProjection) -> Result<Decision>;
}

/// Approves everything it is allowed to (for testing and demos). Requests
/// that don't offer approve are rejected.
pub struct AutoApprove;

#[async_trait]
impl Reviewer for AutoApprove {
    async fn review(&self, request: &ApprovalRequest, _highlights: &HighlightProjection) -> Result<Decision> {
        if request.allows(DecisionKind::Approve) {
            Ok(Decision::Approve)
        } else {
            Ok(Decision::reject("Auto-approve is not permitted for this tool"))
        }
    }
}

/// Rejects everything (strict CI mode).
pub struct AutoReject {
    reason: String,
}

impl AutoReject {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for AutoReject {
    fn default() -> Self {
        Self::new("Rejected automatically")
    }
}

#[async_trait]
impl Reviewer for AutoReject {
    async fn review(&self, _request: &ApprovalRequest, _highlights: &HighlightProjection) -> Result<Decision> {
        Ok(Decision::reject(self.reason.clone()))
    }
}
