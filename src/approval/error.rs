//! Protocol-level errors for the approval flow.
//!
//! None of these end a session. They are logged, reported back to the
//! reviewer and the pending table is left exactly as it was.

use crate::approval::types::Disposition;
use crate::policy::types::DecisionKind;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// Nothing was ever pending under this id (or it aged out of history).
    #[error("unknown approval request {0}")]
    UnknownRequest(Uuid),

    /// A second decision for a request that has already settled.
    #[error("approval request {request_id} is already settled ({disposition})")]
    AlreadyResolved {
        request_id: Uuid,
        disposition: Disposition,
    },

    /// The reviewer chose a decision the policy doesn't offer for this tool.
    /// The request stays open.
    #[error("decision '{decision}' is not allowed for request {request_id} (allowed: {allowed})")]
    DecisionNotAllowed {
        request_id: Uuid,
        decision: DecisionKind,
        allowed: String,
    },
}

impl ProtocolViolation {
    pub fn request_id(&self) -> Uuid {
        match self {
            ProtocolViolation::UnknownRequest(id) => *id,
            ProtocolViolation::AlreadyResolved { request_id, .. } => *request_id,
            ProtocolViolation::DecisionNotAllowed { request_id, .. } => *request_id,
        }
    }

    /// Whether the reviewer can still submit a decision for this request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProtocolViolation::DecisionNotAllowed { .. })
    }
}
