//! Server side of the approval protocol: context assembly and the broker
//! that suspends gated tool calls until a human decides.

pub mod broker;
pub mod collaborators;
pub mod context;
pub mod error;
pub mod types;

pub use broker::{ApprovalBroker, ApprovalTicket, Collaborators, Proposal};
pub use collaborators::{DocumentMetadata, DocumentSource, FileSource, FileState, TaskList};
pub use context::ContextBuilder;
pub use error::ProtocolViolation;
pub use types::*;
