//! counsel — human-in-the-loop approval gate for document-review agents.
//!
//! An agent's tool calls pass through a policy gate. Gated calls are
//! enriched with context, sent to a human reviewer over a Unix socket and
//! suspended until the reviewer approves, edits or rejects them. The binary
//! entrypoint is in `main.rs`.

pub mod agent;
pub mod approval;
pub mod audit;
pub mod cli;
pub mod client;
pub mod gateway;
pub mod policy;
pub mod tools;
pub mod utils;
