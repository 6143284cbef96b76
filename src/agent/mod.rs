//! Agent side: the gated executor and the scripted plan runner.

pub mod executor;
pub mod script;

pub use executor::{GatedExecutor, ToolResult, ToolStatus};
pub use script::{Plan, PlanStep, ScriptedAgent, Transcript, TranscriptEntry};
