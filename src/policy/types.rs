//! Core types for the approval policy.
//!
//! A policy decides which tool calls need a human in the loop and which
//! decisions the reviewer may make for them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The broad category of a tool, used for context building and for the
/// default set of allowed decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Reads whole documents from the data room
    DocumentAccess,
    /// Reads specific pages of one document
    PageAccess,
    /// Writes or edits an agent-owned file
    FileMutation,
    /// Searches or fetches from the web
    WebResearch,
    /// Delegates work to a subagent
    Subagent,
    /// Anything we don't recognise
    Other,
}

impl ToolKind {
    /// Classify a tool by name.
    pub fn of(tool_name: &str) -> ToolKind {
        match tool_name.trim() {
            "get_documents" => ToolKind::DocumentAccess,
            "get_page_text" | "get_page_image" => ToolKind::PageAccess,
            "write_file" | "edit_file" => ToolKind::FileMutation,
            "web_search" | "web_fetch" => ToolKind::WebResearch,
            "analyze_documents" | "create_report" => ToolKind::Subagent,
            _ => ToolKind::Other,
        }
    }

    /// Decisions a reviewer gets when the policy rule doesn't narrow them.
    /// Unknown tools can't be meaningfully edited, so they only get approve/reject.
    pub fn default_decisions(&self) -> Vec<DecisionKind> {
        match self {
            ToolKind::Other => vec![DecisionKind::Approve, DecisionKind::Reject],
            _ => DecisionKind::all().to_vec(),
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolKind::DocumentAccess => write!(f, "document access"),
            ToolKind::PageAccess => write!(f, "page access"),
            ToolKind::FileMutation => write!(f, "file mutation"),
            ToolKind::WebResearch => write!(f, "web research"),
            ToolKind::Subagent => write!(f, "subagent delegation"),
            ToolKind::Other => write!(f, "other"),
        }
    }
}

/// The three kinds of decision a reviewer can make, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Approve,
    Edit,
    Reject,
}

impl DecisionKind {
    pub fn all() -> [DecisionKind; 3] {
        [DecisionKind::Approve, DecisionKind::Edit, DecisionKind::Reject]
    }

    /// Parse a decision kind, accepting a few natural spellings.
    pub fn from_str_loose(s: &str) -> Option<DecisionKind> {
        match s.to_lowercase().trim() {
            "approve" | "approved" | "accept" | "allow" => Some(DecisionKind::Approve),
            "edit" | "modify" | "edited" => Some(DecisionKind::Edit),
            "reject" | "rejected" | "deny" | "decline" => Some(DecisionKind::Reject),
            _ => None,
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionKind::Approve => write!(f, "approve"),
            DecisionKind::Edit => write!(f, "edit"),
            DecisionKind::Reject => write!(f, "reject"),
        }
    }
}

/// A single rule in a policy. Rules are evaluated in order, first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    /// Let matching tools run without asking anyone.
    Allow { tools: Vec<String> },
    /// Pause matching tool calls until a human decides.
    RequireApproval {
        tools: Vec<String>,
        /// Narrows the allowed decisions (None = the tool kind's default)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        decisions: Option<Vec<DecisionKind>>,
        /// Shown to the reviewer alongside the request
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
}

impl Rule {
    /// Tool names or glob patterns this rule applies to.
    pub fn tools(&self) -> &[String] {
        match self {
            Rule::Allow { tools } => tools,
            Rule::RequireApproval { tools, .. } => tools,
        }
    }

    pub fn is_gating(&self) -> bool {
        matches!(self, Rule::RequireApproval { .. })
    }

    /// Human-readable description of this rule (used in logs and `check`).
    pub fn describe(&self) -> String {
        match self {
            Rule::Allow { tools } => format!("allow:{}", tools.join(",")),
            Rule::RequireApproval {
                tools, decisions, ..
            } => {
                let mut desc = format!("require_approval:{}", tools.join(","));
                if let Some(decisions) = decisions {
                    let names: Vec<String> = decisions.iter().map(|d| d.to_string()).collect();
                    desc.push_str(&format!(":decisions:{}", names.join(",")));
                }
                desc
            }
        }
    }
}

/// Tunables for the broker and the context builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Reject a request automatically after this many seconds (None = wait forever)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_timeout_secs: Option<u64>,
    /// Max characters of proposed file content shown to the reviewer
    pub preview_chars: usize,
    /// How many recent agent messages to search for reasoning
    pub reasoning_window: usize,
    /// Max characters of agent reasoning attached to a request
    pub reasoning_chars: usize,
    /// Max number of todos attached to a request
    pub max_related_todos: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            decision_timeout_secs: None,
            preview_chars: 200,
            reasoning_window: 5,
            reasoning_chars: 500,
            max_related_todos: 3,
        }
    }
}

/// A complete policy: a named, ordered set of gating rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Policy name/identifier (e.g., "due-diligence-v1")
    pub law: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub settings: Settings,

    /// Ordered list of rules. First match wins; no match means ungated.
    pub rules: Vec<Rule>,
}

/// Outcome of looking a tool up in the policy.
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    /// Run immediately.
    Open {
        matched_rule: Option<String>,
    },
    /// Ask a human first.
    Approval {
        allowed_decisions: Vec<DecisionKind>,
        prompt: Option<String>,
        matched_rule: String,
    },
}

impl Gate {
    pub fn requires_approval(&self) -> bool {
        matches!(self, Gate::Approval { .. })
    }
}
