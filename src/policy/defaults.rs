//! Built-in policy templates.
//!
//! - `due-diligence`: gate every document read, file write, web lookup and delegation
//! - `strict`: same gates, no editing, and requests expire after five minutes
//! - `observe`: only file writes are gated, everything else runs and gets logged

/// Default policy for a due-diligence review.
pub const DUE_DILIGENCE_YAML: &str = r#"# Counsel policy: due-diligence
# Every action that reads client documents, writes work product, leaves
# the data room or spins up a subagent waits for a human decision.

law: due-diligence-v1

description: >
  Default review policy. Listing the data room and reading the agent's own
  notes is free; reading documents, writing files, web research and
  subagent delegation need a reviewer's approval.

settings:
  preview_chars: 200
  reasoning_window: 5
  max_related_todos: 3

rules:
  # -- Free: orientation and the agent's own scratch space --
  - allow: [list_data_room_documents, read_file, write_todos]

  # -- Client documents --
  - require_approval: [get_documents, get_page_text, get_page_image]
    prompt: "The agent wants to read client documents."

  # -- Work product --
  - require_approval: [write_file, edit_file]

  # -- Leaving the data room --
  - require_approval: "web_*"
    prompt: "The agent wants to research this on the public web."

  # -- Delegation --
  - require_approval: analyze_documents
  - require_approval: create_report
    decisions: [approve, reject]
    prompt: "The final report should only be created once, after all analysis is done."
"#;

/// Strict policy: reviewers can only approve or reject, and silence is a no.
pub const STRICT_YAML: &str = r#"# Counsel policy: strict
# For sensitive matters: no argument editing, unanswered requests expire.

law: strict-v1

description: >
  Strict review. Every gated call is approve-or-reject only and is
  rejected automatically after five minutes without a decision.

settings:
  decision_timeout_secs: 300
  preview_chars: 400

rules:
  - allow: [list_data_room_documents, write_todos]
  - require_approval: "*"
    decisions: [approve, reject]
"#;

/// Observe-only policy, for building trust with a new agent setup.
pub const OBSERVE_YAML: &str = r#"# Counsel policy: observe
# Lets the agent work mostly unattended. Only writes to work product are
# gated; everything else runs and is recorded in the audit log.

law: observe-v1

description: >
  Minimal gating. File writes need approval, everything else is logged.

rules:
  - require_approval: [write_file, edit_file]
  - allow: "*"
"#;

/// Get a default policy template by name.
pub fn get_default_policy(name: &str) -> Option<&'static str> {
    match name {
        "due-diligence" | "default" => Some(DUE_DILIGENCE_YAML),
        "strict" => Some(STRICT_YAML),
        "observe" => Some(OBSERVE_YAML),
        _ => None,
    }
}

/// List available template names with descriptions.
pub fn available_templates() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "due-diligence",
            "Gate document reads, file writes, web research and delegation",
        ),
        ("strict", "Approve/reject only, requests expire after 5 minutes"),
        ("observe", "Gate file writes only, log everything else"),
    ]
}
