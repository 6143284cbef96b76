//! Policy linter — detects gaps and shadowed rules.
//!
//! When a user runs `counsel check`, the linter scans the policy for:
//! - Client-document or work-product tools that would run ungated
//! - Rules that can never match because an earlier rule catches everything
//! - Tool names that no known tool uses (usually typos)
//! - Edit disabled on file writes, where it's most useful

use crate::policy::types::*;
use crate::utils::patterns::{is_glob, ToolMatcher};
use colored::Colorize;

/// Every tool the data room runtime knows about.
pub const KNOWN_TOOLS: &[&str] = &[
    "list_data_room_documents",
    "get_documents",
    "get_page_text",
    "get_page_image",
    "read_file",
    "write_file",
    "edit_file",
    "write_todos",
    "web_search",
    "web_fetch",
    "analyze_documents",
    "create_report",
];

/// A lint warning: something the user should know about their policy.
#[derive(Debug)]
pub struct LintWarning {
    pub severity: Severity,
    pub message: String,
    pub suggestion: Option<String>,
}

#[derive(Debug)]
pub enum Severity {
    /// Something that could let the agent act unsupervised
    Warning,
    /// A suggestion for improvement
    Info,
}

impl LintWarning {
    fn warn(msg: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: msg.into(),
            suggestion: None,
        }
    }

    fn warn_with_fix(msg: impl Into<String>, fix: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: msg.into(),
            suggestion: Some(fix.into()),
        }
    }

    fn info(msg: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: msg.into(),
            suggestion: None,
        }
    }

    /// Format for terminal output.
    pub fn display(&self) -> String {
        let icon = match self.severity {
            Severity::Warning => "⚠".yellow().to_string(),
            Severity::Info => "ℹ".blue().to_string(),
        };
        let mut out = format!("  {} {}", icon, self.message);
        if let Some(ref suggestion) = self.suggestion {
            out.push_str(&format!("\n    {}: {}", "Fix".green(), suggestion));
        }
        out
    }
}

/// Lint a policy and return warnings.
pub fn lint_policy(policy: &Policy) -> Vec<LintWarning> {
    let mut warnings = Vec::new();

    check_kind_gated(policy, ToolKind::DocumentAccess, &mut warnings);
    check_kind_gated(policy, ToolKind::PageAccess, &mut warnings);
    check_kind_gated(policy, ToolKind::FileMutation, &mut warnings);
    check_shadowed_rules(policy, &mut warnings);
    check_unknown_tools(policy, &mut warnings);
    check_file_edit_allowed(policy, &mut warnings);
    check_timeout(policy, &mut warnings);

    warnings
}

/// Resolve which rule (if any) a tool hits, first match wins.
fn first_rule_for<'a>(policy: &'a Policy, tool: &str) -> Option<&'a Rule> {
    policy.rules.iter().find(|rule| {
        ToolMatcher::new(rule.tools())
            .map(|m| m.matches(tool))
            .unwrap_or(false)
    })
}

/// Check: are all tools of this kind gated?
fn check_kind_gated(policy: &Policy, kind: ToolKind, warnings: &mut Vec<LintWarning>) {
    let ungated: Vec<&str> = KNOWN_TOOLS
        .iter()
        .copied()
        .filter(|tool| ToolKind::of(tool) == kind)
        .filter(|tool| !first_rule_for(policy, tool).is_some_and(Rule::is_gating))
        .collect();

    if !ungated.is_empty() {
        warnings.push(LintWarning::warn_with_fix(
            format!(
                "{} tools run without review: {}",
                kind,
                ungated.join(", ")
            ),
            format!("Add: require_approval: [{}]", ungated.join(", ")),
        ));
    }
}

/// Check: does an earlier catch-all rule make later rules unreachable?
fn check_shadowed_rules(policy: &Policy, warnings: &mut Vec<LintWarning>) {
    let catch_all = policy
        .rules
        .iter()
        .position(|rule| rule.tools().iter().any(|t| t.trim() == "*"));

    if let Some(idx) = catch_all {
        let remaining = policy.rules.len() - idx - 1;
        if remaining > 0 {
            warnings.push(LintWarning::warn(format!(
                "Rule {} ({}) matches every tool — the {} rule(s) after it will never match (first match wins)",
                idx + 1,
                policy.rules[idx].describe(),
                remaining
            )));
        }
    }

    // A literal name listed again after an earlier rule already caught it
    for (i, rule) in policy.rules.iter().enumerate() {
        for tool in rule.tools().iter().filter(|t| !is_glob(t)) {
            if let Some(earlier) = policy.rules[..i].iter().position(|prev| {
                ToolMatcher::new(prev.tools())
                    .map(|m| m.matches(tool))
                    .unwrap_or(false)
            }) {
                warnings.push(LintWarning::warn(format!(
                    "'{}' in rule {} is already matched by rule {} — this entry has no effect",
                    tool,
                    i + 1,
                    earlier + 1
                )));
            }
        }
    }
}

/// Check: are there literal tool names no known tool uses?
fn check_unknown_tools(policy: &Policy, warnings: &mut Vec<LintWarning>) {
    for rule in &policy.rules {
        for tool in rule.tools().iter().filter(|t| !is_glob(t)) {
            if !KNOWN_TOOLS.contains(&tool.trim()) {
                warnings.push(LintWarning::info(format!(
                    "'{}' is not a known tool — check for typos",
                    tool
                )));
            }
        }
    }
}

/// Check: can reviewers fix a bad file write instead of only rejecting it?
fn check_file_edit_allowed(policy: &Policy, warnings: &mut Vec<LintWarning>) {
    let edit_blocked = ["write_file", "edit_file"].iter().any(|tool| {
        matches!(
            first_rule_for(policy, tool),
            Some(Rule::RequireApproval {
                decisions: Some(decisions),
                ..
            }) if !decisions.contains(&DecisionKind::Edit)
        )
    });

    if edit_blocked {
        warnings.push(LintWarning::info(
            "File writes can't be edited by the reviewer — a small correction means rejecting the whole write",
        ));
    }
}

/// Check: will a session ever block forever on an absent reviewer?
fn check_timeout(policy: &Policy, warnings: &mut Vec<LintWarning>) {
    if policy.settings.decision_timeout_secs.is_none()
        && policy.rules.iter().any(Rule::is_gating)
    {
        warnings.push(LintWarning::info(
            "No decision timeout — the agent waits indefinitely for a reviewer. Set settings.decision_timeout_secs for unattended runs.",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::parser;

    #[test]
    fn test_lint_ungated_documents() {
        let yaml = r#"
law: too-open
rules:
  - require_approval: write_file
"#;
        let policy = parser::parse_policy_str(yaml).unwrap();
        let warnings = lint_policy(&policy);

        assert!(warnings
            .iter()
            .any(|w| w.message.contains("get_documents")));
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("edit_file")));
    }

    #[test]
    fn test_lint_due_diligence_has_no_warnings() {
        let yaml = crate::policy::defaults::DUE_DILIGENCE_YAML;
        let policy = parser::parse_policy_str(yaml).unwrap();
        let warnings = lint_policy(&policy);

        let warning_count = warnings
            .iter()
            .filter(|w| matches!(w.severity, Severity::Warning))
            .count();
        assert!(
            warning_count == 0,
            "due-diligence should have no warnings, got {}: {:?}",
            warning_count,
            warnings.iter().map(|w| &w.message).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_lint_catch_all_shadowing() {
        let yaml = r#"
law: bad-order
rules:
  - allow: "*"
  - require_approval: write_file
"#;
        let policy = parser::parse_policy_str(yaml).unwrap();
        let warnings = lint_policy(&policy);

        assert!(warnings
            .iter()
            .any(|w| w.message.contains("first match wins")));
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("already matched by rule 1")));
    }

    #[test]
    fn test_lint_unknown_tool_name() {
        let yaml = r#"
law: typo
rules:
  - require_approval: get_docments
"#;
        let policy = parser::parse_policy_str(yaml).unwrap();
        let warnings = lint_policy(&policy);

        assert!(warnings
            .iter()
            .any(|w| w.message.contains("'get_docments' is not a known tool")));
    }
}
