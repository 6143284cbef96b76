//! Policy parsing, gating and linting through the public API.

use counsel::policy::defaults::{available_templates, get_default_policy};
use counsel::policy::linter::lint_policy;
use counsel::policy::{parser, DecisionKind, Gate, PolicySet};

fn policy_set(yaml: &str) -> PolicySet {
    PolicySet::new(parser::parse_policy_str(yaml).unwrap()).unwrap()
}

#[test]
fn test_every_template_parses_and_compiles() {
    for (name, _) in available_templates() {
        let yaml = get_default_policy(name).unwrap();
        let policy = parser::parse_policy_str(yaml)
            .unwrap_or_else(|e| panic!("template {} failed to parse: {:#}", name, e));
        PolicySet::new(policy).unwrap();
    }
}

#[test]
fn test_due_diligence_gates() {
    let set = policy_set(get_default_policy("due-diligence").unwrap());

    assert!(!set.requires_approval("list_data_room_documents"));
    assert!(!set.requires_approval("read_file"));
    assert!(!set.requires_approval("write_todos"));

    for tool in ["get_documents", "get_page_text", "write_file", "edit_file", "web_search"] {
        assert!(set.requires_approval(tool), "{} should be gated", tool);
        assert_eq!(set.allowed_decisions(tool), DecisionKind::all().to_vec());
    }
    assert_eq!(
        set.allowed_decisions("create_report"),
        vec![DecisionKind::Approve, DecisionKind::Reject]
    );
}

#[test]
fn test_strict_template_has_timeout_and_no_edit() {
    let set = policy_set(get_default_policy("strict").unwrap());
    assert_eq!(set.settings().decision_timeout_secs, Some(300));
    assert!(!set.allowed_decisions("write_file").contains(&DecisionKind::Edit));
}

#[test]
fn test_first_match_wins() {
    let set = policy_set(
        r#"
law: order
rules:
  - allow: get_documents
  - require_approval: "get_*"
"#,
    );
    assert!(!set.requires_approval("get_documents"));
    assert!(set.requires_approval("get_page_text"));
    match set.gate("get_page_text") {
        Gate::Approval { matched_rule, .. } => assert_eq!(matched_rule, "require_approval:get_*"),
        other => panic!("unexpected gate {:?}", other),
    }
}

#[test]
fn test_unmatched_tool_is_ungated() {
    let set = policy_set(
        r#"
law: narrow
rules:
  - require_approval: write_file
"#,
    );
    assert_eq!(set.gate("get_documents"), Gate::Open { matched_rule: None });
    assert!(set.allowed_decisions("get_documents").is_empty());
}

#[test]
fn test_unknown_tool_defaults_to_approve_reject() {
    let set = policy_set(
        r#"
law: catch-all
rules:
  - require_approval: "*"
"#,
    );
    assert_eq!(
        set.allowed_decisions("summon_partner"),
        vec![DecisionKind::Approve, DecisionKind::Reject]
    );
    assert_eq!(set.allowed_decisions("write_file"), DecisionKind::all().to_vec());
}

#[test]
fn test_invalid_policies_rejected() {
    assert!(parser::parse_policy_str("law: ''\nrules:\n  - allow: read_file\n").is_err());
    assert!(parser::parse_policy_str("law: empty\nrules: []\n").is_err());
    assert!(parser::parse_policy_str(
        "law: both\nrules:\n  - allow: read_file\n    require_approval: read_file\n"
    )
    .is_err());
    assert!(parser::parse_policy_str(
        "law: zero\nsettings:\n  decision_timeout_secs: 0\nrules:\n  - allow: read_file\n"
    )
    .is_err());
    assert!(parser::parse_policy_str("law: [unclosed\n").is_err());
}

#[test]
fn test_lint_flags_ungated_documents_and_typos() {
    let policy = parser::parse_policy_str(
        r#"
law: loose
rules:
  - allow: [get_documents, get_page_txt]
  - require_approval: [write_file, edit_file]
"#,
    )
    .unwrap();
    let messages: Vec<String> = lint_policy(&policy).into_iter().map(|w| w.message).collect();

    assert!(messages.iter().any(|m| m.contains("get_documents")), "{:?}", messages);
    assert!(messages.iter().any(|m| m.contains("'get_page_txt'")), "{:?}", messages);
}

#[test]
fn test_lint_flags_shadowed_rules() {
    let policy = parser::parse_policy_str(
        r#"
law: shadowed
rules:
  - require_approval: "*"
  - allow: read_file
"#,
    )
    .unwrap();
    let warnings = lint_policy(&policy);
    assert!(warnings.iter().any(|w| w.message.contains("never match")));
}
