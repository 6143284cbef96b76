//! YAML policy parser.
//!
//! Parses `.counsel.yaml` files into the internal Policy struct.
//!
//! # Example policy file:
//! ```yaml
//! law: due-diligence-v1
//! settings:
//!   decision_timeout_secs: 900
//! rules:
//!   - allow: [list_data_room_documents, read_file]
//!   - require_approval: [get_documents, get_page_text, get_page_image]
//!   - require_approval: "web_*"
//!     decisions: [approve, reject]
//!     prompt: "The agent wants to research this on the web."
//! ```

use crate::policy::types::*;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Raw YAML representation before conversion to internal types.
#[derive(Debug, Deserialize)]
struct RawPolicy {
    law: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    settings: Settings,
    rules: Vec<RawRule>,
}

/// A rule as it appears in the YAML file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    #[serde(default)]
    allow: Option<StringOrVec>,
    #[serde(default)]
    require_approval: Option<StringOrVec>,
    #[serde(default)]
    decisions: Option<StringOrVec>,
    #[serde(default)]
    prompt: Option<String>,
}

/// Allows YAML fields to be either a single string or a list of strings:
/// ```yaml
/// require_approval: write_file
/// require_approval: [write_file, edit_file]
/// ```
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrVec {
    Single(String),
    Multiple(Vec<String>),
}

impl StringOrVec {
    fn into_vec(self) -> Vec<String> {
        match self {
            StringOrVec::Single(s) => vec![s],
            StringOrVec::Multiple(v) => v,
        }
    }
}

/// Parse a YAML policy file from a file path.
pub fn parse_policy_file(path: impl AsRef<Path>) -> Result<Policy> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read policy file: {}", path.display()))?;
    parse_policy_str(&content)
        .with_context(|| format!("Failed to parse policy file: {}", path.display()))
}

/// Parse a YAML policy string into a Policy struct.
pub fn parse_policy_str(yaml: &str) -> Result<Policy> {
    let raw: RawPolicy =
        serde_yaml::from_str(yaml).context("Invalid YAML syntax in policy file")?;

    if raw.law.trim().is_empty() {
        bail!("Policy must have a non-empty 'law' name");
    }

    validate_settings(&raw.settings)?;

    let mut rules = Vec::with_capacity(raw.rules.len());
    for (i, raw_rule) in raw.rules.into_iter().enumerate() {
        let rule = convert_rule(raw_rule, i)
            .with_context(|| format!("Invalid rule at position {} (0-indexed)", i))?;
        rules.push(rule);
    }

    if rules.is_empty() {
        bail!("Policy must have at least one rule");
    }

    Ok(Policy {
        law: raw.law,
        description: raw.description,
        settings: raw.settings,
        rules,
    })
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.decision_timeout_secs == Some(0) {
        bail!("settings.decision_timeout_secs must be positive (omit it to wait forever)");
    }
    if settings.preview_chars == 0 {
        bail!("settings.preview_chars must be positive");
    }
    if settings.reasoning_window == 0 {
        bail!("settings.reasoning_window must be positive");
    }
    Ok(())
}

/// Convert a raw YAML rule into a typed Rule.
fn convert_rule(raw: RawRule, index: usize) -> Result<Rule> {
    let (tools, gating) = match (raw.allow, raw.require_approval) {
        (Some(_), Some(_)) => bail!(
            "Rule {} specifies both allow and require_approval — pick one",
            index
        ),
        (None, None) => bail!(
            "Rule {} must specify one of: allow or require_approval",
            index
        ),
        (Some(tools), None) => (tools.into_vec(), false),
        (None, Some(tools)) => (tools.into_vec(), true),
    };

    validate_tool_patterns(&tools, index)?;

    if !gating {
        if raw.decisions.is_some() || raw.prompt.is_some() {
            bail!(
                "Rule {}: 'decisions' and 'prompt' only apply to require_approval rules",
                index
            );
        }
        return Ok(Rule::Allow { tools });
    }

    let decisions = match raw.decisions {
        None => None,
        Some(raw_decisions) => {
            let mut kinds = Vec::new();
            for name in raw_decisions.into_vec() {
                let kind = DecisionKind::from_str_loose(&name).ok_or_else(|| {
                    anyhow::anyhow!(
                        "Rule {}: unknown decision '{}' (expected approve, edit or reject)",
                        index,
                        name
                    )
                })?;
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
            if kinds.is_empty() {
                bail!("Rule {}: 'decisions' must list at least one decision", index);
            }
            kinds.sort();
            Some(kinds)
        }
    };

    Ok(Rule::RequireApproval {
        tools,
        decisions,
        prompt: raw.prompt,
    })
}

/// Tool names are plain identifiers or glob patterns (`web_*`).
fn validate_tool_patterns(tools: &[String], index: usize) -> Result<()> {
    if tools.is_empty() {
        bail!("Rule {} names no tools", index);
    }
    for pattern in tools {
        if pattern.trim().is_empty() {
            bail!("Rule {}: tool names must not be empty", index);
        }
        globset::Glob::new(pattern)
            .with_context(|| format!("Rule {}: invalid tool pattern '{}'", index, pattern))?;
    }
    Ok(())
}
